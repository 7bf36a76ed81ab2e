//! Shared fixtures for tests that need an engine context or a web server to talk to.

use std::sync::Arc;

use axum::Router;
use time::macros::datetime;
use time::OffsetDateTime;
use tokio::net::TcpListener;

use crate::clock::FixedClock;
use crate::config::Config;
use crate::fetch;
use crate::links::HtmlLinks;
use crate::photo::{PhotoTransform, PngThumbnailer};
use crate::state::State;
use crate::storage::Storage;

pub const NOW: OffsetDateTime = datetime!(2024-08-01 12:00:00 UTC);

/// Serves `app` on an ephemeral local port and returns its base URL (without a trailing slash).
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

pub fn config() -> Config {
    Config {
        site_domain: "bitworking.org".into(),
        admin_token: Some("sekrit".into()),
        ..Default::default()
    }
}

/// An engine context over a private in-memory database, with the clock stopped at [`NOW`].
pub async fn state() -> State {
    state_with(config(), Arc::new(PngThumbnailer::new(32))).await
}

pub async fn state_with(cfg: Config, photos: Arc<dyn PhotoTransform>) -> State {
    State {
        storage: Arc::new(Storage::in_memory().await.unwrap()),
        cfg: Arc::new(cfg),
        http_client: fetch::client().unwrap(),
        clock: Arc::new(FixedClock(NOW)),
        links: Arc::new(HtmlLinks),
        photos,
    }
}
