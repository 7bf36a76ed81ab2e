use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::fetch;
use crate::links::{HtmlLinks, LinkDiscoverer};
use crate::photo::{PhotoTransform, PngThumbnailer};
use crate::storage::Storage;

/// Everything the engine's tasks and handlers share.
#[derive(Clone)]
pub struct State {
    pub storage: Arc<Storage>,
    pub cfg: Arc<Config>,
    pub http_client: Client,
    pub clock: Arc<dyn Clock>,
    pub links: Arc<dyn LinkDiscoverer>,
    pub photos: Arc<dyn PhotoTransform>,
}

impl State {
    pub async fn new(cfg: Config) -> Result<Self> {
        let storage = Arc::new(Storage::new(&cfg.db_path).await?);
        let http_client = fetch::client()?;
        let photos = Arc::new(PngThumbnailer::new(cfg.thumbnail_size));
        let cfg = Arc::new(cfg);

        Ok(State {
            storage,
            cfg,
            http_client,
            clock: Arc::new(SystemClock),
            links: Arc::new(HtmlLinks),
            photos,
        })
    }
}
