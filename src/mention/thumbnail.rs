use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::fetch;
use crate::state::State;

/// The key a thumbnail is stored under: a hex-encoded SHA-256 digest of its bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fetches an author photo, shrinks it and stores the result.
///
/// Returns the stored thumbnail's key, or `None` if anything went wrong; a missing thumbnail is
/// never a reason to reject a mention.
#[instrument(level = "DEBUG", skip(state))]
pub async fn derive(state: &State, photo_url: &str) -> Option<String> {
    match try_derive(state, photo_url).await {
        Ok(hash) => {
            debug!(%hash, "Stored the author thumbnail");

            Some(hash)
        }

        Err(e) => {
            warn!("Could not make a thumbnail of `{photo_url}`: {e:#}");

            None
        }
    }
}

async fn try_derive(state: &State, photo_url: &str) -> Result<String> {
    let photo = fetch::get_bytes(&state.http_client, photo_url).await?;

    let photos = state.photos.clone();
    let png = tokio::task::spawn_blocking(move || photos.thumbnail(&photo))
        .await
        .context("the thumbnail task panicked")??;
    let hash = content_hash(&png);

    let mut tx = state.storage.begin().await?;
    tx.put_thumbnail(&hash, &png).await?;
    tx.commit().await?;

    Ok(hash)
}
