use anyhow::Result;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::outbound::plan::MentionSource;
use crate::state::State;
use crate::webmention;

/// Notifies every target of `source` that has an endpoint, one at a time, then records the pass.
///
/// Failures are confined to their target. Returns the dispatch time stored for the source.
#[instrument(skip_all, fields(source = %source.source))]
pub async fn dispatch(state: &State, source: &MentionSource) -> Result<OffsetDateTime> {
    let mut sent = 0;

    for target in &source.targets {
        let endpoint = match webmention::discover_endpoint(&state.http_client, target).await {
            Ok(Some(endpoint)) => endpoint,

            Ok(None) => {
                debug!(%target, "The target does not accept webmentions");

                continue;
            }

            Err(e) => {
                info!(%target, "Could not discover a webmention endpoint: {e:#}");

                continue;
            }
        };

        match webmention::send(&state.http_client, &endpoint, &source.source, target).await {
            Ok(status) => {
                debug!(%target, %endpoint, %status, "Sent a webmention");
                sent += 1;
            }

            Err(e) => warn!(%target, "Could not deliver a webmention: {e:#}"),
        }
    }

    info!(
        "Sent {sent} webmention(s) for {} target(s)",
        source.targets.len()
    );

    let mut tx = state.storage.begin().await?;
    let recorded = tx.record_sent(&source.source, source.updated).await?;
    tx.commit().await?;

    Ok(recorded)
}
