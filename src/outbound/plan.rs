//! Deciding which feed entries to send mentions for, and to whom.

use anyhow::Result;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, trace, warn};

use crate::feed::FeedEntry;
use crate::links::LinkDiscoverer;
use crate::storage::Tx;

/// A published page and everything it links to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionSource {
    pub source: String,
    pub targets: Vec<String>,

    /// When the page was last updated. The Unix epoch if the feed's timestamp was unreadable.
    pub updated: OffsetDateTime,
}

/// Collects the outbound links of every entry, in feed order.
///
/// Entries without a URL or with unreadable content are skipped. If several entries share a
/// URL, the last one wins.
pub fn plan(entries: &[FeedEntry], links: &dyn LinkDiscoverer) -> Vec<MentionSource> {
    let mut sources: Vec<MentionSource> = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(source) = &entry.link else {
            warn!(id = %entry.id, "Skipping a feed entry without a link");

            continue;
        };

        let targets = match links.discover(&entry.content, source) {
            Ok(targets) => targets,

            Err(e) => {
                warn!(%source, "Skipping a feed entry: could not discover its links: {e:#}");

                continue;
            }
        };

        let updated = OffsetDateTime::parse(&entry.updated, &Rfc3339).unwrap_or_else(|e| {
            warn!(
                %source,
                updated = %entry.updated,
                "Could not parse the entry's update time, assuming the epoch: {e}"
            );

            OffsetDateTime::UNIX_EPOCH
        });

        trace!(%source, target_count = targets.len(), "Planned a source");

        let planned = MentionSource {
            source: source.clone(),
            targets,
            updated,
        };

        match sources.iter_mut().find(|s| s.source == planned.source) {
            Some(existing) => {
                debug!(source = %planned.source, "The feed lists a source twice");
                *existing = planned;
            }

            None => sources.push(planned),
        }
    }

    sources
}

/// Whether an entry updated at `updated` should be dispatched again after a pass at `sent`.
pub fn needs_dispatch(
    updated: OffsetDateTime,
    sent: Option<OffsetDateTime>,
    grace: time::Duration,
) -> bool {
    sent.map_or(true, |sent| updated > sent + grace)
}

/// Drops the sources that were already dispatched since their last update.
pub async fn due(
    tx: &mut Tx,
    sources: Vec<MentionSource>,
    grace: time::Duration,
) -> Result<Vec<MentionSource>> {
    let mut result = Vec::with_capacity(sources.len());

    for source in sources {
        let sent = tx.get_sent(&source.source).await?;

        if needs_dispatch(source.updated, sent, grace) {
            result.push(source);
        } else {
            trace!(source = %source.source, "Already dispatched");
        }
    }

    Ok(result)
}
