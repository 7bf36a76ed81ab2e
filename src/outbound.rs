//! The outbound loop: watching the site's feed and notifying the pages its entries link to.

pub mod dispatch;
pub mod plan;

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use tokio::select;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, Instrument};

use crate::feed;
use crate::state::State;

const MIN_PERIOD: std::time::Duration = std::time::Duration::from_secs(1);

pub struct Outbound {
    state: State,
    feed_path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl Outbound {
    pub fn new(state: State, feed_path: PathBuf) -> Self {
        Self {
            state,
            feed_path,
            last_modified: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        async move {
            let poll_interval = self.state.cfg.feed_poll_interval;
            info!(
                "Watching `{}` every {poll_interval}",
                self.feed_path.display()
            );

            let period = std::time::Duration::from(poll_interval).max(MIN_PERIOD);
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                select! {
                    _ = cancel.cancelled() => {
                        debug!("Received a cancellation signal; exiting");
                        break;
                    }

                    _ = ticker.tick() => {}
                }

                if let Err(e) = self.check().await {
                    error!("Could not process the feed: {e:#}");
                }
            }

            Ok(())
        }
        .instrument(info_span!("outbound"))
        .await
    }

    /// Runs a pass if the feed file changed since the last check.
    ///
    /// Returns whether a pass was attempted. A failed pass is not retried until the file changes
    /// again.
    pub async fn check(&mut self) -> Result<bool> {
        let path = &self.feed_path;
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|metadata| metadata.modified())
            .with_context(|| anyhow!("could not stat the feed `{}`", path.display()))?;

        if self.last_modified.is_some_and(|last| modified <= last) {
            trace!("The feed has not changed");

            return Ok(false);
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| anyhow!("could not read the feed `{}`", path.display()))?;
        self.last_modified = Some(modified);

        self.pass(&bytes).await?;

        Ok(true)
    }

    /// Dispatches mentions for every feed entry updated since its last dispatch.
    pub async fn pass(&self, feed: &[u8]) -> Result<()> {
        async move {
            let entries = feed::parse(feed).context("could not parse the feed")?;
            let sources = plan::plan(&entries, &*self.state.links);

            let mut tx = self.state.storage.begin().await?;
            let due = plan::due(&mut tx, sources, self.state.cfg.dispatch_grace.into()).await?;
            tx.commit().await?;

            info!(
                "{} of {} feed entries are due for dispatch",
                due.len(),
                entries.len()
            );

            for source in &due {
                if let Err(e) = dispatch::dispatch(&self.state, source).await {
                    error!(source = %source.source, "Could not finish dispatching: {e:#}");
                }
            }

            Ok(())
        }
        .instrument(info_span!("pass"))
        .await
    }
}
