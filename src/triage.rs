//! Moving mentions out of the queue: the periodic verification sweep and manual overrides.

use anyhow::Result;
use tokio::select;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::mention::validate::{self, Verdict};
use crate::mention::{KeyedMention, MentionState};
use crate::state::State;

const MIN_PERIOD: std::time::Duration = std::time::Duration::from_secs(1);

/// How a sweep went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub good: usize,
    pub spam: usize,

    /// Mentions left untriaged because their verdict could not be stored.
    pub failed: usize,
}

pub struct Sweeper {
    state: State,
}

impl Sweeper {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        async move {
            let sweep_interval = self.state.cfg.sweep_interval;
            info!("Sweeping the queue every {sweep_interval}");

            let period = std::time::Duration::from(sweep_interval).max(MIN_PERIOD);
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

                if let Err(e) = self.sweep().await {
                    error!("Could not sweep the queue: {e:#}");
                }
            }

            Ok(())
        }
        .instrument(info_span!("sweeper"))
        .await
    }

    /// Verifies every untriaged mention, marking each one `good` or `spam`.
    pub async fn sweep(&self) -> Result<Summary> {
        async move {
            let mut tx = self.state.storage.begin().await?;
            let queued = tx.get_queued().await?;
            tx.commit().await?;

            if queued.is_empty() {
                debug!("The queue is empty");

                return Ok(Summary::default());
            }

            let mut summary = Summary::default();

            for mention in &queued {
                match self.triage(mention).await {
                    Ok(MentionState::Good) => summary.good += 1,
                    Ok(_) => summary.spam += 1,

                    Err(e) => {
                        error!(key = %mention.key, "Could not triage the mention: {e:#}");
                        summary.failed += 1;
                    }
                }
            }

            info!(
                good = summary.good,
                spam = summary.spam,
                failed = summary.failed,
                "Swept {} queued mention(s)",
                queued.len()
            );

            Ok(summary)
        }
        .instrument(info_span!("sweep"))
        .await
    }

    #[instrument(skip_all, fields(key = %mention.key))]
    async fn triage(&self, mention: &KeyedMention) -> Result<MentionState> {
        let verdict = validate::slow_validate(&self.state, &mention.mention).await;

        let (state, metadata) = match &verdict {
            Verdict::Verified(metadata) => (MentionState::Good, Some(metadata)),

            Verdict::Rejected(rejection) => {
                info!(source = %mention.mention.source, "Marking as spam: {rejection}");

                (MentionState::Spam, None)
            }
        };

        let mut tx = self.state.storage.begin().await?;

        if !tx.apply_verdict(&mention.key, state, metadata).await? {
            warn!("The mention disappeared while it was being verified");
        }

        tx.commit().await?;

        Ok(state)
    }
}

/// Sets a mention's state directly, bypassing verification.
///
/// Returns `false` if there is no mention with this key.
#[instrument(skip(state))]
pub async fn override_state(state: &State, key: &str, new_state: MentionState) -> Result<bool> {
    let mut tx = state.storage.begin().await?;
    let updated = tx.update_state(key, new_state).await?;
    tx.commit().await?;

    if updated {
        info!("Manually marked the mention as {new_state}");
    }

    Ok(updated)
}
