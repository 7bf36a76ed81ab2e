mod cli;
mod clock;
mod config;
mod feed;
mod fetch;
mod links;
mod mention;
mod microformats;
mod outbound;
mod photo;
mod server;
mod state;
mod storage;
mod triage;
mod webmention;

#[cfg(test)]
mod testing;

use std::process::ExitCode;

use anyhow::Result;
use cli::Args;
use outbound::Outbound;
use server::Server;
use state::State;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use triage::Sweeper;

fn set_up_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_regex(false)
                .with_default_directive(Level::INFO.into())
                .with_env_var("WEBMENTIOND_LOG")
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logging();

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();

        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Could not listen for Ctrl-C: {e}");
            }

            cancel.cancel();
        }
    });

    let mut tasks = match start(cancel.clone()).await {
        Ok(tasks) => tasks,

        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut exit_code = ExitCode::SUCCESS;

    while let Some(task_result) = tasks.join_next().await {
        cancel.cancel();

        match task_result {
            Ok(Ok(())) => {}

            Ok(Err(e)) => {
                error!("{e:#}");
                exit_code = ExitCode::FAILURE;
            }

            Err(e) => {
                error!("A task failed: {e}");
                exit_code = ExitCode::FAILURE;
            }
        }
    }

    exit_code
}

async fn start(cancel: CancellationToken) -> Result<JoinSet<Result<()>>> {
    let mut args = Args::parse();
    let config_paths = args
        .config_path
        .take()
        .into_iter()
        .chain([
            "./webmentiond.toml".into(),
            "/etc/webmentiond.toml".into(),
        ])
        .collect::<Vec<_>>();
    let mut config = config::load(&config_paths)?;
    config.update(args);
    let state = State::new(config).await?;

    let server = Server::new(state.clone()).await?;

    let mut tasks = JoinSet::new();
    tasks.spawn(server.serve(cancel.clone()));
    tasks.spawn(Sweeper::new(state.clone()).run(cancel.clone()));

    match state.cfg.feed_path.clone() {
        Some(feed_path) => {
            tasks.spawn(Outbound::new(state, feed_path).run(cancel.clone()));
        }

        None => info!("No feed is configured; outbound webmentions are disabled"),
    }

    Ok(tasks)
}
