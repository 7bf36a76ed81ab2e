mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use take_mut::take;
use tracing::{debug, info};

pub use self::types::*;

fn default_bind_addr() -> String {
    Config::default().bind_addr
}

fn default_db_path() -> PathBuf {
    Config::default().db_path
}

fn default_site_domain() -> String {
    Config::default().site_domain
}

fn default_feed_poll_interval() -> Duration {
    Config::default().feed_poll_interval
}

fn default_sweep_interval() -> Duration {
    Config::default().sweep_interval
}

fn default_dispatch_grace() -> Duration {
    Config::default().dispatch_grace
}

fn default_thumbnail_size() -> u32 {
    Config::default().thumbnail_size
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// The host name inbound mentions must target.
    #[serde(default = "default_site_domain")]
    pub site_domain: String,

    /// The Atom feed whose entries are scanned for outbound links.
    /// Outbound dispatch is disabled if unset.
    pub feed_path: Option<PathBuf>,

    #[serde(default = "default_feed_poll_interval")]
    pub feed_poll_interval: Duration,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    /// How much newer than the last dispatch an entry must be to be dispatched again.
    #[serde(default = "default_dispatch_grace")]
    pub dispatch_grace: Duration,

    /// Bearer token for the triage routes. The routes are disabled without one.
    pub admin_token: Option<String>,

    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

impl Config {
    pub fn update(&mut self, args: crate::cli::Args) {
        fn set_if_some<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set_if_some(&mut self.bind_addr, args.bind_addr);
        set_if_some(&mut self.db_path, args.db_path);
        set_if_some(&mut self.site_domain, args.site_domain);
        set_if_some(&mut self.feed_path, args.feed_path.map(Some));
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // destructure everything so that new path fields can't be forgotten here.
        take(self, |this| {
            let Self {
                bind_addr,
                db_path,
                site_domain,
                feed_path,
                feed_poll_interval,
                sweep_interval,
                dispatch_grace,
                admin_token,
                thumbnail_size,
            } = this;

            Self {
                bind_addr,
                db_path: config_dir.join(db_path),
                site_domain,
                feed_path: feed_path.map(|path| config_dir.join(path)),
                feed_poll_interval,
                sweep_interval,
                dispatch_grace,
                admin_token,
                thumbnail_size,
            }
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:8000".into(),
            db_path: "./webmentiond.sqlite3".into(),
            site_domain: "example.org".into(),
            feed_path: None,
            feed_poll_interval: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            dispatch_grace: Duration::from_secs(1),
            admin_token: None,
            thumbnail_size: 32,
        }
    }
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    info!("Using the default config");

    Ok(Default::default())
}
