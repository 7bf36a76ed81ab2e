use clap::ValueHint;

use std::path::PathBuf;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// By default, webmentiond looks for a file named `webmentiond.toml` in the following
    /// directories (in order):
    ///
    /// - `./` (the current directory)
    /// - `/etc`
    #[arg(
        short,
        env = "WEBMENTIOND_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    /// Address the Webmention endpoint binds to.
    #[arg(long, env = "WEBMENTIOND_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Path to the database file.
    #[arg(long, env = "WEBMENTIOND_DB", value_hint(ValueHint::FilePath))]
    pub db_path: Option<PathBuf>,

    /// Path to the Atom feed scanned for outgoing mentions.
    #[arg(long, env = "WEBMENTIOND_FEED", value_hint(ValueHint::FilePath))]
    pub feed_path: Option<PathBuf>,

    /// Host name that incoming mentions must target.
    #[arg(long, env = "WEBMENTIOND_SITE_DOMAIN")]
    pub site_domain: Option<String>,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
