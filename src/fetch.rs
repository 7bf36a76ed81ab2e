use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Url};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("webmentiond/", env!("CARGO_PKG_VERSION"));

pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .timeout(TOTAL_TIMEOUT)
        .build()
        .context("could not create an HTTP client")
}

/// A successfully fetched document.
#[derive(Debug, Clone)]
pub struct Page {
    /// The URL the body was served from, after redirects.
    pub url: Url,
    pub body: String,
}

pub async fn get_page(client: &Client, url: &str) -> Result<Page> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(Into::into)
        .and_then(|r| r.error_for_status().context("server returned an error"))
        .with_context(|| anyhow!("could not fetch `{url}`"))?;
    let final_url = response.url().clone();
    let body = response
        .text()
        .await
        .with_context(|| anyhow!("could not read the response when fetching `{url}`"))?;

    Ok(Page {
        url: final_url,
        body,
    })
}

pub async fn get_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(Into::into)
        .and_then(|r| r.error_for_status().context("server returned an error"))
        .with_context(|| anyhow!("could not fetch `{url}`"))?;
    let body = response
        .bytes()
        .await
        .with_context(|| anyhow!("could not read the response when fetching `{url}`"))?;

    Ok(body.to_vec())
}
