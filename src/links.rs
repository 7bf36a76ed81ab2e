use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use scraper::{Html, Selector};

const LINK_SELECTOR: &str = "a[href], img[src], video[src], audio[src]";

/// Finds the absolute URLs an HTML fragment links to.
pub trait LinkDiscoverer: Send + Sync {
    /// Fails only if `base` can't serve as a base URL.
    fn discover(&self, html: &str, base: &str) -> Result<Vec<String>>;
}

/// Discovers links with an HTML5 parser.
///
/// Only `http` and `https` targets are reported, each once, in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlLinks;

impl LinkDiscoverer for HtmlLinks {
    fn discover(&self, html: &str, base: &str) -> Result<Vec<String>> {
        let base = Url::parse(base).with_context(|| anyhow!("invalid base URL `{base}`"))?;
        let selector = Selector::parse(LINK_SELECTOR)
            .map_err(|e| anyhow!("could not parse the link selector: {e:?}"))?;
        let document = Html::parse_fragment(html);

        let mut seen = HashSet::new();
        let mut links = vec![];

        for element in document.select(&selector) {
            let element = element.value();
            let Some(href) = element.attr("href").or_else(|| element.attr("src")) else {
                continue;
            };
            let Ok(url) = base.join(href.trim()) else {
                continue;
            };

            if !matches!(url.scheme(), "http" | "https") {
                continue;
            }

            let url = String::from(url);

            if seen.insert(url.clone()) {
                links.push(url);
            }
        }

        Ok(links)
    }
}
