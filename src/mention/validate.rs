//! Confirming that a mention's source page really links to its target.

use std::fmt::{self, Display};

use reqwest::Url;
use tracing::{debug, info, instrument};

use crate::fetch;
use crate::mention::enrich::{self, Found};
use crate::mention::{thumbnail, Mention, Metadata};
use crate::microformats;
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The source links to the target; carries whatever we could learn about the source.
    Verified(Metadata),

    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The source could not be fetched.
    Unreachable,

    /// The source could not be searched for links.
    Unreadable,

    /// The source does not link to the target.
    LinkMissing,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "the source could not be fetched"),
            Self::Unreadable => write!(f, "the source could not be searched for links"),
            Self::LinkMissing => write!(f, "the source does not link to the target"),
        }
    }
}

/// Fetches the source and checks that the target appears among its links.
///
/// Links and the target are compared as parsed URLs, so host case and default ports don't matter.
///
/// A rejection is final: nothing is retried.
#[instrument(level = "DEBUG", skip_all, fields(source = %mention.source, target = %mention.target))]
pub async fn slow_validate(state: &State, mention: &Mention) -> Verdict {
    let page = match fetch::get_page(&state.http_client, &mention.source).await {
        Ok(page) => page,

        Err(e) => {
            info!("Could not fetch the source: {e:#}");

            return Verdict::Rejected(Rejection::Unreachable);
        }
    };

    if page.url.as_str() != mention.source {
        debug!(final_url = %page.url, "The source redirected");
    }

    let links = match state.links.discover(&page.body, &mention.source) {
        Ok(links) => links,

        Err(e) => {
            info!("Could not discover the source's links: {e:#}");

            return Verdict::Rejected(Rejection::Unreadable);
        }
    };

    let target = Url::parse(&mention.target).ok();
    let links_to_target = target.is_some_and(|target| {
        links
            .iter()
            .any(|link| Url::parse(link).is_ok_and(|link| link == target))
    });

    if !links_to_target {
        debug!(link_count = links.len(), "The target is not among the source's links");

        return Verdict::Rejected(Rejection::LinkMissing);
    }

    let Found {
        mut metadata,
        photo,
    } = describe(&mention.source, &page.body);

    if let Some(photo) = photo {
        metadata.thumbnail = thumbnail::derive(state, &photo).await;
    }

    Verdict::Verified(metadata)
}

fn describe(source: &str, html: &str) -> Found {
    let Ok(base) = Url::parse(source) else {
        return Found::default();
    };

    let document = microformats::parse(html, &base);

    enrich::find_entry(source, &document).unwrap_or_else(|| {
        debug!("The source has no matching h-entry");

        Found::default()
    })
}
