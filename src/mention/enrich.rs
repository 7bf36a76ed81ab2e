//! Locating the `h-entry` that describes a mention's source page.
//!
//! The whole item tree is searched depth-first. An entry is a candidate unless it names a `url`
//! other than the source. The first candidate in document order supplies the metadata; later
//! candidates (typically nested replies or quotations) are ignored.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::mention::Metadata;
use crate::microformats::{Document, Item};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Found {
    /// Everything but the thumbnail, which the caller derives from `photo`.
    pub metadata: Metadata,

    /// The author's photo URL.
    pub photo: Option<String>,
}

pub fn find_entry(source: &str, document: &Document) -> Option<Found> {
    let mut found = None;
    let mut stack = document.items.iter().rev().collect::<Vec<&Item>>();

    while let Some(item) = stack.pop() {
        stack.extend(item.children.iter().rev());

        if !item.has_type("h-entry") {
            continue;
        }

        if let Some(url) = item.first_text("url").filter(|url| *url != source) {
            trace!(%url, "Skipping an entry describing another page");
            continue;
        }

        if found.is_some() {
            debug!("Ignoring an additional matching entry");
            continue;
        }

        found = Some(extract(item));
    }

    found
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn extract(entry: &Item) -> Found {
    let published = entry.first_text("published").and_then(|published| {
        OffsetDateTime::parse(published.trim(), &Rfc3339)
            .inspect_err(|e| debug!(%published, "Could not parse the publication date: {e}"))
            .ok()
    });

    let mut found = Found {
        metadata: Metadata {
            title: non_empty(entry.first_text("name")),
            published,
            ..Default::default()
        },
        photo: None,
    };

    if let Some(author) = entry.items("author").next() {
        found.metadata.author =
            non_empty(author.value.as_deref()).or_else(|| non_empty(author.first_text("name")));
        found.metadata.author_url = non_empty(author.first_text("url"));
        found.photo = non_empty(author.first_text("photo"));

        if found.photo.is_none() {
            debug!("The author has no photo");
        }
    }

    found
}
