//! Reading entries out of the site's Atom feed.
//!
//! Elements are matched by local name, so feeds that omit the Atom namespace are read the same
//! way as those that declare it. Entry values are passed through verbatim; interpreting them
//! (timestamps in particular) is left to the caller.

use sxd_document::parser;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};
use thiserror::Error;
use tracing::debug;

const ENTRY_XPATH: &str = "/*[local-name() = 'feed']/*[local-name() = 'entry']";
const ID_XPATH: &str = "string(*[local-name() = 'id'])";
const LINK_XPATH: &str =
    "string(*[local-name() = 'link'][not(@rel) or @rel = 'alternate'][1]/@href)";
const CONTENT_XPATH: &str = "string(*[local-name() = 'content'])";
const UPDATED_XPATH: &str = "string(*[local-name() = 'updated'])";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("the feed is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("the feed is not well-formed XML: {0}")]
    Malformed(String),

    #[error("could not evaluate `{expr}`: {reason}")]
    Query { expr: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,

    /// The entry's own URL (its `alternate` link).
    pub link: Option<String>,

    /// Unescaped entry body; usually HTML.
    pub content: String,

    /// The raw `updated` value.
    pub updated: String,
}

pub fn parse(bytes: &[u8]) -> Result<Vec<FeedEntry>, ParseError> {
    let xml = std::str::from_utf8(bytes)?;
    let package = parser::parse(xml).map_err(|e| ParseError::Malformed(format!("{e:?}")))?;
    let document = package.as_document();
    let ctx = Context::new();

    let entries = match evaluate(&ctx, ENTRY_XPATH, document.root())? {
        Value::Nodeset(nodes) => nodes.document_order(),
        _ => vec![],
    };
    let mut result = Vec::with_capacity(entries.len());

    for entry in entries {
        let link = evaluate(&ctx, LINK_XPATH, entry)?.into_string();

        result.push(FeedEntry {
            id: evaluate(&ctx, ID_XPATH, entry)?.into_string(),
            link: Some(link).filter(|link| !link.is_empty()),
            content: evaluate(&ctx, CONTENT_XPATH, entry)?.into_string(),
            updated: evaluate(&ctx, UPDATED_XPATH, entry)?.into_string().trim().into(),
        });
    }

    debug!("Parsed {} feed entries", result.len());

    Ok(result)
}

fn evaluate<'d>(
    ctx: &Context<'d>,
    expr: &'static str,
    node: impl Into<Node<'d>>,
) -> Result<Value<'d>, ParseError> {
    let query_error = |reason: String| ParseError::Query { expr, reason };

    let xpath = Factory::new()
        .build(expr)
        .map_err(|e| query_error(format!("{e:?}")))?
        .ok_or_else(|| query_error("no XPath expression was parsed".into()))?;

    xpath
        .evaluate(ctx, node)
        .map_err(|e| query_error(format!("{e:?}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
   <title type="html">BitWorking</title>
   <link href="http://bitworking.org/" />
   <link href="http://bitworking.org/news/feed/" rel="self" />
   <updated>2016-09-12T07:21:48-04:00</updated>
   <id>http://bitworking.org/</id>
   <entry>
     <title type="html">Inertial Balance</title>
     <link href="http://bitworking.org/news/2016/08/interial_balance" />
     <id>http://bitworking.org/news/2016/08/content2</id>
     <updated>2016-08-16T22:42:54-04:00</updated>
     <content type="html">This is the content &lt;a href=&#34;http://example.com&#34;&gt;</content>
   </entry>
   <entry>
     <updated>2016-08-16T14:30:50-04:00</updated>
     <id>http://bitworking.org/news/2016/08/stuff</id>
     <link href="http://bitworking.org/news/2016/08/stuff"/>
     <content type="html">This is stuff</content>
   </entry>
   <entry>
     <updated>2016-08-16T14:30:50-04:00</updated>
     <id>http://bitworking.org/news/2016/09/relative</id>
     <link rel="replies" href="http://bitworking.org/news/2016/08/relative#comments"/>
     <link href="http://bitworking.org/news/2016/08/relative"/>
     <content type="html">This is the content &lt;a href=&#34;sample.js&#34;&gt;</content>
   </entry>
</feed>"#;

    #[test]
    fn parses_entries_in_order() {
        let entries = parse(FEED.as_bytes()).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            FeedEntry {
                id: "http://bitworking.org/news/2016/08/content2".into(),
                link: Some("http://bitworking.org/news/2016/08/interial_balance".into()),
                content: r#"This is the content <a href="http://example.com">"#.into(),
                updated: "2016-08-16T22:42:54-04:00".into(),
            }
        );
        assert_eq!(entries[1].content, "This is stuff");
        assert_eq!(
            entries[2].link.as_deref(),
            Some("http://bitworking.org/news/2016/08/relative")
        );
    }

    #[test]
    fn empty_feed_is_not_an_error() {
        let entries = parse(
            br#"<?xml version="1.0" encoding="utf-8"?><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#,
        )
        .unwrap();

        assert!(entries.is_empty());
    }

    #[test]
    fn feed_without_namespace_is_read() {
        let entries =
            parse(b"<feed><entry><id>a</id><updated>bogus</updated></entry></feed>").unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "a");
        assert_eq!(entries[0].updated, "bogus");
        assert_eq!(entries[0].link, None);
    }

    #[test]
    fn malformed_feeds_are_rejected() {
        assert!(matches!(parse(b""), Err(ParseError::Malformed(_))));
        assert!(matches!(
            parse(b"<feed><entry></feed>"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse(&[0x3c, 0xff, 0xfe]),
            Err(ParseError::Encoding(_))
        ));
    }
}
