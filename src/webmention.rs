//! The sending side of the Webmention protocol: endpoint discovery and notification.

use anyhow::{anyhow, Context, Result};
use reqwest::header::{CONTENT_TYPE, LINK};
use reqwest::{Client, StatusCode, Url};
use scraper::{Html, Selector};
use tracing::{debug, trace};

const REL: &str = "webmention";
const ENDPOINT_SELECTOR: &str = "link[rel][href], a[rel][href]";

/// Looks up the Webmention endpoint advertised by `target`.
///
/// `Link` headers take precedence over `<link>` and `<a>` elements. Returns `Ok(None)` if the
/// target doesn't advertise an endpoint.
pub async fn discover_endpoint(client: &Client, target: &str) -> Result<Option<Url>> {
    let response = client
        .get(target)
        .send()
        .await
        .map_err(Into::into)
        .and_then(|r| r.error_for_status().context("server returned an error"))
        .with_context(|| anyhow!("could not fetch `{target}`"))?;
    let base = response.url().clone();

    let from_header = response
        .headers()
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(endpoint_from_link_header);

    if let Some(href) = from_header {
        trace!(%href, "Found an endpoint in the Link header");

        return resolve(&base, &href).map(Some);
    }

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(true, |content_type| content_type.contains("html"));

    if !is_html {
        debug!("The target is not an HTML document");

        return Ok(None);
    }

    let body = response
        .text()
        .await
        .with_context(|| anyhow!("could not read the response when fetching `{target}`"))?;

    match endpoint_from_html(&body)? {
        Some(href) => {
            trace!(%href, "Found an endpoint in the document");

            resolve(&base, &href).map(Some)
        }

        None => Ok(None),
    }
}

/// Notifies `endpoint` that `source` links to `target`.
pub async fn send(client: &Client, endpoint: &Url, source: &str, target: &str) -> Result<StatusCode> {
    let response = client
        .post(endpoint.clone())
        .form(&[("source", source), ("target", target)])
        .send()
        .await
        .map_err(Into::into)
        .and_then(|r| r.error_for_status().context("endpoint returned an error"))
        .with_context(|| anyhow!("could not send a webmention to `{endpoint}`"))?;

    Ok(response.status())
}

fn resolve(base: &Url, href: &str) -> Result<Url> {
    base.join(href.trim())
        .with_context(|| anyhow!("invalid endpoint URL `{href}`"))
}

fn has_rel(rels: &str) -> bool {
    rels.split_ascii_whitespace()
        .any(|rel| rel.eq_ignore_ascii_case(REL))
}

fn endpoint_from_html(html: &str) -> Result<Option<String>> {
    let selector = Selector::parse(ENDPOINT_SELECTOR)
        .map_err(|e| anyhow!("could not parse the endpoint selector: {e:?}"))?;
    let document = Html::parse_document(html);

    let href = document
        .select(&selector)
        .map(|element| element.value())
        .find(|element| element.attr("rel").is_some_and(has_rel))
        .and_then(|element| element.attr("href"))
        .map(String::from);

    Ok(href)
}

/// Extracts the first URL with a `webmention` relation from a `Link` header value.
fn endpoint_from_link_header(value: &str) -> Option<String> {
    let mut rest = value;

    while let Some(start) = rest.find('<') {
        let end = start + rest[start..].find('>')?;
        let href = &rest[start + 1..end];
        rest = &rest[end + 1..];

        let params_end = unquoted_comma(rest).unwrap_or(rest.len());
        let params = &rest[..params_end];
        rest = &rest[params_end..];

        let matches = params.split(';').any(|param| {
            let Some((name, value)) = param.split_once('=') else {
                return false;
            };

            name.trim().eq_ignore_ascii_case("rel") && has_rel(value.trim().trim_matches('"'))
        });

        if matches {
            return Some(href.into());
        }
    }

    None
}

fn unquoted_comma(s: &str) -> Option<usize> {
    let mut quoted = false;

    for (idx, c) in s.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return Some(idx),
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::header;
    use axum::response::{Html as HtmlResponse, IntoResponse};
    use axum::routing::{get, post};
    use axum::{Form, Router};

    use super::*;
    use crate::testing;

    #[test]
    fn link_header_variants() {
        assert_eq!(
            endpoint_from_link_header(r#"<https://a.example/wm>; rel="webmention""#).as_deref(),
            Some("https://a.example/wm")
        );
        assert_eq!(
            endpoint_from_link_header(
                r#"<https://a.example/hub>; rel="hub", </wm?a=1,2>; rel="other webmention""#
            )
            .as_deref(),
            Some("/wm?a=1,2")
        );
        assert_eq!(
            endpoint_from_link_header("<https://a.example/wm>; rel=WebMention").as_deref(),
            Some("https://a.example/wm")
        );
        assert_eq!(
            endpoint_from_link_header(r#"<https://a.example/>; rel="webmentions""#),
            None
        );
    }

    #[test]
    fn first_html_endpoint_wins() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="webmention" href="/first">
            </head><body><a rel="webmention" href="/second">wm</a></body></html>"#;

        assert_eq!(endpoint_from_html(html).unwrap().as_deref(), Some("/first"));
        assert_eq!(endpoint_from_html("<p>nothing</p>").unwrap(), None);
    }

    #[tokio::test]
    async fn discovers_and_sends() {
        let received = Arc::new(Mutex::new(vec![]));

        let app = Router::new()
            .route(
                "/header",
                get(|| async {
                    ([(header::LINK, r#"</endpoint>; rel="webmention""#)], "hi").into_response()
                }),
            )
            .route(
                "/html",
                get(|| async {
                    HtmlResponse(r#"<link rel="webmention" href="endpoint?from=html">"#)
                }),
            )
            .route("/empty-href", get(|| async { HtmlResponse(r#"<link rel="webmention" href="">"#) }))
            .route("/plain", get(|| async { HtmlResponse("<p>no endpoint</p>") }))
            .route(
                "/endpoint",
                post(
                    |State(received): State<Arc<Mutex<Vec<(String, String)>>>>,
                     Form(form): Form<std::collections::HashMap<String, String>>| async move {
                        received
                            .lock()
                            .unwrap()
                            .push((form["source"].clone(), form["target"].clone()));
                        axum::http::StatusCode::ACCEPTED
                    },
                ),
            )
            .with_state(received.clone());
        let base = testing::serve(app).await;
        let client = Client::new();

        let endpoint = discover_endpoint(&client, &format!("{base}/header"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint.as_str(), format!("{base}/endpoint"));

        let from_html = discover_endpoint(&client, &format!("{base}/html"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from_html.as_str(), format!("{base}/endpoint?from=html"));

        let itself = discover_endpoint(&client, &format!("{base}/empty-href"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(itself.as_str(), format!("{base}/empty-href"));

        assert!(discover_endpoint(&client, &format!("{base}/plain"))
            .await
            .unwrap()
            .is_none());
        assert!(discover_endpoint(&client, &format!("{base}/missing"))
            .await
            .is_err());

        let status = send(&client, &endpoint, "https://me.example/post", "https://you.example/")
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(
            *received.lock().unwrap(),
            vec![("https://me.example/post".to_owned(), "https://you.example/".to_owned())]
        );
    }
}
