use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Result};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::mention::{KeyedMention, Mention, MentionState};
use crate::server::convert_errors;
use crate::state::State as AppState;
use crate::storage::MentionFilter;
use crate::triage;

use super::responses::{AdminError, InvalidRequest, InvalidState, MentionNotFound};

const DEFAULT_TRIAGE_PAGE_SIZE: u32 = 20;
const MAX_TRIAGE_PAGE_SIZE: u32 = 200;

type HmacSha256 = Hmac<Sha256>;

/// Compares a presented admin token with the configured one in constant time.
///
/// Both tokens go through HMAC-SHA256 first, so neither their contents nor their lengths show in
/// the timing.
fn tokens_match(expected: &str, provided: &str) -> bool {
    let mac = |token: &str| {
        HmacSha256::new_from_slice(expected.as_bytes()).map(|mut mac| {
            mac.update(token.as_bytes());
            mac
        })
    };

    let (Ok(expected_mac), Ok(provided_mac)) = (mac(expected), mac(provided)) else {
        return false;
    };

    provided_mac
        .verify_slice(&expected_mac.finalize().into_bytes())
        .is_ok()
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AdminError> {
    let Some(token) = &state.cfg.admin_token else {
        return Err(AdminError::Disabled);
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if !provided.is_some_and(|provided| tokens_match(token, provided)) {
        warn!("Rejected a request with an invalid admin token");

        return Err(AdminError::Unauthorized);
    }

    Ok(())
}

#[derive(Deserialize, Debug, Clone)]
pub struct Submission {
    #[serde(default)]
    source: String,

    #[serde(default)]
    target: String,
}

pub async fn submit_webmention(
    State(state): State<AppState>,
    Form(submission): Form<Submission>,
) -> Result<StatusCode> {
    let mention = Mention::new(submission.source, submission.target, state.clock.now());

    if let Err(violation) = mention.fast_validate(&state.cfg.site_domain) {
        info!(
            source = %mention.source,
            target = %mention.target,
            rule = violation.rule(),
            "Refused a webmention"
        );

        return Err(InvalidRequest(violation).into());
    }

    let key = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let key = tx.upsert_mention(&mention).await?;
        tx.commit().await?;

        Ok(key)
    })
    .await?;

    info!(%key, source = %mention.source, target = %mention.target, "Queued a webmention");

    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize, Debug, Clone)]
pub struct TargetQuery {
    target: String,
}

async fn mentions_of(
    state: &AppState,
    target: &str,
    filter: MentionFilter,
) -> Result<Json<Vec<Mention>>> {
    let mentions = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let mentions = tx.get_mentions(target, filter).await?;
        tx.commit().await?;

        Ok(mentions)
    })
    .await?;

    Ok(Json(mentions))
}

pub async fn get_mentions(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> Result<Json<Vec<Mention>>> {
    mentions_of(&state, &query.target, MentionFilter::Good).await
}

pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse> {
    let png = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let png = tx.get_thumbnail(&hash).await?;
        tx.commit().await?;

        Ok(png)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

pub async fn get_all_mentions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TargetQuery>,
) -> Result<Json<Vec<Mention>>> {
    authorize(&state, &headers)?;

    mentions_of(&state, &query.target, MentionFilter::All).await
}

pub async fn get_queued(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<KeyedMention>>> {
    authorize(&state, &headers)?;

    let mentions = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let mentions = tx.get_queued().await?;
        tx.commit().await?;

        Ok(mentions)
    })
    .await?;

    Ok(Json(mentions))
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Serialize, Debug, Clone)]
pub struct TriagePage {
    mentions: Vec<KeyedMention>,

    /// Where the next page starts; absent after the last page.
    next_offset: Option<u32>,
}

pub async fn get_triage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<TriagePage>> {
    authorize(&state, &headers)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRIAGE_PAGE_SIZE)
        .clamp(1, MAX_TRIAGE_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let mentions = convert_errors(async {
        let mut tx = state.storage.begin().await?;
        let mentions = tx.get_triage(limit, offset).await?;
        tx.commit().await?;

        Ok(mentions)
    })
    .await?;

    let next_offset = (mentions.len() as u32 == limit).then_some(offset.saturating_add(limit));
    debug!(offset, limit, count = mentions.len(), "Serving a triage page");

    Ok(Json(TriagePage {
        mentions,
        next_offset,
    }))
}

#[derive(Deserialize, Debug, Clone)]
pub struct StateUpdate {
    key: String,
    value: String,
}

pub async fn update_mention(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<StateUpdate>,
) -> Result<StatusCode> {
    authorize(&state, &headers)?;

    let new_state = update
        .value
        .parse::<MentionState>()
        .map_err(InvalidState)?;

    let found = convert_errors(triage::override_state(&state, &update.key, new_state)).await?;

    if !found {
        return Err(MentionNotFound { key: update.key }.into());
    }

    Ok(StatusCode::OK)
}
