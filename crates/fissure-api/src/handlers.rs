//! REST endpoint handlers for the fissure gateway.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/fissures` | Long-poll for a filtered fissure list |
//! | `GET` | `/fissures/current` | Filtered fissure list, never waits |
//! | `GET` | `/status` | Snapshot and waiter counters |

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use fissure_core::config::LongPollConfig;
use fissure_core::{FilterCriteria, FilteredView};
use fissure_types::{FissureId, FissureIdSet};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Query parameters shared by the `/fissures` endpoints.
///
/// Every field is taken as raw text so that an empty `knownIds=` can be
/// told apart from an absent one, and so malformed values produce a JSON
/// 400 from [`ApiError`].
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FissureQuery {
    /// Comma-separated mission types. Empty or absent matches all.
    #[serde(alias = "missionType")]
    pub mission_types: Option<String>,
    /// `true` or `false`. Absent matches both.
    pub is_hard: Option<String>,
    /// Comma-separated IDs the client already holds. Absent on the first
    /// request; present and empty when the client holds no fissures.
    pub known_ids: Option<String>,
    /// Long-poll timeout in seconds.
    pub timeout: Option<String>,
}

/// A validated [`FissureQuery`].
#[derive(Debug)]
pub struct PollRequest {
    /// Filter to apply.
    pub criteria: FilterCriteria,
    /// IDs the client already holds, if any were sent.
    pub known_ids: Option<FissureIdSet>,
    /// How long to wait before answering with the current view.
    pub timeout: Duration,
}

impl FissureQuery {
    /// Validate the raw parameters against `limits`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidQuery`] for a non-boolean `isHard`, a
    /// non-numeric `timeout`, or more mission types or known IDs than
    /// `limits` allows.
    pub fn validate(&self, limits: &LongPollConfig) -> Result<PollRequest, ApiError> {
        let mission_types = split_list(self.mission_types.as_deref());
        if mission_types.len() > limits.max_mission_types {
            return Err(ApiError::InvalidQuery(format!(
                "too many mission types: {} (max {})",
                mission_types.len(),
                limits.max_mission_types
            )));
        }

        let is_hard = parse_is_hard(self.is_hard.as_deref())?;

        let known_ids = match self.known_ids.as_deref() {
            None => None,
            Some(raw) => {
                let ids: FissureIdSet = split_list(Some(raw))
                    .into_iter()
                    .map(FissureId::from)
                    .collect();
                if ids.len() > limits.max_known_ids {
                    return Err(ApiError::InvalidQuery(format!(
                        "too many known ids: {} (max {})",
                        ids.len(),
                        limits.max_known_ids
                    )));
                }
                Some(ids)
            }
        };

        let requested = match self.timeout.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                ApiError::InvalidQuery(format!(
                    "timeout must be a whole number of seconds: {raw} ({e})"
                ))
            })?),
        };

        Ok(PollRequest {
            criteria: FilterCriteria::new(mission_types, is_hard),
            known_ids,
            timeout: limits.timeout_for(requested),
        })
    }
}

/// Split a comma-separated list, dropping blank entries.
fn split_list(raw: Option<&str>) -> Vec<&str> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_is_hard(raw: Option<&str>) -> Result<Option<bool>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(value) => Err(ApiError::InvalidQuery(format!(
            "isHard must be true or false: {value}"
        ))),
    }
}

fn view_body(resolution: &str, view: &FilteredView) -> serde_json::Value {
    serde_json::json!({
        "resolution": resolution,
        "count": view.len(),
        "ids": view.ids(),
        "fissures": view.records(),
    })
}

// ---------------------------------------------------------------------------
// GET /fissures -- long-poll
// ---------------------------------------------------------------------------

/// Long-poll for the filtered fissure list.
///
/// Answers at once when `knownIds` is absent or differs from the current
/// result. Otherwise waits until a new snapshot changes the result or the
/// timeout passes. If the client disconnects while waiting, axum drops
/// this future and the waiter is cancelled.
pub async fn poll_fissures(
    State(state): State<Arc<AppState>>,
    params: Result<Query<FissureQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let request = params.validate(&state.limits)?;
    let key = request.criteria.key().clone();

    let outcome = state
        .service
        .long_poll(request.criteria, request.known_ids, request.timeout)
        .await;

    debug!(%key, resolution = outcome.label(), count = outcome.view().len(), "long-poll answered");
    Ok(Json(view_body(outcome.label(), outcome.view())))
}

// ---------------------------------------------------------------------------
// GET /fissures/current -- immediate read
// ---------------------------------------------------------------------------

/// Return the filtered fissure list without waiting. `knownIds` and
/// `timeout` are validated but otherwise ignored.
pub async fn current_fissures(
    State(state): State<Arc<AppState>>,
    params: Result<Query<FissureQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let request = params.validate(&state.limits)?;
    let view = state.service.get_immediate(&request.criteria);
    Ok(Json(view_body("immediate", &view)))
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

/// Snapshot epoch, record count, waiter and cache counters.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.status())
}
