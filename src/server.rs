use std::sync::Arc;
use axum::{routing::{get, post}, Router, Json};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;
use crate::error::{Result, WhereaboutsError};
use crate::tracker::Tracker;

#[derive(Deserialize)]
pub struct BeaconQuery {
    #[serde(rename = "macAddress", default)]
    pub mac_address: String,
    /// Comma separated signal strengths; absent or empty when nothing was seen.
    #[serde(default)]
    pub rssi: Option<String>,
}

#[derive(Deserialize)]
pub struct BootQuery {
    #[serde(rename = "macAddress", default)]
    pub mac_address: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Parses a comma separated list of signal strengths. Trailing commas and
/// surrounding whitespace are ignored.
pub fn parse_signals(raw: Option<&str>) -> Result<Vec<i32>> {
    let raw = raw.unwrap_or("").trim().trim_end_matches(',');
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|value| {
            let value = value.trim();
            value
                .parse::<i32>()
                .map_err(|_| WhereaboutsError::InvalidReading { value: value.to_string() })
        })
        .collect()
}

pub fn router(tracker: Arc<Tracker>) -> Router {
    let beacon_tracker = Arc::clone(&tracker);
    let boot_tracker = tracker;
    Router::new()
        .route("/", get(|| async { StatusCode::OK }))
        .route("/beacon", post(move |Query(query): Query<BeaconQuery>| {
            let tracker = Arc::clone(&beacon_tracker);
            async move {
                if query.mac_address.is_empty() {
                    return StatusCode::BAD_REQUEST.into_response();
                }
                let outcome = match parse_signals(query.rssi.as_deref()) {
                    Ok(samples) => tracker
                        .submit_readings(&query.mac_address, samples)
                        .await
                        .map(|_| ()),
                    Err(e) => Err(e),
                };
                respond(outcome)
            }
        }))
        .route("/notify/boot", post(move |Query(query): Query<BootQuery>| {
            let tracker = Arc::clone(&boot_tracker);
            async move {
                if query.mac_address.is_empty() {
                    return StatusCode::BAD_REQUEST.into_response();
                }
                respond(tracker.report_boot(&query.mac_address).await.map(|_| ()))
            }
        }))
        .layer(TraceLayer::new_for_http())
}

fn respond(outcome: Result<()>) -> Response {
    match outcome {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let msg = format!("{e}");
            warn!(%msg, code=%status.as_u16(), "request failed");
            (status, Json(ErrorResponse { error: msg })).into_response()
        }
    }
}
