//! HTTP boundary: lead-id extraction from amoCRM webhook payloads and the
//! mapping of pipeline outcomes onto transport responses.
//!
//! amoCRM delivers status-change webhooks either as JSON or as an
//! urlencoded form; both shapes are accepted.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::AppError;
use crate::processing::pipeline::{handle_deal_event, PipelineOutcome};
use crate::services::telegram_service;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON payloads: `leads.status[0].id` (or `leads.status_leads[0].id`),
/// falling back to a top-level `lead_id`.
fn extract_lead_id_from_json(body: &Value) -> Option<i64> {
    if let Some(leads) = body.get("leads") {
        let status_items = leads
            .get("status")
            .or_else(|| leads.get("status_leads"))
            .and_then(Value::as_array);
        if let Some(first) = status_items.and_then(|items| items.first()) {
            if let Some(id) = first.get("id") {
                return value_as_i64(id);
            }
        }
    }
    body.get("lead_id").and_then(value_as_i64)
}

/// Form payloads: the first `leads[status]…[id]` key, else `lead_id`.
fn extract_lead_id_from_form(pairs: &[(String, String)]) -> Option<i64> {
    for (key, value) in pairs {
        if key.ends_with("[id]") && key.contains("leads[status]") {
            return value.trim().parse().ok();
        }
    }
    pairs
        .iter()
        .find(|(key, _)| key == "lead_id")
        .and_then(|(_, value)| value.trim().parse().ok())
}

fn extract_lead_id(headers: &HeaderMap, body: &Bytes) -> Option<i64> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.contains("json") {
        let parsed: Value = serde_json::from_slice(body).ok()?;
        extract_lead_id_from_json(&parsed)
    } else {
        let pairs: Vec<(String, String)> =
            url::form_urlencoded::parse(body).into_owned().collect();
        extract_lead_id_from_form(&pairs)
    }
}

fn outcome_response(lead_id: i64, outcome: PipelineOutcome) -> Response {
    match outcome {
        PipelineOutcome::Success {
            receipt_id,
            receipt_number,
            profile_id,
        } => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "lead_id": lead_id,
                "profile_id": profile_id,
                "receipt_id": receipt_id,
                "receipt_number": receipt_number,
            })),
        )
            .into_response(),
        PipelineOutcome::AlreadyProcessed => {
            (StatusCode::OK, Json(json!({"status": "already_processed"}))).into_response()
        }
        PipelineOutcome::SkippedByStatus => {
            (StatusCode::OK, Json(json!({"status": "skipped_by_status"}))).into_response()
        }
        PipelineOutcome::MaintenanceWindow => {
            (StatusCode::OK, Json(json!({"status": "maintenance_window"}))).into_response()
        }
        PipelineOutcome::ClientError { message } => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
        }
        PipelineOutcome::ServerError { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": message})),
        )
            .into_response(),
    }
}

pub async fn post_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let Some(lead_id) = extract_lead_id(&headers, &body) else {
        error!("webhook.lead_id_not_found");
        telegram_service::notify(
            &state,
            "❌ Вебхук AmoCRM: не удалось получить ID сделки",
            None,
        )
        .await;
        return Err(AppError::validation("lead_id not found"));
    };
    info!("webhook.received lead_id={}", lead_id);

    // One deal per event, processed to completion before responding.
    let outcome = handle_deal_event(&state, lead_id).await;
    Ok(outcome_response(lead_id, outcome))
}
