//! Checkbox fiscal client: cashier sign-in, shift control and sale receipts.
//!
//! Every receipt attempt runs the full sign-in → ensure-shift → submit
//! sequence; no token or shift state is cached between attempts.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::FiscalProfile;
use crate::error::{AppError, Result};
use crate::models::checkbox::{
    Delivery, Payment, ReceiptDiscount, ReceiptGood, ReceiptIssued, SellReceiptRequest,
    SignInRequest, SignInResponse, SellReceiptResponse,
};
use crate::state::AppState;

const SERVICE: &str = "checkbox";
const CHECKBOX_TIMEOUT: Duration = Duration::from_secs(5);

/// Known provider phrasings for a shift that is already open (or held by
/// another cashier). Matching is substring, case-insensitive. Fragile by
/// nature; the provider exposes no structured code for this condition.
pub const SHIFT_ALREADY_OPEN_MARKERS: [&str; 3] =
    ["already", "вже працює", "зайнята іншим касиром"];

pub fn is_shift_already_open_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    SHIFT_ALREADY_OPEN_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(message) = map.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    body.chars().take(500).collect()
}

async fn checkbox_post<T: DeserializeOwned, B: Serialize>(
    state: &AppState,
    path: &str,
    token: Option<&str>,
    license_key: Option<&str>,
    body: &B,
) -> Result<T> {
    let cfg = &state.config.checkbox;
    let url = format!("{}{}", cfg.api_base, path);
    let mut request = state
        .http_client
        .post(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .header("X-Client-Name", &cfg.client_name)
        .header("X-Client-Version", &cfg.client_version)
        .timeout(CHECKBOX_TIMEOUT)
        .json(body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    if let Some(license_key) = license_key {
        request = request.header("X-License-Key", license_key);
    }

    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        let message = error_message(&text);
        error!(
            "checkbox.error status={} message={}",
            status.as_u16(),
            message
        );
        return Err(AppError::upstream(SERVICE, status.as_u16(), message));
    }
    Ok(serde_json::from_str(&text)?)
}

/// Authenticates one cashier profile and returns the bearer token.
pub async fn sign_in(state: &AppState, profile: &FiscalProfile) -> Result<String> {
    debug!("checkbox.signin.start profile_id={}", profile.id);
    let body = SignInRequest {
        login: profile.login.clone(),
        password: profile.password.clone(),
    };
    let response: SignInResponse = checkbox_post(state, "/cashier/signin", None, None, &body).await?;
    match response.token() {
        Some(token) => {
            debug!("checkbox.signin.ok profile_id={}", profile.id);
            Ok(token.to_string())
        }
        None => Err(AppError::fiscal_auth("no token in response")),
    }
}

pub async fn open_shift(
    state: &AppState,
    token: &str,
    profile: &FiscalProfile,
) -> Result<Value> {
    checkbox_post(
        state,
        "/shifts",
        Some(token),
        Some(&profile.license_key),
        &json!({}),
    )
    .await
}

pub async fn close_shift(
    state: &AppState,
    token: &str,
    profile: &FiscalProfile,
) -> Result<Value> {
    checkbox_post(
        state,
        "/shifts/close",
        Some(token),
        Some(&profile.license_key),
        &json!({}),
    )
    .await
}

/// Opens the profile's shift, treating the provider's "already open" family
/// of errors as success. Anything else is a shift failure.
pub async fn ensure_shift(state: &AppState, token: &str, profile: &FiscalProfile) -> Result<()> {
    match open_shift(state, token, profile).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let message = e.to_string();
            if is_shift_already_open_message(&message) {
                debug!("checkbox.ensure_shift.already_open profile_id={}", profile.id);
                return Ok(());
            }
            Err(AppError::fiscal_shift(message))
        }
    }
}

/// Submits one sale receipt. The single payment covers total minus discount;
/// a discount entry is attached only when non-zero, an email delivery block
/// only when enabled and an address is known.
pub async fn create_sell_receipt(
    state: &AppState,
    token: &str,
    profile: &FiscalProfile,
    goods: Vec<ReceiptGood>,
    total_minor: i64,
    discount_minor: i64,
    email: Option<&str>,
) -> Result<SellReceiptResponse> {
    let cfg = &state.config.checkbox;
    let payments_value = (total_minor - discount_minor.max(0)).max(0);
    let body = SellReceiptRequest {
        goods,
        payments: vec![Payment {
            payment_type: cfg.payment_type.clone(),
            value: payments_value,
            label: "Оплата".to_string(),
        }],
        discounts: (discount_minor > 0).then(|| {
            vec![ReceiptDiscount {
                discount_type: "DISCOUNT".to_string(),
                mode: "VALUE".to_string(),
                value: discount_minor,
                name: "Знижка з AmoCRM".to_string(),
            }]
        }),
        delivery: match email {
            Some(email) if cfg.send_email && !email.is_empty() => Some(Delivery {
                emails: vec![email.to_string()],
            }),
            _ => None,
        },
    };

    checkbox_post(
        state,
        "/receipts/sell",
        Some(token),
        Some(&profile.license_key),
        &body,
    )
    .await
    .map_err(|e| match e {
        AppError::Upstream { message, .. } => AppError::fiscal_submit(message),
        other => other,
    })
}

/// Full per-receipt session: sign in, assert an open shift, submit the sale.
pub async fn issue_receipt(
    state: &AppState,
    profile: &FiscalProfile,
    goods: Vec<ReceiptGood>,
    total_minor: i64,
    discount_minor: i64,
    email: Option<&str>,
) -> Result<ReceiptIssued> {
    let token = sign_in(state, profile).await?;
    ensure_shift(state, &token, profile).await?;
    info!(
        "checkbox.create_receipt.start profile_id={} total_minor={} discount_minor={}",
        profile.id, total_minor, discount_minor
    );
    let response =
        create_sell_receipt(state, &token, profile, goods, total_minor, discount_minor, email)
            .await?;
    let issued = ReceiptIssued {
        receipt_id: response.receipt_id(),
        receipt_number: response.receipt_number(),
    };
    info!(
        "checkbox.create_receipt.done profile_id={} receipt_id={} number={}",
        profile.id, issued.receipt_id, issued.receipt_number
    );
    Ok(issued)
}
