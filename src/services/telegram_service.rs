//! Operator notifications over the Telegram Bot API.
//!
//! Strictly fire-and-forget: when the bot is not configured the call is a
//! no-op, and delivery failures are logged and swallowed.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error};

use crate::state::AppState;

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct SendMessageRequest {
    chat_id: String,
    text: String,
    parse_mode: String,
}

/// Human label for a fiscal profile: the sender name of the matching courier
/// account, else the bare profile id.
pub fn resolve_sender_label(state: &AppState, profile_id: &str) -> String {
    state.config.nova_poshta.sender_label(profile_id)
}

/// Sends an HTML-formatted message to the operator chat, optionally prefixed
/// with the profile's sender label.
pub async fn notify(state: &AppState, text: &str, profile_id: Option<&str>) {
    let cfg = &state.config.telegram;
    if !cfg.is_enabled() {
        return;
    }

    let final_text = match profile_id {
        Some(profile_id) => {
            let sender = resolve_sender_label(state, profile_id);
            format!("<b>{}</b>\n{}", sender, text)
        }
        None => text.to_string(),
    };

    let url = format!("https://api.telegram.org/bot{}/sendMessage", cfg.bot_token);
    let body = SendMessageRequest {
        chat_id: cfg.chat_id.clone(),
        text: final_text,
        parse_mode: "HTML".to_string(),
    };

    match state
        .http_client
        .post(&url)
        .json(&body)
        .timeout(TELEGRAM_TIMEOUT)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            debug!("telegram.sent chat_id={}", cfg.chat_id);
        }
        Ok(response) => {
            error!("telegram_send_error status={}", response.status().as_u16());
        }
        Err(e) => {
            error!("telegram_send_error={}", e);
        }
    }
}
