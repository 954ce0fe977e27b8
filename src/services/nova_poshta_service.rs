//! Maps a waybill number (TTN) to a fiscal profile by asking each configured
//! Nova Poshta account who the sender is.
//!
//! Any failure while querying one account is a non-match, never an error:
//! the next account is tried, and "no profile" is a routing outcome the
//! pipeline reports on its own.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::CourierAccount;
use crate::models::nova_poshta::{TrackingRequest, TrackingResponse};
use crate::state::AppState;

const NP_TIMEOUT: Duration = Duration::from_secs(10);

/// Queries one account's tracking API and checks whether the document's
/// sender matches that account's expected sender name.
async fn ttn_matches_account(state: &AppState, account: &CourierAccount, ttn: &str) -> bool {
    let body = TrackingRequest::status_documents(&account.api_key, ttn);
    debug!("np.check_ttn.request account_id={} ttn={}", account.id, ttn);

    let response = match state
        .http_client
        .post(&state.config.nova_poshta.api_url)
        .json(&body)
        .timeout(NP_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(
                "np.check_ttn.http_error account_id={} ttn={} error={}",
                account.id, ttn, e
            );
            return false;
        }
    };

    let status = response.status();
    let tracking: TrackingResponse = match response.json().await {
        Ok(tracking) => tracking,
        Err(e) => {
            error!(
                "np.check_ttn.bad_json account_id={} ttn={} status={} error={}",
                account.id,
                ttn,
                status.as_u16(),
                e
            );
            return false;
        }
    };

    let Some(sender) = tracking.matched_sender() else {
        info!(
            "np.check_ttn.no_match account_id={} ttn={} success={} docs_len={}",
            account.id,
            ttn,
            tracking.success,
            tracking.data.len()
        );
        return false;
    };

    let matched = sender.trim().to_lowercase() == account.sender_name.to_lowercase();
    info!(
        "np.check_ttn.sender account_id={} ttn={} sender={} matched={}",
        account.id, ttn, sender, matched
    );
    matched
}

/// Resolves the fiscal profile for a TTN. Accounts are tried in priority
/// order; an account with no expected sender name configured never matches.
pub async fn resolve_profile_for_ttn(state: &AppState, ttn: &str) -> Option<String> {
    let ttn = ttn.trim();
    if ttn.is_empty() {
        return None;
    }
    for account in &state.config.nova_poshta.accounts {
        if account.sender_name.is_empty() {
            continue;
        }
        if ttn_matches_account(state, account, ttn).await {
            return Some(account.id.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(mock: &MockServer) -> AppState {
        let mut config = AppConfig::for_tests();
        config.nova_poshta.api_url = format!("{}/", mock.uri());
        AppState::new(config).expect("Failed to create AppState")
    }

    fn tracked(sender: &str) -> serde_json::Value {
        json!({
            "success": true,
            "data": [{"Number": "204501", "CounterpartySenderDescription": sender}],
            "errors": []
        })
    }

    #[tokio::test]
    async fn second_account_sender_match_resolves_profile_2() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"apiKey": "np-key-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(tracked("ФОП Інша")))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"apiKey": "np-key-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(tracked(" фоп друга ")))
            .mount(&mock_server)
            .await;

        let state = state_for(&mock_server);
        assert_eq!(
            resolve_profile_for_ttn(&state, "204501").await,
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn no_account_matches_means_no_profile() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tracked("ФОП Чужа")))
            .expect(2)
            .mount(&mock_server)
            .await;

        let state = state_for(&mock_server);
        assert_eq!(resolve_profile_for_ttn(&state, "204501").await, None);
    }

    #[tokio::test]
    async fn failed_lookup_falls_through_to_next_account() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"apiKey": "np-key-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "data": [],
                "errors": ["Document not found"]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"apiKey": "np-key-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(tracked("ФОП Друга")))
            .mount(&mock_server)
            .await;

        let state = state_for(&mock_server);
        assert_eq!(
            resolve_profile_for_ttn(&state, "204501").await,
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn account_without_expected_sender_is_skipped() {
        let mock_server = MockServer::start().await;
        // Account 1 has no sender configured and must not even be queried.
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"apiKey": "np-key-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(tracked("ФОП Друга")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = AppConfig::for_tests();
        config.nova_poshta.api_url = format!("{}/", mock_server.uri());
        config.nova_poshta.accounts[0].sender_name = String::new();
        let state = AppState::new(config).unwrap();
        assert_eq!(
            resolve_profile_for_ttn(&state, "204501").await,
            Some("2".to_string())
        );
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_ttn_short_circuits() {
        let mock_server = MockServer::start().await;
        let state = state_for(&mock_server);
        assert_eq!(resolve_profile_for_ttn(&state, "   ").await, None);
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }
}
