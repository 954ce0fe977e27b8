//! amoCRM v4 client plus extraction of a deal into a [`DealSnapshot`].
//!
//! Only the root lead fetch (and its link collection) is fatal; individual
//! contact and catalog-element fetches degrade to a logged skip so that one
//! broken sub-record never blocks the rest of the receipt.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::config::AmoConfig;
use crate::error::{AppError, Result};
use crate::models::amocrm::{
    find_field_block, find_field_value, find_field_value_by_code, CatalogElement, Contact,
    EntityLink, Lead, LeadLinksResponse, UpdateLeadBody,
};
use crate::models::deal::{DealSnapshot, PurchaseLine};
use crate::processing::money::parse_decimal;
use crate::state::AppState;

const SERVICE: &str = "amocrm";
const AMO_TIMEOUT: Duration = Duration::from_secs(10);

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = error_message(&body);
        error!("amo.error status={} message={}", status.as_u16(), message);
        return Err(AppError::upstream(SERVICE, status.as_u16(), message));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Pulls the human-readable message out of an amoCRM error body.
fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(message) = map
            .get("title")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }
    body.chars().take(500).collect()
}

async fn amo_get<T: DeserializeOwned>(state: &AppState, path_and_query: &str) -> Result<T> {
    let cfg = &state.config.amo;
    let url = format!("{}{}", cfg.base_url, path_and_query);
    let response = state
        .http_client
        .get(&url)
        .bearer_auth(&cfg.access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(AMO_TIMEOUT)
        .send()
        .await?;
    read_json(response).await
}

async fn amo_patch<T: DeserializeOwned, B: Serialize>(
    state: &AppState,
    path: &str,
    body: &B,
) -> Result<T> {
    let cfg = &state.config.amo;
    let url = format!("{}{}", cfg.base_url, path);
    let response = state
        .http_client
        .patch(&url)
        .bearer_auth(&cfg.access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(body)
        .timeout(AMO_TIMEOUT)
        .send()
        .await?;
    read_json(response).await
}

pub async fn get_lead(state: &AppState, lead_id: i64) -> Result<Lead> {
    amo_get(state, &format!("/api/v4/leads/{}?with=contacts", lead_id)).await
}

pub async fn get_contact(state: &AppState, contact_id: i64) -> Result<Contact> {
    amo_get(state, &format!("/api/v4/contacts/{}", contact_id)).await
}

pub async fn get_lead_links(state: &AppState, lead_id: i64) -> Result<Vec<EntityLink>> {
    let response: LeadLinksResponse =
        amo_get(state, &format!("/api/v4/leads/{}/links?limit=250", lead_id)).await?;
    Ok(response.embedded.links)
}

pub async fn get_catalog_element(
    state: &AppState,
    catalog_id: i64,
    element_id: i64,
) -> Result<CatalogElement> {
    amo_get(
        state,
        &format!("/api/v4/catalogs/{}/elements/{}", catalog_id, element_id),
    )
    .await
}

pub async fn update_lead_custom_field(
    state: &AppState,
    lead_id: i64,
    field_id: i64,
    value: &str,
) -> Result<()> {
    let body = UpdateLeadBody::single_field(field_id, value);
    let _: Value = amo_patch(state, &format!("/api/v4/leads/{}", lead_id), &body).await?;
    Ok(())
}

/// One linked purchase element with its accumulated link quantity.
#[derive(Debug, Clone)]
pub struct PurchaseElement {
    pub element_id: i64,
    pub name: String,
    pub quantity: Decimal,
    pub element: CatalogElement,
}

/// Collects the deal's linked purchase-catalog elements, de-duplicating
/// repeated links by summing their quantities (first-seen order preserved).
pub async fn get_purchases_for_lead(
    state: &AppState,
    lead_id: i64,
) -> Result<Vec<PurchaseElement>> {
    let catalog_id = state.config.amo.purchases_catalog_id;
    let links = get_lead_links(state, lead_id).await?;

    let mut wanted: Vec<(i64, Decimal)> = Vec::new();
    for link in &links {
        if link.to_entity_type != "catalog_elements" || link.to_catalog_id != Some(catalog_id) {
            continue;
        }
        let Some(element_id) = link.to_entity_id else {
            continue;
        };
        let quantity = link
            .quantity
            .as_ref()
            .and_then(parse_decimal)
            .unwrap_or(Decimal::ONE);
        match wanted.iter_mut().find(|(id, _)| *id == element_id) {
            Some((_, total)) => *total += quantity,
            None => wanted.push((element_id, quantity)),
        }
    }

    let mut purchases = Vec::with_capacity(wanted.len());
    for (element_id, quantity) in wanted {
        match get_catalog_element(state, catalog_id, element_id).await {
            Ok(element) => purchases.push(PurchaseElement {
                element_id,
                name: element
                    .name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Товар".to_string()),
                quantity,
                element,
            }),
            Err(e) => {
                error!(
                    "amo.purchase.element_error element_id={} error={}",
                    element_id, e
                );
            }
        }
    }
    Ok(purchases)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Flattens the element's repeating items block into purchase lines.
/// Entries with non-positive price or quantity are not sale items.
fn extract_items_from_element(cfg: &AmoConfig, element: &CatalogElement) -> Vec<PurchaseLine> {
    let mut items = Vec::new();
    if cfg.purchase_items_field_id == 0 {
        return items;
    }
    let Some(block) = find_field_block(element.custom_fields(), cfg.purchase_items_field_id) else {
        return items;
    };
    for (idx, entry) in block.values.iter().enumerate() {
        let obj = &entry.value;
        let name = obj
            .get("description")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Товар {}", idx + 1));
        let price = obj
            .get("unit_price")
            .and_then(parse_decimal)
            .unwrap_or(Decimal::ZERO);
        let quantity = obj
            .get("quantity")
            .and_then(parse_decimal)
            .unwrap_or(Decimal::ONE);
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            continue;
        }
        items.push(PurchaseLine {
            name,
            quantity,
            price,
        });
    }
    items
}

/// Whole-element price for elements without an items block: configured field
/// id first, then the `PRICE` symbolic code.
fn extract_price_from_element(cfg: &AmoConfig, element: &CatalogElement) -> Decimal {
    if cfg.purchase_price_field_id != 0 {
        if let Some(value) = find_field_value(element.custom_fields(), cfg.purchase_price_field_id)
        {
            return parse_decimal(value).unwrap_or(Decimal::ZERO);
        }
    }
    if let Some(value) = find_field_value_by_code(element.custom_fields(), "PRICE") {
        return parse_decimal(value).unwrap_or(Decimal::ZERO);
    }
    Decimal::ZERO
}

/// Customer email from the deal's first linked contact. A broken contact
/// fetch degrades to no email.
async fn extract_email(state: &AppState, lead: &Lead) -> Option<String> {
    let contact_id = lead.first_contact_id()?;
    let contact = match get_contact(state, contact_id).await {
        Ok(contact) => contact,
        Err(e) => {
            error!("amo.contact.error contact_id={} error={}", contact_id, e);
            return None;
        }
    };
    find_field_value_by_code(contact.custom_fields(), "email").and_then(value_to_string)
}

/// Builds the full read projection of one deal.
pub async fn load_deal(state: &AppState, lead_id: i64) -> Result<DealSnapshot> {
    let cfg = &state.config.amo;
    info!("amocrm.load_deal start lead_id={}", lead_id);

    let lead = get_lead(state, lead_id).await?;
    let fields = lead.custom_fields();

    let status_value = find_field_value(fields, cfg.field_status).and_then(value_to_string);
    let discount = find_field_value(fields, cfg.field_discount)
        .and_then(parse_decimal)
        .unwrap_or(Decimal::ZERO);
    let processing_status = if cfg.field_checkbox_status != 0 {
        find_field_value(fields, cfg.field_checkbox_status).and_then(value_to_string)
    } else {
        None
    };
    let ttn = if cfg.field_ttn != 0 {
        find_field_value(fields, cfg.field_ttn).and_then(value_to_string)
    } else {
        None
    };

    let email = extract_email(state, &lead).await;

    let purchases = get_purchases_for_lead(state, lead_id).await?;
    let mut lines: Vec<PurchaseLine> = Vec::new();
    for purchase in &purchases {
        let items = extract_items_from_element(cfg, &purchase.element);
        if !items.is_empty() {
            lines.extend(items);
        } else {
            lines.push(PurchaseLine {
                name: purchase.name.clone(),
                quantity: purchase.quantity,
                price: extract_price_from_element(cfg, &purchase.element),
            });
        }
    }

    info!(
        "amocrm.load_deal done lead_id={} status_value={:?} discount={} email_present={} ttn={:?} purchases_elements={} purchases_flat={}",
        lead_id,
        status_value,
        discount,
        email.is_some(),
        ttn,
        purchases.len(),
        lines.len()
    );

    Ok(DealSnapshot {
        id: lead_id,
        status_value,
        discount,
        processing_status,
        ttn,
        email,
        lines,
    })
}

/// Best-effort write-back of the processing flag; never fails the caller.
pub async fn set_processing_status(state: &AppState, lead_id: i64, text: &str) {
    let field_id = state.config.amo.field_checkbox_status;
    if field_id == 0 {
        return;
    }
    info!("amocrm.checkbox_status.set lead_id={} text={}", lead_id, text);
    if let Err(e) = update_lead_custom_field(state, lead_id, field_id, text).await {
        error!(
            "amocrm.checkbox_status.error lead_id={} error={} text={}",
            lead_id, e, text
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use std::str::FromStr;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn state_for(mock: &MockServer) -> AppState {
        let mut config = AppConfig::for_tests();
        config.amo.base_url = mock.uri();
        AppState::new(config).expect("Failed to create AppState")
    }

    fn lead_body() -> serde_json::Value {
        json!({
            "id": 555,
            "name": "Тестова сделка",
            "custom_fields_values": [
                {"field_id": 100, "values": [{"value": "Контроль оплаты"}]},
                {"field_id": 200, "values": [{"value": "10,5"}]},
                {"field_id": 400, "values": [{"value": "20450123456789"}]}
            ],
            "_embedded": {"contacts": [{"id": 900}]}
        })
    }

    fn element_with_items() -> serde_json::Value {
        json!({
            "id": 7001,
            "name": "Набір",
            "custom_fields_values": [
                {"field_id": 500, "values": [
                    {"value": {"description": "Рушник", "unit_price": "100.00", "quantity": 2}},
                    {"value": {"description": "Мило", "unit_price": "50,00", "quantity": "1"}},
                    {"value": {"description": "Серветка", "unit_price": 25.5, "quantity": 4}},
                    {"value": {"description": "Зразок", "unit_price": 0, "quantity": 1}}
                ]}
            ]
        })
    }

    fn element_with_price_code() -> serde_json::Value {
        json!({
            "id": 7002,
            "name": "Свічка",
            "custom_fields_values": [
                {"field_id": 600, "field_code": "PRICE", "values": [{"value": "149,90"}]}
            ]
        })
    }

    fn links_body() -> serde_json::Value {
        json!({
            "_embedded": {"links": [
                {"to_entity_type": "catalog_elements", "to_entity_id": 7001, "to_catalog_id": 77, "quantity": 1},
                {"to_entity_type": "contacts", "to_entity_id": 900},
                {"to_entity_type": "catalog_elements", "to_entity_id": 8001, "to_catalog_id": 99, "quantity": 5},
                {"to_entity_type": "catalog_elements", "to_entity_id": 7002, "to_catalog_id": 77, "quantity": 2},
                {"to_entity_type": "catalog_elements", "to_entity_id": 7002, "to_catalog_id": 77, "quantity": 1}
            ]}
        })
    }

    #[tokio::test]
    async fn load_deal_flattens_items_and_falls_back_to_price_field() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/leads/555"))
            .and(query_param("with", "contacts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lead_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts/900"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 900,
                "custom_fields_values": [
                    {"field_id": 910, "field_code": "EMAIL", "values": [{"value": "buyer@example.com"}]}
                ]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/555/links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(links_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/catalogs/77/elements/7001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(element_with_items()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/catalogs/77/elements/7002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(element_with_price_code()))
            .mount(&mock_server)
            .await;

        let state = state_for(&mock_server).await;
        let snapshot = load_deal(&state, 555).await.expect("load_deal failed");

        assert_eq!(snapshot.id, 555);
        assert_eq!(snapshot.status_value.as_deref(), Some("Контроль оплаты"));
        assert_eq!(snapshot.discount, Decimal::from_str("10.5").unwrap());
        assert_eq!(snapshot.ttn.as_deref(), Some("20450123456789"));
        assert_eq!(snapshot.email.as_deref(), Some("buyer@example.com"));

        // 3 surviving item-block entries + 1 fallback line; zero-priced entry dropped.
        assert_eq!(snapshot.lines.len(), 4);
        assert_eq!(snapshot.lines[0].name, "Рушник");
        assert_eq!(snapshot.lines[0].quantity, Decimal::from(2));
        assert_eq!(snapshot.lines[0].price, Decimal::from(100));
        assert_eq!(snapshot.lines[1].name, "Мило");
        assert_eq!(snapshot.lines[1].price, Decimal::from(50));
        assert_eq!(snapshot.lines[2].name, "Серветка");
        assert_eq!(snapshot.lines[2].price, Decimal::from_str("25.5").unwrap());
        // Fallback line carries the summed link quantity (2 + 1).
        assert_eq!(snapshot.lines[3].name, "Свічка");
        assert_eq!(snapshot.lines[3].quantity, Decimal::from(3));
        assert_eq!(snapshot.lines[3].price, Decimal::from_str("149.9").unwrap());
    }

    #[tokio::test]
    async fn broken_sub_fetches_degrade_gracefully() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v4/leads/555"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lead_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts/900"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/555/links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(links_body()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/catalogs/77/elements/7001"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"title": "Not Found"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/catalogs/77/elements/7002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(element_with_price_code()))
            .mount(&mock_server)
            .await;

        let state = state_for(&mock_server).await;
        let snapshot = load_deal(&state, 555).await.expect("load_deal failed");

        assert_eq!(snapshot.email, None);
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].name, "Свічка");
    }

    #[tokio::test]
    async fn root_lead_failure_is_fatal() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/555"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"title": "Lead not found"})),
            )
            .mount(&mock_server)
            .await;

        let state = state_for(&mock_server).await;
        let err = load_deal(&state, 555).await.expect_err("expected failure");
        match err {
            AppError::Upstream {
                service, status, ..
            } => {
                assert_eq!(service, "amocrm");
                assert_eq!(status, 404);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn set_processing_status_patches_configured_field() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v4/leads/555"))
            .and(wiremock::matchers::body_json(json!({
                "custom_fields_values": [
                    {"field_id": 300, "values": [{"value": "OK: 42 (id: r-1)"}]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 555})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let state = state_for(&mock_server).await;
        set_processing_status(&state, 555, "OK: 42 (id: r-1)").await;
    }

    #[tokio::test]
    async fn set_processing_status_is_noop_without_field() {
        let mock_server = MockServer::start().await;
        // No mock mounted: any request would fail the test via expectations.
        let mut config = AppConfig::for_tests();
        config.amo.base_url = mock_server.uri();
        config.amo.field_checkbox_status = 0;
        let state = AppState::new(config).unwrap();
        set_processing_status(&state, 555, "OK: 42").await;
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }
}
