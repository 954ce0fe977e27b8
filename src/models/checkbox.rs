//! Wire shapes for the Checkbox fiscal API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Clone)]
pub struct SignInRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SignInResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl SignInResponse {
    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .or(self.token.as_deref())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GoodItem {
    pub code: String,
    pub name: String,
    /// Unit price in minor units (kopecks).
    pub price: i64,
    pub tax: Vec<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReceiptGood {
    pub good: GoodItem,
    /// Quantity scaled by 1000, the provider's fixed-point encoding.
    pub quantity: i64,
    pub is_return: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct Payment {
    #[serde(rename = "type")]
    pub payment_type: String,
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ReceiptDiscount {
    #[serde(rename = "type")]
    pub discount_type: String,
    pub mode: String,
    pub value: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct Delivery {
    pub emails: Vec<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct SellReceiptRequest {
    pub goods: Vec<ReceiptGood>,
    pub payments: Vec<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounts: Option<Vec<ReceiptDiscount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SellReceiptResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub receipt_id: Option<String>,
    #[serde(default)]
    pub fiscal_code: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
}

impl SellReceiptResponse {
    pub fn receipt_id(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.receipt_id.clone())
            .unwrap_or_default()
    }

    pub fn receipt_number(&self) -> String {
        self.fiscal_code
            .clone()
            .or_else(|| self.number.clone())
            .unwrap_or_default()
    }
}

/// Terminal result of one submitted receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptIssued {
    pub receipt_id: String,
    pub receipt_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_prefers_access_token() {
        let resp: SignInResponse =
            serde_json::from_str(r#"{"access_token": "a", "token": "b"}"#).unwrap();
        assert_eq!(resp.token(), Some("a"));
    }

    #[test]
    fn token_falls_back_and_rejects_empty() {
        let resp: SignInResponse = serde_json::from_str(r#"{"token": "b"}"#).unwrap();
        assert_eq!(resp.token(), Some("b"));
        let empty: SignInResponse = serde_json::from_str(r#"{"access_token": ""}"#).unwrap();
        assert_eq!(empty.token(), None);
    }

    #[test]
    fn receipt_ids_fall_back_across_field_names() {
        let resp: SellReceiptResponse =
            serde_json::from_str(r#"{"receipt_id": "r-1", "number": "42"}"#).unwrap();
        assert_eq!(resp.receipt_id(), "r-1");
        assert_eq!(resp.receipt_number(), "42");
    }

    #[test]
    fn sell_request_omits_empty_sections() {
        let req = SellReceiptRequest {
            goods: vec![],
            payments: vec![],
            discounts: None,
            delivery: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("discounts"));
        assert!(!json.contains("delivery"));
    }
}
