//! Wire shapes for the Nova Poshta public tracking API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Clone)]
pub struct TrackingRequest {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "modelName")]
    pub model_name: String,
    #[serde(rename = "calledMethod")]
    pub called_method: String,
    #[serde(rename = "methodProperties")]
    pub method_properties: TrackingMethodProperties,
}

#[derive(Debug, Serialize, Clone)]
pub struct TrackingMethodProperties {
    #[serde(rename = "Documents")]
    pub documents: Vec<TrackingDocumentQuery>,
}

#[derive(Debug, Serialize, Clone)]
pub struct TrackingDocumentQuery {
    #[serde(rename = "DocumentNumber")]
    pub document_number: String,
    #[serde(rename = "Phone")]
    pub phone: String,
}

impl TrackingRequest {
    pub fn status_documents(api_key: &str, ttn: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model_name: "TrackingDocument".to_string(),
            called_method: "getStatusDocuments".to_string(),
            method_properties: TrackingMethodProperties {
                documents: vec![TrackingDocumentQuery {
                    document_number: ttn.to_string(),
                    phone: String::new(),
                }],
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TrackingDocument {
    #[serde(default, rename = "Number")]
    pub number: Option<String>,
    #[serde(default, rename = "CounterpartySenderDescription")]
    pub sender_description: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TrackingResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<TrackingDocument>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl TrackingResponse {
    /// Sender description of the first matched document, if the query
    /// actually matched anything.
    pub fn matched_sender(&self) -> Option<&str> {
        if !self.success || !self.errors.is_empty() {
            return None;
        }
        self.data.first()?.sender_description.as_deref()
    }
}
