//! Typed views over the amoCRM v4 entity shapes the bridge reads and patches.
//!
//! Custom fields arrive as a flat sequence of `{field_id, field_code, values}`
//! blocks; lookup is an explicit linear scan by numeric id or symbolic code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CustomFieldValue {
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CustomFieldValues {
    #[serde(default)]
    pub field_id: Option<i64>,
    #[serde(default)]
    pub field_code: Option<String>,
    #[serde(default)]
    pub values: Vec<CustomFieldValue>,
}

/// First scalar value of the field with the given numeric id.
pub fn find_field_value(fields: &[CustomFieldValues], field_id: i64) -> Option<&Value> {
    find_field_block(fields, field_id)
        .and_then(|block| block.values.first())
        .map(|v| &v.value)
}

/// Whole field block (all repeating values) with the given numeric id.
pub fn find_field_block(fields: &[CustomFieldValues], field_id: i64) -> Option<&CustomFieldValues> {
    fields.iter().find(|cf| cf.field_id == Some(field_id))
}

/// First scalar value of the field whose symbolic code matches, case-insensitive.
pub fn find_field_value_by_code<'a>(
    fields: &'a [CustomFieldValues],
    code: &str,
) -> Option<&'a Value> {
    fields
        .iter()
        .find(|cf| {
            cf.field_code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code))
        })
        .and_then(|block| block.values.first())
        .map(|v| &v.value)
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ContactRef {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LeadEmbedded {
    #[serde(default)]
    pub contacts: Vec<ContactRef>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Lead {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValues>>,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<LeadEmbedded>,
}

impl Lead {
    pub fn custom_fields(&self) -> &[CustomFieldValues] {
        self.custom_fields_values.as_deref().unwrap_or(&[])
    }

    pub fn first_contact_id(&self) -> Option<i64> {
        self.embedded
            .as_ref()
            .and_then(|e| e.contacts.first())
            .map(|c| c.id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Contact {
    pub id: i64,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValues>>,
}

impl Contact {
    pub fn custom_fields(&self) -> &[CustomFieldValues] {
        self.custom_fields_values.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CatalogElement {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValues>>,
}

impl CatalogElement {
    pub fn custom_fields(&self) -> &[CustomFieldValues] {
        self.custom_fields_values.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EntityLink {
    #[serde(default)]
    pub to_entity_type: String,
    #[serde(default)]
    pub to_entity_id: Option<i64>,
    #[serde(default)]
    pub to_catalog_id: Option<i64>,
    /// Link-level quantity; absent means one unit.
    #[serde(default)]
    pub quantity: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LinksEmbedded {
    #[serde(default)]
    pub links: Vec<EntityLink>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LeadLinksResponse {
    #[serde(default, rename = "_embedded")]
    pub embedded: LinksEmbedded,
}

// Write side: PATCH body for a single custom field.

#[derive(Debug, Serialize, Clone)]
pub struct PatchValue {
    pub value: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct CustomFieldPatch {
    pub field_id: i64,
    pub values: Vec<PatchValue>,
}

#[derive(Debug, Serialize, Clone)]
pub struct UpdateLeadBody {
    pub custom_fields_values: Vec<CustomFieldPatch>,
}

impl UpdateLeadBody {
    pub fn single_field(field_id: i64, value: impl Into<String>) -> Self {
        Self {
            custom_fields_values: vec![CustomFieldPatch {
                field_id,
                values: vec![PatchValue {
                    value: value.into(),
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<CustomFieldValues> {
        serde_json::from_value(json!([
            {"field_id": 10, "values": [{"value": "Контроль оплаты"}]},
            {"field_id": 20, "field_code": "PRICE", "values": [{"value": "149,90"}]},
            {"field_id": 30, "values": []}
        ]))
        .unwrap()
    }

    #[test]
    fn finds_value_by_id() {
        let fields = fields();
        assert_eq!(
            find_field_value(&fields, 10),
            Some(&json!("Контроль оплаты"))
        );
        assert_eq!(find_field_value(&fields, 99), None);
    }

    #[test]
    fn empty_values_yield_none() {
        let fields = fields();
        assert!(find_field_block(&fields, 30).is_some());
        assert_eq!(find_field_value(&fields, 30), None);
    }

    #[test]
    fn finds_value_by_code_case_insensitive() {
        let fields = fields();
        assert_eq!(find_field_value_by_code(&fields, "price"), Some(&json!("149,90")));
        assert_eq!(find_field_value_by_code(&fields, "EMAIL"), None);
    }

    #[test]
    fn lead_without_custom_fields_scans_empty() {
        let lead: Lead = serde_json::from_value(json!({"id": 5, "custom_fields_values": null})).unwrap();
        assert!(lead.custom_fields().is_empty());
        assert_eq!(lead.first_contact_id(), None);
    }
}
