//! Product entity and its validated write payload

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ValidationErrors;

/// A stored product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "product_id")]
    pub id: i64,
    /// Category label, e.g. "Smartphone"
    #[serde(rename = "type")]
    pub kind: String,
    pub brand: String,
    pub model: String,
    pub capacity: String,
    pub quantity: i64,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Full attribute payload for create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductData {
    /// Caller-assigned id; the store assigns one when absent. Ignored on update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: String,
    pub brand: String,
    pub model: String,
    pub capacity: String,
    pub quantity: i64,
}

const TEXT_FIELDS: [&str; 4] = ["type", "brand", "model", "capacity"];

impl ProductData {
    pub fn new(
        kind: impl Into<String>,
        brand: impl Into<String>,
        model: impl Into<String>,
        capacity: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            product_id: None,
            kind: kind.into(),
            brand: brand.into(),
            model: model.into(),
            capacity: capacity.into(),
            quantity,
        }
    }

    pub fn with_id(mut self, product_id: i64) -> Self {
        self.product_id = Some(product_id);
        self
    }

    /// Validate a raw JSON payload, collecting every field error
    pub fn from_json(payload: &Value) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let Some(object) = payload.as_object() else {
            for field in TEXT_FIELDS.iter().chain(["quantity"].iter()) {
                errors.add(*field, format!("The {} field is required.", field));
            }
            return Err(errors);
        };

        let mut text = |field: &str| -> String {
            match object.get(field) {
                None | Some(Value::Null) => {
                    errors.add(field, format!("The {} field is required.", field));
                    String::new()
                }
                Some(Value::String(s)) if s.trim().is_empty() => {
                    errors.add(field, format!("The {} field is required.", field));
                    String::new()
                }
                Some(Value::String(s)) => s.clone(),
                Some(_) => {
                    errors.add(field, format!("The {} field must be a string.", field));
                    String::new()
                }
            }
        };

        let kind = text("type");
        let brand = text("brand");
        let model = text("model");
        let capacity = text("capacity");

        let quantity = match object.get("quantity") {
            None | Some(Value::Null) => {
                errors.add("quantity", "The quantity field is required.");
                0
            }
            Some(value) => match value.as_i64() {
                Some(q) if q < 0 => {
                    errors.add("quantity", "The quantity field must be at least 0.");
                    0
                }
                Some(q) => q,
                None => {
                    errors.add("quantity", "The quantity field must be an integer.");
                    0
                }
            },
        };

        let product_id = match object.get("product_id") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_i64() {
                Some(id) if id > 0 => Some(id),
                Some(_) => {
                    errors.add("product_id", "The product id field must be at least 1.");
                    None
                }
                None => {
                    errors.add("product_id", "The product id field must be an integer.");
                    None
                }
            },
        };

        errors.into_result(Self {
            product_id,
            kind,
            brand,
            model,
            capacity,
            quantity,
        })
    }
}

impl From<&Product> for ProductData {
    fn from(product: &Product) -> Self {
        Self {
            product_id: Some(product.id),
            kind: product.kind.clone(),
            brand: product.brand.clone(),
            model: product.model.clone(),
            capacity: product.capacity.clone(),
            quantity: product.quantity,
        }
    }
}
