use serde::{Deserialize, Serialize};

use crate::order::{ContactType, ItemSize};

/// OrderItemRequest — a line item exactly as submitted by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItemRequest {
    pub product_name: Option<String>,
    pub product_photo: Option<String>,
    pub size: Option<String>,
    pub price: Option<i64>,
    pub quantity: Option<i32>,
}

/// OrderRequest — raw order payload from the web app or the bot.
///
/// Every field is optional at this stage so that a missing value can be
/// reported by name instead of failing deserialization as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderRequest {
    pub telegram_id: Option<i64>,
    pub telegram_username: Option<String>,
    pub name: Option<String>,
    pub recipient_name: Option<String>,
    pub contact_type: Option<String>,
    pub contact_value: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub address_text: Option<String>,
    pub delivery_date: Option<String>,
    pub delivery_time: Option<String>,
    pub card_text: Option<String>,
    #[serde(default)]
    pub is_anonymous: Option<bool>,
    pub items: Option<Vec<OrderItemRequest>>,
    pub items_total: Option<i64>,
    pub delivery_cost: Option<i64>,
    pub total: Option<i64>,
    /// Client-chosen token; resubmitting with the same key yields the same order.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// NewOrderItem — a validated, normalized line item ready to persist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_name: String,
    pub product_photo: String,
    pub size: ItemSize,
    pub price: i64,
    pub quantity: i32,
}

impl NewOrderItem {
    pub fn line_total(&self) -> i64 {
        self.price.saturating_mul(i64::from(self.quantity))
    }
}

/// NewOrder — a validated order with trimmed strings and typed enums.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewOrder {
    pub telegram_id: i64,
    pub telegram_username: Option<String>,
    pub name: Option<String>,
    pub recipient_name: String,
    pub contact_type: ContactType,
    pub contact_value: String,
    pub latitude: String,
    pub longitude: String,
    pub address_text: Option<String>,
    pub delivery_date: String,
    pub delivery_time: String,
    pub card_text: Option<String>,
    pub is_anonymous: bool,
    pub items: Vec<NewOrderItem>,
    pub items_total: i64,
    pub delivery_cost: i64,
    pub total: i64,
    pub idempotency_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_request_with_missing_fields() {
        let json = r#"
        {
            "telegram_id": 123456,
            "name": "Test User",
            "recipient_name": "Anna",
            "contact_type": "whatsapp",
            "items": [{"product_name": "Roses", "price": 800000}]
        }
        "#;
        let request: OrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.telegram_id, Some(123456));
        assert_eq!(request.contact_value, None);
        assert_eq!(request.is_anonymous, None);

        let items = request.items.unwrap();
        assert_eq!(items[0].quantity, None);
        assert_eq!(items[0].size, None);
    }

    #[test]
    fn test_line_total() {
        let item = NewOrderItem {
            product_name: "Roses".into(),
            product_photo: String::new(),
            size: ItemSize::Large,
            price: 450000,
            quantity: 3,
        };
        assert_eq!(item.line_total(), 1350000);
    }
}
