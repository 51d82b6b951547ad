use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::NewOrder;

/// Store-assigned order identifier.
pub type OrderId = i64;

/// Returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// ContactType — the channel the shop uses to reach the recipient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    Telegram,
    Whatsapp,
    Zalo,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Telegram => "telegram",
            ContactType::Whatsapp => "whatsapp",
            ContactType::Zalo => "zalo",
        }
    }
}

impl FromStr for ContactType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(ContactType::Telegram),
            "whatsapp" => Ok(ContactType::Whatsapp),
            "zalo" => Ok(ContactType::Zalo),
            other => Err(ParseEnumError::new("contact type", other)),
        }
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ItemSize — bouquet size variant of a line item.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemSize {
    #[default]
    Standard,
    Large,
    Xl,
}

impl ItemSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSize::Standard => "standard",
            ItemSize::Large => "large",
            ItemSize::Xl => "xl",
        }
    }
}

impl FromStr for ItemSize {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(ItemSize::Standard),
            "large" => Ok(ItemSize::Large),
            "xl" => Ok(ItemSize::Xl),
            other => Err(ParseEnumError::new("item size", other)),
        }
    }
}

impl fmt::Display for ItemSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OrderStatus — lifecycle state of an order.
///
/// `pending → confirmed → making → delivering → delivered`, and any
/// non-terminal state may move to `cancelled`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Making,
    Delivering,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Making,
        OrderStatus::Delivering,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Making => "making",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed)
            | (Confirmed, Making)
            | (Making, Delivering)
            | (Delivering, Delivered) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("order status", s))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OrderItem — one persisted line of an order, with a product snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_name: String,
    pub product_photo: String,
    pub size: ItemSize,
    pub price: i64,
    pub quantity: i32,
}

/// Order — a persisted customer purchase with delivery metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
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
    pub items_total: i64,
    pub delivery_cost: i64,
    pub total: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Whether `submission` describes this very order: same requester, same
    /// delivery details, same amounts and the same items in the same order.
    /// Server-assigned fields (id, status, timestamps) are not compared.
    pub fn matches_submission(&self, submission: &NewOrder) -> bool {
        self.telegram_id == submission.telegram_id
            && self.telegram_username == submission.telegram_username
            && self.name == submission.name
            && self.recipient_name == submission.recipient_name
            && self.contact_type == submission.contact_type
            && self.contact_value == submission.contact_value
            && self.latitude == submission.latitude
            && self.longitude == submission.longitude
            && self.address_text == submission.address_text
            && self.delivery_date == submission.delivery_date
            && self.delivery_time == submission.delivery_time
            && self.card_text == submission.card_text
            && self.is_anonymous == submission.is_anonymous
            && self.items_total == submission.items_total
            && self.delivery_cost == submission.delivery_cost
            && self.total == submission.total
            && self.items.len() == submission.items.len()
            && self.items.iter().zip(&submission.items).all(|(stored, new)| {
                stored.product_name == new.product_name
                    && stored.product_photo == new.product_photo
                    && stored.size == new.size
                    && stored.price == new.price
                    && stored.quantity == new.quantity
            })
    }
}

/// Line item as shown in a customer's order history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItemSummary {
    pub product_name: String,
    pub size: ItemSize,
    pub price: i64,
    pub quantity: i32,
}

/// Order as shown in a customer's order history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total: i64,
    pub delivery_date: String,
    pub delivery_time: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemSummary>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            total: order.total,
            delivery_date: order.delivery_date.clone(),
            delivery_time: order.delivery_time.clone(),
            created_at: order.created_at,
            items: order
                .items
                .iter()
                .map(|item| OrderItemSummary {
                    product_name: item.product_name.clone(),
                    size: item.size,
                    price: item.price,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}
