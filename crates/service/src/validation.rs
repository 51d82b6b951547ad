//! Field-level validation of incoming orders.
//!
//! Pure functions: no I/O, no state, the same request always gets the same verdict.

use model::{ContactType, ItemSize, NewOrder, NewOrderItem, OrderItemRequest, OrderRequest};
use thiserror::Error;

pub const MIN_CONTACT_VALUE_CHARS: usize = 3;
pub const MIN_RECIPIENT_NAME_CHARS: usize = 2;

/// Why a request was rejected. Each variant names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingRequiredField(String),
    #[error("contact type must be one of telegram, whatsapp, zalo (got '{0}')")]
    InvalidContactType(String),
    #[error("contact must contain at least 3 characters")]
    ContactValueTooShort,
    #[error("recipient name must contain at least 2 characters")]
    RecipientNameTooShort,
    #[error("item {index} has unknown size '{size}'")]
    InvalidItemSize { index: usize, size: String },
    #[error("{field} is {submitted}, expected {expected}")]
    TotalsMismatch {
        field: &'static str,
        submitted: i64,
        expected: i64,
    },
}

impl ValidationError {
    /// Name of the request field the error refers to.
    pub fn field(&self) -> String {
        match self {
            ValidationError::MissingRequiredField(field) => field.clone(),
            ValidationError::InvalidContactType(_) => "contact_type".into(),
            ValidationError::ContactValueTooShort => "contact_value".into(),
            ValidationError::RecipientNameTooShort => "recipient_name".into(),
            ValidationError::InvalidItemSize { index, .. } => format!("items[{index}].size"),
            ValidationError::TotalsMismatch { field, .. } => (*field).into(),
        }
    }
}

fn required<T: Clone>(value: &Option<T>, field: &str) -> Result<T, ValidationError> {
    value
        .clone()
        .ok_or_else(|| ValidationError::MissingRequiredField(field.to_string()))
}

fn required_str(value: &Option<String>, field: &str) -> Result<String, ValidationError> {
    required(value, field).map(|v| v.trim().to_string())
}

/// Trims an optional string; blank becomes `None`.
fn optional_str(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn validate_item(index: usize, item: &OrderItemRequest) -> Result<NewOrderItem, ValidationError> {
    let field = |name: &str| format!("items[{index}].{name}");

    let size = match item.size.as_deref().map(str::trim) {
        None | Some("") => ItemSize::default(),
        Some(size) => size.parse().map_err(|_| ValidationError::InvalidItemSize {
            index,
            size: size.to_string(),
        })?,
    };

    Ok(NewOrderItem {
        product_name: required_str(&item.product_name, &field("product_name"))?,
        product_photo: required_str(&item.product_photo, &field("product_photo"))?,
        size,
        price: required(&item.price, &field("price"))?,
        quantity: item.quantity.unwrap_or(1),
    })
}

/// Checks a raw request and returns its normalized form.
///
/// Presence of every required field is checked first, then the contact and
/// recipient rules. Prices and totals are taken as submitted; see
/// [`verify_totals`] for the optional arithmetic check.
pub fn validate(request: &OrderRequest) -> Result<NewOrder, ValidationError> {
    let telegram_id = required(&request.telegram_id, "telegram_id")?;
    let recipient_name = required_str(&request.recipient_name, "recipient_name")?;
    let contact_type = required_str(&request.contact_type, "contact_type")?;
    let contact_value = required_str(&request.contact_value, "contact_value")?;
    let latitude = required_str(&request.latitude, "latitude")?;
    let longitude = required_str(&request.longitude, "longitude")?;
    let delivery_date = required_str(&request.delivery_date, "delivery_date")?;
    let delivery_time = required_str(&request.delivery_time, "delivery_time")?;
    let raw_items = required(&request.items, "items")?;
    let items_total = required(&request.items_total, "items_total")?;
    let delivery_cost = required(&request.delivery_cost, "delivery_cost")?;
    let total = required(&request.total, "total")?;

    let items = raw_items
        .iter()
        .enumerate()
        .map(|(index, item)| validate_item(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    let contact_type: ContactType = contact_type
        .parse()
        .map_err(|_| ValidationError::InvalidContactType(contact_type.clone()))?;

    if contact_value.chars().count() < MIN_CONTACT_VALUE_CHARS {
        return Err(ValidationError::ContactValueTooShort);
    }
    if recipient_name.chars().count() < MIN_RECIPIENT_NAME_CHARS {
        return Err(ValidationError::RecipientNameTooShort);
    }

    Ok(NewOrder {
        telegram_id,
        telegram_username: optional_str(&request.telegram_username),
        name: optional_str(&request.name),
        recipient_name,
        contact_type,
        contact_value,
        latitude,
        longitude,
        address_text: optional_str(&request.address_text),
        delivery_date,
        delivery_time,
        card_text: optional_str(&request.card_text),
        is_anonymous: request.is_anonymous.unwrap_or(false),
        items,
        items_total,
        delivery_cost,
        total,
        idempotency_key: optional_str(&request.idempotency_key),
    })
}

/// Recomputes the item subtotal and the grand total and rejects disagreement.
pub fn verify_totals(order: &NewOrder) -> Result<(), ValidationError> {
    let expected_items = order
        .items
        .iter()
        .fold(0i64, |sum, item| sum.saturating_add(item.line_total()));
    if order.items_total != expected_items {
        return Err(ValidationError::TotalsMismatch {
            field: "items_total",
            submitted: order.items_total,
            expected: expected_items,
        });
    }

    let expected_total = order.items_total.saturating_add(order.delivery_cost);
    if order.total != expected_total {
        return Err(ValidationError::TotalsMismatch {
            field: "total",
            submitted: order.total,
            expected: expected_total,
        });
    }
    Ok(())
}
