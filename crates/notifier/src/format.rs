//! Text rendering for Telegram messages (HTML parse mode).

use std::fmt::Write;

use model::{ContactType, NewOrder, OrderId};

const NOT_SET: &str = "not specified";

/// Telegram rejects longer messages. Counted in UTF-16 code units, as Telegram does.
pub const MESSAGE_LIMIT: usize = 4096;

const CARD_PREVIEW_CHARS: usize = 1000;
// Room kept free for the "more items" line.
const ITEMS_RESERVE: usize = 32;
const TRUNCATED: &str = "\n…";

fn telegram_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Escaped `text`, cut to `max_chars` characters with an ellipsis if longer.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", escape_html(&text[..cut])),
        None => escape_html(text),
    }
}

/// Drops trailing lines until `message` fits into one Telegram message.
///
/// Tags never span lines, so cutting on a newline keeps the HTML well formed.
fn fit_message(mut message: String) -> String {
    if telegram_len(&message) <= MESSAGE_LIMIT {
        return message;
    }
    let budget = MESSAGE_LIMIT - telegram_len(TRUNCATED);
    let mut used = 0;
    let mut cut = 0;
    for (idx, ch) in message.char_indices() {
        used += ch.len_utf16();
        if used > budget {
            break;
        }
        if ch == '\n' {
            cut = idx;
        }
    }
    message.truncate(cut);
    message.push_str(TRUNCATED);
    message
}

/// Formats an amount of whole currency units with space-grouped thousands and a suffix.
///
/// `format_price(800000, "₫")` gives `"800 000 ₫"`.
pub fn format_price(amount: i64, currency: &str) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if currency.is_empty() {
        grouped
    } else {
        format!("{grouped} {currency}")
    }
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn contact_label(kind: ContactType) -> &'static str {
    match kind {
        ContactType::Telegram => "📱 Telegram",
        ContactType::Whatsapp => "💬 WhatsApp",
        ContactType::Zalo => "💙 Zalo",
    }
}

fn or_not_set(value: Option<&str>) -> String {
    escape_html(value.unwrap_or(NOT_SET))
}

/// The operator-facing summary of a new order.
///
/// Long card texts are shortened and items that do not fit are summarized as a
/// count, so the result never exceeds [`MESSAGE_LIMIT`].
pub fn format_order_message(order_id: OrderId, order: &NewOrder, currency: &str) -> String {
    let price = |amount| format_price(amount, currency);
    let username = order
        .telegram_username
        .as_deref()
        .map(|u| format!("@{}", escape_html(u.trim_start_matches('@'))))
        .unwrap_or_else(|| NOT_SET.to_string());

    let mut message = format!(
        "🆕 <b>New order #{order_id}</b>\n\
         \n\
         👤 <b>Customer:</b> {name}\n\
         📱 <b>Telegram:</b> {username} (id {telegram_id})\n\
         \n\
         🎁 <b>Recipient:</b> {recipient}\n\
         {contact_label}: {contact_value}\n\
         \n\
         📍 <b>Delivery:</b>\n\
         • Coordinates: {lat}, {lon}\n\
         • Address: {address}\n\
         • Date: {date}\n\
         • Time: {time}\n\
         \n\
         💌 <b>Card:</b> {card}\n\
         🎭 <b>Anonymous:</b> {anonymous}\n\
         \n\
         💰 <b>Amount:</b>\n\
         • Items: {items_total}\n\
         • Delivery: {delivery_cost}\n\
         • <b>Total: {total}</b>\n\
         \n\
         📦 <b>Items:</b>",
        name = or_not_set(order.name.as_deref()),
        telegram_id = order.telegram_id,
        recipient = escape_html(&order.recipient_name),
        contact_label = contact_label(order.contact_type),
        contact_value = escape_html(&order.contact_value),
        lat = escape_html(&order.latitude),
        lon = escape_html(&order.longitude),
        address = or_not_set(order.address_text.as_deref()),
        date = escape_html(&order.delivery_date),
        time = escape_html(&order.delivery_time),
        card = order
            .card_text
            .as_deref()
            .map(|card| preview(card, CARD_PREVIEW_CHARS))
            .unwrap_or_else(|| "none".into()),
        anonymous = if order.is_anonymous { "yes" } else { "no" },
        items_total = price(order.items_total),
        delivery_cost = price(order.delivery_cost),
        total = price(order.total),
    );

    let mut len = telegram_len(&message);
    let mut omitted = order.items.len();
    for item in &order.items {
        let line = format!(
            "\n• {} ({}) - {} x {}",
            escape_html(&item.product_name),
            item.size,
            price(item.price),
            item.quantity
        );
        let line_len = telegram_len(&line);
        if len + line_len + ITEMS_RESERVE > MESSAGE_LIMIT {
            break;
        }
        message.push_str(&line);
        len += line_len;
        omitted -= 1;
    }
    if omitted > 0 {
        let _ = write!(message, "\n… and {omitted} more");
    }
    fit_message(message)
}

/// Short acknowledgement sent to the customer's own chat.
pub fn customer_message(order_id: OrderId, order: &NewOrder, currency: &str) -> String {
    format!(
        "✅ <b>Order #{order_id} received!</b>\n\
         \n\
         Thank you! We will contact you to confirm the details.\n\
         \n\
         📅 <b>Delivery:</b> {} {}\n\
         💰 <b>Total:</b> {}\n\
         \n\
         <b>Status:</b> awaiting confirmation",
        escape_html(&order.delivery_date),
        escape_html(&order.delivery_time),
        format_price(order.total, currency),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{ItemSize, NewOrderItem};

    fn order() -> NewOrder {
        NewOrder {
            telegram_id: 123456,
            telegram_username: Some("test_user".into()),
            name: Some("Test User".into()),
            recipient_name: "Anna <3".into(),
            contact_type: ContactType::Whatsapp,
            contact_value: "+84900000000".into(),
            latitude: "12.25".into(),
            longitude: "109.19".into(),
            address_text: None,
            delivery_date: "2025-01-20".into(),
            delivery_time: "15:00-18:00".into(),
            card_text: Some("Happy birthday!".into()),
            is_anonymous: true,
            items: vec![
                NewOrderItem {
                    product_name: "Roses".into(),
                    product_photo: "http://x/p.jpg".into(),
                    size: ItemSize::Large,
                    price: 800000,
                    quantity: 1,
                },
                NewOrderItem {
                    product_name: "Tulips & Co".into(),
                    product_photo: "http://x/t.jpg".into(),
                    size: ItemSize::Standard,
                    price: 45000,
                    quantity: 3,
                },
            ],
            items_total: 935000,
            delivery_cost: 100000,
            total: 1035000,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0, "₫"), "0 ₫");
        assert_eq!(format_price(999, "₫"), "999 ₫");
        assert_eq!(format_price(1000, "₫"), "1 000 ₫");
        assert_eq!(format_price(800000, "₫"), "800 000 ₫");
        assert_eq!(format_price(1234567, "VND"), "1 234 567 VND");
        assert_eq!(format_price(-1500, ""), "-1 500");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & c > \"d\""), "a &lt; b &amp; c &gt; &quot;d&quot;");
    }

    #[test]
    fn test_order_message_contains_every_section() {
        let text = format_order_message(17, &order(), "₫");

        assert!(text.starts_with("🆕 <b>New order #17</b>"));
        assert!(text.contains("Test User"));
        assert!(text.contains("@test_user (id 123456)"));
        assert!(text.contains("Anna &lt;3"));
        assert!(text.contains("💬 WhatsApp: +84900000000"));
        assert!(text.contains("Coordinates: 12.25, 109.19"));
        assert!(text.contains("Address: not specified"));
        assert!(text.contains("Date: 2025-01-20"));
        assert!(text.contains("Time: 15:00-18:00"));
        assert!(text.contains("Card:</b> Happy birthday!"));
        assert!(text.contains("Anonymous:</b> yes"));
        assert!(text.contains("Items: 935 000 ₫"));
        assert!(text.contains("Delivery: 100 000 ₫"));
        assert!(text.contains("Total: 1 035 000 ₫"));
        assert!(text.contains("• Roses (large) - 800 000 ₫ x 1"));
        assert!(text.contains("• Tulips &amp; Co (standard) - 45 000 ₫ x 3"));
    }

    #[test]
    fn test_long_card_text_is_shortened() {
        let mut order = order();
        order.card_text = Some("<3".repeat(3000));

        let text = format_order_message(17, &order, "₫");

        assert!(telegram_len(&text) <= MESSAGE_LIMIT);
        assert!(text.contains(&format!("Card:</b> {}…", "&lt;3".repeat(500))));
        assert!(text.contains("Total: 1 035 000 ₫"));
        assert!(text.contains("• Roses (large)"));
    }

    #[test]
    fn test_many_items_are_counted_not_listed() {
        let mut order = order();
        let item = order.items[0].clone();
        order.items = vec![item; 300];

        let text = format_order_message(17, &order, "₫");

        assert!(telegram_len(&text) <= MESSAGE_LIMIT);
        assert!(text.starts_with("🆕 <b>New order #17</b>"));
        let listed = text.matches("• Roses (large)").count();
        assert!(listed > 0 && listed < 300);
        assert!(text.ends_with(&format!("… and {} more", 300 - listed)));
    }

    #[test]
    fn test_oversized_fields_are_cut_on_a_line_boundary() {
        let mut order = order();
        order.address_text = Some("&".repeat(5000));

        let text = format_order_message(17, &order, "₫");

        assert!(telegram_len(&text) <= MESSAGE_LIMIT);
        assert!(text.ends_with(TRUNCATED));
        assert!(text.contains("Coordinates: 12.25, 109.19"));
        assert!(!text.contains("Address:"));
    }

    #[test]
    fn test_customer_message() {
        let text = customer_message(17, &order(), "₫");
        assert!(text.contains("Order #17 received"));
        assert!(text.contains("2025-01-20 15:00-18:00"));
        assert!(text.contains("1 035 000 ₫"));
    }
}
