//! Delivery through the Telegram Bot API `sendMessage` method.

use std::time::Duration;

use app_config::AppConfig;
use async_trait::async_trait;
use model::{NewOrder, OrderId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::format::{customer_message, format_order_message};
use crate::{Notifier, NotifyError};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

/// Sends new-order messages to the operator chat through a Telegram bot.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    send_message_url: String,
    admin_chat_id: i64,
    currency: String,
    notify_customer: bool,
}

impl TelegramNotifier {
    /// Creates a notifier for the bot identified by `bot_token`.
    ///
    /// # Arguments
    /// * `api_base` - Bot API base URL, e.g. `https://api.telegram.org`
    /// * `bot_token` - Bot token issued by BotFather
    /// * `admin_chat_id` - Chat receiving order summaries
    /// * `timeout` - Limit for one HTTP request
    pub fn new(
        api_base: &str,
        bot_token: &str,
        admin_chat_id: i64,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        if bot_token.is_empty() {
            return Err(NotifyError::Config("bot token is empty".into()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            send_message_url: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            ),
            admin_chat_id,
            currency: "₫".to_string(),
            notify_customer: false,
        })
    }

    /// Builds the notifier from configuration; `Ok(None)` when the bot token or
    /// admin chat is not configured.
    pub fn from_config(cfg: &AppConfig) -> Result<Option<Self>, NotifyError> {
        let (Some(token), Some(chat_id)) = (cfg.bot_token.as_deref(), cfg.admin_chat_id) else {
            return Ok(None);
        };
        if !cfg.telegram_enabled() {
            return Ok(None);
        }
        let notifier = Self::new(&cfg.telegram_api_base, token, chat_id, cfg.notify_timeout)?
            .with_currency(&cfg.currency_symbol)
            .with_customer_ack(cfg.notify_customer);
        Ok(Some(notifier))
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    /// Also acknowledge the order in the customer's own chat.
    pub fn with_customer_ack(mut self, enabled: bool) -> Self {
        self.notify_customer = enabled;
        self
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.send_message_url)
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await?;

        let status = response.status();
        debug!(status = %status, chat_id, "sendMessage response received");
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, order_id: OrderId, order: &NewOrder) -> Result<(), NotifyError> {
        let text = format_order_message(order_id, order, &self.currency);
        self.send_message(self.admin_chat_id, &text).await?;

        if self.notify_customer {
            let ack = customer_message(order_id, order, &self.currency);
            if let Err(e) = self.send_message(order.telegram_id, &ack).await {
                // The operator already has the order; a missed acknowledgement is not a failure.
                warn!(order_id, error = %e, "failed to acknowledge order to customer");
            }
        }
        Ok(())
    }
}
