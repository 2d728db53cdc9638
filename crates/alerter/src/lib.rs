use crate::error::AlerterError;
use configuration::TelegramConfig;
use core_types::Side;
use events::{EngineEvent, LogLevel};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::broadcast;
pub mod error;

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str, // To allow for formatting like bold, italics etc.
}

/// A client for sending messages to the Telegram Bot API.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Creates a new `TelegramAlerter`.
    ///
    /// Returns `None` when disabled or when the token or chat_id is missing,
    /// allowing the system to run without notifications.
    pub fn new(config: &TelegramConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        if config.token.is_empty() || config.chat_id.is_empty() {
            tracing::warn!("Telegram alerter is enabled but not configured (missing token or chat_id).");
            return None;
        }
        Some(Self {
            client: Client::new(),
            token: config.token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Sends a text message to the configured Telegram chat.
    pub async fn send_message(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to decode error response".to_string());
            return Err(AlerterError::Rejected { status: status.as_u16(), body });
        }

        Ok(())
    }
}

/// Renders the events worth a notification. Everything else maps to `None`.
pub fn format_event(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::Log(log) => match log.level {
            LogLevel::Error => Some(format!("🚨 *ERROR*: {}", escape_markdown(&log.message))),
            LogLevel::Warn => Some(format!("⚠️ *WARNING*: {}", escape_markdown(&log.message))),
            LogLevel::Info => None,
        },
        EngineEvent::SignalFound(signal) => Some(format!(
            "🔎 *{} {}* {} signal, tier {}\nentry `{}` volume `{:.2}x`",
            signal.side,
            escape_markdown(&signal.symbol),
            escape_markdown(&signal.strategy.to_string()),
            signal.tier,
            signal.entry_price,
            signal.volume_ratio
        )),
        EngineEvent::PositionOpened(opened) => Some(format!(
            "{} *Opened {} {}*\nsize `{}` @ `{}`\nstop `{}`",
            side_icon(opened.side),
            opened.side,
            escape_markdown(&opened.symbol),
            opened.quantity,
            opened.entry_price,
            opened.stop_price
        )),
        EngineEvent::StageTransition(stage) => Some(format!(
            "🛡 *{}* {}\nstop `{}` closed `{}` remaining `{}`",
            escape_markdown(&stage.symbol),
            escape_markdown(&format!("{:?}", stage.stage)),
            stage.new_stop,
            stage.closed_quantity,
            stage.remaining_size
        )),
        EngineEvent::PositionClosed(closed) => Some(format!(
            "🏁 *Closed {} {}*: {}\nquantity `{}`",
            closed.side,
            escape_markdown(&closed.symbol),
            escape_markdown(&closed.reason.to_string()),
            closed.closed_quantity
        )),
        EngineEvent::AccountSnapshot(_) => None,
    }
}

fn side_icon(side: Side) -> &'static str {
    match side {
        Side::Long => "📈",
        Side::Short => "📉",
    }
}

/// A long-running service that listens to the engine's event stream and
/// forwards notable events to Telegram. Delivery failures are logged and dropped.
pub async fn run_alerter_service(alerter: TelegramAlerter, mut event_rx: broadcast::Receiver<EngineEvent>) {
    tracing::info!("Alerter service started.");

    if let Err(e) = alerter.send_message("✅ *Tradelane engine started*").await {
        tracing::warn!(error = %e, "Failed to send the Telegram startup message.");
    }

    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if let Some(msg) = format_event(&event) {
                    if let Err(e) = alerter.send_message(&msg).await {
                        tracing::error!(error = %e, "Failed to send Telegram alert.");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Alerter service lagged, skipped {} messages.", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event stream closed. Alerter service shutting down.");
                break;
            }
        }
    }
}

/// Escapes characters that have special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"\_*[]()~`>#+-=|{}.!";
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special_chars.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::CloseReason;
    use events::PositionClosed;
    use rust_decimal_macros::dec;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("BTC/USDT 1.5R!"), r"BTC/USDT 1\.5R\!");
        assert_eq!(escape_markdown(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_info_logs_are_silent() {
        assert!(format_event(&EngineEvent::log(LogLevel::Info, "cycle done")).is_none());
        let warn = format_event(&EngineEvent::log(LogLevel::Warn, "stop re-placed")).unwrap();
        assert!(warn.contains("WARNING"));
    }

    #[test]
    fn test_close_message_names_the_reason() {
        let event = EngineEvent::PositionClosed(PositionClosed {
            timestamp: Utc::now(),
            symbol: "ETH/USDT".into(),
            side: core_types::Side::Short,
            reason: CloseReason::StopHit,
            price: dec!(2500),
            closed_quantity: dec!(0.3),
        });
        let msg = format_event(&event).unwrap();
        assert!(msg.contains("SHORT ETH/USDT"));
        assert!(msg.contains("stop hit"));
        assert!(msg.contains("`0.3`"));
    }
}
