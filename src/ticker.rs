/// Market feed messages and the one-line price summaries posted to IRC.
///
/// Payloads look like:
///
/// ```text
/// {"id": 1, "channel": "markets",
///  "text": {"exchange_name": "bitstamp", "currency": "USD", "last": 742.01}}
/// ```
///
/// Only `markets` channel USD quotes produce a summary. The price is
/// colored green or red against the last price seen for the same exchange.
use std::collections::HashMap;

use serde::Deserialize;

/// mIRC color code for a rising price.
const COLOR_UP: &str = "\x033";
/// mIRC color code for a falling price.
const COLOR_DOWN: &str = "\x034";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketMessage {
    #[serde(default)]
    pub id: i64,
    pub channel: String,
    #[serde(default)]
    pub text: serde_json::Map<String, serde_json::Value>,
}

impl MarketMessage {
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Display name for an exchange id.
pub fn exchange_display_name(id: &str) -> &str {
    match id {
        "kraken" => "Kraken",
        "bitstamp" => "Bitstamp",
        "mtgox" => "MtGox",
        other => other,
    }
}

/// Last price seen per exchange, used to pick the summary color.
#[derive(Debug, Default)]
pub struct PriceTracker {
    last: HashMap<String, f64>,
}

impl PriceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary line for a quote, or `None` when the message is not one.
    pub fn summary(&mut self, msg: &MarketMessage) -> Option<String> {
        if msg.channel != "markets" {
            return None;
        }
        let exchange = msg.text.get("exchange_name")?.as_str()?;
        let currency = msg.text.get("currency")?.as_str()?;
        if currency != "USD" {
            return None;
        }
        let last = msg.text.get("last")?.as_f64()?;

        let color = match self.last.insert(exchange.to_owned(), last) {
            Some(prev) if last > prev => COLOR_UP,
            Some(prev) if last < prev => COLOR_DOWN,
            _ => "",
        };

        Some(format!(
            ">{:>13}<{currency}>    Last: {color}${last:5.2}",
            exchange_display_name(exchange)
        ))
    }

    pub fn last_price(&self, exchange: &str) -> Option<f64> {
        self.last.get(exchange).copied()
    }
}
