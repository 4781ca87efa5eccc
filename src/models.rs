//! Shared data structures used throughout the application.

use crate::errors::{AppError, Result};
use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// Currency label prefixed to every rendered price.
pub const QUOTED_CURRENCY: &str = "USD";

/// Fractional digits of a rendered price.
pub const PRICE_DECIMALS: usize = 8;

/// Lifecycle of the single transport session owned by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Inbound price frame as broadcast by the oracle service.
///
/// Only `priceIndex` is required. The remaining fields are informational and
/// silently dropped when they carry an unexpected type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceMessage {
    pub price_index: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub height: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub quote: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub node_address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: Option<i64>,
}

impl PriceMessage {
    /// Parse a raw text frame into a `PriceMessage`.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| AppError::MalformedPayload(format!("invalid JSON: {e}")))?;
        // serde would happily build a struct out of a JSON array
        if !value.is_object() {
            return Err(AppError::MalformedPayload(
                "expected a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| AppError::MalformedPayload(e.to_string()))
    }

    /// Display fragment for this message, e.g. `USD 1.50000000`.
    pub fn to_fragment(&self) -> String {
        format_price(self.price_index)
    }
}

/// Format a price index as `USD <value>` with exactly eight fractional digits.
///
/// Rounds the exact binary value half away from zero, the same way the
/// browser's `Number.prototype.toFixed` does.
pub fn format_price(price_index: f64) -> String {
    let Ok(exact) = BigDecimal::try_from(price_index.abs()) else {
        return format!("{QUOTED_CURRENCY} {price_index}");
    };
    let (units, _scale) = exact
        .with_scale_round(PRICE_DECIMALS as i64, RoundingMode::HalfUp)
        .as_bigint_and_exponent();
    let digits = format!("{:0>width$}", units.to_string(), width = PRICE_DECIMALS + 1);
    let (whole, frac) = digits.split_at(digits.len() - PRICE_DECIMALS);
    // -0 renders as plain zero, anything below zero keeps its sign
    let sign = if price_index < 0.0 { "-" } else { "" };
    format!("{QUOTED_CURRENCY} {sign}{whole}.{frac}")
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Outcome of a session that ended with a close rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub state: ConnectionState,
    pub frames_rendered: u64,
    pub frames_discarded: u64,
    pub last_rendered: Option<String>,
}
