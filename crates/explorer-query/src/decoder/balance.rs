use std::str::FromStr;

use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_decimals() -> u32 {
    12
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceConfiguration {
    /// Number of decimals of the chain native token
    #[serde(default = "default_decimals")]
    pub decimals: u32,

    /// Symbol appended to formatted amounts
    #[serde(default)]
    pub unit: Option<String>,
}

impl Default for BalanceConfiguration {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            unit: None,
        }
    }
}

/// Renders raw planck amounts as human readable token amounts
#[derive(Debug, Clone)]
pub struct BalanceFormatter {
    decimals: u32,
    unit: Option<String>,
}

impl BalanceFormatter {
    pub fn new(configuration: &BalanceConfiguration) -> Self {
        Self {
            decimals: configuration.decimals,
            unit: configuration.unit.clone(),
        }
    }

    /// Formats a balance argument as found in a decoded call. Accepts JSON numbers,
    /// decimal strings and `0x` prefixed hex strings.
    pub fn format_value(&self, value: &Value) -> Option<String> {
        let raw = match value {
            Value::Number(number) => BigInt::from_str(&number.to_string()).ok()?,
            Value::String(text) => parse_amount(text.trim())?,
            _ => return None,
        };

        if raw.sign() == Sign::Minus {
            return None;
        }

        Some(self.format(raw))
    }

    pub fn format(&self, raw: BigInt) -> String {
        let amount = BigDecimal::new(raw, self.decimals as i64).normalized().to_plain_string();

        let (integer, fraction) = match amount.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (amount.as_str(), None),
        };

        let mut formatted = group_thousands(integer);
        if let Some(fraction) = fraction {
            formatted.push('.');
            formatted.push_str(fraction);
        }

        match &self.unit {
            Some(unit) => format!("{} {}", formatted, unit),
            None => formatted,
        }
    }
}

fn parse_amount(text: &str) -> Option<BigInt> {
    match text.strip_prefix("0x") {
        Some(digits) => BigInt::parse_bytes(digits.as_bytes(), 16),
        None => BigInt::from_str(text).ok(),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (position, digit) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    grouped
}
