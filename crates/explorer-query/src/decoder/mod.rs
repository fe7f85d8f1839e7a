use chrono::{DateTime, Utc};
use explorer_chain::Extrinsic;
use serde::Serialize;
use serde_json::Value;

mod balance;
pub use balance::{BalanceConfiguration, BalanceFormatter};

pub const UNKNOWN: &str = "unknown";
pub const ALL_AVAILABLE_BALANCE: &str = "All available balance";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// Human oriented view of an extrinsic. Every field is always populated, missing
/// values are rendered as [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedTransaction {
    Transfer {
        from: String,
        to: String,
        amount: String,
        fee: String,
    },
    Timestamp {
        from: String,
        human_time: String,
        raw_timestamp: String,
        call_index_hex: String,
    },
    Other {
        from: String,
        raw_details: String,
    },
}

impl DecodedTransaction {
    pub fn sender(&self) -> &str {
        match self {
            Self::Transfer { from, .. } | Self::Timestamp { from, .. } | Self::Other { from, .. } => from,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtrinsicDecoder {
    formatter: BalanceFormatter,
}

impl ExtrinsicDecoder {
    pub fn new(configuration: &BalanceConfiguration) -> Self {
        Self {
            formatter: BalanceFormatter::new(configuration),
        }
    }

    pub fn decode(&self, extrinsic: &Extrinsic) -> DecodedTransaction {
        let from = extrinsic.signer.clone().unwrap_or_else(unknown);
        let call = &extrinsic.call;

        match (call.section.as_str(), call.method.as_str()) {
            ("balances", method) if method.starts_with("transfer") => DecodedTransaction::Transfer {
                from,
                to: call.arg(0).map(account_id).unwrap_or_else(unknown),
                amount: if is_transfer_all(method) {
                    ALL_AVAILABLE_BALANCE.to_string()
                } else {
                    call.arg(1).and_then(|x| self.formatter.format_value(x)).unwrap_or_else(unknown)
                },
                fee: extrinsic.tip.clone().unwrap_or_else(unknown),
            },
            ("timestamp", "set") => {
                let timestamp = call.arg(0).and_then(as_integer);

                DecodedTransaction::Timestamp {
                    from,
                    human_time: timestamp.and_then(human_time).unwrap_or_else(unknown),
                    raw_timestamp: timestamp.map(|x| x.to_string()).unwrap_or_else(unknown),
                    call_index_hex: call.index.to_hex(),
                }
            },
            _ => DecodedTransaction::Other {
                from,
                raw_details: serde_json::to_string(call).unwrap_or_else(|_| unknown()),
            },
        }
    }
}

fn is_transfer_all(method: &str) -> bool {
    method == "transferAll" || method == "transfer_all"
}

/// Destination of a transfer, either a plain account or a `MultiAddress::Id`
fn account_id(value: &Value) -> String {
    match value {
        Value::String(account) => account.clone(),
        Value::Object(address) => match address.get("id").or_else(|| address.get("Id")) {
            Some(Value::String(account)) => account.clone(),
            _ => value.to_string(),
        },
        _ => value.to_string(),
    }
}

fn as_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn human_time(milliseconds: u64) -> Option<String> {
    let time: DateTime<Utc> = DateTime::from_timestamp_millis(i64::try_from(milliseconds).ok()?)?;

    Some(time.format(TIME_FORMAT).to_string())
}
