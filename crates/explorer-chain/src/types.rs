use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Error;

pub type BlockNumber = u64;

/// 32 bytes hash in its canonical `0x`-prefixed lowercase hex form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash(String);

impl Hash {
    /// Number of hex digits of a hash, prefix excluded
    pub const DIGITS: usize = 64;

    pub fn parse(value: &str) -> Result<Self, Error> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| Error::InvalidHash(value.to_string()))?;

        if digits.len() != Self::DIGITS || !digits.bytes().all(|x| x.is_ascii_hexdigit()) {
            return Err(Error::InvalidHash(value.to_string()));
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(Self::DIGITS)))
    }

    /// Nodes answer with the zero hash for blocks that were not produced yet
    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|x| x == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Hash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Hash> for String {
    fn from(value: Hash) -> Self {
        value.0
    }
}

/// A block is designated either by its height or by its hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockIdentifier {
    Number(BlockNumber),
    Hash(Hash),
}

impl Display for BlockIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "#{}", number),
            Self::Hash(hash) => write!(f, "{}", hash),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub number: BlockNumber,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub state_root: Hash,
    pub extrinsics_root: Hash,

    /// Only known on extended headers
    #[serde(default)]
    pub author: Option<String>,
}

impl Header {
    /// The genesis block has the zero hash as parent
    pub fn has_parent(&self) -> bool {
        !self.parent_hash.is_zero()
    }
}

/// Pallet index and call index of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallIndex(pub u8, pub u8);

impl CallIndex {
    pub fn to_hex(&self) -> String {
        format!("0x{:02x}{:02x}", self.0, self.1)
    }
}

impl TryFrom<String> for CallIndex {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value.strip_prefix("0x").unwrap_or(&value);
        if digits.len() != 4 || !digits.is_ascii() {
            return Err(Error::Format(format!("invalid call index {}", value)));
        }

        let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|e| Error::Format(format!("invalid call index {}: {}", value, e)));
        Ok(Self(byte(&digits[..2])?, byte(&digits[2..])?))
    }
}

impl From<CallIndex> for String {
    fn from(value: CallIndex) -> Self {
        value.to_hex()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArgument {
    pub name: String,
    pub value: Value,
}

impl CallArgument {
    pub fn new(name: &str, value: Value) -> Self {
        Self { name: name.to_string(), value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub section: String,
    pub method: String,

    #[serde(rename = "callIndex")]
    pub index: CallIndex,

    #[serde(default)]
    pub args: Vec<CallArgument>,
}

impl Call {
    /// Positional access to the call arguments
    pub fn arg(&self, position: usize) -> Option<&Value> {
        self.args.get(position).map(|x| &x.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrinsic {
    pub hash: Hash,

    #[serde(alias = "method")]
    pub call: Call,

    #[serde(default)]
    pub signer: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub tip: Option<String>,
}

impl Extrinsic {
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,

    #[serde(default)]
    pub extrinsics: Vec<Extrinsic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub phase: Phase,
    pub section: String,
    pub method: String,

    #[serde(default)]
    pub data: Vec<Value>,
}

impl Event {
    pub fn is_emitted_by(&self, extrinsic_index: usize) -> bool {
        matches!(self.phase, Phase::ApplyExtrinsic(index) if index as usize == extrinsic_index)
    }
}

/// Tips are compact integers which nodes render either as JSON numbers or strings
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) => Some(value),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn hash_is_normalized_to_lowercase() {
        let hash = Hash::parse("0xABCDEF0000000000000000000000000000000000000000000000000000000001").unwrap();

        assert_eq!(hash.as_str(), "0xabcdef0000000000000000000000000000000000000000000000000000000001");
    }

    #[test]
    fn hash_rejects_wrong_length_and_missing_prefix() {
        assert!(Hash::parse("0x1234").is_err());
        assert!(Hash::parse(&"a".repeat(64)).is_err());
        assert!(Hash::parse(&format!("0x{}", "g".repeat(64))).is_err());
    }

    #[test]
    fn zero_hash_is_detected() {
        assert!(Hash::zero().is_zero());
        assert!(!Hash::parse(&format!("0x{:064x}", 1)).unwrap().is_zero());
    }

    #[test]
    fn call_index_round_trips_through_hex() {
        let index = CallIndex::try_from("0x0300".to_string()).unwrap();

        assert_eq!(index, CallIndex(3, 0));
        assert_eq!(index.to_hex(), "0x0300");
        assert!(CallIndex::try_from("0x03".to_string()).is_err());
    }

    #[test]
    fn non_ascii_call_index_is_a_format_error() {
        let result = CallIndex::try_from("a\u{e9}b".to_string());

        assert!(matches!(result, Err(Error::Format(_))));
    }

    #[test]
    fn extrinsic_accepts_gateway_shape() {
        // Given
        let value = json!({
            "hash": format!("0x{:064x}", 7),
            "method": {
                "section": "balances",
                "method": "transferKeepAlive",
                "callIndex": "0x0503",
                "args": [
                    { "name": "dest", "value": { "id": "5Dest" } },
                    { "name": "value", "value": 1000 }
                ]
            },
            "signer": "5Signer",
            "tip": 0
        });

        // When
        let extrinsic: Extrinsic = serde_json::from_value(value).unwrap();

        // Then
        assert_eq!(extrinsic.call.index, CallIndex(5, 3));
        assert_eq!(extrinsic.call.arg(1), Some(&json!(1000)));
        assert_eq!(extrinsic.tip.as_deref(), Some("0"));
        assert!(extrinsic.is_signed());
    }

    #[test]
    fn event_phase_matches_extrinsic_index() {
        let event: Event = serde_json::from_value(json!({
            "phase": { "applyExtrinsic": 2 },
            "section": "balances",
            "method": "Transfer",
            "data": []
        }))
        .unwrap();

        assert!(event.is_emitted_by(2));
        assert!(!event.is_emitted_by(1));
    }
}
