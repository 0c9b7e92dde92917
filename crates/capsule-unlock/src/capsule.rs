//! Capsule snapshot as read from chain
//!
//! A [`Capsule`] is parsed fresh from the object's field map on every
//! operation and never mutated locally.

use std::collections::BTreeSet;

use capsule_core::{KeyContext, KeyDerivation};
use serde::Serialize;
use serde_json::Value;

use crate::chain::{ChainObject, Fields};
use crate::error::{UnlockError, UnlockResult};

/// Declared unlock condition
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnlockCondition {
    Time { unlock_at_ms: u64 },
    /// `approvers` holds the approvals collected so far
    Multisig { threshold: u32, approvers: BTreeSet<String> },
    Payment { price: u64, paid: bool },
    /// A condition tag this engine does not understand
    Unknown { tag: String },
}

impl UnlockCondition {
    pub fn kind(&self) -> &str {
        match self {
            UnlockCondition::Time { .. } => "time",
            UnlockCondition::Multisig { .. } => "multisig",
            UnlockCondition::Payment { .. } => "payment",
            UnlockCondition::Unknown { tag } => tag,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Capsule {
    pub id: String,
    pub owner: String,
    pub content_id: String,
    #[serde(serialize_with = "hex_bytes")]
    pub content_hash: [u8; 32],
    pub condition: UnlockCondition,
    pub created_at: u64,
    pub unlocked: bool,
    #[serde(skip)]
    pub nonce: Option<[u8; 24]>,
    #[serde(skip)]
    pub key_derivation_salt: Option<[u8; 32]>,
    #[serde(skip)]
    pub key_derivation: Option<KeyDerivation>,
    #[serde(skip)]
    pub key_derivation_id: Option<String>,
}

fn hex_bytes<S: serde::Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

impl Capsule {
    /// Parse a chain object into a capsule snapshot
    pub fn from_object(object: &ChainObject) -> UnlockResult<Self> {
        Self::from_fields(&object.object_id, &object.fields)
    }

    pub fn from_fields(id: &str, fields: &Fields) -> UnlockResult<Self> {
        let reader = FieldReader { id, fields };

        Ok(Self {
            id: id.to_string(),
            owner: reader.string("owner")?,
            content_id: reader.string("cid")?,
            content_hash: reader.fixed_bytes("content_hash")?,
            condition: reader.condition()?,
            created_at: reader.optional_u64("created_at")?.unwrap_or(0),
            unlocked: reader.optional_bool("unlocked")?.unwrap_or(false),
            nonce: reader.optional_fixed_bytes("nonce")?,
            key_derivation_salt: reader.optional_fixed_bytes("key_derivation_salt")?,
            key_derivation: reader
                .optional_string("key_derivation")?
                .map(|s| s.parse::<KeyDerivation>())
                .transpose()
                .map_err(|e| reader.invalid("key_derivation", &e.to_string()))?,
            key_derivation_id: reader.optional_string("key_derivation_id")?,
        })
    }

    /// Key id mixed into wallet derivation: the client-chosen id, else the object id
    pub fn key_id(&self) -> &str {
        self.key_derivation_id.as_deref().unwrap_or(&self.id)
    }

    /// Unlock time mixed into wallet derivation (0 for non-time conditions)
    pub fn key_unlock_time_ms(&self) -> u64 {
        match self.condition {
            UnlockCondition::Time { unlock_at_ms } => unlock_at_ms,
            _ => 0,
        }
    }

    pub fn key_context(&self, wallet_address: &str) -> KeyContext {
        KeyContext::new(wallet_address, self.key_id(), self.key_unlock_time_ms())
    }
}

struct FieldReader<'a> {
    id: &'a str,
    fields: &'a Fields,
}

impl FieldReader<'_> {
    fn invalid(&self, field: &str, reason: &str) -> UnlockError {
        UnlockError::InvalidCapsule(format!("{}: field '{field}' {reason}", self.id))
    }

    fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    fn string(&self, field: &str) -> UnlockResult<String> {
        self.optional_string(field)?
            .ok_or_else(|| self.invalid(field, "is missing"))
    }

    fn optional_string(&self, field: &str) -> UnlockResult<Option<String>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(field, "is not a string")),
        }
    }

    /// u64 values arrive as JSON numbers or decimal strings
    fn optional_u64(&self, field: &str) -> UnlockResult<Option<u64>> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => parse_u64(value)
                .map(Some)
                .ok_or_else(|| self.invalid(field, "is not an unsigned integer")),
        }
    }

    fn required_u64(&self, field: &str) -> UnlockResult<u64> {
        self.optional_u64(field)?
            .ok_or_else(|| self.invalid(field, "is missing"))
    }

    fn optional_bool(&self, field: &str) -> UnlockResult<Option<bool>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.invalid(field, "is not a boolean")),
        }
    }

    fn optional_fixed_bytes<const N: usize>(&self, field: &str) -> UnlockResult<Option<[u8; N]>> {
        let Some(value) = self.get(field) else {
            return Ok(None);
        };
        let bytes = parse_bytes(value).ok_or_else(|| self.invalid(field, "is not a byte array or hex string"))?;
        let len = bytes.len();
        bytes
            .try_into()
            .map(Some)
            .map_err(|_| self.invalid(field, &format!("must be {N} bytes, got {len}")))
    }

    fn fixed_bytes<const N: usize>(&self, field: &str) -> UnlockResult<[u8; N]> {
        self.optional_fixed_bytes(field)?
            .ok_or_else(|| self.invalid(field, "is missing"))
    }

    fn approvals(&self) -> UnlockResult<BTreeSet<String>> {
        match self.get("approvals") {
            None => Ok(BTreeSet::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|s| s.trim().to_ascii_lowercase())
                        .ok_or_else(|| self.invalid("approvals", "contains a non-address entry"))
                })
                .collect(),
            Some(_) => Err(self.invalid("approvals", "is not an array")),
        }
    }

    /// Explicit `condition_type` wins; otherwise the variant is inferred from
    /// which condition fields are present.
    fn condition(&self) -> UnlockResult<UnlockCondition> {
        let tag = match self.optional_string("condition_type")? {
            Some(tag) => tag,
            None if self.get("unlock_time_ms").is_some() => "time".into(),
            None if self.get("threshold").is_some() => "multisig".into(),
            None if self.get("price").is_some() => "payment".into(),
            None => "none".into(),
        };

        match tag.as_str() {
            "time" => Ok(UnlockCondition::Time {
                unlock_at_ms: self.required_u64("unlock_time_ms")?,
            }),
            "multisig" => {
                let threshold = self.required_u64("threshold")?;
                let threshold = u32::try_from(threshold).map_err(|_| self.invalid("threshold", "overflows u32"))?;
                Ok(UnlockCondition::Multisig {
                    threshold,
                    approvers: self.approvals()?,
                })
            }
            "payment" => Ok(UnlockCondition::Payment {
                price: self.required_u64("price")?,
                paid: self.optional_bool("paid")?.unwrap_or(false),
            }),
            _ => Ok(UnlockCondition::Unknown { tag }),
        }
    }
}

fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Bytes arrive as `[u8]` arrays or hex strings (optional `0x`)
fn parse_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        Value::String(s) => hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn base() -> Value {
        json!({
            "owner": "0xabc",
            "cid": "cid-1",
            "content_hash": vec![7u8; 32],
            "created_at": "1700000000000",
            "unlocked": false,
        })
    }

    fn with(mut value: Value, extra: Value) -> Fields {
        for (k, v) in fields(extra) {
            value[k] = v;
        }
        fields(value)
    }

    #[test]
    fn test_parse_time_capsule() {
        let capsule = Capsule::from_fields(
            "0x1",
            &with(base(), json!({ "unlock_time_ms": "1700000000000", "key_derivation_salt": hex::encode([1u8; 32]) })),
        )
        .unwrap();

        assert_eq!(capsule.owner, "0xabc");
        assert_eq!(capsule.content_hash, [7u8; 32]);
        assert_eq!(capsule.created_at, 1_700_000_000_000);
        assert_eq!(
            capsule.condition,
            UnlockCondition::Time {
                unlock_at_ms: 1_700_000_000_000
            }
        );
        assert_eq!(capsule.key_derivation_salt, Some([1u8; 32]));
        assert_eq!(capsule.key_id(), "0x1");
        assert_eq!(capsule.key_unlock_time_ms(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_multisig_capsule() {
        let capsule = Capsule::from_fields(
            "0x2",
            &with(base(), json!({ "threshold": 2, "approvals": ["0xA", "0xb"], "key_derivation_id": "kid" })),
        )
        .unwrap();

        let UnlockCondition::Multisig { threshold, approvers } = &capsule.condition else {
            panic!("expected multisig");
        };
        assert_eq!(*threshold, 2);
        assert!(approvers.contains("0xa"));
        assert_eq!(capsule.key_id(), "kid");
        assert_eq!(capsule.key_unlock_time_ms(), 0);
    }

    #[test]
    fn test_parse_payment_and_unknown() {
        let payment = Capsule::from_fields("0x3", &with(base(), json!({ "price": 1000, "paid": true }))).unwrap();
        assert_eq!(payment.condition, UnlockCondition::Payment { price: 1000, paid: true });

        let unknown = Capsule::from_fields("0x4", &with(base(), json!({ "condition_type": "oracle" }))).unwrap();
        assert_eq!(unknown.condition, UnlockCondition::Unknown { tag: "oracle".into() });
        assert_eq!(unknown.condition.kind(), "oracle");
    }

    #[test]
    fn test_wrong_length_bytes_rejected() {
        let mut bad = fields(base());
        bad.insert("content_hash".into(), json!(vec![1u8; 31]));
        bad.insert("unlock_time_ms".into(), json!(1));
        let err = Capsule::from_fields("0x5", &bad).unwrap_err();
        assert!(matches!(err, UnlockError::InvalidCapsule(_)));
        assert!(err.to_string().contains("must be 32 bytes"));

        let nonce = with(base(), json!({ "unlock_time_ms": 1, "nonce": vec![0u8; 12] }));
        assert!(Capsule::from_fields("0x6", &nonce).is_err());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut no_cid = fields(base());
        no_cid.remove("cid");
        assert!(matches!(
            Capsule::from_fields("0x7", &no_cid),
            Err(UnlockError::InvalidCapsule(_))
        ));

        let no_time = with(base(), json!({ "condition_type": "time" }));
        assert!(Capsule::from_fields("0x8", &no_time).is_err());
    }

    #[test]
    fn test_key_derivation_recorded() {
        let capsule = Capsule::from_fields(
            "0x9",
            &with(base(), json!({ "unlock_time_ms": 1, "key_derivation": "argon2id-m64-t1-p1" })),
        )
        .unwrap();
        assert_eq!(
            capsule.key_derivation,
            Some(KeyDerivation::Argon2id {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1
            })
        );

        let bad = with(base(), json!({ "unlock_time_ms": 1, "key_derivation": "rot13" }));
        assert!(Capsule::from_fields("0xa", &bad).is_err());
    }
}
