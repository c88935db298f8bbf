//! Per-user change digest (`user_data_hashes` row) and the events folded into it.
//!
//! Each change event hashes to a 256-bit element; the digest is the sum of
//! all elements modulo 2^256. Addition is commutative and associative, so the
//! digest depends only on which changes were applied, not on the order
//! concurrent writers reported them. Applying the same change twice moves the
//! digest again instead of cancelling out as XOR would.

use super::{EntityId, EntityKind, UserId};
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

const ELEMENT_DOMAIN: &[u8] = b"quizcore/change/v1";

/// Opaque 256-bit digest token, hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DigestValue([u8; 32]);

impl DigestValue {
    pub const EMPTY: DigestValue = DigestValue([0; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(text: &str) -> CoreResult<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|e| CoreError::InvalidValue(format!("bad digest '{text}': {e}")))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Adds `other` modulo 2^256, treating both as little-endian integers.
    pub fn combine(&self, other: &DigestValue) -> DigestValue {
        let mut out = [0u8; 32];
        let mut carry = false;
        for limb in 0..4 {
            let range = limb * 8..limb * 8 + 8;
            let a = u64::from_le_bytes(limb_bytes(&self.0, limb));
            let b = u64::from_le_bytes(limb_bytes(&other.0, limb));
            let (sum, c1) = a.overflowing_add(b);
            let (sum, c2) = sum.overflowing_add(u64::from(carry));
            carry = c1 || c2;
            out[range].copy_from_slice(&sum.to_le_bytes());
        }
        DigestValue(out)
    }
}

fn limb_bytes(bytes: &[u8; 32], limb: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[limb * 8..limb * 8 + 8]);
    out
}

impl fmt::Debug for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestValue({})", self.to_hex())
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for DigestValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DigestValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        DigestValue::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// A record owned by a user changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub user_id: UserId,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn element(&self) -> DigestValue {
        let kind = self.entity_kind.as_str().as_bytes();
        let mut hasher = Sha256::new();
        hasher.update(ELEMENT_DOMAIN);
        hasher.update(self.user_id.get().to_le_bytes());
        hasher.update((kind.len() as u32).to_le_bytes());
        hasher.update(kind);
        hasher.update(self.entity_id.get().to_le_bytes());
        hasher.update(self.occurred_at.timestamp_millis().to_le_bytes());
        DigestValue(hasher.finalize().into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDigest {
    pub user_id: UserId,
    pub hash_value: DigestValue,
    pub updated_at: DateTime<Utc>,
}

impl ChangeDigest {
    /// Digest of a user nothing has been recorded for.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            hash_value: DigestValue::EMPTY,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Digest of a user whose first recorded change is `change`.
    ///
    /// `updated_at` is taken from the change itself, so changes dated before
    /// the Unix epoch are kept as they are.
    pub fn from_change(change: &ChangeEvent) -> Self {
        Self {
            user_id: change.user_id,
            hash_value: change.element(),
            updated_at: change.occurred_at,
        }
    }

    /// Folds one more change into a digest that already holds at least one.
    pub fn apply(&self, change: &ChangeEvent) -> ChangeDigest {
        ChangeDigest {
            user_id: self.user_id,
            hash_value: self.hash_value.combine(&change.element()),
            updated_at: self.updated_at.max(change.occurred_at),
        }
    }
}
