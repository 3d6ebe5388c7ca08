//! Data entity record.
//!
//! The [`DataEntity`] is the single record type that flows through every tier.
//! The integer `id` is its identity once persisted; `guid_id` is a stable
//! secondary key; `value` is an opaque payload no tier interprets.

use serde::{Deserialize, Serialize};

/// Payload used when a record is created without one.
pub const EMPTY_PAYLOAD: &str = "{}";

/// A stored record.
///
/// # Example
///
/// ```
/// use tiered_cache::DataEntity;
///
/// let entity = DataEntity::new(r#"{"x":1}"#);
///
/// assert_eq!(entity.id, 0); // not persisted yet
/// assert!(!entity.guid_id.is_empty());
/// assert!(!entity.is_deleted);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntity {
    /// Identity assigned by the durable store (0 until first persisted)
    #[serde(default)]
    pub id: i64,
    /// External unique key. Empty when absent from input; the durable store
    /// generates one on insert and keeps the stored one on update.
    #[serde(default)]
    pub guid_id: String,
    /// Opaque payload
    #[serde(default = "default_value")]
    pub value: String,
    /// Soft-delete marker
    #[serde(default)]
    pub is_deleted: bool,
}

fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_value() -> String {
    EMPTY_PAYLOAD.to_string()
}

impl DataEntity {
    /// Create an unpersisted record with a fresh external key.
    ///
    /// An empty or whitespace-only payload is replaced with `"{}"`.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            id: 0,
            guid_id: new_guid(),
            value: if value.trim().is_empty() { default_value() } else { value },
            is_deleted: false,
        }
    }

    /// Rebuild the view a fast tier holds: identity and payload only.
    ///
    /// Cache tiers do not carry the external key or the delete marker, so the
    /// returned record has an empty `guid_id` and `is_deleted == false`.
    pub fn cached(id: i64, value: impl Into<String>) -> Self {
        Self {
            id,
            guid_id: String::new(),
            value: value.into(),
            is_deleted: false,
        }
    }

    /// Builder-style id assignment.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Whether the durable store has assigned an identity yet.
    #[must_use]
    #[inline]
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}

impl Default for DataEntity {
    fn default() -> Self {
        Self::new(EMPTY_PAYLOAD)
    }
}
