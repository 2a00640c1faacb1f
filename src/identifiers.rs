//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers keep session, handle, and transaction IDs from being
//! mixed up at compile time.
//!
//! | Type | Origin | Wire form |
//! |------|--------|-----------|
//! | [`SessionId`] | Gateway (`create`) | number or numeric string |
//! | [`HandleId`] | Gateway (`attach`) | number or numeric string |
//! | [`TransactionId`] | Client | opaque string |
//! | [`ListenerId`] | Client (local only) | - |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

// ============================================================================
// Server IDs
// ============================================================================

/// Visitor accepting a JSON number or a numeric string.
struct ServerIdVisitor;

impl Visitor<'_> for ServerIdVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned integer or a numeric string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
        u64::try_from(value).map_err(|_| E::custom(format!("negative id: {value}")))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
        value
            .parse()
            .map_err(|_| E::custom(format!("non-numeric id: {value:?}")))
    }
}

macro_rules! server_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw gateway-assigned ID.
            #[inline]
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw ID.
            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u64(self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(ServerIdVisitor).map(Self)
            }
        }
    };
}

server_id! {
    /// Gateway-assigned session identifier.
    SessionId
}

server_id! {
    /// Gateway-assigned plugin handle identifier.
    HandleId
}

// ============================================================================
// TransactionId
// ============================================================================

/// Client-generated transaction identifier.
///
/// Echoed back by the gateway on every ack, response, and
/// transaction-scoped event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generates a fresh random transaction ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    #[inline]
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransactionId {
    #[inline]
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Next listener token. Tokens are unique across every listener set.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Token returned when registering a listener, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener token.
    #[inline]
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_session_id_from_number() {
        let id: SessionId = serde_json::from_value(json!(123)).expect("number id");
        assert_eq!(id, SessionId::new(123));
    }

    #[test]
    fn test_handle_id_from_string() {
        let id: HandleId = serde_json::from_value(json!("456")).expect("string id");
        assert_eq!(id.as_u64(), 456);
    }

    #[test]
    fn test_server_id_rejects_garbage() {
        assert!(serde_json::from_value::<SessionId>(json!("abc")).is_err());
        assert!(serde_json::from_value::<SessionId>(json!(-1)).is_err());
        assert!(serde_json::from_value::<SessionId>(json!(true)).is_err());
    }

    #[test]
    fn test_server_id_serializes_as_number() {
        let value = serde_json::to_value(SessionId::new(9)).expect("serialize");
        assert_eq!(value, json!(9));
    }

    #[test]
    fn test_transaction_ids_are_distinct() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_listener_ids_increase() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
    }
}
