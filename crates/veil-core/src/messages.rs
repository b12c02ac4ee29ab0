//! Messages exchanged with the persistence gateway.
//!
//! Every message kind is a closed enum tagged by `action`, so handlers match
//! exhaustively instead of inspecting a loosely-typed object.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical stores (object stores / tables) in the persistence layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreName {
    /// Filter lists keyed by list name.
    FilterLists,
    /// Semantic subjects keyed by description.
    MlSubjects,
    /// Scalar settings (default action, ML method, inference, cost ledger).
    Settings,
    /// Disabled hostnames.
    Blacklist,
    /// Persisted per-word hit counters.
    WordStats,
}

impl StoreName {
    /// Every store, in a fixed order.
    pub const ALL: [Self; 5] = [
        Self::FilterLists,
        Self::MlSubjects,
        Self::Settings,
        Self::Blacklist,
        Self::WordStats,
    ];

    /// Storage name of the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilterLists => "filterLists",
            Self::MlSubjects => "mlSubjects",
            Self::Settings => "settings",
            Self::Blacklist => "blacklist",
            Self::WordStats => "wordStats",
        }
    }

    /// Parse a storage name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request sent to the persistence gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StoreRequest {
    /// Read one key.
    Get {
        /// Target store.
        store: StoreName,
        /// Key within the store.
        key: String,
    },
    /// Write one key.
    Set {
        /// Target store.
        store: StoreName,
        /// Key within the store.
        key: String,
        /// New value.
        value: Value,
    },
    /// Delete one key.
    Delete {
        /// Target store.
        store: StoreName,
        /// Key within the store.
        key: String,
    },
    /// Read every key of a store.
    GetAll {
        /// Target store.
        store: StoreName,
    },
}

impl StoreRequest {
    /// Whether handling this request changes persisted state.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Set { .. } | Self::Delete { .. })
    }
}

/// Reply from the persistence gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum StoreResponse {
    /// Result of a `get` (absent keys are `None`).
    Value(Option<Value>),
    /// Result of a `getAll`.
    All(BTreeMap<String, Value>),
    /// A mutation was applied.
    Ack,
}

/// Broadcast whenever a persisted key changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StoreNotification {
    /// A key was written (`value: Some`) or deleted (`value: None`).
    DataChanged {
        /// Store the key lives in.
        store: StoreName,
        /// Changed key.
        key: String,
        /// New value, or `None` after deletion.
        value: Option<Value>,
    },
}

impl StoreNotification {
    /// Store the notification refers to.
    pub fn store(&self) -> StoreName {
        match self {
            Self::DataChanged { store, .. } => *store,
        }
    }

    /// Key the notification refers to.
    pub fn key(&self) -> &str {
        match self {
            Self::DataChanged { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tagged_by_action() {
        let req = StoreRequest::Set {
            store: StoreName::Blacklist,
            key: "example.com".into(),
            value: Value::Bool(true),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "set");
        assert_eq!(json["store"], "blacklist");
        assert!(req.is_mutation());

        let parsed: StoreRequest =
            serde_json::from_str(r#"{"action":"getAll","store":"filterLists"}"#).unwrap();
        assert_eq!(parsed, StoreRequest::GetAll { store: StoreName::FilterLists });
        assert!(!parsed.is_mutation());
    }

    #[test]
    fn unknown_action_rejected() {
        let result = serde_json::from_str::<StoreRequest>(r#"{"action":"explode","store":"settings"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn notification_wire_shape() {
        let n = StoreNotification::DataChanged {
            store: StoreName::FilterLists,
            key: "spoilers".into(),
            value: None,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["action"], "dataChanged");
        assert_eq!(n.store(), StoreName::FilterLists);
        assert_eq!(n.key(), "spoilers");
    }

    #[test]
    fn store_names_roundtrip() {
        for store in StoreName::ALL {
            assert_eq!(StoreName::parse(store.as_str()), Some(store));
        }
        assert_eq!(StoreName::parse("nope"), None);
    }
}
