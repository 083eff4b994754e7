//! Queued action data structure.
//!
//! The [`QueuedAction`] is the unit of work that flows through the queue.
//! Each action has a client-generated UUID (its idempotency key), a typed
//! tag selecting the executor, a JSON payload, and bookkeeping fields used
//! by the sync engine (attempts, status, last error).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Tag identifying which executor handles an action.
///
/// The well-known variants cover the built-in field workflows; applications
/// extend the set with [`ActionType::Custom`]. Serialized as the snake_case
/// wire name, so stored queues remain readable across versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Driver marks a delivery as completed (signature, timestamp).
    CompleteDelivery,
    /// Driver submits a visual verification result for an element.
    SaveVisualVerification,
    /// Element loaded onto a truck for transport.
    LoadElement,
    /// Driver reports a damage/issue observation from the field.
    ReportIssue,
    /// Application-defined action type.
    #[serde(untagged)]
    Custom(String),
}

impl ActionType {
    /// Wire name of this action type (the same string serde produces).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CompleteDelivery => "complete_delivery",
            Self::SaveVisualVerification => "save_visual_verification",
            Self::LoadElement => "load_element",
            Self::ReportIssue => "report_issue",
            Self::Custom(name) => name,
        }
    }

    /// Parse a wire name back into an action type.
    ///
    /// Unknown names become [`ActionType::Custom`] rather than an error, so
    /// a store written by a newer app version still loads.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "complete_delivery" => Self::CompleteDelivery,
            "save_visual_verification" => Self::SaveVisualVerification,
            "load_element" => Self::LoadElement,
            "report_issue" => Self::ReportIssue,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a queued action.
///
/// The active set is `{Pending, Syncing, Failed}` - those are the entries a
/// drain picks up and the entries counted by `pending_count()`. `Conflict`
/// entries are parked until the user dismisses or retries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for the next drain.
    Pending,
    /// A drain is currently executing this action.
    Syncing,
    /// Last attempt hit a retryable error; will be retried.
    Failed,
    /// Semantic conflict reported by the executor; excluded from automatic
    /// drains until the user dismisses or explicitly retries.
    Conflict,
}

impl ActionStatus {
    /// Whether this status participates in automatic drains and the
    /// pending count.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Syncing | Self::Failed)
    }

    /// Stable name used for SQL columns and metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
        }
    }

    /// Parse a stable name back into a status.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(Self::Pending),
            "syncing" => Some(Self::Syncing),
            "failed" => Some(Self::Failed),
            "conflict" => Some(Self::Conflict),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single user-initiated mutation recorded for later execution.
///
/// # Example
///
/// ```
/// use offline_queue::{ActionType, QueuedAction};
/// use serde_json::json;
///
/// let action = QueuedAction::new(
///     ActionType::CompleteDelivery,
///     json!({"delivery_id": "dlv-301", "signature_ref": "sig/301.png"}),
///     0,
/// );
///
/// assert_eq!(action.action_type, ActionType::CompleteDelivery);
/// assert_eq!(action.attempts, 0);
/// assert!(action.verify_payload());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Client-generated UUID, assigned at enqueue. Primary key in the store
    /// and idempotency key for executors.
    pub id: String,
    /// Which executor handles this action.
    pub action_type: ActionType,
    /// Action-specific data handed to the executor verbatim.
    pub payload: Value,
    /// SHA-256 hex of the serialized payload, verified on load.
    pub payload_hash: String,
    /// Enqueue timestamp (epoch millis). Primary FIFO key.
    pub created_at: i64,
    /// Monotonic enqueue counter; breaks same-millisecond ties in FIFO order.
    pub seq: u64,
    /// Number of sync attempts made so far.
    pub attempts: u32,
    /// Current lifecycle status.
    pub status: ActionStatus,
    /// Last error message, for diagnostics and conflict display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// Create a new pending action with a fresh UUID.
    #[must_use]
    pub fn new(action_type: ActionType, payload: Value, seq: u64) -> Self {
        let payload_hash = Self::hash_payload(&payload);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            payload,
            payload_hash,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
            seq,
            attempts: 0,
            status: ActionStatus::Pending,
            last_error: None,
        }
    }

    /// SHA-256 hex digest of the payload's canonical JSON bytes.
    #[must_use]
    pub fn hash_payload(payload: &Value) -> String {
        let bytes = serde_json::to_vec(payload).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Verify the stored payload against its recorded hash.
    #[must_use]
    pub fn verify_payload(&self) -> bool {
        Self::hash_payload(&self.payload) == self.payload_hash
    }

    /// FIFO ordering key: `(created_at, seq)` ascending.
    #[must_use]
    pub fn sort_key(&self) -> (i64, u64) {
        (self.created_at, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_action_defaults() {
        let action = QueuedAction::new(
            ActionType::CompleteDelivery,
            json!({"delivery_id": "dlv-1"}),
            7,
        );

        assert_eq!(action.action_type, ActionType::CompleteDelivery);
        assert_eq!(action.attempts, 0);
        assert_eq!(action.seq, 7);
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.last_error.is_none());
        assert!(action.created_at > 0);
        assert!(!action.id.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = QueuedAction::new(ActionType::LoadElement, json!({}), 0);
        let b = QueuedAction::new(ActionType::LoadElement, json!({}), 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_payload_hash_roundtrip() {
        let action = QueuedAction::new(
            ActionType::SaveVisualVerification,
            json!({"element_id": "el-9", "status": "approved"}),
            0,
        );
        assert!(action.verify_payload());
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let mut action = QueuedAction::new(
            ActionType::SaveVisualVerification,
            json!({"element_id": "el-9"}),
            0,
        );
        action.payload = json!({"element_id": "el-666"});
        assert!(!action.verify_payload());
    }

    #[test]
    fn test_sort_key_ties_broken_by_seq() {
        let mut a = QueuedAction::new(ActionType::LoadElement, json!({}), 1);
        let mut b = QueuedAction::new(ActionType::LoadElement, json!({}), 2);
        a.created_at = 1000;
        b.created_at = 1000;
        assert!(a.sort_key() < b.sort_key());
    }

    #[test]
    fn test_status_active_set() {
        assert!(ActionStatus::Pending.is_active());
        assert!(ActionStatus::Syncing.is_active());
        assert!(ActionStatus::Failed.is_active());
        assert!(!ActionStatus::Conflict.is_active());
    }

    #[test]
    fn test_status_wire_roundtrip() {
        for status in [
            ActionStatus::Pending,
            ActionStatus::Syncing,
            ActionStatus::Failed,
            ActionStatus::Conflict,
        ] {
            assert_eq!(ActionStatus::from_wire(status.as_str()), Some(status));
        }
        assert_eq!(ActionStatus::from_wire("bogus"), None);
    }

    #[test]
    fn test_action_type_wire_names() {
        assert_eq!(ActionType::CompleteDelivery.as_str(), "complete_delivery");
        assert_eq!(
            ActionType::from_wire("complete_delivery"),
            ActionType::CompleteDelivery
        );
        assert_eq!(
            ActionType::from_wire("future_action"),
            ActionType::Custom("future_action".to_string())
        );
    }

    #[test]
    fn test_action_type_serde_snake_case() {
        let json_str = serde_json::to_string(&ActionType::SaveVisualVerification).unwrap();
        assert_eq!(json_str, "\"save_visual_verification\"");

        let custom: ActionType = serde_json::from_str("\"site_note\"").unwrap();
        assert_eq!(custom, ActionType::Custom("site_note".to_string()));
    }

    #[test]
    fn test_serialize_skips_none_last_error() {
        let action = QueuedAction::new(ActionType::ReportIssue, json!({}), 0);
        let json_str = serde_json::to_string(&action).unwrap();
        assert!(!json_str.contains("last_error"));
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut action = QueuedAction::new(
            ActionType::Custom("site_note".to_string()),
            json!({"note": "access road flooded", "severity": 2}),
            3,
        );
        action.attempts = 4;
        action.status = ActionStatus::Failed;
        action.last_error = Some("network unreachable".to_string());

        let json_str = serde_json::to_string(&action).unwrap();
        let back: QueuedAction = serde_json::from_str(&json_str).unwrap();

        assert_eq!(back.id, action.id);
        assert_eq!(back.action_type, action.action_type);
        assert_eq!(back.payload, action.payload);
        assert_eq!(back.attempts, 4);
        assert_eq!(back.status, ActionStatus::Failed);
        assert_eq!(back.last_error.as_deref(), Some("network unreachable"));
    }
}
