use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag partitioning our rows inside the shared store table.
pub const APP_TAG: &str = "Impostor1";

/// Schema-compat tag carried by every round row.
pub const GAME_VERSION: &str = "1.0";

/// Role value distinguishing round rows from participant rows.
pub const ROUND_ROLE: &str = "juego";

/// Icon used when a participant row carries none.
pub const DEFAULT_ICON: &str = "👤";

/// Full session code: YYYYMM creation prefix + 4-digit random suffix,
/// e.g. 2025123456.
pub type SessionCode = u64;

/// Store-assigned row id, used for update-by-id.
pub type RowId = i64;

/// Participant role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Guest,
}

impl Role {
    /// Parse a stored role string. "host" is the legacy spelling of admin.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "admin" | "host" => Some(Role::Admin),
            "guest" => Some(Role::Guest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row as returned by the store. Participant rows have a display name and
/// no payload; round rows have `role = "juego"` and a payload column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: RowId,
    pub code: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: String,
    #[serde(default)]
    pub game_version: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Round payload column. Depending on the store's column type this can
    /// arrive as a structured object or as serialized text; both are
    /// tolerated (see [`RoundPayload::from_column`]).
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    pub app: String,
    pub created_at: DateTime<Utc>,
}

/// A row to insert. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRow {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub app: String,
}

impl NewRow {
    pub fn participant(code: SessionCode, name: &str, role: Role, icon: &str) -> NewRow {
        NewRow {
            code: code.to_string(),
            display_name: Some(name.to_string()),
            role: role.as_str().to_string(),
            game_version: None,
            icon: Some(icon.to_string()),
            payload: None,
            app: APP_TAG.to_string(),
        }
    }

    pub fn round(code: SessionCode, payload: serde_json::Value) -> NewRow {
        NewRow {
            code: code.to_string(),
            display_name: None,
            role: ROUND_ROLE.to_string(),
            game_version: Some(GAME_VERSION.to_string()),
            icon: None,
            payload: Some(payload),
            app: APP_TAG.to_string(),
        }
    }
}

/// A participant as seen by the roster synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub display_name: String,
    pub role: Role,
    pub icon: String,
    pub joined_at: DateTime<Utc>,
}

/// One round's stored state.
///
/// `active` tolerates `true`, `"true"`, `1` and `"1"` on the wire but is a
/// real boolean everywhere past the adapter boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPayload {
    #[serde(deserialize_with = "deserialize_active")]
    pub active: bool,
    /// Milliseconds since epoch when the round was started. Fine-grained so
    /// back-to-back rounds with identical picks stay distinguishable.
    pub started_at: i64,
    pub category: String,
    pub element: String,
    pub impostor: String,
    #[serde(default)]
    pub revealed_identities: BTreeMap<String, bool>,
}

impl RoundPayload {
    /// Normalize the raw payload column into a canonical payload.
    ///
    /// The store may hand the column back pre-parsed (json column) or as
    /// serialized text (text column); this is the single
    /// parse-or-pass-through point, nothing past it sees the ambiguity.
    pub fn from_column(column: &serde_json::Value) -> Result<RoundPayload, serde_json::Error> {
        match column {
            serde_json::Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        }
    }

    pub fn to_column(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("round payload serializes")
    }

    /// Whether the given user has revealed their identity in this round.
    pub fn has_revealed(&self, name: &str) -> bool {
        self.revealed_identities.get(name).copied().unwrap_or(false)
    }
}

fn deserialize_active<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::String(s) => Ok(s == "true" || s == "1"),
        serde_json::Value::Number(n) => Ok(n.as_i64() == Some(1)),
        other => Err(D::Error::custom(format!(
            "unsupported representation for active flag: {other}"
        ))),
    }
}

/// Client-side identity of a round, used to decide whether a fetched round
/// row was already shown to this user in the current page lifetime. Not
/// persisted; a page reload intentionally re-shows the active round.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoundIdentity(String);

impl RoundIdentity {
    pub fn of(payload: &RoundPayload) -> RoundIdentity {
        RoundIdentity(format!(
            "{}_{}_{}_{}",
            payload.started_at, payload.category, payload.element, payload.impostor
        ))
    }
}

impl fmt::Display for RoundIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A change pushed by the store's notification feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Insert { new: StoredRow },
    Update { old: Option<StoredRow>, new: StoredRow },
    Delete { old: StoredRow },
}

impl ChangeEvent {
    /// The row content relevant for refresh decisions: the new row for
    /// inserts/updates, the old row for deletes.
    pub fn row(&self) -> &StoredRow {
        match self {
            ChangeEvent::Insert { new } => new,
            ChangeEvent::Update { new, .. } => new,
            ChangeEvent::Delete { old } => old,
        }
    }
}
