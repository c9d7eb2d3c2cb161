//! Comment payload codec.
//!
//! Comment bodies carry JSON in one of three shapes:
//!
//! 1. **Versioned envelope** (the only shape this crate writes):
//!    `{"_data": ..., "_meta": {"client_version", "timestamp", "update_mode"}, "type"?}`.
//!    `type` defaults to `update`, `_meta.update_mode` to `append`.
//! 2. **Legacy initial state**: `{"type": "initial_state", "data": ...}`.
//! 3. **Legacy bare update**: any other JSON value, applied in append mode.
//!
//! A body that is not JSON at all is a [`CodecError`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Version stamped into every envelope this crate writes.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version reported for comments written without an envelope.
pub const LEGACY_VERSION: &str = "legacy";

const SYSTEM_PREFIX: &str = "system_";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How an update combines with the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Deep-merge into the current state.
    #[default]
    Append,
    /// Discard the current state.
    Replace,
}

impl UpdateMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            other => Err(CodecError::InvalidMode(other.to_string())),
        }
    }
}

/// What a comment represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommentKind {
    /// The object's state at creation time.
    InitialState,
    /// A state change to reconcile.
    Update,
    /// Audit record written by alias/deprecation operations (`system_*`).
    System(String),
}

impl CommentKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InitialState => "initial_state",
            Self::Update => "update",
            Self::System(name) => name,
        }
    }

    /// Map a wire `type` string to a kind. Unknown names are updates.
    #[must_use]
    pub fn from_type(name: &str) -> Self {
        match name {
            "initial_state" => Self::InitialState,
            n if n.starts_with(SYSTEM_PREFIX) => Self::System(n.to_string()),
            _ => Self::Update,
        }
    }

    /// Only plain updates change state during reconciliation.
    #[must_use]
    pub const fn is_update(&self) -> bool {
        matches!(self, Self::Update)
    }

    #[must_use]
    pub fn system(name: &str) -> Self {
        if name.starts_with(SYSTEM_PREFIX) {
            Self::System(name.to_string())
        } else {
            Self::System(format!("{SYSTEM_PREFIX}{name}"))
        }
    }
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which wire shape a comment was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Versioned,
    LegacyInitialState,
    LegacyBare,
}

/// Envelope metadata, present only when every required key is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentMeta {
    pub client_version: String,
    pub timestamp: String,
    pub update_mode: UpdateMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub system: bool,
}

impl CommentMeta {
    /// Metadata recorded for comments that carry none.
    #[must_use]
    pub fn legacy(created_at: DateTime<Utc>) -> Self {
        Self {
            client_version: LEGACY_VERSION.to_string(),
            timestamp: format_timestamp(created_at),
            update_mode: UpdateMode::Append,
            issue_number: None,
            system: false,
        }
    }
}

/// A decoded comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedComment {
    pub kind: CommentKind,
    pub data: Value,
    pub mode: UpdateMode,
    pub meta: Option<CommentMeta>,
    pub format: PayloadFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("comment body is not valid JSON: {0}")]
    Json(String),

    #[error("unknown update_mode '{0}' (expected append or replace)")]
    InvalidMode(String),

    #[error("envelope field '{field}' has the wrong type")]
    FieldType { field: &'static str },
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a raw comment body.
///
/// # Errors
///
/// Returns [`CodecError`] when the body is not JSON, or when an envelope's
/// `type` / `update_mode` fields are malformed.
pub fn decode(raw: &str) -> Result<DecodedComment, CodecError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| CodecError::Json(e.to_string()))?;

    let mut map = match value {
        Value::Object(map) => map,
        other => return Ok(bare(other)),
    };

    if map.contains_key("_data") {
        return decode_envelope(map);
    }

    if map.get("type").and_then(Value::as_str) == Some("initial_state") && map.contains_key("data")
    {
        let data = map.remove("data").unwrap_or(Value::Null);
        return Ok(DecodedComment {
            kind: CommentKind::InitialState,
            data,
            mode: UpdateMode::Append,
            meta: None,
            format: PayloadFormat::LegacyInitialState,
        });
    }

    Ok(bare(Value::Object(map)))
}

fn bare(value: Value) -> DecodedComment {
    DecodedComment {
        kind: CommentKind::Update,
        data: value,
        mode: UpdateMode::Append,
        meta: None,
        format: PayloadFormat::LegacyBare,
    }
}

fn decode_envelope(mut map: Map<String, Value>) -> Result<DecodedComment, CodecError> {
    let kind = match map.get("type") {
        None | Some(Value::Null) => CommentKind::Update,
        Some(Value::String(name)) => CommentKind::from_type(name),
        Some(_) => return Err(CodecError::FieldType { field: "type" }),
    };

    let raw_meta = map.remove("_meta");
    let mode = match raw_meta.as_ref().and_then(|m| m.get("update_mode")) {
        None | Some(Value::Null) => UpdateMode::Append,
        Some(Value::String(mode)) => mode.parse()?,
        Some(_) => {
            return Err(CodecError::FieldType {
                field: "_meta.update_mode",
            });
        }
    };

    let meta = raw_meta
        .filter(validate_metadata)
        .and_then(|m| serde_json::from_value::<CommentMeta>(m).ok());

    Ok(DecodedComment {
        kind,
        data: map.remove("_data").unwrap_or(Value::Null),
        mode,
        meta,
        format: PayloadFormat::Versioned,
    })
}

/// `true` when `meta` is an object carrying `client_version`, `timestamp`,
/// and `update_mode`.
#[must_use]
pub fn validate_metadata(meta: &Value) -> bool {
    meta.as_object().is_some_and(|m| {
        ["client_version", "timestamp", "update_mode"]
            .iter()
            .all(|key| m.get(*key).is_some_and(|v| !v.is_null()))
    })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Build a versioned envelope stamped with the current time.
#[must_use]
pub fn encode(data: &Value, kind: &CommentKind, mode: UpdateMode) -> Value {
    encode_at(data, kind, mode, Utc::now(), None)
}

/// Build a versioned envelope with an explicit timestamp and optional
/// issue number.
#[must_use]
pub fn encode_at(
    data: &Value,
    kind: &CommentKind,
    mode: UpdateMode,
    timestamp: DateTime<Utc>,
    issue_number: Option<u64>,
) -> Value {
    let meta = CommentMeta {
        client_version: CLIENT_VERSION.to_string(),
        timestamp: format_timestamp(timestamp),
        update_mode: mode,
        issue_number,
        system: matches!(kind, CommentKind::System(_)),
    };
    let mut envelope = json!({
        "_data": data,
        "_meta": meta,
    });
    if !kind.is_update() {
        envelope["type"] = Value::String(kind.as_str().to_string());
    }
    envelope
}

/// Serialize an envelope the way it is posted as a comment body.
#[must_use]
pub fn to_body(envelope: &Value) -> String {
    serde_json::to_string_pretty(envelope).unwrap_or_else(|_| envelope.to_string())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
