use std::fmt;

use serde_json::Value;

use crate::error::{ModelError, Result};

/// Closed set of invalidation signals the authorization service pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InvalidationKind {
    PermissionsInvalidated,
    AttributesInvalidated,
}

impl InvalidationKind {
    pub const ALL: [InvalidationKind; 2] = [
        InvalidationKind::PermissionsInvalidated,
        InvalidationKind::AttributesInvalidated,
    ];

    /// Map the `action` field of a push message onto a kind.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "invalidate-permissions" => {
                Some(InvalidationKind::PermissionsInvalidated)
            }
            "invalidate-attributes" => {
                Some(InvalidationKind::AttributesInvalidated)
            }
            _ => None,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            InvalidationKind::PermissionsInvalidated => "invalidate-permissions",
            InvalidationKind::AttributesInvalidated => "invalidate-attributes",
        }
    }
}

impl fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// A classified push message. Only lives for the duration of a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidationEvent {
    pub kind: InvalidationKind,
    pub raw: Value,
}

impl InvalidationEvent {
    pub fn new(kind: InvalidationKind, raw: Value) -> Self {
        Self { kind, raw }
    }
}

/// Classify an inbound text frame.
///
/// Returns `Ok(None)` for well-formed JSON whose `action` is absent or not
/// one we know about; only unparsable text is an error.
pub fn classify(text: &str) -> Result<Option<InvalidationEvent>> {
    let raw: Value = serde_json::from_str(text).map_err(ModelError::from)?;
    let kind = raw
        .get("action")
        .and_then(Value::as_str)
        .and_then(InvalidationKind::from_action);
    Ok(kind.map(|kind| InvalidationEvent::new(kind, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_actions() {
        let event = classify(r#"{"action":"invalidate-permissions","user":"u1"}"#)
            .expect("valid json")
            .expect("known action");
        assert_eq!(event.kind, InvalidationKind::PermissionsInvalidated);
        assert_eq!(event.raw["user"], "u1");

        let event = classify(r#"{"action":"invalidate-attributes"}"#)
            .expect("valid json")
            .expect("known action");
        assert_eq!(event.kind, InvalidationKind::AttributesInvalidated);
    }

    #[test]
    fn unknown_or_missing_action_is_ignored() {
        assert!(classify(r#"{"action":"reticulate-splines"}"#).unwrap().is_none());
        assert!(classify(r#"{"other":1}"#).unwrap().is_none());
        assert!(classify(r#"{"action":42}"#).unwrap().is_none());
        assert!(classify("[1,2,3]").unwrap().is_none());
    }

    #[test]
    fn malformed_text_is_an_error() {
        let err = classify("{not json").unwrap_err();
        assert!(matches!(err, ModelError::Json(_)));
    }

    #[test]
    fn action_round_trips_through_kind() {
        for kind in InvalidationKind::ALL {
            assert_eq!(InvalidationKind::from_action(kind.action()), Some(kind));
        }
    }
}
