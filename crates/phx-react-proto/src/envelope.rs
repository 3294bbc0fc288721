//! Action request body and the three-way result envelope.

use serde::{Deserialize, Serialize};

use crate::Params;

/// Error code of the envelope synthesized when no session is connected.
pub const NOT_CONNECTED: &str = "not_connected";

/// Result of an action invocation.
///
/// Callers switch on the variant; domain failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActionEnvelope {
    /// Action succeeded.
    Ok {
        /// Result payload.
        #[serde(default)]
        data: Params,
    },
    /// Action failed with a domain error.
    Error {
        /// Error details.
        error: ActionError,
    },
    /// Server requested a full navigation.
    Redirect {
        /// Target location.
        to: String,
    },
}

impl ActionEnvelope {
    /// Envelope returned locally when there is no connected session.
    pub fn not_connected() -> Self {
        Self::Error {
            error: ActionError {
                code: NOT_CONNECTED.to_string(),
                message: "Socket not connected".to_string(),
                details: None,
            },
        }
    }

    /// Wire discriminator of this envelope.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "ok",
            Self::Error { .. } => "error",
            Self::Redirect { .. } => "redirect",
        }
    }

    /// Redirect target, if this is a redirect.
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Self::Redirect { to } => Some(to),
            _ => None,
        }
    }
}

/// Domain error carried by [`ActionEnvelope::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details, e.g. per-field validation errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Params>,
}

/// JSON body of an action submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Page the action targets.
    pub page_key: String,
    /// Session the page was issued under.
    pub session_id: String,
    /// Authorization token for the session.
    pub token: String,
    /// Action name.
    pub action: String,
    /// Action parameters.
    #[serde(default)]
    pub params: Params,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_all_three_variants() {
        let ok: ActionEnvelope =
            serde_json::from_value(json!({"status": "ok", "data": {"id": 1}})).unwrap();
        assert!(matches!(&ok, ActionEnvelope::Ok { data } if data["id"] == 1));

        let err: ActionEnvelope = serde_json::from_value(json!({
            "status": "error",
            "error": {"code": "invalid", "message": "bad", "details": {"name": ["blank"]}}
        }))
        .unwrap();
        match err {
            ActionEnvelope::Error { error } => {
                assert_eq!(error.code, "invalid");
                assert!(error.details.is_some());
            },
            other => panic!("unexpected envelope {other:?}"),
        }

        let redirect: ActionEnvelope =
            serde_json::from_value(json!({"status": "redirect", "to": "/foo"})).unwrap();
        assert_eq!(redirect.redirect_target(), Some("/foo"));
    }

    #[test]
    fn ok_without_data_defaults_to_empty() {
        let ok: ActionEnvelope = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert_eq!(ok, ActionEnvelope::Ok { data: Params::new() });
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result = serde_json::from_value::<ActionEnvelope>(json!({"status": "maybe"}));
        assert!(result.is_err());
    }

    #[test]
    fn not_connected_envelope_shape() {
        let value = serde_json::to_value(ActionEnvelope::not_connected()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], NOT_CONNECTED);
        assert!(value["error"].get("details").is_none());
    }
}
