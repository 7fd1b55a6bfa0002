//! Canonicalization of variable-arity messaging calls.
//!
//! `runtime.sendMessage` accepts `(message)`, `(extensionId, message)`,
//! `(message, options)` or `(extensionId, message, options)`. Rather than
//! cascading type checks inline, classification is a single decision table
//! over the positional argument types producing one tagged variant;
//! combinations the table does not recognize fail with an explicit
//! ambiguous-arguments error rather than guessing.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// SendMessageCall
// ============================================================================

/// One recognized shape of a `runtime.sendMessage` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SendMessageCall {
    /// `sendMessage(message)`
    Message {
        /// The message value.
        message: Value,
    },

    /// `sendMessage(extensionId, message)`
    ToExtension {
        /// Target extension identifier.
        extension_id: String,
        /// The message value.
        message: Value,
    },

    /// `sendMessage(message, options)`
    WithOptions {
        /// The message value.
        message: Value,
        /// Connection options.
        options: Value,
    },

    /// `sendMessage(extensionId, message, options)`
    ToExtensionWithOptions {
        /// Target extension identifier.
        extension_id: String,
        /// The message value.
        message: Value,
        /// Connection options.
        options: Value,
    },
}

// ============================================================================
// SendMessageCall - Classification
// ============================================================================

impl SendMessageCall {
    /// Classifies positional arguments into exactly one call shape.
    ///
    /// Decision table (`S` = string, `O` = object, `*` = any):
    ///
    /// | Args | Shape |
    /// |------|-------|
    /// | `(*)` | `Message` |
    /// | `(S, non-O)` | `ToExtension` |
    /// | `(non-S, O)` | `WithOptions` |
    /// | `(S, O)` | ambiguous (rejected) |
    /// | `(non-S, non-O)` | unrecognized (rejected) |
    /// | `(S, *, O)` | `ToExtensionWithOptions` |
    /// | other 3-arity | unrecognized (rejected) |
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when no message argument was supplied;
    /// [`Error::AmbiguousArguments`] for every combination the table does
    /// not uniquely resolve.
    pub fn classify(mut args: Vec<Value>) -> Result<Self> {
        match args.len() {
            0 => Err(Error::invalid_argument("a message argument is required")),

            1 => Ok(Self::Message {
                message: args.remove(0),
            }),

            2 => {
                let second = args.pop().expect("arity checked");
                let first = args.pop().expect("arity checked");
                match (as_extension_id(&first), second.is_object()) {
                    (Some(_), true) => Err(Error::ambiguous(
                        "(string, object) matches both (extensionId, message) \
                         and (message, options)",
                    )),
                    (Some(id), false) => Ok(Self::ToExtension {
                        extension_id: id.to_string(),
                        message: second,
                    }),
                    (None, true) => Ok(Self::WithOptions {
                        message: first,
                        options: second,
                    }),
                    (None, false) => Err(Error::ambiguous(
                        "two arguments but neither an extension id string \
                         nor an options object",
                    )),
                }
            }

            3 => {
                let third = args.pop().expect("arity checked");
                let second = args.pop().expect("arity checked");
                let first = args.pop().expect("arity checked");
                match (as_extension_id(&first), third.is_object()) {
                    (Some(id), true) => Ok(Self::ToExtensionWithOptions {
                        extension_id: id.to_string(),
                        message: second,
                        options: third,
                    }),
                    _ => Err(Error::ambiguous(
                        "three arguments must be (extensionId, message, options)",
                    )),
                }
            }

            n => Err(Error::ambiguous(format!(
                "sendMessage takes at most 3 arguments, got {n}"
            ))),
        }
    }

    /// Expands this shape into the fixed four-field canonical form.
    #[must_use]
    pub fn canonicalize(self, expects_response: bool) -> CanonicalSendMessage {
        let (extension_id, message, options) = match self {
            Self::Message { message } => (None, message, None),
            Self::ToExtension {
                extension_id,
                message,
            } => (Some(extension_id), message, None),
            Self::WithOptions { message, options } => (None, message, Some(options)),
            Self::ToExtensionWithOptions {
                extension_id,
                message,
                options,
            } => (Some(extension_id), message, Some(options)),
        };
        CanonicalSendMessage {
            extension_id,
            message,
            options,
            expects_response,
        }
    }
}

fn as_extension_id(value: &Value) -> Option<&str> {
    value.as_str()
}

// ============================================================================
// CanonicalSendMessage
// ============================================================================

/// The fixed four-field shape every `sendMessage` call is reduced to
/// before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSendMessage {
    /// Target extension, when addressed cross-extension.
    pub extension_id: Option<String>,
    /// The message value.
    pub message: Value,
    /// Connection options (currently carried, not interpreted).
    pub options: Option<Value>,
    /// Whether the caller awaits a response.
    pub expects_response: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_single_argument_is_message() {
        let call = SendMessageCall::classify(vec![json!({"ping": 1})]).expect("classify");
        assert_eq!(
            call,
            SendMessageCall::Message {
                message: json!({"ping": 1})
            }
        );
    }

    #[test]
    fn test_string_message_alone_is_message() {
        // A bare string is a message, not an extension id.
        let call = SendMessageCall::classify(vec![json!("hello")]).expect("classify");
        assert!(matches!(call, SendMessageCall::Message { .. }));
    }

    #[test]
    fn test_extension_id_with_non_object_message() {
        let call =
            SendMessageCall::classify(vec![json!("ext@vendor"), json!("payload")])
                .expect("classify");
        assert_eq!(
            call,
            SendMessageCall::ToExtension {
                extension_id: "ext@vendor".into(),
                message: json!("payload"),
            }
        );
    }

    #[test]
    fn test_message_with_options() {
        let call = SendMessageCall::classify(vec![json!([1, 2]), json!({"includeTlsChannelId": true})])
            .expect("classify");
        assert!(matches!(call, SendMessageCall::WithOptions { .. }));
    }

    #[test]
    fn test_string_object_pair_is_ambiguous() {
        let err =
            SendMessageCall::classify(vec![json!("ext@vendor"), json!({"a": 1})]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousArguments { .. }));
    }

    #[test]
    fn test_unrecognized_pair_is_ambiguous() {
        let err = SendMessageCall::classify(vec![json!(1), json!(2)]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousArguments { .. }));
    }

    #[test]
    fn test_three_arguments() {
        let call = SendMessageCall::classify(vec![
            json!("ext@vendor"),
            json!({"q": "state"}),
            json!({}),
        ])
        .expect("classify");
        assert!(matches!(call, SendMessageCall::ToExtensionWithOptions { .. }));
    }

    #[test]
    fn test_three_arguments_wrong_types_rejected() {
        let err =
            SendMessageCall::classify(vec![json!(1), json!({"q": 1}), json!({})]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousArguments { .. }));
    }

    #[test]
    fn test_empty_call_rejected() {
        let err = SendMessageCall::classify(vec![]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_canonical_four_field_shape() {
        let canonical = SendMessageCall::classify(vec![json!("ext@vendor"), json!(7)])
            .expect("classify")
            .canonicalize(true);
        assert_eq!(
            canonical,
            CanonicalSendMessage {
                extension_id: Some("ext@vendor".into()),
                message: json!(7),
                options: None,
                expects_response: true,
            }
        );
    }
}
