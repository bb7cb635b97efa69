//! Classification of API failure responses.
//!
//! A failed request returns a body like
//! `{"success": false, "errorMsg": "...", "errors": [...] | {...}}`.
//! [`classify`] turns that body into an [`ApiError`] tagged with one
//! [`ErrorKind`] from a fixed catalog, so callers branch on the kind instead
//! of comparing server wording:
//!
//! ```
//! use retailcrm_client::{classify, matches_kind, ErrorKind};
//!
//! let err = classify(br#"{"success":false,"errorMsg":"Access denied."}"#).unwrap();
//! assert_eq!(err.kind(), ErrorKind::AccessDenied);
//! assert!(matches_kind(Some(&err), ErrorKind::AccessDenied));
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::errors_list::ErrorsList;

static MISSING_PARAMETER_RE: LazyLock<Regex> = LazyLock::new(|| {
    // ASCII-only word characters, as the server's own pattern uses.
    Regex::new(r"^Parameter '([0-9A-Za-z_\]\[\-]+)' is missing$")
        .expect("missing parameter pattern is valid")
});

/// Closed catalog of API failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingCredentials,
    InvalidCredentials,
    AccessDenied,
    AccountDoesNotExist,
    ValidationError,
    MissingParameter,
    /// Catch-all for failures no pattern recognizes.
    Generic,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::MissingCredentials,
        ErrorKind::InvalidCredentials,
        ErrorKind::AccessDenied,
        ErrorKind::AccountDoesNotExist,
        ErrorKind::ValidationError,
        ErrorKind::MissingParameter,
        ErrorKind::Generic,
    ];

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::MissingCredentials => "\"apiKey\" is missing.",
            ErrorKind::InvalidCredentials => "Wrong \"apiKey\" value.",
            ErrorKind::AccessDenied => "Access denied.",
            ErrorKind::AccountDoesNotExist => "Account does not exist.",
            ErrorKind::ValidationError => "Errors in the entity format",
            ErrorKind::MissingParameter => "Parameter is missing",
            ErrorKind::Generic => "API error",
        }
    }

    /// Exact-string lookup of a server message. Case and punctuation matter.
    fn from_message(message: &str) -> Option<Self> {
        let kind = match message {
            "\"apiKey\" is missing." => ErrorKind::MissingCredentials,
            "Wrong \"apiKey\" value." => ErrorKind::InvalidCredentials,
            "Access denied." => ErrorKind::AccessDenied,
            "Account does not exist." => ErrorKind::AccountDoesNotExist,
            "Errors in the entity format" | "Validation error" => ErrorKind::ValidationError,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_message())
    }
}

/// A classified API failure.
///
/// `message` is the server's own `errorMsg` text; use [`ApiError::kind`] to
/// decide what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    message: String,
    errors: ErrorsList,
    kind: ErrorKind,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, errors: ErrorsList) -> Self {
        Self {
            message: message.into(),
            errors,
            kind,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn errors(&self) -> &ErrorsList {
        &self.errors
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errorMsg: \"{}\"", self.message)?;
        if !self.errors.is_empty() {
            write!(f, ", errors: [{}]", self.errors)?;
        }
        Ok(())
    }
}

impl StdError for ApiError {}

#[derive(Deserialize)]
struct FailureBody {
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
    #[serde(default)]
    errors: Option<Box<RawValue>>,
}

/// Classify a raw failure response body.
///
/// Bodies starting with `<` are HTML pages the service serves for unknown
/// accounts and classify as [`ErrorKind::AccountDoesNotExist`] without any
/// JSON parsing. Anything else must be a JSON object; if it is not, the
/// decode error is returned instead of a classified error.
pub fn classify(body: &[u8]) -> Result<ApiError, serde_json::Error> {
    if body.first() == Some(&b'<') {
        let kind = ErrorKind::AccountDoesNotExist;
        tracing::debug!(?kind, "non-JSON failure body");
        return Ok(ApiError::new(kind, kind.default_message(), ErrorsList::default()));
    }

    let parsed: FailureBody = serde_json::from_slice(body)?;
    let message = parsed.error_msg.unwrap_or_default();
    // `errors` is parsed separately so a malformed value cannot hide `errorMsg`.
    let server_errors = parsed
        .errors
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw.get()).ok())
        .map(|value| ErrorsList::from_value(Some(&value)))
        .unwrap_or_default();

    let (kind, mut errors) = match ErrorKind::from_message(&message) {
        Some(kind) => (kind, ErrorsList::default()),
        None => match MISSING_PARAMETER_RE.captures(&message) {
            Some(caps) => (
                ErrorKind::MissingParameter,
                ErrorsList::from(vec![("Name", &caps[1])]),
            ),
            None => (ErrorKind::Generic, ErrorsList::default()),
        },
    };

    // Explicit `errors` from the server replace the synthesized parameter name.
    if !server_errors.is_empty() {
        errors = server_errors;
    }

    tracing::debug!(?kind, error_msg = %message, "classified API failure");
    Ok(ApiError::new(kind, message, errors))
}

/// Build a [`ErrorKind::Generic`] error from a plain message.
pub fn new_generic_error(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorKind::Generic, message, ErrorsList::default())
}

/// Walk `err` and its `source()` chain, returning the first [`ApiError`].
pub fn find_api_error<'a>(mut err: Option<&'a (dyn StdError + 'static)>) -> Option<&'a ApiError> {
    while let Some(current) = err {
        if let Some(api) = current.downcast_ref::<ApiError>() {
            return Some(api);
        }
        err = current.source();
    }
    None
}

/// Whether the first [`ApiError`] in the chain has the given kind.
pub fn matches_kind(err: Option<&(dyn StdError + 'static)>, kind: ErrorKind) -> bool {
    find_api_error(err).is_some_and(|api| api.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Layer(Box<dyn StdError + 'static>);

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "layer: {}", self.0)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(self.0.as_ref())
        }
    }

    #[test]
    fn exact_messages_map_to_kinds() {
        let cases = [
            (r#"{"errorMsg":"\"apiKey\" is missing."}"#, ErrorKind::MissingCredentials),
            (r#"{"errorMsg":"Wrong \"apiKey\" value."}"#, ErrorKind::InvalidCredentials),
            (r#"{"errorMsg":"Access denied."}"#, ErrorKind::AccessDenied),
            (r#"{"errorMsg":"Account does not exist."}"#, ErrorKind::AccountDoesNotExist),
            (r#"{"errorMsg":"Errors in the entity format"}"#, ErrorKind::ValidationError),
            (r#"{"errorMsg":"Validation error"}"#, ErrorKind::ValidationError),
            (r#"{"errorMsg":"Something else entirely"}"#, ErrorKind::Generic),
        ];
        for (body, kind) in cases {
            let err = classify(body.as_bytes()).unwrap();
            assert_eq!(err.kind(), kind, "body: {body}");
        }
    }

    #[test]
    fn matching_is_case_and_punctuation_sensitive() {
        let err = classify(br#"{"errorMsg":"Access denied"}"#).unwrap();
        assert_eq!(err.kind(), ErrorKind::Generic);
        let err = classify(br#"{"errorMsg":"access denied."}"#).unwrap();
        assert_eq!(err.kind(), ErrorKind::Generic);
    }

    #[test]
    fn missing_parameter_captures_name() {
        let err = classify(br#"{"errorMsg":"Parameter 'filter[ids][]' is missing"}"#).unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingParameter);
        assert_eq!(err.errors().get("Name"), Some("filter[ids][]"));
    }

    #[test]
    fn missing_parameter_name_is_ascii_only() {
        let err = classify("{\"errorMsg\":\"Parameter 'имя' is missing\"}".as_bytes()).unwrap();
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert!(err.errors().is_empty());
    }

    #[test]
    fn unparseable_errors_field_keeps_classification() {
        let err = classify(br#"{"errorMsg":"Validation error","errors":{"a":1e400}}"#).unwrap();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.errors().is_empty());

        let body = br#"{"errorMsg":"Parameter 'by' is missing","errors":[1e999]}"#;
        let err = classify(body).unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingParameter);
        assert_eq!(err.errors().get("Name"), Some("by"));
    }

    #[test]
    fn missing_parameter_requires_full_match() {
        let err = classify(br#"{"errorMsg":"Parameter 'by' is missing."}"#).unwrap();
        assert_eq!(err.kind(), ErrorKind::Generic);
        let err = classify(br#"{"errorMsg":"Parameter 'a b' is missing"}"#).unwrap();
        assert_eq!(err.kind(), ErrorKind::Generic);
    }

    #[test]
    fn server_errors_override_captured_parameter() {
        let err = classify(
            br#"{"errorMsg":"Parameter 'site' is missing","errors":{"site":"required"}}"#,
        )
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingParameter);
        assert_eq!(err.errors().get("Name"), None);
        assert_eq!(err.errors().get("site"), Some("required"));
    }

    #[test]
    fn empty_server_errors_keep_captured_parameter() {
        let err = classify(br#"{"errorMsg":"Parameter 'site' is missing","errors":[]}"#).unwrap();
        assert_eq!(err.errors().get("Name"), Some("site"));
    }

    #[test]
    fn html_body_is_missing_account() {
        let err = classify(b"<html><body>Not found</body></html>").unwrap();
        assert_eq!(err.kind(), ErrorKind::AccountDoesNotExist);
        assert_eq!(err.message(), "Account does not exist.");
        assert!(err.errors().is_empty());
    }

    #[test]
    fn undecodable_bodies_are_not_classified() {
        assert!(classify(b"").is_err());
        assert!(classify(b"Internal Server Error").is_err());
        assert!(classify(b"[1, 2]").is_err());
        assert!(classify(br#"{"errorMsg": 12}"#).is_err());
    }

    #[test]
    fn message_is_literal_server_text() {
        let err = classify(br#"{"success":false}"#).unwrap();
        assert_eq!(err.message(), "");
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert_eq!(err.to_string(), "errorMsg: \"\"");
    }

    #[test]
    fn generic_error_matches_like_classified() {
        let err = new_generic_error("HTTP request error. Status code: 500.");
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert!(matches_kind(Some(&err), ErrorKind::Generic));
        assert_eq!(err.to_string(), "errorMsg: \"HTTP request error. Status code: 500.\"");
    }

    #[test]
    fn walks_nested_layers() {
        let inner = classify(br#"{"errorMsg":"Access denied."}"#).unwrap();
        let wrapped = Layer(Box::new(Layer(Box::new(Layer(Box::new(inner))))));
        assert!(matches_kind(Some(&wrapped), ErrorKind::AccessDenied));
        assert!(!matches_kind(Some(&wrapped), ErrorKind::Generic));
        let found = find_api_error(Some(&wrapped)).unwrap();
        assert_eq!(found.message(), "Access denied.");
    }

    #[test]
    fn absent_or_foreign_errors_do_not_match() {
        assert!(find_api_error(None).is_none());
        for kind in ErrorKind::ALL {
            assert!(!matches_kind(None, kind));
        }
        let io = std::io::Error::other("boom");
        assert!(find_api_error(Some(&io)).is_none());
        assert!(!matches_kind(Some(&Layer(Box::new(io))), ErrorKind::Generic));
    }

    #[test]
    fn kind_display_is_default_message() {
        assert_eq!(ErrorKind::AccessDenied.to_string(), "Access denied.");
        assert_eq!(ErrorKind::MissingCredentials.to_string(), "\"apiKey\" is missing.");
    }
}
