//! Classification of failure bodies through the public API.

use std::error::Error;
use std::fmt;

use retailcrm_client::{
    classify, find_api_error, matches_kind, new_generic_error, CrmError, ErrorKind, ErrorsList,
};

/// A pass-through error some caller layer might wrap API failures in.
#[derive(Debug)]
struct Context {
    what: &'static str,
    source: Box<dyn Error + 'static>,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.what, self.source)
    }
}

impl Error for Context {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

fn wrap(err: impl Error + 'static, layers: usize) -> Box<dyn Error + 'static> {
    let mut boxed: Box<dyn Error + 'static> = Box::new(err);
    for _ in 0..layers {
        boxed = Box::new(Context {
            what: "while syncing",
            source: boxed,
        });
    }
    boxed
}

#[test]
fn angle_bracket_bodies_are_missing_accounts() {
    let bodies: [&[u8]; 4] = [
        b"<",
        b"<!DOCTYPE html><html></html>",
        b"<?xml version=\"1.0\"?><error/>",
        b"<{\"errorMsg\":\"Access denied.\"}",
    ];
    for body in bodies {
        let err = classify(body).unwrap();
        assert_eq!(err.kind(), ErrorKind::AccountDoesNotExist);
    }
}

#[test]
fn missing_credentials() {
    let err = classify(br#"{"errorMsg": "\"apiKey\" is missing."}"#).unwrap();
    assert_eq!(err.kind(), ErrorKind::MissingCredentials);
    assert_eq!(err.message(), "\"apiKey\" is missing.");
}

#[test]
fn invalid_credentials() {
    let err = classify(br#"{"errorMsg": "Wrong \"apiKey\" value."}"#).unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
}

#[test]
fn missing_parameter_name_is_captured() {
    let err = classify(br#"{"errorMsg": "Parameter 'item' is missing"}"#).unwrap();
    assert_eq!(err.kind(), ErrorKind::MissingParameter);
    assert_eq!(err.errors().get("Name"), Some("item"));
    assert_eq!(
        err.to_string(),
        r#"errorMsg: "Parameter 'item' is missing", errors: [Name: "item"]"#
    );
}

#[test]
fn validation_errors_keep_field_names() {
    let err = classify(
        br#"{"success": false, "errorMsg": "Errors in the entity format", "errors": {"name": "name must be provided"}}"#,
    )
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(err.errors().get("name"), Some("name must be provided"));
    assert_eq!(
        err.to_string(),
        r#"errorMsg: "Errors in the entity format", errors: [name: "name must be provided"]"#
    );
}

#[test]
fn object_errors_render_in_server_order() {
    let err = classify(
        br#"{"errorMsg": "Errors in the entity format", "errors": {"name": "name must be provided", "email": "email is invalid"}}"#,
    )
    .unwrap();
    assert_eq!(
        err.to_string(),
        r#"errorMsg: "Errors in the entity format", errors: [name: "name must be provided", email: "email is invalid"]"#
    );
}

#[test]
fn array_errors_render_without_keys() {
    let err = classify(
        br#"{"success": false, "errorMsg": "Failed to activate module", "errors": ["insufficient funds", "Test error"]}"#,
    )
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::Generic);
    assert_eq!(
        err.errors(),
        &ErrorsList::from(vec![("0", "insufficient funds"), ("1", "Test error")])
    );
    assert_eq!(
        err.to_string(),
        r#"errorMsg: "Failed to activate module", errors: [insufficient funds, Test error]"#
    );
}

#[test]
fn array_order_survives_rendering() {
    let err = classify(br#"{"errorMsg": "Batch failed", "errors": ["c", "a", "b"]}"#).unwrap();
    let values: Vec<_> = err.errors().iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec!["c", "a", "b"]);
    assert_eq!(err.to_string(), r#"errorMsg: "Batch failed", errors: [c, a, b]"#);
}

#[test]
fn wrapped_errors_still_match() {
    for layers in 0..5 {
        let err = classify(br#"{"errorMsg": "Access denied."}"#).unwrap();
        let chain = wrap(err, layers);
        assert!(matches_kind(Some(chain.as_ref()), ErrorKind::AccessDenied));
        assert!(matches_kind(Some(chain.as_ref()), ErrorKind::AccessDenied));
        let found = find_api_error(Some(chain.as_ref())).unwrap();
        assert_eq!(found.kind(), ErrorKind::AccessDenied);
    }
}

#[test]
fn client_errors_expose_the_classified_source() {
    let api = classify(br#"{"errorMsg": "Validation error"}"#).unwrap();
    let err = CrmError::from(api);
    assert!(err.is_kind(ErrorKind::ValidationError));
    assert!(matches_kind(Some(&err), ErrorKind::ValidationError));

    let chain = wrap(err, 2);
    assert!(matches_kind(Some(chain.as_ref()), ErrorKind::ValidationError));
    assert!(!matches_kind(Some(chain.as_ref()), ErrorKind::Generic));
}

#[test]
fn match_and_lookup_agree() {
    let bodies: [&[u8]; 4] = [
        br#"{"errorMsg": "Access denied."}"#,
        br#"{"errorMsg": "Parameter 'by' is missing"}"#,
        br#"{"errorMsg": "Something new"}"#,
        b"<html/>",
    ];
    for body in bodies {
        let chain = wrap(classify(body).unwrap(), 1);
        let found = find_api_error(Some(chain.as_ref())).unwrap();
        for kind in ErrorKind::ALL {
            assert_eq!(
                matches_kind(Some(chain.as_ref()), kind),
                found.kind() == kind
            );
        }
    }
}

#[test]
fn absent_errors_never_match() {
    assert!(find_api_error(None).is_none());
    for kind in ErrorKind::ALL {
        assert!(!matches_kind(None, kind));
    }
}

#[test]
fn generic_errors_are_indistinguishable_from_classified() {
    let built = new_generic_error("Something new");
    let parsed = classify(br#"{"errorMsg": "Something new"}"#).unwrap();
    assert_eq!(built, parsed);
    assert!(matches_kind(Some(&built), ErrorKind::Generic));
}

#[test]
fn decode_failures_are_not_api_errors() {
    let err = classify(b"Bad Gateway").unwrap_err();
    let crm = CrmError::Decode(err);
    assert!(crm.api_error().is_none());
    assert!(find_api_error(Some(&crm)).is_none());
}
