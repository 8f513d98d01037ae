//! Purpose: Classify canonical responses into three-valued operation verdicts.
//! Exports: `ValidationMode`, `WellFormed`, `Verdict`, `ApiError`, `FetchOutcome`, `classify_response`.
//! Role: Sole authority on whether a remote operation counts as successful.
//! Invariants: `Indeterminate` is produced only when validation is skipped upstream.
//! Invariants: Extracted errors are the envelope's `errors` array, verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::response::{CanonicalResponse, Payload};

/// Which envelope shape the operation expects. `Skip` opts out of shape
/// validation entirely and forces an indeterminate verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    Full,
    WithoutResult,
    StringPayload,
    Skip,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WellFormed {
    Valid,
    Invalid,
    Unchecked,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Success,
    Failure,
    Indeterminate,
}

/// One entry of the remote envelope's `errors` array.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

/// Bridge output: the canonical response plus its classification.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchOutcome {
    pub response: CanonicalResponse,
    pub well_formed: WellFormed,
    pub verdict: Verdict,
    pub errors: Option<Vec<ApiError>>,
}

pub fn classify_response(response: &CanonicalResponse, mode: ValidationMode) -> FetchOutcome {
    let well_formed = response_shape(response, mode);
    let verdict = success_verdict(response, well_formed);
    let errors = match verdict {
        Verdict::Success => None,
        Verdict::Failure | Verdict::Indeterminate => extract_errors(&response.payload),
    };
    FetchOutcome {
        response: response.clone(),
        well_formed,
        verdict,
        errors,
    }
}

fn response_shape(response: &CanonicalResponse, mode: ValidationMode) -> WellFormed {
    let ok = match mode {
        ValidationMode::Skip => return WellFormed::Unchecked,
        ValidationMode::Full => {
            object_has_keys(&response.payload, &["success", "errors", "messages", "result"])
        }
        ValidationMode::WithoutResult => {
            object_has_keys(&response.payload, &["success", "errors", "messages"])
        }
        ValidationMode::StringPayload => matches!(response.payload, Payload::Text(_)),
    };
    if ok { WellFormed::Valid } else { WellFormed::Invalid }
}

fn object_has_keys(payload: &Payload, keys: &[&str]) -> bool {
    let Payload::Object(Value::Object(map)) = payload else {
        return false;
    };
    keys.iter().all(|key| map.contains_key(*key))
}

fn success_verdict(response: &CanonicalResponse, well_formed: WellFormed) -> Verdict {
    match well_formed {
        // Do not guess: skipped validation propagates as indeterminate.
        WellFormed::Unchecked => Verdict::Indeterminate,
        WellFormed::Invalid => Verdict::Failure,
        WellFormed::Valid => match &response.payload {
            Payload::Object(value) => {
                let envelope_success = value
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if response.http_success && envelope_success {
                    Verdict::Success
                } else {
                    Verdict::Failure
                }
            }
            // A retrieved value implies success.
            Payload::Text(_) => Verdict::Success,
        },
    }
}

/// Structured error for non-success outcomes. Text payloads carry none; the
/// absence of a value is itself the failure signal upstream.
pub fn extract_errors(payload: &Payload) -> Option<Vec<ApiError>> {
    let Payload::Object(value) = payload else {
        return None;
    };
    let errors = value.get("errors")?;
    serde_json::from_value(errors.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::{
        ApiError, ValidationMode, Verdict, WellFormed, classify_response, extract_errors,
    };
    use crate::core::response::{CanonicalResponse, Payload};
    use serde_json::json;

    fn object_response(http_success: bool, payload: serde_json::Value) -> CanonicalResponse {
        CanonicalResponse {
            http_success,
            status_code: if http_success { 200 } else { 404 },
            payload: Payload::Object(payload),
        }
    }

    fn text_response(http_success: bool, text: &str) -> CanonicalResponse {
        CanonicalResponse {
            http_success,
            status_code: if http_success { 200 } else { 404 },
            payload: Payload::Text(text.to_string()),
        }
    }

    #[test]
    fn skip_mode_is_always_indeterminate() {
        let envelope = json!({"success": true, "errors": [], "messages": [], "result": null});
        for response in [object_response(true, envelope), text_response(true, "abc")] {
            let outcome = classify_response(&response, ValidationMode::Skip);
            assert_eq!(outcome.well_formed, WellFormed::Unchecked);
            assert_eq!(outcome.verdict, Verdict::Indeterminate);
        }
    }

    #[test]
    fn full_envelope_with_success_true_is_success() {
        let response = object_response(
            true,
            json!({"success": true, "errors": [], "messages": [], "result": null}),
        );
        let outcome = classify_response(&response, ValidationMode::Full);
        assert_eq!(outcome.well_formed, WellFormed::Valid);
        assert_eq!(outcome.verdict, Verdict::Success);
        assert_eq!(outcome.errors, None);
    }

    #[test]
    fn missing_result_key_fails_full_validation() {
        let response =
            object_response(true, json!({"success": true, "errors": [], "messages": []}));
        let outcome = classify_response(&response, ValidationMode::Full);
        assert_eq!(outcome.well_formed, WellFormed::Invalid);
        assert_eq!(outcome.verdict, Verdict::Failure);
    }

    #[test]
    fn without_result_mode_accepts_result_free_envelope() {
        let response =
            object_response(true, json!({"success": true, "errors": [], "messages": []}));
        let outcome = classify_response(&response, ValidationMode::WithoutResult);
        assert_eq!(outcome.well_formed, WellFormed::Valid);
        assert_eq!(outcome.verdict, Verdict::Success);
    }

    #[test]
    fn envelope_success_false_narrows_to_failure() {
        let response = object_response(
            true,
            json!({
                "success": false,
                "errors": [{"code": 10011, "message": "could not find namespace"}],
                "messages": [],
                "result": null
            }),
        );
        let outcome = classify_response(&response, ValidationMode::Full);
        assert_eq!(outcome.verdict, Verdict::Failure);
        assert_eq!(
            outcome.errors,
            Some(vec![ApiError {
                code: 10011,
                message: "could not find namespace".to_string()
            }])
        );
    }

    #[test]
    fn http_failure_narrows_even_when_envelope_claims_success() {
        let response = object_response(
            false,
            json!({"success": true, "errors": [], "messages": [], "result": null}),
        );
        let outcome = classify_response(&response, ValidationMode::Full);
        assert_eq!(outcome.verdict, Verdict::Failure);
    }

    #[test]
    fn absent_envelope_success_defaults_to_failure() {
        let response = object_response(
            true,
            json!({"success": null, "errors": [], "messages": [], "result": null}),
        );
        let outcome = classify_response(&response, ValidationMode::Full);
        assert_eq!(outcome.verdict, Verdict::Failure);
    }

    #[test]
    fn string_payload_collapses_to_success() {
        let outcome = classify_response(&text_response(false, "abc"), ValidationMode::StringPayload);
        assert_eq!(outcome.well_formed, WellFormed::Valid);
        assert_eq!(outcome.verdict, Verdict::Success);
        assert_eq!(outcome.errors, None);
    }

    #[test]
    fn string_mode_rejects_object_payload() {
        let response = object_response(
            true,
            json!({"success": true, "errors": [], "messages": [], "result": null}),
        );
        let outcome = classify_response(&response, ValidationMode::StringPayload);
        assert_eq!(outcome.well_formed, WellFormed::Invalid);
        assert_eq!(outcome.verdict, Verdict::Failure);
    }

    #[test]
    fn text_payloads_carry_no_structured_error() {
        assert_eq!(extract_errors(&Payload::Text("abc".to_string())), None);
    }

    #[test]
    fn object_without_errors_key_extracts_none() {
        assert_eq!(extract_errors(&Payload::Object(json!({"success": false}))), None);
    }
}
