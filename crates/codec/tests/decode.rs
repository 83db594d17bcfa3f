use chrono::{TimeZone, Utc};
use controlsync_codec::{CodecError, Decoded, ObjectCodec, Scope};
use parking_lot::Mutex;
use serde_json::json;

/// Scope that records every call it receives and answers from a fixed table.
#[derive(Default)]
struct TraceScope {
    calls: Mutex<Vec<String>>,
}

impl Scope for TraceScope {
    fn resolve_value(&self, path: &str) -> Option<Decoded> {
        match path {
            "app.name" => Some(Decoded::from("demo")),
            "app.limit" => Some(Decoded::from(5.0)),
            _ => None,
        }
    }

    fn call(&self, func: &str, context: Option<&str>, args: Vec<Decoded>) -> Result<Decoded, CodecError> {
        self.calls.lock().push(func.to_string());
        match (func, context) {
            ("tag", _) => {
                let label = args.first().and_then(Decoded::as_str).unwrap_or_default();
                Ok(Decoded::from(format!("<{label}>")))
            }
            ("upper", Some("fmt")) => Ok(Decoded::from(
                args.first()
                    .and_then(Decoded::as_str)
                    .unwrap_or_default()
                    .to_uppercase(),
            )),
            _ => Err(CodecError::UnknownFunction {
                path: func.to_string(),
            }),
        }
    }
}

#[test]
fn nested_calls_evaluate_depth_first() {
    let scope = TraceScope::default();
    let tree = json!([
        {"objType": "call", "func": "tag", "params": [
            {"objType": "call", "func": "tag", "params": ["inner"]}
        ]},
        {"objType": "call", "func": "upper", "context": "fmt", "params": [
            {"objType": "varref", "path": "app.name"}
        ]}
    ]);

    let report = ObjectCodec::new().decode_json(&tree, &scope);

    assert!(report.is_clean());
    assert_eq!(report.value.to_json(), json!(["<<inner>>", "DEMO"]));
    assert_eq!(*scope.calls.lock(), vec!["tag", "tag", "upper"]);
}

#[test]
fn failing_call_is_contained_to_its_node() {
    let scope = TraceScope::default();
    let tree = json!({
        "bad": {"objType": "call", "func": "missing.fn", "params": []},
        "good": {"objType": "call", "func": "tag", "params": ["ok"]}
    });

    let report = ObjectCodec::new().decode_json(&tree, &scope);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "$.bad");
    assert_eq!(report.value.get("bad"), Some(&Decoded::Undefined));
    assert_eq!(report.value.get("good"), Some(&Decoded::from("<ok>")));
}

#[test]
fn absent_variable_is_undefined_not_an_error() {
    let report = ObjectCodec::new().decode_json(
        &json!({"objType": "varref", "path": "app.nothing.here"}),
        &TraceScope::default(),
    );
    assert!(report.is_clean());
    assert!(report.value.is_undefined());
}

#[test]
fn closures_and_dates_decode() {
    let scope = TraceScope::default();
    let tree = json!({
        "fn": {"objType": "closure", "code": "return a + b;", "params": ["a", "b"]},
        "when": {"objType": "datetime", "y": 2024, "mo": 1, "d": 29, "h": 12, "mi": 0, "s": 5, "ms": 250, "utc": true},
        "never": {"objType": "datetime", "null": true}
    });

    let report = ObjectCodec::new().decode_json(&tree, &scope);

    let Some(Decoded::Function(function)) = report.value.get("fn") else {
        panic!("expected bound function");
    };
    assert_eq!(function.params, vec!["a", "b"]);
    let expected = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 5).unwrap() + chrono::Duration::milliseconds(250);
    assert_eq!(report.value.get("when"), Some(&Decoded::DateTime(expected)));
    assert_eq!(report.value.get("never"), Some(&Decoded::Null));
}

#[test]
fn impossible_date_is_reported() {
    let report = ObjectCodec::new().decode_json(
        &json!({"objType": "datetime", "y": 2023, "mo": 1, "d": 30, "utc": true}),
        &TraceScope::default(),
    );
    assert!(report.value.is_undefined());
    assert!(matches!(report.errors[0].error, CodecError::InvalidDate(_)));
}

#[test]
fn out_of_range_month_is_reported() {
    let report = ObjectCodec::new().decode_json(
        &json!({"objType": "datetime", "y": 2024, "mo": u32::MAX, "d": 1}),
        &TraceScope::default(),
    );
    assert!(report.value.is_undefined());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "$");
    assert!(matches!(report.errors[0].error, CodecError::InvalidDate(_)));
}
