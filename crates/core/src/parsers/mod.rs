pub mod chrome;
pub mod guards;
pub mod js_self_profiling;
pub mod schema;
pub mod v8_chunks;

pub use guards::{InputFormat, detect_format};

use serde_json::Value;
use thiserror::Error;

use crate::model::ProfileGroup;
use chrome::{ChromeParseError, import_chrome_trace};
use js_self_profiling::{JsSelfProfileParseError, import_js_self_profile};
use schema::{SchemaParseError, import_schema};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("js self profile: {0}")]
    JsSelfProfile(#[from] JsSelfProfileParseError),
    #[error("chrome: {0}")]
    Chrome(#[from] ChromeParseError),
    #[error("schema: {0}")]
    Schema(#[from] SchemaParseError),
    #[error("Unsupported trace format")]
    UnsupportedFormat,
    #[error("Failed to parse input JSON")]
    InvalidJson,
}

/// Detect the format of an already parsed document and import it.
///
/// Detection order matters, see [`detect_format`]. Every profile in the
/// returned group owns its frames; nothing is shared between calls.
pub fn import_profile(input: &Value, trace_id: &str) -> Result<ProfileGroup, ImportError> {
    let format = detect_format(input).ok_or(ImportError::UnsupportedFormat)?;
    log::debug!("importing {format:?} input for trace {trace_id:?}");

    let group = match format {
        InputFormat::JsSelfProfile => import_js_self_profile(input, trace_id)?,
        InputFormat::ChromeTraceObject
        | InputFormat::ChromeTraceArray
        | InputFormat::TypescriptChromeTrace => import_chrome_trace(input, trace_id)?,
        InputFormat::Schema => import_schema(input, trace_id)?,
    };
    Ok(group)
}

/// Parse raw bytes as JSON and import them.
pub fn parse_json(data: &[u8], trace_id: &str) -> Result<ProfileGroup, ImportError> {
    let value: Value = serde_json::from_slice(data).map_err(|err| {
        log::debug!("input is not JSON: {err}");
        ImportError::InvalidJson
    })?;
    import_profile(&value, trace_id)
}

fn parse_container(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

/// Import a user supplied file, using its name as the trace id.
///
/// Chrome writes trace arrays incrementally, so a trace captured from a
/// crashed or killed process lacks its closing bracket. When the contents do
/// not parse as an object or array, parsing is retried with `]` appended.
pub fn import_dropped_profile(file_name: &str, contents: &str) -> Result<ProfileGroup, ImportError> {
    let value = parse_container(contents)
        .or_else(|| {
            log::debug!("{file_name}: retrying as an unterminated event array");
            parse_container(&format!("{contents}]"))
        })
        .ok_or(ImportError::InvalidJson)?;
    import_profile(&value, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_shape_is_unsupported() {
        let err = import_profile(&json!({"hello": "world"}), "t").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat));
        assert_eq!(err.to_string(), "Unsupported trace format");
    }

    #[test]
    fn chrome_object_format_error_surfaces() {
        let err = import_profile(&json!({"traceEvents": []}), "t").unwrap_err();
        assert!(err.to_string().contains("Chrometrace object format is not yet supported"));
    }

    #[test]
    fn dispatches_schema_input() {
        let input = json!({
            "transactionName": "tx",
            "shared": {"frames": [{"name": "f"}]},
            "profiles": [{
                "type": "sampled", "name": "p", "unit": "milliseconds",
                "startValue": 0, "endValue": 1, "samples": [[0]], "weights": [1]
            }]
        });
        let group = import_profile(&input, "trace").unwrap();
        assert_eq!(group.name, "tx");
        assert_eq!(group.profiles.len(), 1);
    }

    #[test]
    fn parse_json_rejects_garbage() {
        assert!(matches!(
            parse_json(b"not json", "t"),
            Err(ImportError::InvalidJson)
        ));
    }

    #[test]
    fn dropped_file_with_missing_bracket_is_recovered() {
        let contents = r#"[{"name": "a", "ph": "X", "ts": 0, "dur": 4, "pid": 1, "tid": 1}"#;
        let group = import_dropped_profile("trace.json", contents).unwrap();
        assert_eq!(group.trace_id, "trace.json");
        assert_eq!(group.profiles[0].weights(), &[4.0]);
    }

    #[test]
    fn dropped_scalar_is_invalid() {
        assert!(matches!(
            import_dropped_profile("n.json", "42"),
            Err(ImportError::InvalidJson)
        ));
        assert!(matches!(
            import_dropped_profile("x.json", "{"),
            Err(ImportError::InvalidJson)
        ));
    }
}
