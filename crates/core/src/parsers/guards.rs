//! Shape sniffing on raw JSON. No schema validation happens here; the
//! importers deserialize and validate once the shape is known.

use serde_json::Value;

/// Top-level input shapes, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// JS Self-Profiling API trace.
    JsSelfProfile,
    /// Chrome `{ "traceEvents": [...] }` object.
    ChromeTraceObject,
    /// Chrome event array carrying V8 `ProfileChunk` events.
    ChromeTraceArray,
    /// Chrome event array without profile chunks (TypeScript compiler traces).
    TypescriptChromeTrace,
    /// Sentry profiling schema.
    Schema,
}

/// An object without a `type` whose `resources` is an array.
pub fn is_js_profile(input: &Value) -> bool {
    input
        .as_object()
        .is_some_and(|o| !o.contains_key("type") && o.get("resources").is_some_and(Value::is_array))
}

pub fn is_chrome_trace_object_format(input: &Value) -> bool {
    input.as_object().is_some_and(|o| o.contains_key("traceEvents"))
}

fn is_profile_chunk(event: &Value) -> bool {
    event.get("ph").and_then(Value::as_str) == Some("P")
        && event.get("name").and_then(Value::as_str) == Some("ProfileChunk")
}

/// An event array with at least one V8 `ProfileChunk` event.
pub fn is_chrome_trace_array_format(input: &Value) -> bool {
    input
        .as_array()
        .is_some_and(|events| events.iter().any(is_profile_chunk))
}

/// An event array with no `ProfileChunk` events.
pub fn is_typescript_chrome_trace_array_format(input: &Value) -> bool {
    input
        .as_array()
        .is_some_and(|events| !events.iter().any(is_profile_chunk))
}

pub fn is_chrome_trace_format(input: &Value) -> bool {
    is_chrome_trace_object_format(input) || input.is_array()
}

pub fn is_schema(input: &Value) -> bool {
    input.as_object().is_some_and(|o| {
        o.contains_key("transactionName")
            && o.get("profiles").is_some_and(Value::is_array)
            && o.contains_key("shared")
    })
}

fn has_type(profile: &Value, expected: &str) -> bool {
    profile.get("type").and_then(Value::as_str) == Some(expected)
}

pub fn is_evented_profile(profile: &Value) -> bool {
    has_type(profile, "evented")
}

pub fn is_sampled_profile(profile: &Value) -> bool {
    has_type(profile, "sampled")
}

/// Classify `input`. Inputs can satisfy several guards at once, so the
/// order of checks is significant.
pub fn detect_format(input: &Value) -> Option<InputFormat> {
    if is_js_profile(input) {
        return Some(InputFormat::JsSelfProfile);
    }
    if is_chrome_trace_object_format(input) {
        return Some(InputFormat::ChromeTraceObject);
    }
    if is_chrome_trace_array_format(input) {
        return Some(InputFormat::ChromeTraceArray);
    }
    if is_typescript_chrome_trace_array_format(input) {
        return Some(InputFormat::TypescriptChromeTrace);
    }
    if is_schema(input) {
        return Some(InputFormat::Schema);
    }
    None
}
