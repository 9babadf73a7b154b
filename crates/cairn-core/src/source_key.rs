use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Non-fatal problem with the matrix descriptor. The key falls back to the
/// unparameterized `workflow/job` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ignoring matrix descriptor: {reason}")]
pub struct MatrixParseWarning {
    pub reason: String,
}

/// Deterministic producer identity plus any degradation that happened while
/// deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub key: String,
    pub warning: Option<MatrixParseWarning>,
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn base_key(workflow: &str, job: &str) -> String {
    format!("{}/{}", workflow.trim(), job.trim())
}

fn render_matrix_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Builds `workflow/job(k1=v1, k2=v2)` with entries sorted by key, or the bare
/// `workflow/job` form when there are no entries.
pub fn source_key_from_entries<'a, I>(workflow: &str, job: &str, entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let sorted = entries
        .into_iter()
        .map(|(key, value)| (key, render_matrix_value(value)))
        .collect::<BTreeMap<_, _>>();
    let base = base_key(workflow, job);
    if sorted.is_empty() {
        return base;
    }
    let params = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{base}({params})")
}

/// Derives the source key from a raw matrix descriptor as delivered by the CI
/// environment (`toJSON(matrix)`). Never fails.
pub fn derive_source_key(workflow: &str, job: &str, matrix: Option<&str>) -> SourceKey {
    let raw = matrix.map(str::trim).unwrap_or_default();
    if raw.is_empty() || raw == "null" {
        return SourceKey {
            key: base_key(workflow, job),
            warning: None,
        };
    }

    let warning = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(entries)) => {
            return SourceKey {
                key: source_key_from_entries(
                    workflow,
                    job,
                    entries.iter().map(|(key, value)| (key.as_str(), value)),
                ),
                warning: None,
            };
        }
        Ok(Value::Null) => {
            return SourceKey {
                key: base_key(workflow, job),
                warning: None,
            };
        }
        Ok(other) => MatrixParseWarning {
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        },
        Err(error) => MatrixParseWarning {
            reason: error.to_string(),
        },
    };

    tracing::warn!(
        workflow = workflow.trim(),
        job = job.trim(),
        reason = %warning.reason,
        "matrix descriptor could not be parsed; using unparameterized source key"
    );
    SourceKey {
        key: base_key(workflow, job),
        warning: Some(warning),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
