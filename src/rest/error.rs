//! REST API error bodies.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Error body returned by the REST API:
/// `{"code": int, "message": string, "errors": ...?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Discord's JSON error code (not the HTTP status).
    pub code: i64,

    /// Human-readable summary.
    pub message: String,

    /// Per-field validation errors, when the request body was at fault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorNode>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if let Some(errors) = &self.errors {
            for line in errors.render() {
                write!(f, "\n{line}")?;
            }
        }
        Ok(())
    }
}

/// A node of the recursive per-field error tree. Interior nodes map
/// field names to further nodes; leaves carry `_errors` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorNode {
    /// Errors attached directly to this field.
    #[serde(rename = "_errors", default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDetail>,

    /// Nested fields with their own errors.
    #[serde(flatten)]
    pub fields: BTreeMap<String, ErrorNode>,
}

impl ErrorNode {
    /// Flatten the tree into human-readable lines: leaves render as
    /// `"<field>" <message> (<code>)`, interior nodes as `In "<field>":`
    /// with their children indented.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.render_into(&mut lines, 0);
        lines
    }

    fn render_into(&self, lines: &mut Vec<String>, depth: usize) {
        let indent = "  ".repeat(depth);
        for (field, node) in &self.fields {
            for error in &node.errors {
                lines.push(format!(
                    "{indent}\"{field}\" {} ({})",
                    error.message, error.code
                ));
            }
            if !node.fields.is_empty() {
                lines.push(format!("{indent}In \"{field}\":"));
                node.render_into(lines, depth + 1);
            }
        }
    }
}

/// One concrete validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable code, e.g. `BASE_TYPE_REQUIRED`.
    pub code: String,

    /// Human-readable message.
    pub message: String,
}

/// Body of a 429 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    /// Human-readable summary.
    pub message: String,

    /// How long to wait before retrying, in milliseconds.
    pub retry_after: u64,

    /// Whether the account-wide limit was hit, rather than a per-route
    /// bucket.
    #[serde(default)]
    pub global: bool,
}
