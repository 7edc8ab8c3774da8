//! Structural validation of application state.
//!
//! A [`Schema`] describes the shape a serialized state value must have.
//! Validation walks the whole value and collects every violation instead of
//! stopping at the first, so a failed commit reports all broken fields at once.
//!
//! # Example
//!
//! ```
//! use refract_core::schema::Schema;
//! use serde_json::json;
//!
//! let task = Schema::object()
//!     .field("id", Schema::uuid())
//!     .field("title", Schema::string())
//!     .field("done", Schema::bool());
//!
//! let schema = Schema::object()
//!     .field("todos", Schema::map_of(Schema::uuid(), task).with_key_field("id"))
//!     .field("showing", Schema::one_of(["all", "active", "done"]));
//!
//! let report = schema
//!     .validate(&json!({ "todos": {}, "showing": "bogus" }))
//!     .unwrap_err();
//! assert_eq!(report.violations()[0].path(), "showing");
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A structural description of a JSON-shaped value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Schema {
    /// Accepts anything
    Any,
    /// A JSON string
    String,
    /// A JSON boolean
    Bool,
    /// A string in canonical hyphenated UUID form
    Uuid,
    /// A string drawn from a closed set
    OneOf(Vec<String>),
    /// An object with required fields; unknown fields are allowed
    Object(Vec<(String, Schema)>),
    /// An object used as a map with uniform keys and values
    MapOf {
        /// Schema every key must satisfy (as a string)
        key: Box<Schema>,
        /// Schema every value must satisfy
        value: Box<Schema>,
        /// Field of each value that must equal the value's own key
        key_field: Option<String>,
    },
}

impl Schema {
    /// Accept any value
    #[must_use]
    pub const fn any() -> Self {
        Self::Any
    }

    /// Require a string
    #[must_use]
    pub const fn string() -> Self {
        Self::String
    }

    /// Require a boolean
    #[must_use]
    pub const fn bool() -> Self {
        Self::Bool
    }

    /// Require a canonical UUID string
    #[must_use]
    pub const fn uuid() -> Self {
        Self::Uuid
    }

    /// Require one of the given strings
    #[must_use]
    pub fn one_of<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Require an object; add fields with [`Schema::field`]
    #[must_use]
    pub const fn object() -> Self {
        Self::Object(Vec::new())
    }

    /// Add a required field to an object schema
    ///
    /// Has no effect on non-object schemas.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, schema: Self) -> Self {
        if let Self::Object(fields) = &mut self {
            fields.push((name.into(), schema));
        }
        self
    }

    /// Require an object whose keys and values follow the given schemas
    #[must_use]
    pub fn map_of(key: Self, value: Self) -> Self {
        Self::MapOf {
            key: Box::new(key),
            value: Box::new(value),
            key_field: None,
        }
    }

    /// Require each map value's `field` to equal the key it is stored under
    ///
    /// Has no effect on non-map schemas.
    #[must_use]
    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        if let Self::MapOf { key_field, .. } = &mut self {
            *key_field = Some(field.into());
        }
        self
    }

    /// Validate a JSON value, collecting every violation
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationReport`] listing each violated path.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationReport> {
        let mut violations = Vec::new();
        self.check(value, &mut Vec::new(), &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationReport::new(violations))
        }
    }

    /// Serialize a value and validate the result
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationReport`] if serialization fails or the
    /// serialized form violates the schema.
    pub fn validate_serialize<T>(&self, value: &T) -> Result<(), ValidationReport>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_value(value).map_err(|error| {
            ValidationReport::new(vec![Violation::new(
                "",
                format!("value could not be serialized: {error}"),
            )])
        })?;
        self.validate(&json)
    }

    fn check(&self, value: &Value, path: &mut Vec<String>, out: &mut Vec<Violation>) {
        match self {
            Self::Any => {},
            Self::String => {
                if !value.is_string() {
                    out.push(Violation::at(path, format!("expected string, found {}", kind(value))));
                }
            },
            Self::Bool => {
                if !value.is_boolean() {
                    out.push(Violation::at(path, format!("expected boolean, found {}", kind(value))));
                }
            },
            Self::Uuid => match value.as_str() {
                Some(text) if is_canonical_uuid(text) => {},
                Some(text) => out.push(Violation::at(path, format!("expected uuid, found {text:?}"))),
                None => out.push(Violation::at(path, format!("expected uuid, found {}", kind(value)))),
            },
            Self::OneOf(allowed) => match value.as_str() {
                Some(text) if allowed.iter().any(|a| a == text) => {},
                _ => out.push(Violation::at(
                    path,
                    format!("expected one of [{}], found {value}", allowed.join(", ")),
                )),
            },
            Self::Object(fields) => {
                let Some(object) = value.as_object() else {
                    out.push(Violation::at(path, format!("expected object, found {}", kind(value))));
                    return;
                };
                for (name, schema) in fields {
                    path.push(name.clone());
                    match object.get(name) {
                        Some(field) => schema.check(field, path, out),
                        None => out.push(Violation::at(path, "missing required field")),
                    }
                    path.pop();
                }
            },
            Self::MapOf {
                key,
                value: value_schema,
                key_field,
            } => {
                let Some(object) = value.as_object() else {
                    out.push(Violation::at(path, format!("expected object, found {}", kind(value))));
                    return;
                };
                for (entry_key, entry) in object {
                    path.push(entry_key.clone());
                    key.check(&Value::String(entry_key.clone()), path, out);
                    value_schema.check(entry, path, out);
                    if let Some(field) = key_field {
                        check_key_field(entry_key, entry, field, path, out);
                    }
                    path.pop();
                }
            },
        }
    }
}

fn check_key_field(
    entry_key: &str,
    entry: &Value,
    field: &str,
    path: &mut Vec<String>,
    out: &mut Vec<Violation>,
) {
    let Some(actual) = entry.get(field) else {
        // Missing field is already reported by the value schema
        return;
    };
    if actual.as_str() != Some(entry_key) {
        path.push(field.to_string());
        out.push(Violation::at(
            path,
            format!("must equal its key {entry_key:?}, found {actual}"),
        ));
        path.pop();
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_canonical_uuid(text: &str) -> bool {
    text.len() == 36 && uuid::Uuid::try_parse(text).is_ok_and(|id| id.hyphenated().to_string() == text)
}

/// One violated field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    path: String,
    message: String,
}

impl Violation {
    /// Create a violation at a dotted path
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    fn at(path: &[String], message: impl Into<String>) -> Self {
        Self::new(path.join("."), message)
    }

    /// Dotted path of the field; empty for the root
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// What was wrong
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Every violation found in one validation pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    /// Create a report
    #[must_use]
    pub const fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// The violations, in the order they were found
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Whether any violation is at exactly `path`
    #[must_use]
    pub fn has_path(&self, path: &str) -> bool {
        self.violations.iter().any(|v| v.path == path)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State failed validation ({} violation(s))", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: failures should panic
mod tests {
    use super::*;
    use serde_json::json;

    const ID_A: &str = "0190f5a2-7c1e-7a3b-8f00-000000000001";
    const ID_B: &str = "0190f5a2-7c1e-7a3b-8f00-000000000002";

    fn todo_like() -> Schema {
        let task = Schema::object()
            .field("id", Schema::uuid())
            .field("title", Schema::string())
            .field("done", Schema::bool());

        Schema::object()
            .field("todos", Schema::map_of(Schema::uuid(), task).with_key_field("id"))
            .field("showing", Schema::one_of(["all", "active", "done"]))
    }

    #[test]
    fn test_valid_state_passes() {
        let state = json!({
            "todos": { ID_A: { "id": ID_A, "title": "Foo", "done": false } },
            "showing": "active",
        });
        assert_eq!(todo_like().validate(&state), Ok(()));
    }

    #[test]
    fn test_reports_every_violation() {
        let state = json!({
            "todos": {
                ID_A: { "id": ID_B, "title": 7, "done": "yes" },
            },
            "showing": "bogus",
        });

        let report = todo_like().validate(&state).unwrap_err();

        assert!(report.has_path(&format!("todos.{ID_A}.id")));
        assert!(report.has_path(&format!("todos.{ID_A}.title")));
        assert!(report.has_path(&format!("todos.{ID_A}.done")));
        assert!(report.has_path("showing"));
        assert_eq!(report.violations().len(), 4);
    }

    #[test]
    fn test_missing_fields_and_bad_keys() {
        let state = json!({
            "todos": { "not-a-uuid": { "id": "not-a-uuid", "done": true } },
        });

        let report = todo_like().validate(&state).unwrap_err();

        assert!(report.has_path("todos.not-a-uuid"));
        assert!(report.has_path("todos.not-a-uuid.id"));
        assert!(report.has_path("todos.not-a-uuid.title"));
        assert!(report.has_path("showing"));
    }

    #[test]
    fn test_uppercase_uuid_is_not_canonical() {
        let upper = ID_A.to_uppercase();
        assert!(Schema::uuid().validate(&json!(upper)).is_err());
        assert!(Schema::uuid().validate(&json!(ID_A)).is_ok());
    }

    #[test]
    fn test_report_display_is_one_line_per_violation() {
        let report = ValidationReport::new(vec![
            Violation::new("showing", "bad"),
            Violation::new("", "worse"),
        ]);
        let text = report.to_string();

        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("showing: bad"));
        assert!(text.contains("<root>: worse"));
    }
}
