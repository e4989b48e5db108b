//! Config schemas published by each dimension mode
//!
//! A schema is descriptive metadata: it tells a dashboard which parameters a
//! dimension understands and what they mean. Reads never enforce it; missing
//! or malformed values fall back to defaults inside the dimension.

use serde::Serialize;

use super::{coerce_date, coerce_f64, coerce_int, coerce_string, utc_offset, ParameterSet};
use crate::types::{parse_duration, Interval, ValueType};

/// One recognized parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    /// Parameter name as it appears in a [`ParameterSet`]
    pub name: String,
    /// Short human label
    pub label: String,
    /// Longer hint, may be empty
    pub description: String,
    /// Declared type
    pub value_type: ValueType,
    /// Shape a string value must also have
    #[serde(skip_serializing_if = "ParamFormat::is_free")]
    pub format: ParamFormat,
}

/// Textual shape of a string parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamFormat {
    /// Any text
    #[default]
    Free,
    /// A duration like `500ms` or `10s`
    Duration,
    /// A bucket interval like `1h` or `30s`
    Interval,
}

impl ParamFormat {
    fn is_free(&self) -> bool {
        *self == ParamFormat::Free
    }

    fn accepts(self, value: &str) -> bool {
        match self {
            ParamFormat::Free => true,
            ParamFormat::Duration => parse_duration(value).is_some(),
            ParamFormat::Interval => value.parse::<Interval>().is_ok(),
        }
    }
}

/// Ordered list of recognized parameters for one dimension mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    params: Vec<ParamSpec>,
}

/// A problem found by [`ConfigSchema::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// The parameter set carries a name the schema does not declare
    UnknownParam(String),
    /// The value cannot be read as the declared type
    TypeMismatch {
        /// Parameter name
        name: String,
        /// Declared type
        expected: ValueType,
    },
}

impl ConfigSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter, keeping declaration order
    pub fn add(
        mut self,
        name: &str,
        label: &str,
        description: &str,
        value_type: ValueType,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            value_type,
            format: ParamFormat::Free,
        });
        self
    }

    /// Append a string parameter whose value must have `format`
    pub fn add_formatted(
        mut self,
        name: &str,
        label: &str,
        description: &str,
        format: ParamFormat,
    ) -> Self {
        self = self.add(name, label, description, ValueType::String);
        if let Some(spec) = self.params.last_mut() {
            spec.format = format;
        }
        self
    }

    /// Parameters in declaration order
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a parameter by name
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Number of declared parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the schema declares nothing
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Report unknown names and values that do not fit their declared type
    ///
    /// Absent parameters are never violations. String parameters must also
    /// match their declared [`ParamFormat`].
    pub fn validate(&self, params: &ParameterSet) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();

        let mut names: Vec<&str> = params.names().collect();
        names.sort_unstable();

        for name in names {
            let Some(spec) = self.get(name) else {
                violations.push(SchemaViolation::UnknownParam(name.to_string()));
                continue;
            };
            let Some(raw) = params.get_raw(name) else {
                continue;
            };

            let fits = match spec.value_type {
                ValueType::Int => coerce_int(raw).is_some(),
                ValueType::Double => coerce_f64(raw).is_some(),
                ValueType::DateTime => coerce_date(raw, &utc_offset()).is_some(),
                ValueType::String => coerce_string(raw).is_some_and(|s| spec.format.accepts(&s)),
            };

            if !fits {
                violations.push(SchemaViolation::TypeMismatch {
                    name: name.to_string(),
                    expected: spec.value_type,
                });
            }
        }

        violations
    }
}
