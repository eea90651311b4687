use crate::error::{PipelineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Parameter values keyed by parameter name.
pub type ParameterValues = Map<String, Value>;

pub const DEFAULT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// TemplateCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateCategory {
    WebFrontend,
    WebBackend,
    Api,
    Microservice,
    Mobile,
    Desktop,
    DataProcessing,
    MlAi,
    Devops,
    Custom,
}

impl TemplateCategory {
    pub fn all() -> &'static [TemplateCategory] {
        &[
            TemplateCategory::WebFrontend,
            TemplateCategory::WebBackend,
            TemplateCategory::Api,
            TemplateCategory::Microservice,
            TemplateCategory::Mobile,
            TemplateCategory::Desktop,
            TemplateCategory::DataProcessing,
            TemplateCategory::MlAi,
            TemplateCategory::Devops,
            TemplateCategory::Custom,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateCategory::WebFrontend => "web-frontend",
            TemplateCategory::WebBackend => "web-backend",
            TemplateCategory::Api => "api",
            TemplateCategory::Microservice => "microservice",
            TemplateCategory::Mobile => "mobile",
            TemplateCategory::Desktop => "desktop",
            TemplateCategory::DataProcessing => "data-processing",
            TemplateCategory::MlAi => "ml-ai",
            TemplateCategory::Devops => "devops",
            TemplateCategory::Custom => "custom",
        }
    }

    /// Title-cased label, e.g. `web-frontend` -> `Web Frontend`.
    pub fn display_name(self) -> String {
        self.as_str()
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemplateCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TemplateCategory::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ParameterKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Integer,
    Boolean,
    Array,
    Object,
    Select,
}

impl ParameterKind {
    pub fn all() -> &'static [ParameterKind] {
        &[
            ParameterKind::String,
            ParameterKind::Integer,
            ParameterKind::Boolean,
            ParameterKind::Array,
            ParameterKind::Object,
            ParameterKind::Select,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Integer => "integer",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Array => "array",
            ParameterKind::Object => "object",
            ParameterKind::Select => "select",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ParameterKind::String => value.is_string(),
            ParameterKind::Integer => value.is_i64() || value.is_u64(),
            ParameterKind::Boolean => value.is_boolean(),
            ParameterKind::Array => value.is_array(),
            ParameterKind::Object => value.is_object(),
            // membership is checked against the declared options
            ParameterKind::Select => true,
        }
    }

    fn expectation(self) -> &'static str {
        match self {
            ParameterKind::String => "a string",
            ParameterKind::Integer => "an integer",
            ParameterKind::Boolean => "a boolean",
            ParameterKind::Array => "an array",
            ParameterKind::Object => "an object",
            ParameterKind::Select => "one of its options",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParameterKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ParameterKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidParameterKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ParameterSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub min_value: Option<Number>,
    #[serde(default)]
    pub max_value: Option<Number>,
    #[serde(default)]
    pub pattern: Option<String>,
}

fn default_required() -> bool {
    true
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            default: None,
            required: true,
            options: None,
            min_value: None,
            max_value: None,
            pattern: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min_value = min.map(Number::from);
        self.max_value = max.map(Number::from);
        self
    }

    /// Bring a supplied value to the declared type where the intent is
    /// unambiguous. Command-line values arrive as text, so text that parses
    /// as JSON of the declared type is converted; for `string` and `select`
    /// a number or boolean is turned into its text form. Anything else is
    /// returned unchanged for [`ParameterSpec::validate`] to judge.
    pub fn coerce(&self, value: Value) -> Value {
        match (self.kind, value) {
            (ParameterKind::String | ParameterKind::Select, Value::Number(n)) => {
                Value::String(n.to_string())
            }
            (ParameterKind::String | ParameterKind::Select, Value::Bool(b)) => {
                Value::String(b.to_string())
            }
            (
                ParameterKind::Integer
                | ParameterKind::Boolean
                | ParameterKind::Array
                | ParameterKind::Object,
                Value::String(text),
            ) => {
                let parsed = serde_json::from_str::<Value>(text.trim()).ok();
                match parsed {
                    Some(parsed) if self.kind.matches(&parsed) => parsed,
                    _ => Value::String(text),
                }
            }
            (_, value) => value,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Check a supplied value (`None` or JSON `null` when absent).
    pub fn validate(&self, value: Option<&Value>) -> std::result::Result<(), String> {
        let value = match value {
            None | Some(Value::Null) => {
                if self.required && self.default.is_none() {
                    return Err(format!("Parameter '{}' is required", self.name));
                }
                return Ok(());
            }
            Some(v) => v,
        };

        if !self.kind.matches(value) {
            return Err(format!(
                "Parameter '{}' must be {}",
                self.name,
                self.kind.expectation()
            ));
        }

        match self.kind {
            ParameterKind::Select => {
                let options = self.options.as_deref().unwrap_or_default();
                let allowed = value
                    .as_str()
                    .is_some_and(|v| options.iter().any(|o| o == v));
                if !allowed {
                    return Err(format!(
                        "Parameter '{}' must be one of: {}",
                        self.name,
                        options.join(", ")
                    ));
                }
            }
            ParameterKind::Integer => {
                if let Value::Number(n) = value {
                    if let Some(min) = self.min_value.as_ref().filter(|min| compare(n, min).is_lt()) {
                        return Err(format!("Parameter '{}' must be >= {}", self.name, min));
                    }
                    if let Some(max) = self.max_value.as_ref().filter(|max| compare(n, max).is_gt()) {
                        return Err(format!("Parameter '{}' must be <= {}", self.name, max));
                    }
                }
            }
            ParameterKind::String => {
                if let (Some(pattern), Some(text)) = (&self.pattern, value.as_str()) {
                    let re = anchored(pattern).map_err(|_| {
                        format!("Parameter '{}' has an invalid pattern '{}'", self.name, pattern)
                    })?;
                    if !re.is_match(text) {
                        return Err(format!(
                            "Parameter '{}' must match pattern '{}'",
                            self.name, pattern
                        ));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Problems with the declaration itself, independent of any value.
    pub fn definition_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("parameter name must not be empty".to_string());
        }
        if self.kind == ParameterKind::Select
            && self.options.as_ref().map_or(true, Vec::is_empty)
        {
            errors.push(format!(
                "Parameter '{}' of type select must declare options",
                self.name
            ));
        }
        if let (Some(min), Some(max)) = (&self.min_value, &self.max_value) {
            if compare(min, max).is_gt() {
                errors.push(format!(
                    "Parameter '{}' has min_value greater than max_value",
                    self.name
                ));
            }
        }
        if let Some(pattern) = &self.pattern {
            if anchored(pattern).is_err() {
                errors.push(format!(
                    "Parameter '{}' has an invalid pattern '{}'",
                    self.name, pattern
                ));
            }
        }
        if let Some(default) = &self.default {
            if let Err(e) = self.validate(Some(default)) {
                errors.push(format!("invalid default: {e}"));
            }
        }
        errors
    }
}

/// Exact for integers of either sign; floats fall back to `f64`.
fn compare(a: &Number, b: &Number) -> Ordering {
    match (a.as_i64(), b.as_i64(), a.as_u64(), b.as_u64()) {
        (Some(x), Some(y), _, _) => x.cmp(&y),
        (_, _, Some(x), Some(y)) => x.cmp(&y),
        // one side is negative, the other above i64::MAX
        (Some(_), None, None, Some(_)) => Ordering::Less,
        (None, Some(_), Some(_), None) => Ordering::Greater,
        _ => {
            let x = a.as_f64().unwrap_or_default();
            let y = b.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
    }
}

/// Patterns must match the whole value.
fn anchored(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

// ---------------------------------------------------------------------------
// TemplateSchema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSchema {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub category: TemplateCategory,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl TemplateSchema {
    pub fn new(name: impl Into<String>, category: TemplateCategory) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            description: String::new(),
            category,
            author: String::new(),
            tags: Vec::new(),
            extends: None,
            requirements: None,
            parameters: Vec::new(),
        }
    }

    /// Display identity, `name-version`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn optional_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| !p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Validate every declared parameter against `values`. All failures are
    /// collected; a key missing from `values` counts as absent.
    pub fn validate_parameters(&self, values: &ParameterValues) -> std::result::Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .parameters
            .iter()
            .filter_map(|p| p.validate(values.get(&p.name)).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Coerce every declared parameter in `values` with
    /// [`ParameterSpec::coerce`]. Undeclared keys pass through untouched.
    pub fn coerce_parameters(&self, values: &ParameterValues) -> ParameterValues {
        values
            .iter()
            .map(|(key, value)| {
                let value = match self.parameter(key) {
                    Some(spec) => spec.coerce(value.clone()),
                    None => value.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Defaults of the parameters that declare one.
    pub fn default_values(&self) -> ParameterValues {
        self.parameters
            .iter()
            .filter_map(|p| match &p.default {
                Some(Value::Null) | None => None,
                Some(v) => Some((p.name.clone(), v.clone())),
            })
            .collect()
    }

    pub fn definition_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("template name must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for p in &self.parameters {
            if !seen.insert(p.name.as_str()) {
                errors.push(format!("duplicate parameter '{}'", p.name));
            }
            errors.extend(p.definition_errors());
        }
        errors
    }

    /// Reject schemas whose declaration is inconsistent.
    pub fn check(&self) -> Result<()> {
        let errors = self.definition_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InvalidDefinition {
                name: self.name.clone(),
                errors,
            })
        }
    }

    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_document(doc: Value) -> Result<Self> {
        Ok(serde_json::from_value(doc)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
