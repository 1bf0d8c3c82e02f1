use serde_json::{json, Map, Value};

use crate::error::{ValidationError, ValidationIssue};

/// Declared input shape of a tool.
///
/// `Text` is the absence of a schema: the tool takes one opaque string.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InputSchema {
    #[default]
    Text,
    Object(ObjectSchema),
}

impl InputSchema {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// JSON Schema sent to the LLM as the tool's `input_schema`.
    ///
    /// Text tools advertise a single optional `input` string, which is also
    /// the shape agents tend to send back.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::Text => json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" }
                },
                "additionalProperties": false
            }),
            Self::Object(schema) => schema.to_json_schema(),
        }
    }
}

impl From<ObjectSchema> for InputSchema {
    fn from(schema: ObjectSchema) -> Self {
        Self::Object(schema)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    /// Any JSON number.
    Number,
    /// A JSON number with no fractional part.
    Integer,
    Boolean,
    /// A string restricted to the listed values.
    Enum(Vec<String>),
    Array(Box<FieldType>),
    Object(ObjectSchema),
}

impl FieldType {
    pub fn array_of(item: FieldType) -> Self {
        Self::Array(Box::new(item))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            Self::Enum(values) => json!({ "type": "string", "enum": values }),
            Self::Array(item) => json!({ "type": "array", "items": item.to_json_schema() }),
            Self::Object(schema) => schema.to_json_schema(),
            other => json!({ "type": other.name() }),
        }
    }

    /// Check `value` against this type, pushing any mismatches onto `issues`.
    /// Returns the cleaned value (unknown object keys stripped).
    fn check(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Value {
        match (self, value) {
            (Self::String, Value::String(_)) | (Self::Boolean, Value::Bool(_)) => value.clone(),
            (Self::Number, Value::Number(_)) => value.clone(),
            (Self::Integer, Value::Number(n)) => {
                let whole = n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0);
                if !whole {
                    issues.push(issue(path, format!("expected integer, received {n}")));
                }
                value.clone()
            }
            (Self::Enum(allowed), Value::String(s)) => {
                if !allowed.iter().any(|a| a == s) {
                    issues.push(issue(
                        path,
                        format!("expected one of [{}], received \"{s}\"", allowed.join(", ")),
                    ));
                }
                value.clone()
            }
            (Self::Array(item), Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| item.check(v, &format!("{path}[{i}]"), issues))
                    .collect(),
            ),
            (Self::Object(schema), Value::Object(_)) => schema.check(value, path, issues),
            (expected, other) => {
                issues.push(issue(
                    path,
                    format!("expected {}, received {}", expected.name(), json_type(other)),
                ));
                value.clone()
            }
        }
    }
}

/// A named property of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldType,
    pub description: Option<String>,
    pub required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A mapping of named fields to types.
///
/// Keys not declared here are stripped from validated input rather than
/// rejected. An explicit `null` is never accepted, even for optional fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    fields: Vec<Field>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// First field name declared more than once, if any.
    pub(crate) fn duplicate_field(&self) -> Option<&str> {
        self.fields.iter().enumerate().find_map(|(i, f)| {
            self.fields[..i]
                .iter()
                .any(|prev| prev.name == f.name)
                .then_some(f.name.as_str())
        })
    }

    /// Validate `value` and return the cleaned object on success.
    pub fn validate(&self, value: &Value) -> Result<Map<String, Value>, ValidationError> {
        let mut issues = Vec::new();
        let cleaned = self.check(value, "", &mut issues);
        match cleaned {
            Value::Object(map) if issues.is_empty() => Ok(map),
            _ => Err(ValidationError { issues }),
        }
    }

    fn check(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Value {
        let Value::Object(input) = value else {
            issues.push(issue(
                path,
                format!("expected object, received {}", json_type(value)),
            ));
            return value.clone();
        };

        let mut out = Map::new();
        for field in &self.fields {
            let field_path = if path.is_empty() {
                field.name.clone()
            } else {
                format!("{path}.{}", field.name)
            };
            match input.get(&field.name) {
                None if field.required => issues.push(issue(&field_path, "required")),
                None => {}
                Some(v) => {
                    out.insert(field.name.clone(), field.kind.check(v, &field_path, issues));
                }
            }
        }
        Value::Object(out)
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = field.kind.to_json_schema();
            if let Some(ref desc) = field.description {
                prop["description"] = Value::String(desc.clone());
            }
            properties.insert(field.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }
}

fn issue(path: &str, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        path: path.to_string(),
        message: message.into(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
