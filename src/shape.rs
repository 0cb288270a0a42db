use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<FieldType>),
    Object(TargetShape),
}

impl FieldType {
    pub fn array_of(item: FieldType) -> Self {
        FieldType::Array(Box::new(item))
    }

    fn describe(&self) -> Value {
        match self {
            FieldType::Any => json!("any"),
            FieldType::String => json!("string"),
            FieldType::Number => json!("number"),
            FieldType::Integer => json!("integer"),
            FieldType::Boolean => json!("boolean"),
            FieldType::Array(item) => json!([item.describe()]),
            FieldType::Object(shape) => shape.describe(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array(_) => "array",
            FieldType::Object(_) => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetShape {
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeViolation {
    pub path: String,
    pub reason: String,
}

impl std::fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

impl TargetShape {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    pub fn describe(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            let key = if field.required {
                field.name.clone()
            } else {
                format!("{}?", field.name)
            };
            map.insert(key, field.field_type.describe());
        }
        Value::Object(map)
    }

    pub fn validate(&self, value: Value) -> Result<Value, ShapeViolation> {
        self.check_object(&value, "$")?;
        Ok(value)
    }

    fn check_object(&self, value: &Value, path: &str) -> Result<(), ShapeViolation> {
        let object = value.as_object().ok_or_else(|| ShapeViolation {
            path: path.to_string(),
            reason: format!("expected object, found {}", json_type(value)),
        })?;

        for field in &self.fields {
            let field_path = format!("{path}.{}", field.name);
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(ShapeViolation {
                        path: field_path,
                        reason: "required field is missing".into(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(inner) => check_field(&field.field_type, inner, &field_path)?,
            }
        }
        Ok(())
    }
}

fn check_field(expected: &FieldType, value: &Value, path: &str) -> Result<(), ShapeViolation> {
    let matches = match expected {
        FieldType::Any => true,
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Array(item) => {
            let Some(items) = value.as_array() else {
                return Err(type_mismatch(expected, value, path));
            };
            for (index, entry) in items.iter().enumerate() {
                check_field(item, entry, &format!("{path}[{index}]"))?;
            }
            true
        }
        FieldType::Object(shape) => return shape.check_object(value, path),
    };

    if matches {
        Ok(())
    } else {
        Err(type_mismatch(expected, value, path))
    }
}

fn type_mismatch(expected: &FieldType, value: &Value, path: &str) -> ShapeViolation {
    ShapeViolation {
        path: path.to_string(),
        reason: format!("expected {}, found {}", expected.label(), json_type(value)),
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
