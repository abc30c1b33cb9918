//! # Resource Schemas
//!
//! A [`Schema`] is a named JSON Schema object describing one resource's record shape.
//! It is the only thing the binder knows about resource data:
//!
//! - **load** turns a request body (or query string) into validated fields, reporting
//!   every failing field at once
//! - **dump** projects a record (or a list of records) onto the declared properties
//! - the raw definition is emitted verbatim into `components.schemas`
//!
//! `readOnly` properties are output-only and rejected on input. `writeOnly` properties
//! are input-only and never dumped. Partial loads (PATCH) treat every property as
//! optional and never fill defaults.
//!
//! ```rust
//! use crudrouter::schema::{InputLocation, Schema};
//! use crudrouter::capability::InputMode;
//! use serde_json::json;
//!
//! let schema = Schema::new("Cat", json!({
//!     "type": "object",
//!     "properties": {
//!         "id": {"type": "integer", "readOnly": true},
//!         "name": {"type": "string"}
//!     },
//!     "required": ["name"]
//! })).unwrap();
//!
//! let body = json!({"name": "Simba"});
//! let fields = schema
//!     .load(body.as_object().unwrap(), InputMode::Full, InputLocation::Json)
//!     .unwrap();
//! assert_eq!(fields["name"], "Simba");
//! ```

use crate::capability::InputMode;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Parsed and validated input fields handed to a capability method.
pub type Fields = Map<String, Value>;

const MISSING_FIELD: &str = "Missing data for required field.";
const UNKNOWN_FIELD: &str = "Unknown field.";

/// Where the rejected input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLocation {
    Json,
    Form,
    Query,
}

impl InputLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            InputLocation::Json => "json",
            InputLocation::Form => "form",
            InputLocation::Query => "query",
        }
    }
}

/// Input that failed schema validation, with messages per field.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub location: InputLocation,
    pub messages: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Shape used in 422 response bodies: `{"<location>": {"<field>": [..]}}`.
    pub fn to_json(&self) -> Value {
        let mut fields = Map::new();
        for (field, messages) in &self.messages {
            fields.insert(field.clone(), Value::from(messages.clone()));
        }
        let mut out = Map::new();
        out.insert(self.location.as_str().to_string(), Value::Object(fields));
        Value::Object(out)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} input:", self.location.as_str())?;
        for (field, messages) in &self.messages {
            write!(f, " {field}: {};", messages.join(" "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Problems with a schema definition itself, raised at registration.
#[derive(Debug)]
pub enum SchemaError {
    NotAnObject { schema: String },
    InvalidProperty {
        schema: String,
        property: String,
        reason: String,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::NotAnObject { schema } => write!(
                f,
                "schema '{schema}' must be a JSON Schema object with a 'properties' map"
            ),
            SchemaError::InvalidProperty {
                schema,
                property,
                reason,
            } => write!(f, "schema '{schema}' property '{property}' is invalid: {reason}"),
        }
    }
}

impl std::error::Error for SchemaError {}

struct Property {
    name: String,
    definition: Value,
    validator: jsonschema::Validator,
    read_only: bool,
    write_only: bool,
}

struct SchemaInner {
    name: String,
    definition: Value,
    properties: Vec<Property>,
    required: Vec<String>,
}

/// Named resource schema. Cheap to clone.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.inner.name)
            .field(
                "properties",
                &self
                    .inner
                    .properties
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Schema {
    /// Compile a schema from a JSON Schema object definition.
    pub fn new(name: impl Into<String>, definition: Value) -> Result<Self, SchemaError> {
        let name = name.into();
        let props = definition
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaError::NotAnObject {
                schema: name.clone(),
            })?;

        let mut properties = Vec::with_capacity(props.len());
        for (prop_name, prop_def) in props {
            let validator =
                jsonschema::validator_for(prop_def).map_err(|e| SchemaError::InvalidProperty {
                    schema: name.clone(),
                    property: prop_name.clone(),
                    reason: e.to_string(),
                })?;
            properties.push(Property {
                name: prop_name.clone(),
                definition: prop_def.clone(),
                validator,
                read_only: flag(prop_def, "readOnly"),
                write_only: flag(prop_def, "writeOnly"),
            });
        }

        let required = definition
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            inner: Arc::new(SchemaInner {
                name,
                definition,
                properties,
                required,
            }),
        })
    }

    /// Component name used for `#/components/schemas/<name>`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn definition(&self) -> &Value {
        &self.inner.definition
    }

    /// The definition with `required` removed, documenting PATCH bodies.
    pub fn partial_definition(&self) -> Value {
        let mut def = self.inner.definition.clone();
        if let Some(obj) = def.as_object_mut() {
            obj.remove("required");
        }
        def
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.inner.properties.iter().map(|p| p.name.as_str())
    }

    /// `(name, definition, required)` for each input property, used to document query
    /// arguments.
    pub fn input_properties(&self) -> impl Iterator<Item = (&str, &Value, bool)> {
        self.inner
            .properties
            .iter()
            .filter(|p| !p.read_only)
            .map(|p| (p.name.as_str(), &p.definition, self.is_required(&p.name)))
    }

    fn is_required(&self, name: &str) -> bool {
        self.inner.required.iter().any(|r| r == name)
    }

    fn property(&self, name: &str) -> Option<&Property> {
        self.inner.properties.iter().find(|p| p.name == name)
    }

    /// Validate input fields.
    ///
    /// Unknown and read-only keys are rejected. In [`InputMode::Full`] missing required
    /// properties are rejected and absent properties with a `default` are filled.
    pub fn load(
        &self,
        input: &Map<String, Value>,
        mode: InputMode,
        location: InputLocation,
    ) -> Result<Fields, ValidationError> {
        self.load_inner(input, mode, location, true)
    }

    /// Validate query arguments. Keys the schema does not declare are ignored.
    pub fn load_query(&self, input: &Map<String, Value>) -> Result<Fields, ValidationError> {
        self.load_inner(input, InputMode::Full, InputLocation::Query, false)
    }

    fn load_inner(
        &self,
        input: &Map<String, Value>,
        mode: InputMode,
        location: InputLocation,
        reject_unknown: bool,
    ) -> Result<Fields, ValidationError> {
        let mut messages: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut fields = Fields::new();

        for (key, value) in input {
            match self.property(key) {
                Some(prop) if !prop.read_only => {
                    let errors: Vec<String> = prop
                        .validator
                        .iter_errors(value)
                        .map(|e| e.to_string())
                        .collect();
                    if errors.is_empty() {
                        fields.insert(key.clone(), value.clone());
                    } else {
                        messages.insert(key.clone(), errors);
                    }
                }
                _ if reject_unknown => {
                    messages.insert(key.clone(), vec![UNKNOWN_FIELD.to_string()]);
                }
                _ => {}
            }
        }

        if mode == InputMode::Full {
            for prop in self.inner.properties.iter().filter(|p| !p.read_only) {
                if input.contains_key(&prop.name) {
                    continue;
                }
                if let Some(default) = prop.definition.get("default") {
                    fields.insert(prop.name.clone(), default.clone());
                } else if self.is_required(&prop.name) {
                    messages.insert(prop.name.clone(), vec![MISSING_FIELD.to_string()]);
                }
            }
        }

        if messages.is_empty() {
            Ok(fields)
        } else {
            Err(ValidationError { location, messages })
        }
    }

    /// Serialize resource output.
    ///
    /// With `many` the result is always an array (a `null` result is empty). Without it
    /// the result is always a single object.
    pub fn dump(&self, data: &Value, many: bool) -> Value {
        if many {
            match data {
                Value::Array(items) => Value::Array(items.iter().map(|i| self.project(i)).collect()),
                Value::Null => Value::Array(Vec::new()),
                other => Value::Array(vec![self.project(other)]),
            }
        } else {
            self.project(data)
        }
    }

    fn project(&self, record: &Value) -> Value {
        let mut out = Map::new();
        if let Value::Object(obj) = record {
            for prop in self.inner.properties.iter().filter(|p| !p.write_only) {
                if let Some(value) = obj.get(&prop.name) {
                    out.insert(prop.name.clone(), value.clone());
                }
            }
        }
        Value::Object(out)
    }

    /// Turn string pairs (form body or query string) into typed JSON values using the
    /// declared property types. Repeated keys collect into arrays for array properties;
    /// otherwise the last value wins.
    pub fn coerce_pairs<'a, I>(&self, pairs: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = Map::new();
        for (key, raw) in pairs {
            let prop = self.property(key).map(|p| &p.definition);
            let decoded = coerce_value(raw, prop);
            let is_array = prop.and_then(|p| p.get("type")).and_then(Value::as_str) == Some("array");
            if is_array {
                if let (Some(Value::Array(existing)), Value::Array(more)) =
                    (out.get_mut(key), &decoded)
                {
                    existing.extend(more.iter().cloned());
                    continue;
                }
            }
            out.insert(key.to_string(), decoded);
        }
        out
    }
}

fn flag(def: &Value, key: &str) -> bool {
    def.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Decode a string value according to a property schema.
///
/// Values that do not parse as the declared type are kept as strings so validation
/// reports them against the field.
pub fn coerce_value(value: &str, schema: Option<&Value>) -> Value {
    fn convert_primitive(val: &str, schema: Option<&Value>) -> Value {
        match schema.and_then(|s| s.get("type")).and_then(Value::as_str) {
            Some("integer") => val
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(val.to_string())),
            Some("number") => val
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(val.to_string())),
            Some("boolean") => val
                .parse::<bool>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(val.to_string())),
            _ => Value::String(val.to_string()),
        }
    }

    match schema.and_then(|s| s.get("type")).and_then(Value::as_str) {
        Some("array") => {
            let items_schema = schema.and_then(|s| s.get("items"));
            Value::Array(
                value
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|p| convert_primitive(p.trim(), items_schema))
                    .collect(),
            )
        }
        Some("object") => {
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
        }
        _ => convert_primitive(value, schema),
    }
}
