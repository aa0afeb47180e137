//! Recursive OpenAPI-subset schema used for function parameters and
//! response constraints, plus conversions from and to JSON Schema.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, invalid_argument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    #[serde(alias = "string")]
    String,
    #[serde(alias = "number")]
    Number,
    #[serde(alias = "integer")]
    Integer,
    #[serde(alias = "boolean")]
    Boolean,
    #[serde(alias = "array")]
    Array,
    #[serde(alias = "object")]
    Object,
}

impl Type {
    fn from_json_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Type::String),
            "number" => Some(Type::Number),
            "integer" => Some(Type::Integer),
            "boolean" => Some(Type::Boolean),
            "array" => Some(Type::Array),
            "object" => Some(Type::Object),
            _ => None,
        }
    }
}

/// Schema that defines the format of input and output data.
///
/// Ownership is strictly tree-shaped; recursive JSON Schema documents are
/// rejected by [`Schema::from_json_schema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_ordering: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Schema {
    pub fn of(schema_type: Type) -> Self {
        Self { schema_type: Some(schema_type), ..Default::default() }
    }

    pub fn array(items: Schema) -> Self {
        Self { schema_type: Some(Type::Array), items: Some(Box::new(items)), ..Default::default() }
    }

    pub fn object(properties: impl IntoIterator<Item = (String, Schema)>) -> Self {
        let properties: BTreeMap<_, _> = properties.into_iter().collect();
        Self { schema_type: Some(Type::Object), properties: Some(properties), ..Default::default() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_required(mut self, required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required = Some(required.into_iter().map(Into::into).collect());
        self
    }

    /// Derives a schema from a Rust type through `schemars`.
    pub fn for_type<T: JsonSchema>() -> Result<Self, Error> {
        let root = schemars::schema_for!(T);
        let value = serde_json::to_value(&root)
            .map_err(|e| invalid_argument(format!("failed to render JSON schema: {e}")))?;
        Self::from_json_schema(&value)
    }

    /// Converts a JSON Schema document, inlining `$ref`s from `$defs` /
    /// `definitions`. A reference cycle is an [`Error::InvalidArgument`].
    pub fn from_json_schema(document: &Value) -> Result<Self, Error> {
        let empty = Map::new();
        let defs = document
            .get("$defs")
            .or_else(|| document.get("definitions"))
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let mut stack = Vec::new();
        convert(document, defs, &mut stack)
    }

    /// Renders this schema as a JSON Schema document for validators.
    pub fn to_json_schema(&self) -> Value {
        let mut out = Map::new();
        let type_name = self.schema_type.map(|t| t.to_string());
        match (type_name, self.nullable) {
            (Some(name), Some(true)) => {
                out.insert("type".into(), json!([name, "null"]));
            }
            (Some(name), _) => {
                out.insert("type".into(), json!(name));
            }
            (None, _) => {}
        }
        if let Some(values) = &self.enum_values {
            let typed = matches!(self.schema_type, Some(Type::Integer | Type::Number | Type::Boolean));
            let mut values: Vec<Value> = values
                .iter()
                .map(|v| if typed { serde_json::from_str(v).unwrap_or_else(|_| json!(v)) } else { json!(v) })
                .collect();
            if self.nullable == Some(true) {
                values.push(Value::Null);
            }
            out.insert("enum".into(), Value::Array(values));
        }
        if let Some(items) = &self.items {
            out.insert("items".into(), items.to_json_schema());
        }
        if let Some(properties) = &self.properties {
            let rendered: Map<String, Value> =
                properties.iter().map(|(k, v)| (k.clone(), v.to_json_schema())).collect();
            out.insert("properties".into(), Value::Object(rendered));
        }
        if let Some(required) = &self.required {
            out.insert("required".into(), json!(required));
        }
        if let Some(any_of) = &self.any_of {
            out.insert(
                "anyOf".into(),
                Value::Array(any_of.iter().map(Schema::to_json_schema).collect()),
            );
        }
        let numeric = [
            ("minimum", self.minimum.map(|v| json!(v))),
            ("maximum", self.maximum.map(|v| json!(v))),
            ("minItems", self.min_items.map(|v| json!(v))),
            ("maxItems", self.max_items.map(|v| json!(v))),
            ("minLength", self.min_length.map(|v| json!(v))),
            ("maxLength", self.max_length.map(|v| json!(v))),
            ("pattern", self.pattern.as_ref().map(|v| json!(v))),
        ];
        for (key, value) in numeric {
            if let Some(value) = value {
                out.insert(key.into(), value);
            }
        }
        Value::Object(out)
    }

    /// Depth-first visit of this schema and every nested schema, with the
    /// property path that leads to it.
    pub(crate) fn walk<'a>(&'a self, path: &mut Vec<String>, visit: &mut dyn FnMut(&[String], &'a Schema) -> Result<(), Error>) -> Result<(), Error> {
        visit(path, self)?;
        if let Some(properties) = &self.properties {
            for (name, child) in properties {
                path.push(name.clone());
                child.walk(path, visit)?;
                path.pop();
            }
        }
        if let Some(items) = &self.items {
            items.walk(path, visit)?;
        }
        if let Some(any_of) = &self.any_of {
            for child in any_of {
                child.walk(path, visit)?;
            }
        }
        Ok(())
    }
}

fn resolve_ref<'a>(reference: &str, defs: &'a Map<String, Value>) -> Result<(&'a Value, String), Error> {
    let name = reference
        .strip_prefix("#/$defs/")
        .or_else(|| reference.strip_prefix("#/definitions/"))
        .ok_or_else(|| invalid_argument(format!("unsupported schema reference '{reference}'")))?;
    let target = defs
        .get(name)
        .ok_or_else(|| invalid_argument(format!("unresolved schema reference '{reference}'")))?;
    Ok((target, name.to_string()))
}

fn is_null_schema(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("null")
}

fn convert(node: &Value, defs: &Map<String, Value>, stack: &mut Vec<String>) -> Result<Schema, Error> {
    let object = match node {
        Value::Object(object) => object,
        Value::Bool(true) => return Ok(Schema::default()),
        other => return Err(invalid_argument(format!("unsupported schema node: {other}"))),
    };

    if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
        let (target, name) = resolve_ref(reference, defs)?;
        if stack.contains(&name) {
            return Err(invalid_argument(format!(
                "cyclic schema: '{name}' references itself through [{}]",
                stack.join(" -> ")
            )));
        }
        stack.push(name);
        let mut schema = convert(target, defs, stack)?;
        stack.pop();
        if let Some(description) = object.get("description").and_then(Value::as_str) {
            schema.description = Some(description.to_string());
        }
        return Ok(schema);
    }

    if let Some(Value::Array(all_of)) = object.get("allOf") {
        if let [single] = all_of.as_slice() {
            let mut schema = convert(single, defs, stack)?;
            if let Some(description) = object.get("description").and_then(Value::as_str) {
                schema.description = Some(description.to_string());
            }
            return Ok(schema);
        }
    }

    let mut schema = Schema::default();

    match object.get("type") {
        Some(Value::String(name)) if name == "null" => schema.nullable = Some(true),
        Some(Value::String(name)) => schema.schema_type = Type::from_json_name(name),
        Some(Value::Array(names)) => {
            let mut concrete = names.iter().filter_map(Value::as_str).filter(|n| *n != "null");
            schema.schema_type = concrete.next().and_then(Type::from_json_name);
            if names.iter().any(|n| n.as_str() == Some("null")) {
                schema.nullable = Some(true);
            }
        }
        _ => {}
    }

    let union = object.get("anyOf").or_else(|| object.get("oneOf")).and_then(Value::as_array);
    if let Some(variants) = union {
        let non_null: Vec<&Value> = variants.iter().filter(|v| !is_null_schema(v)).collect();
        let has_null = non_null.len() != variants.len();
        if let ([only], true) = (non_null.as_slice(), has_null) {
            let mut inner = convert(only, defs, stack)?;
            inner.nullable = Some(true);
            if let Some(description) = object.get("description").and_then(Value::as_str) {
                inner.description = Some(description.to_string());
            }
            return Ok(inner);
        }
        let converted = non_null
            .into_iter()
            .map(|v| convert(v, defs, stack))
            .collect::<Result<Vec<_>, _>>()?;
        schema.any_of = Some(converted);
        if has_null {
            schema.nullable = Some(true);
        }
    }

    let string_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    schema.format = string_field("format");
    schema.title = string_field("title");
    schema.description = string_field("description");
    schema.pattern = string_field("pattern");
    schema.default = object.get("default").cloned();
    schema.example = object
        .get("example")
        .cloned()
        .or_else(|| object.get("examples").and_then(Value::as_array).and_then(|e| e.first().cloned()));
    schema.minimum = object.get("minimum").and_then(Value::as_f64);
    schema.maximum = object.get("maximum").and_then(Value::as_f64);
    schema.min_items = object.get("minItems").and_then(Value::as_i64);
    schema.max_items = object.get("maxItems").and_then(Value::as_i64);
    schema.min_length = object.get("minLength").and_then(Value::as_i64);
    schema.max_length = object.get("maxLength").and_then(Value::as_i64);

    let enum_values = object
        .get("enum")
        .and_then(Value::as_array)
        .map(|values| values.as_slice())
        .or_else(|| object.get("const").map(std::slice::from_ref));
    if let Some(values) = enum_values {
        let mut rendered = Vec::new();
        for value in values {
            match value {
                Value::String(s) => rendered.push(s.clone()),
                Value::Null => schema.nullable = Some(true),
                other => {
                    let inferred = match other {
                        Value::Bool(_) => Type::Boolean,
                        Value::Number(n) if n.is_f64() => Type::Number,
                        Value::Number(_) => Type::Integer,
                        _ => return Err(invalid_argument(format!("unsupported enum value: {other}"))),
                    };
                    schema.schema_type.get_or_insert(inferred);
                    rendered.push(other.to_string());
                }
            }
        }
        schema.enum_values = Some(rendered);
        schema.schema_type.get_or_insert(Type::String);
    }

    if let Some(properties) = object.get("properties").and_then(Value::as_object) {
        let mut converted = BTreeMap::new();
        let mut ordering = Vec::with_capacity(properties.len());
        for (name, child) in properties {
            converted.insert(name.clone(), convert(child, defs, stack)?);
            ordering.push(name.clone());
        }
        schema.properties = Some(converted);
        if ordering.len() > 1 {
            schema.property_ordering = Some(ordering);
        }
        schema.schema_type.get_or_insert(Type::Object);
    }

    if let Some(required) = object.get("required").and_then(Value::as_array) {
        schema.required = Some(required.iter().filter_map(Value::as_str).map(str::to_string).collect());
    }

    if let Some(items) = object.get("items") {
        schema.items = Some(Box::new(convert(items, defs, stack)?));
        schema.schema_type.get_or_insert(Type::Array);
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Recipe {
        /// Name of the dish
        name: String,
        servings: Option<u32>,
        ingredients: Vec<Ingredient>,
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Ingredient {
        item: String,
        grams: f64,
    }

    #[test]
    fn derives_nested_schema_from_rust_type() {
        let schema = Schema::for_type::<Recipe>().unwrap();
        assert_eq!(schema.schema_type, Some(Type::Object));
        let properties = schema.properties.as_ref().unwrap();
        assert_eq!(properties["name"].schema_type, Some(Type::String));
        assert_eq!(properties["name"].description.as_deref(), Some("Name of the dish"));
        assert_eq!(properties["servings"].nullable, Some(true));
        assert_eq!(properties["servings"].schema_type, Some(Type::Integer));
        let item = properties["ingredients"].items.as_ref().unwrap();
        assert_eq!(item.properties.as_ref().unwrap()["grams"].schema_type, Some(Type::Number));
        let required = schema.required.unwrap();
        assert!(required.contains(&"name".to_string()));
        assert!(!required.contains(&"servings".to_string()));
    }

    #[test]
    fn cyclic_reference_is_rejected() {
        let document = json!({
            "$ref": "#/$defs/Node",
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {"next": {"$ref": "#/$defs/Node"}}
                }
            }
        });
        let err = Schema::from_json_schema(&document).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("cyclic"), "{err}");
    }

    #[test]
    fn shared_non_cyclic_reference_is_inlined_twice() {
        let document = json!({
            "type": "object",
            "properties": {
                "a": {"$ref": "#/$defs/Leaf"},
                "b": {"$ref": "#/$defs/Leaf"}
            },
            "$defs": {"Leaf": {"type": "string"}}
        });
        let schema = Schema::from_json_schema(&document).unwrap();
        let properties = schema.properties.unwrap();
        assert_eq!(properties["a"], Schema::of(Type::String));
        assert_eq!(properties["b"], Schema::of(Type::String));
    }

    #[test]
    fn wire_form_uses_upper_case_types() {
        let schema = Schema::array(Schema::of(Type::Integer));
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({"type": "ARRAY", "items": {"type": "INTEGER"}})
        );
    }

    #[test]
    fn json_schema_rendering_keeps_nullability() {
        let schema = Schema { nullable: Some(true), ..Schema::of(Type::String) };
        assert_eq!(schema.to_json_schema(), json!({"type": ["string", "null"]}));
    }

    #[test]
    fn property_ordering_follows_declaration_order() {
        #[derive(JsonSchema)]
        #[allow(dead_code)]
        struct Step {
            zeta_name: String,
            alpha_minutes: u32,
            middle_note: Option<String>,
        }
        let schema = Schema::for_type::<Step>().unwrap();
        assert_eq!(
            schema.property_ordering,
            Some(vec!["zeta_name".to_string(), "alpha_minutes".to_string(), "middle_note".to_string()])
        );
    }

    #[test]
    fn integer_enums_stay_numeric_when_validating() {
        let schema = Schema::from_json_schema(&json!({"enum": [1, 2, 3]})).unwrap();
        assert_eq!(schema.schema_type, Some(Type::Integer));
        assert_eq!(schema.enum_values, Some(vec!["1".to_string(), "2".to_string(), "3".to_string()]));

        let document = schema.to_json_schema();
        assert_eq!(document["enum"], json!([1, 2, 3]));
        let validator = jsonschema::validator_for(&document).unwrap();
        assert!(validator.is_valid(&json!(2)));
        assert!(!validator.is_valid(&json!(4)));
        assert!(!validator.is_valid(&json!("2")));
    }

    #[test]
    fn structured_enum_values_are_rejected() {
        let err = Schema::from_json_schema(&json!({"enum": [{"a": 1}]})).unwrap_err();
        assert!(err.is_invalid_argument(), "{err}");
    }
}
