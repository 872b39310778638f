//! Input schema generation and argument validation.
//!
//! Tool parameter structs derive `JsonSchema`; the advertised schema is
//! generated with every subschema inlined so `default`, `enum` and
//! `description` sit directly on each property. The same schema drives the
//! single validation pass the dispatcher runs before any handler.

use std::sync::Arc;

use rmcp::model::JsonObject;
use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ToolError;

/// Generate the input schema of a parameter struct.
pub fn schema_for_params<T: JsonSchema>() -> Arc<JsonObject> {
    let generator = SchemaSettings::draft2020_12()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();

    let mut object = match schema.to_value() {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    object.remove("$schema");
    object
        .entry("type")
        .or_insert_with(|| Value::String("object".to_string()));
    object
        .entry("properties")
        .or_insert_with(|| Value::Object(JsonObject::new()));

    Arc::new(object)
}

/// Attach sample values to one property of a generated schema.
pub fn with_examples(mut schema: Arc<JsonObject>, property: &str, examples: &[&str]) -> Arc<JsonObject> {
    let object = Arc::make_mut(&mut schema);
    if let Some(Value::Object(prop)) = object
        .get_mut("properties")
        .and_then(|p| p.get_mut(property))
    {
        prop.insert(
            "examples".to_string(),
            Value::Array(examples.iter().map(|e| Value::String(e.to_string())).collect()),
        );
    }
    schema
}

/// Validate `arguments` against `schema` and fill in declared defaults.
///
/// Checks, in order: the payload is an object, every required property is
/// present and not a blank string, each present property has the declared
/// JSON type and (when listed) one of the allowed values. Absent optional
/// properties then receive their `default`.
pub fn validate_arguments(schema: &JsonObject, arguments: Value) -> Result<JsonObject, ToolError> {
    let mut args = match arguments {
        Value::Object(map) => map,
        Value::Null => JsonObject::new(),
        other => {
            return Err(ToolError::invalid_arguments(format!(
                "arguments must be an object, got {}",
                json_type_name(&other)
            )));
        }
    };

    let empty = JsonObject::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| matches!(args.get(*name), None | Some(Value::Null)))
        .collect();
    if !missing.is_empty() {
        return Err(ToolError::invalid_arguments(format!(
            "missing required argument(s): {}",
            missing.join(", ")
        )));
    }

    for name in &required {
        if let Some(Value::String(s)) = args.get(*name) {
            if s.trim().is_empty() {
                return Err(ToolError::invalid_arguments(format!(
                    "'{}' cannot be empty",
                    name
                )));
            }
        }
    }

    for (name, value) in &args {
        let Some(prop) = properties.get(name).and_then(Value::as_object) else {
            continue;
        };
        check_type(name, prop, value)?;
        check_allowed(name, prop, value)?;
    }

    for (name, prop) in properties {
        if args.contains_key(name) {
            continue;
        }
        if let Some(default) = prop.get("default") {
            args.insert(name.clone(), default.clone());
        }
    }

    Ok(args)
}

/// Deserialize validated arguments into a parameter struct.
pub fn parse_params<T: DeserializeOwned>(arguments: JsonObject) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ToolError::invalid_arguments(e.to_string()))
}

fn check_type(name: &str, prop: &JsonObject, value: &Value) -> Result<(), ToolError> {
    let accepted: Vec<&str> = match prop.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };

    if accepted.iter().any(|t| matches_type(t, value)) {
        Ok(())
    } else {
        Err(ToolError::invalid_arguments(format!(
            "'{}' must be of type {}, got {}",
            name,
            accepted.join(" or "),
            json_type_name(value)
        )))
    }
}

fn check_allowed(name: &str, prop: &JsonObject, value: &Value) -> Result<(), ToolError> {
    if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(ToolError::invalid_arguments(format!(
                "'{}' must be one of {}",
                name,
                options.join(", ")
            )));
        }
    }
    if let Some(constant) = prop.get("const") {
        if constant != value {
            return Err(ToolError::invalid_arguments(format!(
                "'{}' must be {}",
                name, constant
            )));
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    fn schema() -> JsonObject {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" },
                "style": { "type": "string", "enum": ["auto", "anime"], "default": "auto" },
                "expand": { "type": "boolean", "default": true },
                "sizes": { "type": "array", "default": [[32, 32]] },
                "model": { "type": "string", "const": "fal-ai/ideogram/v2" }
            },
            "required": ["prompt"]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_fills_defaults_for_absent_optionals() {
        let args = validate_arguments(&schema(), json!({ "prompt": "a fox" })).unwrap();
        assert_eq!(args["style"], "auto");
        assert_eq!(args["expand"], true);
        assert_eq!(args["sizes"], json!([[32, 32]]));
        assert!(!args.contains_key("model"));
    }

    #[test]
    fn test_keeps_caller_values() {
        let args =
            validate_arguments(&schema(), json!({ "prompt": "a fox", "style": "anime" })).unwrap();
        assert_eq!(args["style"], "anime");
    }

    #[test]
    fn test_missing_required_is_rejected() {
        let err = validate_arguments(&schema(), json!({ "style": "auto" })).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().contains("prompt"));
    }

    #[test]
    fn test_null_arguments_behave_like_empty_object() {
        let err = validate_arguments(&schema(), Value::Null).unwrap_err();
        assert!(err.to_string().contains("prompt"));
    }

    #[test]
    fn test_blank_required_string_is_rejected() {
        let err = validate_arguments(&schema(), json!({ "prompt": "   " })).unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err =
            validate_arguments(&schema(), json!({ "prompt": "a", "expand": "yes" })).unwrap_err();
        assert!(err.to_string().contains("boolean"));
    }

    #[test]
    fn test_value_outside_enum_is_rejected() {
        let err =
            validate_arguments(&schema(), json!({ "prompt": "a", "style": "cubism" })).unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn test_const_mismatch_is_rejected() {
        let err = validate_arguments(&schema(), json!({ "prompt": "a", "model": "other" }))
            .unwrap_err();
        assert!(err.to_string().contains("fal-ai/ideogram/v2"));
    }

    #[test]
    fn test_non_object_arguments_are_rejected() {
        let err = validate_arguments(&schema(), json!(["a"])).unwrap_err();
        assert!(err.to_string().contains("object"));
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct SampleParams {
        /// Name to greet.
        name: String,
        /// How many times.
        #[serde(default = "default_times")]
        times: u32,
    }

    fn default_times() -> u32 {
        2
    }

    #[test]
    fn test_generated_schema_drives_validation() {
        let schema = schema_for_params::<SampleParams>();
        assert_eq!(schema["type"], "object");
        assert!(!schema.contains_key("$schema"));

        let required = schema["required"].as_array().unwrap();
        assert_eq!(required, &vec![json!("name")]);
        assert_eq!(schema["properties"]["times"]["default"], 2);

        let args = validate_arguments(&schema, json!({ "name": "fal" })).unwrap();
        let params: SampleParams = parse_params(args).unwrap();
        assert_eq!(params.name, "fal");
        assert_eq!(params.times, 2);
    }

    #[test]
    fn test_examples_attach_to_property() {
        let schema = with_examples(schema_for_params::<SampleParams>(), "name", &["world"]);
        assert_eq!(schema["properties"]["name"]["examples"], json!(["world"]));
    }
}
