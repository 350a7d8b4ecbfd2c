//! JSON schema validators for memreport DTOs.
//!
//! Schemas are generated from the `schemars` derives at call time, so they
//! always match the types the workspace is built with. `xtask schema` writes
//! the same schemas to `schemas/`.

use jsonschema::JSONSchema;
use memreport_types::{ConfigFile, IngestReceipt};

/// Error type for schema validation failures.
#[derive(Debug)]
pub struct SchemaValidationError {
    /// The validation errors.
    pub errors: Vec<String>,
}

impl std::fmt::Display for SchemaValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Schema validation failed: {}", self.errors.join("; "))
    }
}

impl std::error::Error for SchemaValidationError {}

fn compile(schema: schemars::schema::RootSchema) -> JSONSchema {
    let schema = serde_json::to_value(schema).expect("schema should serialize to JSON");
    JSONSchema::compile(&schema).expect("schema should compile")
}

pub fn load_config_schema() -> JSONSchema {
    compile(schemars::schema_for!(ConfigFile))
}

pub fn load_ingest_schema() -> JSONSchema {
    compile(schemars::schema_for!(IngestReceipt))
}

/// Validate a ConfigFile against its JSON schema.
pub fn validate_config_file(config: &ConfigFile) -> Result<(), SchemaValidationError> {
    let json = serde_json::to_value(config).expect("ConfigFile should serialize to JSON");
    validate_with_schema(&load_config_schema(), &json)
}

/// Validate an IngestReceipt against its JSON schema.
pub fn validate_ingest_receipt(receipt: &IngestReceipt) -> Result<(), SchemaValidationError> {
    let json = serde_json::to_value(receipt).expect("IngestReceipt should serialize to JSON");
    validate_with_schema(&load_ingest_schema(), &json)
}

/// Validate any JSON value against the IngestReceipt schema.
///
/// Used for receipts read back from disk by CLI tests.
pub fn validate_ingest_json(json: &serde_json::Value) -> Result<(), SchemaValidationError> {
    validate_with_schema(&load_ingest_schema(), json)
}

fn validate_with_schema(
    schema: &JSONSchema,
    json: &serde_json::Value,
) -> Result<(), SchemaValidationError> {
    schema.validate(json).map_err(|errors| SchemaValidationError {
        errors: errors.map(|e| e.to_string()).collect(),
    })
}

/// Check if a string is in snake_case format.
pub fn is_snake_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Recursively collect all object keys from a JSON value.
pub fn collect_field_names(value: &serde_json::Value) -> Vec<String> {
    let mut names = Vec::new();
    collect_field_names_recursive(value, &mut names);
    names
}

fn collect_field_names_recursive(value: &serde_json::Value, names: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                names.push(key.clone());
                collect_field_names_recursive(val, names);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_field_names_recursive(item, names);
            }
        }
        _ => {}
    }
}
