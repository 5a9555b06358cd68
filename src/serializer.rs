//! Output serialization.
//!
//! Both output styles (the route document and the OpenAPI document) go through the same
//! functions: any `Serialize` value can be written as YAML or pretty JSON, to a file or stdout.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Serializes a document to YAML.
///
/// # Example
///
/// ```
/// use route_surface::document::RouteDocument;
/// use route_surface::serializer::serialize_yaml;
///
/// let doc = RouteDocument { framework: "axum".to_string(), routes: Vec::new() };
/// let yaml = serialize_yaml(&doc).unwrap();
/// assert!(yaml.contains("framework: axum"));
/// ```
pub fn serialize_yaml<T: Serialize>(doc: &T) -> Result<String> {
    debug!("Serializing document to YAML");
    serde_yaml::to_string(doc).context("Failed to serialize document to YAML")
}

/// Serializes a document to indented JSON.
pub fn serialize_json<T: Serialize>(doc: &T) -> Result<String> {
    debug!("Serializing document to JSON");
    serde_json::to_string_pretty(doc).context("Failed to serialize document to JSON")
}

/// Serializes a document in the requested format.
///
/// # Arguments
///
/// * `doc` - Route document or OpenAPI document
/// * `format` - YAML or JSON
pub fn serialize<T: Serialize>(doc: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serialize_yaml(doc),
        OutputFormat::Json => serialize_json(doc),
    }
}

/// Writes `content` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Fails when a parent directory cannot be created or the file cannot be written.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{HttpMethod, ParamLocation, RequestParamInfo, RouteDocument, RouteRecord};
    use crate::openapi_builder::build_document;
    use crate::schema::{Schema, SchemaKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_document() -> RouteDocument {
        RouteDocument {
            framework: "tide".to_string(),
            routes: vec![RouteRecord {
                method: HttpMethod::Get,
                path: "/api/users/:id".to_string(),
                handler_symbol: None,
                handler_site: None,
                handler: "get_user".to_string(),
                module_name: "crate".to_string(),
                module_path: "crate".to_string(),
                request_params: vec![RequestParamInfo {
                    location: ParamLocation::Path,
                    name: "id".to_string(),
                    schema: Schema::new(SchemaKind::String),
                    required: true,
                    source_method: "param".to_string(),
                }],
                response_schema: Schema::object()
                    .with_property("id", Schema::new(SchemaKind::Integer)),
            }],
        }
    }

    #[test]
    fn test_serialize_route_document_json() {
        let json = serialize_json(&create_test_document()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let route = &value["routes"][0];
        assert_eq!(route["method"], "GET");
        assert_eq!(route["path"], "/api/users/:id");
        assert_eq!(route["handler"], "get_user");
        assert_eq!(route["requestParams"][0]["in"], "path");
        assert_eq!(route["requestParams"][0]["sourceMethod"], "param");
        assert_eq!(route["responseSchema"]["properties"]["id"]["type"], "integer");
        assert_eq!(route["responseSchema"]["properties"]["id"]["jsonKey"], "id");
        // pretty printed
        assert!(json.contains("\n  "));
    }

    #[test]
    fn test_serialize_yaml_styles() {
        let doc = create_test_document();
        let yaml = serialize(&doc, OutputFormat::Yaml).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["framework"], serde_yaml::Value::from("tide"));

        let openapi = serialize(&build_document(&doc.routes), OutputFormat::Yaml).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&openapi).unwrap();
        assert_eq!(value["openapi"], serde_yaml::Value::from("3.0.0"));
        assert!(value["paths"]["/api/users/{id}"]["get"].is_mapping());
    }

    #[test]
    fn test_write_to_file_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out/docs/routes.json");

        write_to_file("{}", &path).unwrap();
        write_to_file("{\"routes\": []}", &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"routes\": []}");
    }
}
