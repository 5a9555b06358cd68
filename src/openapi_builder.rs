//! OpenAPI 3.0 export of discovered routes.

use crate::document::{HttpMethod, ParamLocation, RequestParamInfo, RouteRecord};
use crate::schema::{Schema, SchemaKind};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OpenAPI document builder
pub struct OpenApiBuilder {
    info: Info,
    paths: BTreeMap<String, PathItem>,
    /// Named object schemas, by declared type name
    schemas: BTreeMap<String, ApiSchema>,
}

/// OpenAPI Info object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// All operations of one path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    fn slot(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }
}

/// OpenAPI Operation object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: BTreeMap<String, Response>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// `path` or `query`
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: ApiSchema,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: ApiSchema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, MediaType>>,
}

/// OpenAPI Schema object, inlined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiSchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ApiSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ApiSchema>>,
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<Box<ApiSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Schema> for ApiSchema {
    fn from(schema: &Schema) -> Self {
        let schema_type = match schema.kind {
            SchemaKind::String => Some("string"),
            SchemaKind::Integer => Some("integer"),
            SchemaKind::Number => Some("number"),
            SchemaKind::Boolean => Some("boolean"),
            SchemaKind::Object => Some("object"),
            SchemaKind::Array => Some("array"),
            // any value
            SchemaKind::Dynamic | SchemaKind::Unknown => None,
        };

        let mut api = ApiSchema {
            schema_type: schema_type.map(str::to_string),
            title: schema.type_name.clone(),
            items: schema.items.as_deref().map(|items| Box::new(items.into())),
            description: schema.description.clone(),
            ..ApiSchema::default()
        };

        // maps carry their value shape under the `<value>` pseudo-property
        match (schema.property("<key>"), schema.property("<value>")) {
            (Some(_), Some(value)) => api.additional_properties = Some(Box::new(value.into())),
            _ => {
                api.properties = schema
                    .properties
                    .iter()
                    .map(|(key, value)| (key.clone(), value.into()))
                    .collect();
            }
        }
        api
    }
}

/// OpenAPI Components object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Components {
    pub schemas: BTreeMap<String, ApiSchema>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    pub paths: BTreeMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

impl OpenApiBuilder {
    pub fn new() -> Self {
        Self {
            info: Info {
                title: "Generated API".to_string(),
                version: "1.0.0".to_string(),
                description: Some("API surface discovered from Rust source".to_string()),
            },
            paths: BTreeMap::new(),
            schemas: BTreeMap::new(),
        }
    }

    pub fn with_info(mut self, title: String, version: String, description: Option<String>) -> Self {
        self.info = Info {
            title,
            version,
            description,
        };
        self
    }

    /// Adds one route as an operation.
    ///
    /// A later record for the same method and path replaces the earlier operation.
    pub fn add_route(&mut self, route: &RouteRecord) {
        debug!("Adding route: {} {}", route.method, route.path);

        let mut parameters = Vec::new();
        let mut request_body = None;
        for param in &route.request_params {
            match param.location {
                ParamLocation::Path => parameters.push(plain_parameter(param, "path")),
                ParamLocation::Query => parameters.extend(query_parameters(param)),
                ParamLocation::Body => {
                    self.collect_schemas(&param.schema);
                    request_body = Some(RequestBody {
                        required: param.required,
                        content: json_content(&param.schema),
                    })
                }
            }
        }

        self.collect_schemas(&route.response_schema);
        let response = Response {
            description: "Successful response".to_string(),
            content: match route.response_schema.kind {
                SchemaKind::Unknown => None,
                _ => Some(json_content(&route.response_schema)),
            },
        };

        let operation = Operation {
            summary: Some(format!("{} {}", route.method, route.path)),
            operation_id: Some(route.handler.clone()),
            tags: vec![route.module_name.clone()],
            parameters: (!parameters.is_empty()).then_some(parameters),
            request_body,
            responses: BTreeMap::from([("200".to_string(), response)]),
        };

        let path_item = self.paths.entry(convert_path_format(&route.path)).or_default();
        *path_item.slot(route.method) = Some(operation);
    }

    fn collect_schemas(&mut self, schema: &Schema) {
        if schema.kind == SchemaKind::Object {
            if let Some(name) = &schema.type_name {
                self.schemas
                    .entry(name.clone())
                    .or_insert_with(|| schema.into());
            }
        }
        for child in schema.properties.values().chain(schema.items.as_deref()) {
            self.collect_schemas(child);
        }
    }

    pub fn build(self) -> OpenApiDocument {
        debug!("Building OpenAPI document with {} paths", self.paths.len());
        OpenApiDocument {
            openapi: "3.0.0".to_string(),
            info: self.info,
            paths: self.paths,
            components: (!self.schemas.is_empty()).then_some(Components {
                schemas: self.schemas,
            }),
        }
    }
}

impl Default for OpenApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the OpenAPI document of a route list.
pub fn build_document(routes: &[RouteRecord]) -> OpenApiDocument {
    let mut builder = OpenApiBuilder::new();
    for route in routes {
        builder.add_route(route);
    }
    builder.build()
}

fn plain_parameter(param: &RequestParamInfo, location: &str) -> Parameter {
    Parameter {
        name: param.name.clone(),
        location: location.to_string(),
        required: param.required,
        schema: (&param.schema).into(),
    }
}

/// A query structure becomes one parameter per property.
fn query_parameters(param: &RequestParamInfo) -> Vec<Parameter> {
    if param.schema.kind != SchemaKind::Object || param.schema.property("<value>").is_some() {
        return vec![plain_parameter(param, "query")];
    }
    param
        .schema
        .properties
        .iter()
        .map(|(name, schema)| Parameter {
            name: name.clone(),
            location: "query".to_string(),
            required: false,
            schema: schema.into(),
        })
        .collect()
}

fn json_content(schema: &Schema) -> BTreeMap<String, MediaType> {
    BTreeMap::from([(
        "application/json".to_string(),
        MediaType {
            schema: schema.into(),
        },
    )])
}

/// `/users/:id/*rest` and `/users/{id:\d+}` -> `/users/{id}/{rest}`
pub fn convert_path_format(path: &str) -> String {
    path.split('/')
        .map(|part| {
            if let Some(name) = part.strip_prefix(':').or_else(|| part.strip_prefix('*')) {
                format!("{{{}}}", name)
            } else if part.starts_with('{') && part.ends_with('}') {
                let inner = &part[1..part.len() - 1];
                let name = inner.split(':').next().unwrap_or(inner).trim_start_matches('*');
                format!("{{{}}}", name)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
