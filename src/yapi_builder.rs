//! YAPI project export of discovered routes.
//!
//! Routes are grouped into one category per Rust module. Request and response bodies are written
//! as JSON examples, which is what YAPI shows when `*_is_json_schema` is off.

use crate::document::{ParamLocation, RequestParamInfo, RouteRecord};
use crate::openapi_builder::convert_path_format;
use crate::schema::{Schema, SchemaKind};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Complete YAPI project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YapiProject {
    pub info: YapiProjectInfo,
    pub categories: Vec<YapiCategory>,
    pub interfaces: Vec<YapiInterface>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YapiProjectInfo {
    pub name: String,
    pub desc: String,
    pub basepath: String,
    pub project_type: String,
}

/// Interfaces of one Rust module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YapiCategory {
    #[serde(rename = "_id")]
    pub id: usize,
    pub name: String,
    pub desc: String,
    pub index: usize,
}

/// YAPI interface, one per route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YapiInterface {
    #[serde(rename = "_id")]
    pub id: usize,
    pub title: String,
    pub path: String,
    pub method: String,
    pub catid: usize,
    pub status: String,
    pub req_params: Vec<YapiPathParam>,
    pub req_query: Vec<YapiQueryParam>,
    pub req_headers: Vec<YapiHeader>,
    /// `none`, `json`, `form` or `raw`
    pub req_body_type: String,
    pub req_body_form: Vec<YapiFormParam>,
    pub req_body_other: String,
    pub req_body_is_json_schema: bool,
    pub res_body_type: String,
    pub res_body: String,
    pub res_body_is_json_schema: bool,
    pub desc: String,
    pub markdown: String,
    pub tag: Vec<String>,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YapiPathParam {
    pub name: String,
    pub desc: String,
}

/// `required` is `"1"` or `"0"` in YAPI documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YapiQueryParam {
    pub name: String,
    pub desc: String,
    pub required: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YapiHeader {
    pub name: String,
    pub value: String,
    pub required: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YapiFormParam {
    pub name: String,
    /// Always `text`; YAPI only distinguishes text and file fields
    #[serde(rename = "type")]
    pub field_type: String,
    pub desc: String,
    pub required: String,
}

/// YAPI project builder
pub struct YapiBuilder {
    info: YapiProjectInfo,
    /// Categories by module path
    categories: BTreeMap<String, YapiCategory>,
    interfaces: Vec<YapiInterface>,
}

impl YapiBuilder {
    /// # Arguments
    ///
    /// * `project_name` - Name shown for the imported project
    pub fn new(project_name: &str) -> Self {
        Self {
            info: YapiProjectInfo {
                name: project_name.to_string(),
                desc: "API surface discovered from Rust source".to_string(),
                basepath: String::new(),
                project_type: "private".to_string(),
            },
            categories: BTreeMap::new(),
            interfaces: Vec::new(),
        }
    }

    /// Adds one route as an interface, creating its module's category on first use.
    pub fn add_route(&mut self, route: &RouteRecord) {
        debug!("Adding YAPI interface: {} {}", route.method, route.path);

        let next_id = self.categories.len() + 1;
        let catid = self
            .categories
            .entry(route.module_path.clone())
            .or_insert_with(|| YapiCategory {
                id: next_id,
                name: category_name(&route.module_path),
                desc: format!("Module {}", route.module_path),
                index: next_id - 1,
            })
            .id;

        let mut req_params = Vec::new();
        let mut req_query = Vec::new();
        let mut body: Option<&RequestParamInfo> = None;
        for param in &route.request_params {
            match param.location {
                ParamLocation::Path => req_params.push(YapiPathParam {
                    name: param.name.clone(),
                    desc: param_description(param),
                }),
                ParamLocation::Query => req_query.extend(query_params(param)),
                ParamLocation::Body => body = Some(param),
            }
        }

        let (req_body_type, req_body_form, req_body_other, content_type) = match body {
            None => ("none", Vec::new(), String::new(), None),
            Some(param) if is_form(param) => (
                "form",
                form_params(param),
                String::new(),
                Some("application/x-www-form-urlencoded"),
            ),
            Some(param) if param.schema.kind == SchemaKind::String => {
                ("raw", Vec::new(), String::new(), Some("text/plain"))
            }
            Some(param) => (
                "json",
                Vec::new(),
                example_text(&param.schema),
                Some("application/json"),
            ),
        };
        let req_headers = content_type
            .map(|value| YapiHeader {
                name: "Content-Type".to_string(),
                value: value.to_string(),
                required: "1".to_string(),
            })
            .into_iter()
            .collect();

        let index = self.interfaces.len();
        self.interfaces.push(YapiInterface {
            id: index + 1,
            title: format!("{} {}", route.method, route.path),
            path: convert_path_format(&route.path),
            method: route.method.to_string(),
            catid,
            status: "done".to_string(),
            req_params,
            req_query,
            req_headers,
            req_body_type: req_body_type.to_string(),
            req_body_form,
            req_body_other,
            req_body_is_json_schema: false,
            res_body_type: "json".to_string(),
            res_body: example_text(&route.response_schema),
            res_body_is_json_schema: false,
            desc: format!("Handler: {}\nModule: {}", route.handler, route.module_path),
            markdown: markdown(route),
            tag: vec![route.module_name.clone()],
            index,
        });
    }

    pub fn build(self) -> YapiProject {
        debug!("Building YAPI project with {} interfaces", self.interfaces.len());
        let mut categories: Vec<YapiCategory> = self.categories.into_values().collect();
        categories.sort_by_key(|category| category.id);
        YapiProject {
            info: self.info,
            categories,
            interfaces: self.interfaces,
        }
    }
}

/// Builds the YAPI project of a route list.
pub fn build_yapi_project(routes: &[RouteRecord], project_name: &str) -> YapiProject {
    let mut builder = YapiBuilder::new(project_name);
    for route in routes {
        builder.add_route(route);
    }
    builder.build()
}

/// `crate::api::users` -> `users`
fn category_name(module_path: &str) -> String {
    module_path
        .rsplit("::")
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("default")
        .to_string()
}

fn required_flag(required: bool) -> String {
    let flag = if required { "1" } else { "0" };
    flag.to_string()
}

fn param_description(param: &RequestParamInfo) -> String {
    match &param.schema.description {
        Some(description) => format!("source: {}, {}", param.source_method, description),
        None => format!("source: {}", param.source_method),
    }
}

fn is_map(schema: &Schema) -> bool {
    schema.property("<key>").is_some() && schema.property("<value>").is_some()
}

/// A query structure becomes one entry per property.
fn query_params(param: &RequestParamInfo) -> Vec<YapiQueryParam> {
    if param.schema.kind != SchemaKind::Object || is_map(&param.schema) {
        return vec![YapiQueryParam {
            name: param.name.clone(),
            desc: param_description(param),
            required: required_flag(param.required),
        }];
    }
    param
        .schema
        .properties
        .keys()
        .map(|name| YapiQueryParam {
            name: name.clone(),
            desc: param_description(param),
            required: required_flag(false),
        })
        .collect()
}

fn is_form(param: &RequestParamInfo) -> bool {
    param.source_method.to_ascii_lowercase().contains("form")
}

fn form_params(param: &RequestParamInfo) -> Vec<YapiFormParam> {
    param
        .schema
        .properties
        .keys()
        .map(|name| YapiFormParam {
            name: name.clone(),
            field_type: "text".to_string(),
            desc: param_description(param),
            required: required_flag(param.required),
        })
        .collect()
}

/// Example value of a schema: placeholders for scalars, one element for arrays.
pub fn example_value(schema: &Schema) -> Value {
    match schema.kind {
        SchemaKind::String => json!("string"),
        SchemaKind::Integer => json!(0),
        SchemaKind::Number => json!(0.0),
        SchemaKind::Boolean => json!(false),
        SchemaKind::Array => match schema.items.as_deref() {
            Some(items) => Value::Array(vec![example_value(items)]),
            None => Value::Array(Vec::new()),
        },
        SchemaKind::Object if is_map(schema) => {
            let value = schema.property("<value>").map(example_value).unwrap_or(Value::Null);
            json!({ "key": value })
        }
        SchemaKind::Object => Value::Object(
            schema
                .properties
                .iter()
                .map(|(key, value)| (key.clone(), example_value(value)))
                .collect::<Map<String, Value>>(),
        ),
        SchemaKind::Dynamic | SchemaKind::Unknown => Value::Null,
    }
}

fn example_text(schema: &Schema) -> String {
    serde_json::to_string_pretty(&example_value(schema)).unwrap_or_default()
}

fn markdown(route: &RouteRecord) -> String {
    let mut text = format!("# {} {}\n\n", route.method, route.path);
    text.push_str(&format!("**Handler**: `{}`\n\n", route.handler));
    text.push_str(&format!("**Module**: `{}`\n\n", route.module_path));

    if !route.request_params.is_empty() {
        text.push_str("## Request parameters\n\n");
        text.push_str("| Name | Type | In | Required | Source |\n");
        text.push_str("|------|------|----|----------|--------|\n");
        for param in &route.request_params {
            text.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                param.name,
                kind_name(param.schema.kind),
                location_name(param.location),
                if param.required { "yes" } else { "no" },
                param.source_method
            ));
        }
    }
    text
}

fn kind_name(kind: SchemaKind) -> &'static str {
    match kind {
        SchemaKind::String => "string",
        SchemaKind::Integer => "integer",
        SchemaKind::Number => "number",
        SchemaKind::Boolean => "boolean",
        SchemaKind::Object => "object",
        SchemaKind::Array => "array",
        SchemaKind::Dynamic | SchemaKind::Unknown => "any",
    }
}

fn location_name(location: ParamLocation) -> &'static str {
    match location {
        ParamLocation::Path => "path",
        ParamLocation::Query => "query",
        ParamLocation::Body => "body",
    }
}
