//! Route document model shared by the tracer, the schema engine and the exporters.

use crate::program::{Site, SymbolId};
use crate::schema::Schema;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// HTTP methods a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    /// Parses a method from a registration or attribute name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "options" => Some(HttpMethod::Options),
            "head" => Some(HttpMethod::Head),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Path,
    Body,
}

/// A request parameter read by a handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParamInfo {
    #[serde(rename = "in")]
    pub location: ParamLocation,
    pub name: String,
    pub schema: Schema,
    pub required: bool,
    /// Binder call or extractor the parameter was found through
    pub source_method: String,
}

/// One discovered route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub method: HttpMethod,
    pub path: String,
    /// Function or closure symbol, `None` when the handler could not be resolved
    #[serde(skip)]
    pub handler_symbol: Option<SymbolId>,
    /// Where an unresolved handler is registered
    #[serde(skip)]
    pub handler_site: Option<Site>,
    pub handler: String,
    #[serde(rename = "module")]
    pub module_name: String,
    pub module_path: String,
    pub request_params: Vec<RequestParamInfo>,
    pub response_schema: Schema,
}

/// Handler half of a [`RouteKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Symbol(SymbolId),
    /// Unresolved handlers are told apart by their registration site
    Unresolved(Option<Site>),
}

/// Identity of a route record.
pub type RouteKey = (HttpMethod, String, HandlerKey);

impl RouteRecord {
    pub fn key(&self) -> RouteKey {
        let handler = match self.handler_symbol {
            Some(symbol) => HandlerKey::Symbol(symbol),
            None => HandlerKey::Unresolved(self.handler_site),
        };
        (self.method, self.path.clone(), handler)
    }
}

/// Insertion-ordered collection of route records, unique by [`RouteKey`].
#[derive(Debug, Default)]
pub struct RouteStore {
    records: Vec<RouteRecord>,
    keys: HashSet<RouteKey>,
}

impl RouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.keys.contains(key)
    }

    /// Adds a record unless its key is already present.
    pub fn insert(&mut self, record: RouteRecord) -> bool {
        if !self.keys.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[RouteRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RouteRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The route document written by the `routes` output style.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDocument {
    pub framework: String,
    pub routes: Vec<RouteRecord>,
}
