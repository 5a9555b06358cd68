//! Schema resolution engine.
//!
//! Turns Rust types and handler expressions into [`Schema`] trees:
//!
//! - [`resolver`]: type to schema, depth-bounded and memoized per resolution pass
//! - [`wrapper`]: the pre-indexed response-wrapper helpers and payload injection
//! - [`response`]: locating a handler's response emission and resolving its payload
//! - [`request`]: request parameters read through binder calls and signature extractors

pub mod request;
pub mod resolver;
pub mod response;
pub mod wrapper;

use crate::config::AnalyzerConfig;
use crate::program::{FnId, ModuleId, Program, SymbolId};
use crate::provider::CapabilityProvider;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

pub use wrapper::ResponseWrapperDescriptor;

/// JSON shape category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// Any value; refined by call-site injection when possible
    Dynamic,
    Unknown,
}

/// Recursive description of a value's shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: SchemaKind,
    /// Object properties keyed by their serialized name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

const DEPTH_LIMIT: &str = "depth limit";

impl Schema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            properties: BTreeMap::new(),
            items: None,
            type_name: None,
            json_key: None,
            description: None,
        }
    }

    pub fn object() -> Self {
        Self::new(SchemaKind::Object)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaKind::Array)
        }
    }

    pub fn dynamic() -> Self {
        Self::new(SchemaKind::Dynamic)
    }

    pub fn unknown() -> Self {
        Self::new(SchemaKind::Unknown)
    }

    /// Leaf placed where recursion stopped at the depth bound.
    pub fn depth_limit() -> Self {
        Self::new(SchemaKind::Unknown).with_description(DEPTH_LIMIT)
    }

    pub fn with_type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a property, recording its serialized key on the property schema.
    pub fn with_property(mut self, key: impl Into<String>, schema: Schema) -> Self {
        self.insert_property(key, schema);
        self
    }

    pub fn insert_property(&mut self, key: impl Into<String>, mut schema: Schema) {
        let key = key.into();
        schema.json_key = Some(key.clone());
        self.properties.insert(key, schema);
    }

    pub fn property(&self, key: &str) -> Option<&Schema> {
        self.properties.get(key)
    }

    /// True when the schema says nothing concrete about the value.
    pub fn is_opaque(&self) -> bool {
        matches!(self.kind, SchemaKind::Dynamic | SchemaKind::Unknown)
    }

    /// Opaque, or an array of something refinable; call-site values may replace it.
    pub fn is_refinable(&self) -> bool {
        self.is_opaque() || self.items.as_deref().map(Schema::is_refinable).unwrap_or(false)
    }

    pub fn is_depth_limit(&self) -> bool {
        self.kind == SchemaKind::Unknown && self.description.as_deref() == Some(DEPTH_LIMIT)
    }

    /// Number of edges on the longest path from this node to a leaf.
    pub fn depth(&self) -> usize {
        let children = self
            .properties
            .values()
            .chain(self.items.as_deref())
            .map(|child| child.depth() + 1);
        children.max().unwrap_or(0)
    }
}

/// A route handler as seen by the schema engine.
#[derive(Debug, Clone, Copy)]
pub enum Handler<'a> {
    Function(FnId),
    Closure {
        symbol: SymbolId,
        closure: &'a syn::ExprClosure,
        /// Function whose body contains the closure
        owner: FnId,
    },
}

/// Resolves request and response shapes of handlers.
///
/// Building the engine runs the wrapper pre-processing pass; afterwards every public entry point
/// starts a fresh resolution pass with its own memo table.
pub struct SchemaEngine<'p, 'a> {
    program: &'p Program<'a>,
    provider: &'p dyn CapabilityProvider,
    config: &'p AnalyzerConfig,
    memo: HashMap<(String, ModuleId, usize), Schema>,
    wrappers: HashMap<FnId, ResponseWrapperDescriptor>,
    /// Functions whose bodies are being resolved, innermost last
    call_stack: Vec<FnId>,
    /// Bindings whose values are being resolved
    visiting: HashSet<SymbolId>,
}

impl<'p, 'a> SchemaEngine<'p, 'a> {
    pub fn new(
        program: &'p Program<'a>,
        provider: &'p dyn CapabilityProvider,
        config: &'p AnalyzerConfig,
    ) -> Self {
        let mut engine = Self {
            program,
            provider,
            config,
            memo: HashMap::new(),
            wrappers: HashMap::new(),
            call_stack: Vec::new(),
            visiting: HashSet::new(),
        };
        engine.wrappers = engine.index_wrappers();
        debug!("Indexed {} response wrappers", engine.wrappers.len());
        engine
    }

    pub fn wrapper(&self, func: FnId) -> Option<&ResponseWrapperDescriptor> {
        self.wrappers.get(&func)
    }

    /// Resolves a syntax type written in `module`, `generics` naming the unbound parameters.
    pub fn resolve_type(&mut self, ty: &syn::Type, module: ModuleId, generics: &[String]) -> Schema {
        self.begin_pass();
        self.schema_of_syn(ty, module, generics, 0)
    }

    fn begin_pass(&mut self) {
        self.memo.clear();
        self.call_stack.clear();
        self.visiting.clear();
    }

    fn max_depth(&self) -> usize {
        self.config.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_depth_counts_edges() {
        assert_eq!(Schema::new(SchemaKind::String).depth(), 0);
        let nested = Schema::object().with_property(
            "items",
            Schema::array(Schema::object().with_property("id", Schema::new(SchemaKind::Integer))),
        );
        assert_eq!(nested.depth(), 3);
    }

    #[test]
    fn test_property_records_json_key() {
        let schema = Schema::object().with_property("userId", Schema::new(SchemaKind::Integer));
        assert_eq!(
            schema.property("userId").unwrap().json_key.as_deref(),
            Some("userId")
        );
    }

    #[test]
    fn test_depth_limit_sentinel() {
        let sentinel = Schema::depth_limit();
        assert!(sentinel.is_depth_limit());
        assert!(sentinel.is_opaque());
        assert!(!Schema::unknown().is_depth_limit());
    }

    #[test]
    fn test_serialized_shape() {
        let schema = Schema::object()
            .with_type_name("User")
            .with_property("name", Schema::new(SchemaKind::String));
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["typeName"], "User");
        assert_eq!(json["properties"]["name"]["type"], "string");
        assert!(json.get("items").is_none());
    }
}
