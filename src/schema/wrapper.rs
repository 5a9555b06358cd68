//! Response-wrapper helpers.
//!
//! Services often hide the business payload behind a helper such as
//! `fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>>`. The wrapper's own emission only shows a
//! generic `data` field; the concrete type is known at each call site. Wrappers are indexed once
//! when the engine is built, and every call site injects the resolved argument schema into the
//! wrapper's base schema at the recorded data field path.

use super::response::{json_value, Body, Env, JsonValue, ResponseSite};
use super::{Schema, SchemaEngine};
use crate::config::Verdict;
use crate::program::{path_segments, FnId, Site, SymbolId, SymbolKind};
use crate::provider::{call_path, peel, EmissionStatus};
use log::debug;
use proc_macro2::{TokenStream, TokenTree};
use std::collections::HashMap;
use syn::spanned::Spanned;
use syn::visit::Visit;
use syn::Expr;

/// How far `let` initializers are followed when looking for the data parameter.
const MAX_ALIAS_HOPS: usize = 4;

/// A pre-indexed response-wrapper function.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseWrapperDescriptor {
    pub function_symbol: SymbolId,
    pub func: FnId,
    /// Request-context parameter, when the wrapper takes one
    pub context_param_index: Option<usize>,
    /// Parameter carrying the business payload
    pub data_param_index: Option<usize>,
    /// Position of the emitted payload expression
    pub emission_site: Option<Site>,
    pub base_schema: Schema,
    /// Property path of the payload inside the base schema; empty when the payload is emitted as is
    pub data_field_path: Option<Vec<String>>,
    pub is_success: bool,
}

impl<'p, 'a> SchemaEngine<'p, 'a> {
    pub(super) fn index_wrappers(&mut self) -> HashMap<FnId, ResponseWrapperDescriptor> {
        let program = self.program;
        let mut wrappers = HashMap::new();
        for decl in program.functions() {
            if let Some(descriptor) = self.describe_wrapper(decl.id) {
                debug!(
                    "Response wrapper {} (data at {:?}, success: {})",
                    program.qualified_fn_name(decl.id),
                    descriptor.data_field_path,
                    descriptor.is_success
                );
                wrappers.insert(decl.id, descriptor);
            }
        }
        wrappers
    }

    fn describe_wrapper(&mut self, func: FnId) -> Option<ResponseWrapperDescriptor> {
        let program = self.program;
        let provider = self.provider;
        let decl = program.function(func);

        if decl.params.iter().any(|param| provider.is_router_parameter(param.ty)) {
            return None;
        }
        let context: Vec<bool> = decl
            .params
            .iter()
            .map(|param| provider.is_context_parameter(param.ty))
            .collect();
        // all-context functions are handlers
        let data_index = context.iter().position(|is_context| !is_context)?;
        let context_index = context.iter().position(|is_context| *is_context);

        let candidates = self.find_candidates(Body::Block(decl.block), func, false);
        let emissions: Vec<_> = candidates
            .iter()
            .filter_map(|candidate| match candidate.site {
                ResponseSite::Emission(emission) => Some((emission, candidate.in_err)),
                ResponseSite::Wrapper { .. } => None,
            })
            .collect();
        let (emission, _) = emissions
            .iter()
            .rev()
            .find(|(_, in_err)| !in_err)
            .or_else(|| emissions.last())
            .copied()?;

        let data_symbol = program.param_symbol(func, data_index)?;
        if !self.references_symbol(emission.payload, data_symbol, func, 0) {
            return None;
        }

        self.begin_pass();
        let base_schema = self.resolve_expr(emission.payload, func, &Env::new(), 0);
        let data_field_path = self
            .data_path(emission.payload, data_symbol, func, 0)
            .or_else(|| {
                base_schema
                    .properties
                    .keys()
                    .find(|key| self.config.is_data_field(key))
                    .map(|key| vec![key.clone()])
            });
        let is_success = self.classify_wrapper(emission.status, &base_schema, &decl.name);

        Some(ResponseWrapperDescriptor {
            function_symbol: decl.symbol,
            func,
            context_param_index: context_index,
            data_param_index: Some(data_index),
            emission_site: program
                .file_of(func)
                .map(|file| Site::new(file, emission.payload.span())),
            base_schema,
            data_field_path,
            is_success,
        })
    }

    /// Structural evidence first, then the keyword table, then the default verdict.
    fn classify_wrapper(&self, status: EmissionStatus, base: &Schema, name: &str) -> bool {
        let has_error_field = base
            .properties
            .keys()
            .any(|key| self.config.is_error_field(key));
        if status == EmissionStatus::Ok && !has_error_field {
            return true;
        }
        let verdict = self
            .config
            .classify_name(name)
            .unwrap_or(self.config.default_verdict);
        verdict == Verdict::Success
    }

    /// True when `expr` mentions `symbol`, directly or through local `let` initializers.
    fn references_symbol(&self, expr: &Expr, symbol: SymbolId, func: FnId, hops: usize) -> bool {
        struct References<'r, 'p, 'a> {
            engine: &'r SchemaEngine<'p, 'a>,
            func: FnId,
            symbol: SymbolId,
            name: String,
            hops: usize,
            found: bool,
        }

        impl<'e> Visit<'e> for References<'_, '_, '_> {
            fn visit_expr_path(&mut self, node: &'e syn::ExprPath) {
                let Some(ident) = node.path.get_ident() else {
                    return;
                };
                let program = self.engine.program;
                let Some(bound) = program
                    .file_of(self.func)
                    .and_then(|file| program.resolve_ident(file, ident))
                else {
                    return;
                };
                if bound == self.symbol {
                    self.found = true;
                    return;
                }
                let local = program.symbol(bound);
                if let (SymbolKind::Local, Some(init)) = (local.kind, local.init) {
                    if self.hops < MAX_ALIAS_HOPS
                        && self
                            .engine
                            .references_symbol(init, self.symbol, self.func, self.hops + 1)
                    {
                        self.found = true;
                    }
                }
            }

            fn visit_macro(&mut self, mac: &'e syn::Macro) {
                if mentions_ident(mac.tokens.clone(), &self.name) {
                    self.found = true;
                }
            }

            fn visit_expr_closure(&mut self, _node: &'e syn::ExprClosure) {}
        }

        let mut visitor = References {
            engine: self,
            func,
            symbol,
            name: self.program.symbol(symbol).name.clone(),
            hops,
            found: false,
        };
        visitor.visit_expr(expr);
        visitor.found
    }

    /// Property path under which `expr` places the value of `symbol`.
    fn data_path(&self, expr: &Expr, symbol: SymbolId, func: FnId, hops: usize) -> Option<Vec<String>> {
        let program = self.program;
        match peel_data(expr) {
            Expr::Path(path) => {
                let ident = path.path.get_ident()?;
                let bound = program.resolve_ident(program.file_of(func)?, ident)?;
                if bound == symbol {
                    return Some(Vec::new());
                }
                let local = program.symbol(bound);
                match (local.kind, local.init) {
                    (SymbolKind::Local, Some(init)) if hops < MAX_ALIAS_HOPS => {
                        self.data_path(init, symbol, func, hops + 1)
                    }
                    _ => None,
                }
            }
            Expr::Struct(literal) => {
                let decl = program.function(func);
                let type_id = program.resolve_type(decl.module, &path_segments(&literal.path));
                literal.fields.iter().find_map(|field| {
                    let syn::Member::Named(member) = &field.member else {
                        return None;
                    };
                    let rest = self.data_path(&field.expr, symbol, func, hops)?;
                    let key = match type_id {
                        Some(id) => self.field_key(id, &member.to_string())?,
                        None => member.to_string(),
                    };
                    let mut path = vec![key];
                    path.extend(rest);
                    Some(path)
                })
            }
            Expr::Macro(mac) => {
                let name = &program.symbol(symbol).name;
                json_value(mac.mac.tokens.clone()).and_then(|value| json_path(&value, name))
            }
            _ => None,
        }
    }

    /// Schema of a wrapper call: the base schema with the data argument injected.
    pub(crate) fn resolve_wrapper_call(
        &mut self,
        wrapper: FnId,
        args: &[&Expr],
        func: FnId,
        env: &Env,
        depth: usize,
    ) -> Schema {
        let Some(descriptor) = self.wrappers.get(&wrapper) else {
            return Schema::unknown();
        };
        let mut schema = descriptor.base_schema.clone();
        let (Some(index), Some(path)) = (
            descriptor.data_param_index,
            descriptor.data_field_path.clone(),
        ) else {
            return schema;
        };
        let Some(arg) = args.get(index) else {
            return schema;
        };
        let data = self.resolve_expr(arg, func, env, depth + path.len());
        inject(&mut schema, &path, data);
        schema
    }
}

/// Places `data` at `path` inside `base`.
///
/// A concrete schema replaces whatever was there; an opaque one keeps an existing field's
/// structure.
pub fn inject(base: &mut Schema, path: &[String], data: Schema) {
    let Some((last, parents)) = path.split_last() else {
        if !data.is_opaque() {
            *base = data;
        }
        return;
    };

    let mut node = base;
    for key in parents {
        node = match node.properties.get_mut(key) {
            Some(child) => child,
            None => return,
        };
    }
    if data.is_opaque() && node.properties.contains_key(last) {
        return;
    }
    node.insert_property(last.clone(), data);
}

/// Looks through `Some(x)`, `Box::new(x)`, `x.into()`, `x.clone()`, `&x` and `x?`.
fn peel_data(expr: &Expr) -> &Expr {
    match peel(expr) {
        Expr::Call(call) if call.args.len() == 1 => {
            let wraps = call_path(call)
                .map(|segments| {
                    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                    matches!(
                        segments.as_slice(),
                        [.., "Some"] | [.., "Box" | "Arc" | "Rc", "new"]
                    )
                })
                .unwrap_or(false);
            if wraps {
                peel_data(&call.args[0])
            } else {
                peel(expr)
            }
        }
        Expr::MethodCall(method)
            if method.args.is_empty()
                && matches!(method.method.to_string().as_str(), "into" | "clone" | "to_owned") =>
        {
            peel_data(&method.receiver)
        }
        other => other,
    }
}

fn json_path(value: &JsonValue, name: &str) -> Option<Vec<String>> {
    match value {
        JsonValue::Expr(expr) => match peel_data(expr) {
            Expr::Path(path) if path.path.is_ident(name) => Some(Vec::new()),
            _ => None,
        },
        JsonValue::Object(entries) => entries.iter().find_map(|(key, entry)| {
            let rest = json_path(entry, name)?;
            let mut path = vec![key.clone()];
            path.extend(rest);
            Some(path)
        }),
        JsonValue::Unparsed => None,
    }
}

fn mentions_ident(tokens: TokenStream, name: &str) -> bool {
    tokens.into_iter().any(|tree| match tree {
        TokenTree::Ident(ident) => ident == name,
        TokenTree::Group(group) => mentions_ident(group.stream(), name),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::parser::ParsedFile;
    use crate::program::Program;
    use crate::provider::axum::AxumProvider;
    use crate::schema::{Handler, SchemaKind};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const WRAPPED: &str = r#"
        pub struct Resp<T> { pub code: i32, pub msg: String, pub data: T }
        pub struct User { pub id: u64, pub name: String }
        pub struct ErrBody { pub error: String }

        fn wrap<T: Serialize>(headers: HeaderMap, data: T) -> Json<Resp<T>> {
            Json(Resp { code: 0, msg: "ok".to_string(), data })
        }

        fn send<T: Serialize>(data: T) -> Json<T> {
            Json(data)
        }

        fn fail_with(msg: String) -> (StatusCode, Json<ErrBody>) {
            (StatusCode::BAD_REQUEST, Json(ErrBody { error: msg }))
        }

        async fn get_user(headers: HeaderMap) -> Json<Resp<User>> {
            wrap(headers, User { id: 1, name: "alice".to_string() })
        }

        async fn get_raw(headers: HeaderMap) -> Json<User> {
            let user = User { id: 2, name: "bob".to_string() };
            send(user)
        }
    "#;

    fn parse_code(code: &str) -> Vec<ParsedFile> {
        vec![ParsedFile {
            path: PathBuf::from("/proj/src/main.rs"),
            syntax_tree: syn::parse_file(code).expect("Failed to parse test code"),
        }]
    }

    #[test]
    fn test_wrapper_descriptors() {
        let files = parse_code(WRAPPED);
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let engine = SchemaEngine::new(&program, &AxumProvider, &config);

        let wrap = engine.wrapper(program.functions_named("wrap")[0]).unwrap();
        assert_eq!(wrap.context_param_index, Some(0));
        assert_eq!(wrap.data_param_index, Some(1));
        assert_eq!(wrap.data_field_path, Some(vec!["data".to_string()]));
        assert_eq!(wrap.base_schema.properties["data"].kind, SchemaKind::Dynamic);
        assert!(wrap.is_success);

        let send = engine.wrapper(program.functions_named("send")[0]).unwrap();
        assert_eq!(send.context_param_index, None);
        assert_eq!(send.data_field_path, Some(Vec::new()));
        assert!(send.is_success);

        let fail = engine.wrapper(program.functions_named("fail_with")[0]).unwrap();
        assert!(!fail.is_success);

        assert!(engine.wrapper(program.functions_named("get_user")[0]).is_none());
    }

    #[test]
    fn test_data_field_found_by_configured_name() {
        let files = parse_code(
            r#"
            pub struct Envelope<T> {
                pub status: i32,
                #[serde(rename = "Data")]
                pub payload: T,
            }

            fn envelope<T: Serialize>(data: T) -> Json<Envelope<T>> {
                Json(Envelope { status: 0, payload: serde_json::to_value(data).unwrap() })
            }
            "#,
        );
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let engine = SchemaEngine::new(&program, &AxumProvider, &config);

        let envelope = engine.wrapper(program.functions_named("envelope")[0]).unwrap();
        assert_eq!(envelope.data_param_index, Some(0));
        assert_eq!(envelope.data_field_path, Some(vec!["Data".to_string()]));
    }

    #[test]
    fn test_call_site_injection() {
        let files = parse_code(WRAPPED);
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let mut engine = SchemaEngine::new(&program, &AxumProvider, &config);

        let user_ty: syn::Type = syn::parse_quote!(User);
        let root = program.modules()[0].id;
        let user = engine.resolve_type(&user_ty, root, &[]);

        let schema = engine.response_schema(&Handler::Function(program.functions_named("get_user")[0]));
        assert_eq!(schema.type_name.as_deref(), Some("Resp"));
        assert_eq!(schema.properties["code"].kind, SchemaKind::Integer);
        let data = &schema.properties["data"];
        assert_eq!(data.type_name, user.type_name);
        assert_eq!(data.properties, user.properties);

        let raw = engine.response_schema(&Handler::Function(program.functions_named("get_raw")[0]));
        assert_eq!(raw.properties, user.properties);
    }

    #[test]
    fn test_inject_keeps_structure_for_opaque_data() {
        let mut base = Schema::object().with_property(
            "data",
            Schema::object().with_property("id", Schema::new(SchemaKind::Integer)),
        );
        inject(&mut base, &["data".to_string()], Schema::dynamic());
        assert_eq!(base.properties["data"].properties.len(), 1);

        inject(&mut base, &["data".to_string()], Schema::new(SchemaKind::String));
        assert_eq!(base.properties["data"].kind, SchemaKind::String);
        assert_eq!(base.properties["data"].json_key.as_deref(), Some("data"));
    }
}
