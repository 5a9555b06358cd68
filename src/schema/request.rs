//! Request parameter extraction.
//!
//! Parameters come from two places: extractor types in the handler signature (`Path<T>`,
//! `Query<T>`, `Json<T>`) and binder calls made on a request-context parameter inside the body
//! (`req.param("id")`, `req.query::<Page>()`). Path template segments no binder accounted for are
//! added as required string parameters.

use super::{Handler, Schema, SchemaEngine, SchemaKind};
use crate::document::{ParamLocation, RequestParamInfo};
use crate::program::{FnId, SymbolId, TypeDeclKind, TypeRef};
use crate::provider::{BindingKind, BindingMethod, SignatureBinding};
use std::collections::HashSet;
use syn::{Fields, Pat};

impl<'p, 'a> SchemaEngine<'p, 'a> {
    /// Request parameters of a handler registered under `route_path`.
    pub fn request_params(&mut self, handler: &Handler<'a>, route_path: &str) -> Vec<RequestParamInfo> {
        self.begin_pass();

        let program = self.program;
        let provider = self.provider;
        let template = template_params(route_path);
        let mut params = Vec::new();

        // (pattern, type) of every typed input, plus the binding when it is a plain identifier
        let (func, inputs): (FnId, Vec<(&Pat, &syn::Type, Option<SymbolId>)>) = match *handler {
            Handler::Function(id) => {
                let decl = program.function(id);
                let inputs = decl
                    .params
                    .iter()
                    .map(|param| (param.pat, param.ty, program.param_symbol(id, param.index)))
                    .collect();
                (id, inputs)
            }
            Handler::Closure { closure, owner, .. } => {
                let file = program.file_of(owner);
                let inputs = closure
                    .inputs
                    .iter()
                    .filter_map(|input| match input {
                        Pat::Type(pat_type) => {
                            let symbol = match (&*pat_type.pat, file) {
                                (Pat::Ident(pat_ident), Some(file)) => {
                                    program.resolve_ident(file, &pat_ident.ident)
                                }
                                _ => None,
                            };
                            Some((&*pat_type.pat, &*pat_type.ty, symbol))
                        }
                        _ => None,
                    })
                    .collect();
                (owner, inputs)
            }
        };

        for (pat, ty, symbol) in inputs {
            if let Some(binding) = provider.signature_binding(ty) {
                self.signature_params(&binding, pat, func, &template, &mut params);
            }
            if let Some(symbol) = symbol.filter(|_| provider.is_context_parameter(ty)) {
                self.binder_params(symbol, func, &mut params);
            }
        }

        for name in &template {
            let known = params
                .iter()
                .any(|p: &RequestParamInfo| p.location == ParamLocation::Path && &p.name == name);
            if !known {
                params.push(RequestParamInfo {
                    location: ParamLocation::Path,
                    name: name.clone(),
                    schema: Schema::new(SchemaKind::String),
                    required: true,
                    source_method: "path".to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        params.retain(|p| seen.insert((p.location, p.name.clone())));
        params
    }

    fn signature_params(
        &mut self,
        binding: &SignatureBinding<'_>,
        pat: &Pat,
        func: FnId,
        template: &[String],
        out: &mut Vec<RequestParamInfo>,
    ) {
        let decl = self.program.function(func);
        let (module, generics) = (decl.module, decl.generics.clone());
        let param = |name: String, schema: Schema| RequestParamInfo {
            location: binding.location,
            name,
            schema,
            required: binding.required,
            source_method: binding.source.clone(),
        };

        if binding.location != ParamLocation::Path {
            let name = match binding.location {
                ParamLocation::Query => "query",
                _ => "body",
            };
            let schema = self.schema_of_syn(binding.inner, module, &generics, 0);
            out.push(param(name.to_string(), schema));
            return;
        }

        // `Path((a, b)): Path<(u32, String)>` or `Path(id): Path<u32>`
        let pattern_names = extractor_pattern_names(pat);
        match TypeRef::from_syn(binding.inner, &generics) {
            TypeRef::Tuple(elems) => {
                for (i, elem) in elems.iter().enumerate() {
                    let name = pattern_names
                        .get(i)
                        .or_else(|| template.get(i))
                        .cloned()
                        .unwrap_or_else(|| format!("param{}", i));
                    let schema = self.schema_of(elem, module, 0);
                    out.push(param(name, schema));
                }
            }
            TypeRef::Named { path, .. } => {
                let fields = self
                    .program
                    .resolve_type(module, &path)
                    .map(|id| self.program.type_decl(id).kind);
                if let Some(TypeDeclKind::Struct(item)) = fields {
                    if let Fields::Named(named) = &item.fields {
                        let schema = self.schema_of_syn(binding.inner, module, &generics, 0);
                        for field in &named.named {
                            let Some(ident) = &field.ident else {
                                continue;
                            };
                            let Some(key) = self
                                .program
                                .resolve_type(module, &path)
                                .and_then(|id| self.field_key(id, &ident.to_string()))
                            else {
                                continue;
                            };
                            let field_schema = schema.property(&key).cloned().unwrap_or_else(Schema::unknown);
                            out.push(param(key, field_schema));
                        }
                        return;
                    }
                }
                let name = single_name(&pattern_names, template);
                let schema = self.schema_of_syn(binding.inner, module, &generics, 0);
                out.push(param(name, schema));
            }
            other => {
                let name = single_name(&pattern_names, template);
                let schema = self.schema_of(&other, module, 0);
                out.push(param(name, schema));
            }
        }
    }

    /// Parameters read through binder calls on a request-context binding.
    fn binder_params(&mut self, context: SymbolId, func: FnId, out: &mut Vec<RequestParamInfo>) {
        let program = self.program;
        let provider = self.provider;

        for chain in program.symbols().chains_rooted_at(context) {
            let mut previous = None;
            let mut found: Vec<(BindingKind, RequestParamInfo)> = Vec::new();
            for (position, call) in chain.calls.iter().enumerate() {
                if let Some(binding) = provider.binding_method(call, previous) {
                    // a keyed narrowing replaces the mapping it was taken from
                    if binding.kind == BindingKind::KeyArray {
                        found.retain(|(kind, _)| *kind != BindingKind::KeyMap);
                    }
                    // the binding's type may come from the `let` that receives the chain
                    let receiving_type = if position + 1 == chain.calls.len() {
                        chain
                            .bound_to
                            .and_then(|symbol| program.symbol(symbol).declared_type)
                    } else {
                        None
                    };
                    if let Some(info) = self.binding_param(&binding, receiving_type, func) {
                        found.push((binding.kind, info));
                    }
                }
                previous = Some(*call);
            }
            out.extend(found.into_iter().map(|(_, info)| info));
        }
    }

    fn binding_param(
        &mut self,
        binding: &BindingMethod<'_>,
        receiving_type: Option<&syn::Type>,
        func: FnId,
    ) -> Option<RequestParamInfo> {
        let decl = self.program.function(func);
        let (module, generics) = (decl.module, decl.generics.clone());
        let default_name = match binding.location {
            ParamLocation::Query => "query",
            ParamLocation::Path => "path",
            ParamLocation::Body => "body",
        };

        let (name, schema) = match binding.kind {
            BindingKind::SingleKey => (binding.key.clone()?, Schema::new(SchemaKind::String)),
            BindingKind::KeyArray => (
                binding.key.clone()?,
                Schema::array(Schema::new(SchemaKind::String)),
            ),
            BindingKind::KeyMap => (
                binding.key.clone().unwrap_or_else(|| default_name.to_string()),
                Schema::object()
                    .with_property("<key>", Schema::new(SchemaKind::String))
                    .with_property("<value>", Schema::new(SchemaKind::String)),
            ),
            BindingKind::Structure => {
                let schema = match binding.type_arg.or(receiving_type) {
                    Some(ty) => self.schema_of_syn(ty, module, &generics, 0),
                    None => Schema::dynamic(),
                };
                (default_name.to_string(), schema)
            }
            BindingKind::Text => ("body".to_string(), Schema::new(SchemaKind::String)),
        };

        Some(RequestParamInfo {
            location: binding.location,
            name,
            schema,
            required: binding.required,
            source_method: binding.source.clone(),
        })
    }
}

/// Names of the `:name`, `{name}` and `*name` segments of a route path, in order.
pub fn template_params(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| {
            let name = if let Some(name) = segment.strip_prefix(':') {
                name
            } else if let Some(name) = segment.strip_prefix('*') {
                name
            } else if segment.starts_with('{') && segment.ends_with('}') {
                let inner = &segment[1..segment.len() - 1];
                // actix `{id:\d+}`, axum `{*rest}`
                let inner = inner.split(':').next().unwrap_or(inner);
                inner.trim_start_matches('*')
            } else {
                return None;
            };
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Identifiers bound inside an extractor pattern, `Path((a, b))` -> `[a, b]`.
fn extractor_pattern_names(pat: &Pat) -> Vec<String> {
    fn collect(pat: &Pat, out: &mut Vec<String>) {
        match pat {
            Pat::Ident(pat_ident) => out.push(pat_ident.ident.to_string()),
            Pat::Tuple(tuple) => tuple.elems.iter().for_each(|elem| collect(elem, out)),
            Pat::TupleStruct(tuple_struct) => {
                tuple_struct.elems.iter().for_each(|elem| collect(elem, out))
            }
            Pat::Type(pat_type) => collect(&pat_type.pat, out),
            Pat::Paren(paren) => collect(&paren.pat, out),
            _ => {}
        }
    }

    match pat {
        // a plain `path: Path<u32>` names the extractor, not the parameter
        Pat::Ident(_) => Vec::new(),
        _ => {
            let mut names = Vec::new();
            collect(pat, &mut names);
            names
        }
    }
}

fn single_name(pattern_names: &[String], template: &[String]) -> String {
    pattern_names
        .first()
        .or_else(|| template.first())
        .cloned()
        .unwrap_or_else(|| "path".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::parser::ParsedFile;
    use crate::program::Program;
    use crate::provider::actix::ActixProvider;
    use crate::provider::axum::AxumProvider;
    use crate::provider::tide::TideProvider;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn parse_code(code: &str) -> Vec<ParsedFile> {
        vec![ParsedFile {
            path: PathBuf::from("/proj/src/main.rs"),
            syntax_tree: syn::parse_file(code).expect("Failed to parse test code"),
        }]
    }

    fn names(params: &[RequestParamInfo]) -> Vec<(ParamLocation, &str)> {
        params.iter().map(|p| (p.location, p.name.as_str())).collect()
    }

    #[test]
    fn test_template_params() {
        assert_eq!(template_params("/users/:id/posts/{post_id}"), vec!["id", "post_id"]);
        assert_eq!(template_params("/files/{name:.*}"), vec!["name"]);
        assert_eq!(template_params("/static/*rest"), vec!["rest"]);
        assert!(template_params("/health").is_empty());
    }

    #[test]
    fn test_axum_signature_extractors() {
        let files = parse_code(
            r#"
            pub struct Pagination { pub page: u32, pub per_page: u32 }
            pub struct CreatePost { pub title: String }

            async fn create_post(
                Path((user_id, slug)): Path<(u64, String)>,
                Query(page): Query<Pagination>,
                State(db): State<Db>,
                Json(body): Json<CreatePost>,
            ) -> StatusCode {
                StatusCode::CREATED
            }
            "#,
        );
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let mut engine = SchemaEngine::new(&program, &AxumProvider, &config);
        let handler = Handler::Function(program.functions_named("create_post")[0]);

        let params = engine.request_params(&handler, "/users/:user_id/posts/:slug");
        assert_eq!(
            names(&params),
            vec![
                (ParamLocation::Path, "user_id"),
                (ParamLocation::Path, "slug"),
                (ParamLocation::Query, "query"),
                (ParamLocation::Body, "body"),
            ]
        );
        assert_eq!(params[0].schema.kind, SchemaKind::Integer);
        assert_eq!(params[2].schema.properties.len(), 2);
        assert!(!params[2].required);
        assert!(params[3].required);
        assert_eq!(params[3].source_method, "Json");
    }

    #[test]
    fn test_tide_binder_calls() {
        let files = parse_code(
            r#"
            pub struct Filter { pub tag: String }
            pub struct NewNote { pub text: String }

            async fn update_note(mut req: Request<State>) -> tide::Result {
                let id: u64 = req.param("id")?.parse()?;
                let filter: Filter = req.query()?;
                let note = req.body_json::<NewNote>().await?;
                Ok(Response::new(204))
            }
            "#,
        );
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let mut engine = SchemaEngine::new(&program, &TideProvider, &config);
        let handler = Handler::Function(program.functions_named("update_note")[0]);

        let params = engine.request_params(&handler, "/notes/:id/:rev");
        assert_eq!(
            names(&params),
            vec![
                (ParamLocation::Path, "id"),
                (ParamLocation::Query, "query"),
                (ParamLocation::Body, "body"),
                (ParamLocation::Path, "rev"),
            ]
        );
        assert_eq!(params[1].schema.type_name.as_deref(), Some("Filter"));
        assert_eq!(params[2].schema.type_name.as_deref(), Some("NewNote"));
        assert_eq!(params[3].source_method, "path");
    }

    #[test]
    fn test_tide_query_pairs() {
        let files = parse_code(
            r#"
            async fn search(req: Request<State>) -> tide::Result {
                let all: HashMap<String, String> = req.url().query_pairs().into_owned().collect();
                Ok("".into())
            }

            async fn tagged(req: Request<State>) -> tide::Result {
                let tags: Vec<String> = req
                    .url()
                    .query_pairs()
                    .filter(|(key, _)| key == "tag")
                    .map(|(_, value)| value.into_owned())
                    .collect();
                Ok("".into())
            }
            "#,
        );
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let mut engine = SchemaEngine::new(&program, &TideProvider, &config);

        let search = engine.request_params(&Handler::Function(program.functions_named("search")[0]), "/search");
        assert_eq!(names(&search), vec![(ParamLocation::Query, "query")]);
        assert_eq!(search[0].schema.kind, SchemaKind::Object);
        assert_eq!(search[0].source_method, "url().query_pairs()");
        assert!(!search[0].required);

        let tagged = engine.request_params(&Handler::Function(program.functions_named("tagged")[0]), "/tagged");
        assert_eq!(names(&tagged), vec![(ParamLocation::Query, "tag")]);
        assert_eq!(tagged[0].schema.kind, SchemaKind::Array);
        assert_eq!(
            tagged[0].schema.items.as_deref().map(|items| items.kind),
            Some(SchemaKind::String)
        );
    }

    #[test]
    fn test_actix_query_string() {
        let files = parse_code(
            r#"
            async fn search(req: HttpRequest) -> impl Responder {
                let params = web::Query::<HashMap<String, String>>::from_query(req.query_string()).unwrap();
                let id = req.match_info().get("id").unwrap();
                HttpResponse::Ok().finish()
            }
            "#,
        );
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let mut engine = SchemaEngine::new(&program, &ActixProvider, &config);

        let params = engine.request_params(&Handler::Function(program.functions_named("search")[0]), "/items/{id}");
        assert_eq!(
            names(&params),
            vec![(ParamLocation::Query, "query"), (ParamLocation::Path, "id")]
        );
        assert_eq!(params[0].source_method, "query_string");
        assert_eq!(params[0].schema.kind, SchemaKind::Object);
    }
}
