//! Framework capability providers.
//!
//! The tracer and the schema engine hold no framework-specific names. Everything they need to
//! know about a web framework (how routers are built, grouped and registered, which parameters
//! carry the request, how responses are emitted) is asked through [`CapabilityProvider`].
//!
//! # Supported Frameworks
//!
//! - **Axum**: See [`axum::AxumProvider`]
//! - **Actix-Web**: See [`actix::ActixProvider`]
//! - **Tide**: See [`tide::TideProvider`]

pub mod actix;
pub mod axum;
pub mod tide;

use crate::cli::Framework;
use crate::document::{HttpMethod, ParamLocation};
use crate::program::{FnId, Program, SymbolId};
use syn::punctuated::Punctuated;
use syn::visit::Visit;
use syn::{Expr, ExprCall, ExprMethodCall, Lit};

/// Where route discovery starts.
#[derive(Debug, Clone, Copy)]
pub enum RootRouter<'a> {
    /// A router-valued expression inside `func`
    Expr { expr: &'a Expr, func: FnId },
    /// A binding holding a top-level router
    Symbol(SymbolId),
    /// A function returning a fully built router
    Function(FnId),
}

/// Router a group call hands its routes to.
#[derive(Debug, Clone, Copy)]
pub enum ChildRouter<'e> {
    /// The call's own result (`app.at("/api")`)
    Result,
    /// A router passed as an argument (`nest("/api", api)`)
    Expr(&'e Expr),
}

#[derive(Debug, Clone)]
pub struct GroupCall<'e> {
    pub prefix: String,
    pub child: ChildRouter<'e>,
}

#[derive(Debug, Clone)]
pub struct MethodRegistration<'e> {
    /// `None` when the method and path come from the handler's route attribute
    pub method: Option<HttpMethod>,
    pub path: String,
    pub handler: &'e Expr,
}

/// A request parameter declared in a handler signature (`Query<T>`, `Json<T>`).
#[derive(Debug, Clone)]
pub struct SignatureBinding<'t> {
    pub location: ParamLocation,
    pub inner: &'t syn::Type,
    pub required: bool,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// One named value, `param("id")`
    SingleKey,
    /// Repeated values of one key
    KeyArray,
    /// A key/value mapping
    KeyMap,
    /// A whole structure, `query::<Page>()`
    Structure,
    /// The raw body as text
    Text,
}

/// A request-reading method call on a context parameter.
#[derive(Debug, Clone)]
pub struct BindingMethod<'e> {
    pub location: ParamLocation,
    pub kind: BindingKind,
    pub key: Option<String>,
    /// Turbofish type of a structure binder
    pub type_arg: Option<&'e syn::Type>,
    pub required: bool,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionStatus {
    /// 2xx status
    Ok,
    Other,
    Unspecified,
}

/// An expression that writes the response body.
#[derive(Debug, Clone, Copy)]
pub struct Emission<'e> {
    pub payload: &'e Expr,
    pub status: EmissionStatus,
}

/// Framework knowledge consumed by route tracing and schema resolution.
pub trait CapabilityProvider {
    fn framework_name(&self) -> &'static str;

    fn find_root_routers<'a>(&self, program: &Program<'a>) -> Vec<RootRouter<'a>>;

    fn group_call<'e>(&self, call: &'e ExprMethodCall) -> Option<GroupCall<'e>>;

    fn http_method_call<'e>(&self, call: &'e ExprMethodCall) -> Vec<MethodRegistration<'e>>;

    /// Callee that receives the router, for `configure(f)`-style calls.
    fn delegate_call<'e>(&self, _call: &'e ExprMethodCall) -> Option<&'e Expr> {
        None
    }

    /// Path segment of a router construction call.
    fn router_constructor(&self, call: &ExprCall) -> Option<String>;

    fn is_router_parameter(&self, ty: &syn::Type) -> bool;

    fn is_context_parameter(&self, ty: &syn::Type) -> bool;

    fn signature_binding<'t>(&self, _ty: &'t syn::Type) -> Option<SignatureBinding<'t>> {
        None
    }

    /// Matches a call on a context parameter; `previous` is the call before it in the chain.
    fn binding_method<'e>(
        &self,
        _call: &'e ExprMethodCall,
        _previous: Option<&ExprMethodCall>,
    ) -> Option<BindingMethod<'e>> {
        None
    }

    fn emission<'e>(&self, expr: &'e Expr) -> Option<Emission<'e>>;

    /// Payload type named by a handler's return type.
    fn declared_response_type<'t>(&self, ty: &'t syn::Type) -> Option<&'t syn::Type>;

    fn attribute_route(&self, _attrs: &[syn::Attribute]) -> Option<(HttpMethod, String)> {
        None
    }
}

/// Provider for a framework.
pub fn provider_for(framework: Framework) -> Box<dyn CapabilityProvider> {
    match framework {
        Framework::Axum => Box::new(axum::AxumProvider),
        Framework::ActixWeb => Box::new(actix::ActixProvider),
        Framework::Tide => Box::new(tide::TideProvider),
    }
}

/// Value of a string literal, looking through parentheses and references.
pub fn string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            Lit::Str(lit_str) => Some(lit_str.value()),
            _ => None,
        },
        Expr::Paren(paren) => string_literal(&paren.expr),
        Expr::Reference(reference) => string_literal(&reference.expr),
        Expr::Group(group) => string_literal(&group.expr),
        _ => None,
    }
}

/// Identifiers of a call target path, `web::scope` -> `["web", "scope"]`.
pub fn call_path(call: &ExprCall) -> Option<Vec<String>> {
    match &*call.func {
        Expr::Path(path) => Some(crate::program::path_segments(&path.path)),
        _ => None,
    }
}

/// True when the call target path ends with `suffix`.
pub fn call_path_ends_with(call: &ExprCall, suffix: &[&str]) -> bool {
    call_path(call)
        .map(|segments| {
            segments.len() >= suffix.len()
                && segments[segments.len() - suffix.len()..]
                    .iter()
                    .zip(suffix)
                    .all(|(a, b)| a == b)
        })
        .unwrap_or(false)
}

/// Last identifier of a call target path.
pub fn call_name(call: &ExprCall) -> Option<String> {
    call_path(call).and_then(|segments| segments.last().cloned())
}

/// Strips references, parentheses, `?` and `.await` from an expression.
pub fn peel(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => peel(&paren.expr),
        Expr::Group(group) => peel(&group.expr),
        Expr::Reference(reference) => peel(&reference.expr),
        Expr::Try(try_expr) => peel(&try_expr.expr),
        Expr::Await(await_expr) => peel(&await_expr.base),
        _ => expr,
    }
}

/// Last path segment of a type, looking through references.
pub fn type_segment(ty: &syn::Type) -> Option<&syn::PathSegment> {
    match ty {
        syn::Type::Path(type_path) => type_path.path.segments.last(),
        syn::Type::Reference(reference) => type_segment(&reference.elem),
        syn::Type::Paren(paren) => type_segment(&paren.elem),
        syn::Type::Group(group) => type_segment(&group.elem),
        _ => None,
    }
}

/// Last identifier of a type path, `web::Json<User>` -> `Json`.
pub fn type_name(ty: &syn::Type) -> Option<String> {
    type_segment(ty).map(|segment| segment.ident.to_string())
}

pub fn type_name_in(ty: &syn::Type, names: &[&str]) -> bool {
    type_name(ty)
        .map(|name| names.contains(&name.as_str()))
        .unwrap_or(false)
}

/// The `index`-th generic type argument of a type's last segment.
pub fn type_argument(ty: &syn::Type, index: usize) -> Option<&syn::Type> {
    let segment = type_segment(ty)?;
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args
        .iter()
        .filter_map(|arg| match arg {
            syn::GenericArgument::Type(inner) => Some(inner),
            _ => None,
        })
        .nth(index)
}

/// Reads the payload type out of a handler return type.
///
/// `json_wrappers` name the types whose first argument is the payload (`Json<T>`), `opaque` the
/// response types that say nothing about the payload (`Response`, `impl IntoResponse`).
pub fn declared_payload_type<'t>(
    ty: &'t syn::Type,
    json_wrappers: &[&str],
    opaque: &[&str],
) -> Option<&'t syn::Type> {
    match ty {
        syn::Type::ImplTrait(_) | syn::Type::TraitObject(_) => None,
        syn::Type::Paren(paren) => declared_payload_type(&paren.elem, json_wrappers, opaque),
        syn::Type::Tuple(tuple) => tuple
            .elems
            .iter()
            .find(|elem| type_name_in(elem, json_wrappers))
            .and_then(|elem| declared_payload_type(elem, json_wrappers, opaque)),
        syn::Type::Path(_) => {
            let name = type_name(ty)?;
            if json_wrappers.contains(&name.as_str()) {
                return type_argument(ty, 0);
            }
            if name == "Result" {
                return type_argument(ty, 0)
                    .and_then(|ok| declared_payload_type(ok, json_wrappers, opaque));
            }
            if opaque.contains(&name.as_str()) {
                return None;
            }
            Some(ty)
        }
        syn::Type::Reference(_) => Some(ty),
        _ => None,
    }
}

/// Classifies a status expression: `StatusCode::OK`, `StatusCode::Created`, `201`.
pub fn status_class(expr: &Expr) -> EmissionStatus {
    match peel(expr) {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            Lit::Int(int) => match int.base10_parse::<u16>() {
                Ok(code) if (200..300).contains(&code) => EmissionStatus::Ok,
                Ok(_) => EmissionStatus::Other,
                Err(_) => EmissionStatus::Unspecified,
            },
            _ => EmissionStatus::Unspecified,
        },
        // a local variable says nothing about the status
        Expr::Path(path) if path.path.segments.len() == 1 => EmissionStatus::Unspecified,
        Expr::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| status_name_class(&segment.ident.to_string()))
            .unwrap_or(EmissionStatus::Unspecified),
        _ => EmissionStatus::Unspecified,
    }
}

/// Classifies a status constant or builder name (`OK`, `Created`, `NotFound`).
pub fn status_name_class(name: &str) -> EmissionStatus {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_lowercase();
    match normalized.as_str() {
        "ok" | "created" | "accepted" | "nocontent" | "nonauthoritativeinformation"
        | "partialcontent" => EmissionStatus::Ok,
        _ => EmissionStatus::Other,
    }
}

/// Arguments of a function-like attribute, `#[get("/users", wrap = "..")]`.
pub fn attribute_args(attr: &syn::Attribute) -> Vec<Expr> {
    attr.parse_args_with(Punctuated::<Expr, syn::Token![,]>::parse_terminated)
        .map(|args| args.into_iter().collect())
        .unwrap_or_default()
}

/// Every function call in the program with the function containing it.
pub fn collect_calls<'a>(program: &Program<'a>) -> Vec<(&'a ExprCall, FnId)> {
    struct CallCollector<'a> {
        calls: Vec<&'a ExprCall>,
    }

    impl<'a> Visit<'a> for CallCollector<'a> {
        fn visit_expr_call(&mut self, node: &'a ExprCall) {
            self.calls.push(node);
            syn::visit::visit_expr_call(self, node);
        }

        fn visit_item(&mut self, _item: &'a syn::Item) {}
    }

    let mut result = Vec::new();
    for func in program.functions() {
        let mut collector = CallCollector { calls: Vec::new() };
        collector.visit_block(func.block);
        result.extend(collector.calls.into_iter().map(|call| (call, func.id)));
    }
    result
}

/// Parses `HttpMethod` from the last path segment of a call target (`web::get()`).
pub fn method_of_call(call: &ExprCall) -> Option<HttpMethod> {
    call_name(call).and_then(|name| HttpMethod::from_name(&name))
}
