use crate::document::{HttpMethod, ParamLocation};
use crate::program::Program;
use crate::provider::{
    attribute_args, call_name, call_path_ends_with, declared_payload_type, method_of_call, peel,
    status_class, status_name_class, string_literal, type_argument, type_name, type_name_in,
    BindingKind, BindingMethod, CapabilityProvider, ChildRouter, Emission, EmissionStatus,
    GroupCall, MethodRegistration, RootRouter, SignatureBinding,
};
use syn::{Expr, ExprCall, ExprMethodCall};

use log::debug;

/// Actix-Web capability provider
pub struct ActixProvider;

const CONTEXT_TYPES: &[&str] = &[
    "HttpRequest",
    "Data",
    "Path",
    "Query",
    "Json",
    "Form",
    "Payload",
    "ReqData",
    "Bytes",
];

const JSON_WRAPPERS: &[&str] = &["Json"];

const OPAQUE_RESPONSES: &[&str] = &["HttpResponse", "HttpResponseBuilder", "Either"];

impl ActixProvider {
    /// True for `web::scope(..)`, `web::resource(..)` and chains built on them.
    fn is_scope_expr(&self, expr: &Expr) -> bool {
        match peel(expr) {
            Expr::Call(call) => self.router_constructor(call).is_some(),
            Expr::MethodCall(method) => self.is_scope_expr(&method.receiver),
            _ => false,
        }
    }

    /// `web::get().to(handler)` -> (GET, handler)
    fn method_route<'e>(&self, expr: &'e Expr) -> Option<(HttpMethod, &'e Expr)> {
        let Expr::MethodCall(to_call) = peel(expr) else {
            return None;
        };
        if to_call.method != "to" || to_call.args.len() != 1 {
            return None;
        }
        let method = route_method(&to_call.receiver)?;
        Some((method, &to_call.args[0]))
    }
}

/// HTTP method of `web::get()`, `web::method(Method::POST)` or a chain on them (`.guard(..)`).
fn route_method(expr: &Expr) -> Option<HttpMethod> {
    match peel(expr) {
        Expr::Call(call) => {
            if call_path_ends_with(call, &["method"]) {
                let arg = call.args.first()?;
                let Expr::Path(path) = peel(arg) else {
                    return None;
                };
                let name = path.path.segments.last()?.ident.to_string();
                return HttpMethod::from_name(&name);
            }
            method_of_call(call)
        }
        Expr::MethodCall(method) => route_method(&method.receiver),
        _ => None,
    }
}

impl CapabilityProvider for ActixProvider {
    fn framework_name(&self) -> &'static str {
        "actix-web"
    }

    fn find_root_routers<'a>(&self, program: &Program<'a>) -> Vec<RootRouter<'a>> {
        program
            .symbols()
            .chains()
            .iter()
            .filter(|chain| match chain.root {
                Expr::Call(call) => call_path_ends_with(call, &["App", "new"]),
                _ => false,
            })
            .map(|chain| RootRouter::Expr {
                expr: chain.expr,
                func: chain.func,
            })
            .collect()
    }

    fn group_call<'e>(&self, call: &'e ExprMethodCall) -> Option<GroupCall<'e>> {
        match call.method.to_string().as_str() {
            // App::service(web::scope("/api")...), handlers are registrations
            "service" if call.args.len() == 1 && self.is_scope_expr(&call.args[0]) => {
                Some(GroupCall {
                    prefix: String::new(),
                    child: ChildRouter::Expr(&call.args[0]),
                })
            }
            _ => None,
        }
    }

    fn http_method_call<'e>(&self, call: &'e ExprMethodCall) -> Vec<MethodRegistration<'e>> {
        let method_name = call.method.to_string();
        match method_name.as_str() {
            // .route("/path", web::get().to(handler))
            "route" if call.args.len() == 2 => {
                let Some(path) = string_literal(&call.args[0]) else {
                    debug!("Skipping route with a non-literal path");
                    return Vec::new();
                };
                self.method_route(&call.args[1])
                    .map(|(method, handler)| MethodRegistration {
                        method: Some(method),
                        path,
                        handler,
                    })
                    .into_iter()
                    .collect()
            }
            // web::resource("/path").route(web::get().to(handler))
            "route" if call.args.len() == 1 => self
                .method_route(&call.args[0])
                .map(|(method, handler)| MethodRegistration {
                    method: Some(method),
                    path: String::new(),
                    handler,
                })
                .into_iter()
                .collect(),
            // .service(handler) with a #[get("/path")] attribute
            "service" if call.args.len() == 1 && matches!(peel(&call.args[0]), Expr::Path(_)) => {
                vec![MethodRegistration {
                    method: None,
                    path: String::new(),
                    handler: &call.args[0],
                }]
            }
            _ => Vec::new(),
        }
    }

    fn delegate_call<'e>(&self, call: &'e ExprMethodCall) -> Option<&'e Expr> {
        if call.method == "configure" && call.args.len() == 1 {
            Some(&call.args[0])
        } else {
            None
        }
    }

    fn router_constructor(&self, call: &ExprCall) -> Option<String> {
        if call_path_ends_with(call, &["App", "new"]) {
            return Some(String::new());
        }
        let is_scope = call_path_ends_with(call, &["web", "scope"])
            || call_path_ends_with(call, &["web", "resource"])
            || call_path_ends_with(call, &["Scope", "new"])
            || call_path_ends_with(call, &["Resource", "new"]);
        if is_scope {
            return call.args.first().and_then(string_literal);
        }
        None
    }

    fn is_router_parameter(&self, ty: &syn::Type) -> bool {
        type_name_in(ty, &["ServiceConfig", "Scope"])
    }

    fn is_context_parameter(&self, ty: &syn::Type) -> bool {
        type_name_in(ty, CONTEXT_TYPES)
    }

    fn signature_binding<'t>(&self, ty: &'t syn::Type) -> Option<SignatureBinding<'t>> {
        let name = type_name(ty)?;
        let (location, required) = match name.as_str() {
            "Path" => (ParamLocation::Path, true),
            "Query" => (ParamLocation::Query, false),
            "Json" | "Form" => (ParamLocation::Body, true),
            _ => return None,
        };
        Some(SignatureBinding {
            location,
            inner: type_argument(ty, 0)?,
            required,
            source: name,
        })
    }

    fn binding_method<'e>(
        &self,
        call: &'e ExprMethodCall,
        previous: Option<&ExprMethodCall>,
    ) -> Option<BindingMethod<'e>> {
        // req.match_info().get("id") / req.match_info().query("id")
        let after_match_info = previous.map(|p| p.method == "match_info").unwrap_or(false);
        match call.method.to_string().as_str() {
            "get" | "query" if after_match_info => Some(BindingMethod {
                location: ParamLocation::Path,
                kind: BindingKind::SingleKey,
                key: call.args.first().and_then(string_literal),
                type_arg: None,
                required: true,
                source: format!("match_info().{}", call.method),
            }),
            // the raw query string, usually fed to `web::Query::<HashMap<..>>::from_query`
            "query_string" if call.args.is_empty() => Some(BindingMethod {
                location: ParamLocation::Query,
                kind: BindingKind::KeyMap,
                key: None,
                type_arg: None,
                required: false,
                source: "query_string".to_string(),
            }),
            _ => None,
        }
    }

    fn emission<'e>(&self, expr: &'e Expr) -> Option<Emission<'e>> {
        match peel(expr) {
            Expr::Call(call) if call.args.len() == 1 => match call_name(call)?.as_str() {
                "Json" => Some(Emission {
                    payload: &call.args[0],
                    status: EmissionStatus::Unspecified,
                }),
                "Ok" => self.emission(&call.args[0]),
                _ => None,
            },
            // HttpResponse::Ok().json(user), HttpResponse::build(status).body(text)
            Expr::MethodCall(method)
                if (method.method == "json" || method.method == "body") && method.args.len() == 1 =>
            {
                let status = builder_status(&method.receiver)?;
                Some(Emission {
                    payload: &method.args[0],
                    status,
                })
            }
            _ => None,
        }
    }

    fn declared_response_type<'t>(&self, ty: &'t syn::Type) -> Option<&'t syn::Type> {
        declared_payload_type(ty, JSON_WRAPPERS, OPAQUE_RESPONSES)
    }

    fn attribute_route(&self, attrs: &[syn::Attribute]) -> Option<(HttpMethod, String)> {
        attrs.iter().find_map(|attr| {
            let attr_name = attr.path().segments.last()?.ident.to_string();
            let method = HttpMethod::from_name(&attr_name)?;
            let path = attribute_args(attr).first().and_then(string_literal)?;
            Some((method, path))
        })
    }
}

/// Status of the response builder at the root of `HttpResponse::Ok().insert_header(..).json(x)`.
fn builder_status(expr: &Expr) -> Option<EmissionStatus> {
    match peel(expr) {
        Expr::Call(call) => {
            let path = crate::provider::call_path(call)?;
            let len = path.len();
            if len < 2 || path[len - 2] != "HttpResponse" {
                return None;
            }
            if path[len - 1] == "build" {
                return Some(call.args.first().map(status_class).unwrap_or(EmissionStatus::Unspecified));
            }
            Some(status_name_class(&path[len - 1]))
        }
        Expr::MethodCall(method) => builder_status(&method.receiver),
        _ => None,
    }
}
