use crate::document::{HttpMethod, ParamLocation};
use crate::program::Program;
use crate::provider::{
    call_name, call_path_ends_with, collect_calls, declared_payload_type, peel, status_class,
    string_literal, type_argument, type_name, type_name_in, CapabilityProvider, ChildRouter,
    Emission, EmissionStatus, GroupCall, MethodRegistration, RootRouter, SignatureBinding,
};
use syn::{Expr, ExprCall, ExprMethodCall};

use log::debug;

/// Axum capability provider
pub struct AxumProvider;

const CONTEXT_TYPES: &[&str] = &[
    "Request",
    "HeaderMap",
    "State",
    "Extension",
    "Path",
    "Query",
    "Json",
    "Form",
    "TypedHeader",
    "ConnectInfo",
    "Multipart",
    "Method",
    "Uri",
    "OriginalUri",
];

const JSON_WRAPPERS: &[&str] = &["Json"];

const OPAQUE_RESPONSES: &[&str] = &["Response", "StatusCode", "Redirect", "HeaderMap", "Body"];

impl CapabilityProvider for AxumProvider {
    fn framework_name(&self) -> &'static str {
        "axum"
    }

    fn find_root_routers<'a>(&self, program: &Program<'a>) -> Vec<RootRouter<'a>> {
        let mut roots = Vec::new();

        // `axum::serve(listener, app)`
        for (call, func) in collect_calls(program) {
            if call_path_ends_with(call, &["serve"]) && call.args.len() >= 2 {
                roots.push(RootRouter::Expr {
                    expr: &call.args[1],
                    func,
                });
            }
        }

        // `Server::bind(..).serve(app.into_make_service())`
        for chain in program.symbols().chains() {
            for call in &chain.calls {
                let method = call.method.to_string();
                if method == "into_make_service" || method == "into_make_service_with_connect_info" {
                    roots.push(RootRouter::Expr {
                        expr: &call.receiver,
                        func: chain.func,
                    });
                }
            }
        }

        if roots.is_empty() {
            // router-building functions nobody calls
            for func in program.functions() {
                let returns_router = match &func.sig.output {
                    syn::ReturnType::Type(_, ty) => self.is_router_parameter(ty),
                    syn::ReturnType::Default => false,
                };
                if returns_router && func.params.is_empty() && program.reference_count(func.id) == 0 {
                    debug!("Using unreferenced router function as root: {}", func.name);
                    roots.push(RootRouter::Function(func.id));
                }
            }
        }

        roots
    }

    fn group_call<'e>(&self, call: &'e ExprMethodCall) -> Option<GroupCall<'e>> {
        match call.method.to_string().as_str() {
            "nest" if call.args.len() == 2 => Some(GroupCall {
                prefix: string_literal(&call.args[0])?,
                child: ChildRouter::Expr(&call.args[1]),
            }),
            "merge" if call.args.len() == 1 => Some(GroupCall {
                prefix: String::new(),
                child: ChildRouter::Expr(&call.args[0]),
            }),
            _ => None,
        }
    }

    fn http_method_call<'e>(&self, call: &'e ExprMethodCall) -> Vec<MethodRegistration<'e>> {
        // .route(path, method_router)
        if call.method != "route" || call.args.len() < 2 {
            return Vec::new();
        }
        let Some(path) = string_literal(&call.args[0]) else {
            debug!("Skipping route with a non-literal path");
            return Vec::new();
        };

        let mut registrations = Vec::new();
        collect_method_router(&call.args[1], &path, &mut registrations);
        registrations
    }

    fn router_constructor(&self, call: &ExprCall) -> Option<String> {
        if call_path_ends_with(call, &["Router", "new"]) {
            Some(String::new())
        } else {
            None
        }
    }

    fn is_router_parameter(&self, ty: &syn::Type) -> bool {
        type_name_in(ty, &["Router"])
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

    fn emission<'e>(&self, expr: &'e Expr) -> Option<Emission<'e>> {
        match peel(expr) {
            Expr::Call(call) if call.args.len() == 1 => match call_name(call)?.as_str() {
                "Json" | "Html" => Some(Emission {
                    payload: &call.args[0],
                    status: EmissionStatus::Unspecified,
                }),
                "Ok" => self.emission(&call.args[0]),
                _ => None,
            },
            // (StatusCode::CREATED, Json(user))
            Expr::Tuple(tuple) if tuple.elems.len() >= 2 => {
                let status = status_class(&tuple.elems[0]);
                tuple.elems.iter().skip(1).find_map(|elem| {
                    self.emission(elem).map(|emission| Emission {
                        payload: emission.payload,
                        status,
                    })
                })
            }
            Expr::MethodCall(method) if method.method == "into_response" || method.method == "into" => {
                self.emission(&method.receiver)
            }
            _ => None,
        }
    }

    fn declared_response_type<'t>(&self, ty: &'t syn::Type) -> Option<&'t syn::Type> {
        declared_payload_type(ty, JSON_WRAPPERS, OPAQUE_RESPONSES)
    }
}

/// Collects `get(a).post(b)` and `axum::routing::get(a)` registrations of a method router.
fn collect_method_router<'e>(expr: &'e Expr, path: &str, out: &mut Vec<MethodRegistration<'e>>) {
    match peel(expr) {
        Expr::Call(call) => {
            let Some(name) = call_name(call) else {
                return;
            };
            if let (Some(method), Some(handler)) = (HttpMethod::from_name(&name), call.args.first()) {
                out.push(MethodRegistration {
                    method: Some(method),
                    path: path.to_string(),
                    handler,
                });
            }
        }
        Expr::MethodCall(method_call) => {
            // receiver first, so registrations keep source order
            collect_method_router(&method_call.receiver, path, out);
            let name = method_call.method.to_string();
            if let (Some(method), Some(handler)) =
                (HttpMethod::from_name(&name), method_call.args.first())
            {
                out.push(MethodRegistration {
                    method: Some(method),
                    path: path.to_string(),
                    handler,
                });
            }
        }
        _ => {}
    }
}
