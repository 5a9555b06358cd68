use crate::document::{HttpMethod, ParamLocation};
use crate::program::{Program, SymbolKind};
use crate::provider::{
    call_name, call_path_ends_with, declared_payload_type, peel, status_class, string_literal,
    type_name_in, BindingKind, BindingMethod, CapabilityProvider, ChildRouter, Emission,
    EmissionStatus, GroupCall, MethodRegistration, RootRouter,
};
use syn::visit::Visit;
use syn::{Expr, ExprCall, ExprMethodCall};

use log::debug;

/// Tide capability provider
pub struct TideProvider;

const JSON_WRAPPERS: &[&str] = &[];

const OPAQUE_RESPONSES: &[&str] = &["Response", "Body", "Redirect", "StatusCode"];

impl CapabilityProvider for TideProvider {
    fn framework_name(&self) -> &'static str {
        "tide"
    }

    fn find_root_routers<'a>(&self, program: &Program<'a>) -> Vec<RootRouter<'a>> {
        let table = program.symbols();

        // `let mut app = tide::new();`
        let servers: Vec<_> = table
            .iter()
            .filter(|symbol| symbol.kind == SymbolKind::Local)
            .filter(|symbol| match symbol.init.map(peel) {
                Some(Expr::Call(call)) => self.router_constructor(call).is_some(),
                _ => false,
            })
            .map(|symbol| symbol.id)
            .collect();

        // sub-apps are constructed the same way; prefer the ones that listen
        let listening: Vec<_> = servers
            .iter()
            .copied()
            .filter(|server| {
                table
                    .chains_rooted_at(*server)
                    .any(|chain| chain.calls.iter().any(|call| call.method == "listen"))
            })
            .collect();

        let roots = if listening.is_empty() { servers } else { listening };
        debug!("Found {} tide server roots", roots.len());
        roots.into_iter().map(RootRouter::Symbol).collect()
    }

    fn group_call<'e>(&self, call: &'e ExprMethodCall) -> Option<GroupCall<'e>> {
        match call.method.to_string().as_str() {
            "at" if call.args.len() == 1 => Some(GroupCall {
                prefix: string_literal(&call.args[0])?,
                child: ChildRouter::Result,
            }),
            // route.nest(sub_app)
            "nest" if call.args.len() == 1 => Some(GroupCall {
                prefix: String::new(),
                child: ChildRouter::Expr(&call.args[0]),
            }),
            _ => None,
        }
    }

    fn http_method_call<'e>(&self, call: &'e ExprMethodCall) -> Vec<MethodRegistration<'e>> {
        // route.get(handler)
        let Some(method) = HttpMethod::from_name(&call.method.to_string()) else {
            return Vec::new();
        };
        if call.args.len() != 1 {
            return Vec::new();
        }
        vec![MethodRegistration {
            method: Some(method),
            path: String::new(),
            handler: &call.args[0],
        }]
    }

    fn router_constructor(&self, call: &ExprCall) -> Option<String> {
        let is_server = call_path_ends_with(call, &["tide", "new"])
            || call_path_ends_with(call, &["tide", "with_state"])
            || call_path_ends_with(call, &["Server", "new"])
            || call_path_ends_with(call, &["Server", "with_state"]);
        if is_server {
            Some(String::new())
        } else {
            None
        }
    }

    fn is_router_parameter(&self, ty: &syn::Type) -> bool {
        type_name_in(ty, &["Server", "Route"])
    }

    fn is_context_parameter(&self, ty: &syn::Type) -> bool {
        type_name_in(ty, &["Request"])
    }

    fn binding_method<'e>(
        &self,
        call: &'e ExprMethodCall,
        previous: Option<&ExprMethodCall>,
    ) -> Option<BindingMethod<'e>> {
        let method = call.method.to_string();
        let after = |name: &str| previous.map(|p| p.method == name).unwrap_or(false);

        // req.url().query_pairs(), optionally narrowed to one key by a filter
        if method == "query_pairs" && after("url") {
            return Some(BindingMethod {
                location: ParamLocation::Query,
                kind: BindingKind::KeyMap,
                key: None,
                type_arg: None,
                required: false,
                source: "url().query_pairs()".to_string(),
            });
        }
        if method == "filter" && after("query_pairs") {
            return Some(BindingMethod {
                location: ParamLocation::Query,
                kind: BindingKind::KeyArray,
                key: Some(compared_key(call.args.first()?)?),
                type_arg: None,
                required: false,
                source: "url().query_pairs().filter()".to_string(),
            });
        }

        let type_arg = call.turbofish.as_ref().and_then(|turbofish| {
            turbofish.args.iter().find_map(|arg| match arg {
                syn::GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
        });
        let (location, kind, required) = match method.as_str() {
            "param" => (ParamLocation::Path, BindingKind::SingleKey, true),
            "query" => (ParamLocation::Query, BindingKind::Structure, false),
            "body_json" | "body_form" => (ParamLocation::Body, BindingKind::Structure, true),
            "body_string" => (ParamLocation::Body, BindingKind::Text, true),
            _ => return None,
        };
        Some(BindingMethod {
            location,
            kind,
            key: call.args.first().and_then(string_literal),
            type_arg,
            required,
            source: method,
        })
    }

    fn emission<'e>(&self, expr: &'e Expr) -> Option<Emission<'e>> {
        match peel(expr) {
            Expr::Call(call) => {
                // Body::from_json(&user)
                if call_path_ends_with(call, &["Body", "from_json"]) {
                    return call.args.first().map(|payload| Emission {
                        payload,
                        status: EmissionStatus::Unspecified,
                    });
                }
                if call_name(call).as_deref() != Some("Ok") || call.args.len() != 1 {
                    return None;
                }
                let payload = &call.args[0];
                if let Some(inner) = self.emission(payload) {
                    return Some(inner);
                }
                let body = match peel(payload) {
                    Expr::MethodCall(into) if into.method == "into" && into.args.is_empty() => {
                        &*into.receiver
                    }
                    _ => payload,
                };
                // Ok(json!({..}).into()), Ok(user): tide turns these into the body
                match peel(body) {
                    Expr::Macro(_) | Expr::Struct(_) | Expr::Path(_) => Some(Emission {
                        payload: body,
                        status: EmissionStatus::Unspecified,
                    }),
                    _ => None,
                }
            }
            Expr::MethodCall(method) => match method.method.to_string().as_str() {
                // Response::builder(200).body(body).build()
                "body" if method.args.len() == 1 => {
                    let status = builder_status(&method.receiver)?;
                    let payload = &method.args[0];
                    Some(match self.emission(payload) {
                        Some(inner) => Emission {
                            payload: inner.payload,
                            status,
                        },
                        None => Emission { payload, status },
                    })
                }
                "build" | "into" if method.args.is_empty() => self.emission(&method.receiver),
                _ => None,
            },
            _ => None,
        }
    }

    fn declared_response_type<'t>(&self, ty: &'t syn::Type) -> Option<&'t syn::Type> {
        // tide::Result defaults its Ok type to Response
        declared_payload_type(ty, JSON_WRAPPERS, OPAQUE_RESPONSES)
    }
}

fn builder_status(expr: &Expr) -> Option<EmissionStatus> {
    match peel(expr) {
        Expr::Call(call) if call_path_ends_with(call, &["Response", "builder"]) => Some(
            call.args
                .first()
                .map(status_class)
                .unwrap_or(EmissionStatus::Unspecified),
        ),
        Expr::MethodCall(method) => builder_status(&method.receiver),
        _ => None,
    }
}

/// Key a `filter` closure compares against, `|(key, _)| key == "tag"`.
fn compared_key(expr: &Expr) -> Option<String> {
    struct Compared(Option<String>);

    impl<'ast> Visit<'ast> for Compared {
        fn visit_expr_binary(&mut self, node: &'ast syn::ExprBinary) {
            if self.0.is_none() && matches!(node.op, syn::BinOp::Eq(_)) {
                self.0 = string_literal(&node.right).or_else(|| string_literal(&node.left));
            }
            syn::visit::visit_expr_binary(self, node);
        }
    }

    let Expr::Closure(closure) = peel(expr) else {
        return None;
    };
    let mut compared = Compared(None);
    compared.visit_expr(&closure.body);
    compared.0
}
