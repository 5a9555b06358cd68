//! Router flow tracing.
//!
//! Discovery starts from the root routers a [`CapabilityProvider`] finds and follows every router
//! value through the program: method chains on it, `let` bindings that receive a chain result,
//! group calls that hand routes to a child router, and route-group functions that take the router
//! as a parameter. Each traced router is a [`RouteTask`]; tasks are processed breadth first from a
//! queue.
//!
//! Every task carries the set of router bindings and functions already entered on its own branch.
//! Child tasks get a copy of that set, so recursion through mutually calling route-group functions
//! or router-returning functions stops without sibling branches hiding each other's routes.

use crate::config::AnalyzerConfig;
use crate::document::{HandlerKey, RouteKey, RouteRecord, RouteStore};
use crate::program::{
    path_segments, return_exprs, tail_expr, ArgUse, CallSite, FnId, ModuleId, Program, Site,
    SymbolId, SymbolKind,
};
use crate::provider::{
    peel, type_segment, CapabilityProvider, ChildRouter, MethodRegistration, RootRouter,
};
use crate::schema::{Handler, Schema, SchemaEngine};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use syn::spanned::Spanned;
use syn::{Expr, ExprMethodCall};

const MAX_RECEIVER_DEPTH: u8 = 8;

/// Router bindings and functions entered on one traversal branch.
pub type Visited = HashSet<SymbolId>;

/// One router value to trace.
#[derive(Debug, Clone)]
pub struct RouteTask {
    /// Path prefix accumulated on the way to this router
    pub path: String,
    pub router: SymbolId,
    pub visited: Visited,
    pub origin_module: ModuleId,
    /// Whether the binding's `let` initializer still needs tracing
    pub trace_init: bool,
}

/// A function that takes a router and registers routes on it.
#[derive(Debug, Clone)]
pub struct RouteGroupFunction {
    pub module_name: String,
    pub function_name: String,
    pub func: FnId,
    pub router_param_index: usize,
}

struct ResolvedHandler<'a> {
    handler: Option<Handler<'a>>,
    symbol: Option<SymbolId>,
    name: String,
    module: ModuleId,
}

/// Discovers every route reachable from the provider's root routers.
///
/// # Arguments
///
/// * `program` - The bound program
/// * `provider` - Framework knowledge for the framework being analysed
/// * `config` - Schema depth and wrapper classification settings
///
/// # Returns
///
/// One record per distinct method, path and handler, in discovery order. Empty, with a warning
/// logged, when no root router is found.
pub fn discover(
    program: &Program<'_>,
    provider: &dyn CapabilityProvider,
    config: &AnalyzerConfig,
) -> Vec<RouteRecord> {
    RouteTracer::new(program, provider, config).trace()
}

/// Traces router values and emits route records.
pub struct RouteTracer<'p, 'a> {
    program: &'p Program<'a>,
    provider: &'p dyn CapabilityProvider,
    engine: SchemaEngine<'p, 'a>,
    group_functions: HashMap<String, RouteGroupFunction>,
    queue: VecDeque<RouteTask>,
    store: RouteStore,
}

impl<'p, 'a> RouteTracer<'p, 'a> {
    pub fn new(
        program: &'p Program<'a>,
        provider: &'p dyn CapabilityProvider,
        config: &'p AnalyzerConfig,
    ) -> Self {
        let group_functions = index_group_functions(program, provider);
        debug!("Indexed {} route-group functions", group_functions.len());

        Self {
            program,
            provider,
            engine: SchemaEngine::new(program, provider, config),
            group_functions,
            queue: VecDeque::new(),
            store: RouteStore::new(),
        }
    }

    /// Runs discovery to completion.
    pub fn trace(mut self) -> Vec<RouteRecord> {
        let roots = self.provider.find_root_routers(self.program);
        if roots.is_empty() {
            warn!(
                "No {} router found, no routes will be reported",
                self.provider.framework_name()
            );
        }

        for root in roots {
            let visited = Visited::new();
            match root {
                RootRouter::Symbol(symbol) => {
                    let module = self.symbol_module(symbol);
                    self.push_task(String::new(), symbol, &visited, module, true);
                }
                RootRouter::Expr { expr, func } => {
                    self.trace_router_expr(expr, func, "", &visited);
                }
                RootRouter::Function(func) => {
                    self.trace_function_returns(func, "", &visited);
                }
            }
        }

        while let Some(task) = self.queue.pop_front() {
            self.process_task(task);
        }

        info!("Discovered {} routes", self.store.len());
        self.store.into_records()
    }

    fn push_task(
        &mut self,
        path: String,
        router: SymbolId,
        visited: &Visited,
        origin_module: ModuleId,
        trace_init: bool,
    ) {
        if visited.contains(&router) {
            return;
        }
        self.queue.push_back(RouteTask {
            path,
            router,
            visited: visited.clone(),
            origin_module,
            trace_init,
        });
    }

    fn process_task(&mut self, mut task: RouteTask) {
        if !task.visited.insert(task.router) {
            return;
        }
        let program = self.program;
        let symbol = program.symbol(task.router);
        debug!(
            "Tracing router `{}` under `{}` from {}",
            symbol.name,
            display_path(&task.path),
            program.module(task.origin_module).qualified_name()
        );

        if task.trace_init {
            if let (Some(init), Some(owner)) = (symbol.init, symbol.owner) {
                self.trace_router_expr(init, owner, &task.path, &task.visited);
            }
        }

        for chain in program.symbols().chains_rooted_at(task.router) {
            self.walk_chain(&chain.calls, chain.func, &task.path, &task.visited, chain.bound_to);
        }

        for arg_use in program.symbols().arg_uses_of(task.router) {
            let Some((callee, index)) = self.argument_target(arg_use) else {
                debug!("Skipping call with an unresolved callee");
                continue;
            };
            self.enter_group_function(callee, Some(index), &task.path, &task.visited);
            if let Some(bound) = arg_use.bound_to {
                let module = self.symbol_module(bound);
                self.push_task(task.path.clone(), bound, &task.visited, module, false);
            }
        }
    }

    /// Walks a method chain on a router, innermost call first.
    fn walk_chain(
        &mut self,
        calls: &[&'a ExprMethodCall],
        func: FnId,
        path: &str,
        visited: &Visited,
        bound_to: Option<SymbolId>,
    ) {
        let provider = self.provider;
        let mut current = path.to_string();

        for &call in calls {
            if let Some(group) = provider.group_call(call) {
                let combined = combine_paths(&current, &group.prefix);
                match group.child {
                    ChildRouter::Result => current = combined,
                    ChildRouter::Expr(child) => self.trace_router_expr(child, func, &combined, visited),
                }
                continue;
            }

            let registrations = provider.http_method_call(call);
            if !registrations.is_empty() {
                for registration in registrations {
                    self.register(registration, &current, func, visited);
                }
                continue;
            }

            if let Some(callee) = provider.delegate_call(call) {
                self.trace_delegate(callee, func, &current, visited);
            }
            // anything else passes the router through unchanged
        }

        if let Some(bound) = bound_to {
            let module = self.symbol_module(bound);
            self.push_task(current, bound, visited, module, false);
        }
    }

    /// Traces an expression whose value is a router.
    fn trace_router_expr(&mut self, expr: &'a Expr, func: FnId, path: &str, visited: &Visited) {
        let program = self.program;
        match peel(expr) {
            Expr::Path(expr_path) => {
                let Some(ident) = expr_path.path.get_ident() else {
                    debug!("Skipping router path `{}`", path_segments(&expr_path.path).join("::"));
                    return;
                };
                match program
                    .file_of(func)
                    .and_then(|file| program.resolve_ident(file, ident))
                {
                    Some(symbol) => {
                        let module = self.symbol_module(symbol);
                        self.push_task(path.to_string(), symbol, visited, module, true);
                    }
                    None => debug!("Router `{}` does not resolve to a binding", ident),
                }
            }
            Expr::Call(call) => {
                if let Some(segment) = self.provider.router_constructor(call) {
                    debug!("Router constructed at `{}`", display_path(&combine_paths(path, &segment)));
                    return;
                }
                match self.resolve_callee(call, func) {
                    Some(callee) => self.trace_function_returns(callee, path, visited),
                    None => debug!("Router-producing call does not resolve to a function"),
                }
            }
            Expr::MethodCall(method) => {
                // `api.mount(router)` on a program type
                if let Some(callee) = self.resolve_method(method, func) {
                    self.trace_function_returns(callee, path, visited);
                    return;
                }
                let (root, calls) = split_chain(method);
                match peel(root) {
                    // a chain on a binding belongs to that binding's task
                    Expr::Path(_) => self.trace_router_expr(root, func, path, visited),
                    Expr::Call(call) => {
                        let base = match self.provider.router_constructor(call) {
                            Some(segment) => combine_paths(path, &segment),
                            None => {
                                self.trace_router_expr(root, func, path, visited);
                                path.to_string()
                            }
                        };
                        self.walk_chain(&calls, func, &base, visited, None);
                    }
                    _ => self.walk_chain(&calls, func, path, visited, None),
                }
            }
            Expr::Block(block) => {
                if let Some(tail) = tail_expr(&block.block) {
                    self.trace_router_expr(tail, func, path, visited);
                }
            }
            Expr::Closure(closure) => self.trace_router_expr(&closure.body, func, path, visited),
            Expr::If(expr_if) => {
                if let Some(tail) = tail_expr(&expr_if.then_branch) {
                    self.trace_router_expr(tail, func, path, visited);
                }
                if let Some((_, else_branch)) = &expr_if.else_branch {
                    self.trace_router_expr(else_branch, func, path, visited);
                }
            }
            _ => debug!("Unsupported router expression"),
        }
    }

    /// Traces the values a router-returning function produces.
    fn trace_function_returns(&mut self, func: FnId, path: &str, visited: &Visited) {
        let program = self.program;
        let decl = program.function(func);
        if visited.contains(&decl.symbol) {
            return;
        }
        let mut visited = visited.clone();
        visited.insert(decl.symbol);

        let tail = tail_expr(decl.block);
        let mut returned: Vec<&'a Expr> = tail.into_iter().collect();
        // a final `return x;` is also the tail
        returned.extend(
            return_exprs(decl.block)
                .into_iter()
                .filter(|expr| !tail.map(|tail| std::ptr::eq(tail, *expr)).unwrap_or(false)),
        );
        for expr in returned {
            self.trace_router_expr(expr, func, path, &visited);
        }
    }

    /// `configure(f)`: the callee registers routes on the router it is handed.
    fn trace_delegate(&mut self, callee: &'a Expr, func: FnId, path: &str, visited: &Visited) {
        let program = self.program;
        match peel(callee) {
            Expr::Path(expr_path) => {
                let self_ty = program.function(func).self_ty.as_deref();
                let module = program.function(func).module;
                match program.resolve_function(module, self_ty, &expr_path.path) {
                    Some(target) => self.enter_group_function(target, None, path, visited),
                    None => debug!(
                        "Delegate `{}` does not resolve to a function",
                        path_segments(&expr_path.path).join("::")
                    ),
                }
            }
            Expr::Closure(closure) => {
                let Some(syn::Pat::Ident(pat_ident)) = closure.inputs.first().map(strip_pat_type) else {
                    return;
                };
                let param = program
                    .file_of(func)
                    .and_then(|file| program.resolve_ident(file, &pat_ident.ident));
                if let Some(param) = param {
                    let module = program.function(func).module;
                    self.push_task(path.to_string(), param, visited, module, false);
                }
            }
            _ => debug!("Unsupported delegate expression"),
        }
    }

    /// Recurses into a route-group function with its router parameter bound.
    ///
    /// `arg_index` is the argument position the router was passed at, when known.
    fn enter_group_function(
        &mut self,
        callee: FnId,
        arg_index: Option<usize>,
        path: &str,
        visited: &Visited,
    ) {
        let program = self.program;
        let qualified = program.qualified_fn_name(callee);
        let Some(group) = self.group_functions.get(&qualified) else {
            return;
        };
        if arg_index.map(|index| index != group.router_param_index).unwrap_or(false) {
            return;
        }
        let router_param_index = group.router_param_index;

        let decl = program.function(callee);
        if visited.contains(&decl.symbol) {
            debug!("Route-group function `{}` already entered on this branch", qualified);
            return;
        }
        let Some(param) = program.param_symbol(callee, router_param_index) else {
            debug!("Router parameter of `{}` is not a plain binding", qualified);
            return;
        };

        let mut visited = visited.clone();
        visited.insert(decl.symbol);
        self.push_task(path.to_string(), param, &visited, decl.module, false);
    }

    /// Emits the route for one method registration.
    fn register(
        &mut self,
        registration: MethodRegistration<'a>,
        base: &str,
        func: FnId,
        visited: &Visited,
    ) {
        let program = self.program;
        let resolved = self.resolve_handler(registration.handler, func);
        let mut path = combine_paths(base, &registration.path);

        let method = match registration.method {
            Some(method) => method,
            None => {
                let attribute = match resolved.handler {
                    Some(Handler::Function(id)) => {
                        self.provider.attribute_route(program.function(id).attrs)
                    }
                    _ => None,
                };
                match attribute {
                    Some((method, attribute_path)) => {
                        path = combine_paths(&path, &attribute_path);
                        method
                    }
                    None => {
                        // not a routed handler, maybe a router value
                        if resolved.handler.is_none() {
                            self.trace_router_expr(registration.handler, func, base, visited);
                        }
                        return;
                    }
                }
            }
        };
        if path.is_empty() {
            path = "/".to_string();
        }

        let handler_site = match resolved.symbol {
            Some(_) => None,
            None => program
                .file_of(func)
                .map(|file| Site::new(file, registration.handler.span())),
        };
        let handler_key = match resolved.symbol {
            Some(symbol) => HandlerKey::Symbol(symbol),
            None => HandlerKey::Unresolved(handler_site),
        };
        let key: RouteKey = (method, path.clone(), handler_key);
        if self.store.contains(&key) {
            return;
        }

        let (request_params, response_schema) = match &resolved.handler {
            Some(handler) => (
                self.engine.request_params(handler, &path),
                self.engine.response_schema(handler),
            ),
            None => {
                warn!("Handler for {} {} could not be resolved", method, path);
                (Vec::new(), Schema::unknown())
            }
        };

        let module = program.module(resolved.module);
        debug!("Route {} {} -> {}", method, path, resolved.name);
        self.store.insert(RouteRecord {
            method,
            path,
            handler_symbol: resolved.symbol,
            handler_site,
            handler: resolved.name,
            module_name: module.name().to_string(),
            module_path: module.qualified_name(),
            request_params,
            response_schema,
        });
    }

    fn resolve_handler(&self, expr: &'a Expr, func: FnId) -> ResolvedHandler<'a> {
        let program = self.program;
        let decl = program.function(func);
        let unresolved = |name: String| ResolvedHandler {
            handler: None,
            symbol: None,
            name,
            module: decl.module,
        };

        match peel(expr) {
            Expr::Closure(closure) => {
                let symbol = program
                    .file_of(func)
                    .and_then(|file| program.symbols().closure_at(Site::new(file, closure.or1_token.spans[0])));
                match symbol {
                    Some(symbol) => ResolvedHandler {
                        handler: Some(Handler::Closure {
                            symbol,
                            closure,
                            owner: func,
                        }),
                        symbol: Some(symbol),
                        name: "anonymous".to_string(),
                        module: decl.module,
                    },
                    None => unresolved("anonymous".to_string()),
                }
            }
            Expr::Path(expr_path) => {
                let segments = path_segments(&expr_path.path);
                let name = segments.last().cloned().unwrap_or_default();

                // a local binding holding a closure
                if let Some(ident) = expr_path.path.get_ident() {
                    let local = program
                        .file_of(func)
                        .and_then(|file| program.resolve_ident(file, ident))
                        .map(|symbol| program.symbol(symbol));
                    if let Some(local) = local {
                        match (local.kind, local.init) {
                            (SymbolKind::Function(id), _) => return self.function_handler(id),
                            (SymbolKind::Local, Some(init)) if matches!(peel(init), Expr::Closure(_)) => {
                                return self.resolve_handler(init, local.owner.unwrap_or(func));
                            }
                            (SymbolKind::Local | SymbolKind::Param { .. }, _) => return unresolved(name),
                            _ => {}
                        }
                    }
                }

                if let Some(id) =
                    program.resolve_function(decl.module, decl.self_ty.as_deref(), &expr_path.path)
                {
                    return self.function_handler(id);
                }

                let owner_type = segments.len().checked_sub(2).map(|i| segments[i].as_str());
                match self.best_candidate(&name, owner_type) {
                    Some(id) => {
                        debug!(
                            "Handler `{}` resolved by name to `{}`",
                            segments.join("::"),
                            program.qualified_fn_name(id)
                        );
                        self.function_handler(id)
                    }
                    None => unresolved(name),
                }
            }
            // `handler.layer(..)`, `handler.with_state(..)`
            Expr::MethodCall(method) => self.resolve_handler(&method.receiver, func),
            _ => unresolved("unknown".to_string()),
        }
    }

    fn function_handler(&self, id: FnId) -> ResolvedHandler<'a> {
        let decl = self.program.function(id);
        ResolvedHandler {
            handler: Some(Handler::Function(id)),
            symbol: Some(decl.symbol),
            name: decl.name.clone(),
            module: decl.module,
        }
    }

    /// Picks among same-named functions when the path does not resolve.
    fn best_candidate(&self, name: &str, owner_type: Option<&str>) -> Option<FnId> {
        let program = self.program;
        let candidates = program.functions_named(name);
        let owned: Vec<FnId> = match owner_type {
            Some(owner) => candidates
                .iter()
                .copied()
                .filter(|id| program.function(*id).self_ty.as_deref() == Some(owner))
                .collect(),
            None => Vec::new(),
        };
        let pool = if owned.is_empty() { candidates } else { &owned[..] };

        pool.iter()
            .map(|id| (self.handler_score(*id), program.qualified_fn_name(*id), *id))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, _, id)| id)
    }

    fn handler_score(&self, id: FnId) -> usize {
        let decl = self.program.function(id);
        let module = self.program.module(decl.module);
        let module_path = module.qualified_name();

        let mut score = module.path.len().saturating_sub(1);
        if decl
            .params
            .iter()
            .any(|param| self.provider.is_context_parameter(param.ty))
        {
            score += 100;
        }
        if module_path.contains("api") {
            score += 50;
        }
        if !module_path.contains("route") {
            score += 20;
        }
        score
    }

    fn resolve_callee(&self, call: &syn::ExprCall, func: FnId) -> Option<FnId> {
        let Expr::Path(expr_path) = peel(&call.func) else {
            return None;
        };
        let decl = self.program.function(func);
        self.program
            .resolve_function(decl.module, decl.self_ty.as_deref(), &expr_path.path)
    }

    /// The function an argument is passed to and the parameter index it binds.
    ///
    /// `Type::method(recv, x)` passes its receiver first; a router in that slot binds no
    /// parameter.
    fn argument_target(&self, arg_use: &ArgUse<'a>) -> Option<(FnId, usize)> {
        match arg_use.call {
            CallSite::Function(call) => {
                let callee = self.resolve_callee(call, arg_use.func)?;
                if self.program.function(callee).sig.receiver().is_some() {
                    Some((callee, arg_use.index.checked_sub(1)?))
                } else {
                    Some((callee, arg_use.index))
                }
            }
            CallSite::Method(call) => Some((self.resolve_method(call, arg_use.func)?, arg_use.index)),
        }
    }

    /// Resolves `recv.method(..)` through the receiver's type.
    fn resolve_method(&self, call: &'a ExprMethodCall, func: FnId) -> Option<FnId> {
        let type_name = self.receiver_type(&call.receiver, func, 0)?;
        self.program.method_of(&type_name, &call.method.to_string())
    }

    /// Name of the program type a receiver expression evaluates to, when it can be told.
    fn receiver_type(&self, expr: &'a Expr, func: FnId, depth: u8) -> Option<String> {
        if depth > MAX_RECEIVER_DEPTH {
            return None;
        }
        let program = self.program;
        let decl = program.function(func);
        match peel(expr) {
            Expr::Path(expr_path) => {
                let segments = path_segments(&expr_path.path);
                if segments.len() == 1 && segments[0] == "self" {
                    return decl.self_ty.clone();
                }
                let local = expr_path.path.get_ident().and_then(|ident| {
                    program
                        .file_of(func)
                        .and_then(|file| program.resolve_ident(file, ident))
                });
                match local {
                    Some(symbol) => {
                        let symbol = program.symbol(symbol);
                        if let Some(ty) = symbol.declared_type {
                            return type_segment(ty).map(|segment| segment.ident.to_string());
                        }
                        let init = symbol.init?;
                        self.receiver_type(init, symbol.owner.unwrap_or(func), depth + 1)
                    }
                    // a unit struct value
                    None => program
                        .resolve_type(decl.module, &segments)
                        .map(|id| program.type_decl(id).name.clone()),
                }
            }
            Expr::Struct(expr_struct) => expr_struct.path.segments.last().map(|s| s.ident.to_string()),
            Expr::Call(call) => {
                let callee = program.function(self.resolve_callee(call, func)?);
                match &callee.sig.output {
                    syn::ReturnType::Type(_, ty) => {
                        let name = type_segment(ty)?.ident.to_string();
                        if name == "Self" {
                            callee.self_ty.clone()
                        } else {
                            Some(name)
                        }
                    }
                    syn::ReturnType::Default => None,
                }
            }
            _ => None,
        }
    }

    fn symbol_module(&self, symbol: SymbolId) -> ModuleId {
        let program = self.program;
        let symbol = program.symbol(symbol);
        match (symbol.kind, symbol.owner) {
            (SymbolKind::Function(id), _) | (_, Some(id)) => program.function(id).module,
            _ => program.modules()[0].id,
        }
    }
}

/// Pre-indexes every function with a router-capable parameter by qualified name.
pub fn index_group_functions(
    program: &Program<'_>,
    provider: &dyn CapabilityProvider,
) -> HashMap<String, RouteGroupFunction> {
    program
        .functions()
        .iter()
        .filter_map(|func| {
            let param = func
                .params
                .iter()
                .find(|param| provider.is_router_parameter(param.ty))?;
            let group = RouteGroupFunction {
                module_name: program.module(func.module).qualified_name(),
                function_name: func.name.clone(),
                func: func.id,
                router_param_index: param.index,
            };
            Some((program.qualified_fn_name(func.id), group))
        })
        .collect()
}

/// Joins two route path pieces.
///
/// Repeated separators collapse and a trailing separator is dropped; an empty side yields the
/// other one.
pub fn combine_paths(base: &str, segment: &str) -> String {
    let joined = match (base.is_empty(), segment.is_empty()) {
        (true, true) => return String::new(),
        (true, false) => segment.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, segment),
    };

    let parts: Vec<&str> = joined.split('/').filter(|part| !part.is_empty()).collect();
    if joined.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Innermost receiver of a method chain and the calls on it, innermost first.
fn split_chain(outer: &ExprMethodCall) -> (&Expr, Vec<&ExprMethodCall>) {
    let mut calls = vec![outer];
    let mut receiver = &*outer.receiver;
    while let Expr::MethodCall(inner) = peel(receiver) {
        calls.push(inner);
        receiver = &*inner.receiver;
    }
    calls.reverse();
    (receiver, calls)
}

fn strip_pat_type(pat: &syn::Pat) -> &syn::Pat {
    match pat {
        syn::Pat::Type(pat_type) => &pat_type.pat,
        other => other,
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{HttpMethod, ParamLocation};
    use crate::parser::ParsedFile;
    use crate::provider::actix::ActixProvider;
    use crate::provider::axum::AxumProvider;
    use crate::provider::tide::TideProvider;
    use crate::schema::SchemaKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn parsed(path: &str, code: &str) -> ParsedFile {
        ParsedFile {
            path: PathBuf::from(path),
            syntax_tree: syn::parse_file(code).expect("Failed to parse test code"),
        }
    }

    fn routes(records: &[RouteRecord]) -> Vec<(HttpMethod, &str, &str)> {
        records
            .iter()
            .map(|r| (r.method, r.path.as_str(), r.handler.as_str()))
            .collect()
    }

    #[test]
    fn test_combine_paths() {
        assert_eq!(combine_paths("/api", "v1"), "/api/v1");
        assert_eq!(combine_paths("", "/x"), "/x");
        assert_eq!(combine_paths("/api/", "/v1/"), "/api/v1");
        assert_eq!(combine_paths("/api", ""), "/api");
        assert_eq!(combine_paths("", ""), "");
        assert_eq!(combine_paths("/", "/"), "/");
        assert_eq!(combine_paths("//users", "{id}"), "/users/{id}");
    }

    #[test]
    fn test_tide_end_to_end() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            pub struct User { pub id: u64, pub name: String }

            fn respond<T: Serialize>(req: &Request<()>, data: T) -> tide::Result {
                Ok(Body::from_json(&data)?.into())
            }

            async fn get_user(req: Request<()>) -> tide::Result {
                let id: u64 = req.param("id")?.parse()?;
                let name = "alice".to_string();
                respond(&req, User { id, name })
            }

            #[async_std::main]
            async fn main() -> tide::Result<()> {
                let mut root = tide::new();
                let mut g = root.at("/api");
                g.at("/users/:id").get(get_user);
                root.listen("127.0.0.1:8080").await?;
                Ok(())
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &TideProvider, &config);

        assert_eq!(routes(&records), vec![(HttpMethod::Get, "/api/users/:id", "get_user")]);
        let record = &records[0];
        assert_eq!(record.request_params.len(), 1);
        assert_eq!(record.request_params[0].location, ParamLocation::Path);
        assert_eq!(record.request_params[0].name, "id");

        let response = &record.response_schema;
        assert_eq!(response.kind, SchemaKind::Object);
        let keys: Vec<_> = response.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name"]);
        assert_eq!(response.properties["id"].kind, SchemaKind::Integer);
        assert_eq!(response.properties["name"].kind, SchemaKind::String);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            fn users(app: &mut Server<()>) {
                app.at("/users").get(list_users);
                posts(app);
            }

            fn posts(app: &mut Server<()>) {
                app.at("/posts").get(list_posts);
                users(app);
            }

            async fn main() -> tide::Result<()> {
                let mut app = tide::new();
                users(&mut app);
                posts(&mut app);
                app.listen("0.0.0.0:80").await?;
                Ok(())
            }

            async fn list_users(req: Request<()>) -> tide::Result { Ok("users".into()) }
            async fn list_posts(req: Request<()>) -> tide::Result { Ok("posts".into()) }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();

        let first = discover(&program, &TideProvider, &config);
        let second = discover(&program, &TideProvider, &config);
        assert_eq!(
            routes(&first),
            vec![
                (HttpMethod::Get, "/users", "list_users"),
                (HttpMethod::Get, "/posts", "list_posts"),
            ]
        );
        assert_eq!(first, second);

        let keys: HashSet<_> = first.iter().map(RouteRecord::key).collect();
        assert_eq!(keys.len(), first.len());
    }

    #[test]
    fn test_axum_nest_across_modules() {
        let files = vec![
            parsed(
                "/proj/src/main.rs",
                r#"
                mod api;

                #[tokio::main]
                async fn main() {
                    let app = Router::new()
                        .route("/", get(|| async { "ok" }))
                        .nest("/api", api::router())
                        .layer(TraceLayer::new_for_http());
                    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
                    axum::serve(listener, app).await.unwrap();
                }
                "#,
            ),
            parsed(
                "/proj/src/api.rs",
                r#"
                pub struct Item { pub id: u32 }

                pub fn router() -> Router {
                    let items = Router::new().route("/items/:id", get(get_item).delete(delete_item));
                    Router::new().nest("/v1", items)
                }

                async fn get_item(Path(id): Path<u32>) -> Json<Item> {
                    Json(Item { id })
                }

                async fn delete_item(Path(id): Path<u32>) -> StatusCode {
                    StatusCode::NO_CONTENT
                }
                "#,
            ),
        ];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &AxumProvider, &config);

        assert_eq!(
            routes(&records),
            vec![
                (HttpMethod::Get, "/", "anonymous"),
                (HttpMethod::Get, "/api/v1/items/:id", "get_item"),
                (HttpMethod::Delete, "/api/v1/items/:id", "delete_item"),
            ]
        );
        let get_item = &records[1];
        assert_eq!(get_item.module_path, "crate::api");
        assert_eq!(get_item.module_name, "api");
        assert_eq!(get_item.response_schema.type_name.as_deref(), Some("Item"));
        assert_eq!(get_item.request_params[0].schema.kind, SchemaKind::Integer);
    }

    #[test]
    fn test_actix_scopes_configure_and_attributes() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            #[get("/health")]
            async fn health() -> impl Responder { HttpResponse::Ok().finish() }

            async fn list_users() -> impl Responder { HttpResponse::Ok().finish() }
            async fn create_user() -> impl Responder { HttpResponse::Created().finish() }

            fn config(cfg: &mut web::ServiceConfig) {
                cfg.service(
                    web::scope("/users")
                        .route("", web::get().to(list_users))
                        .route("", web::post().to(create_user)),
                );
            }

            #[actix_web::main]
            async fn main() -> std::io::Result<()> {
                HttpServer::new(|| {
                    App::new()
                        .service(health)
                        .service(web::scope("/api").configure(config))
                })
                .bind(("127.0.0.1", 8080))?
                .run()
                .await
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &ActixProvider, &config);

        assert_eq!(
            routes(&records),
            vec![
                (HttpMethod::Get, "/health", "health"),
                (HttpMethod::Get, "/api/users", "list_users"),
                (HttpMethod::Post, "/api/users", "create_user"),
            ]
        );
    }

    #[test]
    fn test_ambiguous_handler_prefers_api_module() {
        let files = vec![
            parsed(
                "/proj/src/main.rs",
                r#"
                mod api;
                mod routes;

                async fn main() -> tide::Result<()> {
                    let mut app = tide::new();
                    app.at("/items").get(list);
                    app.listen("0.0.0.0:80").await?;
                    Ok(())
                }
                "#,
            ),
            parsed(
                "/proj/src/routes.rs",
                "pub async fn list(req: Request<()>) -> tide::Result { Ok(\"a\".into()) }",
            ),
            parsed(
                "/proj/src/api.rs",
                "pub async fn list(req: Request<()>) -> tide::Result { Ok(\"b\".into()) }",
            ),
        ];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &TideProvider, &config);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module_path, "crate::api");
    }

    #[test]
    fn test_unresolved_handler_is_kept() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            async fn main() -> tide::Result<()> {
                let mut app = tide::new();
                app.at("/missing").post(external::handler);
                app.listen("0.0.0.0:80").await?;
                Ok(())
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &TideProvider, &config);

        assert_eq!(routes(&records), vec![(HttpMethod::Post, "/missing", "handler")]);
        assert_eq!(records[0].handler_symbol, None);
        assert_eq!(records[0].response_schema.kind, SchemaKind::Unknown);
    }

    #[test]
    fn test_group_function_index() {
        let files = vec![parsed(
            "/proj/src/lib.rs",
            r#"
            pub struct Api;
            impl Api {
                pub fn mount(&self, state: AppState, router: Router) -> Router { router }
            }
            pub fn plain(x: u32) -> u32 { x }
            "#,
        )];
        let program = Program::build(&files);
        let index = index_group_functions(&program, &AxumProvider);

        assert_eq!(index.len(), 1);
        let group = &index["crate::Api::mount"];
        assert_eq!(group.function_name, "mount");
        assert_eq!(group.router_param_index, 1);
    }

    #[test]
    fn test_unresolved_handlers_on_one_path_stay_apart() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            async fn main() -> tide::Result<()> {
                let mut app = tide::new();
                app.at("/x").get(ext_a::handler);
                app.at("/x").get(ext_b::other);
                app.listen("0.0.0.0:80").await?;
                Ok(())
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &TideProvider, &config);

        assert_eq!(
            routes(&records),
            vec![
                (HttpMethod::Get, "/x", "handler"),
                (HttpMethod::Get, "/x", "other"),
            ]
        );
    }

    #[test]
    fn test_tide_group_method_on_a_value() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            pub struct Routes;

            impl Routes {
                pub fn new() -> Self { Routes }

                fn mount(&self, app: &mut Server<()>) {
                    app.at("/notes").get(list_notes);
                    self.mount_admin(app);
                }

                fn mount_admin(&self, app: &mut Server<()>) {
                    app.at("/admin").get(admin);
                }
            }

            async fn list_notes(req: Request<()>) -> tide::Result { Ok("notes".into()) }
            async fn admin(req: Request<()>) -> tide::Result { Ok("admin".into()) }

            async fn main() -> tide::Result<()> {
                let mut app = tide::new();
                let routes = Routes::new();
                routes.mount(&mut app);
                app.listen("0.0.0.0:80").await?;
                Ok(())
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &TideProvider, &config);

        assert_eq!(
            routes(&records),
            vec![
                (HttpMethod::Get, "/notes", "list_notes"),
                (HttpMethod::Get, "/admin", "admin"),
            ]
        );
    }

    #[test]
    fn test_tide_group_method_called_by_path() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            pub struct Routes;

            impl Routes {
                fn mount(&self, app: &mut Server<()>) {
                    app.at("/notes").get(list_notes);
                }
            }

            async fn list_notes(req: Request<()>) -> tide::Result { Ok("notes".into()) }

            async fn main() -> tide::Result<()> {
                let mut app = tide::new();
                let routes = Routes;
                Routes::mount(&routes, &mut app);
                app.listen("0.0.0.0:80").await?;
                Ok(())
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &TideProvider, &config);

        assert_eq!(routes(&records), vec![(HttpMethod::Get, "/notes", "list_notes")]);
    }

    #[test]
    fn test_axum_router_returned_by_a_method() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            pub struct Api { prefix: String }

            impl Api {
                pub fn mount(&self, router: Router) -> Router {
                    router.route("/items", get(list_items))
                }
            }

            async fn list_items() -> Json<Vec<u32>> { Json(Vec::new()) }

            #[tokio::main]
            async fn main() {
                let api = Api { prefix: String::new() };
                let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
                axum::serve(listener, api.mount(Router::new())).await.unwrap();
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &AxumProvider, &config);

        assert_eq!(routes(&records), vec![(HttpMethod::Get, "/items", "list_items")]);
        assert_eq!(records[0].response_schema.kind, SchemaKind::Array);
    }

    #[test]
    fn test_axum_router_passed_to_a_method_binding() {
        let files = vec![parsed(
            "/proj/src/main.rs",
            r#"
            pub struct Api;

            impl Api {
                fn mount(&self, router: Router) -> Router {
                    router.route("/items", get(list_items))
                }
            }

            async fn list_items() -> &'static str { "items" }

            #[tokio::main]
            async fn main() {
                let api = Api;
                let app = Router::new();
                let app = api.mount(app);
                let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
                axum::serve(listener, app).await.unwrap();
            }
            "#,
        )];
        let program = Program::build(&files);
        let config = AnalyzerConfig::default();
        let records = discover(&program, &AxumProvider, &config);

        assert_eq!(routes(&records), vec![(HttpMethod::Get, "/items", "list_items")]);
    }
}
