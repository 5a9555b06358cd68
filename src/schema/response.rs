//! Handler response resolution.
//!
//! A handler's response is found by scanning its body for emissions the provider recognises and
//! for calls to indexed response wrappers. The last success-classified candidate wins; emissions
//! inside `Err(..)`, non-2xx emissions and error wrappers are only used when nothing else is
//! found. The chosen payload expression is then resolved to a schema, following local bindings,
//! plain function calls (with parameter to argument injection) and wrapper calls.

use super::{Handler, Schema, SchemaEngine, SchemaKind};
use super::ResponseWrapperDescriptor;
use crate::program::{
    path_segments, return_exprs, tail_expr, FnId, ModuleId, Program, SymbolId, SymbolKind, Target,
    TypeRef,
};
use crate::provider::{call_name, CapabilityProvider, Emission, EmissionStatus};
use log::debug;
use proc_macro2::{Delimiter, TokenStream, TokenTree};
use std::collections::HashMap;
use syn::punctuated::Punctuated;
use syn::visit::Visit;
use syn::{Expr, ExprCall, Lit};

/// Schemas injected for the parameters of the function being resolved.
pub(crate) type Env = HashMap<SymbolId, Schema>;

/// Where a response payload comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ResponseSite<'e> {
    Emission(Emission<'e>),
    Wrapper { func: FnId, call: &'e ExprCall },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'e> {
    pub site: ResponseSite<'e>,
    /// Found inside an `Err(..)` value
    pub in_err: bool,
}

struct EmissionFinder<'p, 'a, 'e> {
    program: &'p Program<'a>,
    provider: &'p dyn CapabilityProvider,
    wrappers: Option<&'p HashMap<FnId, ResponseWrapperDescriptor>>,
    module: ModuleId,
    self_ty: Option<&'p str>,
    in_err: bool,
    found: Vec<Candidate<'e>>,
}

impl<'e> EmissionFinder<'_, '_, 'e> {
    fn wrapper_callee(&self, call: &ExprCall) -> Option<FnId> {
        let wrappers = self.wrappers?;
        let Expr::Path(path) = &*call.func else {
            return None;
        };
        let func = self
            .program
            .resolve_function(self.module, self.self_ty, &path.path)?;
        wrappers.contains_key(&func).then_some(func)
    }
}

impl<'e> Visit<'e> for EmissionFinder<'_, '_, 'e> {
    fn visit_expr(&mut self, expr: &'e Expr) {
        if let Some(emission) = self.provider.emission(expr) {
            self.found.push(Candidate {
                site: ResponseSite::Emission(emission),
                in_err: self.in_err,
            });
            return;
        }
        if let Expr::Call(call) = expr {
            if let Some(func) = self.wrapper_callee(call) {
                self.found.push(Candidate {
                    site: ResponseSite::Wrapper { func, call },
                    in_err: self.in_err,
                });
                return;
            }
            if call_name(call).as_deref() == Some("Err") {
                let outer = std::mem::replace(&mut self.in_err, true);
                syn::visit::visit_expr(self, expr);
                self.in_err = outer;
                return;
            }
        }
        syn::visit::visit_expr(self, expr);
    }

    fn visit_expr_closure(&mut self, _node: &'e syn::ExprClosure) {}

    fn visit_item(&mut self, _item: &'e syn::Item) {}
}

/// Body of a function or closure to scan.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Body<'e> {
    Block(&'e syn::Block),
    Expr(&'e Expr),
}

impl<'p, 'a> SchemaEngine<'p, 'a> {
    /// Resolves the response payload of a route handler.
    pub fn response_schema(&mut self, handler: &Handler<'a>) -> Schema {
        self.begin_pass();

        let program = self.program;
        let (func, body, output) = match *handler {
            Handler::Function(id) => {
                let decl = program.function(id);
                (id, Body::Block(decl.block), &decl.sig.output)
            }
            Handler::Closure { closure, owner, .. } => (owner, Body::Expr(&closure.body), &closure.output),
        };

        let candidates = self.find_candidates(body, func, true);
        let env = Env::new();
        let resolved = match self.pick_candidate(&candidates) {
            Some(site) => self.resolve_site(site, func, &env, 0),
            None => {
                debug!("No response emission found in {}", program.function(func).name);
                Schema::unknown()
            }
        };
        if !resolved.is_opaque() {
            return resolved;
        }

        match self.declared_output(output, func, 0) {
            Some(declared) if !declared.is_opaque() => declared,
            _ => resolved,
        }
    }

    pub(crate) fn find_candidates<'e>(
        &self,
        body: Body<'e>,
        func: FnId,
        with_wrappers: bool,
    ) -> Vec<Candidate<'e>> {
        let decl = self.program.function(func);
        let mut finder = EmissionFinder {
            program: self.program,
            provider: self.provider,
            wrappers: with_wrappers.then_some(&self.wrappers),
            module: decl.module,
            self_ty: decl.self_ty.as_deref(),
            in_err: false,
            found: Vec::new(),
        };
        match body {
            Body::Block(block) => finder.visit_block(block),
            Body::Expr(expr) => finder.visit_expr(expr),
        }
        finder.found
    }

    fn is_success_candidate(&self, candidate: &Candidate<'_>) -> bool {
        if candidate.in_err {
            return false;
        }
        match candidate.site {
            ResponseSite::Emission(emission) => emission.status != EmissionStatus::Other,
            ResponseSite::Wrapper { func, .. } => self
                .wrappers
                .get(&func)
                .map(|wrapper| wrapper.is_success)
                .unwrap_or(false),
        }
    }

    fn pick_candidate<'e>(&self, candidates: &[Candidate<'e>]) -> Option<ResponseSite<'e>> {
        candidates
            .iter()
            .rev()
            .find(|candidate| self.is_success_candidate(candidate))
            .or_else(|| candidates.last())
            .map(|candidate| candidate.site)
    }

    fn resolve_site(&mut self, site: ResponseSite<'_>, func: FnId, env: &Env, depth: usize) -> Schema {
        match site {
            ResponseSite::Emission(emission) => self.resolve_expr(emission.payload, func, env, depth),
            ResponseSite::Wrapper { func: wrapper, call } => {
                let args: Vec<&Expr> = call.args.iter().collect();
                self.resolve_wrapper_call(wrapper, &args, func, env, depth)
            }
        }
    }

    /// Payload type named by a return type, resolved in the scope of `func`.
    fn declared_output(&mut self, output: &syn::ReturnType, func: FnId, depth: usize) -> Option<Schema> {
        let syn::ReturnType::Type(_, ty) = output else {
            return None;
        };
        let payload = self.provider.declared_response_type(ty)?;
        let decl = self.program.function(func);
        Some(self.schema_of_syn(payload, decl.module, &decl.generics, depth))
    }

    /// Resolves the schema of the value an expression evaluates to inside `func`.
    pub(crate) fn resolve_expr(&mut self, expr: &Expr, func: FnId, env: &Env, depth: usize) -> Schema {
        if depth >= self.max_depth() {
            return Schema::depth_limit();
        }

        if let Some(emission) = self.provider.emission(expr) {
            if !std::ptr::eq(emission.payload, expr) {
                return self.resolve_expr(emission.payload, func, env, depth);
            }
        }

        match expr {
            Expr::Lit(expr_lit) => literal_schema(&expr_lit.lit),
            Expr::Paren(paren) => self.resolve_expr(&paren.expr, func, env, depth),
            Expr::Group(group) => self.resolve_expr(&group.expr, func, env, depth),
            Expr::Reference(reference) => self.resolve_expr(&reference.expr, func, env, depth),
            Expr::Try(try_expr) => self.resolve_expr(&try_expr.expr, func, env, depth),
            Expr::Await(await_expr) => self.resolve_expr(&await_expr.base, func, env, depth),
            Expr::Call(call) => self.resolve_call(call, func, env, depth),
            Expr::MethodCall(method) => self.resolve_method_call(method, func, env, depth),
            Expr::Path(path) => self.resolve_path_value(&path.path, func, env, depth),
            Expr::Struct(literal) => self.resolve_struct_literal(literal, func, env, depth),
            Expr::Field(field) => self.resolve_field(field, func, env, depth),
            Expr::Macro(mac) => self.resolve_macro(&mac.mac, func, env, depth),
            Expr::Array(array) => {
                let items = match array.elems.first() {
                    Some(first) => self.resolve_expr(first, func, env, depth + 1),
                    None => Schema::unknown(),
                };
                Schema::array(items)
            }
            Expr::Repeat(repeat) => Schema::array(self.resolve_expr(&repeat.expr, func, env, depth + 1)),
            Expr::Tuple(tuple) => match tuple.elems.first() {
                Some(first) => Schema::array(self.resolve_expr(first, func, env, depth + 1)),
                None => Schema::unknown(),
            },
            Expr::If(expr_if) => {
                let then = match tail_expr(&expr_if.then_branch) {
                    Some(tail) => self.resolve_expr(tail, func, env, depth),
                    None => Schema::unknown(),
                };
                match &expr_if.else_branch {
                    Some((_, else_branch)) if then.is_opaque() => {
                        self.resolve_expr(else_branch, func, env, depth)
                    }
                    _ => then,
                }
            }
            Expr::Match(expr_match) => {
                let mut first = None;
                for arm in &expr_match.arms {
                    let schema = self.resolve_expr(&arm.body, func, env, depth);
                    if !schema.is_opaque() {
                        return schema;
                    }
                    first.get_or_insert(schema);
                }
                first.unwrap_or_else(Schema::unknown)
            }
            Expr::Block(block) => self.resolve_block(&block.block, func, env, depth),
            Expr::Unsafe(block) => self.resolve_block(&block.block, func, env, depth),
            Expr::Async(block) => self.resolve_block(&block.block, func, env, depth),
            Expr::Cast(cast) => {
                let decl = self.program.function(func);
                self.schema_of_syn(&cast.ty, decl.module, &decl.generics, depth)
            }
            Expr::Unary(unary) => match unary.op {
                syn::UnOp::Not(_) => Schema::new(SchemaKind::Boolean),
                _ => self.resolve_expr(&unary.expr, func, env, depth),
            },
            Expr::Binary(binary) => {
                use syn::BinOp::*;
                match binary.op {
                    Eq(_) | Ne(_) | Lt(_) | Le(_) | Gt(_) | Ge(_) | And(_) | Or(_) => {
                        Schema::new(SchemaKind::Boolean)
                    }
                    _ => self.resolve_expr(&binary.left, func, env, depth),
                }
            }
            Expr::Index(index) => {
                let base = self.resolve_expr(&index.expr, func, env, depth);
                match base.items {
                    Some(items) if base.kind == SchemaKind::Array => *items,
                    _ => Schema::unknown(),
                }
            }
            _ => Schema::unknown(),
        }
    }

    fn resolve_block(&mut self, block: &syn::Block, func: FnId, env: &Env, depth: usize) -> Schema {
        match tail_expr(block) {
            Some(tail) => self.resolve_expr(tail, func, env, depth),
            None => Schema::unknown(),
        }
    }

    fn resolve_call(&mut self, call: &ExprCall, func: FnId, env: &Env, depth: usize) -> Schema {
        let Expr::Path(callee) = &*call.func else {
            return Schema::unknown();
        };
        let segments = path_segments(&callee.path);
        let args: Vec<&Expr> = call.args.iter().collect();
        let segs: Vec<&str> = segments.iter().map(String::as_str).collect();

        match (segs.as_slice(), args.as_slice()) {
            ([.., "Some" | "Ok"], [inner]) => return self.resolve_expr(inner, func, env, depth),
            ([.., "String", _], _) => return Schema::new(SchemaKind::String),
            ([.., "Box" | "Arc" | "Rc" | "RefCell" | "Mutex" | "RwLock", "new"], [inner]) => {
                return self.resolve_expr(inner, func, env, depth)
            }
            _ => {}
        }

        let program = self.program;
        let decl = program.function(func);
        if let Some(callee) = program.resolve_function(decl.module, decl.self_ty.as_deref(), &callee.path) {
            if self.wrappers.contains_key(&callee) {
                return self.resolve_wrapper_call(callee, &args, func, env, depth);
            }
            return self.resolve_function_body(callee, &args, func, env, depth);
        }

        // tuple struct constructor, `UserId(7)`
        let is_type_like = segments
            .last()
            .and_then(|last| last.chars().next())
            .map(char::is_uppercase)
            .unwrap_or(false);
        if is_type_like && program.resolve_type(decl.module, &segments).is_some() {
            let named = TypeRef::Named {
                path: segments,
                args: Vec::new(),
            };
            return self.schema_of(&named, decl.module, depth);
        }
        Schema::unknown()
    }

    /// Resolves what `callee` returns for the given call-site arguments.
    pub(crate) fn resolve_function_body(
        &mut self,
        callee: FnId,
        args: &[&Expr],
        caller: FnId,
        env: &Env,
        depth: usize,
    ) -> Schema {
        let program = self.program;
        let decl = program.function(callee);

        if self.call_stack.contains(&callee) {
            debug!("Recursive call to {} while resolving a response", decl.name);
            return self
                .declared_output(&decl.sig.output, callee, depth)
                .unwrap_or_else(Schema::unknown);
        }

        let mut callee_env = Env::new();
        for (index, arg) in args.iter().enumerate() {
            if let Some(param) = program.param_symbol(callee, index) {
                let schema = self.resolve_expr(arg, caller, env, depth);
                callee_env.insert(param, schema);
            }
        }

        let returned = tail_expr(decl.block).or_else(|| return_exprs(decl.block).into_iter().next());
        self.call_stack.push(callee);
        let schema = match returned {
            Some(expr) => self.resolve_expr(expr, callee, &callee_env, depth),
            None => Schema::unknown(),
        };
        self.call_stack.pop();

        if !schema.is_opaque() {
            return schema;
        }
        match self.declared_output(&decl.sig.output, callee, depth) {
            Some(declared) if !declared.is_opaque() => declared,
            _ => schema,
        }
    }

    fn resolve_method_call(
        &mut self,
        call: &syn::ExprMethodCall,
        func: FnId,
        env: &Env,
        depth: usize,
    ) -> Schema {
        let method = call.method.to_string();
        match method.as_str() {
            "clone" | "into" | "unwrap" | "to_owned" | "as_ref" | "expect" | "into_inner"
            | "unwrap_or_default" | "unwrap_or" | "unwrap_or_else" | "borrow" | "as_deref"
            | "ok_or" | "ok_or_else" | "map_err" | "cloned" | "collect" | "into_iter" | "iter"
            | "to_vec" => self.resolve_expr(&call.receiver, func, env, depth),
            "to_string" | "to_lowercase" | "to_uppercase" | "trim" | "format" | "join" => {
                Schema::new(SchemaKind::String)
            }
            "len" | "count" => Schema::new(SchemaKind::Integer),
            "is_empty" | "is_some" | "is_none" | "is_ok" | "is_err" | "contains" => {
                Schema::new(SchemaKind::Boolean)
            }
            _ => {
                let receiver = self.resolve_expr(&call.receiver, func, env, depth);
                let Some(type_name) = receiver.type_name.clone() else {
                    return Schema::unknown();
                };
                let Some(callee) = self.program.method_of(&type_name, &method) else {
                    return Schema::unknown();
                };
                let args: Vec<&Expr> = call.args.iter().collect();
                self.resolve_function_body(callee, &args, func, env, depth)
            }
        }
    }

    fn resolve_path_value(&mut self, path: &syn::Path, func: FnId, env: &Env, depth: usize) -> Schema {
        let program = self.program;
        let decl = program.function(func);
        let segments = path_segments(path);

        if segments.len() == 1 && path.leading_colon.is_none() {
            if segments[0] == "self" {
                return match &decl.self_ty {
                    Some(self_ty) => {
                        let named = TypeRef::Named {
                            path: vec![self_ty.clone()],
                            args: Vec::new(),
                        };
                        self.schema_of(&named, decl.module, depth)
                    }
                    None => Schema::unknown(),
                };
            }
            let ident = &path.segments[0].ident;
            let symbol = program
                .file_of(func)
                .and_then(|file| program.resolve_ident(file, ident));
            if let Some(symbol) = symbol {
                return self.resolve_symbol(symbol, func, env, depth);
            }
        }

        match program.resolve_path(decl.module, &segments) {
            Some(Target::Const(id)) => {
                let constant = program.const_decl(id);
                return self.schema_of_syn(constant.ty, constant.module, &[], depth);
            }
            Some(Target::Type(_)) => {
                let named = TypeRef::Named {
                    path: segments,
                    args: Vec::new(),
                };
                return self.schema_of(&named, decl.module, depth);
            }
            _ => {}
        }

        if segments.len() == 1 {
            return self.resolve_nearest_let(&path.segments[0].ident, func, env, depth);
        }

        // enum variant, `Role::Admin`
        let owner = &segments[..segments.len() - 1];
        if program.resolve_type(decl.module, owner).is_some() {
            let named = TypeRef::Named {
                path: owner.to_vec(),
                args: Vec::new(),
            };
            return self.schema_of(&named, decl.module, depth);
        }
        Schema::unknown().with_description(segments.join("."))
    }

    fn resolve_symbol(&mut self, symbol: SymbolId, func: FnId, env: &Env, depth: usize) -> Schema {
        let injected = env.get(&symbol);
        if let Some(schema) = injected {
            if !schema.is_opaque() {
                return schema.clone();
            }
        }

        let program = self.program;
        let sym = program.symbol(symbol);
        if matches!(sym.kind, SymbolKind::Function(_) | SymbolKind::Closure) {
            return Schema::unknown();
        }
        if !self.visiting.insert(symbol) {
            return Schema::unknown();
        }

        let owner = sym.owner.unwrap_or(func);
        let mut best = injected.cloned().unwrap_or_else(Schema::unknown);
        let resolved = 'resolve: {
            if let Some(ty) = sym.declared_type {
                let decl = program.function(owner);
                let declared = self.schema_of_syn(ty, decl.module, &decl.generics, depth);
                if !declared.is_opaque() {
                    break 'resolve declared;
                }
                if best.kind == SchemaKind::Unknown {
                    best = declared;
                }
            }
            if let Some(init) = sym.init {
                let from_init = self.resolve_expr(init, owner, env, depth);
                if !from_init.is_opaque() {
                    break 'resolve from_init;
                }
            }
            for assigned in program.symbols().assignments_of(symbol).iter().rev() {
                let from_assignment = self.resolve_expr(assigned, owner, env, depth);
                if !from_assignment.is_opaque() {
                    break 'resolve from_assignment;
                }
            }
            best
        };

        self.visiting.remove(&symbol);
        resolved
    }

    /// Fallback for identifiers the binder never saw (inside macro arguments): the closest
    /// preceding `let` of that name in the enclosing function.
    fn resolve_nearest_let(&mut self, ident: &syn::Ident, func: FnId, env: &Env, depth: usize) -> Schema {
        struct LetFinder<'a> {
            name: String,
            before: (usize, usize),
            found: Option<&'a Expr>,
        }

        impl<'a> Visit<'a> for LetFinder<'a> {
            fn visit_local(&mut self, local: &'a syn::Local) {
                syn::visit::visit_local(self, local);
                let pat = match &local.pat {
                    syn::Pat::Type(pat_type) => &*pat_type.pat,
                    other => other,
                };
                let (syn::Pat::Ident(pat_ident), Some(init)) = (pat, &local.init) else {
                    return;
                };
                let end = local.semi_token.spans[0].start();
                if pat_ident.ident == self.name.as_str() && (end.line, end.column) < self.before {
                    self.found = Some(&init.expr);
                }
            }

            fn visit_item(&mut self, _item: &'a syn::Item) {}
        }

        let start = ident.span().start();
        let mut finder = LetFinder {
            name: ident.to_string(),
            before: (start.line, start.column),
            found: None,
        };
        finder.visit_block(self.program.function(func).block);
        match finder.found {
            Some(init) => self.resolve_expr(init, func, env, depth + 1),
            None => Schema::unknown(),
        }
    }

    fn resolve_struct_literal(
        &mut self,
        literal: &syn::ExprStruct,
        func: FnId,
        env: &Env,
        depth: usize,
    ) -> Schema {
        let program = self.program;
        let decl = program.function(func);
        let mut segments = path_segments(&literal.path);
        if segments.len() == 1 && segments[0] == "Self" {
            if let Some(self_ty) = &decl.self_ty {
                segments = vec![self_ty.clone()];
            }
        }

        let type_id = program.resolve_type(decl.module, &segments);
        let mut schema = match type_id {
            Some(_) => {
                let named = TypeRef::Named {
                    path: segments.clone(),
                    args: Vec::new(),
                };
                self.schema_of(&named, decl.module, depth)
            }
            None => {
                let name = segments.last().cloned().unwrap_or_default();
                Schema::object().with_type_name(name)
            }
        };
        if schema.is_depth_limit() {
            return schema;
        }

        for field in &literal.fields {
            let syn::Member::Named(member) = &field.member else {
                continue;
            };
            let name = member.to_string();
            let key = match type_id {
                Some(id) => match self.field_key(id, &name) {
                    Some(key) => key,
                    None => continue,
                },
                None => name,
            };
            let declared = schema.property(&key).map(Schema::is_refinable);
            if declared == Some(false) {
                continue;
            }
            let value = self.resolve_expr(&field.expr, func, env, depth + 1);
            if !value.is_opaque() || declared.is_none() {
                schema.insert_property(key, value);
            }
        }
        schema
    }

    fn resolve_field(&mut self, field: &syn::ExprField, func: FnId, env: &Env, depth: usize) -> Schema {
        let base = self.resolve_expr(&field.base, func, env, depth);
        let member = match &field.member {
            syn::Member::Named(ident) => ident.to_string(),
            syn::Member::Unnamed(index) => index.index.to_string(),
        };

        if let Some(property) = base.property(&member) {
            return property.clone();
        }
        if let Some(type_name) = &base.type_name {
            let module = self.program.function(func).module;
            let key = self
                .program
                .resolve_type(module, &[type_name.clone()])
                .and_then(|id| self.field_key(id, &member));
            if let Some(property) = key.and_then(|key| base.property(&key)) {
                return property.clone();
            }
        }

        let owner = match &*field.base {
            Expr::Path(path) => path_segments(&path.path).join("."),
            _ => base.type_name.clone().unwrap_or_else(|| "expr".to_string()),
        };
        Schema::unknown().with_description(format!("{}.{}", owner, member))
    }

    fn resolve_macro(&mut self, mac: &syn::Macro, func: FnId, env: &Env, depth: usize) -> Schema {
        let name = mac
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_default();

        match name.as_str() {
            "vec" => {
                let elems = mac
                    .parse_body_with(Punctuated::<Expr, syn::Token![,]>::parse_terminated)
                    .ok();
                let items = match elems.as_ref().and_then(|elems| elems.first()) {
                    Some(first) => self.resolve_expr(first, func, env, depth + 1),
                    None => Schema::unknown(),
                };
                Schema::array(items)
            }
            "format" => Schema::new(SchemaKind::String),
            "json" => match json_value(mac.tokens.clone()) {
                Some(value) => self.resolve_json(&value, func, env, depth),
                None => Schema::dynamic(),
            },
            _ => Schema::unknown(),
        }
    }

    fn resolve_json(&mut self, value: &JsonValue, func: FnId, env: &Env, depth: usize) -> Schema {
        if depth >= self.max_depth() {
            return Schema::depth_limit();
        }
        match value {
            JsonValue::Expr(expr) => self.resolve_expr(expr, func, env, depth),
            JsonValue::Object(entries) => {
                let mut schema = Schema::object();
                for (key, entry) in entries {
                    let property = self.resolve_json(entry, func, env, depth + 1);
                    schema.insert_property(key.clone(), property);
                }
                schema
            }
            JsonValue::Unparsed => Schema::dynamic(),
        }
    }
}

fn literal_schema(lit: &Lit) -> Schema {
    let kind = match lit {
        Lit::Str(_) | Lit::ByteStr(_) | Lit::Char(_) => SchemaKind::String,
        Lit::Int(_) | Lit::Byte(_) => SchemaKind::Integer,
        Lit::Float(_) => SchemaKind::Number,
        Lit::Bool(_) => SchemaKind::Boolean,
        _ => SchemaKind::Unknown,
    };
    Schema::new(kind)
}

/// The shape of a `json!` invocation.
#[derive(Debug)]
pub(super) enum JsonValue {
    Expr(Expr),
    Object(Vec<(String, JsonValue)>),
    Unparsed,
}

pub(super) fn json_value(tokens: TokenStream) -> Option<JsonValue> {
    let trees: Vec<TokenTree> = tokens.into_iter().collect();
    if let [TokenTree::Group(group)] = trees.as_slice() {
        if group.delimiter() == Delimiter::Brace {
            return Some(JsonValue::Object(json_entries(group.stream())));
        }
    }
    let stream: TokenStream = trees.into_iter().collect();
    syn::parse2::<Expr>(stream).ok().map(JsonValue::Expr)
}

fn json_entries(tokens: TokenStream) -> Vec<(String, JsonValue)> {
    let mut parts: Vec<Vec<TokenTree>> = vec![Vec::new()];
    for tree in tokens {
        match &tree {
            TokenTree::Punct(punct) if punct.as_char() == ',' => parts.push(Vec::new()),
            _ => {
                if let Some(current) = parts.last_mut() {
                    current.push(tree);
                }
            }
        }
    }

    let mut entries = Vec::new();
    for part in parts {
        let mut trees = part.into_iter();
        let key = match trees.next() {
            Some(TokenTree::Literal(lit)) => match syn::parse_str::<syn::LitStr>(&lit.to_string()) {
                Ok(lit_str) => lit_str.value(),
                Err(_) => continue,
            },
            Some(TokenTree::Ident(ident)) => ident.to_string(),
            _ => continue,
        };
        match trees.next() {
            Some(TokenTree::Punct(punct)) if punct.as_char() == ':' => {}
            _ => continue,
        }
        let value = json_value(trees.collect()).unwrap_or(JsonValue::Unparsed);
        entries.push((key, value));
    }
    entries
}
