//! Scope-aware binder.
//!
//! Walks every function body once, allocating a [`SymbolId`] per declaration site (function,
//! parameter, `let` binding, closure, closure parameter) and recording which symbol every
//! identifier use-site refers to. Along the way it records the facts the tracer needs about
//! router-valued symbols: method-call chains keyed by their root receiver, calls that pass a
//! symbol as an argument, and the binding that receives a chain's or a call's result.

use super::{FileId, FnId, ModuleId, Program, Site, SymbolId, Target};
use std::collections::{HashMap, HashSet};
use syn::visit::Visit;
use syn::{Expr, Pat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function(FnId),
    Param { func: FnId, index: usize },
    Local,
    Closure,
    ClosureParam,
}

/// A declared binding.
#[derive(Debug)]
pub struct Symbol<'a> {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub site: Option<Site>,
    /// Enclosing function
    pub owner: Option<FnId>,
    /// Type annotation, or the type reached through a destructuring extractor pattern
    pub declared_type: Option<&'a syn::Type>,
    /// `let` initializer
    pub init: Option<&'a Expr>,
    pub closure: Option<&'a syn::ExprClosure>,
}

/// A maximal method-call chain `root.a(..).b(..)`.
#[derive(Debug)]
pub struct CallChain<'a> {
    /// Outermost call of the chain
    pub expr: &'a Expr,
    /// Innermost receiver, with references and `?` peeled
    pub root: &'a Expr,
    pub root_symbol: Option<SymbolId>,
    /// Calls from the innermost outwards
    pub calls: Vec<&'a syn::ExprMethodCall>,
    /// Binding that receives the chain's value
    pub bound_to: Option<SymbolId>,
    pub func: FnId,
}

/// A function call `f(..)` or a method call `recv.f(..)`.
#[derive(Debug, Clone, Copy)]
pub enum CallSite<'a> {
    Function(&'a syn::ExprCall),
    Method(&'a syn::ExprMethodCall),
}

impl<'a> CallSite<'a> {
    pub fn args(&self) -> &'a syn::punctuated::Punctuated<Expr, syn::Token![,]> {
        match self {
            CallSite::Function(call) => &call.args,
            CallSite::Method(call) => &call.args,
        }
    }
}

/// A call that passes a symbol as an argument.
#[derive(Debug)]
pub struct ArgUse<'a> {
    pub symbol: SymbolId,
    pub expr: &'a Expr,
    pub call: CallSite<'a>,
    /// Argument position, not counting a method call's receiver
    pub index: usize,
    pub bound_to: Option<SymbolId>,
    pub func: FnId,
}

/// Symbols and the facts recorded about them.
#[derive(Debug, Default)]
pub struct SymbolTable<'a> {
    symbols: Vec<Symbol<'a>>,
    uses: HashMap<Site, SymbolId>,
    params: HashMap<(FnId, usize), SymbolId>,
    closures: HashMap<Site, SymbolId>,
    chains: Vec<CallChain<'a>>,
    chains_by_root: HashMap<SymbolId, Vec<usize>>,
    arg_uses: Vec<ArgUse<'a>>,
    arg_uses_by_symbol: HashMap<SymbolId, Vec<usize>>,
    assignments: HashMap<SymbolId, Vec<&'a Expr>>,
    references: HashMap<SymbolId, usize>,
}

impl<'a> SymbolTable<'a> {
    fn alloc(&mut self, symbol: Symbol<'a>) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol { id, ..symbol });
        id
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol<'a> {
        &self.symbols[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol<'a>> {
        self.symbols.iter()
    }

    pub fn binding_at(&self, site: Site) -> Option<SymbolId> {
        self.uses.get(&site).copied()
    }

    pub fn param_symbol(&self, func: FnId, index: usize) -> Option<SymbolId> {
        self.params.get(&(func, index)).copied()
    }

    pub fn closure_at(&self, site: Site) -> Option<SymbolId> {
        self.closures.get(&site).copied()
    }

    pub fn chains(&self) -> &[CallChain<'a>] {
        &self.chains
    }

    /// Chains whose root receiver is `symbol`, in source order.
    pub fn chains_rooted_at(&self, symbol: SymbolId) -> impl Iterator<Item = &CallChain<'a>> {
        self.chains_by_root
            .get(&symbol)
            .into_iter()
            .flatten()
            .map(move |idx| &self.chains[*idx])
    }

    /// Calls that receive `symbol` as an argument, in source order.
    pub fn arg_uses_of(&self, symbol: SymbolId) -> impl Iterator<Item = &ArgUse<'a>> {
        self.arg_uses_by_symbol
            .get(&symbol)
            .into_iter()
            .flatten()
            .map(move |idx| &self.arg_uses[*idx])
    }

    /// Right-hand sides of plain `name = value` assignments.
    pub fn assignments_of(&self, symbol: SymbolId) -> &[&'a Expr] {
        self.assignments
            .get(&symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reference_count(&self, symbol: SymbolId) -> usize {
        self.references.get(&symbol).copied().unwrap_or(0)
    }
}

/// Builds the symbol table for an indexed program.
pub fn bind<'a>(program: &Program<'a>) -> SymbolTable<'a> {
    let mut table = SymbolTable::default();

    for func in program.functions() {
        let id = table.alloc(Symbol {
            id: SymbolId(0),
            name: func.name.clone(),
            kind: SymbolKind::Function(func.id),
            site: program
                .module(func.module)
                .file
                .map(|file| Site::new(file, func.sig.ident.span())),
            owner: None,
            declared_type: None,
            init: None,
            closure: None,
        });
        debug_assert_eq!(id, func.symbol);
    }

    for func in program.functions() {
        let Some(file) = program.module(func.module).file else {
            continue;
        };
        let mut binder = Binder {
            program,
            table: &mut table,
            file,
            module: func.module,
            func: func.id,
            self_ty: func.self_ty.clone(),
            scopes: vec![HashMap::new()],
            inner_calls: HashSet::new(),
        };
        for param in &func.params {
            let symbol = binder.bind_pattern(
                param.pat,
                Some(param.ty),
                None,
                SymbolKind::Param {
                    func: func.id,
                    index: param.index,
                },
            );
            if let (Some(symbol), Pat::Ident(_)) = (symbol, param.pat) {
                binder.table.params.insert((func.id, param.index), symbol);
            }
        }
        binder.visit_block(func.block);
    }

    table
}

struct Binder<'a, 'p> {
    program: &'p Program<'a>,
    table: &'p mut SymbolTable<'a>,
    file: FileId,
    module: ModuleId,
    func: FnId,
    self_ty: Option<String>,
    scopes: Vec<HashMap<String, SymbolId>>,
    /// Method calls already recorded as the inner link of a chain
    inner_calls: HashSet<Site>,
}

impl<'a, 'p> Binder<'a, 'p> {
    fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn declare(&mut self, ident: &syn::Ident, symbol: Symbol<'a>) -> SymbolId {
        let name = ident.to_string();
        let id = self.table.alloc(symbol);
        self.table.uses.insert(Site::new(self.file, ident.span()), id);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, id);
        }
        id
    }

    /// Binds every identifier in a pattern; returns the symbol of a plain identifier pattern.
    fn bind_pattern(
        &mut self,
        pat: &'a Pat,
        declared_type: Option<&'a syn::Type>,
        init: Option<&'a Expr>,
        kind: SymbolKind,
    ) -> Option<SymbolId> {
        match pat {
            Pat::Ident(pat_ident) => {
                let id = self.declare(
                    &pat_ident.ident,
                    Symbol {
                        id: SymbolId(0),
                        name: pat_ident.ident.to_string(),
                        kind,
                        site: Some(Site::new(self.file, pat_ident.ident.span())),
                        owner: Some(self.func),
                        declared_type,
                        init,
                        closure: None,
                    },
                );
                if let Some((_, subpat)) = &pat_ident.subpat {
                    self.bind_pattern(subpat, None, None, kind);
                }
                Some(id)
            }
            Pat::Type(pat_type) => self.bind_pattern(&pat_type.pat, Some(&pat_type.ty), init, kind),
            Pat::Reference(pat_ref) => {
                let inner = declared_type.and_then(|ty| match ty {
                    syn::Type::Reference(reference) => Some(&*reference.elem),
                    _ => None,
                });
                self.bind_pattern(&pat_ref.pat, inner, None, kind)
            }
            Pat::Paren(paren) => self.bind_pattern(&paren.pat, declared_type, init, kind),
            Pat::TupleStruct(tuple_struct) => {
                // `Json(body): Json<CreateUser>` binds `body` to the wrapped type
                let inner = if tuple_struct.elems.len() == 1 {
                    declared_type.and_then(first_type_argument)
                } else {
                    None
                };
                for elem in &tuple_struct.elems {
                    self.bind_pattern(elem, inner, None, kind);
                }
                None
            }
            Pat::Tuple(tuple) => {
                let elem_types: Vec<Option<&'a syn::Type>> = match declared_type {
                    Some(syn::Type::Tuple(tuple_ty)) => tuple_ty.elems.iter().map(Some).collect(),
                    _ => Vec::new(),
                };
                for (i, elem) in tuple.elems.iter().enumerate() {
                    let ty = elem_types.get(i).copied().flatten();
                    self.bind_pattern(elem, ty, None, kind);
                }
                None
            }
            Pat::Struct(pat_struct) => {
                for field in &pat_struct.fields {
                    self.bind_pattern(&field.pat, None, None, kind);
                }
                None
            }
            Pat::Slice(slice) => {
                for elem in &slice.elems {
                    self.bind_pattern(elem, None, None, kind);
                }
                None
            }
            Pat::Or(or) => {
                for case in &or.cases {
                    self.bind_pattern(case, None, None, kind);
                }
                None
            }
            _ => None,
        }
    }

    fn with_scope(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(HashMap::new());
        f(self);
        self.scopes.pop();
    }

    fn resolve_path_expr(&mut self, path: &syn::Path) {
        let Some(last) = path.segments.last() else {
            return;
        };
        let site = Site::new(self.file, last.ident.span());

        if path.segments.len() == 1 && path.leading_colon.is_none() {
            if let Some(local) = self.lookup(&last.ident.to_string()) {
                self.table.uses.insert(site, local);
                return;
            }
        }

        let target = self
            .program
            .resolve_function(self.module, self.self_ty.as_deref(), path)
            .map(Target::Function);
        if let Some(Target::Function(func)) = target {
            let symbol = self.program.function(func).symbol;
            self.table.uses.insert(site, symbol);
            *self.table.references.entry(symbol).or_insert(0) += 1;
        }
    }

    fn record_chain(&mut self, expr: &'a Expr, call: &'a syn::ExprMethodCall) {
        let site = Site::new(self.file, call.method.span());
        if self.inner_calls.contains(&site) {
            return;
        }

        let mut calls = vec![call];
        let mut receiver = peel_link(&call.receiver);
        while let Expr::MethodCall(inner) = receiver {
            self.inner_calls
                .insert(Site::new(self.file, inner.method.span()));
            calls.push(inner);
            receiver = peel_link(&inner.receiver);
        }
        calls.reverse();

        let root_symbol = match receiver {
            Expr::Path(path) if path.path.segments.len() == 1 && path.qself.is_none() => {
                self.lookup(&path.path.segments[0].ident.to_string())
            }
            _ => None,
        };

        let idx = self.table.chains.len();
        self.table.chains.push(CallChain {
            expr,
            root: receiver,
            root_symbol,
            calls,
            bound_to: None,
            func: self.func,
        });
        if let Some(symbol) = root_symbol {
            self.table.chains_by_root.entry(symbol).or_default().push(idx);
        }
    }

    fn record_arg_uses(&mut self, expr: &'a Expr, call: CallSite<'a>) {
        for (index, arg) in call.args().iter().enumerate() {
            let Some(symbol) = self.local_symbol_of(arg) else {
                continue;
            };
            let idx = self.table.arg_uses.len();
            self.table.arg_uses.push(ArgUse {
                symbol,
                expr,
                call,
                index,
                bound_to: None,
                func: self.func,
            });
            self.table
                .arg_uses_by_symbol
                .entry(symbol)
                .or_default()
                .push(idx);
        }
    }

    /// Local symbol named by `x`, `&x`, `&mut x` or `x.clone()`.
    fn local_symbol_of(&self, expr: &Expr) -> Option<SymbolId> {
        match expr {
            Expr::Reference(reference) => self.local_symbol_of(&reference.expr),
            Expr::Paren(paren) => self.local_symbol_of(&paren.expr),
            Expr::MethodCall(method)
                if method.args.is_empty()
                    && matches!(method.method.to_string().as_str(), "clone" | "as_mut" | "by_ref") =>
            {
                self.local_symbol_of(&method.receiver)
            }
            Expr::Path(path) if path.path.segments.len() == 1 && path.qself.is_none() => {
                self.lookup(&path.path.segments[0].ident.to_string())
            }
            _ => None,
        }
    }

    /// Links chains and calls recorded while visiting `value` to the binding that receives it.
    fn link_binding(&mut self, value: &'a Expr, chains_from: usize, args_from: usize, target: SymbolId) {
        let value = peel_value(value);
        for chain in &mut self.table.chains[chains_from..] {
            if std::ptr::eq(chain.expr, value) {
                chain.bound_to = Some(target);
            }
        }
        for arg_use in &mut self.table.arg_uses[args_from..] {
            if std::ptr::eq(arg_use.expr, value) {
                arg_use.bound_to = Some(target);
            }
        }
    }
}

impl<'a, 'p> Visit<'a> for Binder<'a, 'p> {
    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::MethodCall(call) => {
                self.record_chain(expr, call);
                self.record_arg_uses(expr, CallSite::Method(call));
            }
            Expr::Call(call) => self.record_arg_uses(expr, CallSite::Function(call)),
            _ => {}
        }
        syn::visit::visit_expr(self, expr);
    }

    fn visit_expr_path(&mut self, node: &'a syn::ExprPath) {
        if node.qself.is_none() {
            self.resolve_path_expr(&node.path);
        }
    }

    fn visit_block(&mut self, block: &'a syn::Block) {
        self.with_scope(|binder| {
            for stmt in &block.stmts {
                binder.visit_stmt(stmt);
            }
        });
    }

    fn visit_local(&mut self, local: &'a syn::Local) {
        let chains_from = self.table.chains.len();
        let args_from = self.table.arg_uses.len();
        let init = local.init.as_ref().map(|init| &*init.expr);
        if let Some(local_init) = &local.init {
            self.visit_expr(&local_init.expr);
            if let Some((_, diverge)) = &local_init.diverge {
                self.visit_expr(diverge);
            }
        }
        if let Some(symbol) = self.bind_pattern(&local.pat, None, init, SymbolKind::Local) {
            if let Some(init) = init {
                self.link_binding(init, chains_from, args_from, symbol);
            }
        }
    }

    fn visit_expr_assign(&mut self, node: &'a syn::ExprAssign) {
        let chains_from = self.table.chains.len();
        let args_from = self.table.arg_uses.len();
        self.visit_expr(&node.right);
        self.visit_expr(&node.left);
        if let Some(symbol) = self.local_symbol_of(&node.left) {
            self.table
                .assignments
                .entry(symbol)
                .or_default()
                .push(&node.right);
            self.link_binding(&node.right, chains_from, args_from, symbol);
        }
    }

    fn visit_expr_closure(&mut self, node: &'a syn::ExprClosure) {
        let site = Site::new(self.file, node.or1_token.spans[0]);
        let id = self.table.alloc(Symbol {
            id: SymbolId(0),
            name: "anonymous".to_string(),
            kind: SymbolKind::Closure,
            site: Some(site),
            owner: Some(self.func),
            declared_type: None,
            init: None,
            closure: Some(node),
        });
        self.table.closures.insert(site, id);

        self.with_scope(|binder| {
            for input in &node.inputs {
                binder.bind_pattern(input, None, None, SymbolKind::ClosureParam);
            }
            binder.visit_expr(&node.body);
        });
    }

    fn visit_arm(&mut self, arm: &'a syn::Arm) {
        self.with_scope(|binder| {
            binder.bind_pattern(&arm.pat, None, None, SymbolKind::Local);
            if let Some((_, guard)) = &arm.guard {
                binder.visit_expr(guard);
            }
            binder.visit_expr(&arm.body);
        });
    }

    fn visit_expr_if(&mut self, node: &'a syn::ExprIf) {
        self.with_scope(|binder| {
            binder.visit_expr(&node.cond);
            binder.visit_block(&node.then_branch);
        });
        if let Some((_, else_branch)) = &node.else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_expr_while(&mut self, node: &'a syn::ExprWhile) {
        self.with_scope(|binder| {
            binder.visit_expr(&node.cond);
            binder.visit_block(&node.body);
        });
    }

    fn visit_expr_let(&mut self, node: &'a syn::ExprLet) {
        self.visit_expr(&node.expr);
        self.bind_pattern(&node.pat, None, None, SymbolKind::Local);
    }

    fn visit_expr_for_loop(&mut self, node: &'a syn::ExprForLoop) {
        self.visit_expr(&node.expr);
        self.with_scope(|binder| {
            binder.bind_pattern(&node.pat, None, None, SymbolKind::Local);
            binder.visit_block(&node.body);
        });
    }

    // nested items are indexed and bound on their own
    fn visit_item(&mut self, _item: &'a syn::Item) {}
}

/// Peels what may sit between two links of a method chain.
fn peel_link(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => peel_link(&paren.expr),
        Expr::Group(group) => peel_link(&group.expr),
        Expr::Try(try_expr) => peel_link(&try_expr.expr),
        Expr::Await(await_expr) => peel_link(&await_expr.base),
        Expr::Reference(reference) => peel_link(&reference.expr),
        _ => expr,
    }
}

/// Peels wrappers around a value that is bound to a name.
pub fn peel_value(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(paren) => peel_value(&paren.expr),
        Expr::Group(group) => peel_value(&group.expr),
        Expr::Try(try_expr) => peel_value(&try_expr.expr),
        Expr::Await(await_expr) => peel_value(&await_expr.base),
        Expr::Reference(reference) => peel_value(&reference.expr),
        _ => expr,
    }
}

/// `T` in `Wrapper<T>` (the last segment's first type argument).
pub fn first_type_argument(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        syn::GenericArgument::Type(inner) => Some(inner),
        _ => None,
    })
}
