//! Program model: modules, declarations and symbol bindings of the analysed project.
//!
//! [`Program::build`] indexes every parsed file into modules (derived from the file path and
//! inline `mod` blocks), collects functions, impl methods, types, constants and `use` imports, and
//! then runs the [`binder`] over every function body. The binder assigns a [`SymbolId`] to every
//! declaration site and maps every identifier use-site to the symbol it denotes, so that two
//! expressions referring to the same router object can be recognised regardless of aliasing.
//!
//! The model borrows the parsed syntax trees and is immutable once built.

pub mod binder;
pub mod types;

use crate::parser::ParsedFile;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub use binder::{ArgUse, CallChain, CallSite, Symbol, SymbolKind, SymbolTable};
pub use types::TypeRef;

/// Identity of a declared binding (function, parameter, local, closure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstId(pub u32);

/// Source position of an identifier or token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
}

impl Site {
    pub fn new(file: FileId, span: proc_macro2::Span) -> Self {
        let start = span.start();
        Self {
            file,
            line: start.line,
            column: start.column,
        }
    }
}

/// A module of the analysed crate.
#[derive(Debug)]
pub struct Module {
    pub id: ModuleId,
    /// Directory that holds the crate's `src/`
    pub crate_root: PathBuf,
    /// Full module path, starting with `crate`
    pub path: Vec<String>,
    pub file: Option<FileId>,
    pub parent: Option<ModuleId>,
    pub children: HashMap<String, ModuleId>,
    /// Alias -> imported path, as written in the `use` item
    pub imports: HashMap<String, Vec<String>>,
    pub glob_imports: Vec<Vec<String>>,
    pub functions: HashMap<String, FnId>,
    pub types: HashMap<String, TypeId>,
    pub consts: HashMap<String, ConstId>,
}

impl Module {
    /// `crate::api::users`
    pub fn qualified_name(&self) -> String {
        self.path.join("::")
    }

    /// Last path segment, `crate` for the root.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("crate")
    }
}

/// A function or method declaration.
#[derive(Debug)]
pub struct FnDecl<'a> {
    pub id: FnId,
    pub name: String,
    pub module: ModuleId,
    /// Name of the `impl` self type for methods
    pub self_ty: Option<String>,
    pub sig: &'a syn::Signature,
    pub attrs: &'a [syn::Attribute],
    pub block: &'a syn::Block,
    pub symbol: SymbolId,
    /// Typed parameters, the `self` receiver excluded
    pub params: Vec<ParamDecl<'a>>,
    /// Generic parameters of the function and its impl block
    pub generics: Vec<String>,
}

#[derive(Debug)]
pub struct ParamDecl<'a> {
    pub index: usize,
    pub pat: &'a syn::Pat,
    pub ty: &'a syn::Type,
}

impl ParamDecl<'_> {
    /// Identifier bound by a plain `name: Type` parameter.
    pub fn ident(&self) -> Option<String> {
        match self.pat {
            syn::Pat::Ident(pat_ident) => Some(pat_ident.ident.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TypeDeclKind<'a> {
    Struct(&'a syn::ItemStruct),
    Enum(&'a syn::ItemEnum),
    Alias(&'a syn::ItemType),
}

#[derive(Debug)]
pub struct TypeDecl<'a> {
    pub id: TypeId,
    pub name: String,
    pub module: ModuleId,
    pub kind: TypeDeclKind<'a>,
}

impl TypeDecl<'_> {
    pub fn generics(&self) -> Vec<String> {
        match self.kind {
            TypeDeclKind::Struct(item) => types::generic_names(&item.generics),
            TypeDeclKind::Enum(item) => types::generic_names(&item.generics),
            TypeDeclKind::Alias(item) => types::generic_names(&item.generics),
        }
    }

    pub fn attrs(&self) -> &[syn::Attribute] {
        match self.kind {
            TypeDeclKind::Struct(item) => &item.attrs,
            TypeDeclKind::Enum(item) => &item.attrs,
            TypeDeclKind::Alias(item) => &item.attrs,
        }
    }
}

/// A `const` or `static` item.
#[derive(Debug)]
pub struct ConstDecl<'a> {
    pub id: ConstId,
    pub name: String,
    pub module: ModuleId,
    pub ty: &'a syn::Type,
    pub expr: &'a syn::Expr,
}

/// What a path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Module(ModuleId),
    Function(FnId),
    Type(TypeId),
    Const(ConstId),
}

/// The indexed, bound program.
pub struct Program<'a> {
    files: &'a [ParsedFile],
    modules: Vec<Module>,
    functions: Vec<FnDecl<'a>>,
    types: Vec<TypeDecl<'a>>,
    consts: Vec<ConstDecl<'a>>,
    module_index: HashMap<(PathBuf, Vec<String>), ModuleId>,
    fns_by_name: HashMap<String, Vec<FnId>>,
    types_by_name: HashMap<String, Vec<TypeId>>,
    impl_methods: HashMap<(String, String), Vec<FnId>>,
    symbols: SymbolTable<'a>,
}

const MAX_RESOLVE_DEPTH: u8 = 12;

impl<'a> Program<'a> {
    /// Indexes and binds all parsed files.
    pub fn build(files: &'a [ParsedFile]) -> Self {
        debug!("Building program model from {} files", files.len());

        let mut program = Program {
            files,
            modules: Vec::new(),
            functions: Vec::new(),
            types: Vec::new(),
            consts: Vec::new(),
            module_index: HashMap::new(),
            fns_by_name: HashMap::new(),
            types_by_name: HashMap::new(),
            impl_methods: HashMap::new(),
            symbols: SymbolTable::default(),
        };

        for (idx, parsed) in files.iter().enumerate() {
            let file = FileId(idx as u32);
            let (crate_root, path) = module_path_for(&parsed.path);
            let module = program.ensure_module(&crate_root, &path);
            program.modules[module.0 as usize].file = Some(file);
            program.index_items(&parsed.syntax_tree.items, module, None);
        }

        let symbols = binder::bind(&program);
        program.symbols = symbols;

        debug!(
            "Program model: {} modules, {} functions, {} types, {} symbols",
            program.modules.len(),
            program.functions.len(),
            program.types.len(),
            program.symbols.len()
        );

        program
    }

    fn ensure_module(&mut self, crate_root: &Path, path: &[String]) -> ModuleId {
        let key = (crate_root.to_path_buf(), path.to_vec());
        if let Some(id) = self.module_index.get(&key) {
            return *id;
        }

        let parent = if path.len() > 1 {
            Some(self.ensure_module(crate_root, &path[..path.len() - 1]))
        } else {
            None
        };

        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module {
            id,
            crate_root: crate_root.to_path_buf(),
            path: path.to_vec(),
            file: None,
            parent,
            children: HashMap::new(),
            imports: HashMap::new(),
            glob_imports: Vec::new(),
            functions: HashMap::new(),
            types: HashMap::new(),
            consts: HashMap::new(),
        });
        if let (Some(parent), Some(name)) = (parent, path.last()) {
            self.modules[parent.0 as usize]
                .children
                .insert(name.clone(), id);
        }
        self.module_index.insert(key, id);
        id
    }

    fn index_items(&mut self, items: &'a [syn::Item], module: ModuleId, file_hint: Option<FileId>) {
        for item in items {
            match item {
                syn::Item::Fn(item_fn) => {
                    self.add_function(
                        module,
                        None,
                        &item_fn.sig,
                        &item_fn.attrs,
                        &item_fn.block,
                        Vec::new(),
                    );
                }
                syn::Item::Impl(item_impl) => {
                    let self_ty = match &*item_impl.self_ty {
                        syn::Type::Path(type_path) => type_path
                            .path
                            .segments
                            .last()
                            .map(|s| s.ident.to_string()),
                        _ => None,
                    };
                    let impl_generics = types::generic_names(&item_impl.generics);
                    for impl_item in &item_impl.items {
                        if let syn::ImplItem::Fn(method) = impl_item {
                            self.add_function(
                                module,
                                self_ty.clone(),
                                &method.sig,
                                &method.attrs,
                                &method.block,
                                impl_generics.clone(),
                            );
                        }
                    }
                }
                syn::Item::Struct(item_struct) => {
                    self.add_type(module, item_struct.ident.to_string(), TypeDeclKind::Struct(item_struct));
                }
                syn::Item::Enum(item_enum) => {
                    self.add_type(module, item_enum.ident.to_string(), TypeDeclKind::Enum(item_enum));
                }
                syn::Item::Type(item_type) => {
                    self.add_type(module, item_type.ident.to_string(), TypeDeclKind::Alias(item_type));
                }
                syn::Item::Const(item_const) => {
                    self.add_const(module, item_const.ident.to_string(), &item_const.ty, &item_const.expr);
                }
                syn::Item::Static(item_static) => {
                    self.add_const(module, item_static.ident.to_string(), &item_static.ty, &item_static.expr);
                }
                syn::Item::Use(item_use) => {
                    let mut prefix = Vec::new();
                    collect_use_tree(&item_use.tree, &mut prefix, &mut self.modules[module.0 as usize]);
                }
                syn::Item::Mod(item_mod) => {
                    if is_cfg_test(&item_mod.attrs) {
                        continue;
                    }
                    if let Some((_, content)) = &item_mod.content {
                        let parent = &self.modules[module.0 as usize];
                        let crate_root = parent.crate_root.clone();
                        let mut path = parent.path.clone();
                        let file = parent.file.or(file_hint);
                        path.push(item_mod.ident.to_string());
                        let child = self.ensure_module(&crate_root, &path);
                        self.modules[child.0 as usize].file = file;
                        self.index_items(content, child, file);
                    }
                }
                _ => {}
            }
        }
    }

    fn add_function(
        &mut self,
        module: ModuleId,
        self_ty: Option<String>,
        sig: &'a syn::Signature,
        attrs: &'a [syn::Attribute],
        block: &'a syn::Block,
        mut generics: Vec<String>,
    ) {
        let id = FnId(self.functions.len() as u32);
        let name = sig.ident.to_string();
        generics.extend(types::generic_names(&sig.generics));

        let params = sig
            .inputs
            .iter()
            .filter_map(|input| match input {
                syn::FnArg::Typed(pat_type) => Some(pat_type),
                syn::FnArg::Receiver(_) => None,
            })
            .enumerate()
            .map(|(index, pat_type)| ParamDecl {
                index,
                pat: &pat_type.pat,
                ty: &pat_type.ty,
            })
            .collect();

        match &self_ty {
            Some(ty) => {
                self.impl_methods
                    .entry((ty.clone(), name.clone()))
                    .or_default()
                    .push(id);
            }
            None => {
                self.modules[module.0 as usize]
                    .functions
                    .insert(name.clone(), id);
            }
        }
        self.fns_by_name.entry(name.clone()).or_default().push(id);

        self.functions.push(FnDecl {
            id,
            name,
            module,
            self_ty,
            sig,
            attrs,
            block,
            // function symbols are allocated first, in function order
            symbol: SymbolId(id.0),
            params,
            generics,
        });
    }

    fn add_type(&mut self, module: ModuleId, name: String, kind: TypeDeclKind<'a>) {
        let id = TypeId(self.types.len() as u32);
        self.modules[module.0 as usize].types.insert(name.clone(), id);
        self.types_by_name.entry(name.clone()).or_default().push(id);
        self.types.push(TypeDecl {
            id,
            name,
            module,
            kind,
        });
    }

    fn add_const(&mut self, module: ModuleId, name: String, ty: &'a syn::Type, expr: &'a syn::Expr) {
        let id = ConstId(self.consts.len() as u32);
        self.modules[module.0 as usize].consts.insert(name.clone(), id);
        self.consts.push(ConstDecl {
            id,
            name,
            module,
            ty,
            expr,
        });
    }

    pub fn files(&self) -> &'a [ParsedFile] {
        self.files
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn functions(&self) -> &[FnDecl<'a>] {
        &self.functions
    }

    pub fn function(&self, id: FnId) -> &FnDecl<'a> {
        &self.functions[id.0 as usize]
    }

    pub fn type_decl(&self, id: TypeId) -> &TypeDecl<'a> {
        &self.types[id.0 as usize]
    }

    pub fn const_decl(&self, id: ConstId) -> &ConstDecl<'a> {
        &self.consts[id.0 as usize]
    }

    pub fn symbols(&self) -> &SymbolTable<'a> {
        &self.symbols
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol<'a> {
        self.symbols.get(id)
    }

    /// The function a function symbol stands for.
    pub fn function_of_symbol(&self, id: SymbolId) -> Option<FnId> {
        match self.symbols.get(id).kind {
            SymbolKind::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Symbol bound at an identifier use-site.
    pub fn resolve_ident(&self, file: FileId, ident: &syn::Ident) -> Option<SymbolId> {
        self.symbols.binding_at(Site::new(file, ident.span()))
    }

    /// Symbol of the function's `index`-th parameter, when it is a plain identifier.
    pub fn param_symbol(&self, func: FnId, index: usize) -> Option<SymbolId> {
        self.symbols.param_symbol(func, index)
    }

    /// File that holds a function's body.
    pub fn file_of(&self, func: FnId) -> Option<FileId> {
        self.module(self.function(func).module).file
    }

    /// All functions sharing a name, in declaration order.
    pub fn functions_named(&self, name: &str) -> &[FnId] {
        self.fns_by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Qualified name, `crate::api::users::list` or `crate::api::UserApi::list`.
    pub fn qualified_fn_name(&self, id: FnId) -> String {
        let func = self.function(id);
        let mut name = self.module(func.module).qualified_name();
        if let Some(self_ty) = &func.self_ty {
            name.push_str("::");
            name.push_str(self_ty);
        }
        name.push_str("::");
        name.push_str(&func.name);
        name
    }

    fn crate_root_of(&self, module: ModuleId) -> ModuleId {
        let mut current = module;
        while let Some(parent) = self.module(current).parent {
            current = parent;
        }
        current
    }

    /// Resolves a path as written inside `from` (values, types and modules).
    pub fn resolve_path(&self, from: ModuleId, segments: &[String]) -> Option<Target> {
        self.resolve_in(from, segments, 0)
    }

    fn resolve_in(&self, from: ModuleId, segments: &[String], depth: u8) -> Option<Target> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let (first, rest) = segments.split_first()?;
        let start = match first.as_str() {
            "crate" => Target::Module(self.crate_root_of(from)),
            "self" => Target::Module(from),
            "super" => Target::Module(self.module(from).parent?),
            name => self.lookup_in_module(from, name, depth)?,
        };
        self.descend(start, rest, depth)
    }

    fn descend(&self, mut target: Target, rest: &[String], depth: u8) -> Option<Target> {
        for (i, segment) in rest.iter().enumerate() {
            target = match target {
                Target::Module(module) => {
                    if segment == "super" {
                        Target::Module(self.module(module).parent?)
                    } else {
                        self.lookup_in_module(module, segment, depth + 1)?
                    }
                }
                Target::Type(type_id) if i == rest.len() - 1 => {
                    let type_name = &self.type_decl(type_id).name;
                    Target::Function(self.method_of(type_name, segment)?)
                }
                _ => return None,
            };
        }
        Some(target)
    }

    fn lookup_in_module(&self, module: ModuleId, name: &str, depth: u8) -> Option<Target> {
        let m = self.module(module);
        if let Some(child) = m.children.get(name) {
            return Some(Target::Module(*child));
        }
        if let Some(func) = m.functions.get(name) {
            return Some(Target::Function(*func));
        }
        if let Some(ty) = m.types.get(name) {
            return Some(Target::Type(*ty));
        }
        if let Some(constant) = m.consts.get(name) {
            return Some(Target::Const(*constant));
        }
        if let Some(import) = m.imports.get(name) {
            if let Some(target) = self.resolve_in(module, import, depth + 1) {
                return Some(target);
            }
            // 2015-style imports are relative to the crate root
            let root = self.crate_root_of(module);
            if root != module {
                if let Some(target) = self.resolve_in(root, import, depth + 1) {
                    return Some(target);
                }
            }
        }
        for glob in &m.glob_imports {
            let mut path = glob.clone();
            path.push(name.to_string());
            if let Some(target) = self.resolve_in(module, &path, depth + 1) {
                return Some(target);
            }
        }
        None
    }

    /// An inherent or trait method by self-type name.
    pub fn method_of(&self, type_name: &str, method: &str) -> Option<FnId> {
        self.impl_methods
            .get(&(type_name.to_string(), method.to_string()))
            .and_then(|ids| ids.first().copied())
    }

    /// Resolves a path used as a value (a function reference or a call target).
    pub fn resolve_function(&self, from: ModuleId, self_ty: Option<&str>, path: &syn::Path) -> Option<FnId> {
        let segments = path_segments(path);
        if segments.len() == 2 && segments[0] == "Self" {
            return self_ty.and_then(|ty| self.method_of(ty, &segments[1]));
        }
        match self.resolve_path(from, &segments)? {
            Target::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Resolves a type path in module context, falling back to a unique global name.
    pub fn resolve_type(&self, from: ModuleId, segments: &[String]) -> Option<TypeId> {
        if let Some(Target::Type(id)) = self.resolve_path(from, segments) {
            return Some(id);
        }
        let name = segments.last()?;
        let candidates = self.types_by_name.get(name)?;
        // prefer a declaration in the same crate
        let crate_root = &self.module(from).crate_root;
        candidates
            .iter()
            .find(|id| &self.module(self.type_decl(**id).module).crate_root == crate_root)
            .or_else(|| candidates.first())
            .copied()
    }

    /// Number of expression references to a function.
    pub fn reference_count(&self, func: FnId) -> usize {
        self.symbols.reference_count(self.function(func).symbol)
    }
}

/// Segments of a path as strings.
pub fn path_segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|s| s.ident.to_string()).collect()
}

/// Trailing expression of a block, looking through a final `return x;`.
pub fn tail_expr(block: &syn::Block) -> Option<&syn::Expr> {
    match block.stmts.last()? {
        syn::Stmt::Expr(syn::Expr::Return(ret), _) => ret.expr.as_deref(),
        syn::Stmt::Expr(expr, None) => Some(expr),
        _ => None,
    }
}

/// Values of the `return` expressions of a block, in source order.
///
/// Returns inside closures, async blocks and nested items belong to those and are skipped.
pub fn return_exprs(block: &syn::Block) -> Vec<&syn::Expr> {
    use syn::visit::Visit;

    struct ReturnCollector<'a> {
        found: Vec<&'a syn::Expr>,
    }

    impl<'a> Visit<'a> for ReturnCollector<'a> {
        fn visit_expr_return(&mut self, node: &'a syn::ExprReturn) {
            if let Some(expr) = &node.expr {
                self.found.push(expr);
                self.visit_expr(expr);
            }
        }

        fn visit_expr_closure(&mut self, _node: &'a syn::ExprClosure) {}

        fn visit_expr_async(&mut self, _node: &'a syn::ExprAsync) {}

        fn visit_item(&mut self, _item: &'a syn::Item) {}
    }

    let mut collector = ReturnCollector { found: Vec::new() };
    collector.visit_block(block);
    collector.found
}

/// Derives the crate root and module path of a source file.
///
/// `src/lib.rs` and `src/main.rs` map to `crate`, `src/a/mod.rs` and `src/a.rs` to `crate::a`.
fn module_path_for(path: &Path) -> (PathBuf, Vec<String>) {
    let components: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let (root, rest): (PathBuf, Vec<String>) =
        match components.iter().rposition(|c| c == "src") {
            Some(src_pos) => {
                let mut root = PathBuf::new();
                if path.is_absolute() {
                    root.push(std::path::MAIN_SEPARATOR.to_string());
                }
                for part in &components[..src_pos] {
                    root.push(part);
                }
                (root, components[src_pos + 1..].to_vec())
            }
            None => (
                path.parent().map(Path::to_path_buf).unwrap_or_default(),
                components.last().cloned().into_iter().collect(),
            ),
        };

    let mut module_path = vec!["crate".to_string()];
    for (i, part) in rest.iter().enumerate() {
        let is_last = i == rest.len() - 1;
        if !is_last {
            module_path.push(part.clone());
            continue;
        }
        let stem = part.strip_suffix(".rs").unwrap_or(part);
        let is_root_file = i == 0 && (stem == "lib" || stem == "main");
        if stem != "mod" && !is_root_file {
            module_path.push(stem.to_string());
        }
    }

    (root, module_path)
}

fn collect_use_tree(tree: &syn::UseTree, prefix: &mut Vec<String>, module: &mut Module) {
    match tree {
        syn::UseTree::Path(use_path) => {
            prefix.push(use_path.ident.to_string());
            collect_use_tree(&use_path.tree, prefix, module);
            prefix.pop();
        }
        syn::UseTree::Name(use_name) => {
            let name = use_name.ident.to_string();
            if name == "self" {
                if let Some(last) = prefix.last() {
                    module.imports.insert(last.clone(), prefix.clone());
                }
            } else {
                let mut path = prefix.clone();
                path.push(name.clone());
                module.imports.insert(name, path);
            }
        }
        syn::UseTree::Rename(rename) => {
            let mut path = prefix.clone();
            let original = rename.ident.to_string();
            if original != "self" {
                path.push(original);
            }
            module.imports.insert(rename.rename.to_string(), path);
        }
        syn::UseTree::Glob(_) => {
            module.glob_imports.push(prefix.clone());
        }
        syn::UseTree::Group(group) => {
            for item in &group.items {
                collect_use_tree(item, prefix, module);
            }
        }
    }
}

fn is_cfg_test(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| {
        attr.path().is_ident("cfg")
            && attr
                .meta
                .require_list()
                .map(|list| list.tokens.to_string().trim() == "test")
                .unwrap_or(false)
    })
}
