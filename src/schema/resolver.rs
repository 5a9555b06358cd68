//! Type to schema resolution.
//!
//! Resolution is recursive and bounded by the configured maximum depth: a struct's fields and an
//! array's items sit one level below their parent, references, smart pointers and `Option` do
//! not add a level. At the bound a [`Schema::depth_limit`] leaf is returned instead of
//! recursing. Named types are memoized on (type, module, depth) within one resolution pass.

use super::{Schema, SchemaEngine, SchemaKind};
use crate::program::types::{
    apply_rename_all, generic_names, parse_serde_attributes, Primitive, SerdeAttributes,
};
use crate::program::{ModuleId, TypeDeclKind, TypeId, TypeRef};
use log::debug;
use std::collections::HashMap;
use syn::Fields;

impl<'p, 'a> SchemaEngine<'p, 'a> {
    pub(crate) fn schema_of_syn(
        &mut self,
        ty: &syn::Type,
        module: ModuleId,
        generics: &[String],
        depth: usize,
    ) -> Schema {
        let type_ref = TypeRef::from_syn(ty, generics);
        self.schema_of(&type_ref, module, depth)
    }

    pub(crate) fn schema_of(&mut self, ty: &TypeRef, module: ModuleId, depth: usize) -> Schema {
        if depth >= self.max_depth() {
            return Schema::depth_limit();
        }

        match ty {
            TypeRef::Primitive(primitive) => primitive_schema(*primitive),
            TypeRef::Pointer(inner) | TypeRef::Optional(inner) => self.schema_of(inner, module, depth),
            TypeRef::Sequence(item) => Schema::array(self.schema_of(item, module, depth + 1)),
            TypeRef::Map(key, value) => {
                let key_schema = self.schema_of(key, module, depth + 1);
                let value_schema = self.schema_of(value, module, depth + 1);
                Schema::object()
                    .with_property("<key>", key_schema)
                    .with_property("<value>", value_schema)
            }
            TypeRef::Tuple(elems) => {
                let item = match elems.first() {
                    Some(first) => self.schema_of(first, module, depth + 1),
                    None => Schema::unknown(),
                };
                Schema::array(item)
            }
            TypeRef::Generic(name) => Schema::dynamic().with_type_name(name.clone()),
            TypeRef::Dynamic => Schema::dynamic(),
            TypeRef::Unit | TypeRef::Unknown => Schema::unknown(),
            TypeRef::Named { path, args } => {
                let key = (ty.to_string(), module, depth);
                if let Some(hit) = self.memo.get(&key) {
                    return hit.clone();
                }
                let schema = self.named_schema(path, args, module, depth);
                self.memo.insert(key, schema.clone());
                schema
            }
        }
    }

    fn named_schema(
        &mut self,
        path: &[String],
        args: &[TypeRef],
        module: ModuleId,
        depth: usize,
    ) -> Schema {
        let Some(type_id) = self.program.resolve_type(module, path) else {
            debug!("Type definition not found: {}", path.join("::"));
            return Schema::unknown().with_type_name(path.join("::"));
        };

        let decl = self.program.type_decl(type_id);
        let decl_module = decl.module;
        let bindings: HashMap<String, TypeRef> = decl
            .generics()
            .into_iter()
            .zip(args.iter().cloned())
            .collect();

        match decl.kind {
            TypeDeclKind::Struct(item) => self.struct_schema(item, &bindings, decl_module, depth),
            TypeDeclKind::Enum(item) => {
                let unit_only = item
                    .variants
                    .iter()
                    .all(|variant| matches!(variant.fields, Fields::Unit));
                let kind = if unit_only {
                    SchemaKind::String
                } else {
                    SchemaKind::Dynamic
                };
                Schema::new(kind).with_type_name(item.ident.to_string())
            }
            TypeDeclKind::Alias(item) => {
                let target = TypeRef::from_syn(&item.ty, &generic_names(&item.generics))
                    .substitute(&bindings);
                self.schema_of(&target, decl_module, depth)
            }
        }
    }

    fn struct_schema(
        &mut self,
        item: &syn::ItemStruct,
        bindings: &HashMap<String, TypeRef>,
        module: ModuleId,
        depth: usize,
    ) -> Schema {
        let generics = generic_names(&item.generics);
        let container = parse_serde_attributes(&item.attrs);

        match &item.fields {
            Fields::Named(named) => {
                let mut schema = Schema::object().with_type_name(item.ident.to_string());
                for field in &named.named {
                    let attrs = parse_serde_attributes(&field.attrs);
                    if attrs.skip {
                        continue;
                    }
                    let Some(ident) = &field.ident else {
                        continue;
                    };
                    let field_ty = TypeRef::from_syn(&field.ty, &generics).substitute(bindings);

                    if attrs.flatten {
                        let inner = self.schema_of(&field_ty, module, depth);
                        schema.properties.extend(inner.properties);
                        continue;
                    }

                    let key = serialized_key(&ident.to_string(), &attrs, &container);
                    let field_schema = self.schema_of(&field_ty, module, depth + 1);
                    schema.insert_property(key, field_schema);
                }
                schema
            }
            // newtype
            Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                let inner = TypeRef::from_syn(&unnamed.unnamed[0].ty, &generics).substitute(bindings);
                self.schema_of(&inner, module, depth)
            }
            Fields::Unnamed(unnamed) => {
                let item_schema = match unnamed.unnamed.first() {
                    Some(first) => {
                        let first = TypeRef::from_syn(&first.ty, &generics).substitute(bindings);
                        self.schema_of(&first, module, depth + 1)
                    }
                    None => Schema::unknown(),
                };
                Schema::array(item_schema).with_type_name(item.ident.to_string())
            }
            Fields::Unit => Schema::object().with_type_name(item.ident.to_string()),
        }
    }

    /// Serialized key of a named struct field, `None` when the field is skipped.
    pub(crate) fn field_key(&self, type_id: TypeId, field: &str) -> Option<String> {
        let TypeDeclKind::Struct(item) = self.program.type_decl(type_id).kind else {
            return None;
        };
        let container = parse_serde_attributes(&item.attrs);
        let Fields::Named(named) = &item.fields else {
            return None;
        };
        let decl_field = named
            .named
            .iter()
            .find(|f| f.ident.as_ref().map(|i| i == field).unwrap_or(false))?;
        let attrs = parse_serde_attributes(&decl_field.attrs);
        if attrs.skip {
            return None;
        }
        Some(serialized_key(field, &attrs, &container))
    }
}

fn serialized_key(field: &str, attrs: &SerdeAttributes, container: &SerdeAttributes) -> String {
    let field = field.strip_prefix("r#").unwrap_or(field);
    if let Some(rename) = &attrs.rename {
        return rename.clone();
    }
    match &container.rename_all {
        Some(rule) => apply_rename_all(field, rule),
        None => field.to_string(),
    }
}

fn primitive_schema(primitive: Primitive) -> Schema {
    let kind = match primitive {
        Primitive::String => SchemaKind::String,
        Primitive::Integer => SchemaKind::Integer,
        Primitive::Number => SchemaKind::Number,
        Primitive::Boolean => SchemaKind::Boolean,
    };
    Schema::new(kind)
}
