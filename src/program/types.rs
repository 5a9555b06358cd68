use std::collections::HashMap;
use std::fmt;

/// Semantic view of a `syn::Type`, shared by the tracer and the schema engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A scalar with a fixed JSON representation
    Primitive(Primitive),
    /// A user or library type, e.g. `crate::model::User` or `ApiResponse<T>`
    Named { path: Vec<String>, args: Vec<TypeRef> },
    /// `&T`, `Box<T>`, `Arc<T>`, `Rc<T>`, `Cow<T>`, raw pointers
    Pointer(Box<TypeRef>),
    /// `Vec<T>`, slices, arrays and sets
    Sequence(Box<TypeRef>),
    /// `HashMap<K, V>` and friends
    Map(Box<TypeRef>, Box<TypeRef>),
    /// `Option<T>`
    Optional(Box<TypeRef>),
    Tuple(Vec<TypeRef>),
    /// A generic parameter of the enclosing item
    Generic(String),
    /// `serde_json::Value`, `dyn Trait`, `impl Trait`
    Dynamic,
    Unit,
    Unknown,
}

/// Scalar categories, already collapsed to their JSON kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
}

impl TypeRef {
    /// Converts a syntax type. `generics` names the type parameters in scope.
    pub fn from_syn(ty: &syn::Type, generics: &[String]) -> Self {
        match ty {
            syn::Type::Path(type_path) => {
                if type_path.qself.is_some() {
                    return TypeRef::Unknown;
                }
                Self::from_path(&type_path.path, generics)
            }
            syn::Type::Reference(reference) => {
                TypeRef::Pointer(Box::new(Self::from_syn(&reference.elem, generics)))
            }
            syn::Type::Ptr(ptr) => TypeRef::Pointer(Box::new(Self::from_syn(&ptr.elem, generics))),
            syn::Type::Slice(slice) => {
                TypeRef::Sequence(Box::new(Self::from_syn(&slice.elem, generics)))
            }
            syn::Type::Array(array) => {
                TypeRef::Sequence(Box::new(Self::from_syn(&array.elem, generics)))
            }
            syn::Type::Tuple(tuple) => {
                if tuple.elems.is_empty() {
                    TypeRef::Unit
                } else {
                    TypeRef::Tuple(
                        tuple
                            .elems
                            .iter()
                            .map(|elem| Self::from_syn(elem, generics))
                            .collect(),
                    )
                }
            }
            syn::Type::Paren(paren) => Self::from_syn(&paren.elem, generics),
            syn::Type::Group(group) => Self::from_syn(&group.elem, generics),
            syn::Type::ImplTrait(_) | syn::Type::TraitObject(_) => TypeRef::Dynamic,
            _ => TypeRef::Unknown,
        }
    }

    fn from_path(path: &syn::Path, generics: &[String]) -> Self {
        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        let Some(last) = path.segments.last() else {
            return TypeRef::Unknown;
        };
        let name = last.ident.to_string();

        if segments.len() == 1 && generics.iter().any(|g| g == &name) {
            return TypeRef::Generic(name);
        }

        let args: Vec<TypeRef> = match &last.arguments {
            syn::PathArguments::AngleBracketed(angle) => angle
                .args
                .iter()
                .filter_map(|arg| match arg {
                    syn::GenericArgument::Type(inner) => Some(Self::from_syn(inner, generics)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        let first_arg = || Box::new(args.first().cloned().unwrap_or(TypeRef::Unknown));

        if let Some(primitive) = primitive_for(&name) {
            return TypeRef::Primitive(primitive);
        }

        match name.as_str() {
            "Option" => TypeRef::Optional(first_arg()),
            "Vec" | "VecDeque" | "LinkedList" | "HashSet" | "BTreeSet" | "IndexSet" => {
                TypeRef::Sequence(first_arg())
            }
            "HashMap" | "BTreeMap" | "IndexMap" => {
                let key = args.first().cloned().unwrap_or(TypeRef::Unknown);
                let value = args.get(1).cloned().unwrap_or(TypeRef::Unknown);
                TypeRef::Map(Box::new(key), Box::new(value))
            }
            "Box" | "Arc" | "Rc" | "Cow" | "RefCell" | "Cell" => TypeRef::Pointer(first_arg()),
            "Value" if segments.len() == 1 || segments.iter().any(|s| s == "serde_json") => {
                TypeRef::Dynamic
            }
            _ => TypeRef::Named {
                path: segments,
                args,
            },
        }
    }

    /// Replaces generic parameters with the types bound to them.
    pub fn substitute(&self, bindings: &HashMap<String, TypeRef>) -> TypeRef {
        if bindings.is_empty() {
            return self.clone();
        }
        match self {
            TypeRef::Generic(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            TypeRef::Named { path, args } => TypeRef::Named {
                path: path.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            TypeRef::Pointer(inner) => TypeRef::Pointer(Box::new(inner.substitute(bindings))),
            TypeRef::Sequence(inner) => TypeRef::Sequence(Box::new(inner.substitute(bindings))),
            TypeRef::Optional(inner) => TypeRef::Optional(Box::new(inner.substitute(bindings))),
            TypeRef::Map(key, value) => TypeRef::Map(
                Box::new(key.substitute(bindings)),
                Box::new(value.substitute(bindings)),
            ),
            TypeRef::Tuple(elems) => {
                TypeRef::Tuple(elems.iter().map(|e| e.substitute(bindings)).collect())
            }
            other => other.clone(),
        }
    }

    /// Strips pointers and options down to the value that gets serialized.
    pub fn peeled(&self) -> &TypeRef {
        match self {
            TypeRef::Pointer(inner) | TypeRef::Optional(inner) => inner.peeled(),
            other => other,
        }
    }

    /// Last path segment of a named type.
    pub fn name(&self) -> Option<&str> {
        match self.peeled() {
            TypeRef::Named { path, .. } => path.last().map(String::as_str),
            _ => None,
        }
    }

    /// True when the type says nothing about the payload shape.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self.peeled(),
            TypeRef::Generic(_) | TypeRef::Dynamic | TypeRef::Unknown
        )
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(p) => write!(f, "{:?}", p),
            TypeRef::Named { path, args } => {
                write!(f, "{}", path.join("::"))?;
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "<{}>", args.join(", "))?;
                }
                Ok(())
            }
            TypeRef::Pointer(inner) => write!(f, "&{}", inner),
            TypeRef::Sequence(inner) => write!(f, "[{}]", inner),
            TypeRef::Map(key, value) => write!(f, "{{{}: {}}}", key, value),
            TypeRef::Optional(inner) => write!(f, "{}?", inner),
            TypeRef::Tuple(elems) => {
                let elems: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", elems.join(", "))
            }
            TypeRef::Generic(name) => write!(f, "'{}", name),
            TypeRef::Dynamic => write!(f, "dyn"),
            TypeRef::Unit => write!(f, "()"),
            TypeRef::Unknown => write!(f, "?"),
        }
    }
}

/// Maps scalar type names to their JSON category.
pub fn primitive_for(type_name: &str) -> Option<Primitive> {
    match type_name {
        "String" | "str" | "char" | "Uuid" | "DateTime" | "NaiveDate" | "NaiveDateTime"
        | "NaiveTime" | "Decimal" | "PathBuf" | "Url" => Some(Primitive::String),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128"
        | "usize" => Some(Primitive::Integer),
        "f32" | "f64" => Some(Primitive::Number),
        "bool" => Some(Primitive::Boolean),
        _ => None,
    }
}

/// Names of the generic type parameters declared on an item.
pub fn generic_names(generics: &syn::Generics) -> Vec<String> {
    generics
        .type_params()
        .map(|param| param.ident.to_string())
        .collect()
}

/// Serde attributes of a field or a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerdeAttributes {
    /// Renamed field name
    pub rename: Option<String>,
    /// Container-wide case convention
    pub rename_all: Option<String>,
    /// Whether the field is left out of serialized output
    pub skip: bool,
    /// Whether the field's own fields are inlined into the parent
    pub flatten: bool,
}

/// Reads `#[serde(...)]` attributes.
pub fn parse_serde_attributes(attrs: &[syn::Attribute]) -> SerdeAttributes {
    let mut serde_attrs = SerdeAttributes::default();

    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        let Ok(meta_list) = attr.meta.require_list() else {
            continue;
        };
        let tokens_str = meta_list.tokens.to_string();

        for entry in split_top_level(&tokens_str) {
            let (key, value) = match entry.split_once('=') {
                Some((key, value)) => (key.trim(), Some(unquote(value.trim()))),
                None => (entry.trim(), None),
            };
            match (key, value) {
                ("rename", Some(value)) => serde_attrs.rename = Some(value),
                ("rename_all", Some(value)) => serde_attrs.rename_all = Some(value),
                ("skip" | "skip_serializing", None) => serde_attrs.skip = true,
                ("flatten", None) => serde_attrs.flatten = true,
                _ => {}
            }
        }
    }

    serde_attrs
}

/// Splits attribute tokens on commas that are not nested in parentheses or quotes.
fn split_top_level(tokens: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;

    for ch in tokens.chars() {
        match ch {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn unquote(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Applies a `rename_all` convention to a snake_case field name.
pub fn apply_rename_all(field: &str, rule: &str) -> String {
    let words: Vec<&str> = field.split('_').filter(|w| !w.is_empty()).collect();
    let capitalize = |w: &str| {
        let mut chars = w.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    };
    match rule {
        "lowercase" => field.to_lowercase(),
        "UPPERCASE" => field.to_uppercase(),
        "PascalCase" => words.iter().map(|w| capitalize(w)).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.to_string() } else { capitalize(w) })
            .collect(),
        "SCREAMING_SNAKE_CASE" => field.to_uppercase(),
        "kebab-case" => words.join("-"),
        "SCREAMING-KEBAB-CASE" => words.join("-").to_uppercase(),
        _ => field.to_string(),
    }
}
