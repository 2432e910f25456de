//! type values
//!
//! Types are immutable. Named types (objects, resources, enums, tokens) are shared through [Arc] so that
//! equality can short-circuit on pointer identity before falling back to structure.
use crate::ast::Literal;
use crate::diagnostics::Range;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Type {
    String,
    Number,
    Int,
    Bool,
    Asset,
    Archive,
    Any,
    Array(Box<Type>),
    Map(Box<Type>),
    /// ordered, deduplicated alternatives; build with [Type::union]
    Union(Vec<Type>),
    Object(Arc<ObjectType>),
    Resource(Arc<ResourceType>),
    Enum(Arc<EnumType>),
    Token(Arc<TokenType>),
    Optional(Box<Type>),
    Input(Box<Type>),
    /// already reported, every check involving it passes silently
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub type_: Type,
    pub required: bool,
    /// where the property was written, for synthesized objects
    pub range: Option<Range>,
    /// value the package always sends for this property
    pub constant: Option<serde_json::Value>,
}

impl Property {
    pub fn required(name: impl Into<String>, type_: Type) -> Self {
        Self {
            name: name.into(),
            type_,
            required: true,
            range: None,
            constant: None,
        }
    }

    pub fn optional(name: impl Into<String>, type_: Type) -> Self {
        Self {
            required: false,
            ..Self::required(name, type_)
        }
    }

    pub fn at(mut self, range: Option<Range>) -> Self {
        self.range = range;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub token: String,
    pub properties: Vec<Property>,
    /// synthesized from an object literal, displayed structurally
    pub adhoc: bool,
}

impl ObjectType {
    pub fn new(token: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            token: token.into(),
            properties,
            adhoc: false,
        }
    }

    /// Structural type of an object literal with a fresh token
    pub fn adhoc(properties: Vec<Property>) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let names: Vec<&str> = properties.iter().map(|p| p.name.as_str()).collect();
        Self {
            token: format!(
                "yamlform:adhoc:{}#{}",
                names.join("•"),
                NEXT.fetch_add(1, Ordering::Relaxed)
            ),
            properties,
            adhoc: true,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        ((self.adhoc && other.adhoc) || self.token == other.token)
            && self.properties.len() == other.properties.len()
            && self
                .properties
                .iter()
                .zip(&other.properties)
                .all(|(a, b)| a.name == b.name && a.required == b.required && a.type_ == b.type_)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceType {
    /// empty token matches any resource
    pub token: String,
    pub inputs: Vec<Property>,
    pub outputs: Vec<Property>,
    pub is_component: bool,
}

impl ResourceType {
    pub fn any() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn output(&self, name: &str) -> Option<&Property> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Output properties plus the synthesized `id` (custom resources only) and `urn`
    pub fn accessible_properties(&self) -> Vec<Property> {
        let mut properties = self.outputs.clone();
        if !self.is_component && self.output("id").is_none() {
            properties.push(Property::required("id", Type::String));
        }
        if self.output("urn").is_none() {
            properties.push(Property::required("urn", Type::String));
        }
        properties
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: Option<String>,
    pub value: Literal,
}

impl fmt::Display for EnumMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.value {
            Literal::String(s) => format!("{s:?}"),
            Literal::Number(n) => n.to_string(),
            Literal::Bool(b) => b.to_string(),
        };
        match &self.name {
            Some(name) => write!(f, "{name} ({value})"),
            None => f.write_str(&value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub token: String,
    pub element: Type,
    pub members: Vec<EnumMember>,
}

/// Opaque named type, behaves like its underlying type (`any` when absent)
#[derive(Debug, Clone, PartialEq)]
pub struct TokenType {
    pub token: String,
    pub underlying: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct FunctionType {
    pub token: String,
    pub inputs: Option<Arc<ObjectType>>,
    pub outputs: Option<Arc<ObjectType>>,
    /// a non-object return type, `return` selectors do not apply
    pub return_type: Option<Type>,
}

impl Type {
    /// Flattened, deduplicated union. A single alternative is returned as is, no alternatives give
    /// [Type::Invalid].
    pub fn union(types: impl IntoIterator<Item = Type>) -> Type {
        let mut alternatives: Vec<Type> = vec![];
        for type_ in types {
            let flattened = match type_ {
                Type::Union(inner) => inner,
                other => vec![other],
            };
            for type_ in flattened {
                if !alternatives.contains(&type_) {
                    alternatives.push(type_);
                }
            }
        }

        match alternatives.len() {
            0 => Type::Invalid,
            1 => alternatives.remove(0),
            _ => Type::Union(alternatives),
        }
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn map(element: Type) -> Type {
        Type::Map(Box::new(element))
    }

    pub fn optional(inner: Type) -> Type {
        Type::Optional(Box::new(inner))
    }

    pub fn input(inner: Type) -> Type {
        Type::Input(Box::new(inner))
    }

    pub fn object(token: impl Into<String>, properties: Vec<Property>) -> Type {
        Type::Object(Arc::new(ObjectType::new(token, properties)))
    }

    pub fn resource(token: impl Into<String>) -> Type {
        Type::Resource(Arc::new(ResourceType {
            token: token.into(),
            ..Default::default()
        }))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::String
                | Type::Number
                | Type::Int
                | Type::Bool
                | Type::Asset
                | Type::Archive
                | Type::Any
        )
    }

    /// Strips optional and input wrappers
    pub fn unwrap_input(&self) -> &Type {
        match self {
            Type::Optional(inner) | Type::Input(inner) => inner.unwrap_input(),
            other => other,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.unwrap_input(), Type::Invalid)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Object(a), Type::Object(b)) => Arc::ptr_eq(a, b) || a == b,
            (Type::Resource(a), Type::Resource(b)) => Arc::ptr_eq(a, b) || a.token == b.token,
            (Type::Enum(a), Type::Enum(b)) => Arc::ptr_eq(a, b) || a == b,
            (Type::Token(a), Type::Token(b)) => Arc::ptr_eq(a, b) || a == b,
            (Type::Array(a), Type::Array(b))
            | (Type::Map(a), Type::Map(b))
            | (Type::Optional(a), Type::Optional(b))
            | (Type::Input(a), Type::Input(b)) => a == b,
            (Type::Union(a), Type::Union(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => f.write_str("string"),
            Type::Number => f.write_str("number"),
            Type::Int => f.write_str("integer"),
            Type::Bool => f.write_str("boolean"),
            Type::Asset => f.write_str("asset"),
            Type::Archive => f.write_str("archive"),
            Type::Any => f.write_str("any"),
            Type::Invalid => f.write_str("invalid"),
            Type::Array(element) => write!(f, "List<{element}>"),
            Type::Map(element) => write!(f, "Map<{element}>"),
            Type::Union(alternatives) => {
                f.write_str("Union<")?;
                for (index, alternative) in alternatives.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{alternative}")?;
                }
                f.write_str(">")
            }
            Type::Object(object) if object.adhoc || object.token.is_empty() => {
                f.write_str("{")?;
                for (index, property) in object.properties.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", property.name, property.type_)?;
                }
                f.write_str("}")
            }
            Type::Object(object) => f.write_str(&object.token),
            Type::Resource(resource) if resource.token.is_empty() => f.write_str("Resource"),
            Type::Resource(resource) => f.write_str(&resource.token),
            Type::Enum(enum_type) => f.write_str(&enum_type.token),
            Type::Token(token) => match &token.underlying {
                Some(underlying) => write!(f, "{}<type = {underlying}>", token.token),
                None => write!(f, "{}<type = any>", token.token),
            },
            Type::Optional(inner) | Type::Input(inner) => write!(f, "{inner}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display() {
        let object = Type::Object(Arc::new(ObjectType::adhoc(vec![
            Property::required("prop1", Type::Asset),
            Property::optional("prop3", Type::Any),
        ])));

        assert_eq!(Type::Int.to_string(), "integer");
        assert_eq!(
            Type::array(Type::map(Type::Bool)).to_string(),
            "List<Map<boolean>>"
        );
        assert_eq!(object.to_string(), "{prop1: asset, prop3: any}");
        assert_eq!(
            Type::optional(Type::resource("aws:s3/bucket:Bucket")).to_string(),
            "aws:s3/bucket:Bucket"
        );
        assert_eq!(
            Type::Token(Arc::new(TokenType {
                token: "foo".to_string(),
                underlying: None
            }))
            .to_string(),
            "foo<type = any>"
        );
    }

    #[test]
    fn union_flattens_and_deduplicates() {
        let union = Type::union([
            Type::String,
            Type::union([Type::Number, Type::String]),
            Type::Number,
        ]);
        assert_eq!(union.to_string(), "Union<string, number>");
        assert_eq!(Type::union([Type::Bool, Type::Bool]), Type::Bool);
        assert_eq!(Type::union([]), Type::Invalid);
    }

    #[test]
    fn adhoc_objects_compare_structurally() {
        let a = ObjectType::adhoc(vec![Property::required("x", Type::Number)]);
        let b = ObjectType::adhoc(vec![Property::required("x", Type::Number)]);
        assert_ne!(a.token, b.token);
        assert_eq!(
            Type::union([Type::Object(Arc::new(a)), Type::Object(Arc::new(b))]).to_string(),
            "{x: number}"
        );
    }

    #[test]
    fn enum_members() {
        let named = EnumMember {
            name: Some("fizz".to_string()),
            value: Literal::String("foo".to_string()),
        };
        let bare = EnumMember {
            name: None,
            value: Literal::Number(0.5),
        };
        assert_eq!(named.to_string(), r#"fizz ("foo")"#);
        assert_eq!(bare.to_string(), "0.5");
    }
}
