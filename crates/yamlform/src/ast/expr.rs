//! expression nodes
use super::access::PropertyAccess;
use crate::diagnostics::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of an expression node
///
/// Assigned on construction, used to key per-expression data such as inferred types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u64);

impl ExprId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ExprId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: ExprId,
    pub range: Option<Range>,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// text with embedded `${...}` property accesses
    Interpolate(Vec<Interpolation>),
    /// a string that is exactly one `${...}`
    Symbol(PropertyAccess),
    List(Vec<Expr>),
    Object(Vec<ObjectProperty>),
    Builtin(Box<Builtin>),
}

/// Literal text followed by an optional property access
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    pub text: String,
    pub value: Option<PropertyAccess>,
}

#[derive(Debug, Clone)]
pub struct ObjectProperty {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    StringAsset,
    FileAsset,
    RemoteAsset,
    FileArchive,
    RemoteArchive,
}

impl AssetKind {
    pub fn is_archive(&self) -> bool {
        matches!(self, AssetKind::FileArchive | AssetKind::RemoteArchive)
    }

    pub fn function_name(&self) -> &'static str {
        match self {
            AssetKind::StringAsset => "fn::stringAsset",
            AssetKind::FileAsset => "fn::fileAsset",
            AssetKind::RemoteAsset => "fn::remoteAsset",
            AssetKind::FileArchive => "fn::fileArchive",
            AssetKind::RemoteArchive => "fn::remoteArchive",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Builtin {
    Invoke(Invoke),
    Join { delimiter: Expr, values: Expr },
    Split { delimiter: Expr, source: Expr },
    Select { index: Expr, values: Expr },
    ToJson(Expr),
    ToBase64(Expr),
    FromBase64(Expr),
    Secret(Expr),
    ReadFile(Expr),
    Rfc3339ToUnix(Expr),
    StackReference { stack: String, property: Expr },
    Asset { kind: AssetKind, source: Expr },
    /// entries are nested assets or archives
    AssetArchive(Vec<(String, Expr)>),
}

impl Builtin {
    pub fn function_name(&self) -> &'static str {
        match self {
            Builtin::Invoke(_) => "fn::invoke",
            Builtin::Join { .. } => "fn::join",
            Builtin::Split { .. } => "fn::split",
            Builtin::Select { .. } => "fn::select",
            Builtin::ToJson(_) => "fn::toJSON",
            Builtin::ToBase64(_) => "fn::toBase64",
            Builtin::FromBase64(_) => "fn::fromBase64",
            Builtin::Secret(_) => "fn::secret",
            Builtin::ReadFile(_) => "fn::readFile",
            Builtin::Rfc3339ToUnix(_) => "fn::rfc3339ToUnix",
            Builtin::StackReference { .. } => "fn::stackReference",
            Builtin::Asset { kind, .. } => kind.function_name(),
            Builtin::AssetArchive(_) => "fn::assetArchive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invoke {
    pub token: String,
    pub token_range: Option<Range>,
    /// always an [ExprKind::Object] when present
    pub arguments: Option<Expr>,
    pub options: InvokeOptions,
    pub return_field: Option<(String, Option<Range>)>,
}

#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub parent: Option<Expr>,
    pub provider: Option<Expr>,
    pub depends_on: Option<Expr>,
    pub version: Option<Expr>,
    pub plugin_download_url: Option<Expr>,
}

impl InvokeOptions {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Expr)> {
        [
            ("parent", &self.parent),
            ("provider", &self.provider),
            ("dependsOn", &self.depends_on),
            ("version", &self.version),
            ("pluginDownloadURL", &self.plugin_download_url),
        ]
        .into_iter()
        .filter_map(|(name, expr)| expr.as_ref().map(|expr| (name, expr)))
    }
}

/// Literal value of an expression, used for enum membership checks
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            id: ExprId::next(),
            range: None,
            kind,
        }
    }

    pub fn at(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn null() -> Self {
        Self::new(ExprKind::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(ExprKind::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::String(value.into()))
    }

    pub fn symbol(access: PropertyAccess) -> Self {
        Self::new(ExprKind::Symbol(access))
    }

    pub fn list(items: Vec<Expr>) -> Self {
        Self::new(ExprKind::List(items))
    }

    /// Object with literal string keys
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Self::new(ExprKind::Object(
            entries
                .into_iter()
                .map(|(key, value)| ObjectProperty {
                    key: Expr::string(key),
                    value,
                })
                .collect(),
        ))
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Self::new(ExprKind::Builtin(Box::new(builtin)))
    }

    pub fn literal(&self) -> Option<Literal> {
        match &self.kind {
            ExprKind::Bool(b) => Some(Literal::Bool(*b)),
            ExprKind::Number(n) => Some(Literal::Number(*n)),
            ExprKind::String(s) => Some(Literal::String(s.clone())),
            _ => None,
        }
    }

    /// Literal string content, `None` for anything computed
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[ObjectProperty]> {
        match &self.kind {
            ExprKind::Object(entries) => Some(entries),
            _ => None,
        }
    }
}
