//! orchestration engine contract
//!
//! The evaluator hands resources and function calls to an [Engine] and receives [ResourceHandle]s and
//! [Output]s back. Values inside requests may still contain outputs.
mod mock;

pub use mock::{MockEngine, MockResource};

use crate::diagnostics::Severity;
use crate::output::Output;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("failed to register resource {name:?} ({token}): {reason}")]
    Register {
        name: String,
        token: String,
        reason: String,
    },
    #[error("failed to read resource {name:?} ({token}): {reason}")]
    Read {
        name: String,
        token: String,
        reason: String,
    },
    #[error("failed to invoke {token}: {reason}")]
    Invoke { token: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Custom,
    Provider,
    Component,
}

/// Registered resource, its state arrives later
#[derive(Clone)]
pub struct ResourceHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    name: String,
    token: String,
    kind: ResourceKind,
    urn: Output,
    id: Option<Output>,
    outputs: Output,
    /// absent outputs are unknown rather than null
    preview: bool,
}

impl ResourceHandle {
    pub fn new(
        name: impl Into<String>,
        token: impl Into<String>,
        kind: ResourceKind,
        urn: Output,
        id: Option<Output>,
        outputs: Output,
        preview: bool,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name: name.into(),
                token: token.into(),
                kind,
                urn,
                id,
                outputs,
                preview,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    pub fn is_provider(&self) -> bool {
        self.inner.kind == ResourceKind::Provider
    }

    pub fn urn(&self) -> &Output {
        &self.inner.urn
    }

    /// `None` for components
    pub fn id(&self) -> Option<&Output> {
        self.inner.id.as_ref()
    }

    /// All output properties as one object
    pub fn outputs(&self) -> &Output {
        &self.inner.outputs
    }

    pub fn output(&self, key: &str) -> Output {
        let key = key.to_string();
        let preview = self.inner.preview;
        self.inner.outputs.apply(move |outputs| {
            Ok(match outputs {
                Value::Object(mut entries) => match entries.swap_remove(&key) {
                    Some(value) => value,
                    None if preview => Value::Output(Output::unknown()),
                    None => Value::Null,
                },
                _ if preview => Value::Output(Output::unknown()),
                _ => Value::Null,
            })
        })
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("name", &self.inner.name)
            .field("token", &self.inner.token)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomTimeouts {
    pub create: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

/// Resource options after evaluation
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub parent: Option<ResourceHandle>,
    pub provider: Option<ResourceHandle>,
    pub providers: Vec<ResourceHandle>,
    pub depends_on: Vec<ResourceHandle>,
    pub deleted_with: Option<ResourceHandle>,
    pub protect: Option<bool>,
    pub delete_before_replace: Option<bool>,
    pub retain_on_delete: Option<bool>,
    pub ignore_changes: Vec<String>,
    pub replace_on_changes: Vec<String>,
    pub additional_secret_outputs: Vec<String>,
    pub aliases: Vec<Value>,
    pub custom_timeouts: Option<CustomTimeouts>,
    pub import: Option<String>,
    pub version: Option<String>,
    pub plugin_download_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub name: String,
    pub token: String,
    pub kind: ResourceKind,
    pub properties: IndexMap<String, Value>,
    pub options: RegisterOptions,
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub name: String,
    pub token: String,
    pub id: Value,
    pub state: IndexMap<String, Value>,
    pub options: RegisterOptions,
}

#[derive(Debug, Clone, Default)]
pub struct InvokeRequest {
    pub token: String,
    pub arguments: IndexMap<String, Value>,
    pub parent: Option<ResourceHandle>,
    pub provider: Option<ResourceHandle>,
    pub depends_on: Vec<ResourceHandle>,
    pub version: Option<String>,
    pub plugin_download_url: Option<String>,
}

pub trait Engine: Send + Sync {
    fn register_resource(&self, request: RegisterRequest) -> Result<ResourceHandle, EngineError>;

    /// Reads the state of an existing resource
    fn read_resource(&self, request: ReadRequest) -> Result<ResourceHandle, EngineError>;

    /// Calls a provider function, the result resolves to an object
    fn invoke(&self, request: InvokeRequest) -> Result<Output, EngineError>;

    fn log(&self, severity: Severity, message: &str);

    fn is_preview(&self) -> bool;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::output::Settled;
    use pretty_assertions::assert_eq;

    #[test]
    fn output_lookup() {
        let outputs = Output::known([("arn", "arn:bucket")].into_iter().collect());
        let handle = |preview| {
            ResourceHandle::new(
                "site",
                "cloud:storage/bucket:Bucket",
                ResourceKind::Custom,
                Output::known("urn:site".into()),
                None,
                outputs.clone(),
                preview,
            )
        };

        assert_eq!(
            handle(false).output("arn").peek(),
            Some(Settled::Known {
                value: "arn:bucket".into(),
                secret: false
            })
        );
        assert_eq!(
            handle(false).output("missing").peek(),
            Some(Settled::Known {
                value: Value::Null,
                secret: false
            })
        );
        assert_eq!(
            handle(true).output("missing").peek(),
            Some(Settled::Unknown { secret: false })
        );
    }
}
