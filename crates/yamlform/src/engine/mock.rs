use super::{
    Engine, EngineError, InvokeRequest, ReadRequest, RegisterOptions, RegisterRequest,
    ResourceHandle, ResourceKind,
};
use crate::diagnostics::Severity;
use crate::output::{Output, OutputError};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// What the mock knows about a resource when computing its state
#[derive(Debug)]
pub struct MockResource<'a> {
    pub name: &'a str,
    pub token: &'a str,
    pub kind: ResourceKind,
    /// fully resolved inputs (or read state)
    pub inputs: &'a IndexMap<String, Value>,
    /// set for reads
    pub id: Option<&'a str>,
}

type ResourceFn =
    dyn Fn(&MockResource) -> Result<(String, IndexMap<String, Value>), String> + Send + Sync;
type InvokeFn =
    dyn Fn(&str, &IndexMap<String, Value>) -> Result<IndexMap<String, Value>, String> + Send + Sync;
type Job = Box<dyn FnOnce() + Send>;

/// Registration as seen by the mock
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub token: String,
    pub kind: ResourceKind,
    pub properties: IndexMap<String, Value>,
    pub options: RegisterOptions,
    pub read: bool,
}

/// In-memory [Engine]
///
/// By default a resource's id is `<name>-id` (reads keep the requested id) and its outputs echo its inputs.
/// During preview ids are unknown and outputs not among the inputs are unknown. In queued mode nothing
/// resolves until [MockEngine::settle] is called.
pub struct MockEngine {
    preview: bool,
    queued: bool,
    resources: Arc<ResourceFn>,
    invokes: Arc<InvokeFn>,
    queue: Mutex<VecDeque<Job>>,
    registrations: Mutex<Vec<Registration>>,
    invocations: Mutex<Vec<(String, IndexMap<String, Value>)>>,
    logs: Mutex<Vec<(Severity, String)>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            preview: false,
            queued: false,
            resources: Arc::new(
                |resource: &MockResource| -> Result<(String, IndexMap<String, Value>), String> {
                    let id = resource
                        .id
                        .map_or_else(|| format!("{}-id", resource.name), str::to_string);
                    Ok((id, resource.inputs.clone()))
                },
            ),
            invokes: Arc::new(
                |token: &str, _: &IndexMap<String, Value>| -> Result<IndexMap<String, Value>, String> {
                    Err(format!("no mock for function {token}"))
                },
            ),
            queue: Mutex::new(VecDeque::new()),
            registrations: Mutex::new(vec![]),
            invocations: Mutex::new(vec![]),
            logs: Mutex::new(vec![]),
        }
    }

    pub fn preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn queued(mut self, queued: bool) -> Self {
        self.queued = queued;
        self
    }

    /// Computes `(id, outputs)` of each created or read resource
    pub fn with_resources(
        mut self,
        resources: impl Fn(&MockResource) -> Result<(String, IndexMap<String, Value>), String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.resources = Arc::new(resources);
        self
    }

    pub fn with_invoke(
        mut self,
        invokes: impl Fn(&str, &IndexMap<String, Value>) -> Result<IndexMap<String, Value>, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.invokes = Arc::new(invokes);
        self
    }

    /// Runs queued resolutions until none are left, returns how many ran
    pub fn settle(&self) -> usize {
        let mut count = 0;
        loop {
            // the lock must be released before the job runs, jobs may queue more work
            let job = self.queue.lock().pop_front();
            let Some(job) = job else { break };
            job();
            count += 1;
        }
        tracing::debug!(count, "settled queued resolutions");
        count
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().clone()
    }

    pub fn invocations(&self) -> Vec<(String, IndexMap<String, Value>)> {
        self.invocations.lock().clone()
    }

    pub fn logs(&self) -> Vec<(Severity, String)> {
        self.logs.lock().clone()
    }

    /// Delays `output` until the next [MockEngine::settle] in queued mode
    fn deliver(&self, output: Output) -> Output {
        if !self.queued {
            return output;
        }

        let (delayed, resolver) = Output::pending();
        self.queue.lock().push_back(Box::new(move || {
            output.on_settled(move |settled| resolver.settle(settled.clone()))
        }));
        delayed
    }

    fn handle(
        &self,
        name: &str,
        token: &str,
        kind: ResourceKind,
        inputs: IndexMap<String, Value>,
        read_id: Option<String>,
        secret_outputs: Vec<String>,
    ) -> ResourceHandle {
        let resources = self.resources.clone();
        let preview = self.preview && read_id.is_none();
        let (owned_name, owned_token) = (name.to_string(), token.to_string());

        let state = Output::from_value(Value::Object(inputs)).apply(move |inputs| {
            let Value::Object(inputs) = inputs else {
                return Err(OutputError::Engine("inputs must be an object".to_string()));
            };

            let (id, outputs) = if preview {
                (Value::Output(Output::unknown()), inputs)
            } else {
                let (id, outputs) = resources(&MockResource {
                    name: &owned_name,
                    token: &owned_token,
                    kind,
                    inputs: &inputs,
                    id: read_id.as_deref(),
                })
                .map_err(OutputError::Engine)?;
                (Value::String(id), outputs)
            };

            let outputs: IndexMap<String, Value> = outputs
                .into_iter()
                .map(|(key, value)| {
                    if secret_outputs.contains(&key) {
                        (key, Value::Output(Output::secret(value)))
                    } else {
                        (key, value)
                    }
                })
                .collect();

            Ok([("id", id), ("outputs", Value::Object(outputs))]
                .into_iter()
                .collect())
        });
        let state = self.deliver(state);

        let field = |key: &'static str| {
            state.apply(move |state| match state {
                Value::Object(mut state) => Ok(state.swap_remove(key).unwrap_or(Value::Null)),
                other => Ok(other),
            })
        };

        ResourceHandle::new(
            name,
            token,
            kind,
            Output::known(Value::String(format!("urn:mock::{token}::{name}"))),
            (kind != ResourceKind::Component).then(|| field("id")),
            field("outputs"),
            preview,
        )
    }
}

impl Engine for MockEngine {
    fn register_resource(&self, request: RegisterRequest) -> Result<ResourceHandle, EngineError> {
        tracing::debug!(name = %request.name, token = %request.token, "mock register");
        self.registrations.lock().push(Registration {
            name: request.name.clone(),
            token: request.token.clone(),
            kind: request.kind,
            properties: request.properties.clone(),
            options: request.options.clone(),
            read: false,
        });

        Ok(self.handle(
            &request.name,
            &request.token,
            request.kind,
            request.properties,
            None,
            request.options.additional_secret_outputs,
        ))
    }

    fn read_resource(&self, request: ReadRequest) -> Result<ResourceHandle, EngineError> {
        tracing::debug!(name = %request.name, token = %request.token, "mock read");
        let Value::String(id) = &request.id else {
            return Err(EngineError::Read {
                name: request.name,
                token: request.token,
                reason: format!("id must be a known string, not {}", request.id.type_string()),
            });
        };

        self.registrations.lock().push(Registration {
            name: request.name.clone(),
            token: request.token.clone(),
            kind: ResourceKind::Custom,
            properties: request.state.clone(),
            options: request.options.clone(),
            read: true,
        });

        Ok(self.handle(
            &request.name,
            &request.token,
            ResourceKind::Custom,
            request.state,
            Some(id.clone()),
            request.options.additional_secret_outputs,
        ))
    }

    fn invoke(&self, request: InvokeRequest) -> Result<Output, EngineError> {
        tracing::debug!(token = %request.token, "mock invoke");
        self.invocations
            .lock()
            .push((request.token.clone(), request.arguments.clone()));

        if !self.queued && !request.arguments.values().any(Value::contains_output) {
            return (self.invokes)(&request.token, &request.arguments)
                .map(|result| Output::known(Value::Object(result)))
                .map_err(|reason| EngineError::Invoke {
                    token: request.token,
                    reason,
                });
        }

        let invokes = self.invokes.clone();
        let token = request.token;
        let result = Output::from_value(Value::Object(request.arguments)).apply(move |arguments| match arguments {
            Value::Object(arguments) => invokes(&token, &arguments)
                .map(Value::Object)
                .map_err(|reason| OutputError::Engine(format!("failed to invoke {token}: {reason}"))),
            _ => Err(OutputError::Engine("arguments must be an object".to_string())),
        });
        Ok(self.deliver(result))
    }

    fn log(&self, severity: Severity, message: &str) {
        self.logs.lock().push((severity, message.to_string()));
    }

    fn is_preview(&self) -> bool {
        self.preview
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::output::Settled;
    use pretty_assertions::assert_eq;

    fn request(name: &str, properties: IndexMap<String, Value>) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            token: "cloud:index:Network".to_string(),
            kind: ResourceKind::Custom,
            properties,
            options: RegisterOptions::default(),
        }
    }

    fn known(value: impl Into<Value>) -> Option<Settled> {
        Some(Settled::Known {
            value: value.into(),
            secret: false,
        })
    }

    #[test]
    fn outputs_echo_inputs() {
        let engine = MockEngine::new();
        let handle = engine
            .register_resource(request("net", [("cidr".to_string(), Value::from("10.0.0.0/16"))].into()))
            .unwrap();

        assert_eq!(handle.id().unwrap().peek(), known("net-id"));
        assert_eq!(handle.output("cidr").peek(), known("10.0.0.0/16"));
        assert_eq!(engine.registrations().len(), 1);
    }

    #[test]
    fn preview_ids_are_unknown() {
        let engine = MockEngine::new().preview(true);
        let handle = engine.register_resource(request("net", IndexMap::new())).unwrap();

        assert_eq!(
            handle.id().unwrap().peek(),
            Some(Settled::Unknown { secret: false })
        );
        assert_eq!(
            handle.output("subnetIds").peek(),
            Some(Settled::Unknown { secret: false })
        );
    }

    #[test]
    fn queued_resolution() {
        let engine = MockEngine::new().queued(true);
        let handle = engine.register_resource(request("net", IndexMap::new())).unwrap();
        let id = handle.id().unwrap().clone();

        assert_eq!(id.peek(), None);
        assert_eq!(engine.settle(), 1);
        assert_eq!(id.peek(), known("net-id"));
    }

    #[test]
    fn settled_jobs_may_queue_more_work() {
        let engine = Arc::new(MockEngine::new().queued(true));
        let net = engine.register_resource(request("net", IndexMap::new())).unwrap();

        let (subnet_id, resolver) = Output::pending();
        let inner = engine.clone();
        net.id().unwrap().on_settled(move |_| {
            let subnet = inner
                .register_resource(request("subnet", IndexMap::new()))
                .unwrap();
            subnet
                .id()
                .unwrap()
                .on_settled(move |settled| resolver.settle(settled.clone()));
        });

        assert_eq!(engine.settle(), 2);
        assert_eq!(subnet_id.peek(), known("subnet-id"));
        assert_eq!(engine.registrations().len(), 2);
    }

    #[test]
    fn invoke_failures() {
        let engine = MockEngine::new().with_invoke(|token, args| match token {
            "cloud:index:getRegion" => Ok([("name".to_string(), args["name"].clone())].into()),
            _ => Err("unsupported".to_string()),
        });

        let region = engine
            .invoke(InvokeRequest {
                token: "cloud:index:getRegion".to_string(),
                arguments: [("name".to_string(), Value::from("eu-north-1"))].into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            region.peek(),
            known([("name", "eu-north-1")].into_iter().collect::<Value>())
        );

        let error = engine
            .invoke(InvokeRequest {
                token: "cloud:index:getQuota".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "failed to invoke cloud:index:getQuota: unsupported"
        );
    }
}
