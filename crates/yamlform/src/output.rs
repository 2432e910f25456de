//! deferred values
//!
//! An [Output] stands for a value the engine has not reported yet. It settles exactly once, to a known
//! value, to an unknown value (during preview) or to a failure. Each settled state carries a secret flag.
//!
//! Composition happens through continuations: [Output::apply] registers a callback and returns a new
//! output immediately. Callbacks run on whichever thread settles the output, never while a lock is held,
//! so a callback may freely create, settle or apply other outputs.
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OutputError {
    /// The failure has been reported as a diagnostic already
    #[error("{0}")]
    Reported(String),
    #[error("{0}")]
    Engine(String),
    #[error("output was dropped before it was resolved")]
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Known { value: Value, secret: bool },
    Unknown { secret: bool },
    Failed(OutputError),
}

impl Settled {
    pub fn is_secret(&self) -> bool {
        match self {
            Settled::Known { secret, .. } | Settled::Unknown { secret } => *secret,
            Settled::Failed(_) => false,
        }
    }

    fn with_secret(self, outer: bool) -> Settled {
        match self {
            Settled::Known { value, secret } => Settled::Known {
                value,
                secret: secret || outer,
            },
            Settled::Unknown { secret } => Settled::Unknown {
                secret: secret || outer,
            },
            failed => failed,
        }
    }
}

type Callback = Box<dyn FnOnce(&Settled) + Send>;

enum State {
    Pending(Vec<Callback>),
    Settled(Settled),
}

#[derive(Clone)]
pub struct Output {
    inner: Arc<Mutex<State>>,
}

/// Settles the [Output] it was created with. Dropping it unsettled fails the output.
pub struct Resolver {
    output: Option<Output>,
}

impl Output {
    pub fn pending() -> (Output, Resolver) {
        let output = Output {
            inner: Arc::new(Mutex::new(State::Pending(vec![]))),
        };
        let resolver = Resolver {
            output: Some(output.clone()),
        };
        (output, resolver)
    }

    pub fn settled(settled: Settled) -> Output {
        Output {
            inner: Arc::new(Mutex::new(State::Settled(settled))),
        }
    }

    pub fn known(value: Value) -> Output {
        Output::settled(Settled::Known {
            value,
            secret: false,
        })
    }

    pub fn secret(value: Value) -> Output {
        Output::settled(Settled::Known {
            value,
            secret: true,
        })
    }

    pub fn unknown() -> Output {
        Output::settled(Settled::Unknown { secret: false })
    }

    pub fn failed(error: OutputError) -> Output {
        Output::settled(Settled::Failed(error))
    }

    /// Current state, `None` while pending
    pub fn peek(&self) -> Option<Settled> {
        match &*self.inner.lock() {
            State::Pending(_) => None,
            State::Settled(settled) => Some(settled.clone()),
        }
    }

    pub fn ptr_eq(&self, other: &Output) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs `callback` once settled, immediately if that already happened
    pub fn on_settled(&self, callback: impl FnOnce(&Settled) + Send + 'static) {
        let settled = {
            let mut state = self.inner.lock();
            match &mut *state {
                State::Pending(callbacks) => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Settled(settled) => settled.clone(),
            }
        };
        callback(&settled)
    }

    /// Maps the known value
    ///
    /// Unknown and failed states pass through untouched, secrecy is carried over. When `f` returns another
    /// output the result follows that output.
    pub fn apply(
        &self,
        f: impl FnOnce(Value) -> Result<Value, OutputError> + Send + 'static,
    ) -> Output {
        let (output, resolver) = Output::pending();
        self.on_settled(move |settled| match settled {
            Settled::Known { value, secret } => {
                let secret = *secret;
                match f(value.clone()) {
                    Ok(Value::Output(inner)) => {
                        inner.on_settled(move |settled| {
                            resolver.settle(settled.clone().with_secret(secret))
                        });
                    }
                    Ok(value) => resolver.settle(Settled::Known { value, secret }),
                    Err(error) => resolver.settle(Settled::Failed(error)),
                }
            }
            other => resolver.settle(other.clone()),
        });
        output
    }

    /// Same value, marked secret
    pub fn into_secret(self) -> Output {
        let (output, resolver) = Output::pending();
        self.on_settled(move |settled| resolver.settle(settled.clone().with_secret(true)));
        output
    }

    /// Joins outputs into one resolving to a list of their values
    ///
    /// Settles once every input settled: failed if any failed, unknown if any is unknown, secret if any is
    /// secret.
    pub fn all(outputs: Vec<Output>) -> Output {
        if outputs.is_empty() {
            return Output::known(Value::List(vec![]));
        }

        let (output, resolver) = Output::pending();
        let join = Arc::new(Mutex::new(Join {
            remaining: outputs.len(),
            slots: vec![None; outputs.len()],
            resolver: Some(resolver),
        }));

        for (index, input) in outputs.into_iter().enumerate() {
            let join = join.clone();
            input.on_settled(move |settled| {
                let finished = {
                    let mut join = join.lock();
                    join.slots[index] = Some(settled.clone());
                    join.remaining -= 1;
                    if join.remaining == 0 {
                        join.resolver
                            .take()
                            .map(|resolver| (resolver, std::mem::take(&mut join.slots)))
                    } else {
                        None
                    }
                };
                if let Some((resolver, slots)) = finished {
                    resolver.settle(Join::combine(slots.into_iter().flatten()));
                }
            });
        }

        output
    }

    /// Output of a value with every nested output resolved
    pub fn from_value(value: Value) -> Output {
        match value {
            Value::Output(output) => output.apply(|value| Ok(Value::Output(Output::from_value(value)))),
            value if !value.contains_output() => Output::known(value),
            Value::List(items) => Output::all(items.into_iter().map(Output::from_value).collect()),
            Value::Object(entries) => {
                let keys: Vec<String> = entries.keys().cloned().collect();
                Output::all(entries.into_values().map(Output::from_value).collect()).apply(
                    move |values| match values {
                        Value::List(values) => Ok(Value::Object(keys.into_iter().zip(values).collect())),
                        other => Ok(other),
                    },
                )
            }
            other => Output::known(other),
        }
    }
}

struct Join {
    remaining: usize,
    slots: Vec<Option<Settled>>,
    resolver: Option<Resolver>,
}

impl Join {
    fn combine(settled: impl Iterator<Item = Settled>) -> Settled {
        let mut values = vec![];
        let mut secret = false;
        let mut unknown = false;

        for settled in settled {
            match settled {
                Settled::Failed(error) => return Settled::Failed(error),
                Settled::Unknown { secret: s } => {
                    unknown = true;
                    secret |= s;
                }
                Settled::Known { value, secret: s } => {
                    values.push(value);
                    secret |= s;
                }
            }
        }

        if unknown {
            Settled::Unknown { secret }
        } else {
            Settled::Known {
                value: Value::List(values),
                secret,
            }
        }
    }
}

impl Resolver {
    pub fn settle(mut self, settled: Settled) {
        if let Some(output) = self.output.take() {
            settle(&output, settled);
        }
    }

    pub fn resolve(self, value: Value, secret: bool) {
        self.settle(Settled::Known { value, secret })
    }

    pub fn unknown(self, secret: bool) {
        self.settle(Settled::Unknown { secret })
    }

    pub fn fail(self, error: OutputError) {
        self.settle(Settled::Failed(error))
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(output) = self.output.take() {
            tracing::debug!("resolver dropped before settling");
            settle(&output, Settled::Failed(OutputError::Dropped));
        }
    }
}

fn settle(output: &Output, settled: Settled) {
    let callbacks = {
        let mut state = output.inner.lock();
        match std::mem::replace(&mut *state, State::Settled(settled.clone())) {
            State::Pending(callbacks) => callbacks,
            State::Settled(previous) => {
                // first settlement wins
                *state = State::Settled(previous);
                return;
            }
        }
    };

    for callback in callbacks {
        callback(&settled);
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            None => f.write_str("Output(pending)"),
            Some(settled) => write!(f, "Output({settled:?})"),
        }
    }
}

impl PartialEq for Output {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || matches!((self.peek(), other.peek()), (Some(a), Some(b)) if a == b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn number(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn apply_waits_for_resolution() {
        let (output, resolver) = Output::pending();
        let doubled = output.apply(|value| match value {
            Value::Number(n) => Ok(Value::Number(n * 2.0)),
            _ => Err(OutputError::Reported("not a number".to_string())),
        });

        assert_eq!(doubled.peek(), None);
        resolver.resolve(number(21.0), true);
        assert_eq!(
            doubled.peek(),
            Some(Settled::Known {
                value: number(42.0),
                secret: true
            })
        );
    }

    #[test]
    fn apply_flattens_and_skips_unknown() {
        let nested = Output::known(number(1.0)).apply(|_| Ok(Value::Output(Output::secret(number(2.0)))));
        assert_eq!(
            nested.peek(),
            Some(Settled::Known {
                value: number(2.0),
                secret: true
            })
        );

        let unknown = Output::unknown().apply(|_| panic!("must not run on unknown values"));
        assert_eq!(unknown.peek(), Some(Settled::Unknown { secret: false }));
    }

    #[test]
    fn all_joins() {
        let (first, resolve_first) = Output::pending();
        let joined = Output::all(vec![first, Output::secret(number(2.0))]);
        assert_eq!(joined.peek(), None);

        resolve_first.resolve(number(1.0), false);
        assert_eq!(
            joined.peek(),
            Some(Settled::Known {
                value: Value::List(vec![number(1.0), number(2.0)]),
                secret: true
            })
        );

        let failed = Output::all(vec![
            Output::unknown(),
            Output::failed(OutputError::Engine("boom".to_string())),
        ]);
        assert_eq!(
            failed.peek(),
            Some(Settled::Failed(OutputError::Engine("boom".to_string())))
        );
    }

    #[test]
    fn deep_resolution() {
        let (inner, resolver) = Output::pending();
        let value = Value::Object(
            [
                ("a".to_string(), number(1.0)),
                (
                    "b".to_string(),
                    Value::List(vec![Value::Output(inner), number(3.0)]),
                ),
            ]
            .into_iter()
            .collect(),
        );

        let resolved = Output::from_value(value);
        assert_eq!(resolved.peek(), None);
        resolver.resolve(number(2.0), false);

        let Some(Settled::Known { value, secret }) = resolved.peek() else {
            panic!("should be known");
        };
        assert!(!secret);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":1,"b":[2,3]}"#);
    }

    #[test]
    fn dropped_resolver_fails() {
        let (output, resolver) = Output::pending();
        drop(resolver);
        assert_eq!(output.peek(), Some(Settled::Failed(OutputError::Dropped)));
    }
}
