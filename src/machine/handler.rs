//! Task handlers and their registry.

use super::kind::{ErrorKind, TaskFailure};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

/// A unit of work bound to a task state.
///
/// Handlers receive the current payload and return the next one, or a
/// classified failure for retry/catch matching.
pub trait TaskHandler: Send + Sync {
    fn invoke(&self, input: Value) -> Result<Value, TaskFailure>;
}

impl<F> TaskHandler for F
where
    F: Fn(Value) -> Result<Value, TaskFailure> + Send + Sync,
{
    fn invoke(&self, input: Value) -> Result<Value, TaskFailure> {
        self(input)
    }
}

/// Adapter returned by [`typed_handler`].
pub struct Typed<T, F> {
    f: F,
    _payload: PhantomData<fn(T) -> T>,
}

/// Wrap a function over a concrete payload type.
///
/// Input that does not decode as `T` fails with `UnmarshalError`.
pub fn typed_handler<T, F>(f: F) -> Typed<T, F>
where
    T: DeserializeOwned + Serialize,
    F: Fn(T) -> Result<T, TaskFailure> + Send + Sync,
{
    Typed {
        f,
        _payload: PhantomData,
    }
}

impl<T, F> TaskHandler for Typed<T, F>
where
    T: DeserializeOwned + Serialize,
    F: Fn(T) -> Result<T, TaskFailure> + Send + Sync,
{
    fn invoke(&self, input: Value) -> Result<Value, TaskFailure> {
        let payload: T = serde_json::from_value(input)
            .map_err(|e| TaskFailure::new(ErrorKind::Unmarshal, e.to_string()))?;
        let output = (self.f)(payload)?;
        serde_json::to_value(output)
            .map_err(|e| TaskFailure::new(ErrorKind::named("MarshalError"), e.to_string()))
    }
}

/// Run a handler, turning a panic into a `PanicError` failure.
pub(crate) fn invoke_guarded(handler: &dyn TaskHandler, input: Value) -> Result<Value, TaskFailure> {
    panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(input))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Err(TaskFailure::new(ErrorKind::Panic, message))
    })
}

/// Handlers keyed by the state name they serve.
#[derive(Default)]
pub struct TaskHandlers {
    handlers: HashMap<String, Box<dyn TaskHandler>>,
}

impl TaskHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `state`, replacing any previous binding.
    pub fn register<H>(&mut self, state: impl Into<String>, handler: H) -> &mut Self
    where
        H: TaskHandler + 'static,
    {
        self.handlers.insert(state.into(), Box::new(handler));
        self
    }

    pub fn get(&self, state: &str) -> Option<&dyn TaskHandler> {
        self.handlers.get(state).map(|h| h.as_ref())
    }

    pub fn contains(&self, state: &str) -> bool {
        self.handlers.contains_key(state)
    }

    /// Registered state names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for TaskHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandlers")
            .field("states", &self.names())
            .finish()
    }
}
