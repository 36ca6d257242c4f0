//! Declarative workflow engine.
//!
//! A [`Definition`] is parsed from JSON, [`TaskHandlers`] are bound to its
//! task states by name, and an [`Executor`] walks the states from `StartAt`
//! until a `Succeed` or `Fail` state is reached or a failure goes uncaught.
//!
//! The engine performs no I/O of its own. Payloads are JSON values; typed
//! handlers decode them through [`typed_handler`].

mod definition;
mod execution;
mod handler;
mod kind;
mod resource;


pub use definition::{
    CatchRule, Definition, EMPTY_DEFINITION, FailState, ResultPath, RetryRule, State, TaskState,
};
pub use execution::{
    DEFAULT_MAX_TRANSITIONS, Event, Execution, Executor, HistoryEvent, Outcome, RecordingSleeper,
    Sleeper, ThreadSleeper, execute,
};
pub use handler::{TaskHandler, TaskHandlers, Typed, typed_handler};
pub use kind::{ErrorKind, ErrorPattern, MATCH_ALL, TaskFailure};
pub use resource::{placeholders, resolve_resource, resource_vars};
