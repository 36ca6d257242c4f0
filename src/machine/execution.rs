//! Workflow execution.
//!
//! One state is active at a time. For a task state the bound handler is
//! invoked; on failure the retry rules are walked in declaration order and
//! the first matching rule decides whether to re-invoke. Once that rule is
//! exhausted, or none matched, the catch rules are walked the same way. A
//! failure no rule catches ends the run as [`Outcome::Unhandled`].
//!
//! Retry counters are per rule and reset each time the state is entered.

use super::definition::{Definition, State, TaskState};
use super::handler::{TaskHandlers, invoke_guarded};
use super::kind::TaskFailure;
use crate::error::{Result, WardenError};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default cap on state entries per run.
pub const DEFAULT_MAX_TRANSITIONS: usize = 1000;

// ============================================================================
// Sleeping
// ============================================================================

/// Waits between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Records requested waits without sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wait requested so far, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(duration);
    }
}

// ============================================================================
// Results
// ============================================================================

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A `Succeed` state was reached.
    Succeeded,

    /// A `Fail` state was reached.
    Failed {
        state: String,
        error: String,
        cause: Option<String>,
    },

    /// A handler failure matched no catch rule.
    Unhandled { state: String, failure: TaskFailure },

    /// The run entered more states than allowed.
    TransitionLimit { state: String, limit: usize },
}

/// What happened in one step of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The handler returned; the run moves to `next`.
    Completed { next: String },

    /// The handler failed and will be invoked again.
    Retried {
        attempt: u32,
        failure: TaskFailure,
        wait: Duration,
    },

    /// The failure was routed to `next`.
    Caught { failure: TaskFailure, next: String },

    /// The failure was not caught.
    Unhandled { failure: TaskFailure },

    Succeeded,

    Failed { error: String },
}

/// One history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEvent {
    pub state: String,
    pub event: Event,
}

/// Result of a run: the outcome, the final payload and the step history.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: Outcome,
    pub output: Value,
    pub history: Vec<HistoryEvent>,
}

impl Execution {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// States entered, in order, once per entry.
    pub fn path(&self) -> Vec<&str> {
        let mut path: Vec<&str> = Vec::new();
        let mut entering = true;
        for entry in &self.history {
            if entering {
                path.push(&entry.state);
            }
            entering = !matches!(entry.event, Event::Retried { .. });
        }
        path
    }

    /// Name of the state the run ended in.
    pub fn final_state(&self) -> Option<&str> {
        self.history.last().map(|e| e.state.as_str())
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Runs a [`Definition`] against a set of [`TaskHandlers`].
pub struct Executor<'a> {
    definition: &'a Definition,
    handlers: &'a TaskHandlers,
    sleeper: &'a dyn Sleeper,
    max_transitions: usize,
}

impl<'a> Executor<'a> {
    pub fn new(definition: &'a Definition, handlers: &'a TaskHandlers) -> Self {
        Self {
            definition,
            handlers,
            sleeper: &THREAD_SLEEPER,
            max_transitions: DEFAULT_MAX_TRANSITIONS,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_max_transitions(mut self, max_transitions: usize) -> Self {
        self.max_transitions = max_transitions;
        self
    }

    /// Fail if any task state has no handler.
    pub fn check_bindings(&self) -> Result<()> {
        match self
            .definition
            .task_names()
            .find(|name| !self.handlers.contains(name))
        {
            Some(name) => Err(WardenError::UnboundStateError(name.to_string())),
            None => Ok(()),
        }
    }

    /// Run from `StartAt` with `input` as the initial payload.
    ///
    /// Handler failures are always reported through [`Outcome`]; an `Err`
    /// means the definition and handlers do not fit together.
    #[instrument(skip_all, fields(start_at = %self.definition.start_at()))]
    pub fn execute(&self, input: Value) -> Result<Execution> {
        self.check_bindings()?;

        let mut history = Vec::new();
        let mut payload = input;
        let mut current = self.definition.start_at().to_string();
        let mut entries = 0usize;

        loop {
            if entries >= self.max_transitions {
                warn!(state = %current, limit = self.max_transitions, "transition limit reached");
                return Ok(Execution {
                    outcome: Outcome::TransitionLimit {
                        state: current,
                        limit: self.max_transitions,
                    },
                    output: payload,
                    history,
                });
            }
            entries += 1;

            let state = self.definition.state(&current).ok_or_else(|| {
                WardenError::ParseError(format!("unknown state '{}'", current))
            })?;

            match state {
                State::Succeed => {
                    info!(state = %current, "workflow succeeded");
                    history.push(HistoryEvent {
                        state: current,
                        event: Event::Succeeded,
                    });
                    return Ok(Execution {
                        outcome: Outcome::Succeeded,
                        output: payload,
                        history,
                    });
                }
                State::Fail(fail) => {
                    info!(state = %current, error = %fail.error, "workflow failed");
                    history.push(HistoryEvent {
                        state: current.clone(),
                        event: Event::Failed {
                            error: fail.error.clone(),
                        },
                    });
                    return Ok(Execution {
                        outcome: Outcome::Failed {
                            state: current,
                            error: fail.error.clone(),
                            cause: fail.cause.clone(),
                        },
                        output: payload,
                        history,
                    });
                }
                State::Task(task) => {
                    debug!(state = %current, "entering task state");
                    match self.run_task(&current, task, payload, &mut history)? {
                        Step::Next(next, output) => {
                            payload = output;
                            current = next;
                        }
                        Step::Unhandled(failure, output) => {
                            return Ok(Execution {
                                outcome: Outcome::Unhandled {
                                    state: current,
                                    failure,
                                },
                                output,
                                history,
                            });
                        }
                    }
                }
            }
        }
    }

    fn run_task(
        &self,
        name: &str,
        task: &TaskState,
        payload: Value,
        history: &mut Vec<HistoryEvent>,
    ) -> Result<Step> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| WardenError::UnboundStateError(name.to_string()))?;
        let mut attempts = vec![0u32; task.retry.len()];

        loop {
            let failure = match invoke_guarded(handler, payload.clone()) {
                Ok(output) => {
                    history.push(HistoryEvent {
                        state: name.to_string(),
                        event: Event::Completed {
                            next: task.next.clone(),
                        },
                    });
                    return Ok(Step::Next(task.next.clone(), output));
                }
                Err(failure) => failure,
            };

            if let Some(index) = task.retry.iter().position(|r| r.matches(&failure.kind)) {
                let rule = &task.retry[index];
                if attempts[index] < rule.max_attempts {
                    attempts[index] += 1;
                    let wait = Duration::from_secs(rule.interval_seconds);
                    warn!(
                        state = name,
                        attempt = attempts[index],
                        max_attempts = rule.max_attempts,
                        error = %failure,
                        "task failed, retrying"
                    );
                    history.push(HistoryEvent {
                        state: name.to_string(),
                        event: Event::Retried {
                            attempt: attempts[index],
                            failure,
                            wait,
                        },
                    });
                    self.sleeper.sleep(wait);
                    continue;
                }
            }

            if let Some(rule) = task.catch.iter().find(|r| r.matches(&failure.kind)) {
                info!(state = name, next = %rule.next, error = %failure, "task failure caught");
                let output = rule.result_path.apply(payload, failure.to_value());
                history.push(HistoryEvent {
                    state: name.to_string(),
                    event: Event::Caught {
                        failure,
                        next: rule.next.clone(),
                    },
                });
                return Ok(Step::Next(rule.next.clone(), output));
            }

            warn!(state = name, error = %failure, "task failure unhandled");
            history.push(HistoryEvent {
                state: name.to_string(),
                event: Event::Unhandled {
                    failure: failure.clone(),
                },
            });
            return Ok(Step::Unhandled(failure, payload));
        }
    }
}

enum Step {
    Next(String, Value),
    Unhandled(TaskFailure, Value),
}

/// Run `definition` with the default sleeper and transition limit.
pub fn execute(definition: &Definition, handlers: &TaskHandlers, input: Value) -> Result<Execution> {
    Executor::new(definition, handlers).execute(input)
}
