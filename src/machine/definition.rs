//! Workflow definition parsing.
//!
//! A definition is a JSON document:
//!
//! ```json
//! {
//!   "StartAt": "Validate",
//!   "States": {
//!     "Validate": {"Type": "Task", "Resource": "...", "Next": "Done",
//!                  "Retry": [...], "Catch": [...]},
//!     "Done": {"Type": "Succeed"}
//!   }
//! }
//! ```
//!
//! Parsing goes through loose serde structs, then every reference is checked
//! before a [`Definition`] is built. A definition that exists is well formed.

use super::kind::{ErrorKind, ErrorPattern};
use super::resource;
use crate::error::{Result, WardenError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Definition with a single `Succeed` state.
pub const EMPTY_DEFINITION: &str = r#"{"StartAt": "Done", "States": {"Done": {"Type": "Succeed"}}}"#;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INTERVAL_SECONDS: u64 = 1;

// ============================================================================
// Parsed model
// ============================================================================

/// A validated workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Definition {
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    start_at: String,
    states: BTreeMap<String, State>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Type")]
pub enum State {
    Task(TaskState),
    Fail(FailState),
    Succeed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    /// Handler binding, possibly still templated.
    pub resource: String,
    pub next: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<RetryRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<CatchRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailState {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryRule {
    pub error_equals: Vec<ErrorPattern>,
    pub max_attempts: u32,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatchRule {
    pub error_equals: Vec<ErrorPattern>,
    pub result_path: ResultPath,
    pub next: String,
}

fn any_matches(patterns: &[ErrorPattern], kind: &ErrorKind) -> bool {
    patterns.iter().any(|p| p.matches(kind))
}

impl RetryRule {
    pub fn matches(&self, kind: &ErrorKind) -> bool {
        any_matches(&self.error_equals, kind)
    }
}

impl CatchRule {
    pub fn matches(&self, kind: &ErrorKind) -> bool {
        any_matches(&self.error_equals, kind)
    }
}

/// Where a catch rule writes the error object into the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultPath {
    /// `$`: the error object replaces the payload.
    #[default]
    Root,
    /// `$.a.b`: the error object is written at the nested field.
    Field(Vec<String>),
}

impl ResultPath {
    pub fn parse(path: &str) -> Result<Self> {
        if path == "$" {
            return Ok(ResultPath::Root);
        }

        let Some(rest) = path.strip_prefix("$.") else {
            return Err(WardenError::ParseError(format!(
                "ResultPath '{}' must be '$' or start with '$.'",
                path
            )));
        };

        let segments: Vec<String> = rest.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(WardenError::ParseError(format!(
                "ResultPath '{}' has an empty segment",
                path
            )));
        }
        Ok(ResultPath::Field(segments))
    }

    /// Write `value` into `payload` at this path.
    ///
    /// Missing or non-object intermediates are replaced by objects.
    pub fn apply(&self, payload: Value, value: Value) -> Value {
        let segments = match self {
            ResultPath::Root => return value,
            ResultPath::Field(segments) => segments,
        };

        let mut root = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        write_at(&mut root, segments, value);
        Value::Object(root)
    }
}

fn write_at(target: &mut Map<String, Value>, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let slot = target
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                write_at(child, rest, value);
            }
        }
    }
}

impl fmt::Display for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultPath::Root => write!(f, "$"),
            ResultPath::Field(segments) => write!(f, "$.{}", segments.join(".")),
        }
    }
}

impl Serialize for ResultPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Raw document
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDefinition {
    comment: Option<String>,
    start_at: Option<String>,
    states: Option<BTreeMap<String, RawState>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
    #[serde(rename = "Type")]
    kind: Option<String>,
    resource: Option<String>,
    next: Option<String>,
    #[serde(default)]
    retry: Vec<RawRetry>,
    #[serde(default)]
    catch: Vec<RawCatch>,
    error: Option<String>,
    cause: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRetry {
    #[serde(default)]
    error_equals: Vec<String>,
    max_attempts: Option<u32>,
    interval_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCatch {
    #[serde(default)]
    error_equals: Vec<String>,
    result_path: Option<String>,
    next: Option<String>,
}

fn parse_patterns(state: &str, what: &str, raw: Vec<String>) -> Result<Vec<ErrorPattern>> {
    if raw.is_empty() {
        return Err(WardenError::ParseError(format!(
            "state '{}': {} rule has an empty ErrorEquals",
            state, what
        )));
    }
    if raw.iter().any(String::is_empty) {
        return Err(WardenError::ParseError(format!(
            "state '{}': {} rule has an empty error name",
            state, what
        )));
    }
    Ok(raw.into_iter().map(ErrorPattern::from).collect())
}

fn require<'a>(state: &str, field: &str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(WardenError::ParseError(format!(
            "state '{}' is missing {}",
            state, field
        ))),
    }
}

fn convert_state(name: &str, raw: RawState) -> Result<State> {
    let kind = require(name, "Type", &raw.kind)?;

    match kind {
        "Task" | "TaskFn" => {
            let resource = require(name, "Resource", &raw.resource)?.to_string();
            let next = require(name, "Next", &raw.next)?.to_string();

            let retry = raw
                .retry
                .into_iter()
                .map(|r| {
                    Ok(RetryRule {
                        error_equals: parse_patterns(name, "Retry", r.error_equals)?,
                        max_attempts: r.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                        interval_seconds: r.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let catch = raw
                .catch
                .into_iter()
                .map(|c| {
                    let result_path = match c.result_path.as_deref() {
                        Some(path) => ResultPath::parse(path)?,
                        None => ResultPath::Root,
                    };
                    Ok(CatchRule {
                        error_equals: parse_patterns(name, "Catch", c.error_equals)?,
                        result_path,
                        next: require(name, "Catch Next", &c.next)?.to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(State::Task(TaskState {
                resource,
                next,
                retry,
                catch,
            }))
        }
        "Fail" => Ok(State::Fail(FailState {
            error: require(name, "Error", &raw.error)?.to_string(),
            cause: raw.cause,
        })),
        "Succeed" => Ok(State::Succeed),
        other => Err(WardenError::ParseError(format!(
            "state '{}' has unknown Type '{}'",
            name, other
        ))),
    }
}

// ============================================================================
// Definition
// ============================================================================

impl Definition {
    /// Parse and validate a JSON definition.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: RawDefinition = serde_json::from_slice(bytes)
            .map_err(|e| WardenError::ParseError(format!("malformed definition: {}", e)))?;

        let start_at = match raw.start_at {
            Some(start) if !start.is_empty() => start,
            _ => return Err(WardenError::ParseError("StartAt is missing".to_string())),
        };

        let raw_states = raw.states.unwrap_or_default();
        if raw_states.is_empty() {
            return Err(WardenError::ParseError("States is empty".to_string()));
        }

        let mut states = BTreeMap::new();
        for (name, raw_state) in raw_states {
            if name.is_empty() {
                return Err(WardenError::ParseError(
                    "state names must not be empty".to_string(),
                ));
            }
            let state = convert_state(&name, raw_state)?;
            states.insert(name, state);
        }

        let definition = Definition {
            comment: raw.comment,
            start_at,
            states,
        };
        definition.check_references()?;
        Ok(definition)
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        Self::parse(text.as_bytes())
    }

    fn check_references(&self) -> Result<()> {
        let unknown = |from: &str, to: &str| {
            WardenError::ParseError(format!(
                "state '{}' refers to unknown state '{}'",
                from, to
            ))
        };

        if !self.states.contains_key(&self.start_at) {
            return Err(WardenError::ParseError(format!(
                "StartAt refers to unknown state '{}'",
                self.start_at
            )));
        }

        for (name, state) in &self.states {
            let State::Task(task) = state else {
                continue;
            };
            if !self.states.contains_key(&task.next) {
                return Err(unknown(name, &task.next));
            }
            for rule in &task.catch {
                if !self.states.contains_key(&rule.next) {
                    return Err(unknown(name, &rule.next));
                }
            }
        }
        Ok(())
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn start_at(&self) -> &str {
        &self.start_at
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// All states, ordered by name.
    pub fn states(&self) -> impl Iterator<Item = (&str, &State)> {
        self.states.iter().map(|(name, state)| (name.as_str(), state))
    }

    /// Names of every task state; each needs a handler.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.states().filter_map(|(name, state)| match state {
            State::Task(_) => Some(name),
            _ => None,
        })
    }

    /// A copy with every task's `Resource` template resolved.
    pub fn with_resources(&self, vars: &BTreeMap<String, String>) -> Result<Self> {
        let mut resolved = self.clone();
        for state in resolved.states.values_mut() {
            if let State::Task(task) = state {
                task.resource = resource::resolve_resource(&task.resource, vars)?;
            }
        }
        Ok(resolved)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| WardenError::ParseError(format!("failed to encode definition: {}", e)))
    }
}

impl std::str::FromStr for Definition {
    type Err = WardenError;

    fn from_str(text: &str) -> Result<Self> {
        Self::parse_str(text)
    }
}
