//! The release deploy workflow.
//!
//! [`DEPLOYER_DEFINITION`] wires five task states:
//!
//! 1. `Validate`: hash the request, regenerate server-owned fields, apply
//!    defaults, check fields and the uploaded copy
//! 2. `Lock`: user lock check, release lock, root lock
//! 3. `ValidateResources`: halt check, then the target's pre-flight checks
//! 4. `Deploy`: halt check, then the target's deployment, then release
//!    the root lock
//! 5. `ReleaseLockFailure`: release the root lock after a failure that
//!    left nothing half-deployed
//!
//! Failures end in `FailureClean` (`NotifyError`) when nothing needs an
//! operator, or `FailureDirty` (`AlertError`) when resources may be in a
//! bad state. A release lock is never removed, so a release id cannot be
//! deployed twice.

mod handlers;

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::locks::Locker;
use crate::machine::{
    Definition, Execution, Executor, Sleeper, TaskFailure, TaskHandlers, ThreadSleeper,
};
use crate::release::Release;
use crate::store::ObjectStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Error name a target returns from `deploy` when it failed before
/// changing anything. The workflow then releases the root lock.
pub const DEPLOY_SFN_ERROR: &str = "DeploySFNError";

/// The deploy workflow definition.
pub const DEPLOYER_DEFINITION: &str = r#"{
  "Comment": "Step Function Deployer",
  "StartAt": "Validate",
  "States": {
    "Validate": {
      "Type": "TaskFn",
      "Resource": "arn:aws:lambda:{{aws_region}}:{{aws_account}}:function:{{lambda_name}}",
      "Comment": "Validate and Set Defaults",
      "Next": "Lock",
      "Catch": [
        {
          "Comment": "Bad Release or Error GoTo end",
          "ErrorEquals": ["States.ALL"],
          "ResultPath": "$.error",
          "Next": "FailureClean"
        }
      ]
    },
    "Lock": {
      "Type": "TaskFn",
      "Resource": "arn:aws:lambda:{{aws_region}}:{{aws_account}}:function:{{lambda_name}}",
      "Comment": "Grab Lock",
      "Next": "ValidateResources",
      "Catch": [
        {
          "Comment": "Something else is deploying",
          "ErrorEquals": ["LockExistsError"],
          "ResultPath": "$.error",
          "Next": "FailureClean"
        },
        {
          "Comment": "Try Release Lock Then Fail",
          "ErrorEquals": ["States.ALL"],
          "ResultPath": "$.error",
          "Next": "ReleaseLockFailure"
        }
      ]
    },
    "ValidateResources": {
      "Type": "TaskFn",
      "Resource": "arn:aws:lambda:{{aws_region}}:{{aws_account}}:function:{{lambda_name}}",
      "Comment": "ValidateResources",
      "Next": "Deploy",
      "Catch": [
        {
          "Comment": "Try Release Lock Then Fail",
          "ErrorEquals": ["States.ALL"],
          "ResultPath": "$.error",
          "Next": "ReleaseLockFailure"
        }
      ]
    },
    "Deploy": {
      "Type": "TaskFn",
      "Resource": "arn:aws:lambda:{{aws_region}}:{{aws_account}}:function:{{lambda_name}}",
      "Comment": "Deploy the Release",
      "Next": "Success",
      "Catch": [
        {
          "Comment": "Nothing Changed, Release Lock and Fail",
          "ErrorEquals": ["DeploySFNError"],
          "ResultPath": "$.error",
          "Next": "ReleaseLockFailure"
        },
        {
          "Comment": "Unsure of State, Leave Lock and Fail",
          "ErrorEquals": ["States.ALL"],
          "ResultPath": "$.error",
          "Next": "FailureDirty"
        }
      ]
    },
    "ReleaseLockFailure": {
      "Type": "TaskFn",
      "Resource": "arn:aws:lambda:{{aws_region}}:{{aws_account}}:function:{{lambda_name}}",
      "Comment": "Release the Lock and Fail",
      "Next": "FailureClean",
      "Retry": [
        {
          "Comment": "Keep trying to Release",
          "ErrorEquals": ["States.ALL"],
          "MaxAttempts": 3,
          "IntervalSeconds": 30
        }
      ],
      "Catch": [
        {
          "ErrorEquals": ["States.ALL"],
          "ResultPath": "$.error",
          "Next": "FailureDirty"
        }
      ]
    },
    "FailureClean": {
      "Comment": "Deploy Failed Cleanly",
      "Type": "Fail",
      "Error": "NotifyError"
    },
    "FailureDirty": {
      "Comment": "Deploy Failed, Resources left in Bad State, ALERT!",
      "Type": "Fail",
      "Error": "AlertError"
    },
    "Success": {
      "Type": "Succeed"
    }
  }
}"#;

// ============================================================================
// Targets
// ============================================================================

/// What a release deploys to.
///
/// Both calls run while the release holds its locks and after the halt
/// check. The store is the release store, for log appends and artifacts.
pub trait ReleaseTarget: Send + Sync {
    /// Check that the release can be deployed. Must not change anything.
    fn validate_resources(
        &self,
        release: &Release,
        store: &dyn ObjectStore,
    ) -> std::result::Result<(), TaskFailure>;

    /// Deploy the release.
    ///
    /// Return a [`DEPLOY_SFN_ERROR`] failure only if nothing was changed;
    /// any other failure leaves the root lock held for an operator.
    fn deploy(
        &self,
        release: &mut Release,
        store: &dyn ObjectStore,
    ) -> std::result::Result<(), TaskFailure>;
}

/// Target that only records each step in the release log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTarget;

impl ReleaseTarget for LogTarget {
    fn validate_resources(
        &self,
        release: &Release,
        store: &dyn ObjectStore,
    ) -> std::result::Result<(), TaskFailure> {
        release
            .append_log(store, "resources validated")
            .map_err(TaskFailure::from)
    }

    fn deploy(
        &self,
        release: &mut Release,
        store: &dyn ObjectStore,
    ) -> std::result::Result<(), TaskFailure> {
        release.append_log(store, "deployed").map_err(TaskFailure::from)
    }
}

// ============================================================================
// Deployer
// ============================================================================

/// Environment the deploy workflow runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployerSettings {
    /// Region applied to releases that do not name one.
    pub region: Option<String>,
    /// Account applied to releases that do not name one; also the suffix
    /// of the default bucket.
    pub account_id: Option<String>,
    pub bucket_prefix: String,
    pub lock_table: String,
    pub default_timeout_seconds: u64,
    pub max_transitions: usize,
}

impl DeployerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            region: config.region.clone(),
            account_id: config.account_id.clone(),
            bucket_prefix: config.bucket_prefix.clone(),
            lock_table: config.lock_table.clone(),
            default_timeout_seconds: config.default_timeout_seconds,
            max_transitions: config.max_transitions,
        }
    }
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Runs releases through [`DEPLOYER_DEFINITION`].
pub struct Deployer {
    store: Arc<dyn ObjectStore>,
    locker: Arc<dyn Locker>,
    target: Arc<dyn ReleaseTarget>,
    settings: Arc<DeployerSettings>,
    sleeper: Arc<dyn Sleeper>,
}

impl Deployer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        locker: Arc<dyn Locker>,
        target: Arc<dyn ReleaseTarget>,
        settings: DeployerSettings,
    ) -> Self {
        Self {
            store,
            locker,
            target,
            settings: Arc::new(settings),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replace the sleeper used between retry attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &DeployerSettings {
        &self.settings
    }

    /// The parsed deploy workflow.
    pub fn definition() -> Result<Definition> {
        Definition::parse_str(DEPLOYER_DEFINITION)
    }

    /// Handlers for every task state of the deploy workflow.
    pub fn handlers(&self) -> TaskHandlers {
        let mut registry = TaskHandlers::new();
        registry
            .register(
                "Validate",
                handlers::validate(self.store.clone(), self.settings.clone()),
            )
            .register(
                "Lock",
                handlers::lock(self.store.clone(), self.locker.clone(), self.settings.clone()),
            )
            .register(
                "ValidateResources",
                handlers::validate_resources(self.store.clone(), self.target.clone()),
            )
            .register(
                "Deploy",
                handlers::deploy(
                    self.store.clone(),
                    self.locker.clone(),
                    self.target.clone(),
                    self.settings.clone(),
                ),
            )
            .register(
                "ReleaseLockFailure",
                handlers::release_lock_failure(self.locker.clone(), self.settings.clone()),
            );
        registry
    }

    /// Run a release through the workflow.
    pub fn run(&self, release: &Release) -> Result<Execution> {
        let input = serde_json::to_value(release).map_err(|e| {
            WardenError::UserError(format!("failed to encode release: {}", e))
        })?;
        self.run_json(input)
    }

    /// Run an arbitrary payload through the workflow.
    ///
    /// A payload that is not a release fails in `Validate` and ends in
    /// `FailureClean`.
    #[instrument(skip_all)]
    pub fn run_json(&self, input: Value) -> Result<Execution> {
        let definition = Self::definition()?;
        let handlers = self.handlers();
        let execution = Executor::new(&definition, &handlers)
            .with_sleeper(self.sleeper.as_ref())
            .with_max_transitions(self.settings.max_transitions)
            .execute(input)?;

        info!(
            outcome = ?execution.outcome,
            path = ?execution.path(),
            "deploy workflow finished"
        );
        Ok(execution)
    }
}

/// Decode the release carried by a finished execution.
pub fn output_release(execution: &Execution) -> Result<Release> {
    serde_json::from_value(execution.output.clone()).map_err(|e| {
        WardenError::ValidationError(format!("execution output is not a release: {}", e))
    })
}
