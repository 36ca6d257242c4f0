//! Implementation of the release commands: `deploy`, `halt`, `unhalt`
//! and `log`.

use super::Workspace;
use crate::cli::{DeployArgs, HaltArgs, LogArgs, ScopeArgs};
use crate::deployer::{Deployer, DeployerSettings, LogTarget, output_release};
use crate::error::{Result, WardenError};
use crate::machine::{Execution, Outcome, TaskFailure};
use crate::release::{Release, ReleaseError};
use crate::store;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

/// Read a release file and fill what a client fills before uploading.
pub fn load_release(workspace: &Workspace, path: &Path) -> Result<Release> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WardenError::UserError(format!(
            "failed to read release file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let mut release: Release = serde_json::from_str(&content).map_err(|e| {
        WardenError::UserError(format!(
            "failed to parse release file '{}': {}",
            path.display(),
            e
        ))
    })?;

    if release.aws_account_id.is_none() {
        release.aws_account_id = workspace.config.account_id.clone();
    }
    if release.aws_region.is_none() {
        release.aws_region = workspace.config.region.clone();
    }
    if release.bucket.is_none()
        && let Some(account) = release.aws_account_id.as_deref()
    {
        release.bucket = Some(workspace.bucket_for(None, account));
    }
    if release.created_at.is_none() {
        release.created_at = Some(Utc::now());
    }
    Ok(release)
}

/// The error a finished, unsuccessful execution reports.
fn execution_error(execution: &Execution) -> WardenError {
    match &execution.outcome {
        Outcome::Succeeded => WardenError::UserError("execution succeeded".to_string()),
        Outcome::Failed { state, error, .. } => {
            let recorded = output_release(execution).ok().and_then(|r| r.error);
            match recorded {
                Some(ReleaseError {
                    error: Some(kind),
                    cause,
                }) => TaskFailure::new(kind, cause.unwrap_or_default()).into(),
                _ => WardenError::UserError(format!("release failed in {} ({})", state, error)),
            }
        }
        Outcome::Unhandled { failure, .. } => failure.clone().into(),
        Outcome::TransitionLimit { state, limit } => WardenError::UserError(format!(
            "release stopped in {} after {} transitions",
            state, limit
        )),
    }
}

/// Execute the `stepwarden deploy` command.
///
/// # Exit Codes
///
/// - 0: Release deployed
/// - 2: Release failed validation
/// - 4: Lock held or in an unknown state
/// - 5: Release halted or timed out
pub fn cmd_deploy(workspace: &Workspace, args: DeployArgs) -> Result<()> {
    let release = load_release(workspace, &args.release)?;

    let paths = release.paths()?;
    store::put_json(
        workspace.store.as_ref(),
        release.bucket()?,
        &paths.release,
        &release,
    )?;

    let deployer = Deployer::new(
        workspace.store.clone(),
        workspace.table.clone(),
        Arc::new(LogTarget),
        DeployerSettings::from_config(&workspace.config),
    );
    let execution = deployer.run(&release)?;

    println!("Execution: {}", execution_id(&execution));
    println!("Path:      {}", execution.path().join(" -> "));

    if execution.succeeded() {
        println!("Outcome:   succeeded");
        return Ok(());
    }

    println!("Outcome:   failed in {}", execution.final_state().unwrap_or("?"));
    Err(execution_error(&execution))
}

/// The uuid the run assigned to the release, or `-` if it never got one.
pub fn execution_id(execution: &Execution) -> String {
    output_release(execution)
        .ok()
        .and_then(|output| output.uuid)
        .unwrap_or_else(|| "-".to_string())
}

/// Execute the `stepwarden halt` command.
pub fn cmd_halt(workspace: &Workspace, args: HaltArgs) -> Result<()> {
    let release = workspace.scoped_release(&args.scope, None)?;
    release.halt(workspace.store.as_ref(), &args.message)?;

    println!(
        "Halted {}/{}. Running releases stop at their next check.",
        args.scope.project, args.scope.project_config
    );
    Ok(())
}

/// Execute the `stepwarden unhalt` command.
pub fn cmd_unhalt(workspace: &Workspace, scope: ScopeArgs) -> Result<()> {
    let release = workspace.scoped_release(&scope, None)?;
    release.remove_halt(workspace.store.as_ref());

    println!("Removed halt flag for {}/{}", scope.project, scope.project_config);
    Ok(())
}

/// Execute the `stepwarden log` command.
pub fn cmd_log(workspace: &Workspace, args: LogArgs) -> Result<()> {
    let release = workspace.scoped_release(&args.scope, Some(&args.release_id))?;
    let log = release.read_log(workspace.store.as_ref())?;

    if log.is_empty() {
        println!("No log for release {}", args.release_id);
    } else {
        println!("{}", log.trim_start_matches('\n'));
    }
    Ok(())
}
