//! Implementation of the `stepwarden definition` commands.

use super::Workspace;
use crate::cli::{DefinitionCheckArgs, DefinitionRenderArgs};
use crate::deployer::DEPLOYER_DEFINITION;
use crate::error::{Result, WardenError};
use crate::machine::{Definition, State, resource_vars};
use std::path::Path;

fn read_definition(path: &Path) -> Result<Definition> {
    let bytes = std::fs::read(path).map_err(|e| {
        WardenError::UserError(format!(
            "failed to read definition '{}': {}",
            path.display(),
            e
        ))
    })?;
    Definition::parse(&bytes)
}

/// One line per state, in name order.
pub fn summarize(definition: &Definition) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(comment) = definition.comment() {
        lines.push(format!("Comment:  {}", comment));
    }
    lines.push(format!("StartAt:  {}", definition.start_at()));
    lines.push(String::new());

    for (name, state) in definition.states() {
        let line = match state {
            State::Task(task) => {
                let mut line = format!("  {:<20} Task    -> {}", name, task.next);
                if !task.retry.is_empty() {
                    line.push_str(&format!("  retry: {}", task.retry.len()));
                }
                for rule in &task.catch {
                    let errors: Vec<String> =
                        rule.error_equals.iter().map(|e| e.to_string()).collect();
                    line.push_str(&format!("  catch [{}] -> {}", errors.join(", "), rule.next));
                }
                line
            }
            State::Fail(fail) => format!("  {:<20} Fail    ({})", name, fail.error),
            State::Succeed => format!("  {:<20} Succeed", name),
        };
        lines.push(line);
    }
    lines
}

/// Execute the `stepwarden definition check` command.
pub fn cmd_check(args: DefinitionCheckArgs) -> Result<()> {
    let definition = read_definition(&args.file)?;
    for line in summarize(&definition) {
        println!("{}", line);
    }
    println!();
    println!("Definition is valid.");
    Ok(())
}

/// Execute the `stepwarden definition render` command.
pub fn cmd_render(workspace: &Workspace, args: DefinitionRenderArgs) -> Result<()> {
    let definition = match &args.file {
        Some(path) => read_definition(path)?,
        None => Definition::parse_str(DEPLOYER_DEFINITION)?,
    };

    let region = args
        .region
        .or_else(|| workspace.config.region.clone())
        .ok_or_else(|| {
            WardenError::UserError("--region is required when no region is configured".to_string())
        })?;
    let account = args
        .account
        .or_else(|| workspace.config.account_id.clone())
        .ok_or_else(|| {
            WardenError::UserError(
                "--account is required when no account_id is configured".to_string(),
            )
        })?;

    let rendered = definition.with_resources(&resource_vars(&region, &account, &args.lambda))?;
    println!("{}", rendered.to_json_pretty()?);
    Ok(())
}
