//! Implementation of the `stepwarden lock` commands.

use super::Workspace;
use crate::cli::{RootLockClearArgs, ScopeArgs, UserLockSetArgs};
use crate::error::Result;
use crate::locks::{self, Locker, UserLock};

/// Execute the `stepwarden lock list` command.
pub fn cmd_list(workspace: &Workspace) -> Result<()> {
    let table = &workspace.config.lock_table;
    let held = workspace.table.list(table)?;

    if held.is_empty() {
        println!("No root locks in '{}'.", table);
        return Ok(());
    }

    println!("Root locks in '{}':", table);
    for info in &held {
        println!("  {}", info);
    }
    Ok(())
}

/// Execute the `stepwarden lock user set` command.
pub fn cmd_user_set(workspace: &Workspace, args: UserLockSetArgs) -> Result<()> {
    let release = workspace.scoped_release(&args.scope, None)?;
    let paths = release.config_paths()?;
    let lock = UserLock::new(&args.reason);

    locks::set_user_lock(
        workspace.store.as_ref(),
        release.bucket()?,
        &paths.user_lock,
        &lock,
    )?;

    println!(
        "User lock set on {}/{} by {}",
        args.scope.project, args.scope.project_config, lock.user
    );
    Ok(())
}

/// Execute the `stepwarden lock user clear` command.
pub fn cmd_user_clear(workspace: &Workspace, scope: ScopeArgs) -> Result<()> {
    let release = workspace.scoped_release(&scope, None)?;
    let paths = release.config_paths()?;

    locks::clear_user_lock(workspace.store.as_ref(), release.bucket()?, &paths.user_lock)?;

    println!("User lock cleared on {}/{}", scope.project, scope.project_config);
    Ok(())
}

/// Execute the `stepwarden lock root clear` command.
///
/// Refuses to remove a lock held by anyone but `--holder`.
pub fn cmd_root_clear(workspace: &Workspace, args: RootLockClearArgs) -> Result<()> {
    let release = workspace.scoped_release(&args.scope, None)?;
    let paths = release.config_paths()?;

    workspace
        .table
        .release_lock(&workspace.config.lock_table, &paths.root_lock, &args.holder)?;

    println!("Root lock cleared: {}", paths.root_lock);
    Ok(())
}
