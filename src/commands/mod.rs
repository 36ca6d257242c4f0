//! Command implementations for stepwarden.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, and the [`Workspace`] every command runs against: the
//! loaded config, a filesystem object store at `store_root` and a file
//! lock table beside it.

mod definition;
mod lock;
mod release;

#[cfg(test)]
mod tests;

use crate::cli::{
    Command, DefinitionAction, LockAction, RootLockAction, ScopeArgs, UserLockAction,
};
use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::locks::FileLockTable;
use crate::release::Release;
use crate::store::FsStore;
use std::sync::Arc;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command, config: Config) -> Result<()> {
    let workspace = Workspace::open(config);
    match command {
        Command::Definition(cmd) => match cmd.action {
            DefinitionAction::Check(args) => definition::cmd_check(args),
            DefinitionAction::Render(args) => definition::cmd_render(&workspace, args),
        },
        Command::Deploy(args) => release::cmd_deploy(&workspace, args),
        Command::Halt(args) => release::cmd_halt(&workspace, args),
        Command::Unhalt(scope) => release::cmd_unhalt(&workspace, scope),
        Command::Log(args) => release::cmd_log(&workspace, args),
        Command::Lock(cmd) => match cmd.action {
            LockAction::List => lock::cmd_list(&workspace),
            LockAction::User(user) => match user.action {
                UserLockAction::Set(args) => lock::cmd_user_set(&workspace, args),
                UserLockAction::Clear(scope) => lock::cmd_user_clear(&workspace, scope),
            },
            LockAction::Root(root) => match root.action {
                RootLockAction::Clear(args) => lock::cmd_root_clear(&workspace, args),
            },
        },
    }
}

/// Config plus the local store and lock table it points at.
pub struct Workspace {
    pub config: Config,
    pub store: Arc<FsStore>,
    pub table: Arc<FileLockTable>,
}

impl Workspace {
    pub fn open(config: Config) -> Self {
        Self {
            store: Arc::new(FsStore::new(config.store_path())),
            table: Arc::new(FileLockTable::new(config.locks_path())),
            config,
        }
    }

    /// A release naming the scope's project config, with account and
    /// bucket resolved against the config.
    pub fn scoped_release(&self, scope: &ScopeArgs, release_id: Option<&str>) -> Result<Release> {
        let account = scope
            .account
            .clone()
            .or_else(|| self.config.account_id.clone())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                WardenError::UserError(
                    "--account is required when no account_id is configured".to_string(),
                )
            })?;

        Ok(Release {
            bucket: Some(self.bucket_for(scope.bucket.as_deref(), &account)),
            aws_account_id: Some(account),
            aws_region: self.config.region.clone(),
            project_name: Some(scope.project.clone()),
            config_name: Some(scope.project_config.clone()),
            release_id: release_id.map(str::to_string),
            ..Release::default()
        })
    }

    /// `explicit`, or the default bucket for `account`.
    pub fn bucket_for(&self, explicit: Option<&str>, account: &str) -> String {
        match explicit.filter(|b| !b.is_empty()) {
            Some(bucket) => bucket.to_string(),
            None => format!("{}{}", self.config.bucket_prefix, account),
        }
    }
}
