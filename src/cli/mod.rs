//! CLI argument parsing for stepwarden.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::config::DEFAULT_CONFIG_PATH;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Stepwarden: declarative release workflows with lock coordination.
///
/// Releases run through a state-machine definition of task, fail and
/// succeed states. Locks, halt flags and release logs live in an object
/// store rooted at `store_root`.
#[derive(Parser, Debug)]
#[command(name = "stepwarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the YAML config file. Missing files mean defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for stepwarden.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Workflow definition tools.
    Definition(DefinitionCommand),

    /// Run a release through the deploy workflow.
    ///
    /// Uploads the release file to its release path, then executes the
    /// workflow against the local store. Deploy steps only write to the
    /// release log.
    Deploy(DeployArgs),

    /// Write the halt flag for a project config.
    ///
    /// Running releases stop at their next halt check. The flag is
    /// honoured for five minutes after it is written.
    Halt(HaltArgs),

    /// Remove the halt flag for a project config.
    Unhalt(ScopeArgs),

    /// Lock management commands.
    Lock(LockCommand),

    /// Print a release's log.
    Log(LogArgs),
}

// ============================================================================
// Shared arguments
// ============================================================================

/// Identifies a project config.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Account the project belongs to. Defaults to the configured account.
    #[arg(long)]
    pub account: Option<String>,

    /// Project name (may contain '/').
    #[arg(long)]
    pub project: String,

    /// Config name within the project.
    #[arg(long = "project-config")]
    pub project_config: String,

    /// Bucket holding the release state. Defaults to bucket_prefix + account.
    #[arg(long)]
    pub bucket: Option<String>,
}

// ============================================================================
// Definition
// ============================================================================

/// Definition subcommands.
#[derive(Parser, Debug)]
pub struct DefinitionCommand {
    #[command(subcommand)]
    pub action: DefinitionAction,
}

/// Available definition actions.
#[derive(Subcommand, Debug)]
pub enum DefinitionAction {
    /// Parse a definition file and summarize its states.
    Check(DefinitionCheckArgs),

    /// Resolve resource templates and print the definition as JSON.
    ///
    /// Prints the built-in deploy workflow when no file is given.
    Render(DefinitionRenderArgs),
}

/// Arguments for the `definition check` command.
#[derive(Parser, Debug)]
pub struct DefinitionCheckArgs {
    /// Definition JSON file.
    pub file: PathBuf,
}

/// Arguments for the `definition render` command.
#[derive(Parser, Debug)]
pub struct DefinitionRenderArgs {
    /// Definition JSON file.
    pub file: Option<PathBuf>,

    /// Value for `{{aws_region}}`. Defaults to the configured region.
    #[arg(long)]
    pub region: Option<String>,

    /// Value for `{{aws_account}}`. Defaults to the configured account.
    #[arg(long)]
    pub account: Option<String>,

    /// Value for `{{lambda_name}}`.
    #[arg(long, default_value = "stepwarden")]
    pub lambda: String,
}

// ============================================================================
// Releases
// ============================================================================

/// Arguments for the `deploy` command.
#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Release JSON file.
    pub release: PathBuf,
}

/// Arguments for the `halt` command.
#[derive(Parser, Debug)]
pub struct HaltArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Message recorded as the halt cause.
    #[arg(short, long, default_value = "")]
    pub message: String,
}

/// Arguments for the `log` command.
#[derive(Parser, Debug)]
pub struct LogArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Release id whose log to print.
    #[arg(long)]
    pub release_id: String,
}

// ============================================================================
// Locks
// ============================================================================

/// Lock subcommands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List root locks in the lock table with their age and holder.
    List,

    /// Operator override lock for a project config.
    User(UserLockCommand),

    /// Root lock shared by every release of a project config.
    Root(RootLockCommand),
}

/// User lock subcommands.
#[derive(Parser, Debug)]
pub struct UserLockCommand {
    #[command(subcommand)]
    pub action: UserLockAction,
}

/// Available user lock actions.
#[derive(Subcommand, Debug)]
pub enum UserLockAction {
    /// Block all releases of a project config.
    Set(UserLockSetArgs),

    /// Allow releases again.
    Clear(ScopeArgs),
}

/// Arguments for the `lock user set` command.
#[derive(Parser, Debug)]
pub struct UserLockSetArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Why releases are blocked.
    #[arg(short, long)]
    pub reason: String,
}

/// Root lock subcommands.
#[derive(Parser, Debug)]
pub struct RootLockCommand {
    #[command(subcommand)]
    pub action: RootLockAction,
}

/// Available root lock actions.
#[derive(Subcommand, Debug)]
pub enum RootLockAction {
    /// Release a root lock left behind by a failed release.
    ///
    /// Only succeeds if the lock is held by --holder.
    Clear(RootLockClearArgs),
}

/// Arguments for the `lock root clear` command.
#[derive(Parser, Debug)]
pub struct RootLockClearArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Execution uuid that holds the lock.
    #[arg(long)]
    pub holder: String,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
