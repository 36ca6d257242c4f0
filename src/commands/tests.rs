//! Tests for command implementations against a temporary store.

use super::definition::{cmd_check, cmd_render, summarize};
use super::lock::{cmd_root_clear, cmd_user_clear, cmd_user_set};
use super::release::{cmd_deploy, cmd_halt, cmd_log, cmd_unhalt, execution_id, load_release};
use super::*;
use crate::cli::{
    DefinitionCheckArgs, DefinitionRenderArgs, DeployArgs, HaltArgs, LogArgs, RootLockClearArgs,
    UserLockSetArgs,
};
use crate::deployer::{DEPLOYER_DEFINITION, Deployer, DeployerSettings, LogTarget};
use crate::exit_codes;
use crate::locks::{LockRecord, Locker};
use crate::machine::Definition;
use crate::store;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const ACCOUNT: &str = "123456789012";

fn workspace(temp: &TempDir) -> Workspace {
    let config = Config {
        store_root: temp.path().join("store").to_string_lossy().into_owned(),
        account_id: Some(ACCOUNT.to_string()),
        region: Some("us-east-1".to_string()),
        ..Config::default()
    };
    Workspace::open(config)
}

fn scope() -> ScopeArgs {
    ScopeArgs {
        account: None,
        project: "org/app".to_string(),
        project_config: "prod".to_string(),
        bucket: None,
    }
}

fn write_release(temp: &TempDir, release_id: &str) -> PathBuf {
    let path = temp.path().join(format!("{}.json", release_id));
    let body = serde_json::json!({
        "release_id": release_id,
        "project_name": "org/app",
        "config_name": "prod",
    });
    std::fs::write(&path, body.to_string()).unwrap();
    path
}

fn deploy(workspace: &Workspace, path: PathBuf) -> Result<()> {
    cmd_deploy(workspace, DeployArgs { release: path })
}

#[test]
fn scoped_release_uses_configured_account_and_bucket() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);

    let release = ws.scoped_release(&scope(), Some("r1")).unwrap();

    assert_eq!(release.aws_account_id.as_deref(), Some(ACCOUNT));
    assert_eq!(release.bucket.as_deref(), Some("stepwarden-123456789012"));
    assert_eq!(release.release_id.as_deref(), Some("r1"));

    let mut explicit = scope();
    explicit.bucket = Some("custom".to_string());
    explicit.account = Some("999".to_string());
    let release = ws.scoped_release(&explicit, None).unwrap();
    assert_eq!(release.bucket.as_deref(), Some("custom"));
    assert_eq!(release.aws_account_id.as_deref(), Some("999"));
}

#[test]
fn scoped_release_without_account_is_user_error() {
    let temp = TempDir::new().unwrap();
    let mut ws = workspace(&temp);
    ws.config.account_id = None;

    let err = ws.scoped_release(&scope(), None).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
}

#[test]
fn load_release_fills_client_fields() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);

    let release = load_release(&ws, &write_release(&temp, "r1")).unwrap();

    assert_eq!(release.aws_account_id.as_deref(), Some(ACCOUNT));
    assert_eq!(release.aws_region.as_deref(), Some("us-east-1"));
    assert_eq!(release.bucket.as_deref(), Some("stepwarden-123456789012"));
    assert!(release.created_at.is_some());

    let bad = temp.path().join("bad.json");
    std::fs::write(&bad, "{oops").unwrap();
    let err = load_release(&ws, &bad).unwrap_err();
    assert!(err.to_string().contains("failed to parse release file"));
}

#[test]
fn deploy_runs_release_and_writes_log() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);

    deploy(&ws, write_release(&temp, "r1")).unwrap();

    cmd_log(
        &ws,
        LogArgs {
            scope: scope(),
            release_id: "r1".to_string(),
        },
    )
    .unwrap();
    let release = ws.scoped_release(&scope(), Some("r1")).unwrap();
    assert_eq!(
        release.read_log(ws.store.as_ref()).unwrap(),
        "\nresources validated\ndeployed"
    );

    // Config freed for the next release.
    assert!(ws.table.list(&ws.config.lock_table).unwrap().is_empty());
    deploy(&ws, write_release(&temp, "r2")).unwrap();
}

#[test]
fn execution_id_is_the_uuid_the_run_assigned() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);
    let release = load_release(&ws, &write_release(&temp, "r1")).unwrap();
    let bucket = release.bucket().unwrap();
    let paths = release.paths().unwrap();
    store::put_json(ws.store.as_ref(), bucket, &paths.release, &release).unwrap();

    let deployer = Deployer::new(
        ws.store.clone(),
        ws.table.clone(),
        Arc::new(LogTarget),
        DeployerSettings::from_config(&ws.config),
    );
    let execution = deployer.run(&release).unwrap();

    let id = execution_id(&execution);
    assert!(id.starts_with("release-"));
    let lock: LockRecord =
        store::get_json(ws.store.as_ref(), bucket, &paths.release_lock).unwrap();
    assert_eq!(lock.uuid, id);

    let mut unnamed = release.clone();
    unnamed.project_name = None;
    let execution = deployer.run(&unnamed).unwrap();
    assert_eq!(execution_id(&execution), "-");
}

#[test]
fn deploy_same_release_twice_is_lock_failure() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);
    let path = write_release(&temp, "r1");

    deploy(&ws, path.clone()).unwrap();
    let err = deploy(&ws, path).unwrap_err();

    assert!(matches!(err, WardenError::LockExistsError(_)), "{:?}", err);
    assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
}

#[test]
fn halt_blocks_deploy_until_removed() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);

    cmd_halt(
        &ws,
        HaltArgs {
            scope: scope(),
            message: "incident".to_string(),
        },
    )
    .unwrap();
    let err = deploy(&ws, write_release(&temp, "r1")).unwrap_err();
    assert!(matches!(err, WardenError::HaltError(ref m) if m.ends_with("incident")));
    assert_eq!(err.exit_code(), exit_codes::HALTED);

    cmd_unhalt(&ws, scope()).unwrap();
    deploy(&ws, write_release(&temp, "r2")).unwrap();
}

#[test]
fn user_lock_blocks_deploy_until_cleared() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);

    cmd_user_set(
        &ws,
        UserLockSetArgs {
            scope: scope(),
            reason: "freeze".to_string(),
        },
    )
    .unwrap();
    let err = deploy(&ws, write_release(&temp, "r1")).unwrap_err();
    assert!(err.to_string().contains("CheckUserLock error"), "{}", err);

    cmd_user_clear(&ws, scope()).unwrap();
    deploy(&ws, write_release(&temp, "r2")).unwrap();
}

#[test]
fn root_clear_only_removes_own_holder() {
    let temp = TempDir::new().unwrap();
    let ws = workspace(&temp);
    let root_lock = ws
        .scoped_release(&scope(), None)
        .unwrap()
        .config_paths()
        .unwrap()
        .root_lock;
    assert!(
        ws.table
            .grab_lock(&ws.config.lock_table, &root_lock, "release-a", "")
            .grabbed()
    );

    let wrong = RootLockClearArgs {
        scope: scope(),
        holder: "release-b".to_string(),
    };
    assert!(cmd_root_clear(&ws, wrong).is_err());
    assert_eq!(ws.table.list(&ws.config.lock_table).unwrap().len(), 1);

    let right = RootLockClearArgs {
        scope: scope(),
        holder: "release-a".to_string(),
    };
    cmd_root_clear(&ws, right).unwrap();
    assert!(ws.table.list(&ws.config.lock_table).unwrap().is_empty());
}

#[test]
fn definition_check_and_summary() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("deployer.json");
    std::fs::write(&path, DEPLOYER_DEFINITION).unwrap();

    cmd_check(DefinitionCheckArgs { file: path }).unwrap();

    let definition = Definition::parse_str(DEPLOYER_DEFINITION).unwrap();
    let lines = summarize(&definition);
    assert!(lines.contains(&"StartAt:  Validate".to_string()));
    assert!(
        lines
            .iter()
            .any(|l| l.contains("Lock") && l.contains("catch [LockExistsError] -> FailureClean"))
    );
    assert!(lines.iter().any(|l| l.contains("Fail    (AlertError)")));

    let missing = cmd_check(DefinitionCheckArgs {
        file: temp.path().join("missing.json"),
    });
    assert!(missing.unwrap_err().to_string().contains("failed to read definition"));
}

#[test]
fn definition_render_needs_region() {
    let temp = TempDir::new().unwrap();
    let mut ws = workspace(&temp);

    let args = || DefinitionRenderArgs {
        file: None,
        region: None,
        account: None,
        lambda: "deployer".to_string(),
    };
    cmd_render(&ws, args()).unwrap();

    ws.config.region = None;
    let err = cmd_render(&ws, args()).unwrap_err();
    assert!(err.to_string().contains("--region"));
}
