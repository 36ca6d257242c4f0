use super::*;
use crate::locks::{MemoryLockTable, UserLock, set_user_lock};
use crate::machine::{ErrorKind, Outcome, RecordingSleeper};
use crate::release::ReleaseError;
use crate::store::{self, MemoryStore, StoreError, StoreOp};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

const ACCOUNT: &str = "000000000000";
const BUCKET: &str = "stepwarden-000000000000";
const TABLE: &str = "locks";

#[derive(Default)]
struct ScriptedTarget {
    validate_failure: Mutex<Option<TaskFailure>>,
    deploy_failure: Mutex<Option<TaskFailure>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedTarget {
    fn fail_validate(&self, failure: TaskFailure) {
        *self.validate_failure.lock().unwrap() = Some(failure);
    }

    fn fail_deploy(&self, failure: TaskFailure) {
        *self.deploy_failure.lock().unwrap() = Some(failure);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl ReleaseTarget for ScriptedTarget {
    fn validate_resources(
        &self,
        _release: &Release,
        _store: &dyn ObjectStore,
    ) -> std::result::Result<(), TaskFailure> {
        self.calls.lock().unwrap().push("validate_resources");
        match self.validate_failure.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn deploy(
        &self,
        release: &mut Release,
        store: &dyn ObjectStore,
    ) -> std::result::Result<(), TaskFailure> {
        self.calls.lock().unwrap().push("deploy");
        release.append_log(store, "deploying").map_err(TaskFailure::from)?;
        match self.deploy_failure.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    table: Arc<MemoryLockTable>,
    target: Arc<ScriptedTarget>,
    sleeper: Arc<RecordingSleeper>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            table: Arc::new(MemoryLockTable::new()),
            target: Arc::new(ScriptedTarget::default()),
            sleeper: Arc::new(RecordingSleeper::new()),
        }
    }

    fn deployer(&self) -> Deployer {
        let settings = DeployerSettings {
            region: Some("us-east-1".to_string()),
            account_id: Some(ACCOUNT.to_string()),
            lock_table: TABLE.to_string(),
            ..DeployerSettings::default()
        };
        Deployer::new(
            self.store.clone(),
            self.table.clone(),
            self.target.clone(),
            settings,
        )
        .with_sleeper(self.sleeper.clone())
    }

    /// Upload `release` the way a client does before starting a run.
    fn upload(&self, release: &Release) {
        let paths = release.paths().unwrap();
        store::put_json(self.store.as_ref(), BUCKET, &paths.release, release).unwrap();
    }

    fn root_holder(&self, release: &Release) -> Option<String> {
        self.table.holder(TABLE, &release.paths().unwrap().root_lock)
    }
}

fn release(release_id: &str) -> Release {
    Release {
        aws_account_id: Some(ACCOUNT.to_string()),
        aws_region: Some("us-east-1".to_string()),
        release_id: Some(release_id.to_string()),
        project_name: Some("project".to_string()),
        config_name: Some("dev".to_string()),
        created_at: Some(Utc::now()),
        ..Release::default()
    }
}

fn error_of(execution: &Execution) -> ReleaseError {
    output_release(execution).unwrap().error.unwrap()
}

#[test]
fn definition_parses_and_binds_every_task() {
    let definition = Deployer::definition().unwrap();
    let fixture = Fixture::new();
    let handlers = fixture.deployer().handlers();

    assert_eq!(definition.start_at(), "Validate");
    assert_eq!(definition.comment(), Some("Step Function Deployer"));
    let tasks: Vec<&str> = definition.task_names().collect();
    for task in &tasks {
        assert!(handlers.contains(task), "{} has no handler", task);
    }
    assert_eq!(tasks.len(), 5);
}

#[test]
fn successful_release_deploys_and_frees_config() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(execution.outcome, Outcome::Succeeded);
    assert_eq!(
        execution.path(),
        vec!["Validate", "Lock", "ValidateResources", "Deploy", "Success"]
    );

    let output = output_release(&execution).unwrap();
    assert_eq!(output.success, Some(true));
    assert_eq!(output.bucket.as_deref(), Some(BUCKET));
    assert_eq!(output.timeout, Some(600));
    assert!(output.uuid.as_deref().unwrap().starts_with("release-"));
    assert!(output.started_at.is_some());
    assert_eq!(fixture.target.calls(), vec!["validate_resources", "deploy"]);

    // Root lock released, release lock kept.
    assert_eq!(fixture.root_holder(&output), None);
    let paths = output.paths().unwrap();
    assert!(fixture.store.contains(BUCKET, &paths.release_lock));
    assert_eq!(output.read_log(fixture.store.as_ref()).unwrap(), "\ndeploying");
}

#[test]
fn client_supplied_server_fields_are_replaced() {
    let fixture = Fixture::new();
    let mut release = release("r1");
    release.uuid = Some("forged".to_string());
    release.success = Some(true);
    fixture.upload(&release);

    let execution = fixture.deployer().run(&release).unwrap();

    let output = output_release(&execution).unwrap();
    assert_ne!(output.uuid.as_deref(), Some("forged"));
    assert!(execution.succeeded());
}

#[test]
fn invalid_release_fails_clean_without_locking() {
    let fixture = Fixture::new();
    let mut release = release("r1");
    fixture.upload(&release);
    release.project_name = None;

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(execution.path(), vec!["Validate", "FailureClean"]);
    assert!(matches!(
        &execution.outcome,
        Outcome::Failed { error, .. } if error == "NotifyError"
    ));
    let error = error_of(&execution);
    assert_eq!(error.error.as_deref(), Some("ValidationError"));
    assert_eq!(
        error.cause.as_deref(),
        Some("Release(r1) Error: project_name must be defined")
    );
    assert!(fixture.target.calls().is_empty());
}

#[test]
fn tampered_upload_fails_validation() {
    let fixture = Fixture::new();
    let release = release("r1");
    let mut uploaded = release.clone();
    uploaded.metadata.insert("sneaky".to_string(), "yes".to_string());
    fixture.upload(&uploaded);

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(execution.path(), vec!["Validate", "FailureClean"]);
    let cause = error_of(&execution).cause.unwrap();
    assert!(cause.contains("release SHA incorrect"), "{}", cause);
}

#[test]
fn lock_contention_fails_clean_without_unlocking() {
    let fixture = Fixture::new();
    let release = release("r2");
    fixture.upload(&release);
    let root_lock = release.paths().unwrap().root_lock;
    assert!(
        fixture
            .table
            .grab_lock(TABLE, &root_lock, "other-execution", "")
            .grabbed()
    );

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(execution.path(), vec!["Validate", "Lock", "FailureClean"]);
    let error = error_of(&execution);
    assert_eq!(error.error.as_deref(), Some("LockExistsError"));
    let cause = error.cause.unwrap();
    assert!(cause.starts_with("Release(r2) Error: Lock Already Exists at locks:"));
    assert!(cause.contains("Run the following to clear it:"));

    assert_eq!(
        fixture.table.holder(TABLE, &root_lock).as_deref(),
        Some("other-execution")
    );
    assert!(fixture.target.calls().is_empty());
}

#[test]
fn user_lock_blocks_release() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    let paths = release.paths().unwrap();
    set_user_lock(
        fixture.store.as_ref(),
        BUCKET,
        &paths.user_lock,
        &UserLock::new("maintenance"),
    )
    .unwrap();

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(execution.path(), vec!["Validate", "Lock", "FailureClean"]);
    let cause = error_of(&execution).cause.unwrap();
    assert!(cause.contains("CheckUserLock error"), "{}", cause);
}

#[test]
fn ambiguous_lock_write_releases_then_fails_clean() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    let root_lock = release.paths().unwrap().root_lock;
    fixture.table.fail(
        StoreOp::Put,
        &root_lock,
        StoreError::Backend("connection reset".to_string()),
    );

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(
        execution.path(),
        vec!["Validate", "Lock", "ReleaseLockFailure", "FailureClean"]
    );
    assert_eq!(error_of(&execution).error.as_deref(), Some("LockError"));
}

#[test]
fn resource_failure_releases_root_lock() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    fixture
        .target
        .fail_validate(TaskFailure::new("MissingBucket", "assets bucket not found"));

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(
        execution.path(),
        vec![
            "Validate",
            "Lock",
            "ValidateResources",
            "ReleaseLockFailure",
            "FailureClean"
        ]
    );
    let error = error_of(&execution);
    assert_eq!(error.error.as_deref(), Some("MissingBucket"));
    assert_eq!(
        error.cause.as_deref(),
        Some("Release(r1) Error: assets bucket not found")
    );
    assert_eq!(fixture.root_holder(&release), None);
}

#[test]
fn deploy_failure_leaves_lock_and_alerts() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    fixture
        .target
        .fail_deploy(TaskFailure::new("UploadError", "half uploaded"));

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(
        execution.path(),
        vec!["Validate", "Lock", "ValidateResources", "Deploy", "FailureDirty"]
    );
    assert!(matches!(
        &execution.outcome,
        Outcome::Failed { error, .. } if error == "AlertError"
    ));
    let output = output_release(&execution).unwrap();
    let error = output.error.clone().unwrap();
    assert_eq!(error.error.as_deref(), Some("UploadError"));
    assert_eq!(error.cause.as_deref(), Some("Release(r1) Error: half uploaded"));
    assert_eq!(output.success, None);
    assert_eq!(fixture.root_holder(&output), output.uuid);
}

#[test]
fn clean_deploy_failure_releases_lock() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    fixture
        .target
        .fail_deploy(TaskFailure::new(DEPLOY_SFN_ERROR, "rejected"));

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(
        execution.path(),
        vec![
            "Validate",
            "Lock",
            "ValidateResources",
            "Deploy",
            "ReleaseLockFailure",
            "FailureClean"
        ]
    );
    assert_eq!(fixture.root_holder(&release), None);

    let error = error_of(&execution);
    assert_eq!(error.error.as_deref(), Some(DEPLOY_SFN_ERROR));
    assert_eq!(error.cause.as_deref(), Some("Release(r1) Error: rejected"));
}

#[test]
fn unlock_failure_retries_then_alerts() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    let root_lock = release.paths().unwrap().root_lock;
    fixture
        .target
        .fail_validate(TaskFailure::new("MissingBucket", "assets bucket not found"));
    fixture.table.fail(
        StoreOp::Delete,
        &root_lock,
        StoreError::Backend("throttled".to_string()),
    );

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(
        execution.final_state(),
        Some("FailureDirty"),
        "{:?}",
        execution.path()
    );
    assert_eq!(fixture.sleeper.slept(), vec![Duration::from_secs(30); 3]);
    assert_eq!(error_of(&execution).error.as_deref(), Some("StorageError"));
}

#[test]
fn halt_flag_stops_before_resources() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    let mut halted = release.clone();
    halted.bucket = Some(BUCKET.to_string());
    halted.halt(fixture.store.as_ref(), "").unwrap();

    let execution = fixture.deployer().run(&release).unwrap();

    assert_eq!(execution.final_state(), Some("FailureClean"));
    let error = error_of(&execution);
    assert_eq!(error.error.as_deref(), Some("HaltError"));
    assert_eq!(
        error.cause.as_deref(),
        Some("Release(r1) Error: Halt File Found")
    );
    assert!(fixture.target.calls().is_empty());
}

#[test]
fn stale_halt_flag_is_ignored() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    let halt = release.paths().unwrap().halt;
    fixture.store.insert(BUCKET, &halt, b"old");
    fixture
        .store
        .set_last_modified(BUCKET, &halt, Utc::now() - ChronoDuration::minutes(30));

    let execution = fixture.deployer().run(&release).unwrap();

    assert!(execution.succeeded());
}

#[test]
fn release_id_cannot_be_deployed_twice() {
    let fixture = Fixture::new();
    let release = release("r1");
    fixture.upload(&release);
    let deployer = fixture.deployer();

    assert!(deployer.run(&release).unwrap().succeeded());
    let second = deployer.run(&release).unwrap();

    assert_eq!(second.path(), vec!["Validate", "Lock", "FailureClean"]);
    assert_eq!(error_of(&second).error.as_deref(), Some("LockExistsError"));
}

#[test]
fn non_release_payload_fails_clean() {
    let fixture = Fixture::new();

    let execution = fixture
        .deployer()
        .run_json(json!({"release_id": 42}))
        .unwrap();

    assert_eq!(execution.path(), vec!["Validate", "FailureClean"]);
    assert_eq!(
        execution.output["error"]["Error"],
        json!(ErrorKind::Unmarshal.as_str())
    );
}

#[test]
fn log_target_appends_to_release_log() {
    let store = MemoryStore::new();
    let mut release = release("r1");
    release.bucket = Some(BUCKET.to_string());

    LogTarget.validate_resources(&release, &store).unwrap();
    LogTarget.deploy(&mut release, &store).unwrap();

    assert_eq!(
        release.read_log(&store).unwrap(),
        "\nresources validated\ndeployed"
    );
}

/// Deterministic xorshift stream for payload variation.
struct Scramble(u64);

impl Scramble {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn value(&mut self) -> Value {
        match self.next() % 7 {
            0 => Value::Null,
            1 => json!(self.next() % 1000),
            2 => json!(""),
            3 => json!(format!("v{}/{}", self.next() % 100, self.next() % 10)),
            4 => json!(true),
            5 => json!(["a", 1]),
            _ => json!({"nested": self.next() % 3}),
        }
    }
}

#[test]
fn scrambled_payloads_never_panic() {
    let fields = [
        "aws_account_id",
        "aws_region",
        "uuid",
        "release_id",
        "project_name",
        "config_name",
        "bucket",
        "created_at",
        "started_at",
        "timeout",
        "metadata",
        "error",
        "success",
    ];

    for seed in 1..=40u64 {
        let fixture = Fixture::new();
        let mut scramble = Scramble(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut payload = serde_json::Map::new();
        for field in fields {
            if scramble.next() % 2 == 0 {
                payload.insert(field.to_string(), scramble.value());
            }
        }

        let execution = fixture.deployer().run_json(Value::Object(payload)).unwrap();
        let output = execution.output.to_string();

        assert!(!output.contains("Panic"), "seed {}: {}", seed, output);
        assert!(
            !execution.succeeded(),
            "seed {} deployed without an upload",
            seed
        );
    }
}

#[test]
fn scrambled_releases_with_valid_shape_never_panic() {
    for seed in 1..=20u64 {
        let fixture = Fixture::new();
        let mut scramble = Scramble(seed.wrapping_mul(0xD1B5_4A32_D192_ED03));
        let mut release = release(&format!("r{}", seed));
        if scramble.next() % 2 == 0 {
            release.project_name = Some(format!("org/{}", scramble.next() % 5));
        }
        if scramble.next() % 3 == 0 {
            release.timeout = Some(scramble.next());
        }
        if scramble.next() % 3 == 0 {
            release.created_at = Some(Utc::now() - ChronoDuration::days(11));
        }
        if scramble.next() % 2 == 0 {
            fixture.upload(&release);
        }

        let execution = fixture.deployer().run(&release).unwrap();

        assert!(
            !execution.output.to_string().contains("Panic"),
            "seed {}",
            seed
        );
        assert!(matches!(
            execution.final_state(),
            Some("Success") | Some("FailureClean")
        ));
    }
}
