//! Task handlers for the deploy workflow.
//!
//! Every handler decodes the payload as a [`Release`]. Errors are reported
//! with the release's error prefix so the recorded cause names the release.

use super::{DeployerSettings, ReleaseTarget};
use crate::error::WardenError;
use crate::locks::Locker;
use crate::machine::{TaskFailure, TaskHandler, typed_handler};
use crate::release::Release;
use crate::store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, info};

fn failure(release: &Release, err: WardenError) -> TaskFailure {
    TaskFailure::new(err.kind(), format!("{} {}", release.error_prefix(), err))
}

fn prefixed(release: &Release, failure: TaskFailure) -> TaskFailure {
    TaskFailure::new(
        failure.kind,
        format!("{} {}", release.error_prefix(), failure.cause),
    )
}

pub(super) fn validate(
    store: Arc<dyn ObjectStore>,
    settings: Arc<DeployerSettings>,
) -> impl TaskHandler {
    typed_handler(move |mut release: Release| {
        // Hash exactly what the client sent.
        let sha256 = release
            .content_sha256()
            .map_err(|e| failure(&release, e))?;
        release.release_sha256 = sha256;

        release.wipe_controlled_values();
        if release.timeout.is_none() {
            release.timeout = Some(settings.default_timeout_seconds);
        }
        release.set_defaults(
            settings.region.as_deref(),
            settings.account_id.as_deref(),
            &settings.bucket_prefix,
        );

        release
            .validate::<Release>(store.as_ref())
            .map_err(|e| failure(&release, e))?;

        debug!(uuid = ?release.uuid, "release validated");
        Ok(release)
    })
}

pub(super) fn lock(
    store: Arc<dyn ObjectStore>,
    locker: Arc<dyn Locker>,
    settings: Arc<DeployerSettings>,
) -> impl TaskHandler {
    typed_handler(move |release: Release| {
        release
            .grab_locks(store.as_ref(), locker.as_ref(), &settings.lock_table)
            .map_err(|e| failure(&release, e))?;
        Ok(release)
    })
}

pub(super) fn validate_resources(
    store: Arc<dyn ObjectStore>,
    target: Arc<dyn ReleaseTarget>,
) -> impl TaskHandler {
    typed_handler(move |mut release: Release| {
        release
            .is_halted(store.as_ref())
            .map_err(|e| failure(&release, e))?;
        target
            .validate_resources(&release, store.as_ref())
            .map_err(|f| prefixed(&release, f))?;
        Ok(release)
    })
}

pub(super) fn deploy(
    store: Arc<dyn ObjectStore>,
    locker: Arc<dyn Locker>,
    target: Arc<dyn ReleaseTarget>,
    settings: Arc<DeployerSettings>,
) -> impl TaskHandler {
    typed_handler(move |mut release: Release| {
        release
            .is_halted(store.as_ref())
            .map_err(|e| failure(&release, e))?;
        target
            .deploy(&mut release, store.as_ref())
            .map_err(|f| prefixed(&release, f))?;

        release.success = Some(true);
        info!(release_id = ?release.release_id, "release deployed");

        // The release lock stays behind; only the config is freed.
        release
            .unlock_root(locker.as_ref(), &settings.lock_table)
            .map_err(|e| failure(&release, e))?;
        Ok(release)
    })
}

pub(super) fn release_lock_failure(
    locker: Arc<dyn Locker>,
    settings: Arc<DeployerSettings>,
) -> impl TaskHandler {
    typed_handler(move |release: Release| {
        release
            .unlock_root(locker.as_ref(), &settings.lock_table)
            .map_err(|e| failure(&release, e))?;
        Ok(release)
    })
}
