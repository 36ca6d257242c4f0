use super::{Release, non_blank};
use crate::error::{Result, WardenError};

/// Every storage path derived from a release's identifying fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePaths {
    /// `{account}/{project}`
    pub project_dir: String,
    /// `{account}/{project}/_shared`
    pub shared_project_dir: String,
    /// `{account}/{project}/{config}`
    pub root_dir: String,
    pub root_lock: String,
    pub user_lock: String,
    pub halt: String,
    /// `{account}/{project}/{config}/{release_id}`
    pub release_dir: String,
    pub release: String,
    pub release_lock: String,
    pub log: String,
}

impl ReleasePaths {
    /// Paths scoped to a project/config pair. The release-level entries
    /// are left empty.
    pub fn for_config(account: &str, project: &str, config: &str) -> Self {
        let project_dir = format!("{}/{}", account, project);
        let root_dir = format!("{}/{}", project_dir, config);
        Self {
            shared_project_dir: format!("{}/_shared", project_dir),
            root_lock: format!("{}/lock", root_dir),
            user_lock: format!("{}/user-lock", root_dir),
            halt: format!("{}/halt", root_dir),
            release_dir: String::new(),
            release: String::new(),
            release_lock: String::new(),
            log: String::new(),
            project_dir,
            root_dir,
        }
    }

    pub fn new(account: &str, project: &str, config: &str, release_id: &str) -> Self {
        let mut paths = Self::for_config(account, project, config);
        paths.release_dir = format!("{}/{}", paths.root_dir, release_id);
        paths.release = format!("{}/release", paths.release_dir);
        paths.release_lock = format!("{}/lock", paths.release_dir);
        paths.log = format!("{}/log", paths.release_dir);
        paths
    }
}

fn field<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    non_blank(value).ok_or_else(|| {
        WardenError::ValidationError(format!("{} must be defined to derive release paths", name))
    })
}

impl Release {
    /// Config-level paths. Needs no release id.
    pub fn config_paths(&self) -> Result<ReleasePaths> {
        Ok(ReleasePaths::for_config(
            field(&self.aws_account_id, "aws_account_id")?,
            field(&self.project_name, "project_name")?,
            field(&self.config_name, "config_name")?,
        ))
    }

    pub fn paths(&self) -> Result<ReleasePaths> {
        Ok(ReleasePaths::new(
            field(&self.aws_account_id, "aws_account_id")?,
            field(&self.project_name, "project_name")?,
            field(&self.config_name, "config_name")?,
            field(&self.release_id, "release_id")?,
        ))
    }
}
