use super::Release;
use crate::error::Result;
use crate::store::{self, ObjectStore};

impl Release {
    /// Overwrite the release log.
    pub fn write_log(&self, store: &dyn ObjectStore, log: &str) -> Result<()> {
        let paths = self.paths()?;
        store::put_string(store, self.bucket()?, &paths.log, log)?;
        Ok(())
    }

    /// The release log, empty if none was written yet.
    pub fn read_log(&self, store: &dyn ObjectStore) -> Result<String> {
        let paths = self.paths()?;
        match store::get_string(store, self.bucket()?, &paths.log) {
            Ok(log) => Ok(log),
            Err(e) if e.is_not_found() => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a line to the release log.
    ///
    /// Read-modify-write with no merge: concurrent appends can lose lines.
    pub fn append_log(&self, store: &dyn ObjectStore, line: &str) -> Result<()> {
        let existing = self.read_log(store)?;
        self.write_log(store, &format!("{}\n{}", existing, line))
    }
}
