use std::io::Write;
use std::path::Path;

use anyhow::Result;
use tempfile::NamedTempFile;

/// A settings file that lives as long as the test.
pub(crate) struct TempConfig {
    file: NamedTempFile,
}

impl TempConfig {
    pub(crate) fn new(payload: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("rqbridge-test-")
            .suffix(".toml")
            .tempfile()?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        Ok(Self { file })
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    /// The path as the commands' `--config` value.
    pub(crate) fn config_arg(&self) -> Option<String> {
        Some(self.path().to_string_lossy().to_string())
    }
}
