use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;

/// Default wall-clock budget for a single merge/convert invocation.
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Options that control where and how the pipeline writes its outputs.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// Each front end is responsible for mapping user input into this type so that:
/// - the pipeline never reads an implicit output directory from process state
/// - tests can run isolated pipelines against their own temporary directories
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that receives finished files and their thumbnails.
    pub output_dir: PathBuf,

    /// Directory for intermediate video/audio files awaiting a merge or conversion.
    ///
    /// Intermediates that fail to merge are left here on purpose so no downloaded bytes are lost.
    pub scratch_dir: PathBuf,

    /// Upper bound for one invocation of the encoding tool.
    pub conversion_timeout: Duration,

    /// Whether to save a `.jpg` thumbnail next to each finished file.
    pub save_thumbnails: bool,

    /// Container we prefer for adaptive video streams (and exact-match progressive streams).
    pub preferred_container: String,
}

impl Config {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            scratch_dir: std::env::temp_dir(),
            conversion_timeout: DEFAULT_CONVERSION_TIMEOUT,
            save_thumbnails: true,
            preferred_container: "mp4".to_owned(),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_conversion_timeout(mut self, timeout: Duration) -> Self {
        self.conversion_timeout = timeout;
        self
    }

    pub fn with_thumbnails(mut self, enabled: bool) -> Self {
        self.save_thumbnails = enabled;
        self
    }

    pub fn with_preferred_container(mut self, container: impl Into<String>) -> Self {
        self.preferred_container = container.into();
        self
    }

    /// Create the output and scratch directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.scratch_dir)?;
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
