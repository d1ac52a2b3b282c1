//! External muxing collaborator.
//!
//! DASH delivery ships audio and video as separate tracks; after the
//! delivery layer downloads the selected pair it needs them remuxed into one
//! playable container. Mux failure is never terminal for a resolution: the
//! caller simply keeps the feed without a merged file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ResolveError;

#[async_trait]
pub trait Muxer: Send + Sync {
    /// Merge the given track files into `output`.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ResolveError>;
}

/// ffmpeg-backed muxer; copies codecs, no re-encode.
pub struct FfmpegMuxer {
    program: String,
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ResolveError> {
        if inputs.is_empty() {
            return Err(ResolveError::Mux("no input tracks".to_string()));
        }
        let mut command = tokio::process::Command::new(&self.program);
        command.arg("-y");
        for input in inputs {
            command.arg("-i").arg(input);
        }
        command.arg("-c").arg("copy").arg(output);
        debug!(?inputs, output = %output.display(), "merging tracks");

        let result = command
            .output()
            .await
            .map_err(|e| ResolveError::Mux(format!("failed to spawn {}: {e}", self.program)))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail = stderr.lines().next_back().unwrap_or("").to_string();
            return Err(ResolveError::Mux(format!(
                "{} exited with {}: {tail}",
                self.program, result.status
            )));
        }
        Ok(())
    }
}
