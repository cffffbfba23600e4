//! FFmpeg / FFprobe command wrapper utilities

use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use thiserror::Error;

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("{0} not found in system PATH")]
    NotInstalled(&'static str),

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct FfmpegCommand {
    program: &'static str,
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        Self {
            program: FFMPEG,
            args: vec!["-hide_banner".to_string(), "-loglevel".to_string(), "error".to_string()],
        }
    }

    /// `ffprobe` invocation printing stream information as JSON
    pub fn probe() -> Self {
        Self {
            program: FFPROBE,
            args: vec![
                "-v".to_string(),
                "error".to_string(),
                "-print_format".to_string(),
                "json".to_string(),
                "-show_streams".to_string(),
            ],
        }
    }

    pub fn program(&self) -> &'static str {
        self.program
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("-i".to_string());
        self.args.push(path.as_ref().display().to_string());
        self
    }

    /// Bare positional path, as `ffprobe` expects its input
    pub fn target(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    pub fn execute(self) -> Result<Output, FfmpegError> {
        if !is_installed(self.program) {
            return Err(FfmpegError::NotInstalled(self.program));
        }

        let output = Command::new(self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| FfmpegError::ExecutionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FfmpegError::ExecutionFailed(stderr.trim().to_string()));
        }

        Ok(output)
    }

    /// Start the process with the given stdin/stdout wiring; stderr is always piped
    pub fn spawn(self, stdin: Stdio, stdout: Stdio) -> Result<Child, FfmpegError> {
        if !is_installed(self.program) {
            return Err(FfmpegError::NotInstalled(self.program));
        }

        Command::new(self.program)
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FfmpegError::ExecutionFailed(e.to_string()))
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether both `ffmpeg` and `ffprobe` can be launched
pub fn ffmpeg_available() -> bool {
    is_installed(FFMPEG) && is_installed(FFPROBE)
}

fn is_installed(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}
