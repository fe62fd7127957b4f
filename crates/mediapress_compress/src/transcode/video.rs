//! Video compression by shelling out to `ffmpeg`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use mediapress_config::CompressionConfig;

use super::{CompressedOutput, ScratchFile, Transcoder};
use crate::error::CompressionError;

/// Bytes of ffmpeg's stderr kept in error reports.
const STDERR_TAIL: usize = 2048;

/// Re-encodes video with libx264 and AAC audio, keeping the source container.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: OsString,
}

impl FfmpegTranscoder {
    /// Uses `program` (a name looked up on `PATH`, or a path) instead of `ffmpeg`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn locate(&self) -> Result<PathBuf, CompressionError> {
        which::which(&self.program).map_err(|_| CompressionError::ToolNotFound {
            tool: self.program.to_string_lossy().into_owned(),
        })
    }

    /// The argument list for one conversion.
    pub fn build_args(source: &Path, output: &Path, config: &CompressionConfig) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            source.as_os_str().to_owned(),
            "-y".into(),
            "-c:v".into(),
            "libx264".into(),
            "-crf".into(),
            config.video_crf.to_string().into(),
            "-preset".into(),
            config.video_preset.as_str().into(),
        ];
        if let Some(width) = config.video_max_width {
            args.push("-vf".into());
            args.push(format!("scale='min({width},iw)':-2").into());
        }
        args.extend(["-c:a", "aac", "-b:a", "128k"].map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::with_program("ffmpeg")
    }
}

impl Transcoder for FfmpegTranscoder {
    fn compress(
        &self,
        source: &Path,
        config: &CompressionConfig,
    ) -> Result<CompressedOutput, CompressionError> {
        let program = self.locate()?;
        let io_err = |path: &Path, e: std::io::Error| CompressionError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_ascii_lowercase();
        let scratch = tempfile::tempdir().map_err(|e| io_err(source, e))?;
        let output = scratch.path().join(format!("out.{ext}"));

        let args = Self::build_args(source, &output, config);
        tracing::debug!(source = %source.display(), "running ffmpeg");
        let result = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| io_err(&program, e))?;

        if !result.status.success() {
            return Err(CompressionError::ToolFailed {
                tool: self.program.to_string_lossy().into_owned(),
                status: result.status.to_string(),
                stderr: stderr_tail(&result.stderr),
            });
        }

        let written = match std::fs::metadata(&output) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CompressionError::ToolFailed {
                    tool: self.program.to_string_lossy().into_owned(),
                    status: result.status.to_string(),
                    stderr: "no output file was written".to_string(),
                });
            }
            Err(e) => return Err(io_err(&output, e)),
        };
        if written == 0 {
            return Err(CompressionError::EmptyOutput {
                path: source.to_path_buf(),
            });
        }
        Ok(CompressedOutput::File(ScratchFile::new(scratch, output)))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let mut start = text.len().saturating_sub(STDERR_TAIL);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
