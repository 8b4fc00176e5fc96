//! Thin ffmpeg/ffprobe wrappers shared across the workspace.
//!
//! Everything here shells out to the system `ffmpeg`/`ffprobe` binaries via
//! `tokio::process`. Callers are expected to treat failures as recoverable
//! where a fallback input exists (e.g. keep the unoptimized video when a
//! sampling pass fails).

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors produced by media tool invocations.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {status}: {stderr}")]
    NonZeroExit {
        tool: &'static str,
        status: i32,
        stderr: String,
    },

    #[error("could not parse {tool} output: {detail}")]
    OutputParse { tool: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Create a `tokio::process::Command` that never pops a console window on
/// Windows. On other targets this is a plain command.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

async fn run_tool(tool: &'static str, mut cmd: tokio::process::Command) -> Result<Vec<u8>> {
    let output = cmd
        .output()
        .await
        .map_err(|source| MediaError::Spawn { tool, source })?;

    if !output.status.success() {
        return Err(MediaError::NonZeroExit {
            tool,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Write an ffmpeg concat-demuxer list file for the given segments.
///
/// Single quotes in paths are escaped per the demuxer's quoting rules
/// (`'` becomes `'\''`).
pub async fn write_concat_list(list_path: &Path, segments: &[PathBuf]) -> Result<()> {
    let mut body = String::new();
    for segment in segments {
        let escaped = segment.to_string_lossy().replace('\'', "'\\''");
        body.push_str(&format!("file '{}'\n", escaped));
    }
    tokio::fs::write(list_path, body).await?;
    Ok(())
}

/// Concatenate the segments listed in `list_path` into `output` using a
/// zero-re-encode stream copy (`-c copy`).
///
/// Fails when container/codec parameters differ across segments; callers
/// decide whether that is fatal.
pub async fn concat_copy(list_path: &Path, output: &Path) -> Result<()> {
    debug!(list = %list_path.display(), output = %output.display(), "ffmpeg concat copy");
    let mut cmd = tokio_command("ffmpeg");
    cmd.arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(list_path)
        .arg("-c")
        .arg("copy")
        .arg("-y")
        .arg(output);
    run_tool("ffmpeg", cmd).await?;
    Ok(())
}

/// Re-sample `input` down to `fps` frames per second, writing to `output`.
///
/// Used to bound the size of videos shipped to the remote vision model.
pub async fn sample_frames(input: &Path, output: &Path, fps: u32) -> Result<()> {
    debug!(input = %input.display(), fps, "ffmpeg frame sampling");
    let mut cmd = tokio_command("ffmpeg");
    cmd.arg("-i")
        .arg(input)
        .arg("-vf")
        .arg(format!("fps={fps}"))
        .arg("-an")
        .arg("-y")
        .arg(output);
    run_tool("ffmpeg", cmd).await?;
    Ok(())
}

/// Probe the duration of a media file in seconds via ffprobe.
pub async fn probe_duration_secs(input: &Path) -> Result<f64> {
    let mut cmd = tokio_command("ffprobe");
    cmd.arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(input);
    let stdout = run_tool("ffprobe", cmd).await?;
    let text = String::from_utf8_lossy(&stdout);
    parse_duration(text.trim())
}

fn parse_duration(raw: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|_| MediaError::OutputParse {
        tool: "ffprobe",
        detail: format!("expected a float duration, got '{raw}'"),
    })
}
