//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg invocations.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek to a position before decoding the input.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit the output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Copy both streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Force a keyframe whenever the expression fires.
    pub fn force_key_frames(self, expr: impl Into<String>) -> Self {
        self.output_arg("-force_key_frames").output_arg(expr)
    }

    /// Set the GOP size in frames.
    pub fn gop(self, frames: u32) -> Self {
        self.output_arg("-g").output_arg(frames.to_string())
    }

    /// Build the full argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];

        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with an optional wall-clock timeout.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout; the process is killed when it elapses.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    // kill_on_drop reaps the process when the future is dropped
                    warn!("FFmpeg timed out after {:?}", timeout);
                    return Err(MediaError::Timeout(timeout.as_secs()));
                }
            },
            None => child.wait_with_output().await?,
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!stderr.is_empty()).then_some(stderr),
                output.status.code(),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_builder_places_args_around_input() {
        let cmd = FfmpegCommand::new("in.mkv", "out.mp4")
            .seek(10.0)
            .duration(30.0)
            .codec_copy();

        let args = cmd.build_args();
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        let t_pos = args.iter().position(|a| a == "-t").unwrap();

        assert!(ss_pos < i_pos, "-ss must come before -i");
        assert!(t_pos > i_pos, "-t must come after -i");
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"copy".to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn command_builder_overwrites_by_default() {
        let args = FfmpegCommand::new("a", "b").build_args();
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn keyframe_args() {
        let cmd = FfmpegCommand::new("in.mkv", "out.mp4")
            .force_key_frames("expr:gte(t,n_forced*60)")
            .gop(1800);
        let args = cmd.build_args();
        assert!(args.contains(&"-force_key_frames".to_string()));
        assert!(args.contains(&"expr:gte(t,n_forced*60)".to_string()));
        assert!(args.contains(&"-g".to_string()));
        assert!(args.contains(&"1800".to_string()));
    }
}
