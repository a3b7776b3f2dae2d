//! FFmpeg pipe encoder.
//!
//! Spawns the ffmpeg binary and feeds it packed BGRA frames over stdin,
//! producing H.264 in a `.mov` container with the faststart flag. The
//! process is spawned before capture starts so encoder startup never eats
//! into the recording.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use super::{EncoderConfig, EncoderFactory, VideoEncoder};
use crate::capture::CapturedFrame;
use crate::error::{OptionExt, ZoomcastError, ZoomcastResult};

/// Command that never flashes a console window on Windows.
pub fn create_hidden_command(program: &Path) -> Command {
    let mut cmd = Command::new(program);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd
}

/// Locate a working ffmpeg binary: the sidecar download first, system
/// PATH second. Every candidate is probed before use.
pub fn find_ffmpeg() -> Option<PathBuf> {
    let sidecar = ffmpeg_sidecar::paths::ffmpeg_path();
    if probe_binary(&sidecar) {
        log::debug!("[FFMPEG] using sidecar binary: {}", sidecar.display());
        return Some(sidecar);
    }
    log::debug!(
        "[FFMPEG] sidecar binary unusable ({}), checking system PATH",
        sidecar.display()
    );

    let name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
    match locate_on_path(name).filter(|p| probe_binary(p)) {
        Some(path) => {
            log::debug!("[FFMPEG] using system binary: {}", path.display());
            Some(path)
        }
        None => {
            log::warn!("[FFMPEG] no working ffmpeg found");
            None
        }
    }
}

/// A binary counts as working when `-version` exits cleanly.
fn probe_binary(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn locate_on_path(name: &str) -> Option<PathBuf> {
    let lookup = if cfg!(windows) { "where" } else { "which" };
    let output = Command::new(lookup).arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

/// Input and codec arguments for one session, output path excluded.
fn build_args(config: &EncoderConfig) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "bgra".to_string(),
        "-s".to_string(),
        format!("{}x{}", config.width, config.height),
        "-r".to_string(),
        config.fps.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-b:v".to_string(),
        config.bitrate.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]
}

/// FFmpeg process ready to receive frames on stdin.
pub struct FfmpegEncoder {
    stdin: Option<ChildStdin>,
    child: Option<Child>,
    output_path: PathBuf,
    frames_written: u64,
    failed: bool,
}

impl FfmpegEncoder {
    /// Spawn the ffmpeg process for one session.
    pub fn spawn(config: &EncoderConfig) -> ZoomcastResult<Self> {
        let ffmpeg_path = find_ffmpeg().ok_or(ZoomcastError::FfmpegNotFound)?;

        let mut child = create_hidden_command(&ffmpeg_path)
            .args(build_args(config))
            .arg(&config.output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ZoomcastError::EncoderError(format!("failed to start ffmpeg: {}", e)))?;

        let stdin = child.stdin.take().context("failed to get ffmpeg stdin")?;

        // Drain stderr so ffmpeg never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            let _ = std::thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines() {
                        match line {
                            Ok(line) if !line.trim().is_empty() => {
                                log::warn!("[ENCODER] ffmpeg: {}", line)
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        }
                    }
                });
        }

        log::info!(
            "[ENCODER] ffmpeg spawned: {}x{} @ {} fps -> {}",
            config.width,
            config.height,
            config.fps,
            config.output_path.display()
        );

        Ok(Self {
            stdin: Some(stdin),
            child: Some(child),
            output_path: config.output_path.clone(),
            frames_written: 0,
            failed: false,
        })
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn is_ready(&self) -> bool {
        !self.failed && self.stdin.is_some()
    }

    fn has_failed(&self) -> bool {
        self.failed
    }

    fn append(&mut self, frame: &CapturedFrame, _pts: Duration) -> ZoomcastResult<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            ZoomcastError::EncoderError("encoder already finished".to_string())
        })?;

        if let Err(e) = stdin.write_all(&frame.data) {
            // A broken pipe means ffmpeg died; nothing later can succeed.
            self.failed = true;
            return Err(ZoomcastError::EncoderError(format!(
                "frame write failed: {}",
                e
            )));
        }

        self.frames_written += 1;
        if self.frames_written % 300 == 0 {
            log::debug!("[ENCODER] {} frames written", self.frames_written);
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>, timeout: Duration) -> ZoomcastResult<PathBuf> {
        // Closing stdin is the EOF signal; ffmpeg then writes the trailer.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.flush();
        }

        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Ok(self.output_path.clone()),
        };

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        log::info!(
                            "[ENCODER] finished: {} frames -> {}",
                            self.frames_written,
                            self.output_path.display()
                        );
                        return Ok(self.output_path.clone());
                    }
                    return Err(ZoomcastError::EncoderError(format!(
                        "ffmpeg exited with {}",
                        status
                    )));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        // Release the process regardless; the file is likely
                        // missing its trailer.
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ZoomcastError::Timeout {
                            context: "ffmpeg finalize".to_string(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ZoomcastError::EncoderError(format!(
                        "ffmpeg wait error: {}",
                        e
                    )));
                }
            }
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // finish() takes the child; anything left here is an abandoned session.
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Factory producing [`FfmpegEncoder`] sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEncoderFactory;

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, config: &EncoderConfig) -> ZoomcastResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(FfmpegEncoder::spawn(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EncoderConfig {
        EncoderConfig {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate: 4_000_000,
            output_path: PathBuf::from("out.mov"),
        }
    }

    #[test]
    fn test_args_describe_raw_bgra_input() {
        let args = build_args(&config());
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo"));
        assert!(joined.contains("-pix_fmt bgra"));
        assert!(joined.contains("-s 1280x720"));
        assert!(joined.contains("-r 30"));
        assert!(joined.contains("-i pipe:0"));
    }

    #[test]
    fn test_args_encode_h264_mov_ready() {
        let args = build_args(&config());
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 4000000"));
        assert!(joined.contains("yuv420p"));
        assert!(joined.contains("-movflags +faststart"));
        // Overwrite flag so a colliding path never stalls on a prompt.
        assert_eq!(args[0], "-y");
    }

    #[test]
    fn test_input_pix_fmt_precedes_output_pix_fmt() {
        // Both -pix_fmt flags are positional: bgra must bind to the input,
        // yuv420p to the output.
        let args = build_args(&config());
        let input_idx = args.iter().position(|a| a == "bgra").unwrap();
        let pipe_idx = args.iter().position(|a| a == "pipe:0").unwrap();
        let output_idx = args.iter().position(|a| a == "yuv420p").unwrap();
        assert!(input_idx < pipe_idx);
        assert!(pipe_idx < output_idx);
    }
}
