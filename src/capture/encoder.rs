//! Final MP4 assembly from numbered frames plus optional audio.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Audio files at or below this size are junk headers from a capture that
/// never got samples; encode video-only instead.
pub const AUDIO_MIN_BYTES: u64 = 5 * 1024;

/// Playback rate matching the frame recorder's capture cadence.
pub const ENCODE_FRAMERATE: &str = "2";

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("FFmpeg not found: {0:?}")]
    FfmpegMissing(PathBuf),

    #[error("encoding timed out after {0:?}")]
    TimedOut(Duration),

    #[error("FFmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("failed to run FFmpeg: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives one short-lived FFmpeg invocation per finalized session.
pub struct Encoder {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl Encoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }

    /// Whether the configured FFmpeg resolves to an executable.
    pub fn is_available(&self) -> bool {
        which::which(&self.ffmpeg).is_ok()
    }

    /// Join the numbered frames (and the audio track when it is real)
    /// into `output`. On timeout the child is killed and the frames stay
    /// on disk for a later recovery pass.
    pub async fn encode(
        &self,
        frames_dir: &Path,
        audio: Option<&Path>,
        output: &Path,
    ) -> Result<(), EncoderError> {
        if !self.is_available() {
            return Err(EncoderError::FfmpegMissing(self.ffmpeg.clone()));
        }

        let audio = audio.filter(|path| has_usable_audio(path));
        let pattern = frames_dir.join("frame_%06d.png");

        let mut cmd = Command::new(&self.ffmpeg);
        // The frame recorder indexes from 1; image2 defaults to 0 and
        // would fail on the missing frame_000000.png.
        cmd.args(["-framerate", ENCODE_FRAMERATE, "-start_number", "1"])
            .arg("-i")
            .arg(&pattern);
        if let Some(audio_path) = audio {
            cmd.arg("-i").arg(audio_path);
        }
        cmd.args(["-c:v", "libx264", "-pix_fmt", "yuv420p"]);
        if audio.is_some() {
            cmd.args(["-c:a", "aac", "-b:a", "128k"]);
        }
        cmd.args(["-crf", "23", "-preset", "fast"]);
        if audio.is_some() {
            cmd.arg("-shortest");
        }
        cmd.arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            "Encoding {:?} ({}) -> {:?}",
            frames_dir,
            if audio.is_some() { "with audio" } else { "video only" },
            output
        );

        let child = cmd.spawn()?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                // kill_on_drop reaps the child.
                warn!("Encoding timed out after {:?}", self.timeout);
                Err(EncoderError::TimedOut(self.timeout))
            }
            Ok(Err(e)) => Err(EncoderError::Io(e)),
            Ok(Ok(result)) if result.status.success() => {
                info!("Encoding complete: {:?}", output);
                Ok(())
            }
            Ok(Ok(result)) => {
                let stderr = String::from_utf8_lossy(&result.stderr);
                Err(EncoderError::Failed {
                    status: result.status.to_string(),
                    stderr: stderr.trim().chars().take(500).collect(),
                })
            }
        }
    }
}

/// Audio qualifies only when the file exists and is larger than the
/// junk-header threshold.
pub fn has_usable_audio(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.len() > AUDIO_MIN_BYTES)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_audio_is_unusable() {
        assert!(!has_usable_audio(Path::new("/nonexistent/audio.mp3")));
    }

    #[test]
    fn test_tiny_audio_is_unusable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audio.mp3");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        assert!(!has_usable_audio(&path));
    }

    #[test]
    fn test_real_audio_is_usable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audio.mp3");
        std::fs::write(&path, vec![0u8; (AUDIO_MIN_BYTES + 1) as usize]).unwrap();
        assert!(has_usable_audio(&path));
    }

    #[tokio::test]
    async fn test_encode_with_missing_ffmpeg_errors() {
        let dir = TempDir::new().unwrap();
        let encoder = Encoder::new("/nonexistent/ffmpeg-binary", Duration::from_secs(5));
        let result = encoder
            .encode(dir.path(), None, &dir.path().join("out.mp4"))
            .await;
        assert!(matches!(result, Err(EncoderError::FfmpegMissing(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encode_starts_numbering_at_one() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();

        // Stub that records its argv so the command shape can be checked,
        // then writes the output file (last argument).
        let args_log = dir.path().join("args.txt");
        let stub = dir.path().join("ffmpeg");
        std::fs::write(
            &stub,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$@\" > {}\nfor arg in \"$@\"; do out=\"$arg\"; done\necho fake > \"$out\"\n",
                args_log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let frames = dir.path().join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        for i in 1..=3 {
            std::fs::write(frames.join(format!("frame_{i:06}.png")), b"png").unwrap();
        }
        let output = dir.path().join("out.mp4");

        let encoder = Encoder::new(&stub, Duration::from_secs(5));
        encoder.encode(&frames, None, &output).await.unwrap();
        assert!(output.exists());

        // The 1-based frame files only resolve when image2 is told to
        // start at 1.
        let args: Vec<String> = std::fs::read_to_string(&args_log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        let position = args
            .iter()
            .position(|a| a == "-start_number")
            .expect("-start_number must be passed");
        assert_eq!(args[position + 1], "1");
        assert!(args[position + 2] == "-i");
    }
}
