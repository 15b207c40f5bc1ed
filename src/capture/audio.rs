//! Host-audio capture through a long-lived FFmpeg child.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Grace between the stdin `q` and the terminate signal.
const QUIT_GRACE: Duration = Duration::from_millis(500);
/// How long to wait for FFmpeg to finalize the MP3 after the kill.
const FINALIZE_WAIT: Duration = Duration::from_secs(1);

/// Owns the FFmpeg subprocess writing host audio to MP3.
///
/// The output is tuned for downstream speech-to-text, not fidelity:
/// mono, 16 kHz, 64 kbps. A missing audio device fails `start` but must
/// never fail the session; callers log and continue caption-only.
pub struct AudioRecorder {
    child: Child,
    output: PathBuf,
}

impl AudioRecorder {
    pub fn start(ffmpeg: &Path, device: Option<&str>, output: &Path) -> Result<Self> {
        let mut cmd = Command::new(ffmpeg);

        if cfg!(target_os = "macos") {
            // avfoundation addresses audio-only devices as ":<index>".
            let index = device.unwrap_or("0");
            cmd.args(["-f", "avfoundation", "-i"]).arg(format!(":{index}"));
        } else {
            cmd.args(["-f", "pulse", "-i", device.unwrap_or("default")]);
        }

        cmd.args(["-acodec", "libmp3lame", "-ac", "1", "-ar", "16000", "-b:a", "64k", "-y"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to launch FFmpeg audio capture to {output:?}"))?;

        info!("Audio capture started: {:?}", output);
        Ok(Self {
            child,
            output: output.to_path_buf(),
        })
    }

    /// Stop the capture: `q` on stdin for a clean MP3 trailer, terminate
    /// after a grace period, then wait briefly for the file to settle.
    /// Returns the output path when FFmpeg produced a file.
    pub async fn stop(mut self) -> Option<PathBuf> {
        if let Some(mut stdin) = self.child.stdin.take() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
            // Dropping stdin closes the pipe; FFmpeg treats either as quit.
        }

        tokio::time::sleep(QUIT_GRACE).await;

        match self.child.try_wait() {
            Ok(Some(status)) => debug!("Audio FFmpeg exited: {}", status),
            _ => {
                if let Err(e) = self.child.start_kill() {
                    warn!("Failed to terminate audio FFmpeg: {}", e);
                }
            }
        }

        if tokio::time::timeout(FINALIZE_WAIT, self.child.wait())
            .await
            .is_err()
        {
            warn!("Audio FFmpeg did not exit within {:?}", FINALIZE_WAIT);
        }

        if self.output.exists() {
            info!("Audio capture finalized: {:?}", self.output);
            Some(self.output)
        } else {
            warn!("Audio capture produced no file at {:?}", self.output);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_start_with_missing_binary_errors() {
        let dir = TempDir::new().unwrap();
        let result = AudioRecorder::start(
            Path::new("/nonexistent/ffmpeg-binary"),
            None,
            &dir.path().join("out.mp3"),
        );
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_returns_output_written_by_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp3");

        // Stub that touches its output file (last argument) and then
        // blocks on stdin like FFmpeg does.
        let stub = dir.path().join("ffmpeg-stub.sh");
        std::fs::write(
            &stub,
            "#!/bin/sh\nfor arg in \"$@\"; do out=\"$arg\"; done\ntouch \"$out\"\ncat > /dev/null\n",
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let recorder = AudioRecorder::start(&stub, None, &output).unwrap();
        let finalized = recorder.stop().await;
        assert_eq!(finalized, Some(output.clone()));
        assert!(output.exists());
    }
}
