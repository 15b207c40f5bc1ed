//! Periodic screenshot producer.

use crate::session::{SessionHandle, SessionState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn the frame timer for a session in `Recording`. Each tick captures
/// one PNG into the frames directory with a dense, zero-padded index; a
/// failed capture skips the tick without incrementing the count. The task
/// exits on its own when the session leaves `Recording`, so a session in
/// that state holds exactly one live timer.
pub fn spawn_frame_recorder(handle: Arc<SessionHandle>, interval: Duration) -> JoinHandle<()> {
    let driver = handle.driver();
    tokio::spawn(async move {
        // Fixed-phase cadence: a slow screenshot delays one tick without
        // drifting the whole schedule.
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;

            let path = {
                let session = handle.lock().await;
                if session.state != SessionState::Recording {
                    break;
                }
                session.next_frame_path()
            };

            match driver.screenshot(&path).await {
                Ok(()) => {
                    handle.lock().await.frame_count += 1;
                }
                Err(e) => {
                    // One missed frame never halts the session.
                    debug!("Frame capture skipped: {}", e);
                }
            }
        }
        debug!("Frame recorder stopped");
    })
}

/// Count the densely numbered frames already on disk. Recovery trusts the
/// filesystem over any persisted counter.
pub fn count_frames(frames_dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(frames_dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("frame_") && name.ends_with(".png")
        })
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_count_frames_empty_or_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(count_frames(dir.path()), 0);
        assert_eq!(count_frames(&dir.path().join("nope")), 0);
    }

    #[test]
    fn test_count_frames_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        for i in 1..=5 {
            std::fs::write(dir.path().join(format!("frame_{i:06}.png")), b"png").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("frame_bad.jpg"), b"x").unwrap();
        assert_eq!(count_frames(dir.path()), 5);
    }
}
