//! Session lifecycle state and ownership.
//!
//! A [`Session`] is the snapshot state of one live capture; a
//! [`SessionHandle`] wraps it with the resources the session owns: the
//! browser driver, the audio subprocess, and the recorder tasks. The
//! handle is the single owner: nothing outside the engine holds a live
//! reference to the browser or the FFmpeg child.

pub mod persistence;
pub mod registry;
pub mod transcript;

use crate::browser::BrowserDriver;
use crate::capture::audio::AudioRecorder;
use crate::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

pub use persistence::{PersistedSession, PersistenceStore};
pub use registry::SessionRegistry;
pub use transcript::{
    format_timestamp_ms, render_transcript, CaptionSegment, EMPTY_TRANSCRIPT_FALLBACK,
    RECOVERY_TRANSCRIPT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Joining,
    InMeeting,
    Recording,
    Paused,
    Ending,
    Ended,
    Errored,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joining => "joining",
            Self::InMeeting => "in_meeting",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Ending => "ending",
            Self::Ended => "ended",
            Self::Errored => "errored",
        }
    }

    /// Whether the caption scraper keeps polling in this state.
    pub fn captions_active(&self) -> bool {
        matches!(self, Self::InMeeting | Self::Recording | Self::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot state of one live capture. Mutated under the handle's mutex;
/// `status` readers copy it out whole.
#[derive(Debug, Clone)]
pub struct Session {
    pub meeting_id: String,
    pub session_id: String,
    pub platform: Platform,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub frames_dir: PathBuf,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub frame_count: u64,
    pub transcript: Vec<CaptionSegment>,
    pub screenshots: Vec<PathBuf>,
    pub is_recording: bool,
}

impl Session {
    pub fn new(
        meeting_id: impl Into<String>,
        session_id: impl Into<String>,
        platform: Platform,
        recordings_root: &Path,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            meeting_id: meeting_id.into(),
            frames_dir: recordings_root.join(format!("{session_id}_frames")),
            video_path: recordings_root.join(format!("{session_id}_video.mp4")),
            audio_path: recordings_root.join(format!("{session_id}_audio.mp3")),
            session_id,
            platform,
            state: SessionState::Joining,
            started_at: Utc::now(),
            frame_count: 0,
            transcript: Vec::new(),
            screenshots: Vec::new(),
            is_recording: false,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn duration_seconds(&self) -> u64 {
        self.elapsed_ms() / 1000
    }

    /// Path of the next frame to capture. 1-based dense 6-digit indexing;
    /// the encoder's `%06d` input pattern relies on it.
    pub fn next_frame_path(&self) -> PathBuf {
        self.frames_dir
            .join(format!("frame_{:06}.png", self.frame_count + 1))
    }

    /// Append a scraped caption unless its text repeats the immediately
    /// previous segment. Timestamps are clamped nondecreasing. Returns
    /// whether the segment was stored.
    pub fn append_caption(&mut self, speaker: Option<String>, text: String) -> bool {
        if let Some(last) = self.transcript.last() {
            if last.text == text {
                return false;
            }
        }

        let elapsed = self.elapsed_ms();
        let timestamp_ms = self
            .transcript
            .last()
            .map(|s| s.timestamp_ms.max(elapsed))
            .unwrap_or(elapsed);

        self.transcript.push(CaptionSegment {
            speaker: speaker
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Speaker".to_string()),
            text,
            timestamp_ms,
            confidence: 0.95,
        });
        true
    }

    pub fn persisted(&self) -> PersistedSession {
        PersistedSession {
            meeting_id: self.meeting_id.clone(),
            session_id: self.session_id.clone(),
            platform: self.platform,
            frames_dir: self.frames_dir.clone(),
            started_at: self.started_at,
            frame_count: self.frame_count,
        }
    }
}

/// One live capture plus everything it owns.
pub struct SessionHandle {
    state: Mutex<Session>,
    driver: Arc<dyn BrowserDriver>,
    audio: Mutex<Option<AudioRecorder>>,
    frame_task: Mutex<Option<JoinHandle<()>>>,
    caption_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn new(session: Session, driver: Arc<dyn BrowserDriver>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(session),
            driver,
            audio: Mutex::new(None),
            frame_task: Mutex::new(None),
            caption_task: Mutex::new(None),
        })
    }

    pub fn driver(&self) -> Arc<dyn BrowserDriver> {
        Arc::clone(&self.driver)
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> Session {
        self.state.lock().await.clone()
    }

    pub async fn set_state(&self, state: SessionState) {
        self.state.lock().await.state = state;
    }

    pub async fn store_audio(&self, recorder: AudioRecorder) {
        *self.audio.lock().await = Some(recorder);
    }

    pub async fn take_audio(&self) -> Option<AudioRecorder> {
        self.audio.lock().await.take()
    }

    pub async fn store_frame_task(&self, task: JoinHandle<()>) {
        if let Some(previous) = self.frame_task.lock().await.replace(task) {
            previous.abort();
        }
    }

    pub async fn take_frame_task(&self) -> Option<JoinHandle<()>> {
        self.frame_task.lock().await.take()
    }

    pub async fn store_caption_task(&self, task: JoinHandle<()>) {
        if let Some(previous) = self.caption_task.lock().await.replace(task) {
            previous.abort();
        }
    }

    pub async fn take_caption_task(&self) -> Option<JoinHandle<()>> {
        self.caption_task.lock().await.take()
    }

    /// Cancel all periodic recorder tasks. Used by shutdown; the normal
    /// leave path lets tasks observe the state change and exit themselves.
    pub async fn abort_tasks(&self) {
        if let Some(task) = self.take_frame_task().await {
            task.abort();
        }
        if let Some(task) = self.take_caption_task().await {
            task.abort();
        }
    }
}
