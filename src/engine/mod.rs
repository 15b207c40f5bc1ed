//! Public capture façade.
//!
//! Orchestrates the full session pipeline:
//! join → record (frames | audio | captions) → leave → encode,
//! plus crash recovery for sessions whose owning process died.
//!
//! All collaborators are injected (the browser through
//! [`BrowserLauncher`], FFmpeg through the configured program path), so
//! the façade drives identically against production Chromium or the test
//! fakes.

use crate::browser::BrowserLauncher;
use crate::capture::encoder::Encoder;
use crate::capture::{audio::AudioRecorder, captions, frames};
use crate::config::Config;
use crate::platform::{adapter_for, detect, JoinContext, JoinOutcome, Platform};
use crate::session::{
    format_timestamp_ms, render_transcript, CaptionSegment, PersistedSession, PersistenceStore,
    Session, SessionHandle, SessionRegistry, SessionState, RECOVERY_TRANSCRIPT,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("meeting {meeting_id} already has a live capture session")]
    AlreadyActive { meeting_id: String },

    #[error("no active capture session for meeting {meeting_id}")]
    NotActive { meeting_id: String },

    #[error("join timed out waiting for admission")]
    JoinTimedOut,

    #[error("join rejected: {reason}")]
    JoinRejected { reason: String },

    #[error("driver operation failed: {0}")]
    Driver(String),

    #[error("recovery failed: {0}")]
    Recovery(String),
}

/// Engine tuning. The intervals default to the production cadence; tests
/// shrink them to run scenarios at test speed.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub recordings_root: PathBuf,
    pub bot_name: String,
    pub audio_device: Option<String>,
    pub ffmpeg_path: PathBuf,
    pub debug_screenshots: bool,
    pub frame_interval: Duration,
    pub caption_interval: Duration,
    pub admission_poll_interval: Duration,
    pub admission_timeout: Duration,
    pub navigation_timeout: Duration,
    pub encode_timeout: Duration,
}

impl EngineConfig {
    pub fn new(recordings_root: impl Into<PathBuf>) -> Self {
        Self {
            recordings_root: recordings_root.into(),
            bot_name: "Meetscribe Notetaker".to_string(),
            audio_device: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            debug_screenshots: false,
            frame_interval: Duration::from_millis(500),
            caption_interval: Duration::from_secs(2),
            admission_poll_interval: Duration::from_secs(1),
            admission_timeout: Duration::from_secs(120),
            navigation_timeout: Duration::from_secs(60),
            encode_timeout: Duration::from_secs(300),
        }
    }

    pub fn from_app_config(config: &Config) -> anyhow::Result<Self> {
        let mut engine = Self::new(config.recordings_root()?);
        engine.bot_name = config.capture.bot_name.clone();
        engine.audio_device = config.capture.audio_device.clone();
        engine.ffmpeg_path = config.capture.ffmpeg_path.clone();
        engine.debug_screenshots = config.capture.debug_screenshots;
        Ok(engine)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinResult {
    pub session_id: String,
    pub platform: Platform,
    pub recording_started: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaveResult {
    pub duration_seconds: u64,
    pub transcript: String,
    pub transcript_segments: Vec<CaptionSegment>,
    pub video_path: Option<PathBuf>,
    pub screenshots: Vec<PathBuf>,
    pub frame_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptLine {
    pub timestamp: String,
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusReport {
    NotActive,
    Active {
        session_id: String,
        platform: Platform,
        state: SessionState,
        duration_seconds: u64,
        frame_count: u64,
        is_recording: bool,
        /// Last 20 transcript segments, formatted.
        recent_transcript: Vec<TranscriptLine>,
    },
}

const STATUS_TRANSCRIPT_TAIL: usize = 20;

pub struct CaptureEngine {
    config: EngineConfig,
    launcher: Arc<dyn BrowserLauncher>,
    registry: SessionRegistry,
    encoder: Encoder,
}

impl CaptureEngine {
    pub fn new(
        config: EngineConfig,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self, CaptureError> {
        std::fs::create_dir_all(&config.recordings_root).map_err(|e| {
            CaptureError::Configuration(format!(
                "recordings root {:?} is not writable: {e}",
                config.recordings_root
            ))
        })?;

        let encoder = Encoder::new(config.ffmpeg_path.clone(), config.encode_timeout);
        if !encoder.is_available() {
            // Capture still works; only finalization needs FFmpeg.
            warn!(
                "FFmpeg not found at {:?}; leave() will not produce videos",
                config.ffmpeg_path
            );
        }

        let registry = SessionRegistry::new(PersistenceStore::new(&config.recordings_root));

        Ok(Self {
            config,
            launcher,
            registry,
            encoder,
        })
    }

    /// Join a meeting and start recording.
    pub async fn join(
        &self,
        meeting_id: &str,
        meeting_url: &str,
    ) -> Result<JoinResult, CaptureError> {
        if self.registry.get(meeting_id).await.is_some() {
            return Err(CaptureError::AlreadyActive {
                meeting_id: meeting_id.to_string(),
            });
        }

        let platform = detect(meeting_url);
        let adapter = adapter_for(platform).ok_or_else(|| CaptureError::JoinRejected {
            reason: format!("unrecognized conferencing platform for {meeting_url}"),
        })?;

        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(
            meeting_id,
            session_id.as_str(),
            platform,
            &self.config.recordings_root,
        );
        std::fs::create_dir_all(&session.frames_dir).map_err(|e| {
            CaptureError::Configuration(format!("cannot create frames dir: {e}"))
        })?;

        info!(
            "Joining {} meeting {} as session {}",
            platform, meeting_id, session_id
        );

        let driver = self
            .launcher
            .launch()
            .await
            .map_err(|e| CaptureError::Configuration(format!("browser launch failed: {e}")))?;

        if let Err(e) = driver.grant_permissions(&origin_of(meeting_url)).await {
            warn!("Permission grant failed: {}", e);
        }

        let handle = SessionHandle::new(session, Arc::clone(&driver));
        let inserted = self
            .registry
            .insert_unique(Arc::clone(&handle))
            .await
            .map_err(|e| CaptureError::Configuration(e.to_string()))?;
        if !inserted {
            driver.close().await;
            return Err(CaptureError::AlreadyActive {
                meeting_id: meeting_id.to_string(),
            });
        }

        let ctx = JoinContext {
            meeting_url: meeting_url.to_string(),
            bot_name: self.config.bot_name.clone(),
            navigation_timeout: self.config.navigation_timeout,
            admission_timeout: self.config.admission_timeout,
            poll_interval: self.config.admission_poll_interval,
            debug_dir: self.debug_dir(),
        };

        match adapter.join(driver.as_ref(), &ctx).await {
            JoinOutcome::Succeeded => {}
            JoinOutcome::TimedOut => {
                self.teardown_failed_join(meeting_id, &handle).await;
                return Err(CaptureError::JoinTimedOut);
            }
            JoinOutcome::Rejected { reason } => {
                self.teardown_failed_join(meeting_id, &handle).await;
                return Err(CaptureError::JoinRejected { reason });
            }
        }

        handle.set_state(SessionState::InMeeting).await;
        self.start_recorders(&handle, adapter.caption_probe()).await;

        info!("Session {} recording", session_id);
        Ok(JoinResult {
            session_id,
            platform,
            recording_started: true,
        })
    }

    /// Leave a meeting and finalize its artifacts. When no live session
    /// exists but a persisted record does, this is the recovery path.
    pub async fn leave(&self, meeting_id: &str) -> Result<LeaveResult, CaptureError> {
        let Some(handle) = self.registry.get(meeting_id).await else {
            let persisted = self
                .registry
                .store()
                .get(meeting_id)
                .map_err(|e| CaptureError::Configuration(e.to_string()))?;
            return match persisted {
                Some(record) => self.recover_orphan(record).await,
                None => Err(CaptureError::NotActive {
                    meeting_id: meeting_id.to_string(),
                }),
            };
        };

        info!("Leaving meeting {}", meeting_id);
        handle.set_state(SessionState::Ending).await;

        // Recorders stop before the encoder runs: captions first, then a
        // final best-effort screenshot while the page is still alive.
        if let Some(task) = handle.take_caption_task().await {
            task.abort();
        }

        let driver = handle.driver();
        let final_shot = {
            let session = handle.lock().await;
            self.screenshot_path(&session.session_id)
        };
        if driver.screenshot(&final_shot).await.is_ok() {
            handle.lock().await.screenshots.push(final_shot);
        }

        if let Some(task) = handle.take_frame_task().await {
            task.abort();
        }
        if let Some(recorder) = handle.take_audio().await {
            recorder.stop().await;
        }

        driver.close().await;

        let session = handle.snapshot().await;
        let transcript = render_transcript(&session.transcript);

        let video_path = if session.frame_count >= 1 {
            match self
                .encoder
                .encode(
                    &session.frames_dir,
                    Some(&session.audio_path),
                    &session.video_path,
                )
                .await
            {
                Ok(()) => Some(session.video_path.clone()),
                Err(e) => {
                    // Frames stay on disk for a later recovery pass.
                    warn!("Encoding failed for {}: {}", session.session_id, e);
                    None
                }
            }
        } else {
            None
        };

        let duration_seconds = session.duration_seconds();
        handle.set_state(SessionState::Ended).await;
        self.registry.remove(meeting_id).await;

        info!(
            "Session {} ended after {}s with {} frames",
            session.session_id, duration_seconds, session.frame_count
        );

        Ok(LeaveResult {
            duration_seconds,
            transcript,
            transcript_segments: session.transcript,
            video_path,
            screenshots: session.screenshots,
            frame_count: session.frame_count,
        })
    }

    /// Snapshot the current state of a meeting's capture.
    pub async fn status(&self, meeting_id: &str) -> StatusReport {
        let Some(handle) = self.registry.get(meeting_id).await else {
            return StatusReport::NotActive;
        };

        let session = handle.snapshot().await;
        let tail_start = session
            .transcript
            .len()
            .saturating_sub(STATUS_TRANSCRIPT_TAIL);
        let recent_transcript = session.transcript[tail_start..]
            .iter()
            .map(|s| TranscriptLine {
                timestamp: format_timestamp_ms(s.timestamp_ms),
                speaker: s.speaker.clone(),
                text: s.text.clone(),
            })
            .collect();

        let duration_seconds = session.duration_seconds();

        StatusReport::Active {
            session_id: session.session_id,
            platform: session.platform,
            state: session.state,
            duration_seconds,
            frame_count: session.frame_count,
            is_recording: session.is_recording,
            recent_transcript,
        }
    }

    /// Capture an ad-hoc screenshot of the live page.
    pub async fn screenshot(&self, meeting_id: &str) -> Result<PathBuf, CaptureError> {
        let handle = self
            .registry
            .get(meeting_id)
            .await
            .ok_or_else(|| CaptureError::NotActive {
                meeting_id: meeting_id.to_string(),
            })?;

        let path = {
            let session = handle.lock().await;
            self.screenshot_path(&session.session_id)
        };

        handle
            .driver()
            .screenshot(&path)
            .await
            .map_err(|e| CaptureError::Driver(e.to_string()))?;

        handle.lock().await.screenshots.push(path.clone());
        Ok(path)
    }

    /// Pause or resume frame and audio capture. Caption scraping keeps
    /// running either way. Returns the new `is_recording`.
    pub async fn toggle_recording(&self, meeting_id: &str) -> Result<bool, CaptureError> {
        let handle = self
            .registry
            .get(meeting_id)
            .await
            .ok_or_else(|| CaptureError::NotActive {
                meeting_id: meeting_id.to_string(),
            })?;

        let was_recording = {
            let session = handle.lock().await;
            session.is_recording
        };

        if was_recording {
            {
                let mut session = handle.lock().await;
                session.state = SessionState::Paused;
                session.is_recording = false;
            }
            if let Some(task) = handle.take_frame_task().await {
                task.abort();
            }
            if let Some(recorder) = handle.take_audio().await {
                recorder.stop().await;
            }
            info!("Recording paused for {}", meeting_id);
            Ok(false)
        } else {
            {
                let mut session = handle.lock().await;
                session.state = SessionState::Recording;
                session.is_recording = true;
            }
            handle
                .store_frame_task(frames::spawn_frame_recorder(
                    Arc::clone(&handle),
                    self.config.frame_interval,
                ))
                .await;
            self.start_audio(&handle).await;
            info!("Recording resumed for {}", meeting_id);
            Ok(true)
        }
    }

    /// Finalize a session that lost its process: encode whatever frames
    /// are on disk, video-only, and clear the persisted record.
    pub async fn recover_orphan(
        &self,
        record: PersistedSession,
    ) -> Result<LeaveResult, CaptureError> {
        info!(
            "Recovering orphaned session {} for meeting {}",
            record.session_id, record.meeting_id
        );

        let frame_count = frames::count_frames(&record.frames_dir);
        if frame_count == 0 {
            return Err(CaptureError::Recovery(format!(
                "no frames on disk in {:?}",
                record.frames_dir
            )));
        }

        let video_path = self
            .config
            .recordings_root
            .join(format!("{}_video.mp4", record.session_id));

        self.encoder
            .encode(&record.frames_dir, None, &video_path)
            .await
            .map_err(|e| CaptureError::Recovery(e.to_string()))?;

        self.registry
            .clear_persisted(&record.meeting_id)
            .await
            .map_err(|e| CaptureError::Configuration(e.to_string()))?;

        // Playback runs at the capture framerate, so the recovered
        // duration is the frame count over 2 fps.
        Ok(LeaveResult {
            duration_seconds: frame_count / 2,
            transcript: RECOVERY_TRANSCRIPT.to_string(),
            transcript_segments: Vec::new(),
            video_path: Some(video_path),
            screenshots: Vec::new(),
            frame_count,
        })
    }

    /// Persisted sessions with no live counterpart, for startup sweeps.
    pub async fn orphans(&self) -> Result<Vec<PersistedSession>, CaptureError> {
        let records = self
            .registry
            .store()
            .load()
            .map_err(|e| CaptureError::Configuration(e.to_string()))?;

        let mut orphans = Vec::new();
        for (meeting_id, record) in records {
            if self.registry.get(&meeting_id).await.is_none() {
                orphans.push(record);
            }
        }
        orphans.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(orphans)
    }

    /// Stop every periodic task and release every browser. Persistence is
    /// left in place so a restart can recover the sessions.
    pub async fn shutdown(&self) {
        for handle in self.registry.drain().await {
            handle.set_state(SessionState::Errored).await;
            handle.abort_tasks().await;
            if let Some(recorder) = handle.take_audio().await {
                recorder.stop().await;
            }
            handle.driver().close().await;
        }
        info!("Capture engine shut down");
    }

    async fn start_recorders(&self, handle: &Arc<SessionHandle>, caption_probe: &'static str) {
        {
            let mut session = handle.lock().await;
            session.state = SessionState::Recording;
            session.is_recording = true;
        }

        handle
            .store_frame_task(frames::spawn_frame_recorder(
                Arc::clone(handle),
                self.config.frame_interval,
            ))
            .await;

        self.start_audio(handle).await;

        handle
            .store_caption_task(captions::spawn_caption_scraper(
                Arc::clone(handle),
                caption_probe,
                self.config.caption_interval,
            ))
            .await;
    }

    async fn start_audio(&self, handle: &Arc<SessionHandle>) {
        let audio_path = handle.lock().await.audio_path.clone();
        match AudioRecorder::start(
            &self.config.ffmpeg_path,
            self.config.audio_device.as_deref(),
            &audio_path,
        ) {
            Ok(recorder) => handle.store_audio(recorder).await,
            Err(e) => {
                // Missing audio devices never fail the session.
                warn!("Audio capture unavailable, continuing caption-only: {e:#}");
            }
        }
    }

    async fn teardown_failed_join(&self, meeting_id: &str, handle: &Arc<SessionHandle>) {
        handle.set_state(SessionState::Errored).await;
        handle.driver().close().await;
        self.registry.remove(meeting_id).await;
    }

    fn screenshot_path(&self, session_id: &str) -> PathBuf {
        self.config.recordings_root.join(format!(
            "{}_screenshot_{}.png",
            session_id,
            chrono::Utc::now().timestamp_millis()
        ))
    }

    fn debug_dir(&self) -> Option<PathBuf> {
        if !self.config.debug_screenshots {
            return None;
        }
        let dir = self.config.recordings_root.join("debug");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Cannot create debug dir {:?}: {}", dir, e);
            return None;
        }
        Some(dir)
    }
}

/// `scheme://host` of a meeting URL, for the permission grant.
fn origin_of(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let host_start = scheme_end + 3;
    match url[host_start..].find('/') {
        Some(path_start) => url[..host_start + path_start].to_string(),
        None => url.to_string(),
    }
}
