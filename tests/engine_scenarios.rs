//! End-to-end engine scenarios against a scripted fake browser driver and
//! a stub FFmpeg executable.
#![cfg(unix)]

use async_trait::async_trait;
use meetscribe::browser::{BrowserDriver, BrowserLauncher, DriverResult};
use meetscribe::engine::{CaptureEngine, CaptureError, EngineConfig, StatusReport};
use meetscribe::platform::dom;
use meetscribe::session::{
    PersistedSession, PersistenceStore, EMPTY_TRANSCRIPT_FALLBACK, RECOVERY_TRANSCRIPT,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeState {
    /// Admission probe replies, oldest first; the last one repeats forever.
    admission: VecDeque<String>,
    last_admission: Option<String>,
    /// Caption probe replies, one batch per tick; empty once drained.
    captions: VecDeque<Vec<(String, String)>>,
    opened_urls: Vec<String>,
    text_clicks: Vec<Vec<String>>,
    typed: Vec<(String, String)>,
    closed: bool,
}

#[derive(Default)]
struct FakeDriver {
    state: Mutex<FakeState>,
}

impl FakeDriver {
    fn script_admission(&self, states: &[&str]) {
        let mut inner = self.state.lock().unwrap();
        inner.admission = states.iter().map(|s| s.to_string()).collect();
    }

    fn script_captions(&self, batches: &[&[(&str, &str)]]) {
        let mut inner = self.state.lock().unwrap();
        inner.captions = batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|(s, t)| (s.to_string(), t.to_string()))
                    .collect()
            })
            .collect();
    }

    fn opened_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().opened_urls.clone()
    }

    fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    fn join_click_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .text_clicks
            .iter()
            .filter(|needles| needles.iter().any(|n| n == "join now"))
            .count()
    }

    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open(&self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.state.lock().unwrap().opened_urls.push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> DriverResult<Value> {
        let mut inner = self.state.lock().unwrap();

        if js == dom::JOIN_STATE_PROBE_JS {
            let state = inner
                .admission
                .pop_front()
                .or_else(|| inner.last_admission.clone())
                .unwrap_or_else(|| "unknown".to_string());
            inner.last_admission = Some(state.clone());
            return Ok(json!({ "state": state, "passcode": false }));
        }
        if js == dom::MARK_NAME_INPUT_JS {
            return Ok(json!(true));
        }
        if js == dom::MARK_EMAIL_INPUT_JS {
            return Ok(json!(false));
        }
        if js == dom::DISABLE_AV_JS {
            return Ok(json!({ "microphone": true, "camera": true }));
        }
        if js == dom::JOIN_BUTTON_BBOX_JS {
            return Ok(json!({ "found": false }));
        }
        // Any platform caption probe.
        if js.contains("out.push") {
            let batch = inner.captions.pop_front().unwrap_or_default();
            let candidates: Vec<Value> = batch
                .into_iter()
                .map(|(speaker, text)| json!({ "speaker": speaker, "text": text }))
                .collect();
            return Ok(json!(candidates));
        }
        Ok(Value::Null)
    }

    async fn find_and_click(&self, _selector: &str) -> DriverResult<bool> {
        Ok(true)
    }

    async fn click_by_text(&self, needles: &[&str]) -> DriverResult<bool> {
        self.state
            .lock()
            .unwrap()
            .text_clicks
            .push(needles.iter().map(|n| n.to_string()).collect());
        Ok(true)
    }

    async fn click_at(&self, _x: f64, _y: f64) -> DriverResult<()> {
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()> {
        self.state
            .lock()
            .unwrap()
            .typed
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn keyboard(&self, _shortcut: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        std::fs::write(path, b"\x89PNG fake frame").expect("fake screenshot write");
        Ok(())
    }

    async fn grant_permissions(&self, _origin: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

struct FakeLauncher(Arc<FakeDriver>);

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> DriverResult<Arc<dyn BrowserDriver>> {
        Ok(Arc::clone(&self.0) as Arc<dyn BrowserDriver>)
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    driver: Arc<FakeDriver>,
    engine: CaptureEngine,
}

fn write_ffmpeg_stub(dir: &Path) -> PathBuf {
    let stub = dir.join("ffmpeg-stub");
    std::fs::write(
        &stub,
        "#!/bin/sh\nfor arg in \"$@\"; do out=\"$arg\"; done\necho fake > \"$out\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
    stub
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("recordings");

    let mut config = EngineConfig::new(&root);
    config.ffmpeg_path = write_ffmpeg_stub(tmp.path());
    config.frame_interval = Duration::from_millis(60);
    config.caption_interval = Duration::from_millis(40);
    config.admission_poll_interval = Duration::from_millis(10);
    config.admission_timeout = Duration::from_millis(250);
    config.navigation_timeout = Duration::from_secs(1);
    config.encode_timeout = Duration::from_secs(10);

    let driver = Arc::new(FakeDriver::default());
    let engine = CaptureEngine::new(config, Arc::new(FakeLauncher(Arc::clone(&driver)))).unwrap();

    Fixture {
        _tmp: tmp,
        root,
        driver,
        engine,
    }
}

fn persistence_contents(root: &Path) -> String {
    std::fs::read_to_string(root.join("active_sessions.json")).unwrap_or_default()
}

async fn frame_count(engine: &CaptureEngine, meeting_id: &str) -> u64 {
    match engine.status(meeting_id).await {
        StatusReport::Active { frame_count, .. } => frame_count,
        StatusReport::NotActive => panic!("expected an active session for {meeting_id}"),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn s1_happy_path_google_meet() {
    let fx = fixture();
    fx.driver
        .script_admission(&["waiting", "waiting", "waiting", "in_meeting"]);

    let joined = fx
        .engine
        .join("M1", "https://meet.google.com/abc-defg-hij")
        .await
        .unwrap();
    assert_eq!(joined.platform, meetscribe::Platform::GoogleMeet);
    assert!(joined.recording_started);

    // The bot name went through the keyboard typing path.
    let typed = fx.driver.typed();
    assert!(typed
        .iter()
        .any(|(selector, text)| selector == dom::NAME_INPUT_SELECTOR
            && text == "Meetscribe Notetaker"));

    // Let the frame recorder run a few ticks.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(frame_count(&fx.engine, "M1").await >= 3);

    let result = fx.engine.leave("M1").await.unwrap();

    assert!(result.frame_count >= 3);
    let video = result.video_path.expect("video should be encoded");
    assert!(video.to_string_lossy().ends_with("_video.mp4"));
    assert!(video.exists());
    assert_eq!(result.transcript, EMPTY_TRANSCRIPT_FALLBACK);

    // Frame density: every index up to frame_count exists on disk.
    let frames_dir = std::fs::read_dir(&fx.root)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .find(|p| p.is_dir() && p.to_string_lossy().ends_with("_frames"))
        .expect("frames dir");
    for i in 1..=result.frame_count {
        assert!(
            frames_dir.join(format!("frame_{i:06}.png")).exists(),
            "missing frame {i}"
        );
    }

    // Registry and persistence are clean.
    assert!(matches!(
        fx.engine.status("M1").await,
        StatusReport::NotActive
    ));
    assert!(!persistence_contents(&fx.root).contains("\"M1\""));
    assert!(fx.driver.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn s2_lobby_timeout_zoom() {
    let fx = fixture();
    fx.driver.script_admission(&["waiting"]);

    let err = fx
        .engine
        .join("M2", "https://zoom.us/j/123456789")
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::JoinTimedOut));

    // The invite link was rewritten to the web client.
    assert_eq!(
        fx.driver.opened_urls(),
        vec!["https://zoom.us/wc/123456789/join".to_string()]
    );

    assert!(matches!(
        fx.engine.status("M2").await,
        StatusReport::NotActive
    ));
    assert!(!persistence_contents(&fx.root).contains("\"M2\""));
    assert!(fx.driver.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn s3_duplicate_join_rejected() {
    let fx = fixture();
    fx.driver.script_admission(&["in_meeting"]);

    fx.engine
        .join("M3", "https://meet.google.com/abc-defg-hij")
        .await
        .unwrap();

    let err = fx
        .engine
        .join("M3", "https://meet.google.com/abc-defg-hij")
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::AlreadyActive { .. }));

    // The original session is unaffected.
    match fx.engine.status("M3").await {
        StatusReport::Active { is_recording, .. } => assert!(is_recording),
        StatusReport::NotActive => panic!("original session must stay live"),
    }

    fx.engine.leave("M3").await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn s4_pause_and_resume() {
    let fx = fixture();
    fx.driver.script_admission(&["in_meeting"]);

    fx.engine
        .join("M4", "https://meet.google.com/abc-defg-hij")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let before_pause = frame_count(&fx.engine, "M4").await;
    assert!(before_pause >= 2);

    assert!(!fx.engine.toggle_recording("M4").await.unwrap());
    let paused_at = frame_count(&fx.engine, "M4").await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(frame_count(&fx.engine, "M4").await, paused_at);

    assert!(fx.engine.toggle_recording("M4").await.unwrap());
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(frame_count(&fx.engine, "M4").await > paused_at);

    let result = fx.engine.leave("M4").await.unwrap();
    assert!(result.video_path.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn s5_caption_dedup() {
    let fx = fixture();
    fx.driver.script_admission(&["in_meeting"]);
    fx.driver.script_captions(&[
        &[("A", "hello")],
        &[("A", "hello")],
        &[("A", "world")],
        &[("A", "hello")],
    ]);

    fx.engine
        .join("M5", "https://meet.google.com/abc-defg-hij")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let result = fx.engine.leave("M5").await.unwrap();

    let texts: Vec<&str> = result
        .transcript_segments
        .iter()
        .map(|s| s.text.as_str())
        .collect();
    assert_eq!(texts, vec!["hello", "world", "hello"]);

    // Timestamps are nondecreasing.
    for pair in result.transcript_segments.windows(2) {
        assert!(pair[1].timestamp_ms >= pair[0].timestamp_ms);
    }
    for segment in &result.transcript_segments {
        assert_eq!(segment.speaker, "A");
        assert!((segment.confidence - 0.95).abs() < f64::EPSILON);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn s6_crash_recovery_via_leave() {
    let fx = fixture();

    // Seed an orphan: a persisted record plus 20 frames on disk.
    let frames_dir = fx.root.join("S6_frames");
    std::fs::create_dir_all(&frames_dir).unwrap();
    for i in 1..=20 {
        std::fs::write(frames_dir.join(format!("frame_{i:06}.png")), b"png").unwrap();
    }
    PersistenceStore::new(&fx.root)
        .insert(PersistedSession {
            meeting_id: "M6".to_string(),
            session_id: "S6".to_string(),
            platform: meetscribe::Platform::Teams,
            frames_dir: frames_dir.clone(),
            started_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            frame_count: 0,
        })
        .unwrap();

    let result = fx.engine.leave("M6").await.unwrap();

    assert_eq!(result.duration_seconds, 10);
    assert_eq!(result.frame_count, 20);
    assert_eq!(result.transcript, RECOVERY_TRANSCRIPT);
    let video = result.video_path.expect("recovered video");
    assert!(video.to_string_lossy().ends_with("S6_video.mp4"));
    assert!(video.exists());
    assert!(!persistence_contents(&fx.root).contains("\"M6\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn recovery_refuses_empty_frames_dir() {
    let fx = fixture();

    let frames_dir = fx.root.join("S7_frames");
    std::fs::create_dir_all(&frames_dir).unwrap();
    PersistenceStore::new(&fx.root)
        .insert(PersistedSession {
            meeting_id: "M7".to_string(),
            session_id: "S7".to_string(),
            platform: meetscribe::Platform::Zoom,
            frames_dir,
            started_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            frame_count: 0,
        })
        .unwrap();

    let err = fx.engine.leave("M7").await.unwrap_err();
    assert!(matches!(err, CaptureError::Recovery(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn prejoin_retry_enters_meeting_exactly_once() {
    let fx = fixture();
    fx.driver
        .script_admission(&["prejoin", "prejoin", "in_meeting"]);

    fx.engine
        .join("M8", "https://meet.google.com/abc-defg-hij")
        .await
        .unwrap();

    // The join click was re-issued for each prejoin tick plus the initial
    // submit, and the session still entered the meeting exactly once.
    assert!(fx.driver.join_click_count() >= 3);
    assert!(matches!(
        fx.engine.status("M8").await,
        StatusReport::Active { .. }
    ));

    fx.engine.leave("M8").await.unwrap();
    assert!(matches!(
        fx.engine.status("M8").await,
        StatusReport::NotActive
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn operations_on_unknown_meeting_are_typed_errors() {
    let fx = fixture();

    assert!(matches!(
        fx.engine.leave("ghost").await.unwrap_err(),
        CaptureError::NotActive { .. }
    ));
    assert!(matches!(
        fx.engine.screenshot("ghost").await.unwrap_err(),
        CaptureError::NotActive { .. }
    ));
    assert!(matches!(
        fx.engine.toggle_recording("ghost").await.unwrap_err(),
        CaptureError::NotActive { .. }
    ));
    assert!(matches!(
        fx.engine.status("ghost").await,
        StatusReport::NotActive
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn screenshot_is_captured_and_tracked() {
    let fx = fixture();
    fx.driver.script_admission(&["in_meeting"]);

    fx.engine
        .join("M9", "https://meet.google.com/abc-defg-hij")
        .await
        .unwrap();

    let shot = fx.engine.screenshot("M9").await.unwrap();
    assert!(shot.exists());
    assert!(shot.to_string_lossy().contains("_screenshot_"));

    let result = fx.engine.leave("M9").await.unwrap();
    // The ad-hoc shot plus the final one taken during leave.
    assert!(result.screenshots.len() >= 2);
    assert!(result.screenshots.contains(&shot));
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_url_is_rejected_before_launching() {
    let fx = fixture();

    let err = fx
        .engine
        .join("M10", "https://example.com/video-call")
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::JoinRejected { .. }));
    assert!(fx.driver.opened_urls().is_empty());
}
