//! Per-platform join and caption strategies.
//!
//! Each supported conferencing product gets one [`PlatformAdapter`]: a pure
//! sequence of browser-driver operations that walks the product's prejoin
//! flow, waits for admission, and switches on live captions. Adapters never
//! touch the filesystem or subprocesses and never propagate errors across
//! the engine boundary; they report structured [`JoinOutcome`]s.

pub mod dom;
pub mod google_meet;
pub mod teams;
pub mod webex;
pub mod zoom;

use crate::browser::BrowserDriver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use google_meet::GoogleMeetAdapter;
pub use teams::TeamsAdapter;
pub use webex::WebexAdapter;
pub use zoom::ZoomAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Zoom,
    GoogleMeet,
    Teams,
    Webex,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zoom => "zoom",
            Self::GoogleMeet => "google_meet",
            Self::Teams => "teams",
            Self::Webex => "webex",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a meeting URL. Pure substring rules, no I/O.
pub fn detect(url: &str) -> Platform {
    let url = url.to_lowercase();
    if url.contains("zoom.us") || url.contains("zoom.com") {
        Platform::Zoom
    } else if url.contains("meet.google.com") {
        Platform::GoogleMeet
    } else if url.contains("teams.microsoft.com") || url.contains("teams.live.com") {
        Platform::Teams
    } else if url.contains("webex.com") {
        Platform::Webex
    } else {
        Platform::Unknown
    }
}

/// Structured result of a join attempt. Adapters never throw past this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Admitted to the meeting, captions enabled where possible.
    Succeeded,
    /// Admission poll exhausted while still waiting or in prejoin.
    TimedOut,
    /// The page reached a terminal non-admission state (passcode wall,
    /// navigation failure, meeting ended).
    Rejected { reason: String },
}

/// Everything an adapter needs to drive one join attempt.
#[derive(Debug, Clone)]
pub struct JoinContext {
    pub meeting_url: String,
    pub bot_name: String,
    pub navigation_timeout: Duration,
    pub admission_timeout: Duration,
    pub poll_interval: Duration,
    /// When set, each join step drops a diagnostic screenshot here.
    pub debug_dir: Option<PathBuf>,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Walk the prejoin flow and wait for admission.
    async fn join(&self, driver: &dyn BrowserDriver, ctx: &JoinContext) -> JoinOutcome;

    /// Switch on live captions in the joined meeting. Best effort.
    async fn enable_captions(&self, driver: &dyn BrowserDriver);

    /// In-page script returning `[{speaker, text}]` caption candidates.
    fn caption_probe(&self) -> &'static str;
}

/// Resolve the adapter for a detected platform.
pub fn adapter_for(platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
    match platform {
        Platform::Zoom => Some(Arc::new(ZoomAdapter)),
        Platform::GoogleMeet => Some(Arc::new(GoogleMeetAdapter)),
        Platform::Teams => Some(Arc::new(TeamsAdapter)),
        Platform::Webex => Some(Arc::new(WebexAdapter)),
        Platform::Unknown => None,
    }
}
