pub mod browser;
pub mod capture;
pub mod cli;
pub mod config;
pub mod engine;
pub mod global;
pub mod platform;
pub mod session;

pub use browser::{BrowserDriver, BrowserLauncher, DriverError};
pub use engine::{CaptureEngine, CaptureError, EngineConfig, JoinResult, LeaveResult};
pub use platform::{detect, JoinOutcome, Platform, PlatformAdapter};
pub use session::{CaptionSegment, SessionState};
