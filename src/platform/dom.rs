//! Shared DOM probes and join-step machinery.
//!
//! The conferencing UIs scraped here are third-party single-page apps whose
//! markup shifts under us. Every probe tolerates missing elements and
//! returns structured "unknown" instead of throwing; strategies are tried
//! in order and the first match wins. The redundancy is intentional.

use crate::browser::BrowserDriver;
use crate::platform::{JoinContext, JoinOutcome, Platform};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Selector applied after [`MARK_NAME_INPUT_JS`] tags the chosen field.
pub const NAME_INPUT_SELECTOR: &str = r#"input[data-scribe-target="name"]"#;

/// Selector applied after [`MARK_EMAIL_INPUT_JS`] tags the chosen field.
pub const EMAIL_INPUT_SELECTOR: &str = r#"input[data-scribe-target="email"]"#;

/// Classifies the page into waiting / in_meeting / prejoin, with a
/// passcode marker for terminal rejection.
pub const JOIN_STATE_PROBE_JS: &str = r#"(() => {
    const body = ((document.body && document.body.innerText) || '').toLowerCase();
    const waitingMarkers = [
        'asking to join', 'waiting for', 'someone will let you in',
        'waiting room', 'please wait', 'lobby',
    ];
    const waiting = waitingMarkers.some(m => body.includes(m));
    const passcode = body.includes('passcode')
        && !!document.querySelector('input[type="password"]');
    const leaveControl = !!document.querySelector(
        '[aria-label*="leave" i], [aria-label*="end call" i], [aria-label*="hang up" i]');
    const panel = !!document.querySelector(
        '[aria-label*="participant" i], [aria-label*="chat" i], [data-tid="app-bar"]');
    const nameInput = !!document.querySelector(
        'input[placeholder*="name" i], input[aria-label*="name" i]');
    let state = 'unknown';
    if (waiting) state = 'waiting';
    else if ((leaveControl || panel) && !nameInput) state = 'in_meeting';
    else if (nameInput) state = 'prejoin';
    return { state, passcode };
})()"#;

/// Locates the display-name field by aria/placeholder heuristics and tags
/// it for the keyboard typing path. Returns whether a field was found.
pub const MARK_NAME_INPUT_JS: &str = r#"(() => {
    const candidates = document.querySelectorAll(
        'input[type="text"], input:not([type]), input[type="search"]');
    let chosen = null;
    for (const el of candidates) {
        if (el.offsetParent === null) continue;
        const hint = ((el.getAttribute('aria-label') || '')
            + ' ' + (el.getAttribute('placeholder') || '')).toLowerCase();
        if (hint.includes('name')) { chosen = el; break; }
        if (!chosen) chosen = el;
    }
    if (!chosen) return false;
    chosen.setAttribute('data-scribe-target', 'name');
    return true;
})()"#;

/// Same heuristic for the guest email field some Webex rooms require.
pub const MARK_EMAIL_INPUT_JS: &str = r#"(() => {
    const el = document.querySelector(
        'input[type="email"], input[aria-label*="email" i], input[placeholder*="email" i]');
    if (!el || el.offsetParent === null) return false;
    el.setAttribute('data-scribe-target', 'email');
    return true;
})()"#;

/// Finds microphone/camera toggles by aria-label and clicks each iff it is
/// currently ON. Returns which kinds were toggled off.
pub const DISABLE_AV_JS: &str = r#"(() => {
    const toggled = { microphone: false, camera: false };
    const buttons = document.querySelectorAll(
        'button[aria-label], [role="button"][aria-label]');
    for (const el of buttons) {
        const label = (el.getAttribute('aria-label') || '').toLowerCase();
        const isMic = label.includes('microphone') || label.includes('mic ');
        const isCam = label.includes('camera') || label.includes('video');
        if (!isMic && !isCam) continue;
        const kind = isMic ? 'microphone' : 'camera';
        if (toggled[kind]) continue;
        const pressed = el.getAttribute('aria-pressed');
        const muted = el.getAttribute('data-is-muted');
        const on = label.includes('turn off')
            || (label.includes('mute') && !label.includes('unmute'))
            || muted === 'false'
            || pressed === 'true';
        if (on) {
            el.click();
            toggled[kind] = true;
        }
    }
    return toggled;
})()"#;

/// Bounding-box fallback for join buttons rendered as non-<button>
/// elements that swallow synthetic clicks. Returns the center point.
pub const JOIN_BUTTON_BBOX_JS: &str = r#"(() => {
    const needles = ['join now', 'ask to join', 'join meeting', 'continue without'];
    const candidates = document.querySelectorAll(
        'button, [role="button"], a, div[tabindex]');
    for (const el of candidates) {
        const text = (el.innerText || '').trim().toLowerCase();
        if (!text || text.length > 60) continue;
        if (needles.some(n => text.includes(n))) {
            const box = el.getBoundingClientRect();
            if (box.width === 0 || box.height === 0) continue;
            return { found: true, x: box.x + box.width / 2, y: box.y + box.height / 2 };
        }
    }
    return { found: false };
})()"#;

/// Visible texts that submit the prejoin form.
pub const JOIN_BUTTON_TEXTS: &[&str] =
    &["join now", "ask to join", "join meeting", "continue without"];

/// Page state reported by [`JOIN_STATE_PROBE_JS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    Waiting,
    InMeeting,
    Prejoin,
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ProbeReply {
    #[serde(default)]
    state: String,
    #[serde(default)]
    passcode: bool,
}

/// Shared walk through the prejoin flow. Each adapter composes these steps
/// in the platform's order and sprinkles its own quirks in between.
pub struct JoinSteps<'a> {
    driver: &'a dyn BrowserDriver,
    ctx: &'a JoinContext,
    platform: Platform,
    step: u32,
}

impl<'a> JoinSteps<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, ctx: &'a JoinContext, platform: Platform) -> Self {
        Self {
            driver,
            ctx,
            platform,
            step: 0,
        }
    }

    /// Open the (possibly rewritten) meeting URL.
    pub async fn navigate(&mut self, url: &str) -> Result<(), JoinOutcome> {
        info!("[{}] navigating to {}", self.platform, url);
        if let Err(e) = self.driver.open(url, self.ctx.navigation_timeout).await {
            return Err(JoinOutcome::Rejected {
                reason: format!("navigation failed: {e}"),
            });
        }
        self.shot("navigate").await;
        Ok(())
    }

    /// Best-effort dismissal of cookie banners and onboarding dialogs.
    pub async fn dismiss_dialogs(&mut self, extra: &[&str]) {
        let mut needles: Vec<&str> = vec!["got it", "accept cookies", "i agree", "accept all"];
        needles.extend_from_slice(extra);
        match self.driver.click_by_text(&needles).await {
            Ok(true) => debug!("[{}] dismissed a dialog", self.platform),
            Ok(false) => {}
            Err(e) => debug!("[{}] dialog dismissal failed: {}", self.platform, e),
        }
        self.shot("dismiss_dialogs").await;
    }

    /// Locate the display-name field and type the bot name through the
    /// keyboard path. Returns whether a field was found.
    pub async fn enter_name(&mut self) -> bool {
        let found = matches!(
            self.driver.evaluate(MARK_NAME_INPUT_JS).await,
            Ok(serde_json::Value::Bool(true))
        );
        if !found {
            debug!("[{}] no name input found", self.platform);
            return false;
        }

        if let Err(e) = self
            .driver
            .type_text(NAME_INPUT_SELECTOR, &self.ctx.bot_name)
            .await
        {
            warn!("[{}] typing bot name failed: {}", self.platform, e);
            return false;
        }
        self.shot("enter_name").await;
        true
    }

    /// Click the mic/camera toggles off where they are on.
    pub async fn disable_av(&mut self) {
        match self.driver.evaluate(DISABLE_AV_JS).await {
            Ok(value) => debug!("[{}] AV toggles: {}", self.platform, value),
            Err(e) => debug!("[{}] AV disable probe failed: {}", self.platform, e),
        }
        self.shot("disable_av").await;
    }

    /// Click the join/submit button, falling back to a raw coordinate
    /// click on the button's bounding box.
    pub async fn submit_join(&mut self) -> bool {
        match self.driver.click_by_text(JOIN_BUTTON_TEXTS).await {
            Ok(true) => {
                self.shot("submit_join").await;
                return true;
            }
            Ok(false) => {}
            Err(e) => debug!("[{}] join click failed: {}", self.platform, e),
        }

        // Some products render the join control as a styled div that only
        // responds to real mouse events.
        if let Ok(value) = self.driver.evaluate(JOIN_BUTTON_BBOX_JS).await {
            let found = value.get("found").and_then(|v| v.as_bool()).unwrap_or(false);
            if found {
                let x = value.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
                let y = value.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
                if let Err(e) = self.driver.click_at(x, y).await {
                    debug!("[{}] raw join click failed: {}", self.platform, e);
                    return false;
                }
                self.shot("submit_join_raw").await;
                return true;
            }
        }
        false
    }

    /// Evaluate the admission probe once.
    pub async fn probe(&self) -> (AdmissionState, bool) {
        let value = match self.driver.evaluate(JOIN_STATE_PROBE_JS).await {
            Ok(v) => v,
            Err(e) => {
                debug!("[{}] admission probe failed: {}", self.platform, e);
                return (AdmissionState::Unknown, false);
            }
        };

        let reply: ProbeReply = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(_) => return (AdmissionState::Unknown, false),
        };

        let state = match reply.state.as_str() {
            "waiting" => AdmissionState::Waiting,
            "in_meeting" => AdmissionState::InMeeting,
            "prejoin" => AdmissionState::Prejoin,
            _ => AdmissionState::Unknown,
        };
        (state, reply.passcode)
    }

    /// Poll the admission probe until admitted, rejected, or timed out.
    /// A persistent prejoin state re-issues the join click.
    pub async fn poll_admission(&mut self) -> JoinOutcome {
        let deadline = Instant::now() + self.ctx.admission_timeout;
        // First tick resolves immediately, so the first probe runs right
        // after submit; later ticks hold a fixed phase regardless of how
        // long each probe takes.
        let mut ticker = tokio::time::interval(self.ctx.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        loop {
            ticker.tick().await;
            let (state, passcode) = self.probe().await;

            if passcode {
                info!("[{}] passcode wall detected, giving up", self.platform);
                return JoinOutcome::Rejected {
                    reason: "passcode required".to_string(),
                };
            }

            match state {
                AdmissionState::InMeeting => {
                    info!("[{}] admitted after {} ticks", self.platform, tick);
                    self.shot("admitted").await;
                    return JoinOutcome::Succeeded;
                }
                AdmissionState::Waiting => {
                    if tick % 15 == 0 {
                        info!("[{}] waiting in lobby ({} ticks)", self.platform, tick);
                    }
                }
                AdmissionState::Prejoin => {
                    debug!("[{}] still on prejoin, re-submitting", self.platform);
                    self.submit_join().await;
                }
                AdmissionState::Unknown => {}
            }

            if Instant::now() >= deadline {
                warn!(
                    "[{}] admission timed out after {:?}",
                    self.platform, self.ctx.admission_timeout
                );
                return JoinOutcome::TimedOut;
            }

            tick += 1;
        }
    }

    /// Diagnostic capture for the current join step. Never read by the
    /// engine; failures are swallowed.
    async fn shot(&mut self, label: &str) {
        self.step += 1;
        let Some(dir) = &self.ctx.debug_dir else {
            return;
        };
        let path = dir.join(format!("{}_step{}_{}.png", self.platform, self.step, label));
        if let Err(e) = self.driver.screenshot(&path).await {
            debug!("debug capture {:?} failed: {}", path, e);
        }
    }
}
