//! Periodic caption scraping from the live page.

use crate::session::SessionHandle;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A `{speaker, text}` candidate returned by a platform's caption probe.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptionCandidate {
    #[serde(default)]
    pub speaker: String,
    pub text: String,
}

/// Spawn the caption poller. Each tick runs the platform's in-page probe
/// (which filters UI noise and intra-batch duplicates itself) and appends
/// candidates that differ from the last stored segment. The projection is
/// append-only with no global dedup: an earlier utterance repeated later
/// in the meeting is legitimate speech.
pub fn spawn_caption_scraper(
    handle: Arc<SessionHandle>,
    probe_js: &'static str,
    interval: Duration,
) -> JoinHandle<()> {
    let driver = handle.driver();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;

            let active = handle.lock().await.state.captions_active();
            if !active {
                break;
            }

            let value = match driver.evaluate(probe_js).await {
                Ok(v) => v,
                Err(e) => {
                    // Stale DOM mid-navigation; next tick retries.
                    debug!("Caption probe failed: {}", e);
                    continue;
                }
            };

            let candidates: Vec<CaptionCandidate> =
                serde_json::from_value(value).unwrap_or_default();
            if candidates.is_empty() {
                continue;
            }

            let mut session = handle.lock().await;
            let mut appended = 0usize;
            for candidate in candidates {
                let speaker = if candidate.speaker.trim().is_empty() {
                    None
                } else {
                    Some(candidate.speaker)
                };
                if session.append_caption(speaker, candidate.text) {
                    appended += 1;
                }
            }
            if appended > 0 {
                trace!(
                    "Appended {} caption segment(s), transcript at {}",
                    appended,
                    session.transcript.len()
                );
            }
        }
        debug!("Caption scraper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_parsing_tolerates_missing_speaker() {
        let parsed: Vec<CaptionCandidate> =
            serde_json::from_str(r#"[{"text":"hello there"},{"speaker":"A","text":"hi"}]"#)
                .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].speaker, "");
        assert_eq!(parsed[1].speaker, "A");
    }

    #[test]
    fn test_non_array_probe_result_is_empty() {
        let candidates: Vec<CaptionCandidate> =
            serde_json::from_value(serde_json::Value::Null).unwrap_or_default();
        assert!(candidates.is_empty());
    }
}
