//! Zoom web-client join and caption strategy.

use crate::browser::BrowserDriver;
use crate::platform::dom::JoinSteps;
use crate::platform::{JoinContext, JoinOutcome, Platform, PlatformAdapter};
use async_trait::async_trait;
use tracing::{debug, info};

const CAPTION_PROBE_JS: &str = r#"(() => {
    const out = [];
    const seen = new Set();
    const push = (speaker, text) => {
        text = (text || '').trim();
        if (text.length < 3) return;
        const lower = text.toLowerCase();
        if (lower.includes('mute') || lower.includes('camera')) return;
        if (seen.has(text)) return;
        seen.add(text);
        out.push({ speaker: (speaker || '').trim(), text });
    };
    // Strategy 1: the live-transcription list items ("Name: words").
    for (const item of document.querySelectorAll(
            '[class*="live-transcription" i] li, [class*="lt-item" i]')) {
        const raw = (item.innerText || '').trim();
        const colon = raw.indexOf(':');
        if (colon > 0 && colon < 40) {
            push(raw.slice(0, colon), raw.slice(colon + 1));
        } else {
            push('', raw);
        }
    }
    // Strategy 2: the single-line caption banner.
    if (out.length === 0) {
        for (const el of document.querySelectorAll('[class*="caption" i][aria-live], [aria-live="assertive"]')) {
            push('', el.innerText);
        }
    }
    return out;
})()"#;

/// Rewrite `/j/<N>` invite links to the browser web client, which needs no
/// installed app: `zoom.us/j/123?pwd=x` → `zoom.us/wc/123/join?pwd=x`.
pub fn rewrite_to_web_client(url: &str) -> String {
    let Some(idx) = url.find("/j/") else {
        return url.to_string();
    };
    let (base, rest) = url.split_at(idx);
    let rest = &rest[3..];
    let (meeting_number, query) = match rest.find('?') {
        Some(q) => (&rest[..q], &rest[q..]),
        None => (rest, ""),
    };
    let meeting_number = meeting_number.trim_end_matches('/');
    if meeting_number.is_empty() || !meeting_number.chars().all(|c| c.is_ascii_digit()) {
        return url.to_string();
    }
    format!("{base}/wc/{meeting_number}/join{query}")
}

pub struct ZoomAdapter;

#[async_trait]
impl PlatformAdapter for ZoomAdapter {
    fn platform(&self) -> Platform {
        Platform::Zoom
    }

    async fn join(&self, driver: &dyn BrowserDriver, ctx: &JoinContext) -> JoinOutcome {
        let url = rewrite_to_web_client(&ctx.meeting_url);
        let mut steps = JoinSteps::new(driver, ctx, self.platform());

        if let Err(outcome) = steps.navigate(&url).await {
            return outcome;
        }
        steps.dismiss_dialogs(&["join from your browser"]).await;

        steps.enter_name().await;
        steps.disable_av().await;
        steps.submit_join().await;

        let outcome = steps.poll_admission().await;
        if outcome != JoinOutcome::Succeeded {
            return outcome;
        }

        // The web client often interposes a "Join Audio" dialog after
        // admission; pick computer audio so the meeting mix is audible.
        match driver
            .click_by_text(&["computer audio", "join audio by computer"])
            .await
        {
            Ok(true) => info!("zoom: joined computer audio"),
            Ok(false) => debug!("zoom: no join-audio dialog present"),
            Err(e) => debug!("zoom: join-audio click failed: {}", e),
        }

        self.enable_captions(driver).await;
        JoinOutcome::Succeeded
    }

    async fn enable_captions(&self, driver: &dyn BrowserDriver) {
        let cc_clicked = matches!(
            driver
                .find_and_click(r#"[aria-label*="closed caption" i], [aria-label*="captions" i]"#)
                .await,
            Ok(true)
        );

        if cc_clicked {
            // The CC button may open a submenu instead of toggling.
            if let Ok(true) = driver
                .click_by_text(&["show subtitle", "show captions"])
                .await
            {
                info!("zoom: captions enabled via CC submenu");
            } else {
                info!("zoom: captions enabled via CC button");
            }
            return;
        }

        // Fallback: captions live under the overflow menu on small layouts.
        if let Ok(true) = driver.click_by_text(&["more"]).await {
            if let Ok(true) = driver
                .click_by_text(&["captions", "show subtitle"])
                .await
            {
                info!("zoom: captions enabled via More menu");
                return;
            }
        }
        debug!("zoom: caption controls not found");
    }

    fn caption_probe(&self) -> &'static str {
        CAPTION_PROBE_JS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_invite_link() {
        assert_eq!(
            rewrite_to_web_client("https://zoom.us/j/123456789"),
            "https://zoom.us/wc/123456789/join"
        );
    }

    #[test]
    fn test_rewrite_preserves_query() {
        assert_eq!(
            rewrite_to_web_client("https://us02web.zoom.us/j/123?pwd=abc"),
            "https://us02web.zoom.us/wc/123/join?pwd=abc"
        );
    }

    #[test]
    fn test_rewrite_leaves_web_client_urls_alone() {
        let url = "https://zoom.us/wc/123456789/join";
        assert_eq!(rewrite_to_web_client(url), url);
    }

    #[test]
    fn test_rewrite_leaves_non_numeric_paths_alone() {
        let url = "https://zoom.us/j/abc-def";
        assert_eq!(rewrite_to_web_client(url), url);
    }
}
