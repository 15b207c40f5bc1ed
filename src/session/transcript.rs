//! Caption segments and transcript rendering.

use serde::{Deserialize, Serialize};

/// Fallback emitted when a meeting produced no captions at all.
pub const EMPTY_TRANSCRIPT_FALLBACK: &str = "No captions were captured during this meeting.";

/// Fixed transcript for sessions reconstituted from disk after a crash.
pub const RECOVERY_TRANSCRIPT: &str =
    "Session recovered after server restart. No live transcript available.";

/// One atomic utterance captured from the meeting UI's rendered captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub speaker: String,
    pub text: String,
    /// Milliseconds since session start. Nondecreasing across the log.
    pub timestamp_ms: u64,
    /// Scrape confidence in [0, 1]. DOM captions carry no per-word score,
    /// so this is a fixed prior.
    pub confidence: f64,
}

/// `HH:MM:SS`, zero-padded, hours uncapped (a 25-hour meeting renders as
/// `25:xx:xx`).
pub fn format_timestamp_ms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// Render the transcript text: segments ascending by timestamp, one
/// `[HH:MM:SS] <speaker>: <text>` line each.
pub fn render_transcript(segments: &[CaptionSegment]) -> String {
    if segments.is_empty() {
        return EMPTY_TRANSCRIPT_FALLBACK.to_string();
    }

    let mut ordered: Vec<&CaptionSegment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.timestamp_ms);

    ordered
        .iter()
        .map(|s| {
            format!(
                "[{}] {}: {}",
                format_timestamp_ms(s.timestamp_ms),
                s.speaker,
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(speaker: &str, text: &str, timestamp_ms: u64) -> CaptionSegment {
        CaptionSegment {
            speaker: speaker.to_string(),
            text: text.to_string(),
            timestamp_ms,
            confidence: 0.95,
        }
    }

    #[test]
    fn test_format_timestamp_boundaries() {
        assert_eq!(format_timestamp_ms(0), "00:00:00");
        assert_eq!(format_timestamp_ms(3_599_000), "00:59:59");
        assert_eq!(format_timestamp_ms(3_600_000), "01:00:00");
        assert_eq!(format_timestamp_ms(90_061_000), "25:01:01");
    }

    #[test]
    fn test_format_timestamp_truncates_sub_second() {
        assert_eq!(format_timestamp_ms(999), "00:00:00");
        assert_eq!(format_timestamp_ms(1_001), "00:00:01");
    }

    #[test]
    fn test_render_empty_uses_fallback() {
        assert_eq!(render_transcript(&[]), EMPTY_TRANSCRIPT_FALLBACK);
    }

    #[test]
    fn test_render_sorts_by_timestamp() {
        let segments = vec![
            segment("B", "second", 5_000),
            segment("A", "first", 1_000),
        ];
        let text = render_transcript(&segments);
        assert_eq!(text, "[00:00:01] A: first\n[00:00:05] B: second");
    }
}
