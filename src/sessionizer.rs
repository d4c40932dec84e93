//! Session reconstruction
//!
//! Groups a raw event batch into sessions with an inactivity-gap rule. A new
//! session segment starts whenever the time between consecutive events of the
//! same (user, tab) stream exceeds the configured gap. The result is fully
//! determined by event contents: ties in timestamp are broken by arrival order
//! (stable sort), so re-runs over shuffled input reproduce identical keys.

use crate::config::DetectorConfig;
use crate::types::{RawEvent, SessionEvent};

/// Sessionized batch plus discard accounting
#[derive(Debug, Clone)]
pub struct SessionizeOutcome {
    /// Events annotated with their session key, ordered by (uid, sid, ts)
    pub events: Vec<SessionEvent>,
    /// Events dropped for missing or non-finite timestamps
    pub discarded: usize,
}

/// Annotate every event with its `{uid}@{sid}:{segment}` session key.
///
/// Events with unparseable timestamps are dropped and tallied, never fatal.
/// An empty batch yields an empty outcome.
pub fn sessionize(events: Vec<RawEvent>, config: &DetectorConfig) -> SessionizeOutcome {
    let total = events.len();
    let mut valid: Vec<RawEvent> = events
        .into_iter()
        .filter(|e| e.timestamp().is_some())
        .collect();
    let discarded = total - valid.len();

    // Stable sort keeps arrival order for identical timestamps.
    valid.sort_by(|a, b| {
        (a.uid.as_str(), a.sid.as_str())
            .cmp(&(b.uid.as_str(), b.sid.as_str()))
            .then_with(|| {
                a.timestamp()
                    .unwrap_or(f64::NAN)
                    .total_cmp(&b.timestamp().unwrap_or(f64::NAN))
            })
    });

    let mut out = Vec::with_capacity(valid.len());
    let mut segment = 0u32;
    let mut prev_stream: Option<(String, String)> = None;
    let mut prev_ts = 0.0f64;

    for event in valid {
        let ts = event.timestamp().unwrap_or(0.0);
        let stream = (event.uid.clone(), event.sid.clone());

        match &prev_stream {
            Some(prev) if *prev == stream => {
                if ts - prev_ts > config.session_gap_sec {
                    segment += 1;
                }
            }
            _ => {
                // First event of a (uid, sid) stream always starts segment 0.
                segment = 0;
            }
        }

        let sess_key = format!("{}@{}:{}", event.uid, event.sid, segment);
        prev_stream = Some(stream);
        prev_ts = ts;
        out.push(SessionEvent { sess_key, event });
    }

    SessionizeOutcome {
        events: out,
        discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use pretty_assertions::assert_eq;

    fn event(uid: &str, sid: &str, ts: f64) -> RawEvent {
        RawEvent {
            sid: sid.to_string(),
            uid: uid.to_string(),
            ts: Some(ts),
            ev: EventType::Click,
            x: None,
            y: None,
            el: None,
            view: None,
        }
    }

    fn keys(outcome: &SessionizeOutcome) -> Vec<String> {
        outcome.events.iter().map(|e| e.sess_key.clone()).collect()
    }

    #[test]
    fn test_single_stream_no_gap() {
        let events = vec![event("u1", "s1", 0.0), event("u1", "s1", 10.0)];
        let outcome = sessionize(events, &DetectorConfig::default());
        assert_eq!(keys(&outcome), vec!["u1@s1:0", "u1@s1:0"]);
        assert_eq!(outcome.discarded, 0);
    }

    #[test]
    fn test_gap_starts_new_segment() {
        let events = vec![
            event("u1", "s1", 0.0),
            event("u1", "s1", 100.0),
            event("u1", "s1", 100.0 + 1801.0),
            event("u1", "s1", 100.0 + 1801.0 + 5.0),
        ];
        let outcome = sessionize(events, &DetectorConfig::default());
        assert_eq!(
            keys(&outcome),
            vec!["u1@s1:0", "u1@s1:0", "u1@s1:1", "u1@s1:1"]
        );
    }

    #[test]
    fn test_gap_exactly_at_threshold_does_not_split() {
        let events = vec![event("u1", "s1", 0.0), event("u1", "s1", 1800.0)];
        let outcome = sessionize(events, &DetectorConfig::default());
        assert_eq!(keys(&outcome), vec!["u1@s1:0", "u1@s1:0"]);
    }

    #[test]
    fn test_interleaved_streams_separated() {
        let events = vec![
            event("u1", "s1", 0.0),
            event("u2", "s9", 1.0),
            event("u1", "s1", 2.0),
            event("u2", "s9", 3.0),
        ];
        let outcome = sessionize(events, &DetectorConfig::default());
        let mut got = keys(&outcome);
        got.sort();
        assert_eq!(got, vec!["u1@s1:0", "u1@s1:0", "u2@s9:0", "u2@s9:0"]);
    }

    #[test]
    fn test_idempotent_under_shuffle() {
        let events = vec![
            event("u1", "s1", 5.0),
            event("u1", "s1", 0.0),
            event("u1", "s1", 2000.0),
            event("u2", "s2", 1.0),
        ];
        let mut shuffled = events.clone();
        shuffled.reverse();

        let a = sessionize(events, &DetectorConfig::default());
        let b = sessionize(shuffled, &DetectorConfig::default());

        let pairs = |o: &SessionizeOutcome| {
            o.events
                .iter()
                .map(|e| (e.sess_key.clone(), e.event.timestamp().unwrap()))
                .collect::<Vec<_>>()
        };
        assert_eq!(pairs(&a), pairs(&b));
    }

    #[test]
    fn test_rerun_on_own_output_reproduces_keys() {
        let events = vec![
            event("u1", "s1", 0.0),
            event("u1", "s1", 100.0),
            event("u1", "s1", 3000.0),
            event("u2", "s2", 50.0),
        ];
        let first = sessionize(events, &DetectorConfig::default());

        // Strip the derived keys and run again.
        let stripped: Vec<RawEvent> = first.events.iter().map(|e| e.event.clone()).collect();
        let second = sessionize(stripped, &DetectorConfig::default());

        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn test_bad_timestamps_discarded() {
        let mut bad = event("u1", "s1", 0.0);
        bad.ts = None;
        let mut nan = event("u1", "s1", 0.0);
        nan.ts = Some(f64::NAN);

        let events = vec![event("u1", "s1", 1.0), bad, nan];
        let outcome = sessionize(events, &DetectorConfig::default());
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.discarded, 2);
    }

    #[test]
    fn test_empty_batch() {
        let outcome = sessionize(Vec::new(), &DetectorConfig::default());
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.discarded, 0);
    }

    #[test]
    fn test_single_event_group() {
        let outcome = sessionize(vec![event("u1", "s1", 42.0)], &DetectorConfig::default());
        assert_eq!(keys(&outcome), vec!["u1@s1:0"]);
    }
}
