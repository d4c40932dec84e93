//! Windowed feature extraction
//!
//! Slices each session into fixed-length half-open windows anchored at the
//! session's first event and computes the behavioral signals for every window.
//! Coverage is total: windows with no events are emitted with all-zero signals
//! so the downstream sequence model sees a fixed cadence.
//!
//! Each detector reads only the events inside the window plus a bounded
//! look-back (the hover-stall detector inspects the second before each click);
//! nothing looks ahead past the window's own events.

use std::collections::BTreeMap;

use crate::config::{DetectorConfig, MIN_ELAPSED_SEC, MOVE_SAMPLE_QUANTUM_SEC};
use crate::types::{EventType, SessionEvent, WindowRecord, WindowSignals};

/// A click with its coordinates and target element tag
#[derive(Debug, Clone)]
struct ClickSample {
    t: f64,
    x: f64,
    y: f64,
    el: Option<String>,
}

/// Extract one `WindowRecord` per (session, window index), covering every
/// window from the session's first event to its last.
///
/// Output is ordered by (session key, window index). An empty input yields an
/// empty output.
pub fn extract_windows(events: &[SessionEvent], config: &DetectorConfig) -> Vec<WindowRecord> {
    let mut by_session: BTreeMap<&str, Vec<&SessionEvent>> = BTreeMap::new();
    for event in events {
        by_session.entry(&event.sess_key).or_default().push(event);
    }

    let mut out = Vec::new();
    for (sess_key, mut group) in by_session {
        group.sort_by(|a, b| {
            a.event
                .timestamp()
                .unwrap_or(f64::NAN)
                .total_cmp(&b.event.timestamp().unwrap_or(f64::NAN))
        });
        out.extend(session_windows(sess_key, &group, config));
    }
    out
}

/// Compute all windows for one session's time-ordered events
fn session_windows(
    sess_key: &str,
    events: &[&SessionEvent],
    config: &DetectorConfig,
) -> Vec<WindowRecord> {
    let timestamps: Vec<f64> = events
        .iter()
        .filter_map(|e| e.event.timestamp())
        .collect();
    let (Some(&start), Some(&end)) = (timestamps.first(), timestamps.last()) else {
        return Vec::new();
    };
    let uid = events[0].event.uid.clone();

    let moves: Vec<(f64, f64, f64)> = events
        .iter()
        .filter(|e| e.event.ev == EventType::Move)
        .filter_map(|e| {
            let t = e.event.timestamp()?;
            Some((t, e.event.x?, e.event.y?))
        })
        .collect();

    let clicks: Vec<ClickSample> = events
        .iter()
        .filter(|e| e.event.ev == EventType::Click)
        .filter_map(|e| {
            Some(ClickSample {
                t: e.event.timestamp()?,
                x: e.event.x.unwrap_or(0.0),
                y: e.event.y.unwrap_or(0.0),
                el: e.event.el.clone(),
            })
        })
        .collect();

    let scrolls: Vec<(f64, f64)> = events
        .iter()
        .filter(|e| e.event.ev == EventType::Scroll)
        .filter_map(|e| Some((e.event.timestamp()?, e.event.scroll_y()?)))
        .collect();

    let speeds = speed_samples(&moves);

    let window_count = ((end - start) / config.window_sec).floor() as u32 + 1;
    let mut records = Vec::with_capacity(window_count as usize);
    for index in 0..window_count {
        let w_start = start + index as f64 * config.window_sec;
        let w_end = w_start + config.window_sec;

        let in_window = |t: f64| t >= w_start && t < w_end;

        let window_speeds: Vec<f64> = speeds
            .iter()
            .filter(|(t, _)| in_window(*t))
            .map(|(_, s)| *s)
            .collect();
        let (speed_mean, speed_max, speed_std) = speed_stats(&window_speeds);

        let window_clicks: Vec<&ClickSample> =
            clicks.iter().filter(|c| in_window(c.t)).collect();
        let rage_clicks = count_rage_bursts(&window_clicks, config);
        let dead_clicks = count_dead_clicks(&window_clicks, config);
        let hover_stall = count_hover_stalls(&window_clicks, &speeds, config);

        let window_scrolls: Vec<(f64, f64)> = scrolls
            .iter()
            .copied()
            .filter(|(t, _)| in_window(*t))
            .collect();
        let scroll_oscillations = count_direction_changes(&window_scrolls);
        let scroll_velocity = net_scroll_velocity(&window_scrolls);
        let scroll_depth = window_scrolls
            .iter()
            .map(|(_, y)| *y)
            .fold(0.0f64, f64::max);

        records.push(WindowRecord {
            sess_key: sess_key.to_string(),
            uid: uid.clone(),
            window_index: index,
            w_start,
            w_end,
            signals: WindowSignals {
                speed_mean,
                speed_max,
                speed_std,
                rage_clicks,
                dead_clicks,
                hover_stall,
                scroll_velocity,
                scroll_oscillations,
                scroll_depth,
                clicks: window_clicks.len() as u32,
                moves: window_speeds.len() as u32,
            },
        });
    }
    records
}

/// Instantaneous cursor speeds from consecutive move pairs, timestamped at the
/// later move
fn speed_samples(moves: &[(f64, f64, f64)]) -> Vec<(f64, f64)> {
    moves
        .windows(2)
        .map(|pair| {
            let (t0, x0, y0) = pair[0];
            let (t1, x1, y1) = pair[1];
            let dt = (t1 - t0).max(MIN_ELAPSED_SEC);
            let dist = (x1 - x0).hypot(y1 - y0);
            (t1, dist / dt)
        })
        .collect()
}

/// Mean, max, and population standard deviation of a speed sample set
fn speed_stats(speeds: &[f64]) -> (f64, f64, f64) {
    if speeds.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = speeds.len() as f64;
    let mean = speeds.iter().sum::<f64>() / n;
    let max = speeds.iter().copied().fold(f64::MIN, f64::max);
    let variance = speeds.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, max, variance.sqrt())
}

/// Sliding triplet scan over time-ordered clicks: a burst is three consecutive
/// clicks within the burst duration whose maximum pairwise distance fits the
/// radius. Only consecutive triplets are checked; this is deliberately not a
/// clustering pass.
fn count_rage_bursts(clicks: &[&ClickSample], config: &DetectorConfig) -> u32 {
    if clicks.len() < 3 {
        return 0;
    }
    let mut sorted: Vec<&ClickSample> = clicks.to_vec();
    sorted.sort_by(|a, b| a.t.total_cmp(&b.t));

    let mut bursts = 0;
    for triplet in sorted.windows(3) {
        let span = triplet[2].t - triplet[0].t;
        if span > config.rage_burst_sec {
            continue;
        }
        let max_dist = [(0, 1), (0, 2), (1, 2)]
            .iter()
            .map(|&(i, j)| (triplet[i].x - triplet[j].x).hypot(triplet[i].y - triplet[j].y))
            .fold(0.0f64, f64::max);
        if max_dist <= config.rage_radius_px {
            bursts += 1;
        }
    }
    bursts
}

/// Clicks whose element tag does not start with an actionable prefix; a
/// missing tag counts as dead
fn count_dead_clicks(clicks: &[&ClickSample], config: &DetectorConfig) -> u32 {
    clicks
        .iter()
        .filter(|c| {
            let tag = c.el.as_deref().unwrap_or("").to_ascii_lowercase();
            !config
                .actionable_prefixes
                .iter()
                .any(|prefix| tag.starts_with(prefix.as_str()))
        })
        .count() as u32
}

/// Clicks preceded by a sustained low-speed hover in the second before the
/// click. Duration is approximated as sample count times the assumed 20 Hz
/// sampling quantum rather than measured from timestamp deltas.
fn count_hover_stalls(
    clicks: &[&ClickSample],
    speeds: &[(f64, f64)],
    config: &DetectorConfig,
) -> u32 {
    clicks
        .iter()
        .filter(|click| {
            let slow_samples = speeds
                .iter()
                .filter(|(t, s)| {
                    *t >= click.t - 1.0 && *t < click.t && *s < config.low_speed_px_per_sec
                })
                .count();
            slow_samples as f64 * MOVE_SAMPLE_QUANTUM_SEC >= config.stall_sec
        })
        .count() as u32
}

/// Sign reversals between consecutive non-zero scroll deltas
fn count_direction_changes(scrolls: &[(f64, f64)]) -> u32 {
    let mut flips = 0;
    let mut last_sign = 0i8;
    for pair in scrolls.windows(2) {
        let dy = pair[1].1 - pair[0].1;
        let sign = if dy > 0.0 {
            1
        } else if dy < 0.0 {
            -1
        } else {
            continue;
        };
        if last_sign != 0 && sign != last_sign {
            flips += 1;
        }
        last_sign = sign;
    }
    flips
}

/// Net scroll velocity over the window, zero when fewer than two samples
fn net_scroll_velocity(scrolls: &[(f64, f64)]) -> f64 {
    if scrolls.len() < 2 {
        return 0.0;
    }
    let (t0, y0) = scrolls[0];
    let (t1, y1) = scrolls[scrolls.len() - 1];
    (y1 - y0) / (t1 - t0).max(MIN_ELAPSED_SEC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawEvent, ViewState};
    use pretty_assertions::assert_eq;

    fn raw(ev: EventType, ts: f64) -> RawEvent {
        RawEvent {
            sid: "s1".to_string(),
            uid: "u1".to_string(),
            ts: Some(ts),
            ev,
            x: None,
            y: None,
            el: None,
            view: None,
        }
    }

    fn sess(event: RawEvent) -> SessionEvent {
        SessionEvent {
            sess_key: format!("{}@{}:0", event.uid, event.sid),
            event,
        }
    }

    fn move_at(ts: f64, x: f64, y: f64) -> SessionEvent {
        let mut e = raw(EventType::Move, ts);
        e.x = Some(x);
        e.y = Some(y);
        sess(e)
    }

    fn click_at(ts: f64, x: f64, y: f64, el: Option<&str>) -> SessionEvent {
        let mut e = raw(EventType::Click, ts);
        e.x = Some(x);
        e.y = Some(y);
        e.el = el.map(|s| s.to_string());
        sess(e)
    }

    fn scroll_at(ts: f64, y: f64) -> SessionEvent {
        let mut e = raw(EventType::Scroll, ts);
        e.view = Some(ViewState { y: Some(y) });
        sess(e)
    }

    #[test]
    fn test_window_coverage_is_total() {
        // Session spans 12s with a silent stretch in the middle.
        let events = vec![click_at(0.0, 10.0, 10.0, None), click_at(12.0, 10.0, 10.0, None)];
        let windows = extract_windows(&events, &DetectorConfig::default());

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].w_start, 0.0);
        assert_eq!(windows[1].w_start, 5.0);
        assert_eq!(windows[2].w_start, 10.0);
        // Middle window is empty but still emitted with zero signals.
        assert_eq!(windows[1].signals, WindowSignals::default());
        // Every event falls into exactly one half-open window.
        assert_eq!(windows[0].signals.clicks, 1);
        assert_eq!(windows[2].signals.clicks, 1);
    }

    #[test]
    fn test_event_on_exact_window_boundary() {
        // Session span is an exact multiple of the window length: the last
        // event sits on a window's closed lower bound, so a third window is
        // needed to keep coverage total under half-open intervals.
        let events = vec![
            click_at(0.0, 10.0, 10.0, None),
            click_at(5.0, 10.0, 10.0, None),
            click_at(10.0, 10.0, 10.0, None),
        ];
        let windows = extract_windows(&events, &DetectorConfig::default());

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].w_start, 10.0);
        for window in &windows {
            assert_eq!(window.signals.clicks, 1);
        }
    }

    #[test]
    fn test_single_event_session_yields_one_window() {
        let events = vec![click_at(100.0, 0.0, 0.0, None)];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].w_start, 100.0);
        assert_eq!(windows[0].w_end, 105.0);
    }

    #[test]
    fn test_rage_click_triplet() {
        let events = vec![
            click_at(0.0, 300.0, 600.0, None),
            click_at(0.2, 305.0, 602.0, None),
            click_at(0.4, 295.0, 598.0, None),
        ];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows[0].signals.rage_clicks, 1);
    }

    #[test]
    fn test_slow_triplet_is_not_rage() {
        let events = vec![
            click_at(0.0, 300.0, 600.0, None),
            click_at(0.4, 300.0, 600.0, None),
            click_at(0.8, 300.0, 600.0, None),
        ];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows[0].signals.rage_clicks, 0);
    }

    #[test]
    fn test_spread_triplet_is_not_rage() {
        let events = vec![
            click_at(0.0, 300.0, 600.0, None),
            click_at(0.2, 360.0, 600.0, None),
            click_at(0.4, 300.0, 600.0, None),
        ];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows[0].signals.rage_clicks, 0);
    }

    #[test]
    fn test_dead_clicks() {
        let events = vec![
            click_at(0.0, 1.0, 1.0, Some("div#dead")),
            click_at(1.0, 1.0, 1.0, Some("button#cta")),
            click_at(2.0, 1.0, 1.0, Some("BUTTON#upper")),
            click_at(3.0, 1.0, 1.0, None),
        ];
        let windows = extract_windows(&events, &DetectorConfig::default());
        // div and missing tag are dead; both button variants are actionable.
        assert_eq!(windows[0].signals.dead_clicks, 2);
        assert_eq!(windows[0].signals.clicks, 4);
    }

    #[test]
    fn test_speed_stats() {
        // Three moves at 1s apart: 100px then 200px.
        let events = vec![
            move_at(0.0, 0.0, 0.0),
            move_at(1.0, 100.0, 0.0),
            move_at(2.0, 100.0, 200.0),
        ];
        let windows = extract_windows(&events, &DetectorConfig::default());
        let s = &windows[0].signals;
        assert_eq!(s.moves, 2);
        assert!((s.speed_mean - 150.0).abs() < 1e-9);
        assert!((s.speed_max - 200.0).abs() < 1e-9);
        // Population std of {100, 200} is 50.
        assert!((s.speed_std - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_move_does_not_blow_up() {
        let events = vec![move_at(0.0, 0.0, 0.0), move_at(0.0, 10.0, 0.0)];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert!(windows[0].signals.speed_max.is_finite());
    }

    #[test]
    fn test_hover_stall_before_click() {
        // Slow drift sampled at 20Hz: 1px per 0.05s = 20px/s, under the 40px/s
        // threshold. 15 samples * 0.05s = 0.75s >= 0.7s stall threshold.
        let mut events: Vec<SessionEvent> = (0..16)
            .map(|i| move_at(3.0 + i as f64 * 0.05, i as f64, 0.0))
            .collect();
        events.push(click_at(3.9, 16.0, 0.0, Some("button#buy")));
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows[0].signals.hover_stall, 1);
    }

    #[test]
    fn test_fast_approach_is_not_a_stall() {
        // 50px per 0.05s = 1000px/s, far above the low-speed threshold.
        let mut events: Vec<SessionEvent> = (0..16)
            .map(|i| move_at(3.0 + i as f64 * 0.05, i as f64 * 50.0, 0.0))
            .collect();
        events.push(click_at(3.9, 800.0, 0.0, Some("button#buy")));
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows[0].signals.hover_stall, 0);
    }

    #[test]
    fn test_scroll_oscillations_ignore_zero_deltas() {
        let events = vec![
            scroll_at(0.0, 100.0),
            scroll_at(0.5, 200.0), // down
            scroll_at(1.0, 200.0), // zero delta, ignored
            scroll_at(1.5, 150.0), // up: flip 1
            scroll_at(2.0, 250.0), // down: flip 2
        ];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows[0].signals.scroll_oscillations, 2);
    }

    #[test]
    fn test_scroll_velocity_and_depth() {
        let events = vec![scroll_at(0.0, 100.0), scroll_at(2.0, 500.0)];
        let windows = extract_windows(&events, &DetectorConfig::default());
        let s = &windows[0].signals;
        assert!((s.scroll_velocity - 200.0).abs() < 1e-9);
        assert_eq!(s.scroll_depth, 500.0);
    }

    #[test]
    fn test_single_scroll_sample_has_zero_velocity() {
        let events = vec![scroll_at(0.0, 300.0)];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows[0].signals.scroll_velocity, 0.0);
        assert_eq!(windows[0].signals.scroll_depth, 300.0);
    }

    #[test]
    fn test_sessions_do_not_leak_into_each_other() {
        let mut other = click_at(0.0, 1.0, 1.0, None);
        other.sess_key = "u2@s2:0".to_string();
        other.event.uid = "u2".to_string();
        other.event.sid = "s2".to_string();

        let events = vec![click_at(0.0, 1.0, 1.0, None), other];
        let windows = extract_windows(&events, &DetectorConfig::default());
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].sess_key, "u1@s1:0");
        assert_eq!(windows[1].sess_key, "u2@s2:0");
        assert_eq!(windows[0].signals.clicks, 1);
        assert_eq!(windows[1].signals.clicks, 1);
    }

    #[test]
    fn test_empty_input() {
        let windows = extract_windows(&[], &DetectorConfig::default());
        assert!(windows.is_empty());
    }
}
