//! # Response-Time Recorder
//!
//! Per-action latency statistics for every dispatch handled by the gateways.
//!
//! A [`ResponseTimeMark`] is taken when a request is submitted and completed when its dispatch
//! task finishes. Each completion is folded into the record of its action: sample count, total
//! elapsed time, minimum and maximum. Records are created lazily on first use and live for the
//! lifetime of the recorder.
//!
//! ## Concurrency
//!
//! The action table is a `DashMap` (sharded locks), so lookups of different actions do not
//! contend. Each record is guarded by its own mutex so that count and total are always updated
//! together and a reader never observes one without the other. Samples for one action never
//! touch the record of another.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Start mark for one in-flight request
#[derive(Debug)]
#[must_use = "a mark records nothing until it is completed"]
pub struct ResponseTimeMark {
    action: Arc<str>,
    started: Instant,
}

impl ResponseTimeMark {
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[must_use]
    pub fn started(&self) -> Instant {
        self.started
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LatencyTotals {
    sample_count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl LatencyTotals {
    fn fold(&mut self, elapsed: Duration) {
        if self.sample_count == 0 || elapsed < self.min {
            self.min = elapsed;
        }
        if elapsed > self.max {
            self.max = elapsed;
        }
        self.sample_count += 1;
        self.total = self.total.saturating_add(elapsed);
    }

    fn average(&self) -> Duration {
        if self.sample_count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.sample_count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Point-in-time view of one action's latency record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionLatency {
    pub action: String,
    pub sample_count: u64,
    #[serde(rename = "total_us", serialize_with = "as_micros")]
    pub total: Duration,
    #[serde(rename = "average_us", serialize_with = "as_micros")]
    pub average: Duration,
    #[serde(rename = "min_us", serialize_with = "as_micros")]
    pub min: Duration,
    #[serde(rename = "max_us", serialize_with = "as_micros")]
    pub max: Duration,
}

fn as_micros<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_micros()).unwrap_or(u64::MAX))
}

/// Process-scoped table of per-action response times
#[derive(Debug, Default)]
pub struct ResponseTimeRecorder {
    actions: DashMap<Arc<str>, Arc<Mutex<LatencyTotals>>>,
}

impl ResponseTimeRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a start timestamp for `action`
    pub fn mark(&self, action: &Arc<str>) -> ResponseTimeMark {
        ResponseTimeMark {
            action: Arc::clone(action),
            started: Instant::now(),
        }
    }

    /// Fold the time elapsed since `mark` into its action's record and return it
    pub fn complete(&self, mark: ResponseTimeMark) -> Duration {
        let elapsed = mark.started.elapsed();
        self.totals_for(&mark.action).lock().fold(elapsed);
        elapsed
    }

    /// Fold an externally measured sample into `action`'s record
    pub fn record(&self, action: &str, elapsed: Duration) {
        // the shard guard must be released before `totals_for` takes the write lock
        let existing = self.actions.get(action).map(|entry| Arc::clone(entry.value()));
        let totals = existing.unwrap_or_else(|| self.totals_for(&Arc::from(action)));
        totals.lock().fold(elapsed);
    }

    /// Average elapsed time for `action`, zero when nothing was recorded
    #[must_use]
    pub fn average(&self, action: &str) -> Duration {
        self.actions
            .get(action)
            .map(|entry| entry.value().lock().average())
            .unwrap_or(Duration::ZERO)
    }

    /// Number of samples recorded for `action`
    #[must_use]
    pub fn sample_count(&self, action: &str) -> u64 {
        self.actions
            .get(action)
            .map(|entry| entry.value().lock().sample_count)
            .unwrap_or(0)
    }

    /// Number of distinct actions with a record
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Snapshot of every record, sorted by action name
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActionLatency> {
        let mut out: Vec<ActionLatency> = self
            .actions
            .iter()
            .map(|entry| {
                let totals = *entry.value().lock();
                ActionLatency {
                    action: entry.key().to_string(),
                    sample_count: totals.sample_count,
                    total: totals.total,
                    average: totals.average(),
                    min: totals.min,
                    max: totals.max,
                }
            })
            .collect();
        out.sort_by(|a, b| a.action.cmp(&b.action));
        out
    }

    /// Prometheus text exposition of the per-action records
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::with_capacity(256 + snapshot.len() * 160);
        out.push_str(
            "# HELP brrtgate_action_requests_total Completed dispatches per action\n\
             # TYPE brrtgate_action_requests_total counter\n",
        );
        for rec in &snapshot {
            let _ = writeln!(
                out,
                "brrtgate_action_requests_total{{action=\"{}\"}} {}",
                rec.action, rec.sample_count
            );
        }
        out.push_str(
            "# HELP brrtgate_action_latency_seconds Average dispatch latency per action\n\
             # TYPE brrtgate_action_latency_seconds gauge\n",
        );
        for rec in &snapshot {
            let _ = writeln!(
                out,
                "brrtgate_action_latency_seconds{{action=\"{}\"}} {:.6}",
                rec.action,
                rec.average.as_secs_f64()
            );
        }
        out.push_str(
            "# HELP brrtgate_action_latency_max_seconds Slowest dispatch per action\n\
             # TYPE brrtgate_action_latency_max_seconds gauge\n",
        );
        for rec in &snapshot {
            let _ = writeln!(
                out,
                "brrtgate_action_latency_max_seconds{{action=\"{}\"}} {:.6}",
                rec.action,
                rec.max.as_secs_f64()
            );
        }
        out
    }

    fn totals_for(&self, action: &Arc<str>) -> Arc<Mutex<LatencyTotals>> {
        if let Some(entry) = self.actions.get(action.as_ref()) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.actions
                .entry(Arc::clone(action))
                .or_default()
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_of_three_samples() {
        let recorder = ResponseTimeRecorder::new();
        for ms in [10, 20, 30] {
            recorder.record("Login", Duration::from_millis(ms));
        }
        assert_eq!(recorder.average("Login"), Duration::from_millis(20));
        assert_eq!(recorder.sample_count("Login"), 3);
    }

    #[test]
    fn test_average_without_samples_is_zero() {
        let recorder = ResponseTimeRecorder::new();
        assert_eq!(recorder.average("Unknown"), Duration::ZERO);
        assert_eq!(recorder.sample_count("Unknown"), 0);
        assert_eq!(recorder.action_count(), 0);
    }

    #[test]
    fn test_actions_are_isolated() {
        let recorder = ResponseTimeRecorder::new();
        recorder.record("Fast", Duration::from_millis(1));
        for _ in 0..50 {
            recorder.record("Slow", Duration::from_secs(2));
        }
        assert_eq!(recorder.average("Fast"), Duration::from_millis(1));
        assert_eq!(recorder.sample_count("Fast"), 1);
    }

    #[test]
    fn test_mark_and_complete_records_elapsed() {
        let recorder = ResponseTimeRecorder::new();
        let action: Arc<str> = Arc::from("Upload");
        let mark = recorder.mark(&action);
        std::thread::sleep(Duration::from_millis(5));
        let elapsed = recorder.complete(mark);
        assert!(elapsed >= Duration::from_millis(5));
        assert_eq!(recorder.sample_count("Upload"), 1);
        assert_eq!(recorder.average("Upload"), elapsed);
    }

    #[test]
    fn test_snapshot_tracks_min_and_max() {
        let recorder = ResponseTimeRecorder::new();
        recorder.record("B", Duration::from_millis(40));
        recorder.record("B", Duration::from_millis(10));
        recorder.record("A", Duration::from_millis(5));
        let snap = recorder.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].action, "A");
        assert_eq!(snap[1].min, Duration::from_millis(10));
        assert_eq!(snap[1].max, Duration::from_millis(40));
        assert_eq!(snap[1].total, Duration::from_millis(50));
    }

    #[test]
    fn test_prometheus_rendering() {
        let recorder = ResponseTimeRecorder::new();
        recorder.record("SendText", Duration::from_millis(250));
        let text = recorder.render_prometheus();
        assert!(text.contains("brrtgate_action_requests_total{action=\"SendText\"} 1"));
        assert!(text.contains("brrtgate_action_latency_seconds{action=\"SendText\"} 0.250000"));
    }
}
