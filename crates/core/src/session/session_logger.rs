use std::collections::BTreeMap;

/// Observer for per-session stage timings and sizes.
///
/// Keeps the controller independent of where its measurements end up
/// (the `log` crate in the server, nowhere in tests).
pub trait SessionLogger: Send {
    /// Record how long a named stage took.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. payload bytes).
    fn metric(&mut self, name: &str, value: f64);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// Collects one session's measurements and writes a one-line summary
/// through the `log` crate at `info` level.
pub struct LogSessionLogger {
    session_id: u64,
    timings: BTreeMap<String, f64>,
    metrics: BTreeMap<String, f64>,
}

impl LogSessionLogger {
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let total_ms: f64 = self.timings.values().sum();
        let mut parts: Vec<String> = self
            .timings
            .iter()
            .map(|(stage, ms)| format!("{stage} {ms:.1}ms"))
            .collect();
        parts.extend(self.metrics.iter().map(|(name, v)| format!("{name}={v:.0}")));

        Some(format!(
            "Session {} ({total_ms:.1}ms): {}",
            self.session_id,
            parts.join(", ")
        ))
    }

    pub fn timing_for(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).copied()
    }

    pub fn metric_for(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

impl SessionLogger for LogSessionLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        *self.timings.entry(stage.to_string()).or_default() += duration_ms;
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("{text}");
        }
    }
}
