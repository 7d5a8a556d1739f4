use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Serialize, Clone)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub actions: BTreeMap<String, ActionMetrics>,
    pub total_duration_ms: f64,
    pub succeeded: u64,
    pub skipped: u64,
    pub tolerated_failures: u64,
    pub fatal_failures: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct ActionMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

/// Counters shared by every step runner of one CLI invocation, nested ones
/// included.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<RunSummary>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunSummary {
                started_at: Some(Utc::now()),
                ..RunSummary::default()
            })),
        }
    }

    pub fn start_action(&self, action_name: &str) -> ActionTimer {
        ActionTimer {
            action: action_name.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_succeeded(&self) {
        self.update(|summary| summary.succeeded += 1);
    }

    pub fn record_skipped(&self) {
        self.update(|summary| summary.skipped += 1);
    }

    pub fn record_tolerated_failure(&self) {
        self.update(|summary| summary.tolerated_failures += 1);
    }

    pub fn record_fatal_failure(&self) {
        self.update(|summary| summary.fatal_failures += 1);
    }

    pub fn record_warnings(&self, warnings: &[String]) {
        self.update(|summary| summary.warnings.extend(warnings.iter().cloned()));
    }

    pub fn record_total_duration(&self, duration: Duration) {
        self.update(|summary| summary.total_duration_ms = duration.as_secs_f64() * 1_000.0);
    }

    pub fn snapshot(&self) -> RunSummary {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn update(&self, apply: impl FnOnce(&mut RunSummary)) {
        if let Ok(mut guard) = self.inner.lock() {
            apply(&mut guard);
        }
    }
}

pub struct ActionTimer {
    action: String,
    started_at: Instant,
    collector: Arc<Mutex<RunSummary>>,
    recorded: bool,
}

impl ActionTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.actions.entry(self.action.clone()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(action = self.action.as_str(), duration_ms, "Action duration recorded");
        self.recorded = true;
    }
}

impl Drop for ActionTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_summary(summary: &RunSummary) {
    info!(
        total_duration_ms = summary.total_duration_ms,
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        tolerated_failures = summary.tolerated_failures,
        fatal_failures = summary.fatal_failures,
        "Build summary"
    );
    for (action, metrics) in &summary.actions {
        info!(
            action = action.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Action metrics"
        );
    }
    if !summary.warnings.is_empty() {
        warn!(count = summary.warnings.len(), "Warnings raised during the build");
        for message in &summary.warnings {
            warn!("- {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MetricsCollector;

    #[test]
    fn timers_record_on_drop() {
        let metrics = MetricsCollector::new();
        {
            let _timer = metrics.start_action("copy");
        }
        {
            let _timer = metrics.start_action("copy");
        }
        metrics.record_succeeded();
        metrics.record_warnings(&["careful".to_string()]);
        let summary = metrics.snapshot();
        assert_eq!(summary.actions["copy"].calls, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.warnings, vec!["careful"]);
        assert!(summary.started_at.is_some());
    }
}
