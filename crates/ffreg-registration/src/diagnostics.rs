//! Per-iteration diagnostics for registration runs.
//!
//! Components attach named values (for example the rigidity sub-terms) to
//! an [`IterationDiagnostics`] record; the driver hands each record to a
//! [`DiagnosticsSink`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Diagnostics gathered after one optimizer iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationDiagnostics {
    /// Resolution level, 0 = coarsest.
    pub level: usize,
    pub iteration: usize,
    /// Total cost at the iteration's parameters.
    pub value: f64,
    /// Time since the level started.
    pub elapsed: Duration,
    /// Named component values.
    pub metrics: Vec<(String, f64)>,
}

impl IterationDiagnostics {
    pub fn new(level: usize, iteration: usize, value: f64, elapsed: Duration) -> Self {
        Self {
            level,
            iteration,
            value,
            elapsed,
            metrics: Vec::new(),
        }
    }

    /// Add a named value.
    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }

    /// First value recorded under `name`.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|&(_, v)| v)
    }
}

/// Receiver of registration progress.
pub trait DiagnosticsSink: Send + Sync {
    /// Called when a level starts.
    fn on_level_start(&self, level: usize, grid_size: &[usize]) {
        let _ = (level, grid_size);
    }

    /// Called after every optimizer iteration.
    fn on_iteration(&self, diagnostics: &IterationDiagnostics);

    /// Called when a level finishes.
    fn on_level_complete(&self, level: usize, final_value: f64) {
        let _ = (level, final_value);
    }

    /// Called when a level aborts.
    fn on_error(&self, level: usize, error: &str) {
        let _ = (level, error);
    }
}

/// Sink logging through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingDiagnostics {
    /// Log every `log_interval` iterations.
    pub log_interval: usize,
}

impl Default for TracingDiagnostics {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl TracingDiagnostics {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl DiagnosticsSink for TracingDiagnostics {
    fn on_level_start(&self, level: usize, grid_size: &[usize]) {
        tracing::info!(level, ?grid_size, "level started");
    }

    fn on_iteration(&self, diagnostics: &IterationDiagnostics) {
        if diagnostics.iteration % self.log_interval != 0 {
            return;
        }
        tracing::info!(
            "Level {} iter {} | value: {:.6} | elapsed: {:.2}s",
            diagnostics.level,
            diagnostics.iteration,
            diagnostics.value,
            diagnostics.elapsed.as_secs_f64()
        );
        for (name, value) in &diagnostics.metrics {
            tracing::info!("  {}: {:.6}", name, value);
        }
    }

    fn on_level_complete(&self, level: usize, final_value: f64) {
        tracing::info!(level, final_value, "level completed");
    }

    fn on_error(&self, level: usize, error: &str) {
        tracing::error!(level, "registration level failed: {}", error);
    }
}

/// Sink recording every iteration.
#[derive(Debug, Clone, Default)]
pub struct HistoryDiagnostics {
    history: Arc<Mutex<Vec<IterationDiagnostics>>>,
}

impl HistoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded iterations.
    pub fn history(&self) -> Vec<IterationDiagnostics> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Recorded iterations of one level.
    pub fn level_history(&self, level: usize) -> Vec<IterationDiagnostics> {
        self.history()
            .into_iter()
            .filter(|d| d.level == level)
            .collect()
    }

    pub fn clear(&self) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl DiagnosticsSink for HistoryDiagnostics {
    fn on_iteration(&self, diagnostics: &IterationDiagnostics) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostics.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_lookup() {
        let mut diagnostics = IterationDiagnostics::new(1, 4, 0.25, Duration::ZERO);
        diagnostics.add_metric("rigidity.orthonormality", 0.5);
        diagnostics.add_metric("rigidity.properness", 0.0);
        assert_eq!(diagnostics.metric("rigidity.orthonormality"), Some(0.5));
        assert_eq!(diagnostics.metric("rigidity.linearity"), None);
    }

    #[test]
    fn test_history_records_and_filters() {
        let sink = HistoryDiagnostics::new();
        let shared = sink.clone();
        sink.on_iteration(&IterationDiagnostics::new(0, 0, 2.0, Duration::ZERO));
        sink.on_iteration(&IterationDiagnostics::new(1, 0, 1.0, Duration::ZERO));
        sink.on_iteration(&IterationDiagnostics::new(1, 1, 0.5, Duration::ZERO));

        assert_eq!(shared.history().len(), 3);
        assert_eq!(shared.level_history(1).len(), 2);
        shared.clear();
        assert!(sink.history().is_empty());
    }
}
