//! Patience-based early stopping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of improvement for the monitored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measure {
    /// Higher is better. Initial best is 0.
    F1,
    /// Lower is better. Initial best is +inf.
    Loss,
}

impl Measure {
    fn initial_best(self) -> f64 {
        match self {
            Measure::F1 => 0.0,
            Measure::Loss => f64::INFINITY,
        }
    }

    fn improves(self, score: f64, best: f64) -> bool {
        match self {
            Measure::F1 => score > best,
            Measure::Loss => score < best,
        }
    }
}

/// Snapshot of an [`EarlyStopping`] monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingStatus {
    pub measure: Measure,
    pub best: f64,
    pub counter: usize,
    pub patience: usize,
    pub stopped: bool,
}

impl fmt::Display for EarlyStoppingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} best={:.6} counter={}/{}{}",
            self.measure,
            self.best,
            self.counter,
            self.patience,
            if self.stopped { " (stopped)" } else { "" }
        )
    }
}

/// Stops once the score fails to improve `patience` times in a row.
/// Stopping is terminal.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    measure: Measure,
    patience: usize,
    best: f64,
    counter: usize,
    stopped: bool,
}

impl EarlyStopping {
    /// `patience` is clamped to at least 1.
    pub fn new(patience: usize, measure: Measure) -> Self {
        Self {
            measure,
            patience: patience.max(1),
            best: measure.initial_best(),
            counter: 0,
            stopped: false,
        }
    }

    /// Record a score and return whether training should stop.
    pub fn validate(&mut self, score: f64) -> bool {
        if self.stopped {
            return true;
        }
        if self.measure.improves(score, self.best) {
            self.best = score;
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter >= self.patience {
                self.stopped = true;
            }
        }
        self.stopped
    }

    /// Overwrite the best score and clear the counter.
    pub fn reset(&mut self, best: f64) {
        self.best = best;
        self.counter = 0;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn status(&self) -> EarlyStoppingStatus {
        EarlyStoppingStatus {
            measure: self.measure,
            best: self.best,
            counter: self.counter,
            patience: self.patience,
            stopped: self.stopped,
        }
    }
}
