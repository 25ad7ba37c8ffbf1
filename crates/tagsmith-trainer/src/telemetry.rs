//! Progress reporting and JSON-lines summary events.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::Mode;

/// One summary record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub step: u64,
    pub wall_time: f64,
    pub scalars: BTreeMap<String, f64>,
}

/// Writes [`SummaryEvent`]s to an `events.jsonl` file.
#[derive(Debug, Default)]
pub struct SummaryWriter {
    path: Option<PathBuf>,
    out: Option<BufWriter<File>>,
}

impl SummaryWriter {
    /// Writer for `<dir>/events.jsonl`, creating `dir` if needed. An events
    /// file left by an earlier run is truncated.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join("events.jsonl");
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            path: Some(path),
            out: Some(BufWriter::new(file)),
        })
    }

    /// Writer that drops every event.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn write(&mut self, step: u64, scalars: &[(&str, f64)]) -> Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Ok(());
        };
        let event = SummaryEvent {
            step,
            wall_time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
            scalars: scalars.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
        };
        serde_json::to_writer(&mut *out, &event)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        Ok(())
    }
}

/// Per-step progress line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepProgress {
    pub mode: Mode,
    pub step: usize,
    pub total: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub f1: f64,
    pub learning_rate: Option<f64>,
}

pub trait ProgressObserver {
    fn on_step(&mut self, progress: &StepProgress);
}

/// Logs train progress at INFO every `every` steps and on the last planned
/// step. Eval steps log at DEBUG.
#[derive(Debug, Clone)]
pub struct LogProgress {
    every: usize,
}

impl LogProgress {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl ProgressObserver for LogProgress {
    fn on_step(&mut self, p: &StepProgress) {
        if (p.step + 1) % self.every != 0 && p.step + 1 != p.total {
            return;
        }
        if p.mode.is_training() {
            info!(
                step = p.step + 1,
                total = p.total,
                loss = p.loss,
                accuracy = p.accuracy,
                f1 = p.f1,
                lr = p.learning_rate,
                "train progress"
            );
        } else {
            debug!(step = p.step + 1, total = p.total, loss = p.loss, "eval progress");
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_step(&mut self, _: &StepProgress) {}
}

/// Summary writers and progress observer for one run.
pub struct Telemetry {
    pub train: SummaryWriter,
    pub dev: SummaryWriter,
    pub progress: Box<dyn ProgressObserver>,
}

impl Telemetry {
    /// Writers under `<summary_dir>/summaries/{train,dev}`.
    pub fn open<P: AsRef<Path>>(summary_dir: P) -> Result<Self> {
        let root = summary_dir.as_ref().join("summaries");
        Ok(Self {
            train: SummaryWriter::create(root.join("train"))?,
            dev: SummaryWriter::create(root.join("dev"))?,
            progress: Box::new(LogProgress::new(100)),
        })
    }

    pub fn silent() -> Self {
        Self {
            train: SummaryWriter::noop(),
            dev: SummaryWriter::noop(),
            progress: Box::new(NoProgress),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.train.flush()?;
        self.dev.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_events_are_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let mut telemetry = Telemetry::open(dir.path()).unwrap();
        telemetry.train.write(1, &[("loss", 0.5), ("f1", 0.25)]).unwrap();
        telemetry.train.write(2, &[("loss", 0.4)]).unwrap();
        telemetry.flush().unwrap();

        let path = dir.path().join("summaries/train/events.jsonl");
        assert_eq!(telemetry.train.path(), Some(path.as_path()));
        let text = fs::read_to_string(path).unwrap();
        let events: Vec<SummaryEvent> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].step, 1);
        assert_eq!(events[0].scalars["f1"], 0.25);
        assert!(events[1].wall_time > 0.0);
        assert!(dir.path().join("summaries/dev/events.jsonl").exists());
    }

    #[test]
    fn test_new_run_replaces_previous_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = SummaryWriter::create(dir.path()).unwrap();
        first.write(1, &[("loss", 1.0)]).unwrap();
        first.write(2, &[("loss", 0.9)]).unwrap();
        first.flush().unwrap();
        drop(first);

        let mut second = SummaryWriter::create(dir.path()).unwrap();
        second.write(1, &[("loss", 0.5)]).unwrap();
        second.flush().unwrap();

        let text = fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let events: Vec<SummaryEvent> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scalars["loss"], 0.5);
    }

    #[test]
    fn test_noop_writer() {
        let mut writer = SummaryWriter::noop();
        assert!(writer.path().is_none());
        writer.write(1, &[("loss", 1.0)]).unwrap();
        writer.flush().unwrap();
    }
}
