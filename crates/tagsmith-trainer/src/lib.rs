//! # Tagsmith Trainer
//!
//! Epoch-driven training for sequence labelers: batch runner, metric
//! accumulation, patience-based early stopping and best-model
//! checkpointing, plus a CoNLL data pipeline and a candle reference model.
//!
//! The loop works against two seams, [`SequenceModel`] and [`DataSource`],
//! so any model or batch source can be plugged into [`Trainer`].

pub mod accumulator;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod early_stopping;
pub mod model;
pub mod runner;
pub mod telemetry;
pub mod trainer;

pub use accumulator::{accumulate, EpochSummary, MetricAccumulator};
pub use checkpoint::{BestModelRecord, Checkpointer};
pub use config::{Args, TrainConfig};
pub use data::{Batch, DataSource};
pub use early_stopping::{EarlyStopping, EarlyStoppingStatus, Measure};
pub use model::{Capabilities, EvalOutputs, GraphDef, Mode, SequenceModel, StepResult};
pub use telemetry::{ProgressObserver, SummaryWriter, Telemetry};
pub use trainer::{run_training, Trainer, TrainingContext, TrainingReport};
