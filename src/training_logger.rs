//! Training Logger
//!
//! Records one row of metrics per epoch to a CSV file and mirrors it to the
//! `tracing` log, so a run can be followed live and plotted afterwards.
//!
//! ## CSV Format
//!
//! - `epoch`: Epoch number (1-based)
//! - `elapsed_seconds`: Time since training started
//! - `learning_rate`: Step size used for the epoch
//! - `train_loss`: Mean cross-entropy over the epoch's training batches
//! - `val_loss`: Validation cross-entropy (empty without a validation set)
//! - `val_accuracy`: Validation accuracy in `[0, 1]` (empty without a validation set)
//!
//! ## Example
//!
//! ```rust,no_run
//! use textcnn::TrainingLogger;
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(1, 0.01, 2.1, None)?;
//! # Ok::<(), textcnn::Error>(())
//! ```

use crate::error::Result;
use crate::train::Evaluation;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// CSV + console logger for per-epoch metrics
pub struct TrainingLogger {
    log_file: File,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self> {
        let mut log_file = File::create(log_path)?;
        writeln!(
            log_file,
            "epoch,elapsed_seconds,learning_rate,train_loss,val_loss,val_accuracy"
        )?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Append one epoch's metrics
    ///
    /// The row is flushed immediately so a crashed run keeps its history.
    pub fn log(
        &mut self,
        epoch: usize,
        learning_rate: f32,
        train_loss: f32,
        validation: Option<&Evaluation>,
    ) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let (val_loss, val_accuracy) = validation
            .map(|v| (format!("{:.4}", v.loss), format!("{:.4}", v.accuracy)))
            .unwrap_or_default();

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.4},{},{}",
            epoch, elapsed, learning_rate, train_loss, val_loss, val_accuracy
        )?;
        self.log_file.flush()?;

        let epoch_time = self.last_log_time.elapsed().as_secs_f32();
        match validation {
            Some(v) => tracing::info!(
                "Epoch {:3} | Time: {:7.1}s (+{:.1}s) | LR: {:.4} | Train: {:.4} | \
                 Val: {:.4} | Acc: {:.1}%",
                epoch,
                elapsed,
                epoch_time,
                learning_rate,
                train_loss,
                v.loss,
                v.accuracy * 100.0
            ),
            None => tracing::info!(
                "Epoch {:3} | Time: {:7.1}s (+{:.1}s) | LR: {:.4} | Train: {:.4}",
                epoch,
                elapsed,
                epoch_time,
                learning_rate,
                train_loss
            ),
        }

        self.last_log_time = Instant::now();
        Ok(())
    }
}
