//! The bounded poll-acquire loop. One voltage step runs one instance of
//! this state machine: `Idle -> Acquiring -> (Satisfied | TimedOut)`.

use crate::config::AcqSettings;
use crate::error::Result;
use crate::event::RawEventBatch;
use crate::gateway::{CaptureWindow, Digitizer};
use crate::utils::Counter;
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Terminal state of one step's acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The minimum event count was reached.
    Satisfied,
    /// The deadline fired first; whatever was collected stands.
    TimedOut,
}

/// Everything one step produced. `collected` counts events across all
/// batches, empty batches included in `batches` for completeness.
#[derive(Debug)]
pub struct StepOutcome {
    pub batches: Vec<RawEventBatch>,
    pub collected: usize,
    pub status: StepStatus,
}

pub struct PollLoop {
    pub poll_interval: Duration,
    pub per_event_budget: Duration,
    pub min_events: usize,
}

impl PollLoop {
    pub fn from_conf(acq: &AcqSettings, min_events: usize) -> Self {
        Self {
            poll_interval: Duration::from_millis(acq.poll_interval_ms),
            per_event_budget: Duration::from_secs_f64(acq.per_event_timeout_s),
            min_events,
        }
    }

    /// Run the loop for one step. Capture is enabled on entry and disabled
    /// on every exit path, including device errors raised mid-loop. The
    /// deadline is `min_events * per_event_budget` past step start; when it
    /// fires, one final poll picks up events that arrived just before it.
    pub fn run<D: Digitizer + ?Sized>(
        &self,
        digitizer: &mut D,
        target_volts: f64,
    ) -> Result<StepOutcome> {
        let mut counter = Counter::new();
        let deadline = counter.t_begin + self.per_event_budget.mul_f64(self.min_events as f64);

        let mut window = CaptureWindow::open(digitizer)?;
        let mut batches = Vec::new();

        let status = loop {
            if counter.n_events >= self.min_events {
                break StepStatus::Satisfied;
            }
            if Instant::now() >= deadline {
                // Final drain so events that landed right before the
                // deadline are not dropped.
                let batch = window.acquire_events()?;
                counter.increment(batch.len());
                batches.push(batch);
                break StepStatus::TimedOut;
            }

            thread::sleep(self.poll_interval);
            let batch = window.acquire_events()?;
            counter.increment(batch.len());
            batches.push(batch);
            info!(
                "acquired {} of {} at {:.1} V ({:.1} ev/s)",
                counter.n_events,
                self.min_events,
                target_volts,
                counter.rate()
            );
        };
        window.close()?;

        match status {
            StepStatus::Satisfied => {
                info!("collected {} at {:.1} V", counter.n_events, target_volts)
            }
            StepStatus::TimedOut => warn!(
                "step at {:.1} V timed out with {} of {} events",
                target_volts, counter.n_events, self.min_events
            ),
        }

        Ok(StepOutcome {
            batches,
            collected: counter.n_events,
            status,
        })
    }
}
