//! Folds independently named progress stages into one busy/overall signal.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use shared::observable::{Observable, Unsubscriber};
use tracing::debug;

/// Overall progress at or above `1 - COMPLETION_TOLERANCE` closes the cycle.
pub const COMPLETION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStage {
    pub name: String,
    pub progress: f64,
    pub total: f64,
}

impl ProgressStage {
    pub fn new(name: impl Into<String>, progress: f64, total: f64) -> Self {
        Self {
            name: name.into(),
            progress,
            total,
        }
    }

    /// Fraction done. A stage with no positive total counts as finished.
    pub fn ratio(&self) -> f64 {
        if self.total > 0.0 {
            self.progress / self.total
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub busy: bool,
    pub stages: BTreeMap<String, ProgressStage>,
    pub overall_progress: f64,
}

#[derive(Default)]
pub struct ProgressAggregator {
    stages: Mutex<BTreeMap<String, ProgressStage>>,
    on_progress: Observable<ProgressEvent>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `stage` under its name and emits the recomputed aggregate.
    ///
    /// Every tracked stage weighs the same regardless of its `total`. Once the
    /// mean reaches 1 the emitted event still lists the finished stages, but the
    /// map is emptied so the next push starts a fresh cycle.
    pub fn push_stage(&self, stage: ProgressStage) {
        let event = {
            let mut stages = self.lock_stages();
            stages.insert(stage.name.clone(), stage);

            let overall_progress =
                stages.values().map(ProgressStage::ratio).sum::<f64>() / stages.len() as f64;

            if overall_progress >= 1.0 - COMPLETION_TOLERANCE {
                ProgressEvent {
                    busy: false,
                    stages: std::mem::take(&mut *stages),
                    overall_progress: 1.0,
                }
            } else {
                ProgressEvent {
                    busy: true,
                    stages: stages.clone(),
                    overall_progress,
                }
            }
        };

        debug!(
            busy = event.busy,
            overall_progress = event.overall_progress,
            stages = event.stages.len(),
            "progress updated"
        );
        self.on_progress.notify(&event);
    }

    pub fn notify_busy(&self, busy: bool, name: &str) {
        let progress = if busy { 0.0 } else { 1.0 };
        self.push_stage(ProgressStage::new(name, progress, 1.0));
    }

    /// Marks `name` busy now and finished when the returned guard drops.
    pub fn begin(&self, name: impl Into<String>) -> BusyStage<'_> {
        let name = name.into();
        self.notify_busy(true, &name);
        BusyStage {
            aggregator: self,
            name,
        }
    }

    pub fn on_progress<F>(&self, observer: F) -> Unsubscriber
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress.subscribe(observer)
    }

    pub fn is_busy(&self) -> bool {
        !self.lock_stages().is_empty()
    }

    /// Stages of the cycle currently in flight.
    pub fn tracked_stages(&self) -> BTreeMap<String, ProgressStage> {
        self.lock_stages().clone()
    }

    fn lock_stages(&self) -> MutexGuard<'_, BTreeMap<String, ProgressStage>> {
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open busy stage; closes itself on drop, including when the owning future
/// is dropped mid-flight.
#[must_use = "the stage is closed as soon as the guard is dropped"]
pub struct BusyStage<'a> {
    aggregator: &'a ProgressAggregator,
    name: String,
}

impl BusyStage<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BusyStage<'_> {
    fn drop(&mut self) {
        self.aggregator.notify_busy(false, &self.name);
    }
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
