//! Timed UI phases.
//!
//! A [`Timeline`] is a finite list of named phases with durations, such as
//! a confirmation badge that appears, holds, then fades. Running it publishes
//! the current phase name on a `watch` channel. The run is owned by a
//! [`TimelineRun`]; dropping the run stops the timers.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedPhase {
    pub name: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    phases: Vec<TimedPhase>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, name: &str, duration: Duration) -> Self {
        self.phases.push(TimedPhase {
            name: name.to_string(),
            duration,
        });
        self
    }

    pub fn phases(&self) -> &[TimedPhase] {
        &self.phases
    }

    pub fn total(&self) -> Duration {
        self.phases.iter().map(|p| p.duration).sum()
    }

    /// Start the timeline. Must be called from within a tokio runtime.
    pub fn start(&self) -> TimelineRun {
        let (tx, rx) = watch::channel(None);
        let phases = self.phases.clone();

        let handle = tokio::spawn(async move {
            for phase in phases {
                tx.send_replace(Some(phase.name));
                tokio::time::sleep(phase.duration).await;
            }
            tx.send_replace(None);
        });

        TimelineRun {
            current: rx,
            handle: handle.abort_handle(),
        }
    }
}

/// A running timeline. `current` is `None` before the first phase and once
/// the last phase has elapsed.
#[derive(Debug)]
pub struct TimelineRun {
    current: watch::Receiver<Option<String>>,
    handle: AbortHandle,
}

impl TimelineRun {
    pub fn current(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the phase after the current one. `None` once the run is over.
    pub async fn next_phase(&mut self) -> Option<String> {
        self.current.changed().await.ok()?;
        self.current.borrow_and_update().clone()
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for TimelineRun {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn badge() -> Timeline {
        Timeline::new()
            .then("show", Duration::from_millis(150))
            .then("hold", Duration::from_secs(2))
            .then("fade", Duration::from_millis(150))
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_advance_on_schedule() {
        let timeline = badge();
        assert_eq!(timeline.total(), Duration::from_millis(2300));

        let run = timeline.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(run.current().as_deref(), Some("show"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(run.current().as_deref(), Some("hold"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(run.current().as_deref(), Some("fade"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(run.current(), None);
        assert!(run.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_timers() {
        let run = badge().start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let handle = run.handle.clone();
        drop(run);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }
}
