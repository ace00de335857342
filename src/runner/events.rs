//! Progress events emitted during a run.
//!
//! Workers send events over a channel; the thread that owns the terminal
//! drains them, so output is never written from worker threads.

use std::sync::mpsc::Sender;
use std::time::Duration;

use super::result::SkipReason;

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The plan was built.
    PlanReady { total: usize, levels: usize },
    /// A parallel level is about to be dispatched.
    LevelStarted { index: usize, steps: Vec<String> },
    /// A step handler started.
    StepStarted { name: String },
    StepCompleted { name: String, duration: Duration },
    StepFailed {
        name: String,
        error: String,
        required: bool,
        duration: Duration,
    },
    StepSkipped { name: String, reason: SkipReason },
    /// Atomic rollback started for these steps, in compensation order.
    RollbackStarted { steps: Vec<String> },
    /// One compensation finished.
    RollbackStep { name: String, error: Option<String> },
    RunFinished { success: bool, duration: Duration },
}

/// Optional event channel.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<RunEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn emitted_events_arrive_in_order() {
        let (tx, rx) = mpsc::channel();
        let sink = EventSink::new(tx);
        sink.emit(RunEvent::StepStarted { name: "a".into() });
        sink.emit(RunEvent::StepStarted { name: "b".into() });
        drop(sink);

        let names: Vec<_> = rx
            .iter()
            .map(|e| match e {
                RunEvent::StepStarted { name } => name,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn emitting_without_receiver_is_harmless() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        EventSink::new(tx).emit(RunEvent::PlanReady { total: 1, levels: 1 });
        EventSink::disabled().emit(RunEvent::PlanReady { total: 1, levels: 1 });
    }
}
