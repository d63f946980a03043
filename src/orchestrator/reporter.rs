use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    StaticAnalysis,
    TargetDetection,
    NativeTests,
    Coverage,
    HarnessInstall,
    CrossTests,
    TimeoutSearch,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::StaticAnalysis => "static analysis",
            Phase::TargetDetection => "cross target detection",
            Phase::NativeTests => "native tests",
            Phase::Coverage => "coverage",
            Phase::HarnessInstall => "wasm harness install",
            Phase::CrossTests => "wasm tests",
            Phase::TimeoutSearch => "timeout culprit search",
        }
    }
}

/// Caller-facing sink for phase progress and filtered test output.
///
/// Phase 1 reports from two threads at once, so implementations must be `Sync`.
pub trait Reporter: Send + Sync {
    fn phase_started(&self, phase: Phase);
    fn phase_finished(&self, phase: Phase, ok: bool);
    fn line(&self, line: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Started(Phase),
    Finished(Phase, bool),
    Line(String),
}

/// Records every event; used by tests and by callers that render after the run.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl CollectingReporter {
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Reporter for CollectingReporter {
    fn phase_started(&self, phase: Phase) {
        self.record(ReportEvent::Started(phase));
    }

    fn phase_finished(&self, phase: Phase, ok: bool) {
        self.record(ReportEvent::Finished(phase, ok));
    }

    fn line(&self, line: &str) {
        self.record(ReportEvent::Line(line.to_owned()));
    }
}
