use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::process_manager::{CommandRunner, CommandSpec, ProcessError, ProcessOutcome};

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&CommandSpec) -> Result<ProcessOutcome, String> + Send + Sync>;

/// Answers commands from a script instead of spawning them. The first matching entry wins;
/// unmatched commands succeed with no output.
pub(crate) struct ScriptedRunner {
    script: Vec<(Matcher, Responder)>,
    programs: BTreeSet<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self {
            script: Vec::new(),
            programs: BTreeSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn respond<F>(mut self, matcher: F, outcome: ProcessOutcome) -> Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        let responder: Responder = Box::new(move |_: &CommandSpec| Ok(outcome.clone()));
        self.script.push((Box::new(matcher), responder));
        self
    }

    /// Like `respond`, but the outcome is computed from the command, which may also touch
    /// the filesystem the way the real tool would.
    pub(crate) fn respond_with<F, R>(mut self, matcher: F, compute: R) -> Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
        R: Fn(&CommandSpec) -> ProcessOutcome + Send + Sync + 'static,
    {
        let responder: Responder = Box::new(move |spec: &CommandSpec| Ok(compute(spec)));
        self.script.push((Box::new(matcher), responder));
        self
    }

    pub(crate) fn fail_spawn<F>(mut self, matcher: F, message: &str) -> Self
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        let message = message.to_owned();
        let responder: Responder = Box::new(move |_: &CommandSpec| Err(message.clone()));
        self.script.push((Box::new(matcher), responder));
        self
    }

    pub(crate) fn with_program(mut self, program: &str) -> Self {
        self.programs.insert(program.to_owned());
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn calls_matching<F>(&self, matcher: F) -> usize
    where
        F: Fn(&CommandSpec) -> bool,
    {
        self.calls().iter().filter(|spec| matcher(spec)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run_streaming(
        &self,
        spec: &CommandSpec,
        _deadline: Option<Duration>,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<ProcessOutcome, ProcessError> {
        self.calls.lock().expect("calls lock").push(spec.clone());
        let scripted = self
            .script
            .iter()
            .find(|(matcher, _)| matcher(spec))
            .map(|(_, responder)| responder(spec))
            .unwrap_or_else(|| Ok(exited(0, "")));
        match scripted {
            Ok(outcome) => {
                // Uneven chunks exercise partial-line handling downstream.
                let bytes = outcome.output.as_bytes();
                let mut start = 0usize;
                while start < bytes.len() {
                    let mut end = (start + 7).min(bytes.len());
                    while !outcome.output.is_char_boundary(end) {
                        end += 1;
                    }
                    on_output(&outcome.output[start..end]);
                    start = end;
                }
                Ok(outcome)
            }
            Err(message) => Err(ProcessError::Spawn {
                command: spec.display(),
                source: std::io::Error::other(message),
            }),
        }
    }

    fn on_path(&self, program: &str) -> bool {
        self.programs.contains(program)
    }
}

pub(crate) fn exited(code: i32, output: &str) -> ProcessOutcome {
    ProcessOutcome {
        output: output.to_owned(),
        code: Some(code),
        diagnostic: format!("exit={code}"),
        deadline_exceeded: false,
        force_killed: false,
    }
}

pub(crate) fn interrupted(output: &str) -> ProcessOutcome {
    ProcessOutcome {
        output: output.to_owned(),
        code: None,
        diagnostic: "signal=2".to_owned(),
        deadline_exceeded: true,
        force_killed: false,
    }
}

/// `go <subcommand>` outside the cross-target environment.
pub(crate) fn native(subcommand: &'static str) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    move |spec| spec.args.first().map(String::as_str) == Some(subcommand) && spec.env.is_empty()
}

/// `go <subcommand>` inside the cross-target environment.
pub(crate) fn cross(subcommand: &'static str) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    move |spec| spec.args.first().map(String::as_str) == Some(subcommand) && !spec.env.is_empty()
}
