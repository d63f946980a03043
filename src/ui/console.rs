use std::io::Write;
use std::sync::Mutex;

use anstream::AutoStream;
use tracing::debug;

use crate::orchestrator::{Phase, Reporter};
use crate::ui::plain_renderer::PlainRenderer;
use crate::ui::renderer::{Renderer, SpinnerHandle, UiResult};
use crate::ui::theme::OutputMode;
use crate::ui::widgets::StepState;

struct ConsoleState<W: Write> {
    renderer: PlainRenderer<W>,
    spinners: Vec<(Phase, Box<dyn SpinnerHandle>)>,
    show_steps: bool,
}

/// Reports phases as spinners on a terminal and as step lines otherwise. Filtered test
/// output is printed as it arrives.
pub struct ConsoleReporter<W: Write + Send> {
    state: Mutex<ConsoleState<W>>,
}

impl<W: Write + Send> ConsoleReporter<W> {
    /// Without progress bars, phase steps are only printed when `show_steps` is set.
    pub fn new(renderer: PlainRenderer<W>, show_steps: bool) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                renderer,
                spinners: Vec::new(),
                show_steps,
            }),
        }
    }

    pub fn into_renderer(self) -> Option<PlainRenderer<W>> {
        self.state.into_inner().ok().map(|state| state.renderer)
    }

    fn with_state<F>(&self, action: F)
    where
        F: FnOnce(&mut ConsoleState<W>) -> UiResult<()>,
    {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Err(error) = action(&mut *state) {
            debug!(error = %error, "console reporter write failed");
        }
    }
}

impl ConsoleReporter<AutoStream<std::io::Stderr>> {
    pub fn stderr(mode: OutputMode, verbose: bool) -> Self {
        Self::new(PlainRenderer::stderr(mode), verbose)
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn phase_started(&self, phase: Phase) {
        self.with_state(|state| {
            if !state.renderer.progress_enabled() && !state.show_steps {
                return Ok(());
            }
            let spinner = state.renderer.spinner(phase.label())?;
            state.spinners.push((phase, spinner));
            Ok(())
        });
    }

    fn phase_finished(&self, phase: Phase, ok: bool) {
        self.with_state(|state| {
            let Some(index) = state.spinners.iter().position(|(owner, _)| *owner == phase) else {
                return Ok(());
            };
            let (_, spinner) = state.spinners.remove(index);
            if ok {
                spinner.finish_success(phase.label());
            } else {
                spinner.finish_error(phase.label());
            }
            if state.renderer.progress_enabled() {
                return Ok(());
            }
            state.renderer.step(phase.label(), StepState::finished(ok))
        });
    }

    fn line(&self, line: &str) {
        self.with_state(|state| state.renderer.text(line));
    }
}
