use std::io::{IsTerminal, Write};

use anstream::{AutoStream, ColorChoice};
use anstyle::Style;
use indicatif::{MultiProgress, ProgressDrawTarget};

use crate::ui::progress::{IndicatifSpinnerHandle, NoopSpinnerHandle};
use crate::ui::renderer::{Renderer, SpinnerHandle, UiResult};
use crate::ui::theme::{is_ci_environment, resolve_color_enabled, OutputMode, Theme};
use crate::ui::widgets::{MessageBlock, NoticeLevel, StepState};

pub struct PlainRenderer<W: Write> {
    writer: W,
    color_enabled: bool,
    progress: Option<MultiProgress>,
    theme: Theme,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(writer: W, color_enabled: bool) -> Self {
        Self {
            writer,
            color_enabled,
            progress: None,
            theme: Theme::default(),
        }
    }

    /// Spinners draw on stderr; while any is live, text goes through the progress bars so
    /// lines are not torn.
    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.progress =
            enabled.then(|| MultiProgress::with_draw_target(ProgressDrawTarget::stderr()));
        self
    }

    pub fn progress_enabled(&self) -> bool {
        self.progress.is_some()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn style_text(&self, style: Style, text: &str) -> String {
        if !self.color_enabled {
            return text.to_owned();
        }
        format!("{}{}{}", style.render(), text, style.render_reset())
    }

    fn write_line(&mut self, line: &str) -> UiResult<()> {
        match &self.progress {
            Some(multi) => multi.println(line)?,
            None => writeln!(self.writer, "{line}")?,
        }
        Ok(())
    }

    fn write_block(&mut self, label: &str, style: Style, block: &MessageBlock) -> UiResult<()> {
        let marker = self.style_text(style, label);
        writeln!(self.writer, "{marker} {}", block.title)?;
        for line in block.body.lines() {
            writeln!(self.writer, "  {line}")?;
        }
        if let Some(hint) = &block.hint {
            let hint_label = self.style_text(self.theme.muted, "hint");
            writeln!(self.writer, "  {hint_label}: {hint}")?;
        }
        Ok(())
    }
}

fn color_choice(mode: OutputMode) -> ColorChoice {
    match mode {
        OutputMode::Auto => ColorChoice::Auto,
        OutputMode::Always => ColorChoice::AlwaysAnsi,
        OutputMode::Never => ColorChoice::Never,
    }
}

impl PlainRenderer<AutoStream<std::io::Stdout>> {
    pub fn stdout(mode: OutputMode) -> Self {
        let stream = AutoStream::new(std::io::stdout(), color_choice(mode));
        let color_enabled = resolve_color_enabled(mode, std::io::stdout().is_terminal());
        Self::new(stream, color_enabled)
    }
}

impl PlainRenderer<AutoStream<std::io::Stderr>> {
    pub fn stderr(mode: OutputMode) -> Self {
        let stream = AutoStream::new(std::io::stderr(), color_choice(mode));
        let color_enabled = resolve_color_enabled(mode, std::io::stderr().is_terminal());
        let progress_enabled = std::io::stderr().is_terminal() && !is_ci_environment();
        Self::new(stream, color_enabled).with_progress_enabled(progress_enabled)
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn text(&mut self, body: &str) -> UiResult<()> {
        for line in body.strip_suffix('\n').unwrap_or(body).split('\n') {
            self.write_line(line)?;
        }
        Ok(())
    }

    fn notice(&mut self, level: NoticeLevel, body: &str) -> UiResult<()> {
        let (label, style) = match level {
            NoticeLevel::Info => ("info", self.theme.accent),
            NoticeLevel::Success => ("ok", self.theme.success),
            NoticeLevel::Warning => ("warn", self.theme.warning),
            NoticeLevel::Error => ("error", self.theme.error),
        };
        let marker = self.style_text(style, "•");
        let label = self.style_text(self.theme.muted, label);
        self.write_line(&format!("{marker} {label}: {body}"))
    }

    fn success_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        self.write_block("[success]", self.theme.success, block)
    }

    fn error_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        self.write_block("[error]", self.theme.error, block)
    }

    fn step(&mut self, label: &str, state: StepState) -> UiResult<()> {
        let (symbol, style) = match state {
            StepState::Running => ("◌", self.theme.accent),
            StepState::Done => ("✓", self.theme.success),
            StepState::Failed => ("✕", self.theme.error),
        };
        let symbol = self.style_text(style, symbol);
        self.write_line(&format!("{symbol} {label}"))
    }

    fn spinner(&mut self, label: &str) -> UiResult<Box<dyn SpinnerHandle>> {
        if let Some(multi) = &self.progress {
            return Ok(Box::new(IndicatifSpinnerHandle::attach(multi, label)));
        }
        self.step(label, StepState::Running)?;
        Ok(Box::new(NoopSpinnerHandle))
    }
}
