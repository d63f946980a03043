//! Streaming classifier that compacts test-runner output down to actionable diagnostics.
//!
//! Output is fed in arbitrary chunks through [`ConsoleFilter::add`]. Complete lines are run
//! through the ordered rule table in [`rules`]; anything not claimed by a rule is held back
//! until a top-level result marker or [`ConsoleFilter::flush`] decides it is worth showing.
//! Held-back blocks that end in a passing test marker are discarded.

pub mod rules;

use rules::{classify, passed_test, shorten_frame, started_test, RuleAction, RACE_BANNER};

#[derive(Debug, Default)]
pub struct ConsoleFilter {
    pending: String,
    held: Vec<String>,
    emitted: Vec<String>,
    race_detected: bool,
    race_reported: bool,
    panic_mode: bool,
}

impl ConsoleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests a chunk of raw output. The chunk need not end on a line boundary.
    pub fn add(&mut self, chunk: &str) {
        self.pending.push_str(chunk);
        let Some(last_newline) = self.pending.rfind('\n') else {
            return;
        };
        let complete = self.pending[..last_newline].to_owned();
        self.pending.drain(..=last_newline);
        for line in complete.split('\n') {
            self.process_line(line.strip_suffix('\r').unwrap_or(line));
        }
    }

    /// Finalizes the stream: the trailing partial line is processed, held-back lines are
    /// emitted, and the race banner is emitted once if any race was seen.
    pub fn flush(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.process_line(line.strip_suffix('\r').unwrap_or(&line));
        }
        self.flush_held();
        if self.race_detected && !self.race_reported {
            self.race_reported = true;
            self.emitted.push(RACE_BANNER.to_owned());
        }
    }

    /// Removes and returns the lines emitted since the last call.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.emitted)
    }

    pub fn emitted(&self) -> &[String] {
        &self.emitted
    }

    pub fn held(&self) -> &[String] {
        &self.held
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn race_detected(&self) -> bool {
        self.race_detected
    }

    pub fn panic_mode(&self) -> bool {
        self.panic_mode
    }

    fn process_line(&mut self, line: &str) {
        if self.panic_mode {
            self.emitted.push(line.to_owned());
            return;
        }

        match classify(line).map(|rule| rule.action) {
            Some(RuleAction::EnterPanicMode) => {
                self.flush_held();
                self.panic_mode = true;
                self.emitted.push(line.to_owned());
            }
            Some(RuleAction::Emit) => self.emitted.push(line.to_owned()),
            Some(RuleAction::MarkRace) => self.race_detected = true,
            Some(RuleAction::Drop) => {}
            Some(RuleAction::ShortenFrame) => self.held.push(shorten_frame(line)),
            Some(RuleAction::FlushAndDrop) => self.flush_held(),
            None => {
                self.held.push(line.to_owned());
                if let Some(name) = passed_test(line) {
                    let name = name.to_owned();
                    self.remove_passing_test_logs(&name);
                }
            }
        }
    }

    fn flush_held(&mut self) {
        self.emitted.append(&mut self.held);
    }

    /// Drops the block belonging to a test that just passed. The passed marker is the last
    /// held line when this runs.
    fn remove_passing_test_logs(&mut self, name: &str) {
        let passed_at = self.held.len() - 1;
        let nested_prefix = format!("{name}/");
        let mut interleaved = false;
        let mut started_at: Option<usize> = None;

        for index in (0..passed_at).rev() {
            let Some(started) = started_test(&self.held[index]) else {
                continue;
            };
            if started == name {
                started_at = Some(index);
                break;
            }
            if !started.starts_with(&nested_prefix) {
                interleaved = true;
            }
        }

        match (started_at, interleaved) {
            (Some(start), false) => self.held.truncate(start),
            (Some(start), true) => {
                self.held.remove(passed_at);
                self.held.remove(start);
            }
            (None, _) => {
                self.held.remove(passed_at);
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/filter_tests.rs"]
mod tests;
