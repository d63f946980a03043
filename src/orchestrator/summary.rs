use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passing,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceStatus {
    Clean,
    Detected,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Ok,
    Issues,
}

/// Which part of the run a message describes; used to strip messages by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Analysis,
    Tests,
    Race,
    Coverage,
    CrossTarget,
    Timeout,
    SlowTest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub ok: bool,
    pub text: String,
    pub topic: Topic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub test_status: TestStatus,
    pub race_status: RaceStatus,
    pub coverage_percent: String,
    pub analysis_status: AnalysisStatus,
    pub messages: Vec<StatusMessage>,
}

impl Default for StatusSummary {
    fn default() -> Self {
        Self {
            test_status: TestStatus::Passing,
            race_status: RaceStatus::Skipped,
            coverage_percent: "0".to_owned(),
            analysis_status: AnalysisStatus::Ok,
            messages: Vec::new(),
        }
    }
}

impl StatusSummary {
    pub fn push(&mut self, topic: Topic, ok: bool, text: impl Into<String>) {
        self.messages.push(StatusMessage {
            ok,
            text: text.into(),
            topic,
        });
    }

    pub fn strip(&mut self, topic: Topic) {
        self.messages.retain(|message| message.topic != topic);
    }

    /// Updates the coverage message in place so it keeps its position in the list.
    pub fn set_coverage(&mut self, percent: String) {
        let text = format!("coverage {percent}%");
        self.coverage_percent = percent;
        match self
            .messages
            .iter_mut()
            .find(|message| message.topic == Topic::Coverage)
        {
            Some(message) => message.text = text,
            None => self.push(Topic::Coverage, true, text),
        }
    }

    pub fn fail_tests(&mut self) {
        self.test_status = TestStatus::Failed;
    }

    pub fn failed(&self) -> bool {
        self.test_status == TestStatus::Failed || self.analysis_status == AnalysisStatus::Issues
    }

    /// `✅ a, ❌ b (1.2s)` when compact, one message per line when verbose.
    pub fn render(&self, elapsed: Duration, verbose: bool) -> String {
        let lines = self
            .messages
            .iter()
            .map(|message| {
                let marker = if message.ok { "✅" } else { "❌" };
                format!("{marker} {}", message.text)
            })
            .collect::<Vec<String>>();
        let seconds = elapsed.as_secs_f64();
        if verbose {
            let mut rendered = lines.join("\n");
            if !rendered.is_empty() {
                rendered.push('\n');
            }
            rendered.push_str(&format!("elapsed {seconds:.1}s"));
            rendered
        } else {
            format!("{} ({seconds:.1}s)", lines.join(", "))
        }
    }
}
