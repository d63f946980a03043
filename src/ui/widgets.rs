#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Running,
    Done,
    Failed,
}

impl StepState {
    pub fn finished(ok: bool) -> Self {
        if ok {
            StepState::Done
        } else {
            StepState::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    pub title: String,
    pub body: String,
    pub hint: Option<String>,
}

impl MessageBlock {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
