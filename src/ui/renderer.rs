use crate::ui::widgets::{MessageBlock, NoticeLevel, StepState};

pub type UiResult<T> = Result<T, UiError>;

#[derive(Debug, thiserror::Error)]
pub enum UiError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub trait SpinnerHandle: Send + Sync {
    fn set_message(&self, message: &str);
    fn finish_success(&self, message: &str);
    fn finish_error(&self, message: &str);
}

pub trait Renderer {
    /// Writes `body` verbatim, adding a trailing newline when missing.
    fn text(&mut self, body: &str) -> UiResult<()>;
    fn notice(&mut self, level: NoticeLevel, body: &str) -> UiResult<()>;

    fn success_block(&mut self, block: &MessageBlock) -> UiResult<()>;
    fn error_block(&mut self, block: &MessageBlock) -> UiResult<()>;

    fn step(&mut self, label: &str, state: StepState) -> UiResult<()>;
    fn spinner(&mut self, label: &str) -> UiResult<Box<dyn SpinnerHandle>>;
}
