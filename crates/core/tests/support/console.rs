//! Console that keeps every line in memory

use parking_lot::Mutex;
use retryflow_core::RunConsole;
use retryflow_domain::constants::RETRY_NOTICE;
use retryflow_domain::ConstructId;

#[derive(Default)]
pub struct BufferedConsole {
    lines: Mutex<Vec<String>>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of retry notices written so far
    pub fn notices(&self) -> usize {
        self.lines.lock().iter().filter(|line| line.as_str() == RETRY_NOTICE).count()
    }
}

impl RunConsole for BufferedConsole {
    fn write_line(&self, _construct_id: ConstructId, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
