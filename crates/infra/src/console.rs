//! Run console adapters

use parking_lot::Mutex;
use retryflow_core::RunConsole;
use retryflow_domain::ConstructId;
use tracing::info;

/// Forwards console lines to `tracing` under the `retryflow::console` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl RunConsole for TracingConsole {
    fn write_line(&self, construct_id: ConstructId, line: &str) {
        info!(target: "retryflow::console", construct_id = %construct_id, "{line}");
    }
}

/// Keeps console lines in memory, grouped by construct
#[derive(Debug, Default)]
pub struct BufferedConsole {
    lines: Mutex<Vec<(ConstructId, String)>>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written for `id`, in order
    pub fn lines_for(&self, id: ConstructId) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// The console text for `id` as one newline-joined string
    pub fn transcript(&self, id: ConstructId) -> String {
        self.lines_for(id).join("\n")
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl RunConsole for BufferedConsole {
    fn write_line(&self, construct_id: ConstructId, line: &str) {
        self.lines.lock().push((construct_id, line.to_string()));
    }
}
