//! Output sink for module bodies

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

use crate::module::CanonicalKey;

/// Where `console.log` output goes
pub trait Console: Send + Sync {
    fn log(&self, module: &CanonicalKey, text: &str);
}

/// Writes each line to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn log(&self, _module: &CanonicalKey, text: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        // A closed stdout is not the module's failure
        let _ = writeln!(handle, "{}", text);
    }
}

/// Collects lines in memory
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Console for BufferConsole {
    fn log(&self, _module: &CanonicalKey, text: &str) {
        self.lines.lock().push(text.to_string());
    }
}
