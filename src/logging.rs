//! Injectable logging handle
//!
//! Components take a [`Logger`] at construction instead of reaching for a
//! process-wide logger. Without an injected sink, records go to whatever `log`
//! backend the process installed (the node binary uses `env_logger`).

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{Level, Log, Metadata, Record};

#[derive(Clone)]
pub struct Logger {
    sink: Option<Arc<dyn Log>>,
    target: Arc<str>,
}

impl Logger {
    /// Logger writing to the global `log` backend under `target`
    pub fn new(target: &str) -> Self {
        Logger { sink: None, target: Arc::from(target) }
    }

    /// Logger writing only to `sink`
    pub fn with_sink(target: &str, sink: Arc<dyn Log>) -> Self {
        Logger { sink: Some(sink), target: Arc::from(target) }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(&self.target)
            .module_path_static(Some(module_path!()))
            .build();

        match &self.sink {
            Some(sink) => {
                if sink.enabled(record.metadata()) {
                    sink.log(&record);
                }
            }
            None => {
                if level <= log::max_level() {
                    log::logger().log(&record);
                }
            }
        }
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new("powledger")
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("target", &self.target)
            .field("injected", &self.sink.is_some())
            .finish()
    }
}

/// Sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<(Level, String)>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether any record at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Log for MemoryLog {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_sink_receives_records() {
        let sink = Arc::new(MemoryLog::new());
        let logger = Logger::with_sink("chain", sink.clone());
        logger.info(format_args!("accepted block {}", 7));
        logger.warn(format_args!("rejected"));
        assert_eq!(
            sink.records(),
            vec![
                (Level::Info, "accepted block 7".to_string()),
                (Level::Warn, "rejected".to_string())
            ]
        );
        assert!(sink.contains(Level::Info, "block 7"));
    }

    #[test]
    fn test_clones_share_sink() {
        let sink = Arc::new(MemoryLog::new());
        let logger = Logger::with_sink("chain", sink.clone());
        let clone = logger.clone();
        clone.error(format_args!("boom"));
        assert_eq!(sink.records().len(), 1);
        assert_eq!(clone.target(), "chain");
    }

    #[test]
    fn test_global_fallback_does_not_panic() {
        Logger::default().debug(format_args!("no backend installed"));
    }
}
