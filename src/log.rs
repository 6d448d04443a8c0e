//! Logging sink abstraction.
//!
//! The Dependency Scanner and Assembler report progress and non-fatal
//! warnings through a small trait rather than calling `tracing` macros
//! directly, so tests can assert on captured output without installing a
//! global subscriber.

/// A logger sink with the two severities the core ever needs.
pub trait BuildLog: Send + Sync {
    /// Informational progress, e.g. a dependency summary.
    fn printf(&self, msg: &str);
    /// A non-fatal problem: missing SONAME, pkg-config parse failure, etc.
    fn warnf(&self, msg: &str);
}

/// Forwards to the `tracing` crate. The default sink for real builds.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl BuildLog for TracingLog {
    fn printf(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn warnf(&self, msg: &str) {
        tracing::warn!("{msg}");
    }
}

/// Discards everything. Useful in unit tests that don't assert on logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl BuildLog for NullLog {
    fn printf(&self, _msg: &str) {}
    fn warnf(&self, _msg: &str) {}
}

/// Captures lines in memory. Useful in tests that *do* assert on logging.
#[derive(Debug, Default)]
pub struct CapturingLog {
    pub info: std::sync::Mutex<Vec<String>>,
    pub warn: std::sync::Mutex<Vec<String>>,
}

impl BuildLog for CapturingLog {
    fn printf(&self, msg: &str) {
        self.info.lock().unwrap().push(msg.to_string());
    }

    fn warnf(&self, msg: &str) {
        self.warn.lock().unwrap().push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_log_records_both_severities() {
        let log = CapturingLog::default();
        log.printf("hello");
        log.warnf("careful");
        assert_eq!(log.info.lock().unwrap().as_slice(), ["hello".to_string()]);
        assert_eq!(log.warn.lock().unwrap().as_slice(), ["careful".to_string()]);
    }
}
