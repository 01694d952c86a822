use crate::error::PluginExportError;
use crate::response::ServiceResponse;
use crate::ui::OutputFormatter;
use tracing::{debug, warn};

/// Reports every failure record the server sent before the terminal result is produced.
pub struct ErrorReporter<'a> {
    formatter: &'a OutputFormatter,
}

impl<'a> ErrorReporter<'a> {
    pub fn new(formatter: &'a OutputFormatter) -> Self {
        Self { formatter }
    }

    /// Returns how many records were reported.
    pub fn report_hard_failures(&self, response: &ServiceResponse, scenario: &str) -> usize {
        for failure in &response.hard_failures {
            warn!(scenario, "hard failure: {}", failure.message);
            self.formatter
                .error(&format!("[{}] {}", scenario, failure.message));
        }

        if response.hard_failures.is_empty() {
            debug!(scenario, status = ?response.status, "server reported no hard failure records");
        }

        response.hard_failures.len()
    }

    /// Soft failures are informational and never fail an operation.
    pub fn report_soft_failures(&self, response: &ServiceResponse) -> usize {
        for failure in &response.soft_failures {
            debug!("soft failure: {}", failure.message);
            self.formatter.warning(&failure.message);
        }

        response.soft_failures.len()
    }

    pub fn report_status_code(&self, status_code: u16) {
        self.formatter
            .error(&format!("Server responded with status code {}", status_code));
    }

    pub fn report_processing_error(&self, cause: &str) {
        self.formatter.error(cause);
    }

    /// Logs a transport failure. The operation fails with `error` itself.
    pub fn report_request_error(&self, error: &PluginExportError) {
        warn!("request error: {:?}", error);
        self.formatter.error(&error.to_string());
    }
}
