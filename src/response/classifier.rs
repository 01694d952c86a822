use crate::operation::OperationMode;

/// Highest HTTP status code still treated as success.
pub const SUCCESS_STATUS_CEILING: u16 = 201;

/// Branch a buffered response is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Body is a plugin archive to extract.
    ExportSuccess,
    /// Body is an envelope carrying hard failures.
    ExportFailure,
    /// Body is an envelope whose own status still has to be checked.
    ClearSuccess,
    ClearFailure,
}

impl Outcome {
    pub fn is_transport_success(&self) -> bool {
        matches!(self, Outcome::ExportSuccess | Outcome::ClearSuccess)
    }
}

pub fn is_success_status(status_code: u16) -> bool {
    status_code <= SUCCESS_STATUS_CEILING
}

/// Chooses the branch from the transport status alone; the mode only picks export or clear.
pub fn classify(status_code: u16, mode: OperationMode) -> Outcome {
    match (is_success_status(status_code), mode) {
        (true, OperationMode::Export) => Outcome::ExportSuccess,
        (false, OperationMode::Export) => Outcome::ExportFailure,
        (true, OperationMode::Clear) => Outcome::ClearSuccess,
        (false, OperationMode::Clear) => Outcome::ClearFailure,
    }
}
