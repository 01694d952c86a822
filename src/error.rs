use crate::operation::{OperationMode, PluginKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginExportError {
    #[error("{kind} plugin {mode} request failed: {source}")]
    Network {
        kind: PluginKind,
        mode: OperationMode,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} plugin {mode} failed")]
    ServiceFailure {
        kind: PluginKind,
        mode: OperationMode,
        status_code: u16,
        status: Option<String>,
        failures: Vec<String>,
    },

    #[error("{kind} plugin {} failed", .mode.processing_verb())]
    Processing {
        kind: PluginKind,
        mode: OperationMode,
        status_code: u16,
        #[source]
        source: Box<PluginExportError>,
    },

    #[error("Malformed service response: {reason}")]
    Envelope { reason: String },

    #[error("Invalid plugin archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive entry escapes the output directory: {entry}")]
    UnsafeEntryPath { entry: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid server URL: {url}")]
    InvalidUrl { url: String },

    #[error("No plugin token configured")]
    MissingToken,
}

impl PluginExportError {
    /// The error that caused a processing failure, or `self` for every other variant.
    pub fn root_cause(&self) -> &PluginExportError {
        match self {
            PluginExportError::Processing { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for PluginExportError {
    fn user_message(&self) -> String {
        match self {
            PluginExportError::Network { kind, mode, source } => {
                format!("Could not reach the server to {} the {} plugin: {}", mode, kind, source)
            }
            PluginExportError::ServiceFailure { failures, .. } if !failures.is_empty() => {
                format!("{} ({} reported by the server)", self, failures.len())
            }
            PluginExportError::Processing { source, .. } => {
                format!("{}: {}", self, source)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            PluginExportError::Network { .. } => Some(
                "Check that the server URL is correct and the server is running, then try again.".to_string()
            ),
            PluginExportError::ServiceFailure { status_code, .. } if *status_code == 401 || *status_code == 403 => Some(
                "The server rejected the plugin token. Set a valid token with --token or PLUGIN_EXPORT_TOKEN.".to_string()
            ),
            PluginExportError::Processing { mode: OperationMode::Export, .. } => Some(
                "Make sure the output directory is writable. Re-run with --verbose to see each extracted entry.".to_string()
            ),
            PluginExportError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            PluginExportError::InvalidUrl { .. } => Some(
                "Provide an http:// or https:// server URL, e.g. --server-url http://localhost:8080".to_string()
            ),
            PluginExportError::MissingToken => Some(
                "Pass --token, set PLUGIN_EXPORT_TOKEN, or add `token` to the [server] section of the configuration file.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<roxmltree::Error> for PluginExportError {
    fn from(error: roxmltree::Error) -> Self {
        PluginExportError::Envelope {
            reason: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginExportError>;
