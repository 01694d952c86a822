use crate::error::PluginExportError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What the server is asked to do with the plugin bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Export,
    Clear,
}

impl OperationMode {
    /// Verb used in the generic message when the buffered body could not be processed.
    pub fn processing_verb(&self) -> &'static str {
        match self {
            OperationMode::Export => "write",
            OperationMode::Clear => "clear",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Export => write!(f, "export"),
            OperationMode::Clear => write!(f, "clear"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// SDK plugins
    #[default]
    Sdk,
    /// Studio plugins
    Studio,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Sdk => write!(f, "sdk"),
            PluginKind::Studio => write!(f, "studio"),
        }
    }
}

/// Everything one export or clear run needs. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub mode: OperationMode,
    pub plugin_kind: PluginKind,
    pub output_directory: Option<PathBuf>,
    pub working_directory: PathBuf,
    pub verbose: bool,
    pub plugin_points: Vec<String>,
}

impl OperationRequest {
    pub fn new(mode: OperationMode, plugin_kind: PluginKind, working_directory: PathBuf) -> Self {
        Self {
            mode,
            plugin_kind,
            output_directory: None,
            working_directory,
            verbose: false,
            plugin_points: Vec::new(),
        }
    }

    pub fn with_output_directory(mut self, output_directory: Option<PathBuf>) -> Self {
        self.output_directory = output_directory;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_plugin_points(mut self, plugin_points: Vec<String>) -> Self {
        self.plugin_points = plugin_points;
        self
    }

    /// Directory archive entries are written under.
    ///
    /// A blank output directory counts as unset and falls back to the working directory.
    pub fn output_base(&self) -> &Path {
        match self.output_directory {
            Some(ref dir) if !dir.as_os_str().to_string_lossy().trim().is_empty() => dir,
            _ => &self.working_directory,
        }
    }

    /// Label used to tag logged failure records, e.g. `clear-studio-plugin`.
    pub fn scenario(&self) -> String {
        format!("{}-{}-plugin", self.mode, self.plugin_kind)
    }
}

/// Status code and fully buffered body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status_code: u16, body: Vec<u8>) -> Self {
        Self { status_code, body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSuccess {
    pub message: String,
    /// Paths the server reports as cleared. Only set for clear operations.
    pub touched_paths: Option<Vec<String>>,
    pub written_files: Vec<PathBuf>,
}

/// Terminal value of one operation.
#[derive(Debug)]
pub enum OperationResult {
    Success(OperationSuccess),
    Failure(PluginExportError),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    /// Converts into a `Result` for callers that propagate failures with `?`.
    pub fn into_result(self) -> crate::error::Result<OperationSuccess> {
        match self {
            OperationResult::Success(success) => Ok(success),
            OperationResult::Failure(error) => Err(error),
        }
    }
}

impl From<crate::error::Result<OperationSuccess>> for OperationResult {
    fn from(result: crate::error::Result<OperationSuccess>) -> Self {
        match result {
            Ok(success) => OperationResult::Success(success),
            Err(error) => OperationResult::Failure(error),
        }
    }
}
