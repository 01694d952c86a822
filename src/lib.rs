pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod operation;
pub mod request;
pub mod response;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, OutputConfig, ServerConfig, TransportProtocol};
pub use error::{PluginExportError, Result, UserFriendlyError};
pub use operation::{
    OperationMode, OperationRequest, OperationResult, OperationSuccess, PluginKind, RawResponse,
};

// Core functionality re-exports
pub use extractor::{ArchiveEntry, ArchiveExtractor, ExtractedEntry, ExtractionPlan};
pub use request::{build_request, RequestDescriptor};
pub use response::{classify, Outcome, ServiceResponse};
pub use ui::{ErrorReporter, OutputFormatter, OutputMode, ProgressManager};

use reqwest::header::AUTHORIZATION;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Upper bound on the buffer reserved up front for a response body.
const MAX_PREALLOCATED_BODY: u64 = 8 * 1024 * 1024;

/// Where one operation is in its lifecycle. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Requesting,
    Buffering,
    Classifying,
    Extracting,
    Parsing,
    Terminal,
}

fn enter(phase: Phase, request: &OperationRequest) {
    debug!(?phase, mode = %request.mode, kind = %request.plugin_kind, "operation phase");
}

/// Runs export and clear operations against the plugin server.
pub struct PluginExporter {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
}

impl PluginExporter {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let show_progress = !quiet && output_mode == OutputMode::Human;
        let progress_manager = ProgressManager::new(show_progress);

        Self {
            config,
            output_formatter,
            progress_manager,
        }
    }

    /// Create a PluginExporter from CLI arguments, resolving config files against `working_dir`
    pub fn from_cli(cli_args: &Cli, working_dir: &Path) -> Result<Self> {
        let config = cli_args.load_config(working_dir)?;
        let verbose = cli_args.verbosity_level().max(u8::from(config.server.verbose && !cli_args.quiet));

        Ok(Self::new(
            config,
            cli_args.output_format.into(),
            verbose,
            cli_args.quiet,
        ))
    }

    /// Performs one request/response cycle and returns its single terminal result.
    pub async fn run(&self, request: &OperationRequest) -> OperationResult {
        let start = Instant::now();
        self.output_formatter.start_operation(match request.mode {
            OperationMode::Export => "Exporting plugin",
            OperationMode::Clear => "Clearing plugin",
        });

        let result = self.execute(request).await;

        enter(Phase::Terminal, request);
        debug!(
            success = result.is_ok(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "operation finished"
        );

        result.into()
    }

    /// Runs the operation and hands the result to `completion` exactly once.
    pub async fn run_with<F>(&self, request: &OperationRequest, completion: F)
    where
        F: FnOnce(OperationResult),
    {
        completion(self.run(request).await);
    }

    async fn execute(&self, request: &OperationRequest) -> Result<OperationSuccess> {
        let descriptor = build_request(&self.config.server, request)?;
        let raw = self.fetch(&descriptor, request).await?;
        self.process_response(request, raw)
    }

    /// Issues the request and buffers the whole body in arrival order.
    async fn fetch(&self, descriptor: &RequestDescriptor, request: &OperationRequest) -> Result<RawResponse> {
        enter(Phase::Requesting, request);
        debug!(method = %descriptor.method, url = %descriptor.url, "issuing request");

        let client = descriptor
            .client()
            .map_err(|e| self.network_failure(request, e))?;

        let mut response = client
            .request(descriptor.method.clone(), descriptor.url.clone())
            .header(AUTHORIZATION, descriptor.authorization_header())
            .send()
            .await
            .map_err(|e| self.network_failure(request, e))?;

        enter(Phase::Buffering, request);
        let status_code = response.status().as_u16();
        let content_length = response.content_length();
        let progress = self
            .progress_manager
            .create_download_progress(content_length, "Receiving response");
        let started = Instant::now();

        // Content-Length is only a hint from the server.
        let mut body = Vec::with_capacity(
            content_length.map_or(0, |n| n.min(MAX_PREALLOCATED_BODY) as usize),
        );
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    progress.abandon();
                    return Err(self.network_failure(request, e));
                }
            };
            body.extend_from_slice(&chunk);
            progress.inc(chunk.len() as u64);
        }

        ui::progress::finish_progress_with_summary(
            &progress,
            &format!("Received {} bytes", body.len()),
            started.elapsed(),
        );
        self.progress_manager.clear();
        debug!(status_code, bytes = body.len(), "response buffered");

        Ok(RawResponse::new(status_code, body))
    }

    fn network_failure(&self, request: &OperationRequest, source: reqwest::Error) -> PluginExportError {
        let error = PluginExportError::Network {
            kind: request.plugin_kind,
            mode: request.mode,
            source,
        };
        ErrorReporter::new(&self.output_formatter).report_request_error(&error);
        error
    }

    /// Classifies a fully buffered response and routes it to extraction or envelope parsing.
    ///
    /// Every error raised while handling the body comes back as a single per-mode
    /// processing failure; server-reported failures are returned as they are.
    pub fn process_response(&self, request: &OperationRequest, raw: RawResponse) -> Result<OperationSuccess> {
        enter(Phase::Classifying, request);
        let outcome = classify(raw.status_code, request.mode);
        debug!(
            status_code = raw.status_code,
            ?outcome,
            transport_success = outcome.is_transport_success(),
            "response classified"
        );

        let processed = match outcome {
            Outcome::ExportSuccess => self.write_archive(request, &raw.body),
            Outcome::ClearSuccess => self.complete_clear(request, &raw),
            Outcome::ExportFailure | Outcome::ClearFailure => self.report_service_failure(request, &raw),
        };

        processed.map_err(|e| self.processing_failure(request, raw.status_code, e))
    }

    fn write_archive(&self, request: &OperationRequest, archive: &[u8]) -> Result<OperationSuccess> {
        enter(Phase::Extracting, request);
        let output_base = request.output_base();
        debug!(
            "writing {} plugin out to {}",
            request.plugin_kind,
            output_base.display()
        );

        let notify = |entry: &ExtractedEntry| {
            self.output_formatter.detail(&format!(
                "downloading {} > {}",
                entry.entry_name,
                entry.destination_dir.display()
            ));
        };
        let on_entry: Option<&dyn Fn(&ExtractedEntry)> = if request.verbose {
            Some(&notify)
        } else {
            None
        };

        let written_files = ArchiveExtractor::new().extract(archive, output_base, on_entry)?;

        let message = format!("{} plugin downloaded successfully", request.plugin_kind);
        self.output_formatter.success(&message);

        Ok(OperationSuccess {
            message,
            touched_paths: None,
            written_files,
        })
    }

    /// Transport said success; the envelope's own status still decides.
    fn complete_clear(&self, request: &OperationRequest, raw: &RawResponse) -> Result<OperationSuccess> {
        enter(Phase::Parsing, request);
        let response = crate::response::envelope::parse(&raw.body)?;
        let reporter = ErrorReporter::new(&self.output_formatter);

        if response.is_clear_failed() {
            reporter.report_hard_failures(&response, &request.scenario());
            return Err(service_failure(request, raw.status_code, &response));
        }

        reporter.report_soft_failures(&response);

        if request.verbose {
            for touched_path in &response.touched_paths {
                self.output_formatter.detail(&format!("cleared {}", touched_path));
            }
        }

        let message = format!("{} plugin cleared successfully", request.plugin_kind);
        self.output_formatter.success(&message);

        Ok(OperationSuccess {
            message,
            touched_paths: Some(response.touched_paths),
            written_files: Vec::new(),
        })
    }

    fn report_service_failure(&self, request: &OperationRequest, raw: &RawResponse) -> Result<OperationSuccess> {
        enter(Phase::Parsing, request);
        let reporter = ErrorReporter::new(&self.output_formatter);
        reporter.report_status_code(raw.status_code);

        let response = crate::response::envelope::parse(&raw.body)?;
        reporter.report_hard_failures(&response, &request.scenario());

        Err(service_failure(request, raw.status_code, &response))
    }

    fn processing_failure(
        &self,
        request: &OperationRequest,
        status_code: u16,
        error: PluginExportError,
    ) -> PluginExportError {
        if matches!(error, PluginExportError::ServiceFailure { .. }) {
            return error;
        }

        ErrorReporter::new(&self.output_formatter).report_processing_error(&error.to_string());

        PluginExportError::Processing {
            kind: request.plugin_kind,
            mode: request.mode,
            status_code,
            source: Box::new(error),
        }
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get output formatter reference
    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &PluginExportError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

fn service_failure(request: &OperationRequest, status_code: u16, response: &ServiceResponse) -> PluginExportError {
    PluginExportError::ServiceFailure {
        kind: request.plugin_kind,
        mode: request.mode,
        status_code,
        status: response.status.clone(),
        failures: response.hard_failure_messages(),
    }
}
