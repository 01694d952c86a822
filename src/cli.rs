use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::operation::{OperationMode, OperationRequest, PluginKind};
use crate::ui::OutputMode;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "plugin-export")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Export or clear server-generated plugin bundles")]
#[command(
    long_about = "plugin-export downloads the plugin bundle generated by the server and \
                  extracts it locally, or asks the server to clear its generated plugins."
)]
#[command(after_help = "EXAMPLES:\n  \
    plugin-export --server-url http://localhost:8080 --token $TOKEN\n  \
    plugin-export --plugin-type studio --output-dir ./studio-plugins --verbose\n  \
    plugin-export --plugin-point toolbar --plugin-point menu --strict-mode\n  \
    plugin-export --clear --verbose\n  \
    plugin-export --config my-server.toml --dry-run")]
pub struct Cli {
    /// Kind of plugin to export or clear
    #[arg(short = 't', long, value_enum, default_value_t = PluginKind::Sdk)]
    pub plugin_type: PluginKind,

    /// Clear the server's generated plugins instead of exporting them
    #[arg(long)]
    pub clear: bool,

    /// Directory to write exported plugins to (defaults to the current directory)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Plugin points to export (repeatable)
    #[arg(short = 'p', long = "plugin-point", value_delimiter = ',')]
    pub plugin_points: Vec<String>,

    /// Server base URL
    #[arg(long, help = "Server base URL (e.g. http://localhost:8080)")]
    pub server_url: Option<String>,

    /// Server community
    #[arg(long)]
    pub community: Option<String>,

    /// Plugin token sent as a bearer credential
    #[arg(long, env = "PLUGIN_EXPORT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Ask the server to run in strict mode
    #[arg(long)]
    pub strict_mode: bool,

    /// Server uses https with a self-signed certificate
    #[arg(long)]
    pub https: bool,

    /// Request timeout in seconds
    #[arg(long, help = "Timeout for the server request (seconds)")]
    pub timeout: Option<u64>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit debug diagnostics on stderr
    #[arg(long)]
    pub debug: bool,

    /// Dry run (show the request without sending it)
    #[arg(long, help = "Show the request that would be sent without sending it")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl From<OutputFormat> for OutputMode {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        }
    }
}

impl Cli {
    pub fn load_config(&self, working_dir: &Path) -> Result<Config> {
        let config_path = self.config.as_ref().map(|p| resolve(p, working_dir));
        let mut config = Config::load_with_defaults(config_path, working_dir)?;

        let overrides = self.create_cli_overrides(working_dir);
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self, working_dir: &Path) -> CliOverrides {
        CliOverrides::new()
            .with_server_url(self.server_url.clone())
            .with_community(self.community.clone())
            .with_token(self.token.clone())
            .with_strict_mode(self.strict_mode)
            .with_https(self.https)
            .with_timeout(self.timeout)
            .with_output_dir(self.output_dir.as_ref().map(|o| resolve(o, working_dir)))
    }

    pub fn mode(&self) -> OperationMode {
        if self.clear {
            OperationMode::Clear
        } else {
            OperationMode::Export
        }
    }

    /// Builds the request for this invocation. Relative output paths resolve against `working_dir`.
    pub fn operation_request(&self, config: &Config, working_dir: &Path) -> OperationRequest {
        let output_directory = config
            .output
            .directory
            .as_ref()
            .map(|dir| resolve(dir, working_dir));

        OperationRequest::new(self.mode(), self.plugin_type, working_dir.to_path_buf())
            .with_output_directory(output_directory)
            .with_verbose(self.is_verbose() || (config.server.verbose && !self.quiet))
            .with_plugin_points(
                self.plugin_points
                    .iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            )
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose > 0 && !self.quiet
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

fn resolve(path: &Path, working_dir: &Path) -> PathBuf {
    if path.is_absolute() || path.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}
