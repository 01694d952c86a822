use crate::error::{PluginExportError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// File names looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["plugin-export.toml", ".plugin-export.toml"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub community: Option<String>,
    pub plugin_upload_protocol: TransportProtocol,
    pub strict_mode: bool,
    pub verbose: bool,
    pub timeout: u64,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where exported plugins are written. Blank or absent means the working directory.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Http,
    Https,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            community: None,
            plugin_upload_protocol: TransportProtocol::Http,
            strict_mode: false,
            verbose: false,
            timeout: 300, // 5 minutes
            token: None,
        }
    }
}

impl ServerConfig {
    /// The server's https deployments use self-signed certificates.
    pub fn accept_invalid_certs(&self) -> bool {
        self.plugin_upload_protocol == TransportProtocol::Https
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn community(&self) -> Option<&str> {
        self.community
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PluginExportError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PluginExportError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| PluginExportError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    /// Loads `config_path` if given, else the first default file found in `search_dir`, else defaults.
    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>, search_dir: &Path) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                for default_name in &DEFAULT_CONFIG_FILES {
                    let candidate = search_dir.join(default_name);
                    if candidate.exists() {
                        return Self::load_from_file(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref url) = cli_args.server_url {
            self.server.url = url.clone();
        }

        if let Some(ref community) = cli_args.community {
            self.server.community = Some(community.clone());
        }

        if let Some(ref token) = cli_args.token {
            self.server.token = Some(token.clone());
        }

        if cli_args.strict_mode {
            self.server.strict_mode = true;
        }

        if cli_args.https {
            self.server.plugin_upload_protocol = TransportProtocol::Https;
        }

        if let Some(timeout) = cli_args.timeout {
            self.server.timeout = timeout;
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.directory = Some(output_dir.clone());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server.url).map_err(|_| PluginExportError::InvalidUrl {
            url: self.server.url.clone(),
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(PluginExportError::InvalidUrl {
                url: self.server.url.clone(),
            });
        }

        if self.server.timeout == 0 {
            return Err(PluginExportError::Config {
                message: "Server timeout must be greater than 0".to_string(),
            });
        }

        if let Some(community) = self.server.community() {
            if community.contains('/') {
                return Err(PluginExportError::Config {
                    message: format!("Community name cannot contain '/': {}", community),
                });
            }
        }

        Ok(())
    }

    pub fn create_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.server.community = Some("default".to_string());
        sample_config.output.directory = Some(PathBuf::from("plugins"));
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub community: Option<String>,
    pub token: Option<String>,
    pub strict_mode: bool,
    pub https: bool,
    pub timeout: Option<u64>,
    pub output_dir: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_url(mut self, url: Option<String>) -> Self {
        self.server_url = url;
        self
    }

    pub fn with_community(mut self, community: Option<String>) -> Self {
        self.community = community;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }
}
