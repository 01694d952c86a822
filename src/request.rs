use crate::config::ServerConfig;
use crate::error::{PluginExportError, Result};
use crate::operation::{OperationMode, OperationRequest};
use reqwest::Method;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const PLUGINS_BASE_PATH: &str = "/restapi/ldntool/plugins";

/// Fully formed HTTP request for one operation.
#[derive(Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub bearer_token: String,
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("bearer_token", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RequestDescriptor {
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.bearer_token)
    }

    pub fn client(&self) -> std::result::Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .timeout(self.timeout)
            .build()
    }
}

/// Derives method, URL, auth header and TLS policy from server settings.
pub fn build_request(server: &ServerConfig, request: &OperationRequest) -> Result<RequestDescriptor> {
    let token = server
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(PluginExportError::MissingToken)?;

    let url = build_url(server, request)?;

    let method = match request.mode {
        OperationMode::Clear => Method::POST,
        OperationMode::Export => Method::GET,
    };

    Ok(RequestDescriptor {
        method,
        url,
        bearer_token: token.to_string(),
        accept_invalid_certs: server.accept_invalid_certs(),
        timeout: server.timeout_duration(),
    })
}

pub fn build_url(server: &ServerConfig, request: &OperationRequest) -> Result<Url> {
    let mut raw = server.url.trim_end_matches('/').to_string();

    if let Some(community) = server.community() {
        raw.push('/');
        raw.push_str(community);
    }

    raw.push_str(PLUGINS_BASE_PATH);
    raw.push('/');
    raw.push_str(&request.plugin_kind.to_string());

    if request.mode == OperationMode::Clear {
        raw.push_str("/clear");
    }

    let mut url = Url::parse(&raw).map_err(|_| PluginExportError::InvalidUrl { url: raw.clone() })?;

    {
        let mut query = url.query_pairs_mut();

        if server.strict_mode {
            query.append_pair("lar.strict_mode", "true");
        }

        if request.mode == OperationMode::Clear && (request.verbose || server.verbose) {
            query.append_pair("lar.verbose", "true");
        }

        for plugin_point in &request.plugin_points {
            query.append_pair("plugin_point", plugin_point);
        }
    }

    // An empty query leaves a dangling '?'.
    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}
