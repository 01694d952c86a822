use crate::error::{PluginExportError, Result};
use roxmltree::{Document, Node};
use serde::Serialize;

/// Root element every service response is wrapped in.
pub const ENVELOPE_ROOT: &str = "service-response";

/// Status the server reports when a clear request was accepted but did not go through.
pub const CLEAR_FAILED_STATUS: &str = "CLEAR_FAILED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceFailure {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceResponse {
    pub status: Option<String>,
    pub hard_failures: Vec<ServiceFailure>,
    pub soft_failures: Vec<ServiceFailure>,
    pub touched_paths: Vec<String>,
}

impl ServiceResponse {
    pub fn is_clear_failed(&self) -> bool {
        self.status.as_deref() == Some(CLEAR_FAILED_STATUS)
    }

    pub fn hard_failure_messages(&self) -> Vec<String> {
        self.hard_failures.iter().map(|f| f.message.clone()).collect()
    }
}

/// Decodes an XML service-response envelope.
///
/// Repeated elements form lists and a single element is a list of one, so
/// `touched-paths` and the failure records come out as ordered sequences no
/// matter how many the server sent.
pub fn parse(body: &[u8]) -> Result<ServiceResponse> {
    let text = std::str::from_utf8(body).map_err(|e| PluginExportError::Envelope {
        reason: format!("body is not valid UTF-8: {}", e),
    })?;

    let document = Document::parse(text)?;
    let root = document.root_element();

    if root.tag_name().name() != ENVELOPE_ROOT {
        return Err(PluginExportError::Envelope {
            reason: format!(
                "expected <{}> root element, found <{}>",
                ENVELOPE_ROOT,
                root.tag_name().name()
            ),
        });
    }

    let mut response = ServiceResponse::default();

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "status" => response.status = non_empty(text_of(child)),
            "hard-failures" | "hard-failure" => {
                response.hard_failures.extend(failure_records(child));
            }
            "soft-failures" | "soft-failure" => {
                response.soft_failures.extend(failure_records(child));
            }
            "touched-paths" | "touched-path" => {
                response.touched_paths.extend(touched_paths(child));
            }
            _ => {}
        }
    }

    Ok(response)
}

/// Each `<message>` child is one record. Otherwise nested elements are records, else the bare text is.
fn failure_records(node: Node) -> Vec<ServiceFailure> {
    let elements: Vec<Node> = node.children().filter(Node::is_element).collect();

    let messages: Vec<Node> = elements
        .iter()
        .copied()
        .filter(|n| n.tag_name().name() == "message")
        .collect();

    if !messages.is_empty() {
        return messages
            .into_iter()
            .filter_map(|n| non_empty(text_of(n)))
            .map(|message| ServiceFailure { message })
            .collect();
    }

    if !elements.is_empty() {
        return elements.into_iter().flat_map(failure_records).collect();
    }

    non_empty(text_of(node))
        .map(|message| ServiceFailure { message })
        .into_iter()
        .collect()
}

fn touched_paths(node: Node) -> Vec<String> {
    let mut elements = node.children().filter(Node::is_element).peekable();

    if elements.peek().is_none() {
        return non_empty(text_of(node)).into_iter().collect();
    }

    elements.filter_map(|n| non_empty(text_of(n))).collect()
}

fn text_of(node: Node) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
