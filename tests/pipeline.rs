use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode, Uri},
    Router,
};
use plugin_export::{
    Config, OperationMode, OperationRequest, OperationResult, OutputMode, PluginExportError,
    PluginExporter, PluginKind,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, Clone)]
struct SeenRequest {
    method: Method,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
}

#[derive(Clone)]
struct Scripted {
    status: StatusCode,
    body: Vec<u8>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

async fn respond(
    State(scripted): State<Scripted>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> (StatusCode, Vec<u8>) {
    scripted.seen.lock().unwrap().push(SeenRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });
    (scripted.status, scripted.body.clone())
}

/// Plugin server stand-in that answers every request with one scripted response.
struct TestPluginServer {
    url: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl TestPluginServer {
    async fn spawn(status: u16, body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let router = Router::new().fallback(respond).with_state(Scripted {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            seen: Arc::clone(&seen),
        });

        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            url: format!("http://{addr}"),
            seen,
        }
    }

    fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

fn exporter(server_url: &str) -> PluginExporter {
    let mut config = Config::default();
    config.server.url = server_url.to_string();
    config.server.token = Some("secret".to_string());
    PluginExporter::new(config, OutputMode::Plain, 0, true)
}

fn request(mode: OperationMode, kind: PluginKind, output: &Path) -> OperationRequest {
    OperationRequest::new(mode, kind, PathBuf::from("/nonexistent-working-dir"))
        .with_output_directory(Some(output.to_path_buf()))
}

fn archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn export_downloads_and_extracts_bundle() {
    let body = archive(&[
        ("/toolbar/save/plugin.js", "save()"),
        ("/toolbar/save/plugin.json", "{}"),
        ("/Manifest.MF", "generated"),
    ]);
    let server = TestPluginServer::spawn(200, body).await;
    let output = TempDir::new().unwrap();

    let request = request(OperationMode::Export, PluginKind::Sdk, output.path())
        .with_plugin_points(vec!["toolbar".to_string(), "menu".to_string()]);
    let success = exporter(&server.url).run(&request).await.into_result().unwrap();

    assert_eq!(success.message, "sdk plugin downloaded successfully");
    assert_eq!(
        files_under(output.path()),
        vec![
            PathBuf::from("toolbar/save/plugin.js"),
            PathBuf::from("toolbar/save/plugin.json"),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(output.path().join("toolbar/save/plugin.js")).unwrap(),
        "save()"
    );

    let seen = server.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, Method::GET);
    assert_eq!(seen[0].path, "/restapi/ldntool/plugins/sdk");
    assert_eq!(
        seen[0].query.as_deref(),
        Some("plugin_point=toolbar&plugin_point=menu")
    );
    assert_eq!(seen[0].authorization.as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn export_failure_status_reports_server_failures() {
    let body = br#"<service-response>
        <status>EXPORT_FAILED</status>
        <hard-failures>
            <hard-failure><message>plugin point missing</message></hard-failure>
        </hard-failures>
    </service-response>"#;
    let server = TestPluginServer::spawn(500, body.to_vec()).await;
    let output = TempDir::new().unwrap();

    let result = exporter(&server.url)
        .run(&request(OperationMode::Export, PluginKind::Studio, output.path()))
        .await;

    match result {
        OperationResult::Failure(PluginExportError::ServiceFailure {
            status_code,
            failures,
            ..
        }) => {
            assert_eq!(status_code, 500);
            assert_eq!(failures, vec!["plugin point missing"]);
        }
        other => panic!("expected service failure, got {:?}", other),
    }
    assert!(files_under(output.path()).is_empty());
}

#[tokio::test]
async fn clear_posts_and_returns_touched_paths() {
    let body = br#"<service-response>
        <status>OK</status>
        <touched-paths>
            <touched-path>/plugins/sdk/a.js</touched-path>
            <touched-path>/plugins/sdk/b.js</touched-path>
        </touched-paths>
    </service-response>"#;
    let server = TestPluginServer::spawn(200, body.to_vec()).await;
    let output = TempDir::new().unwrap();

    let request = request(OperationMode::Clear, PluginKind::Sdk, output.path()).with_verbose(true);
    let success = exporter(&server.url).run(&request).await.into_result().unwrap();

    assert_eq!(
        success.touched_paths,
        Some(vec![
            "/plugins/sdk/a.js".to_string(),
            "/plugins/sdk/b.js".to_string()
        ])
    );

    let seen = server.requests();
    assert_eq!(seen[0].method, Method::POST);
    assert_eq!(seen[0].path, "/restapi/ldntool/plugins/sdk/clear");
    assert_eq!(seen[0].query.as_deref(), Some("lar.verbose=true"));
}

#[tokio::test]
async fn clear_failed_status_is_a_failure_despite_ok_transport() {
    let body = br#"<service-response>
        <status>CLEAR_FAILED</status>
        <hard-failures><message>plugin in use</message></hard-failures>
    </service-response>"#;
    let server = TestPluginServer::spawn(200, body.to_vec()).await;
    let output = TempDir::new().unwrap();

    let mut completions = 0;
    exporter(&server.url)
        .run_with(
            &request(OperationMode::Clear, PluginKind::Sdk, output.path()),
            |result| {
                completions += 1;
                let error = result.into_result().unwrap_err();
                assert_eq!(error.to_string(), "sdk plugin clear failed");
            },
        )
        .await;

    assert_eq!(completions, 1);
}

#[tokio::test]
async fn community_prefixes_the_plugin_path() {
    let server = TestPluginServer::spawn(200, archive(&[("/Manifest.MF", "")])).await;
    let output = TempDir::new().unwrap();

    let mut config = Config::default();
    config.server.url = server.url.clone();
    config.server.community = Some("acme".to_string());
    config.server.strict_mode = true;
    config.server.token = Some("secret".to_string());
    let exporter = PluginExporter::new(config, OutputMode::Plain, 0, true);

    let success = exporter
        .run(&request(OperationMode::Export, PluginKind::Studio, output.path()))
        .await
        .into_result()
        .unwrap();

    assert!(success.written_files.is_empty());
    let seen = server.requests();
    assert_eq!(seen[0].path, "/acme/restapi/ldntool/plugins/studio");
    assert_eq!(seen[0].query.as_deref(), Some("lar.strict_mode=true"));
}

#[tokio::test]
async fn unreachable_server_is_a_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let output = TempDir::new().unwrap();
    let exporter = exporter(&format!("http://{addr}"));

    for (mode, verb) in [
        (OperationMode::Export, "export"),
        (OperationMode::Clear, "clear"),
    ] {
        let error = exporter
            .run(&request(mode, PluginKind::Sdk, output.path()))
            .await
            .into_result()
            .unwrap_err();

        assert!(matches!(error, PluginExportError::Network { .. }));
        assert!(error
            .to_string()
            .starts_with(&format!("sdk plugin {verb} request failed")));
    }
}

/// Answers one connection with a fixed raw HTTP response, then closes it.
async fn spawn_raw_responder(response: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = stream.write_all(response).await;
            let _ = stream.shutdown().await;
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn oversized_content_length_fails_without_aborting() {
    let url = spawn_raw_responder(
        b"HTTP/1.1 200 OK\r\nContent-Length: 9000000000000000000\r\n\r\nPK",
    )
    .await;
    let output = TempDir::new().unwrap();

    let result = exporter(&url)
        .run(&request(OperationMode::Export, PluginKind::Sdk, output.path()))
        .await;

    assert!(!result.is_success());
    assert!(files_under(output.path()).is_empty());
}
