use experimenthq::kernel::record::{ParameterPayload, ParameterRecord};
use experimenthq::services::{CreateExperimentRequest, ExperimentService, ExperimentStatus};
use experimenthq::{ClientConfig, ExperimentOptions, HttpExperimentService, NotionType, ServiceError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Answers exactly one HTTP request with a canned response and hands back
/// the raw request it received.
async fn serve_once(status: &'static str, body: &'static str) -> (HttpExperimentService, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    let mut config = ClientConfig::new("test-key");
    config.api_url = format!("http://{}/", addr);
    (HttpExperimentService::new(&config), server)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().unwrap())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8(buf).unwrap()
}

fn body_of(request: &str) -> serde_json::Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

fn batch() -> Vec<ParameterPayload> {
    vec![
        ParameterPayload::from(&ParameterRecord::new("n_neighbors", 3, None)),
        ParameterPayload::from(&ParameterRecord::new("accuracy", 0.96, Some(NotionType::Number))),
    ]
}

#[tokio::test]
async fn test_create_experiment_posts_options_with_bearer() {
    let (service, server) = serve_once("200 OK", r#"{"experiment_id":"exp-9"}"#).await;
    let request = CreateExperimentRequest::from(&ExperimentOptions::new("iris").name("knn"));

    let id = service.create_experiment(&request).await.unwrap();
    assert_eq!(id, "exp-9");

    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /experiments HTTP/1.1"), "{raw}");
    assert!(raw.to_lowercase().contains("authorization: bearer test-key"));
    assert_eq!(
        body_of(&raw),
        serde_json::json!({ "project": "iris", "name": "knn", "description": null, "tags": null })
    );
}

#[tokio::test]
async fn test_create_experiment_maps_unauthorized() {
    let (service, _server) = serve_once("401 Unauthorized", "").await;
    let request = CreateExperimentRequest::from(&ExperimentOptions::new("iris"));

    let err = service.create_experiment(&request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized));
    assert!(err.is_terminal_startup());
}

#[tokio::test]
async fn test_create_experiment_rejects_malformed_body() {
    let (service, _server) = serve_once("200 OK", r#"{"id":"wrong-field"}"#).await;
    let request = CreateExperimentRequest::from(&ExperimentOptions::new("iris"));

    let err = service.create_experiment(&request).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_append_parameters_posts_batch_array() {
    let (service, server) = serve_once("200 OK", "{}").await;

    service.append_parameters("exp-9", &batch()).await.unwrap();

    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /experiments/exp-9/parameters HTTP/1.1"), "{raw}");
    assert_eq!(
        body_of(&raw),
        serde_json::json!([
            { "parameter_name": "n_neighbors", "parameter_value": 3, "notion_type": null },
            { "parameter_name": "accuracy", "parameter_value": 0.96, "notion_type": "number" },
        ])
    );
}

#[tokio::test]
async fn test_append_parameters_status_classification() {
    let (service, _server) = serve_once("400 Bad Request", "unknown column type").await;
    let err = service.append_parameters("exp-9", &batch()).await.unwrap_err();
    assert!(matches!(&err, ServiceError::BadRequest(m) if m == "unknown column type"));
    assert!(!err.is_retryable_delivery());

    let (service, _server) = serve_once("502 Bad Gateway", "upstream down").await;
    let err = service.append_parameters("exp-9", &batch()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Status { code: 502, .. }));
    assert!(err.is_retryable_delivery());
}

#[tokio::test]
async fn test_update_status_patches_experiment() {
    let (service, server) = serve_once("200 OK", "{}").await;

    service.update_status("exp-9", ExperimentStatus::Finished).await.unwrap();

    let raw = server.await.unwrap();
    assert!(raw.starts_with("PATCH /experiments/exp-9 HTTP/1.1"), "{raw}");
    assert_eq!(body_of(&raw), serde_json::json!({ "status": "Finished" }));
}

#[tokio::test]
async fn test_connection_failure_is_retryable_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = ClientConfig::new("test-key");
    config.api_url = format!("http://{}", addr);
    let service = HttpExperimentService::new(&config);

    let err = service.append_parameters("exp-9", &batch()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Transport(_)));
    assert!(err.is_retryable_delivery());
}

#[test]
fn test_debug_hides_api_key() {
    let service = HttpExperimentService::new(&ClientConfig::new("hunter2"));
    assert!(!format!("{:?}", service).contains("hunter2"));
}
