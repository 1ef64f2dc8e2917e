use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use reelqueue_core::config::YoutubeConfig;
use reelqueue_scheduler::{PublishError, Publisher, UploadMetadata, UploadRequest};
use reelqueue_store::MediaKind;
use reelqueue_youtube::YouTubePublisher;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Canned {
    status: &'static str,
    headers: String,
    body: &'static str,
}

#[derive(Debug, Clone)]
struct Seen {
    head: String,
    body_len: usize,
}

/// Answer one connection per canned response, recording each request.
async fn serve(script: Vec<Canned>) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        for canned in script {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            let (head, body_len) = loop {
                let n = sock.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let head = text[..end].to_string();
                    let len = head
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len || n == 0 {
                        break (head, buf.len() - end - 4);
                    }
                }
                if n == 0 {
                    break (text, 0);
                }
            };
            log.lock().unwrap().push(Seen { head, body_len });

            let resp = format!(
                "HTTP/1.1 {}\r\n{}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                canned.status,
                canned.headers,
                canned.body.len(),
                canned.body
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
        }
    });
    (base, seen)
}

fn publisher(base: &str) -> YouTubePublisher {
    let cfg = YoutubeConfig {
        upload_base: format!("{base}/upload/youtube/v3"),
        ..Default::default()
    };
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    YouTubePublisher::new(cfg).with_client(client)
}

fn request(path: PathBuf, kind: MediaKind) -> UploadRequest {
    UploadRequest {
        payload_path: path,
        kind,
        metadata: UploadMetadata {
            title: "Clip #Shorts".into(),
            description: "about\n\n#shorts".into(),
            tags: vec!["shorts".into()],
        },
    }
}

#[tokio::test]
async fn resumable_upload_round() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("clip.mp4");
    std::fs::write(&payload, vec![7u8; 2048]).unwrap();

    // session URI points back at a second server so the PUT is observable
    let (media_base, media_seen) = serve(vec![Canned {
        status: "200 OK",
        headers: String::new(),
        body: r#"{"id":"dQw4w9WgXcQ","kind":"youtube#video"}"#,
    }])
    .await;
    let (api_base, api_seen) = serve(vec![Canned {
        status: "200 OK",
        headers: format!("Location: {media_base}/session/abc\r\n"),
        body: "",
    }])
    .await;

    let published = publisher(&api_base)
        .publish("tok-1", &request(payload, MediaKind::Short))
        .await
        .unwrap();
    assert_eq!(published.video_id, "dQw4w9WgXcQ");
    assert_eq!(published.url, "https://youtube.com/shorts/dQw4w9WgXcQ");

    let init = api_seen.lock().unwrap()[0].clone();
    assert!(init
        .head
        .starts_with("POST /upload/youtube/v3/videos?uploadType=resumable&part=snippet,status"));
    let lower = init.head.to_ascii_lowercase();
    assert!(lower.contains("authorization: bearer tok-1"));
    assert!(lower.contains("x-upload-content-length: 2048"));

    let put = media_seen.lock().unwrap()[0].clone();
    assert!(put.head.starts_with("PUT /session/abc"));
    assert_eq!(put.body_len, 2048);
}

#[tokio::test]
async fn quota_rejection_is_permanent() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("clip.mp4");
    std::fs::write(&payload, b"data").unwrap();

    let (api_base, _) = serve(vec![Canned {
        status: "403 Forbidden",
        headers: String::new(),
        body: r#"{"error":{"code":403,"message":"The request cannot be completed because you have exceeded your quota."}}"#,
    }])
    .await;

    let err = publisher(&api_base)
        .publish("tok", &request(payload, MediaKind::Long))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PublishError::Permanent("API quota exceeded or permission denied".into())
    );
}

#[tokio::test]
async fn server_error_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("clip.mp4");
    std::fs::write(&payload, b"data").unwrap();

    let (api_base, _) = serve(vec![Canned {
        status: "503 Service Unavailable",
        headers: String::new(),
        body: r#"{"error":{"code":503,"message":"Backend Error"}}"#,
    }])
    .await;

    let err = publisher(&api_base)
        .publish("tok", &request(payload, MediaKind::Long))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "YouTube API error (503): Backend Error");
}

#[tokio::test]
async fn expired_token_is_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("clip.mp4");
    std::fs::write(&payload, b"data").unwrap();

    let (api_base, _) = serve(vec![Canned {
        status: "401 Unauthorized",
        headers: String::new(),
        body: r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#,
    }])
    .await;

    let err = publisher(&api_base)
        .publish("tok", &request(payload, MediaKind::Long))
        .await
        .unwrap_err();
    assert_eq!(err, PublishError::Auth("Invalid Credentials".into()));
}

#[tokio::test]
async fn unreachable_api_is_transient() {
    let dir = tempfile::tempdir().unwrap();
    let payload = dir.path().join("clip.mp4");
    std::fs::write(&payload, b"data").unwrap();

    // bind then drop to get a port nobody listens on
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let err = publisher(&format!("http://127.0.0.1:{port}"))
        .publish("tok", &request(payload, MediaKind::Long))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}
