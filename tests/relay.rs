//! End-to-end tests: real listeners, a real HTTP client, live streams.
//!
//! Each test binds its own relay on ephemeral ports. Producer uploads are
//! driven through a channel-backed request body so tests control exactly
//! when bytes arrive and when the upload ends or fails.

use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::{Stream, StreamExt};
use livelog::server::RelayServer;
use livelog::Config;

type BodyChunk = Result<Bytes, std::io::Error>;

struct Relay {
    put_url: String,
    get_base: String,
}

impl Relay {
    fn log_url(&self, token: &str) -> String {
        format!("{}/{}", self.get_base, token)
    }
}

async fn start_relay() -> Relay {
    let config = Config {
        access_token: "tok".to_string(),
        put_port: 0,
        get_port: 0,
        tls: None,
        debug: false,
    };
    let server = RelayServer::bind(&config).await.expect("bind relay");
    let put_addr = server.put_addr();
    let get_port = server.get_addr().port();
    tokio::spawn(server.run());

    Relay {
        put_url: format!("http://{}/log", put_addr),
        get_base: format!("http://127.0.0.1:{}/log", get_port),
    }
}

/// A request body the test feeds by hand. Dropping the sender ends the
/// upload cleanly; sending an error aborts it.
fn streaming_body() -> (UnboundedSender<BodyChunk>, reqwest::Body) {
    let (tx, rx) = unbounded();
    (tx, reqwest::Body::wrap_stream(rx))
}

/// Starts a hand-fed upload and returns the sender that controls it.
async fn start_upload(client: &reqwest::Client, relay: &Relay) -> UnboundedSender<BodyChunk> {
    let (tx, body) = streaming_body();
    let request = client.put(&relay.put_url).body(body);
    tokio::spawn(async move {
        // Hold the ack response until ingestion ends so the upload
        // connection stays open for the whole test.
        if let Ok(response) = request.send().await {
            let _ = response.bytes().await;
        }
    });
    tx
}

/// Uploads a complete body and waits for ingestion to finish.
async fn upload_all(client: &reqwest::Client, relay: &Relay, contents: &'static str) {
    let response = client
        .put(&relay.put_url)
        .body(contents)
        .send()
        .await
        .expect("send upload");
    assert_eq!(response.status().as_u16(), 201);
    // The ack body ends when the server has consumed the whole upload.
    response.bytes().await.expect("upload ack body");
}

/// Polls a consumer URL until the stream exists (the upload may still be
/// racing in).
async fn get_ok(client: &reqwest::Client, url: &str) -> reqwest::Response {
    for _ in 0..100 {
        let response = client.get(url).send().await.expect("send get");
        if response.status().as_u16() == 200 {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("stream never became available at {url}");
}

async fn read_to_end(response: reqwest::Response) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.expect("body chunk"));
    }
    out
}

async fn read_at_least<S>(body: &mut S, out: &mut Vec<u8>, n: usize)
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    while out.len() < n {
        let chunk = body.next().await.expect("body ended early");
        out.extend_from_slice(&chunk.expect("body chunk"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consumer_attached_mid_upload_sees_history_then_live_bytes() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let tx = start_upload(&client, &relay).await;
    tx.unbounded_send(Ok(Bytes::from_static(b"AB"))).unwrap();

    // Attach while the upload is open; the first two bytes are history.
    let response = get_ok(&client, &relay.log_url("tok")).await;
    let mut body = response.bytes_stream();
    let mut received = Vec::new();
    read_at_least(&mut body, &mut received, 2).await;
    assert_eq!(received, b"AB");

    // The rest arrives live, then the upload closes.
    tx.unbounded_send(Ok(Bytes::from_static(b"CDE"))).unwrap();
    drop(tx);
    while let Some(chunk) = body.next().await {
        received.extend_from_slice(&chunk.expect("body chunk"));
    }
    assert_eq!(received, b"ABCDE");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_range_returns_exact_slice() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();
    upload_all(&client, &relay, "0123456789").await;

    let response = client
        .get(relay.log_url("tok"))
        .header("Range", "bytes=3-6")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(read_to_end(response).await, b"3456");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn open_ended_range_returns_tail() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();
    upload_all(&client, &relay, "0123456789").await;

    let response = client
        .get(relay.log_url("tok"))
        .header("Range", "bytes=7-")
        .send()
        .await
        .unwrap();

    assert_eq!(read_to_end(response).await, b"789");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn inverted_range_is_rejected_with_parser_message() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let response = client
        .get(relay.log_url("tok"))
        .header("Range", "bytes=5-2")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 416);
    let body = response.text().await.unwrap();
    assert!(body.contains("range start 5 is past range end 2"), "{body}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consumers_attached_before_first_byte_both_see_everything() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let tx = start_upload(&client, &relay).await;

    // Both consumers attach before any bytes exist.
    let first = get_ok(&client, &relay.log_url("tok")).await;
    let second = get_ok(&client, &relay.log_url("tok")).await;
    let first = tokio::spawn(read_to_end(first));
    let second = tokio::spawn(read_to_end(second));

    tx.unbounded_send(Ok(Bytes::from_static(b"hello"))).unwrap();
    drop(tx);

    assert_eq!(first.await.unwrap(), b"hello");
    assert_eq!(second.await.unwrap(), b"hello");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producer_abort_closes_consumers_after_partial_bytes() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let tx = start_upload(&client, &relay).await;
    tx.unbounded_send(Ok(Bytes::from_static(b"par"))).unwrap();

    let response = get_ok(&client, &relay.log_url("tok")).await;
    let mut body = response.bytes_stream();
    let mut received = Vec::new();
    read_at_least(&mut body, &mut received, 3).await;

    // The producer dies mid-stream.
    tx.unbounded_send(Err(std::io::Error::other("producer crashed")))
        .unwrap();

    // The consumer drains what was buffered, then the body ends.
    while let Some(chunk) = body.next().await {
        received.extend_from_slice(&chunk.expect("body chunk"));
    }
    assert_eq!(received, b"par");

    // A consumer attaching after the abort sees the same truncated log.
    let late = client.get(relay.log_url("tok")).send().await.unwrap();
    assert_eq!(late.status().as_u16(), 200);
    assert_eq!(read_to_end(late).await, b"par");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_concurrent_upload_is_rejected() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let tx = start_upload(&client, &relay).await;
    tx.unbounded_send(Ok(Bytes::from_static(b"first"))).unwrap();
    get_ok(&client, &relay.log_url("tok")).await;

    // A second producer is turned away while the first is active.
    let second = client
        .put(&relay.put_url)
        .body("second")
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 400);

    // The active upload is unaffected.
    tx.unbounded_send(Ok(Bytes::from_static(b"!"))).unwrap();
    drop(tx);
    let response = client.get(relay.log_url("tok")).send().await.unwrap();
    assert_eq!(read_to_end(response).await, b"first!");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_token_is_denied() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let response = client.get(relay.log_url("wrong")).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 401);
    assert_eq!(response.headers()["x-streaming"], "true");
    assert_eq!(response.text().await.unwrap(), "Access denied");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn head_returns_streaming_headers() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let response = client.head(relay.log_url("tok")).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["x-streaming"], "true");
    assert_eq!(headers["access-control-expose-headers"], "X-Streaming");
    assert_eq!(headers["access-control-allow-headers"], "X-Streaming");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consumer_gets_404_before_any_upload() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let response = client.get(relay.log_url("tok")).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_methods_are_rejected() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let upload_side = client.post(&relay.put_url).send().await.unwrap();
    assert_eq!(upload_side.status().as_u16(), 405);

    let consumer_side = client
        .post(relay.log_url("tok"))
        .body("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(consumer_side.status().as_u16(), 405);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_ranges_at_different_times_match() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    let tx = start_upload(&client, &relay).await;
    tx.unbounded_send(Ok(Bytes::from_static(b"fan-out "))).unwrap();

    // One consumer attaches mid-upload, one after close.
    let early = get_ok(&client, &relay.log_url("tok")).await;
    let early = tokio::spawn(read_to_end(early));

    tx.unbounded_send(Ok(Bytes::from_static(b"equivalence")))
        .unwrap();
    drop(tx);

    let early = early.await.unwrap();
    let late = client.get(relay.log_url("tok")).send().await.unwrap();
    let late = read_to_end(late).await;

    assert_eq!(early, late);
    assert_eq!(early, b"fan-out equivalence");
}
