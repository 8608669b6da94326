//! Relay tests against a fake MJPEG camera on a local socket

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use mjpeg_relay::{
    ConnectionState, PipelineRegistry, PullOutput, PullTransport, RelayServer, RequestParams,
    ServerConfig, StreamConfig, UpstreamSource,
};

const WAIT: Duration = Duration::from_secs(5);

fn jpeg(width: u32, height: u32, shade: u8) -> Bytes {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 8) as u8, (y * 8) as u8, shade])
    });
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 80)
        .encode_image(&image)
        .unwrap();
    Bytes::from(out)
}

fn corrupt_jpeg() -> Bytes {
    Bytes::from_static(&[0xFF, 0xD8, 0x00, 0x11, 0x22, 0x00, 0x00])
}

/// Serves the given parts in a loop to every client
struct FakeCamera {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl FakeCamera {
    async fn start(parts: Vec<Bytes>, interval: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_camera(socket, parts.clone(), interval));
            }
        });

        Self { addr, connections }
    }

    fn url(&self) -> String {
        format!("http://{}/video.mjpg", self.addr)
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve_camera(mut socket: TcpStream, parts: Vec<Bytes>, interval: Duration) {
    let mut head = Vec::new();
    let mut buf = [0u8; 256];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let header = "HTTP/1.1 200 OK\r\n\
                  Content-Type: multipart/x-mixed-replace; boundary=camframe\r\n\
                  Connection: close\r\n\r\n";
    if socket.write_all(header.as_bytes()).await.is_err() {
        return;
    }

    for part in parts.iter().cycle() {
        let mut chunk = format!(
            "--camframe\r\ncontent-type: image/jpeg\r\ncontent-length: {}\r\n\r\n",
            part.len()
        )
        .into_bytes();
        chunk.extend_from_slice(part);
        chunk.extend_from_slice(b"\r\n");

        if socket.write_all(&chunk).await.is_err() {
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

fn on_demand(name: &str, camera: &FakeCamera) -> StreamConfig {
    StreamConfig::builder(name, camera.url())
        .on_demand(true)
        .stop_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_on_demand_lifecycle() {
    let camera = FakeCamera::start(vec![jpeg(16, 16, 0)], Duration::from_millis(10)).await;
    let source = UpstreamSource::new(on_demand("cam", &camera));
    assert_eq!(source.state(), ConnectionState::Idle);
    assert_eq!(camera.connections(), 0);

    let mut subscription = source.register().await.unwrap();
    let first = timeout(WAIT, subscription.next_frame()).await.unwrap().unwrap();
    let second = timeout(WAIT, subscription.next_frame()).await.unwrap().unwrap();

    assert_eq!(source.state(), ConnectionState::Streaming);
    assert_eq!(&*first.mime, "image/jpeg");
    assert!(second.sequence > first.sequence);
    assert!(source.last_frame().is_some());

    source.unregister(subscription).await;
    assert_eq!(source.state(), ConnectionState::Stopped);
    assert_eq!(source.consumer_count(), 0);
    // Last frame survives the stop
    assert!(source.last_frame().is_some());
}

#[tokio::test]
async fn test_viewers_share_one_upstream() {
    let camera = FakeCamera::start(vec![jpeg(16, 16, 0)], Duration::from_millis(10)).await;
    let source = UpstreamSource::new(on_demand("cam", &camera));

    let mut a = source.register().await.unwrap();
    let mut b = source.register().await.unwrap();
    assert_eq!(source.consumer_count(), 2);

    timeout(WAIT, a.next_frame()).await.unwrap().unwrap();
    timeout(WAIT, b.next_frame()).await.unwrap().unwrap();
    assert_eq!(camera.connections(), 1);

    source.unregister(a).await;
    // One viewer left, reader keeps going
    assert!(timeout(WAIT, b.next_frame()).await.unwrap().is_some());
    assert_eq!(source.state(), ConnectionState::Streaming);

    source.unregister(b).await;
    assert_eq!(source.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_disable_and_enable() {
    let camera = FakeCamera::start(vec![jpeg(16, 16, 0)], Duration::from_millis(10)).await;
    let source = UpstreamSource::new(on_demand("cam", &camera));

    source.disable().await;
    assert!(source.register().await.is_none());
    assert_eq!(camera.connections(), 0);

    source.enable().await;
    let mut subscription = source.register().await.unwrap();
    assert!(timeout(WAIT, subscription.next_frame()).await.unwrap().is_some());

    // Disabling ends the session of current viewers
    source.disable().await;
    assert!(timeout(WAIT, subscription.next_frame()).await.unwrap().is_none());
    assert_eq!(source.consumer_count(), 0);
}

#[tokio::test]
async fn test_corrupt_frames_skipped() {
    let camera = FakeCamera::start(
        vec![jpeg(16, 16, 0), corrupt_jpeg(), jpeg(16, 16, 200)],
        Duration::from_millis(5),
    )
    .await;
    let source = UpstreamSource::new(on_demand("cam", &camera));

    let mut subscription = source.register().await.unwrap();
    let mut frames = Vec::new();
    while frames.len() < 4 {
        let frame = timeout(WAIT, subscription.next_frame()).await.unwrap().unwrap();
        assert_eq!(frame.data[frame.size() - 2..], [0xFF, 0xD9]);
        frames.push(frame);
    }

    assert!(source.stats().frames_discarded >= 1);
    source.unregister(subscription).await;
}

#[tokio::test]
async fn test_unreachable_camera_reports_error() {
    let config = StreamConfig::builder("dead", "http://127.0.0.1:1/video")
        .on_demand(true)
        .build()
        .unwrap();
    let source = UpstreamSource::new(config);

    let mut subscription = source.register().await.unwrap();
    assert!(timeout(WAIT, subscription.next_frame()).await.unwrap().is_none());
    assert_eq!(source.state(), ConnectionState::Error);
    assert!(source.error_reason().is_some());

    source.unregister(subscription).await;
    assert_eq!(source.state(), ConnectionState::Error);
}

async fn start_relay(streams: Vec<StreamConfig>) -> (Arc<RelayServer>, String) {
    let server = Arc::new(
        RelayServer::from_streams(ServerConfig::default(), streams)
            .await
            .unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let running = Arc::clone(&server);
    tokio::spawn(async move {
        running
            .serve_until(listener, std::future::pending())
            .await
            .ok();
    });

    (server, addr.to_string())
}

async fn open(addr: &str, path: &str) -> reqwest::Response {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    timeout(WAIT, client.get(format!("http://{}{}", addr, path)).send())
        .await
        .unwrap()
        .unwrap()
}

fn header<'a>(response: &'a reqwest::Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

/// Read body chunks until `needle` has been seen `count` times
async fn read_until_count(response: &mut reqwest::Response, needle: &[u8], count: usize) -> Vec<u8> {
    let mut received = Vec::new();

    timeout(WAIT, async {
        while received.windows(needle.len()).filter(|w| *w == needle).count() < count {
            let chunk = response.chunk().await.unwrap();
            let chunk = chunk.expect("relay closed the stream early");
            received.extend_from_slice(&chunk);
        }
    })
    .await
    .unwrap();

    received
}

#[tokio::test]
async fn test_relay_multipart_with_transform() {
    let camera = FakeCamera::start(vec![jpeg(32, 32, 50)], Duration::from_millis(10)).await;
    let (server, addr) = start_relay(vec![on_demand("cam", &camera)]).await;

    let mut viewer = open(&addr, "/streams/cam.mjpg?size=16x16&seq").await;
    assert_eq!(viewer.status().as_u16(), 200);
    assert_eq!(
        header(&viewer, "content-type"),
        "multipart/x-mixed-replace;boundary=ffserver"
    );

    let received = read_until_count(&mut viewer, b"--ffserver\r\n", 3).await;
    let text = String::from_utf8_lossy(&received);
    assert!(text.starts_with("--ffserver\r\nContent-type: image/jpeg\r\n"));
    assert!(text.contains("frame-sequence: 0\r\n"));

    let source = server.registry().get("cam").await.unwrap();
    assert_eq!(source.consumer_count(), 1);
    assert_eq!(server.pipelines().len(), 1);

    drop(viewer);
    wait_for(|| source.consumer_count() == 0).await;
    wait_for(|| server.pipelines().is_empty()).await;
    assert_eq!(source.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_relay_single_and_last() {
    let camera = FakeCamera::start(vec![jpeg(16, 16, 0)], Duration::from_millis(10)).await;
    let (_server, addr) = start_relay(vec![on_demand("cam", &camera)]).await;

    let viewer = open(&addr, "/streams/cam.jpeg").await;
    assert_eq!(viewer.status().as_u16(), 200);
    assert_eq!(header(&viewer, "content-type"), "image/jpeg");
    let length: usize = header(&viewer, "content-length").parse().unwrap();
    let body = timeout(WAIT, viewer.bytes()).await.unwrap().unwrap();
    assert_eq!(body.len(), length);
    assert_eq!(body[..2], [0xFF, 0xD8]);
    assert_eq!(body[body.len() - 2..], [0xFF, 0xD9]);

    // The single request left a frame behind
    let viewer = open(&addr, "/streams/cam.last").await;
    assert_eq!(viewer.status().as_u16(), 200);
    assert!(!timeout(WAIT, viewer.bytes()).await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn test_relay_buffered() {
    let camera = FakeCamera::start(vec![jpeg(16, 16, 0)], Duration::from_millis(5)).await;
    let (server, addr) = start_relay(vec![on_demand("cam", &camera)]).await;

    let mut viewer = open(&addr, "/streams/cam.bjpg?wait=2").await;
    assert_eq!(viewer.status().as_u16(), 200);
    read_until_count(&mut viewer, b"--ffserver\r\n", 5).await;

    let source = server.registry().get("cam").await.unwrap();
    drop(viewer);
    wait_for(|| source.consumer_count() == 0).await;
}

#[tokio::test]
async fn test_relay_websocket_pull() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let camera = FakeCamera::start(vec![jpeg(16, 16, 0)], Duration::from_millis(10)).await;
    let (server, addr) = start_relay(vec![on_demand("cam", &camera)]).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/streams/cam.ws", addr))
        .await
        .unwrap();

    socket.send(Message::Text("p".to_string())).await.unwrap();
    let reply = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
    match reply {
        Message::Text(text) => assert!(text.starts_with("data:image/jpeg;base64,")),
        other => panic!("unexpected reply {:?}", other),
    }

    let source = server.registry().get("cam").await.unwrap();
    assert_eq!(source.consumer_count(), 1);

    socket.close(None).await.unwrap();
    drop(socket);
    wait_for(|| source.consumer_count() == 0).await;
    wait_for(|| server.pipelines().is_empty()).await;
}

/// Pull transport fed from a channel
struct ChannelTransport {
    requests: mpsc::Receiver<String>,
    replies: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl PullTransport for ChannelTransport {
    async fn recv(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    async fn send_binary(&mut self, data: Bytes) -> std::io::Result<()> {
        self.replies
            .send(data)
            .map_err(|_| std::io::ErrorKind::BrokenPipe.into())
    }

    async fn send_text(&mut self, text: String) -> std::io::Result<()> {
        self.send_binary(Bytes::from(text)).await
    }
}

#[tokio::test]
async fn test_pull_session() {
    let camera = FakeCamera::start(vec![jpeg(16, 16, 0)], Duration::from_millis(10)).await;
    let source = Arc::new(UpstreamSource::new(on_demand("cam", &camera)));
    let pipelines = Arc::new(PipelineRegistry::default());

    let (request_tx, requests) = mpsc::channel(4);
    let (replies, mut reply_rx) = mpsc::unbounded_channel();
    let output = PullOutput::new(
        Arc::clone(&source),
        Arc::clone(&pipelines),
        &RequestParams::from_query("bin"),
        ChannelTransport { requests, replies },
        1,
    );
    let session = tokio::spawn(output.handle());

    request_tx.send("p".to_string()).await.unwrap();
    let frame = timeout(WAIT, reply_rx.recv()).await.unwrap().unwrap();
    assert_eq!(frame[..2], [0xFF, 0xD8]);

    request_tx.send("noise".to_string()).await.unwrap();
    request_tx.send("p".to_string()).await.unwrap();
    assert!(timeout(WAIT, reply_rx.recv()).await.unwrap().is_some());

    drop(request_tx);
    let stats = timeout(WAIT, session).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.frames_written, 2);
    assert_eq!(source.consumer_count(), 0);
    assert!(pipelines.is_empty());
}

#[tokio::test]
async fn test_pull_transform_failure_sends_original() {
    // Valid markers, undecodable body
    let broken = Bytes::from_static(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]);
    let camera = FakeCamera::start(vec![broken.clone()], Duration::from_millis(10)).await;
    let source = Arc::new(UpstreamSource::new(on_demand("cam", &camera)));
    let pipelines = Arc::new(PipelineRegistry::default());

    let (request_tx, requests) = mpsc::channel(4);
    let (replies, mut reply_rx) = mpsc::unbounded_channel();
    let output = PullOutput::new(
        Arc::clone(&source),
        Arc::clone(&pipelines),
        &RequestParams::from_query("bin&size=8x8"),
        ChannelTransport { requests, replies },
        1,
    );
    let session = tokio::spawn(output.handle());

    request_tx.send("p".to_string()).await.unwrap();
    let frame = timeout(WAIT, reply_rx.recv()).await.unwrap().unwrap();
    assert_eq!(frame, broken);

    drop(request_tx);
    let stats = timeout(WAIT, session).await.unwrap().unwrap().unwrap();
    assert_eq!(stats.frames_written, 1);
    assert_eq!(stats.frames_dropped, 0);
    assert!(pipelines.is_empty());
}
