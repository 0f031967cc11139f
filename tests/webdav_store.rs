//! WebDAV driver against an in-process dav-server / WebDAV集成测试

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tempfile::TempDir;
use tokio::net::TcpListener;

use multistore::drivers::webdav::{WebDavConfig, WebDavDriver};
use multistore::storage::meta::sidecar_path;
use multistore::{Metadata, Store, StoreJsonExt};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve `dir` over WebDAV on a random local port
async fn start_server(dir: &TempDir) -> SocketAddr {
    let handler = dav_server::DavHandler::builder()
        .filesystem(dav_server::localfs::LocalFs::new(dir.path(), false, false, false))
        .locksystem(dav_server::fakels::FakeLs::new())
        .build_handler();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let io = TokioIo::new(stream);
            let handler = handler.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler.handle(req).await) }
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

async fn setup() -> (TempDir, Arc<dyn Store>) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let addr = start_server(&dir).await;
    let store = WebDavDriver::new(WebDavConfig {
        host: format!("http://{}", addr),
        user: "user".to_string(),
        password: "pass".to_string(),
        ..Default::default()
    })
    .unwrap();
    (dir, Arc::new(store))
}

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn test_round_trip_with_metadata() {
    let (dir, store) = setup().await;

    store
        .create_file("a.txt", b"hello", Some(&meta(&[("k", "v")])))
        .await
        .unwrap();

    assert!(store.is_exist("a.txt").await);
    assert_eq!(store.get_file("a.txt").await.unwrap(), Some(b"hello".to_vec()));
    assert!(dir.path().join(sidecar_path("a.txt")).exists());

    let (info, stored_meta) = store.stat("a.txt").await.unwrap();
    assert_eq!(info.size, 5);
    assert_eq!(info.name, "a.txt");
    assert!(!info.is_dir);
    assert_eq!(stored_meta, Some(meta(&[("k", "v")])));

    store.remove_file("a.txt").await.unwrap();
    assert!(!store.is_exist("a.txt").await);
    assert!(!dir.path().join(sidecar_path("a.txt")).exists());
}

#[tokio::test]
async fn test_missing_object_asymmetry() {
    let (_dir, store) = setup().await;

    assert!(!store.is_exist("nope.txt").await);
    assert_eq!(store.get_file("nope.txt").await.unwrap(), None);
    assert_eq!(store.get_file_partially("nope.txt", 0, 10).await.unwrap(), None);

    assert!(store.stat("nope.txt").await.unwrap_err().is_not_found());
    assert!(store.remove_file("nope.txt").await.unwrap_err().is_not_found());
    assert!(store.file_reader("nope.txt", 0, -1).await.is_err());
}

#[tokio::test]
async fn test_zero_byte_file_is_not_existing() {
    let (_dir, store) = setup().await;

    store.create_file("empty.txt", b"", None).await.unwrap();
    assert!(!store.is_exist("empty.txt").await);
    assert_eq!(store.get_file("empty.txt").await.unwrap(), None);

    let (info, stored_meta) = store.stat("empty.txt").await.unwrap();
    assert_eq!(info.size, 0);
    assert_eq!(stored_meta, None);
}

#[tokio::test]
async fn test_partial_reads() {
    let (_dir, store) = setup().await;
    let payload: Vec<u8> = (0..100u8).collect();
    store.create_file("data.bin", &payload, None).await.unwrap();

    let part = store.get_file_partially("data.bin", 10, 5).await.unwrap();
    assert_eq!(part, Some(payload[10..15].to_vec()));

    let tail = store.get_file_partially("data.bin", 90, -1).await.unwrap();
    assert_eq!(tail, Some(payload[90..].to_vec()));

    let none = store.get_file_partially("data.bin", 10, 0).await.unwrap();
    assert_eq!(none, Some(Vec::new()));
}

#[tokio::test]
async fn test_file_reader_range() {
    use tokio::io::AsyncReadExt;

    let (_dir, store) = setup().await;
    let payload: Vec<u8> = (0..100u8).collect();
    store.create_file("data.bin", &payload, None).await.unwrap();

    let mut reader = store.file_reader("data.bin", 20, 10).await.unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, payload[20..30].to_vec());

    let mut reader = store.file_reader("data.bin", 0, -1).await.unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    assert_eq!(buf, payload);
}

#[tokio::test]
async fn test_stream_to_file_creates_parents() {
    let (dir, store) = setup().await;
    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();

    let reader = Box::new(std::io::Cursor::new(payload.clone()));
    store.stream_to_file(reader, "nested/dir/big.bin").await.unwrap();

    assert_eq!(store.get_file("nested/dir/big.bin").await.unwrap(), Some(payload.clone()));
    assert_eq!(std::fs::read(dir.path().join("nested/dir/big.bin")).unwrap(), payload);
}

#[tokio::test]
async fn test_create_file_creates_parents() {
    let (_dir, store) = setup().await;

    store.create_file("x/y/z.txt", b"deep", None).await.unwrap();
    assert_eq!(store.get_file("x/y/z.txt").await.unwrap(), Some(b"deep".to_vec()));
}

#[tokio::test]
async fn test_mkdir_all_and_clear_dir() {
    let (dir, store) = setup().await;

    store.mkdir_all("cache/nested/deep").await.unwrap();
    assert!(dir.path().join("cache/nested/deep").is_dir());
    // existing collections are fine
    store.mkdir_all("cache/nested").await.unwrap();

    store.create_file("cache/one.txt", b"1", None).await.unwrap();
    store.create_file("cache/nested/two.txt", b"2", None).await.unwrap();

    store.clear_dir("cache").await.unwrap();

    assert!(dir.path().join("cache").is_dir());
    assert_eq!(std::fs::read_dir(dir.path().join("cache")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_json_helpers() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Settings {
        name: String,
        retries: u32,
    }

    let (_dir, store) = setup().await;
    let settings = Settings { name: "backup".to_string(), retries: 3 };

    store.create_json_file("settings.json", &settings, None).await.unwrap();
    let loaded: Option<Settings> = store.get_json_file("settings.json").await.unwrap();
    assert_eq!(loaded, Some(settings));

    let missing: Option<Settings> = store.get_json_file("missing.json").await.unwrap();
    assert_eq!(missing, None);
}
