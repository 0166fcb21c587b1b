use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use netblur_core::blurring::infrastructure::blurrer_factory::create_blurrer;
use netblur_core::codec::domain::frame_codec::FrameCodec;
use netblur_core::codec::infrastructure::png_codec::PngCodec;
use netblur_core::records::domain::processing_record::{NewProcessingRecord, ProcessingRecord};
use netblur_core::records::domain::record_store::{PersistenceError, RecordStore};
use netblur_core::server::service_builder::{
    build_server, build_server_with_radius, open_record_store,
};
use netblur_core::server::tcp_server::{BlurServer, ServerHandle, ServerOptions};
use netblur_core::session::radius_source::{FixedRadius, SharedRadius};
use netblur_core::session::session_controller::SessionController;
use netblur_core::shared::raster_image::RasterImage;
use netblur_core::shared::server_config::ServerConfig;
use netblur_core::transport::client::send_image;

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

struct FailingStore;

impl RecordStore for FailingStore {
    fn ensure_schema(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn append(&self, _record: &NewProcessingRecord) -> Result<i64, PersistenceError> {
        Err(PersistenceError::Poisoned)
    }

    fn recent(&self, _limit: usize) -> Result<Vec<ProcessingRecord>, PersistenceError> {
        Ok(Vec::new())
    }
}

fn config(dir: &Path) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        radius: 1,
        database_path: dir.join("index.db"),
        artifacts_dir: Some(dir.join("images")),
        workers: Some(2),
        max_frame_bytes: Some(1 << 20),
        max_connections: None,
        read_timeout_secs: Some(10),
    }
}

fn start(server: BlurServer) -> (SocketAddr, ServerHandle, JoinHandle<()>) {
    let addr = server.local_addr().unwrap();
    let handle = server.handle().unwrap();
    let join = std::thread::spawn(move || server.serve().unwrap());
    (addr, handle, join)
}

fn encode(image: &RasterImage) -> Vec<u8> {
    PngCodec::new().encode(image).unwrap()
}

fn decode(bytes: &[u8]) -> RasterImage {
    PngCodec::new().decode(bytes).unwrap()
}

fn white_black_white() -> RasterImage {
    RasterImage::new(vec![255, 255, 255, 0, 0, 0, 255, 255, 255], 3, 1, 3)
}

#[test]
fn test_client_receives_blurred_image_and_job_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (addr, handle, join) = start(build_server(&config).unwrap());

    let reply = send_image(addr, &encode(&white_black_white()), TIMEOUT).unwrap();
    let blurred = decode(&reply);
    assert_eq!(blurred.data(), &[170u8; 9][..]);

    handle.stop();
    assert!(handle.is_stopped());
    join.join().unwrap();

    let records = open_record_store(&config).unwrap().recent(10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].radius, 1);
    assert!(Path::new(&records[0].path).starts_with(dir.path().join("images")));
    assert!(Path::new(&records[0].path).exists());
}

#[test]
fn test_incomplete_frame_gets_no_response_and_server_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle, join) = start(build_server(&config(dir.path())).unwrap());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(TIMEOUT).unwrap();
    stream.write_all(&1000u64.to_be_bytes()).unwrap();
    stream.write_all(&[7u8; 10]).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    assert!(response.is_empty());

    let image = RasterImage::filled(4, 4, &[0, 0, 0]);
    let reply = send_image(addr, &encode(&image), TIMEOUT).unwrap();
    assert_eq!(decode(&reply), image);

    handle.stop();
    join.join().unwrap();
}

#[test]
fn test_invalid_image_closes_connection_without_response() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, handle, join) = start(build_server(&config(dir.path())).unwrap());

    let err = send_image(addr, b"not an image at all", TIMEOUT).unwrap_err();
    assert!(err.to_string().contains("closed"));

    handle.stop();
    join.join().unwrap();
}

#[test]
fn test_persistence_failure_does_not_block_response() {
    let controller = SessionController::new(
        Arc::new(PngCodec::new()),
        create_blurrer(Some(2)).unwrap(),
        Arc::new(FailingStore),
        Arc::new(FixedRadius(1)),
    );
    let server =
        BlurServer::bind("127.0.0.1:0", Arc::new(controller), ServerOptions::default()).unwrap();
    let (addr, handle, join) = start(server);

    let reply = send_image(addr, &encode(&white_black_white()), TIMEOUT).unwrap();
    assert_eq!(decode(&reply).pixel(1, 0), &[170, 170, 170]);

    handle.stop();
    join.join().unwrap();
}

#[test]
fn test_concurrent_clients_each_get_their_own_result() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        max_connections: Some(3),
        ..config(dir.path())
    };
    let (addr, handle, join) = start(build_server(&config).unwrap());

    let clients: Vec<_> = (0..6u8)
        .map(|i| {
            std::thread::spawn(move || {
                let image = RasterImage::filled(16, 12, &[i * 40, 255 - i * 40, 7]);
                let reply = send_image(addr, &encode(&image), TIMEOUT).unwrap();
                (image, decode(&reply))
            })
        })
        .collect();

    for client in clients {
        let (sent, received) = client.join().unwrap();
        // Uniform images survive a box blur unchanged.
        assert_eq!(sent, received);
    }

    handle.stop();
    join.join().unwrap();

    let records = open_record_store(&config).unwrap().recent(100).unwrap();
    assert_eq!(records.len(), 6);
}

#[test]
fn test_radius_change_applies_to_later_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let radius = SharedRadius::new(1);
    let server = build_server_with_radius(&config, Arc::new(radius.clone())).unwrap();
    let (addr, handle, join) = start(server);

    let request = encode(&white_black_white());
    send_image(addr, &request, TIMEOUT).unwrap();
    radius.set(2_000_000);
    let reply = send_image(addr, &request, TIMEOUT).unwrap();
    assert_eq!(decode(&reply).data(), &[254u8; 9][..]);

    handle.stop();
    join.join().unwrap();

    let records = open_record_store(&config).unwrap().recent(10).unwrap();
    let mut radii: Vec<u32> = records.iter().map(|r| r.radius).collect();
    radii.sort_unstable();
    assert_eq!(radii, vec![1, 2_000_000]);
}
