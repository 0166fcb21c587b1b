use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::blurring::domain::image_blurrer::{BlurError, ImageBlurrer};
use crate::codec::domain::frame_codec::{CodecError, FrameCodec};
use crate::records::domain::processing_record::NewProcessingRecord;
use crate::records::domain::record_store::RecordStore;
use crate::transport::frame_transport::{receive_frame, send_frame, TransportError};

use super::artifact_sink::ArtifactSink;
use super::radius_source::RadiusSource;
use super::session_logger::SessionLogger;

/// Lifecycle of one connection.
///
/// `Accepted → ReceivingRequest → Decoding → Blurring → Encoding →
/// SendingResponse → Recording → Closed`, or `Failed` from any step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    ReceivingRequest,
    Decoding,
    Blurring,
    Encoding,
    SendingResponse,
    Recording,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Accepted => "accepted",
            SessionState::ReceivingRequest => "receiving request",
            SessionState::Decoding => "decoding",
            SessionState::Blurring => "blurring",
            SessionState::Encoding => "encoding",
            SessionState::SendingResponse => "sending response",
            SessionState::Recording => "recording",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors that end a session without a response.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Blur(#[from] BlurError),
}

/// What a successful session did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: u64,
    pub state: SessionState,
    pub radius: u32,
    pub elapsed_ms: u64,
    /// `None` when the record could not be persisted.
    pub record_id: Option<i64>,
}

/// A session that ended in [`SessionState::Failed`].
#[derive(Error, Debug)]
#[error("session {session_id} failed while {stage}: {source}")]
pub struct SessionFailure {
    pub session_id: u64,
    pub stage: SessionState,
    #[source]
    pub source: SessionError,
}

/// Runs receive → decode → blur → encode → send → record for one connection.
///
/// Holds only shared, read-mostly collaborators, so one controller serves
/// every connection concurrently. The record store is the only shared
/// mutable resource and serializes its own writes.
pub struct SessionController {
    codec: Arc<dyn FrameCodec>,
    blurrer: Arc<dyn ImageBlurrer>,
    store: Arc<dyn RecordStore>,
    radius_source: Arc<dyn RadiusSource>,
    artifacts: Option<ArtifactSink>,
    max_frame_bytes: Option<u64>,
    next_session: AtomicU64,
}

impl SessionController {
    pub fn new(
        codec: Arc<dyn FrameCodec>,
        blurrer: Arc<dyn ImageBlurrer>,
        store: Arc<dyn RecordStore>,
        radius_source: Arc<dyn RadiusSource>,
    ) -> Self {
        Self {
            codec,
            blurrer,
            store,
            radius_source,
            artifacts: None,
            max_frame_bytes: None,
            next_session: AtomicU64::new(1),
        }
    }

    pub fn with_artifacts(mut self, sink: ArtifactSink) -> Self {
        self.artifacts = Some(sink);
        self
    }

    pub fn with_max_frame_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// Reserves the next session id.
    pub fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Handles one request/response exchange on `stream`.
    ///
    /// `peer` is only used to build a correlation id when no artifact
    /// directory is configured. On failure nothing is written back; the
    /// caller closes the stream.
    pub fn handle<S: Read + Write>(
        &self,
        session_id: u64,
        stream: &mut S,
        peer: &str,
        logger: &mut dyn SessionLogger,
    ) -> Result<SessionOutcome, SessionFailure> {
        let mut state = SessionState::Accepted;
        log::debug!("Session {session_id} {state} from {peer}");

        let result = self.run(session_id, stream, peer, logger, &mut state);
        logger.summary();

        match result {
            Ok(outcome) => Ok(outcome),
            Err(source) => {
                let stage = state;
                log::debug!("Session {session_id} {stage} -> {}", SessionState::Failed);
                Err(SessionFailure {
                    session_id,
                    stage,
                    source,
                })
            }
        }
    }

    fn run<S: Read + Write>(
        &self,
        session_id: u64,
        stream: &mut S,
        peer: &str,
        logger: &mut dyn SessionLogger,
        state: &mut SessionState,
    ) -> Result<SessionOutcome, SessionError> {
        advance(session_id, state, SessionState::ReceivingRequest);
        let started = Instant::now();
        let payload = receive_frame(stream, self.max_frame_bytes)?;
        logger.timing("receive", ms_since(started));
        logger.metric("request_bytes", payload.len() as f64);

        let source_path = self.source_path(session_id, peer, &payload);

        advance(session_id, state, SessionState::Decoding);
        let started = Instant::now();
        let image = self.codec.decode(&payload)?;
        drop(payload);
        logger.timing("decode", ms_since(started));

        advance(session_id, state, SessionState::Blurring);
        let radius = self.radius_source.radius();
        let started = Instant::now();
        let blurred = self.blurrer.blur(image, radius)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        logger.timing("blur", ms_since(started));

        advance(session_id, state, SessionState::Encoding);
        let started = Instant::now();
        let encoded = self.codec.encode(&blurred)?;
        drop(blurred);
        logger.timing("encode", ms_since(started));

        advance(session_id, state, SessionState::SendingResponse);
        let started = Instant::now();
        send_frame(stream, &encoded)?;
        logger.timing("send", ms_since(started));
        logger.metric("response_bytes", encoded.len() as f64);

        advance(session_id, state, SessionState::Recording);
        // The response is already out; a persistence failure is only reported.
        let radius = u32::try_from(radius).unwrap_or(u32::MAX);
        let started = Instant::now();
        let record = NewProcessingRecord::new(source_path, radius, elapsed_ms);
        let record_id = match self.store.append(&record) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Session {session_id}: failed to record job: {e}");
                None
            }
        };
        logger.timing("record", ms_since(started));

        advance(session_id, state, SessionState::Closed);
        Ok(SessionOutcome {
            session_id,
            state: *state,
            radius,
            elapsed_ms,
            record_id,
        })
    }

    /// Saves the payload if an artifact directory is configured and returns
    /// the path to record, falling back to a correlation id.
    fn source_path(&self, session_id: u64, peer: &str, payload: &[u8]) -> String {
        let correlation = format!("session-{session_id}@{peer}");
        let Some(sink) = &self.artifacts else {
            return correlation;
        };
        match sink.save(session_id, payload) {
            Ok(path) => {
                log::info!("Session {session_id}: saved request to {}", path.display());
                path.display().to_string()
            }
            Err(e) => {
                log::warn!(
                    "Session {session_id}: could not save request under {}: {e}",
                    sink.dir().display()
                );
                correlation
            }
        }
    }
}

fn advance(session_id: u64, state: &mut SessionState, next: SessionState) {
    log::debug!("Session {session_id} {state} -> {next}");
    *state = next;
}

fn ms_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blurring::infrastructure::blurrer_factory::create_blurrer;
    use crate::codec::infrastructure::png_codec::PngCodec;
    use crate::records::domain::processing_record::ProcessingRecord;
    use crate::records::domain::record_store::PersistenceError;
    use crate::records::infrastructure::sqlite_record_store::SqliteRecordStore;
    use crate::session::radius_source::FixedRadius;
    use crate::session::session_logger::NullSessionLogger;
    use crate::shared::raster_image::RasterImage;
    use std::io::{self, Cursor};
    use std::sync::Mutex;

    // --- Stubs ---

    /// In-memory connection: reads from `input`, collects writes in `output`.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

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

    struct RecordingStore {
        appended: Mutex<Vec<NewProcessingRecord>>,
    }

    impl RecordStore for RecordingStore {
        fn ensure_schema(&self) -> Result<(), PersistenceError> {
            Ok(())
        }

        fn append(&self, record: &NewProcessingRecord) -> Result<i64, PersistenceError> {
            let mut appended = self.appended.lock().unwrap();
            appended.push(record.clone());
            Ok(appended.len() as i64)
        }

        fn recent(&self, _limit: usize) -> Result<Vec<ProcessingRecord>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    // --- Helpers ---

    fn controller(store: Arc<dyn RecordStore>, radius: i64) -> SessionController {
        SessionController::new(
            Arc::new(PngCodec::new()),
            create_blurrer(Some(2)).unwrap(),
            store,
            Arc::new(FixedRadius(radius)),
        )
    }

    fn sqlite_store() -> Arc<SqliteRecordStore> {
        let store = SqliteRecordStore::in_memory().unwrap();
        store.ensure_schema().unwrap();
        Arc::new(store)
    }

    fn request_for(image: &RasterImage) -> Vec<u8> {
        let payload = PngCodec::new().encode(image).unwrap();
        let mut bytes = Vec::new();
        send_frame(&mut bytes, &payload).unwrap();
        bytes
    }

    fn decode_response(output: &[u8]) -> RasterImage {
        let payload = receive_frame(&mut Cursor::new(output), None).unwrap();
        PngCodec::new().decode(&payload).unwrap()
    }

    fn run(
        controller: &SessionController,
        conn: &mut Duplex,
    ) -> Result<SessionOutcome, SessionFailure> {
        let id = controller.next_session_id();
        controller.handle(id, conn, "127.0.0.1:9", &mut NullSessionLogger)
    }

    // --- Tests ---

    #[test]
    fn test_happy_path_returns_blurred_image_and_records() {
        let store = sqlite_store();
        let controller = controller(store.clone(), 1);
        let image = RasterImage::new(vec![255, 255, 255, 0, 0, 0, 255, 255, 255], 3, 1, 3);
        let mut conn = Duplex::new(request_for(&image));

        let outcome = run(&controller, &mut conn).unwrap();

        assert_eq!(outcome.state, SessionState::Closed);
        assert_eq!(outcome.radius, 1);
        assert!(outcome.record_id.is_some());
        let reply = decode_response(&conn.output);
        assert_eq!(reply.pixel(1, 0), &[170, 170, 170]);

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].radius, 1);
        assert_eq!(records[0].path, "session-1@127.0.0.1:9");
    }

    #[test]
    fn test_persistence_failure_still_delivers_image() {
        let controller = controller(Arc::new(FailingStore), 1);
        let image = RasterImage::filled(4, 4, &[0, 0, 0]);
        let mut conn = Duplex::new(request_for(&image));

        let outcome = run(&controller, &mut conn).unwrap();

        assert_eq!(outcome.state, SessionState::Closed);
        assert_eq!(outcome.record_id, None);
        assert_eq!(decode_response(&conn.output), image);
    }

    #[test]
    fn test_incomplete_frame_fails_without_response() {
        let controller = controller(sqlite_store(), 1);
        let mut bytes = 1000u64.to_be_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        let mut conn = Duplex::new(bytes);

        let failure = run(&controller, &mut conn).unwrap_err();

        assert_eq!(failure.stage, SessionState::ReceivingRequest);
        assert!(matches!(
            failure.source,
            SessionError::Transport(TransportError::IncompleteFrame { .. })
        ));
        assert!(conn.output.is_empty());
    }

    #[test]
    fn test_invalid_image_fails_while_decoding() {
        let store = sqlite_store();
        let controller = controller(store.clone(), 1);
        let mut bytes = Vec::new();
        send_frame(&mut bytes, b"definitely not a png").unwrap();
        let mut conn = Duplex::new(bytes);

        let failure = run(&controller, &mut conn).unwrap_err();

        assert_eq!(failure.stage, SessionState::Decoding);
        assert!(matches!(
            failure.source,
            SessionError::Codec(CodecError::InvalidImageData(_))
        ));
        assert!(conn.output.is_empty());
        assert!(store.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_radius_fails_while_blurring() {
        let controller = controller(sqlite_store(), 0);
        let mut conn = Duplex::new(request_for(&RasterImage::filled(2, 2, &[1, 2, 3])));

        let failure = run(&controller, &mut conn).unwrap_err();

        assert_eq!(failure.stage, SessionState::Blurring);
        assert!(matches!(
            failure.source,
            SessionError::Blur(BlurError::InvalidRadius { radius: 0, .. })
        ));
        assert!(conn.output.is_empty());
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let controller = controller(sqlite_store(), 1).with_max_frame_bytes(Some(16));
        let mut conn = Duplex::new(request_for(&RasterImage::filled(8, 8, &[9, 9, 9])));

        let failure = run(&controller, &mut conn).unwrap_err();

        assert!(matches!(
            failure.source,
            SessionError::Transport(TransportError::FrameTooLarge { limit: 16, .. })
        ));
    }

    #[test]
    fn test_artifact_path_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore {
            appended: Mutex::new(Vec::new()),
        });
        let controller =
            controller(store.clone(), 3).with_artifacts(ArtifactSink::new(dir.path()));
        let image = RasterImage::filled(3, 3, &[50, 60, 70]);
        let request = request_for(&image);
        let mut conn = Duplex::new(request.clone());

        run(&controller, &mut conn).unwrap();

        let appended = store.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].radius, 3);
        let saved = std::fs::read(&appended[0].path).unwrap();
        assert_eq!(saved, &request[8..]);
    }

    #[test]
    fn test_radius_is_read_per_session() {
        use crate::session::radius_source::SharedRadius;

        let store = Arc::new(RecordingStore {
            appended: Mutex::new(Vec::new()),
        });
        let radius = SharedRadius::new(1);
        let controller = SessionController::new(
            Arc::new(PngCodec::new()),
            create_blurrer(Some(1)).unwrap(),
            store.clone(),
            Arc::new(radius.clone()),
        );
        let image = RasterImage::filled(2, 2, &[5, 5, 5]);

        run(&controller, &mut Duplex::new(request_for(&image))).unwrap();
        radius.set(7);
        run(&controller, &mut Duplex::new(request_for(&image))).unwrap();

        let appended = store.appended.lock().unwrap();
        assert_eq!(appended[0].radius, 1);
        assert_eq!(appended[1].radius, 7);
    }

    #[test]
    fn test_session_ids_increase() {
        let controller = controller(sqlite_store(), 1);
        let a = controller.next_session_id();
        let b = controller.next_session_id();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_failure_display_names_stage() {
        let failure = SessionFailure {
            session_id: 4,
            stage: SessionState::Decoding,
            source: SessionError::Codec(CodecError::InvalidImageData("bad".into())),
        };
        assert_eq!(
            failure.to_string(),
            "session 4 failed while decoding: invalid image data: bad"
        );
    }
}
