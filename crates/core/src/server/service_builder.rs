use std::sync::Arc;

use thiserror::Error;

use crate::blurring::infrastructure::blurrer_factory::create_blurrer;
use crate::codec::infrastructure::png_codec::PngCodec;
use crate::records::domain::record_store::{PersistenceError, RecordStore};
use crate::records::infrastructure::sqlite_record_store::SqliteRecordStore;
use crate::session::artifact_sink::ArtifactSink;
use crate::session::radius_source::{FixedRadius, RadiusSource};
use crate::session::session_controller::SessionController;
use crate::shared::server_config::{ConfigError, ServerConfig};

use super::tcp_server::{BlurServer, ServerOptions};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to prepare record store: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("failed to start server: {0}")]
    Io(#[from] std::io::Error),
}

/// Wires codec, blur engine, record store and controller from `config`
/// and binds the listener. The radius comes from `config.radius`.
pub fn build_server(config: &ServerConfig) -> Result<BlurServer, ServiceError> {
    let radius = Arc::new(FixedRadius(i64::from(config.radius)));
    build_server_with_radius(config, radius)
}

/// Like [`build_server`], with the radius supplied by an external collaborator.
pub fn build_server_with_radius(
    config: &ServerConfig,
    radius_source: Arc<dyn RadiusSource>,
) -> Result<BlurServer, ServiceError> {
    config.validate()?;

    let store = SqliteRecordStore::open(&config.database_path)?;
    store.ensure_schema()?;
    log::info!("Recording jobs in {}", config.database_path.display());

    let blurrer = create_blurrer(config.workers)?;

    let mut controller = SessionController::new(
        Arc::new(PngCodec::new()),
        blurrer,
        Arc::new(store),
        radius_source,
    )
    .with_max_frame_bytes(config.max_frame_bytes);
    if let Some(dir) = &config.artifacts_dir {
        log::info!("Saving received images to {}", dir.display());
        controller = controller.with_artifacts(ArtifactSink::new(dir));
    }

    let options = ServerOptions {
        max_connections: config.max_connections,
        io_timeout: config.read_timeout(),
    };
    Ok(BlurServer::bind(
        &config.bind_addr,
        Arc::new(controller),
        options,
    )?)
}

/// Opens the record store named in `config` for inspection.
pub fn open_record_store(config: &ServerConfig) -> Result<SqliteRecordStore, ServiceError> {
    let store = SqliteRecordStore::open(&config.database_path)?;
    store.ensure_schema()?;
    Ok(store)
}
