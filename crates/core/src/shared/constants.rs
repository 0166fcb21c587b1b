use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Radius used when no collaborator has supplied one.
pub const DEFAULT_RADIUS: u32 = 1;

/// Upper bound offered to interactive radius pickers.
pub const MAX_SUGGESTED_RADIUS: u32 = 15;

pub const DEFAULT_ARTIFACTS_DIR: &str = "images";
pub const DEFAULT_DATABASE_FILE: &str = "images/index.db";

/// Frame header width in bytes (big-endian u64 payload length).
pub const FRAME_HEADER_LEN: usize = 8;

/// Payload is pulled off the socket in chunks of this size.
pub const FRAME_READ_CHUNK: usize = 8 * 1024;

/// Frame limit applied by the CLI when none is configured (256 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: u64 = 256 * 1024 * 1024;

/// Timestamp layout for received-payload artifact names.
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Pause after a failed `accept` (e.g. out of file descriptors).
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
