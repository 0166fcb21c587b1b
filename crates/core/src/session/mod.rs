pub mod artifact_sink;
pub mod radius_source;
pub mod session_controller;
pub mod session_logger;
