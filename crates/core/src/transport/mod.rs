pub mod client;
pub mod frame_transport;
