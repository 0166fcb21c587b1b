pub mod connection_gate;
pub mod service_builder;
pub mod tcp_server;
