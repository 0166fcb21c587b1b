//! Networked box-blur service.
//!
//! A client sends one length-prefixed PNG frame; the server decodes it,
//! box-blurs it across a pool of row-band workers, replies with the blurred
//! PNG on the same connection and appends a record of the job to SQLite.

pub mod blurring;
pub mod codec;
pub mod records;
pub mod server;
pub mod session;
pub mod shared;
pub mod transport;
