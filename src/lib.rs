#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![deny(unused_must_use)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod channel;
pub mod combiner;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_loop;
pub mod flow;
pub mod message;
pub mod metrics;
pub mod task;
pub mod throttle;

pub use channel::{Channel, WritePromise};
pub use config::ConnectionConfig;
pub use connection::ClientConnection;
pub use error::{ConnectionError, TransportError};
pub use flow::FlowHandler;
