//! Process-level Error Types
//!
//! Everything here is fatal: the process logs the error tree and exits.

use derive_more::{Display, Error};
use std::net::SocketAddr;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("failed to load configuration")]
    Config,
    /// A backing service couldn't be reached or initialised.
    #[display("failed to start {_0}")]
    Startup(#[error(not(source))] &'static str),
    #[display("failed to listen on {_0}")]
    Bind(#[error(not(source))] SocketAddr),
    #[display("HTTP server failed")]
    Server,
}
