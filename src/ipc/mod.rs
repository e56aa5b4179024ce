//! IPC module for control clients

mod protocol;
mod server;

pub use protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};
pub use server::Server;
