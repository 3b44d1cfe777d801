//! Transport backends.

mod http;
mod local;
mod sync;

pub use http::HttpTransport;
pub use local::LocalTransport;
pub use sync::{SyncTool, SyncTransport};
