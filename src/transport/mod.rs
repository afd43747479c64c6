pub mod dispatch;
pub mod http;
pub mod tool_server;

pub use dispatch::{InFlightGuard, RequestLifecycle};
pub use tool_server::CodeloopServer;
