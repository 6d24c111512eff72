pub mod api;
pub mod cache;
pub mod logging;
pub mod session;
