pub mod proxy;
pub mod server;
