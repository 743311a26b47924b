pub mod interception;
pub mod request;
pub mod transport;
