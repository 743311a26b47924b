pub mod request_coalescer;
