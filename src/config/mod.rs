pub mod proc_loader;
pub mod proc_validator;
pub mod relay;
pub mod settings;
