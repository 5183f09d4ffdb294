pub mod device_class;
pub mod models;
pub mod settings;
