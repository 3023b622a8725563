pub mod encoder;
pub mod error;
pub mod models;
pub mod profile;
pub mod settings;
