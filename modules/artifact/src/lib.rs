pub mod error;
pub mod service;

pub use error::Error;
