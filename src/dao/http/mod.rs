mod client;
mod config;
mod error;

pub use client::HttpServices;
pub use config::HttpConfig;
pub use error::HttpDaoError;
