pub mod config;
pub mod debug;
pub mod error;
pub mod filter;
pub mod transcode;
pub mod upload;
pub mod video;
