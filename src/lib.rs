// s3inbox library: upload-only S3 inbox proxy

pub mod auth;
pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messenger;
pub mod pipeline;
pub mod policy;
pub mod proxy;
pub mod router;
pub mod s3;
