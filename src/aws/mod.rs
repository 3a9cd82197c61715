//! AWS transport: credentials, SigV4-signed HTTP, service clients

pub mod client;
pub mod credentials;
pub mod http;

pub use client::AwsServiceClient;
