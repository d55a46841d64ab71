//! su-s3: S3 backend for simple-uploader
//!
//! Puts objects into a bucket of any S3-compatible service. The SDK client
//! is built once and shared by every upload.

mod client;

pub use client::S3Backend;
