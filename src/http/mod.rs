//! HTTP client layer: `SessionHttp` bootstrap client.

pub mod client;

pub use client::SessionHttp;
