pub mod client;

pub mod mock;

pub use client::{UpstreamApi, UpstreamClient, UpstreamResponse};
pub use mock::MockUpstream;
pub use reqwest::Method;
