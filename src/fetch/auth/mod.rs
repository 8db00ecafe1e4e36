//! Authentication wrappers for [`HttpClient`](crate::fetch::HttpClient).

mod api_key;

pub use api_key::ApiKey;
