//! Global middleware registered on every site.

pub mod headers;

pub use headers::ResponseHeaders;
