//! Minimal HTTP/1.1 client pieces.
//!
//! Only what one fixed GET needs: rendering the request and skipping the
//! response headers. Status codes and header values are not interpreted.

mod headers;
mod request;

pub use headers::{skip_headers, HeaderError, HeaderScanner};
pub use request::GetRequest;

pub(crate) use headers::is_timeout;
