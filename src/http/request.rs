//! The fixed GET request sent to the weather API.

use crate::config::{WeatherEndpoint, WeatherQuery};
use log::debug;
use std::io::{self, Write};

/// A rendered HTTP/1.1 GET request.
///
/// Every line ends in CRLF and the request ends with an empty line. There is
/// no body.
#[derive(Clone, PartialEq, Eq)]
pub struct GetRequest {
    bytes: Vec<u8>,
}

impl GetRequest {
    /// Render the request for `query` against `endpoint`.
    pub fn new(endpoint: &WeatherEndpoint, query: &WeatherQuery) -> Self {
        let text = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Content-Type: application/json\r\n\
             Connection: close\r\n\
             \r\n",
            query.request_target(),
            endpoint.host
        );
        Self {
            bytes: text.into_bytes(),
        }
    }

    /// Raw request bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the whole request and flush.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.bytes)?;
        writer.flush()?;
        debug!("Sent {} byte request", self.bytes.len());
        Ok(())
    }
}

// The request line carries the API key
impl std::fmt::Debug for GetRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetRequest")
            .field("len", &self.bytes.len())
            .finish()
    }
}
