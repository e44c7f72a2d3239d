//! Locating the end of the HTTP response headers.
//!
//! The response is not parsed; the scanner only finds the blank line that
//! separates the headers from the body. Delivery may be split anywhere,
//! including inside the `\r\n\r\n` terminator itself.

use log::debug;
use std::fmt;
use std::io::{self, BufRead};

/// Incremental matcher for the `\r\n\r\n` header terminator.
///
/// # Example
///
/// ```
/// use weather_fetch_esp32::http::HeaderScanner;
///
/// let mut scanner = HeaderScanner::new();
/// assert_eq!(scanner.feed(b"HTTP/1.1 200 OK\r\n\r"), None);
/// assert_eq!(scanner.feed(b"\n{}"), Some(1));
/// assert!(scanner.is_complete());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeaderScanner {
    /// Length of the terminator prefix matched so far (0-4).
    matched: usize,
    /// Header bytes seen, terminator included.
    consumed: usize,
}

impl HeaderScanner {
    /// Create a scanner at the start of a response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the response.
    ///
    /// Returns the offset within `chunk` just past the terminator once it has
    /// been seen. Bytes after that offset belong to the body. After
    /// completion every further chunk returns `Some(0)`.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<usize> {
        if self.is_complete() {
            return Some(0);
        }

        for (i, &byte) in chunk.iter().enumerate() {
            self.matched = match (self.matched, byte) {
                (0, b'\r') => 1,
                (1, b'\n') => 2,
                (1, b'\r') => 1,
                (2, b'\r') => 3,
                (3, b'\n') => 4,
                (3, b'\r') => 1,
                _ => 0,
            };

            if self.is_complete() {
                self.consumed += i + 1;
                return Some(i + 1);
            }
        }

        self.consumed += chunk.len();
        None
    }

    /// Whether the terminator has been seen.
    pub fn is_complete(&self) -> bool {
        self.matched == 4
    }

    /// Number of header bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

/// Advance `reader` past the response headers.
///
/// On success the reader is positioned at the first body byte and the number
/// of header bytes is returned.
pub fn skip_headers<R: BufRead>(reader: &mut R) -> Result<usize, HeaderError> {
    let mut scanner = HeaderScanner::new();

    loop {
        let (found, available) = {
            let buf = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(HeaderError::TimedOut),
                Err(e) => return Err(HeaderError::Io(e)),
            };
            if buf.is_empty() {
                return Err(HeaderError::Incomplete {
                    consumed: scanner.consumed(),
                });
            }
            (scanner.feed(buf), buf.len())
        };

        match found {
            Some(end) => {
                reader.consume(end);
                debug!("HTTP headers end after {} bytes", scanner.consumed());
                return Ok(scanner.consumed());
            }
            None => reader.consume(available),
        }
    }
}

/// Socket read timeouts surface as `WouldBlock` on Unix and `TimedOut` on
/// Windows and lwIP.
pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Errors while reading the response headers.
#[derive(Debug)]
pub enum HeaderError {
    /// The peer closed the connection before the headers ended.
    Incomplete { consumed: usize },
    /// No data arrived within the read timeout.
    TimedOut,
    /// Socket error.
    Io(io::Error),
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete { consumed } => {
                write!(f, "connection closed after {} header bytes", consumed)
            }
            Self::TimedOut => write!(f, "timed out waiting for headers"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for HeaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
        Server: openresty\r\n\
        Content-Type: application/json; charset=utf-8\r\n\
        Content-Length: 2\r\n\
        Connection: close\r\n\
        \r\n\
        {}";

    fn header_len() -> usize {
        RESPONSE.len() - 2
    }

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_single_chunk() {
        let mut scanner = HeaderScanner::new();
        assert_eq!(scanner.feed(RESPONSE), Some(header_len()));
        assert_eq!(scanner.consumed(), header_len());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut scanner = HeaderScanner::new();
        let mut end = None;
        for (i, byte) in RESPONSE.iter().enumerate() {
            if scanner.feed(std::slice::from_ref(byte)).is_some() {
                end = Some(i + 1);
                break;
            }
        }
        assert_eq!(end, Some(header_len()));
    }

    #[test]
    fn test_every_split_point() {
        for split in 0..=RESPONSE.len() {
            let (first, second) = RESPONSE.split_at(split);
            let mut scanner = HeaderScanner::new();
            let end = match scanner.feed(first) {
                Some(end) => end,
                None => split + scanner.feed(second).expect("terminator in second half"),
            };
            assert_eq!(end, header_len(), "split at {}", split);
        }
    }

    #[test]
    fn test_single_crlf_lines_do_not_terminate() {
        let mut scanner = HeaderScanner::new();
        assert_eq!(scanner.feed(b"A: 1\r\nB: 2\r\n\rC: 3\r\n"), None);
        assert_eq!(scanner.feed(b"\r\n"), Some(2));
    }

    #[test]
    fn test_repeated_carriage_returns() {
        let mut scanner = HeaderScanner::new();
        assert_eq!(scanner.feed(b"X\r\r\n\r\r\n\r\n"), Some(9));
    }

    #[test]
    fn test_complete_stays_complete() {
        let mut scanner = HeaderScanner::new();
        assert!(scanner.feed(b"\r\n\r\n").is_some());
        assert_eq!(scanner.feed(b"more body"), Some(0));
        assert_eq!(scanner.consumed(), 4);
    }

    #[test]
    fn test_skip_headers_positions_reader_at_body() {
        for chunk in [1, 3, 7, 64] {
            let mut reader = BufReader::with_capacity(
                5,
                Trickle {
                    data: RESPONSE,
                    chunk,
                },
            );
            assert_eq!(skip_headers(&mut reader).unwrap(), header_len());

            let mut body = String::new();
            reader.read_to_string(&mut body).unwrap();
            assert_eq!(body, "{}");
        }
    }

    #[test]
    fn test_skip_headers_eof() {
        let mut reader = Cursor::new(&b"HTTP/1.1 200 OK\r\nServer: x\r\n"[..]);
        let result = skip_headers(&mut reader);
        assert!(matches!(result, Err(HeaderError::Incomplete { consumed: 28 })));
    }

    #[test]
    fn test_skip_headers_timeout() {
        struct Silent;
        impl Read for Silent {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"))
            }
        }

        let mut reader = BufReader::new(Silent);
        assert!(matches!(
            skip_headers(&mut reader),
            Err(HeaderError::TimedOut)
        ));
    }
}
