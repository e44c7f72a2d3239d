//! Raw pass-through of the response.

use crate::http::is_timeout;
use log::debug;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

/// Bytes moved per read.
const ECHO_CHUNK: usize = 256;

/// Pause before polling again when no data is available.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Copy everything from `reader` to `writer` until the peer disconnects.
///
/// Bytes are forwarded verbatim, headers included. A read timeout or
/// interrupt only means nothing has arrived yet, so polling continues.
/// Returns the number of bytes forwarded.
pub fn echo_until_disconnect<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut buf = [0u8; ECHO_CHUNK];
    let mut total: u64 = 0;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                writer.write_all(&buf[..n])?;
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(e),
        }
    }

    writer.flush()?;
    debug!("Peer disconnected after {} bytes", total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted reader: each entry is one `read` result.
    struct Script(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
            }
        }
    }

    #[test]
    fn test_forwards_everything_verbatim() {
        let response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n{\"cod\":200}\x00\xff";
        let mut reader = &response[..];
        let mut console = Vec::new();

        let n = echo_until_disconnect(&mut reader, &mut console).unwrap();
        assert_eq!(n, response.len() as u64);
        assert_eq!(console, response);
    }

    #[test]
    fn test_larger_than_one_chunk() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(ECHO_CHUNK * 3 + 17).collect();
        let mut reader = &payload[..];
        let mut console = Vec::new();

        echo_until_disconnect(&mut reader, &mut console).unwrap();
        assert_eq!(console, payload);
    }

    #[test]
    fn test_waits_through_stalls() {
        let mut reader = Script(VecDeque::from(vec![
            Ok(b"HTTP/1.1 ".to_vec()),
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no data")),
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
            Ok(b"200 OK".to_vec()),
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            Ok(b"\r\n".to_vec()),
        ]));
        let mut console = Vec::new();

        let n = echo_until_disconnect(&mut reader, &mut console).unwrap();
        assert_eq!(console, b"HTTP/1.1 200 OK\r\n");
        assert_eq!(n, 17);
    }

    #[test]
    fn test_reset_is_an_error() {
        let mut reader = Script(VecDeque::from(vec![
            Ok(b"partial".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]));
        let mut console = Vec::new();

        let err = echo_until_disconnect(&mut reader, &mut console).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(console, b"partial");
    }
}
