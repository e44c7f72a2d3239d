//! The fetch sequence.
//!
//! One pass, in order: check the radio, join WiFi, print link diagnostics,
//! send the GET, consume the response. Every step blocks. The only retry is
//! the WiFi join loop, which has no upper bound.
//!
//! Console text goes to the writer handed to [`Session::new`] (stdout on the
//! device, which ESP-IDF routes to UART0).
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(network, std::io::stdout(), config);
//! match session.run() {
//!     Ok(outcome) => info!("Done: {:?}", outcome),
//!     Err(e) => error!("Fetch failed: {}", e),
//! }
//! session::halt();
//! ```

use crate::config::AppConfig;
use crate::http::{skip_headers, GetRequest, HeaderError};
use crate::network::{LinkStatus, NetworkError, NetworkProvider};
use crate::response::{
    echo_until_disconnect, DeserializeError, JsonDocument, ResponseMode, WeatherSummary,
    DEFAULT_CAPACITY,
};
use log::{debug, error, info, warn};
use std::fmt;
use std::io::{self, BufReader, Write};
use std::thread;
use std::time::Duration;

/// Delay after each WiFi connection attempt.
pub const JOIN_RETRY_DELAY: Duration = Duration::from_secs(10);

/// How a completed run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The body parsed into a document.
    Parsed(JsonDocument),
    /// The body did not parse; the error was printed.
    ParseFailed(DeserializeError),
    /// Echo mode forwarded this many bytes before the peer disconnected.
    Echoed(u64),
}

/// Drives one fetch over a network provider, printing to a console.
pub struct Session<N: NetworkProvider, W: Write> {
    network: N,
    console: W,
    config: AppConfig,
    retry_delay: Duration,
}

impl<N: NetworkProvider, W: Write> Session<N, W> {
    /// Create a session with the default join retry delay.
    pub fn new(network: N, console: W, config: AppConfig) -> Self {
        Self {
            network,
            console,
            config,
            retry_delay: JOIN_RETRY_DELAY,
        }
    }

    /// Override the delay after each join attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// The network provider.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// The console writer.
    pub fn console(&self) -> &W {
        &self.console
    }

    /// Run the whole sequence.
    pub fn run(&mut self) -> Result<Outcome, SessionError> {
        self.ensure_radio_present()?;
        self.check_firmware()?;
        self.join()?;
        self.print_current_net()?;
        self.print_wifi_data()?;
        let stream = self.request()?;
        self.consume(stream)
    }

    /// Fail if there is no WiFi hardware.
    pub fn ensure_radio_present(&mut self) -> Result<(), SessionError> {
        if self.network.status() == LinkStatus::NoShield {
            writeln!(self.console, "WiFi shield not present")?;
            error!("No WiFi hardware, cannot continue");
            return Err(NetworkError::NoShield.into());
        }
        Ok(())
    }

    /// Compare the radio firmware against the configured version.
    ///
    /// A mismatch is only a warning. Returns `false` on mismatch.
    pub fn check_firmware(&mut self) -> Result<bool, SessionError> {
        let (Some(expected), Some(actual)) = (
            self.config.expected_firmware.as_deref(),
            self.network.firmware_version(),
        ) else {
            return Ok(true);
        };

        if actual != expected {
            warn!("Firmware {} does not match expected {}", actual, expected);
            writeln!(self.console, "Please upgrade the firmware")?;
            return Ok(false);
        }

        debug!("Firmware {} is current", actual);
        Ok(true)
    }

    /// Join the network, retrying until connected.
    ///
    /// Returns the number of attempts made.
    pub fn join(&mut self) -> Result<u32, SessionError> {
        let mut attempts = 0;

        loop {
            writeln!(
                self.console,
                "Attempting to connect to WPA SSID: {}",
                self.config.wifi.ssid
            )?;
            attempts += 1;
            let status = self.network.begin(&self.config.wifi);
            debug!("Join attempt {}: {}", attempts, status);

            thread::sleep(self.retry_delay);

            if status == LinkStatus::Connected {
                break;
            }
        }

        info!("Joined {} after {} attempt(s)", self.config.wifi.ssid, attempts);
        writeln!(self.console, "You're connected to the network")?;
        Ok(attempts)
    }

    /// Print SSID, BSSID, RSSI and encryption of the current link.
    pub fn print_current_net(&mut self) -> Result<(), SessionError> {
        let info = self.network.link_info();

        writeln!(self.console, "SSID: {}", or_unknown(info.ssid))?;
        writeln!(self.console, "BSSID: {}", or_unknown(info.bssid))?;
        writeln!(self.console, "signal strength (RSSI):{}", or_unknown(info.rssi))?;
        writeln!(self.console, "Encryption Type:{}", or_unknown(info.encryption))?;
        writeln!(self.console)?;
        Ok(())
    }

    /// Print the local IP and MAC address.
    pub fn print_wifi_data(&mut self) -> Result<(), SessionError> {
        let info = self.network.link_info();

        writeln!(self.console, "IP Address: {}", or_unknown(info.ip))?;
        writeln!(self.console, "MAC address: {}", or_unknown(info.mac))?;
        Ok(())
    }

    /// Connect to the API server and send the GET request.
    pub fn request(&mut self) -> Result<N::Stream, SessionError> {
        let endpoint = &self.config.endpoint;

        writeln!(self.console, "\nStarting connection to server...")?;
        let mut stream = self.network.open(
            endpoint.host,
            endpoint.port,
            self.config.mode.read_timeout(),
        )?;
        writeln!(self.console, "connected to server")?;

        GetRequest::new(endpoint, &self.config.query)
            .write_to(&mut stream)
            .map_err(SessionError::Request)?;
        info!("Request sent to {}", endpoint.address());

        Ok(stream)
    }

    /// Consume the response in the configured mode. The stream is closed on return.
    pub fn consume(&mut self, stream: N::Stream) -> Result<Outcome, SessionError> {
        match self.config.mode {
            ResponseMode::Parse => self.parse_response(stream),
            ResponseMode::Echo => self.echo_response(stream),
        }
    }

    fn parse_response(&mut self, stream: N::Stream) -> Result<Outcome, SessionError> {
        let mut reader = BufReader::new(stream);

        let header_bytes = skip_headers(&mut reader)?;
        debug!("Skipped {} header bytes", header_bytes);
        writeln!(self.console, "HTTP headers read.\n")?;

        writeln!(self.console, "Start deserializing from string now.")?;
        let doc = match JsonDocument::deserialize(&mut reader, DEFAULT_CAPACITY) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Response body rejected: {}", e);
                writeln!(self.console, "Deserialize error:")?;
                writeln!(self.console, "{}", e)?;
                return Ok(Outcome::ParseFailed(e));
            }
        };

        writeln!(self.console, "DESERIALIZATION OKAY!!")?;
        writeln!(self.console, "Used memory: {}", doc.memory_usage())?;
        writeln!(self.console, "JSON data as string:")?;
        writeln!(self.console, "{}", doc.to_json_string())?;

        if let Some(summary) = WeatherSummary::from_document(&doc) {
            info!("Weather: {}", summary);
        }

        Ok(Outcome::Parsed(doc))
    }

    fn echo_response(&mut self, mut stream: N::Stream) -> Result<Outcome, SessionError> {
        let n = echo_until_disconnect(&mut stream, &mut self.console)?;
        info!("Server disconnected after {} bytes", n);
        Ok(Outcome::Echoed(n))
    }
}

fn or_unknown<T: fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Block forever. The device needs a reset to run again.
pub fn halt() -> ! {
    info!("Halted");
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

/// Errors that end a run early.
#[derive(Debug)]
pub enum SessionError {
    /// Radio or socket setup failed.
    Network(NetworkError),
    /// Writing the request failed.
    Request(io::Error),
    /// The response headers never ended.
    Headers(HeaderError),
    /// Console write failed, or the socket failed while echoing.
    Io(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {}", e),
            Self::Request(e) => write!(f, "failed to send request: {}", e),
            Self::Headers(e) => write!(f, "bad response headers: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            Self::Request(e) | Self::Io(e) => Some(e),
            Self::Headers(e) => Some(e),
        }
    }
}

impl From<NetworkError> for SessionError {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

impl From<HeaderError> for SessionError {
    fn from(e: HeaderError) -> Self {
        Self::Headers(e)
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WifiConfig;
    use crate::network::{Encryption, LinkInfo, MacAddress};
    use std::cell::RefCell;
    use std::io::{Cursor, Read};
    use std::net::{IpAddr, Ipv4Addr};
    use std::rc::Rc;

    const WEATHER_BODY: &str = r#"{"weather":[{"id":800,"main":"Clear","description":"clear sky"}],"main":{"temp":75.2,"humidity":20},"name":"Salt Lake City","cod":200}"#;

    fn http_response(body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    fn test_config(mode: &str) -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "WIFI_SSID" => Some("HomeNet".to_string()),
            "WIFI_PASSWORD" => Some("password123".to_string()),
            "OW_KEY" => Some("test-key".to_string()),
            "WEATHER_RESPONSE_MODE" => Some(mode.to_string()),
            "WIFI_FIRMWARE_VERSION" => Some("v5.2".to_string()),
            _ => None,
        })
        .unwrap()
    }

    struct MockStream {
        input: Cursor<Vec<u8>>,
        sent: Rc<RefCell<Vec<u8>>>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct MockNetwork {
        present: bool,
        firmware: &'static str,
        /// Attempt number on which `begin` succeeds.
        connects_on: u32,
        attempts: u32,
        response: Vec<u8>,
        sent: Rc<RefCell<Vec<u8>>>,
        opened: Option<(String, u16, Option<Duration>)>,
    }

    impl MockNetwork {
        fn new(response: Vec<u8>) -> Self {
            Self {
                present: true,
                firmware: "v5.2",
                connects_on: 1,
                attempts: 0,
                response,
                sent: Rc::new(RefCell::new(Vec::new())),
                opened: None,
            }
        }
    }

    impl NetworkProvider for MockNetwork {
        type Stream = MockStream;

        fn status(&self) -> LinkStatus {
            if !self.present {
                LinkStatus::NoShield
            } else if self.attempts >= self.connects_on {
                LinkStatus::Connected
            } else {
                LinkStatus::Idle
            }
        }

        fn firmware_version(&self) -> Option<String> {
            Some(self.firmware.to_string())
        }

        fn begin(&mut self, _config: &WifiConfig) -> LinkStatus {
            self.attempts += 1;
            self.status()
        }

        fn link_info(&self) -> LinkInfo {
            LinkInfo {
                ip: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))),
                mac: Some(MacAddress([0x24, 0x0a, 0xc4, 0x01, 0x02, 0x03])),
                ssid: Some("HomeNet".to_string()),
                bssid: Some(MacAddress([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01])),
                rssi: Some(-61),
                encryption: Some(Encryption::Wpa2Psk),
            }
        }

        fn open(
            &mut self,
            host: &str,
            port: u16,
            read_timeout: Option<Duration>,
        ) -> Result<MockStream, NetworkError> {
            self.opened = Some((host.to_string(), port, read_timeout));
            Ok(MockStream {
                input: Cursor::new(self.response.clone()),
                sent: self.sent.clone(),
            })
        }
    }

    fn session(network: MockNetwork, mode: &str) -> Session<MockNetwork, Vec<u8>> {
        Session::new(network, Vec::new(), test_config(mode)).with_retry_delay(Duration::ZERO)
    }

    fn console_text(session: &Session<MockNetwork, Vec<u8>>) -> String {
        String::from_utf8_lossy(session.console()).into_owned()
    }

    #[test]
    fn test_parse_run() {
        let network = MockNetwork::new(http_response(WEATHER_BODY));
        let sent = network.sent.clone();
        let mut session = session(network, "parse");

        let outcome = session.run().unwrap();
        let doc = match outcome {
            Outcome::Parsed(doc) => doc,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(doc.to_json_string(), WEATHER_BODY);

        let request = GetRequest::new(&session.config.endpoint, &session.config.query);
        assert_eq!(*sent.borrow(), request.as_bytes());
        assert_eq!(
            session.network().opened,
            Some((
                "api.openweathermap.org".to_string(),
                80,
                Some(Duration::from_secs(3))
            ))
        );

        let text = console_text(&session);
        assert!(text.contains("HTTP headers read.\n"));
        assert!(text.contains("DESERIALIZATION OKAY!!"));
        assert!(text.contains(&format!("Used memory: {}\n", doc.memory_usage())));
        assert!(text.contains(&format!("JSON data as string:\n{}\n", WEATHER_BODY)));
    }

    #[test]
    fn test_diagnostics() {
        let mut session = session(MockNetwork::new(Vec::new()), "parse");
        session.print_current_net().unwrap();
        session.print_wifi_data().unwrap();

        assert_eq!(
            console_text(&session),
            "SSID: HomeNet\n\
             BSSID: DE:AD:BE:EF:00:01\n\
             signal strength (RSSI):-61\n\
             Encryption Type:WPA2-PSK (0x3)\n\
             \n\
             IP Address: 192.168.1.42\n\
             MAC address: 24:0A:C4:01:02:03\n"
        );
    }

    #[test]
    fn test_join_retries_until_connected() {
        let mut network = MockNetwork::new(Vec::new());
        network.connects_on = 3;
        let mut session = session(network, "parse");

        assert_eq!(session.join().unwrap(), 3);
        let text = console_text(&session);
        assert_eq!(
            text.matches("Attempting to connect to WPA SSID: HomeNet\n").count(),
            3
        );
        assert!(text.ends_with("You're connected to the network\n"));
    }

    #[test]
    fn test_default_retry_delay() {
        let session = Session::new(MockNetwork::new(Vec::new()), Vec::new(), test_config("parse"));
        assert_eq!(JOIN_RETRY_DELAY, Duration::from_secs(10));
        assert_eq!(session.retry_delay, JOIN_RETRY_DELAY);
    }

    #[test]
    fn test_no_shield_is_fatal() {
        let mut network = MockNetwork::new(http_response(WEATHER_BODY));
        network.present = false;
        let mut session = session(network, "parse");

        let result = session.run();
        assert!(matches!(
            result,
            Err(SessionError::Network(NetworkError::NoShield))
        ));
        assert_eq!(console_text(&session), "WiFi shield not present\n");
        assert_eq!(session.network().attempts, 0);
    }

    #[test]
    fn test_firmware_mismatch_is_a_warning() {
        let mut network = MockNetwork::new(http_response(WEATHER_BODY));
        network.firmware = "v4.4";
        let mut session = session(network, "parse");

        assert!(!session.check_firmware().unwrap());
        assert!(matches!(session.run(), Ok(Outcome::Parsed(_))));
        assert!(console_text(&session).starts_with("Please upgrade the firmware\n"));
    }

    #[test]
    fn test_parse_failure_still_completes() {
        let network = MockNetwork::new(http_response("<html>Bad Gateway</html>"));
        let mut session = session(network, "parse");

        let outcome = session.run().unwrap();
        assert!(matches!(
            outcome,
            Outcome::ParseFailed(DeserializeError::InvalidInput)
        ));
        assert!(console_text(&session).ends_with("Deserialize error:\nInvalidInput\n"));
    }

    #[test]
    fn test_oversized_body_reports_no_memory() {
        let members: Vec<String> = (0..60).map(|i| format!("\"k{}\":{}", i, i)).collect();
        let body = format!("{{{}}}", members.join(","));
        let mut session = session(MockNetwork::new(http_response(&body)), "parse");

        let outcome = session.run().unwrap();
        assert!(matches!(
            outcome,
            Outcome::ParseFailed(DeserializeError::NoMemory)
        ));
    }

    #[test]
    fn test_truncated_headers() {
        let network = MockNetwork::new(b"HTTP/1.1 200 OK\r\nContent-Type: appl".to_vec());
        let mut session = session(network, "parse");

        assert!(matches!(
            session.run(),
            Err(SessionError::Headers(HeaderError::Incomplete { .. }))
        ));
    }

    #[test]
    fn test_echo_run() {
        let response = http_response(WEATHER_BODY);
        let mut session = session(MockNetwork::new(response.clone()), "echo");

        let outcome = session.run().unwrap();
        assert!(matches!(outcome, Outcome::Echoed(n) if n == response.len() as u64));
        assert_eq!(session.network().opened.as_ref().unwrap().2, None);
        assert!(session.console().ends_with(&response));
    }

    #[cfg(not(feature = "esp32"))]
    #[test]
    fn test_fetch_from_local_server() {
        use crate::config::WeatherEndpoint;
        use crate::network::HostNetwork;

        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();

        let handle = thread::spawn(move || {
            let request = server.recv().unwrap();
            let url = request.url().to_string();
            let content_type =
                tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .unwrap();
            request
                .respond(tiny_http::Response::from_string(WEATHER_BODY).with_header(content_type))
                .unwrap();
            url
        });

        let mut config = test_config("parse");
        config.expected_firmware = None;
        config.endpoint = WeatherEndpoint::new("127.0.0.1", port);

        let mut session =
            Session::new(HostNetwork::new(), Vec::new(), config).with_retry_delay(Duration::ZERO);
        let outcome = session.run().unwrap();

        match outcome {
            Outcome::Parsed(doc) => assert_eq!(doc.to_json_string(), WEATHER_BODY),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            handle.join().unwrap(),
            "/data/2.5/weather?lat=40.7608&lon=-111.8910&units=imperial&cnt=1&appid=test-key"
        );
    }
}
