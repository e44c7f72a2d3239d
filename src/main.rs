//! Weather fetch binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `OW_KEY=... cargo run`
//! - **ESP32**: `WIFI_SSID=... WIFI_PASSWORD=... OW_KEY=... cargo espflash flash --features esp32 --release`
//!
//! On ESP32 the secrets are baked in at compile time. On the host the
//! process environment is consulted first.

use log::{error, info};
use weather_fetch_esp32::session::{self, Session};
use weather_fetch_esp32::AppConfig;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(feature = "esp32")]
fn main() {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use weather_fetch_esp32::network::WifiNetwork;

    platform_init();
    info!("=== Weather fetch starting ===");

    let config = match AppConfig::from_build_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid build configuration: {}", e);
            session::halt();
        }
    };

    let (peripherals, sysloop) = match (Peripherals::take(), EspSystemEventLoop::take()) {
        (Ok(peripherals), Ok(sysloop)) => (peripherals, sysloop),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to take peripherals: {:?}", e);
            session::halt();
        }
    };

    // A driver that fails to come up reports NoShield to the session
    let network = WifiNetwork::new(peripherals.modem, sysloop);

    let mut session = Session::new(network, std::io::stdout(), config);
    match session.run() {
        Ok(outcome) => info!("Fetch complete: {:?}", outcome),
        Err(e) => error!("Fetch failed: {}", e),
    }

    session::halt();
}

#[cfg(not(feature = "esp32"))]
fn main() {
    use weather_fetch_esp32::config::build_env;
    use weather_fetch_esp32::network::HostNetwork;

    platform_init();
    info!("=== Weather fetch starting (host) ===");

    // The host has no radio, so any SSID will do
    let config = AppConfig::from_lookup(|key| {
        std::env::var(key)
            .ok()
            .or_else(|| build_env(key))
            .or_else(|| (key == "WIFI_SSID").then(|| "host".to_string()))
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = Session::new(HostNetwork::new(), std::io::stdout(), config);
    match session.run() {
        Ok(outcome) => info!("Fetch complete: {:?}", outcome),
        Err(e) => {
            error!("Fetch failed: {}", e);
            std::process::exit(1);
        }
    }
}
