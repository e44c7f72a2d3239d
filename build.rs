fn main() {
    // Secrets are captured with option_env!, so rebuild when they change
    for key in [
        "WIFI_SSID",
        "WIFI_PASSWORD",
        "OW_KEY",
        "WEATHER_LAT",
        "WEATHER_LON",
        "WEATHER_UNITS",
        "WEATHER_RESPONSE_MODE",
        "WIFI_FIRMWARE_VERSION",
    ] {
        println!("cargo:rerun-if-env-changed={}", key);
    }

    // ESP-IDF link arguments are only needed for Xtensa targets
    if std::env::var("TARGET").is_ok_and(|target| target.contains("xtensa")) {
        embuild::espidf::sysenv::output();
    }
}
