#![cfg_attr(not(test), no_std)]

//! ESP32-C3 Thermal Camera Uplink Library
//!
//! This library provides the pieces of a WiFi-enabled bridge that reads frames
//! from a UART-attached 24x32 thermal sensor and posts them to an HTTP collector.

extern crate alloc;

pub mod buffer;
pub mod capture;
pub mod frame;
pub mod http;
pub mod protocol;
pub mod sntp;
pub mod state_machine;
pub mod status_led;
pub mod time;
pub mod uplink;

#[cfg(feature = "firmware")]
pub mod net;
#[cfg(feature = "firmware")]
pub mod wifi;

/// Project version information
pub const VERSION: &str = "0.1.0";

/// Default configuration constants
pub mod config {
    /// Thermal sensor UART baud rate (8N1, no flow control)
    pub const UART_BAUD: u32 = 115_200;

    /// Thermal sensor UART RX GPIO pin
    pub const UART_RX_PIN: u8 = 4;

    /// Thermal sensor UART TX GPIO pin
    pub const UART_TX_PIN: u8 = 5;

    /// Status LED GPIO pin
    pub const LED_PIN: u8 = 8;

    /// Capacity of the UART accumulation buffer in bytes
    pub const ACCUMULATION_CAPACITY: usize = 8192;

    /// Largest single UART read appended to the accumulation buffer
    pub const UART_CHUNK_SIZE: usize = 256;

    /// How long one Byte Reader pass waits for the first byte
    pub const UART_POLL_INTERVAL_MS: u64 = 20;

    /// Pause between synchronization attempts when no frame is ready
    pub const CAPTURE_RETRY_DELAY_MS: u64 = 10;

    /// Deadline for one capture call
    pub const CAPTURE_TIMEOUT_MS: u64 = 5000;

    /// Wait after a capture timeout before the next cycle
    pub const NO_FRAME_BACKOFF_MS: u64 = 2000;

    /// Interval between upload cycles
    pub const UPLOAD_INTERVAL_SECS: u64 = 90;

    /// WiFi configuration
    /// Read from environment variables at compile time
    pub const WIFI_SSID: &str = env!("WIFI_SSID");
    pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

    /// Collector endpoint, `http://host[:port]/path`
    pub const UPLOAD_URL: &str = env!("UPLOAD_URL");

    /// WiFi association timeout for a single attempt in milliseconds
    pub const WIFI_CONNECT_TIMEOUT_MS: u64 = 15000;

    /// Connection attempts per reconnect round
    pub const WIFI_MAX_RETRIES: u32 = 3;

    /// First reconnect backoff; doubled after every failed attempt
    pub const WIFI_BACKOFF_BASE_MS: u64 = 1000;

    /// Upper bound for the reconnect backoff
    pub const WIFI_BACKOFF_MAX_MS: u64 = 8000;

    /// Whole-request timeout for one upload
    pub const HTTP_TIMEOUT_MS: u64 = 30000;

    /// SNTP server queried at boot and whenever the clock is not synchronized
    pub const NTP_SERVER: &str = "pool.ntp.org";

    /// SNTP query timeout
    pub const NTP_TIMEOUT_MS: u64 = 5000;
}

/// Error types for the thermal uplink board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// WiFi connection error
    WiFiError,
    /// HTTP request or response error
    HttpError,
    /// Host name resolution failed
    DnsError,
    /// TCP connection could not be established
    ConnectError,
    /// Time synchronization error
    TimeSyncError,
    /// Invalid compile-time configuration
    ConfigError,
    /// Operation did not finish in time
    Timeout,
}
