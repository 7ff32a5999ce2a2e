//! WiFi module for ESP32-C3 board
//!
//! Station-mode association using esp-wifi 0.14.1; the embassy-net stack runs
//! DHCP once the link is up.

use crate::uplink::Link;
use crate::{BoardError, config};
use embassy_net::Stack;
use esp_wifi::wifi::{AuthMethod, ClientConfiguration, Configuration, WifiController};

/// WiFi manager driving the station interface
pub struct WiFiManager<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    configured: bool,
}

impl<'a> WiFiManager<'a> {
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>) -> Self {
        Self {
            controller,
            stack,
            configured: false,
        }
    }

    /// Apply the compile-time credentials to the controller
    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        if ssid.is_empty() {
            log::error!("[WIFI] WIFI_SSID is empty, set it in .env");
            return Err(BoardError::ConfigError);
        }

        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| BoardError::ConfigError)?,
            password: password.try_into().map_err(|_| BoardError::ConfigError)?,
            auth_method,
            ..Default::default()
        };

        self.controller
            .set_configuration(&Configuration::Client(client_config))
            .map_err(|_| BoardError::WiFiError)?;
        self.configured = true;
        Ok(())
    }

    /// Log the DHCP lease, if any
    pub fn log_dhcp_info(&self) {
        let Some(cfg) = self.stack.config_v4() else {
            log::info!("[DHCP] No DHCP configuration available");
            return;
        };

        log::info!(
            "[DHCP] IP Address: {}/{}",
            cfg.address.address(),
            cfg.address.prefix_len()
        );
        if let Some(gateway) = cfg.gateway {
            log::info!("[DHCP] Gateway: {}", gateway);
        }
        for (i, dns) in cfg.dns_servers.iter().enumerate() {
            log::info!("[DHCP] DNS Server {}: {}", i + 1, dns);
        }
    }
}

impl Link for WiFiManager<'_> {
    fn is_associated(&mut self) -> bool {
        self.controller.is_connected().unwrap_or(false)
    }

    async fn connect(&mut self) -> Result<(), BoardError> {
        if !self.configured {
            self.configure(config::WIFI_SSID, config::WIFI_PASSWORD)?;
        }

        if !matches!(self.controller.is_started(), Ok(true)) {
            log::info!("[WIFI] Starting station interface");
            self.controller.start_async().await.map_err(|e| {
                log::warn!("[WIFI] start failed: {:?}", e);
                BoardError::WiFiError
            })?;
        }

        log::info!("[WIFI] Connecting to WiFi network: {}", config::WIFI_SSID);
        self.controller.connect_async().await.map_err(|e| {
            log::warn!("[WIFI] connect failed: {:?}", e);
            BoardError::WiFiError
        })?;

        log::info!("[WIFI] Associated, waiting for DHCP lease");
        self.stack.wait_config_up().await;
        self.log_dhcp_info();
        Ok(())
    }
}
