//! Uplink session: keeps WiFi associated and delivers frames with one POST each

use crate::BoardError;
use crate::config;
use crate::frame::ThermalFrame;
use crate::http::UploadUrl;
use crate::state_machine::{LinkEvent, LinkStateMachine};
use crate::status_led::{PatternSink, StatusIndicator};
use embassy_time::{Duration, Timer, with_timeout};

/// WiFi association as seen by the session
#[allow(async_fn_in_trait)]
pub trait Link {
    /// Driver-reported association status
    fn is_associated(&mut self) -> bool;

    /// Run one association attempt
    async fn connect(&mut self) -> Result<(), BoardError>;
}

/// Carries one JSON body to the collector
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// POST `body` and return the HTTP status code
    async fn post_json(&mut self, url: &UploadUrl<'_>, body: &[u8]) -> Result<u16, BoardError>;
}

/// Result of one upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Collector answered 200
    Delivered,
    /// Collector answered something other than 200
    Rejected(u16),
    /// Request could not be completed
    TransportError(BoardError),
    /// Link was down; nothing was sent
    Skipped,
}

/// Upload counters since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UplinkStats {
    pub delivered: u32,
    pub rejected: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Per-attempt time limits
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(config::WIFI_CONNECT_TIMEOUT_MS),
            request_timeout: Duration::from_millis(config::HTTP_TIMEOUT_MS),
        }
    }
}

pub struct UplinkSession<'a, L, T, S> {
    link: L,
    transport: T,
    url: UploadUrl<'a>,
    machine: LinkStateMachine,
    indicator: StatusIndicator<S>,
    timings: SessionTimings,
    stats: UplinkStats,
}

impl<'a, L: Link, T: Transport, S: PatternSink> UplinkSession<'a, L, T, S> {
    pub fn new(link: L, transport: T, url: UploadUrl<'a>, sink: S, timings: SessionTimings) -> Self {
        Self {
            link,
            transport,
            url,
            machine: LinkStateMachine::default(),
            indicator: StatusIndicator::new(sink),
            timings,
            stats: UplinkStats::default(),
        }
    }

    /// Replace the state machine (retry budget and backoff)
    pub fn with_state_machine(mut self, machine: LinkStateMachine) -> Self {
        self.machine = machine;
        self
    }

    pub fn state(&self) -> &LinkStateMachine {
        &self.machine
    }

    pub fn stats(&self) -> UplinkStats {
        self.stats
    }

    pub fn indicator(&self) -> &StatusIndicator<S> {
        &self.indicator
    }

    fn event(&mut self, event: LinkEvent) {
        self.machine.handle_event(event);
        self.indicator.update(
            self.machine.get_current_state(),
            self.machine.get_upload_state(),
        );
    }

    /// Align the state machine with what the driver reports
    pub fn refresh(&mut self) {
        let associated = self.link.is_associated();
        if self.machine.is_connected() && !associated {
            log::warn!("[WIFI] Association lost");
            self.event(LinkEvent::AssociationLost);
        } else if !self.machine.is_connected() && associated {
            log::info!("[WIFI] Association restored by driver");
            self.event(LinkEvent::AssociationUp);
        }
    }

    /// Make sure the link is up, running one bounded connect round if needed.
    /// Returns whether the link is connected afterwards.
    pub async fn ensure_connected(&mut self) -> bool {
        self.refresh();
        if self.machine.is_connected() {
            return true;
        }

        self.event(LinkEvent::ConnectRequested);
        while self.machine.should_retry() {
            log::info!(
                "[WIFI] Connection attempt {}",
                self.machine.get_retry_count() + 1
            );

            match with_timeout(self.timings.connect_timeout, self.link.connect()).await {
                Ok(Ok(())) => {
                    log::info!("[WIFI] ✅ Connected");
                    self.event(LinkEvent::AssociationUp);
                    return true;
                }
                Ok(Err(e)) => log::warn!("[WIFI] ❌ Connection failed: {:?}", e),
                Err(_) => log::warn!(
                    "[WIFI] ❌ Connection timed out after {} ms",
                    self.timings.connect_timeout.as_millis()
                ),
            }

            self.event(LinkEvent::AssociationFailed);
            if self.machine.should_retry() {
                let backoff = self.machine.backoff_ms();
                log::info!("[WIFI] Retrying in {} ms", backoff);
                Timer::after(Duration::from_millis(backoff)).await;
            }
        }

        log::error!("[WIFI] Giving up until next cycle");
        false
    }

    /// POST `frame` once. Never retries; a failed upload only reconnects
    /// when the link itself went down.
    pub async fn upload(&mut self, frame: &ThermalFrame) -> UploadOutcome {
        self.refresh();
        if !self.machine.is_connected() {
            self.stats.skipped += 1;
            log::warn!("[UPLINK] Link down, dropping frame");
            return UploadOutcome::Skipped;
        }

        let body = frame.to_json();
        self.event(LinkEvent::UploadStarted);

        let result = with_timeout(
            self.timings.request_timeout,
            self.transport.post_json(&self.url, body.as_bytes()),
        )
        .await
        .unwrap_or(Err(BoardError::Timeout));

        let outcome = match result {
            Ok(200) => UploadOutcome::Delivered,
            Ok(status) => UploadOutcome::Rejected(status),
            Err(e) => UploadOutcome::TransportError(e),
        };

        match outcome {
            UploadOutcome::Delivered => {
                self.stats.delivered += 1;
                log::info!("[UPLINK] ✅ Frame delivered ({} bytes)", body.len());
                self.event(LinkEvent::UploadSucceeded);
            }
            UploadOutcome::Rejected(status) => {
                self.stats.rejected += 1;
                log::warn!("[UPLINK] ❌ Collector answered {}", status);
                self.event(LinkEvent::UploadFailed);
            }
            UploadOutcome::TransportError(e) => {
                self.stats.failed += 1;
                log::warn!("[UPLINK] ❌ Upload failed: {:?}", e);
                self.event(LinkEvent::UploadFailed);
                self.refresh();
            }
            UploadOutcome::Skipped => {}
        }

        outcome
    }
}
