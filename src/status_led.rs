//! Single-LED status indication
//!
//! The Uplink Session reports link/upload state; [`StatusIndicator`] turns
//! state changes into [`BlinkPattern`]s and hands them to a sink. On the board
//! the sink is a [`Signal`] read by [`led_task_loop`], which drives the GPIO.

use crate::state_machine::{LinkState, UploadState};
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;

/// One LED step: level and how long to hold it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkStep {
    pub on: bool,
    pub ms: u64,
}

const fn step(on: bool, ms: u64) -> BlinkStep {
    BlinkStep { on, ms }
}

const FAST_BLINK: [BlinkStep; 2] = [step(true, 200), step(false, 200)];

const CONNECTED_CONFIRM: [BlinkStep; 6] = [
    step(true, 500),
    step(false, 200),
    step(true, 500),
    step(false, 200),
    step(true, 500),
    step(false, 200),
];

const UPLOAD_CONFIRM: [BlinkStep; 2] = [step(true, 300), step(false, 0)];

const BOOT: [BlinkStep; 4] = [
    step(true, 100),
    step(false, 100),
    step(true, 100),
    step(false, 100),
];

/// LED patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPattern {
    Off,
    /// Repeats until replaced; shown while associating
    FastBlink,
    /// Three long blinks when the link comes up
    ConnectedConfirm,
    /// One short blink after an accepted upload
    UploadConfirm,
    /// Two blinks at power-up
    Boot,
}

impl BlinkPattern {
    pub fn steps(self) -> &'static [BlinkStep] {
        match self {
            BlinkPattern::Off => &[],
            BlinkPattern::FastBlink => &FAST_BLINK,
            BlinkPattern::ConnectedConfirm => &CONNECTED_CONFIRM,
            BlinkPattern::UploadConfirm => &UPLOAD_CONFIRM,
            BlinkPattern::Boot => &BOOT,
        }
    }

    /// Repeating patterns loop until another pattern arrives
    pub fn repeats(self) -> bool {
        matches!(self, BlinkPattern::FastBlink)
    }
}

/// Pattern for a state change from `previous` to (`link`, `upload`)
pub fn blink_pattern(previous: LinkState, link: LinkState, upload: UploadState) -> BlinkPattern {
    match (previous, link, upload) {
        (_, LinkState::Connecting, _) => BlinkPattern::FastBlink,
        (LinkState::Disconnected | LinkState::Connecting, LinkState::Connected, _) => {
            BlinkPattern::ConnectedConfirm
        }
        (LinkState::Connected, LinkState::Connected, UploadState::Succeeded) => {
            BlinkPattern::UploadConfirm
        }
        _ => BlinkPattern::Off,
    }
}

/// Destination for blink patterns
pub trait PatternSink {
    fn show(&mut self, pattern: BlinkPattern);
}

impl<M: RawMutex> PatternSink for &Signal<M, BlinkPattern> {
    fn show(&mut self, pattern: BlinkPattern) {
        self.signal(pattern);
    }
}

/// Emits a pattern whenever the observed state changes
pub struct StatusIndicator<S> {
    sink: S,
    link: LinkState,
    upload: UploadState,
}

impl<S: PatternSink> StatusIndicator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            link: LinkState::Disconnected,
            upload: UploadState::Idle,
        }
    }

    /// Feed the current state; returns the pattern sent, if any
    pub fn update(&mut self, link: LinkState, upload: UploadState) -> Option<BlinkPattern> {
        if (link, upload) == (self.link, self.upload) {
            return None;
        }

        let pattern = blink_pattern(self.link, link, upload);
        self.link = link;
        self.upload = upload;
        self.sink.show(pattern);
        Some(pattern)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

fn set_led<P: OutputPin>(led: &mut P, on: bool) {
    let result = if on { led.set_high() } else { led.set_low() };
    if result.is_err() {
        log::warn!("[LED] Failed to drive status LED");
    }
}

/// Play the steps of `pattern` once, then leave the LED off
pub async fn play_once<P: OutputPin>(led: &mut P, pattern: BlinkPattern) {
    for s in pattern.steps() {
        set_led(led, s.on);
        if s.ms > 0 {
            Timer::after(Duration::from_millis(s.ms)).await;
        }
    }
    set_led(led, false);
}

/// LED player: waits for patterns on `signal` and renders them.
///
/// One-shot patterns always play to the end; a repeating pattern runs until
/// the next one is signalled.
pub async fn led_task_loop<P: OutputPin, M: RawMutex>(
    led: &mut P,
    signal: &Signal<M, BlinkPattern>,
) -> ! {
    set_led(led, false);
    let mut next = signal.wait().await;

    loop {
        log::debug!("[LED] Pattern: {:?}", next);

        if !next.repeats() {
            play_once(led, next).await;
            next = signal.wait().await;
            continue;
        }

        'repeat: loop {
            for s in next.steps() {
                set_led(led, s.on);
                if let Either::Second(pattern) =
                    select(Timer::after(Duration::from_millis(s.ms)), signal.wait()).await
                {
                    next = pattern;
                    break 'repeat;
                }
            }
        }
    }
}
