//! Thermal frame capture
//!
//! Drives UART reads, frame synchronization, decoding and validation until one
//! valid frame is produced or the capture deadline passes.

use crate::buffer::AccumulationBuffer;
use crate::config;
use crate::frame::ThermalFrame;
use crate::protocol::{FrameOutcome, GRID_LEN, Grid, next_frame};
use crate::time::WallClock;
use embassy_time::{Duration, Instant, Timer, with_timeout};
use embedded_io_async::{Error as _, Read};

/// Wait for follow-up bytes once a read has returned data
const DRAIN_GAP: Duration = Duration::from_millis(1);

/// Pulls whatever the UART has into the accumulation buffer
pub struct ByteReader {
    poll_interval: Duration,
    chunk: [u8; config::UART_CHUNK_SIZE],
}

impl ByteReader {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            chunk: [0; config::UART_CHUNK_SIZE],
        }
    }

    /// Drain available bytes into `buffer`, waiting at most one poll interval
    /// for the first byte. Returns the number of bytes appended.
    pub async fn fill<R: Read, const N: usize>(
        &mut self,
        rx: &mut R,
        buffer: &mut AccumulationBuffer<N>,
    ) -> usize {
        let mut total = 0;
        let mut wait = self.poll_interval;

        // At most one buffer's worth per call
        for _ in 0..(N / config::UART_CHUNK_SIZE).max(1) {
            match with_timeout(wait, rx.read(&mut self.chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => {
                    let evicted = buffer.extend(&self.chunk[..n]);
                    if evicted > 0 {
                        log::debug!("[UART] Buffer full, dropped {} oldest bytes", evicted);
                    }
                    total += n;
                    wait = DRAIN_GAP;
                }
                Ok(Err(e)) => {
                    log::warn!("[UART] Read error: {:?}", e.kind());
                    break;
                }
            }
        }

        total
    }
}

impl Default for ByteReader {
    fn default() -> Self {
        Self::new(Duration::from_millis(config::UART_POLL_INTERVAL_MS))
    }
}

/// No valid frame arrived before the capture deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionTimeout {
    /// Bytes left in the accumulation buffer when giving up
    pub buffered: usize,
}

/// Capture counters since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u32,
    pub decode_failures: u32,
    pub validation_failures: u32,
    pub timeouts: u32,
    /// Bytes evicted by the accumulation buffer's capacity bound
    pub overflowed: usize,
}

/// Owns the accumulation buffer and runs the capture loop
pub struct CaptureOrchestrator<const N: usize = { config::ACCUMULATION_CAPACITY }> {
    buffer: AccumulationBuffer<N>,
    reader: ByteReader,
    grid: Grid,
    retry_delay: Duration,
    stats: CaptureStats,
}

impl<const N: usize> CaptureOrchestrator<N> {
    pub fn new(reader: ByteReader, retry_delay: Duration) -> Self {
        Self {
            buffer: AccumulationBuffer::new(),
            reader,
            grid: [0.0; GRID_LEN],
            retry_delay,
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            overflowed: self.buffer.overflowed(),
            ..self.stats
        }
    }

    /// Bytes currently waiting in the accumulation buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Poll `rx` until a valid frame is decoded or `timeout` elapses.
    ///
    /// Corrupt frames are skipped and polling continues; the accumulation
    /// buffer keeps any partial frame for the next call.
    pub async fn capture<R: Read>(
        &mut self,
        rx: &mut R,
        clock: &WallClock,
        timeout: Duration,
    ) -> Result<ThermalFrame, AcquisitionTimeout> {
        let deadline = Instant::now() + timeout;
        log::info!(
            "[CAPTURE] Waiting for thermal frame (timeout: {} ms)",
            timeout.as_millis()
        );

        while Instant::now() < deadline {
            self.reader.fill(rx, &mut self.buffer).await;

            loop {
                match next_frame(&mut self.buffer, &mut self.grid) {
                    FrameOutcome::Ready => {
                        self.stats.frames += 1;
                        log::info!("[CAPTURE] ✅ Thermal frame decoded");
                        return Ok(ThermalFrame::new(self.grid, clock.now_secs()));
                    }
                    FrameOutcome::DecodeFailure { payload_len } => {
                        self.stats.decode_failures += 1;
                        log::warn!(
                            "[CAPTURE] ❌ Unknown payload layout ({} bytes), trying next frame",
                            payload_len
                        );
                    }
                    FrameOutcome::ValidationFailure { min, max } => {
                        self.stats.validation_failures += 1;
                        log::warn!(
                            "[CAPTURE] ❌ Implausible frame (min={:.2}C max={:.2}C), trying next frame",
                            min,
                            max
                        );
                    }
                    FrameOutcome::Incomplete { needed, available } => {
                        log::debug!(
                            "[CAPTURE] Waiting for more data: need {}, have {}",
                            needed,
                            available
                        );
                        break;
                    }
                    FrameOutcome::NoData | FrameOutcome::NoSync => break,
                }
            }

            Timer::after(self.retry_delay).await;
        }

        self.stats.timeouts += 1;
        let buffered = self.buffer.len();
        if buffered > 0 {
            log::warn!(
                "[CAPTURE] Timeout: {} bytes buffered but no complete valid frame",
                buffered
            );
        } else {
            log::warn!(
                "[CAPTURE] Timeout: no data received. Check sensor wiring on GPIO{} and baud rate {}",
                config::UART_RX_PIN,
                config::UART_BAUD
            );
        }
        Err(AcquisitionTimeout { buffered })
    }
}

impl Default for CaptureOrchestrator {
    fn default() -> Self {
        Self::new(
            ByteReader::default(),
            Duration::from_millis(config::CAPTURE_RETRY_DELAY_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadLayout;
    use crate::protocol::tests::{encode_frame, uniform};
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embedded_io_async::{ErrorKind, ErrorType};

    /// UART stand-in that hands out pre-recorded chunks, then reports no data
    struct ScriptedUart {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ScriptedUart {
        fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into_iter().collect(),
            }
        }

        fn push(&mut self, chunk: Vec<u8>) {
            self.chunks.push_back(chunk);
        }
    }

    impl ErrorType for ScriptedUart {
        type Error = Infallible;
    }

    impl Read for ScriptedUart {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            if chunk.len() > buf.len() {
                let rest = chunk.split_off(buf.len());
                self.chunks.push_front(rest);
            }
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    struct BrokenUart;

    impl ErrorType for BrokenUart {
        type Error = ErrorKind;
    }

    impl Read for BrokenUart {
        async fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
            Err(ErrorKind::Other)
        }
    }

    fn orchestrator() -> CaptureOrchestrator {
        CaptureOrchestrator::new(
            ByteReader::new(Duration::from_millis(5)),
            Duration::from_millis(1),
        )
    }

    fn synced_clock() -> WallClock {
        let mut clock = WallClock::new();
        assert!(clock.set_unix_time(1_700_000_000));
        clock
    }

    #[test]
    fn reader_drains_all_chunks() {
        let mut uart = ScriptedUart::new([alloc::vec![1u8; 300], alloc::vec![2u8; 10]]);
        let mut buffer = AccumulationBuffer::<1024>::new();
        let mut reader = ByteReader::new(Duration::from_millis(5));
        assert_eq!(block_on(reader.fill(&mut uart, &mut buffer)), 310);
        assert_eq!(buffer.len(), 310);
        assert_eq!(block_on(reader.fill(&mut uart, &mut buffer)), 0);
    }

    #[test]
    fn reader_treats_uart_errors_as_no_data() {
        let mut buffer = AccumulationBuffer::<64>::new();
        let mut reader = ByteReader::new(Duration::from_millis(5));
        assert_eq!(block_on(reader.fill(&mut BrokenUart, &mut buffer)), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn captures_twenty_degree_frame() {
        let mut uart = ScriptedUart::new([encode_frame(&uniform(20.0), PayloadLayout::Plain)]);
        let clock = synced_clock();
        let mut capture = orchestrator();

        let frame = block_on(capture.capture(&mut uart, &clock, Duration::from_millis(500)))
            .expect("frame");
        assert!(frame.temperatures().iter().all(|&t| t == 20.0));
        assert!((1_700_000_000..=1_700_000_001).contains(&frame.timestamp()));
        assert_eq!(capture.stats().frames, 1);
    }

    #[test]
    fn times_out_on_noise() {
        let mut uart = ScriptedUart::new([alloc::vec![0x11u8; 64]]);
        let clock = WallClock::new();
        let mut capture = orchestrator();

        let started = Instant::now();
        let result = block_on(capture.capture(&mut uart, &clock, Duration::from_millis(30)));
        assert_eq!(result, Err(AcquisitionTimeout { buffered: 1 }));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(capture.stats().timeouts, 1);
    }

    #[test]
    fn partial_frame_survives_between_captures() {
        let bytes = encode_frame(&uniform(18.5), PayloadLayout::WithSubHeader);
        let (head, tail) = bytes.split_at(700);
        let mut uart = ScriptedUart::new([head.to_vec()]);
        let clock = synced_clock();
        let mut capture = orchestrator();

        assert!(block_on(capture.capture(&mut uart, &clock, Duration::from_millis(20))).is_err());
        assert_eq!(capture.buffered(), 700);

        uart.push(tail.to_vec());
        let frame = block_on(capture.capture(&mut uart, &clock, Duration::from_millis(500)))
            .expect("frame");
        assert!(frame.temperatures().iter().all(|&t| t == 18.5));
    }

    #[test]
    fn skips_corrupt_frames_within_one_capture() {
        let mut hot = uniform(25.0);
        hot[10] = 250.0;
        let mut stream = encode_frame(&hot, PayloadLayout::Plain);
        stream.extend_from_slice(&[0x5A, 0x5A, 0x04, 0x00, 0xAA, 0xBB, 0xCC, 0xDD]);
        stream.extend(encode_frame(&uniform(26.0), PayloadLayout::Plain));

        let mut uart = ScriptedUart::new([stream]);
        let clock = synced_clock();
        let mut capture = orchestrator();

        let frame = block_on(capture.capture(&mut uart, &clock, Duration::from_millis(500)))
            .expect("frame");
        assert!(frame.temperatures().iter().all(|&t| t == 26.0));

        let stats = capture.stats();
        assert_eq!(stats.validation_failures, 1);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.frames, 1);
    }
}
