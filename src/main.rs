#![no_std]
#![no_main]

use esp_hal::Async;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart, UartRx};
use esp_println::println;

extern crate alloc;

use esp_wifi::wifi;

use embassy_net::{Config, Stack, StackResources};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use esp_hal_embassy::Executor;
use static_cell::StaticCell;

use thermal_uplink::capture::CaptureOrchestrator;
use thermal_uplink::http::UploadUrl;
use thermal_uplink::net::{self, TcpTransport};
use thermal_uplink::status_led::{self, BlinkPattern};
use thermal_uplink::time::WallClock;
use thermal_uplink::uplink::{SessionTimings, UplinkSession};
use thermal_uplink::wifi::WiFiManager;
use thermal_uplink::{VERSION, config};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

type LedSignal = Signal<CriticalSectionRawMutex, BlinkPattern>;
type Session = UplinkSession<'static, WiFiManager<'static>, TcpTransport<'static>, &'static LedSignal>;

static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static LED_SIGNAL: LedSignal = Signal::new();
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("[PANIC] {}", info);
    loop {}
}

#[embassy_executor::task]
async fn net_task(
    mut runner: embassy_net::Runner<'static, esp_wifi::wifi::WifiDevice<'static>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn led_task(mut led: Output<'static>) -> ! {
    status_led::led_task_loop(&mut led, &LED_SIGNAL).await
}

/// Capture → upload → wait, forever
#[embassy_executor::task]
async fn acquisition_task(
    mut rx: UartRx<'static, Async>,
    mut session: Session,
    stack: Stack<'static>,
) -> ! {
    let mut capture = CaptureOrchestrator::default();
    let mut clock = WallClock::new();
    let capture_timeout = Duration::from_millis(config::CAPTURE_TIMEOUT_MS);

    log::info!("[MAIN] Acquisition loop started");

    loop {
        if session.ensure_connected().await && !clock.is_synchronized() {
            if let Err(e) = net::sync_time(stack, &mut clock).await {
                log::warn!("[NTP] Time sync failed: {:?}", e);
            }
        }

        let wait = match capture.capture(&mut rx, &clock, capture_timeout).await {
            Ok(frame) => {
                let summary = frame.summary();
                log::info!(
                    "[MAIN] Frame OK: min={:.2}C max={:.2}C mean={:.2}C ts={}",
                    summary.min,
                    summary.max,
                    summary.mean,
                    frame.timestamp()
                );
                if !clock.is_synchronized() {
                    log::warn!("[MAIN] Clock not synchronized, timestamp is seconds since boot");
                }

                let outcome = session.upload(&frame).await;
                log::info!("[MAIN] Upload outcome: {:?}", outcome);
                Duration::from_secs(config::UPLOAD_INTERVAL_SECS)
            }
            Err(timeout) => {
                log::warn!(
                    "[MAIN] No valid frame in {} ms ({} bytes buffered)",
                    config::CAPTURE_TIMEOUT_MS,
                    timeout.buffered
                );
                Duration::from_millis(config::NO_FRAME_BACKOFF_MS)
            }
        };

        let stats = capture.stats();
        let uplink = session.stats();
        log::info!(
            "[MAIN] Stats: frames={} decode_fail={} invalid={} timeouts={} overflow={}B | delivered={} rejected={} failed={} skipped={}",
            stats.frames,
            stats.decode_failures,
            stats.validation_failures,
            stats.timeouts,
            stats.overflowed,
            uplink.delivered,
            uplink.rejected,
            uplink.failed,
            uplink.skipped
        );

        Timer::after(wait).await;
    }
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);
    println!("[MAIN] thermal-uplink v{} starting", VERSION);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    let upload_url = match UploadUrl::parse(config::UPLOAD_URL) {
        Ok(url) => url,
        Err(e) => panic!("UPLOAD_URL {:?} is not a valid http:// URL: {:?}", config::UPLOAD_URL, e),
    };
    println!(
        "[MAIN] Uploading to {}:{}{}",
        upload_url.host, upload_url.port, upload_url.path
    );

    // Thermal sensor UART: 8N1, no flow control
    let uart_config = UartConfig::default().with_baudrate(config::UART_BAUD);
    let uart = Uart::new(peripherals.UART1, uart_config)
        .unwrap()
        .with_rx(peripherals.GPIO4)
        .with_tx(peripherals.GPIO5)
        .into_async();
    let (uart_rx, _uart_tx) = uart.split();
    println!(
        "[UART] Sensor UART on RX GPIO{} / TX GPIO{} at {} baud",
        config::UART_RX_PIN,
        config::UART_TX_PIN,
        config::UART_BAUD
    );

    let led = Output::new(peripherals.GPIO8, Level::Low, OutputConfig::default());
    println!("[LED] Status LED on GPIO{}", config::LED_PIN);

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let mut rng = Rng::new(peripherals.RNG);
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let wifi_init = esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK).unwrap();
    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);

    let (wifi_controller, wifi_interfaces) = wifi::new(wifi_init_ref, peripherals.WIFI).unwrap();
    println!("[WIFI] WiFi driver initialized successfully");

    // embassy-net stack with DHCP; sockets: DNS, TCP upload, SNTP
    let stack_resources = STACK_RESOURCES.init(StackResources::new());
    let (stack, runner) = embassy_net::new(
        wifi_interfaces.sta,
        Config::dhcpv4(Default::default()),
        stack_resources,
        seed,
    );

    let session = UplinkSession::new(
        WiFiManager::new(wifi_controller, stack),
        TcpTransport::new(stack),
        upload_url,
        &LED_SIGNAL,
        SessionTimings::default(),
    );

    LED_SIGNAL.signal(BlinkPattern::Boot);

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        println!("[MAIN] Spawning network task...");
        spawner.spawn(net_task(runner)).unwrap();

        println!("[MAIN] Spawning LED task...");
        spawner.spawn(led_task(led)).unwrap();

        println!("[MAIN] Spawning acquisition task...");
        spawner
            .spawn(acquisition_task(uart_rx, session, stack))
            .unwrap();
    });
}
