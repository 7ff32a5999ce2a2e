fn main() {
    // Load .env file for WiFi and collector configuration
    load_env_config();

    // Host builds (unit tests) link against std; only the board image needs the esp linker scripts
    let firmware = std::env::var_os("CARGO_FEATURE_FIRMWARE").is_some();
    let target = std::env::var("TARGET").unwrap_or_default();
    if firmware && target.starts_with("riscv32") {
        linker_be_nice();
        // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
        println!("cargo:rustc-link-arg=-Tlinkall.x");
    }
}

/// Load environment configuration from .env file
/// Environment variables take priority over .env file values
fn load_env_config() {
    use std::env;
    use std::path::Path;

    // Tell cargo to rerun this build script if .env file changes
    println!("cargo:rerun-if-changed=.env");

    // Tell cargo to rerun if environment variables change
    println!("cargo:rerun-if-env-changed=WIFI_SSID");
    println!("cargo:rerun-if-env-changed=WIFI_PASSWORD");
    println!("cargo:rerun-if-env-changed=UPLOAD_URL");

    // Try to load .env file if it exists
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    // Empty strings are treated the same as unset variables
    let read = |key: &str| env::var(key).unwrap_or_default().trim().to_string();
    let wifi_ssid = read("WIFI_SSID");
    let wifi_password = read("WIFI_PASSWORD");
    let upload_url = read("UPLOAD_URL");

    // Set environment variables for the compilation
    println!("cargo:rustc-env=WIFI_SSID={}", wifi_ssid);
    println!("cargo:rustc-env=WIFI_PASSWORD={}", wifi_password);
    println!("cargo:rustc-env=UPLOAD_URL={}", upload_url);

    // Print status only when building the board image
    if env::var_os("CARGO_FEATURE_FIRMWARE").is_none() {
        return;
    }

    if wifi_ssid.is_empty() {
        println!("cargo:warning=WIFI_SSID is empty - WiFi will not be configured");
    } else {
        println!("cargo:warning=WIFI_SSID configured: {}", wifi_ssid);
    }

    if wifi_password.is_empty() {
        println!("cargo:warning=WIFI_PASSWORD is empty - using open network");
    } else {
        println!("cargo:warning=WIFI_PASSWORD configured (length: {})", wifi_password.len());
    }

    if upload_url.is_empty() {
        println!("cargo:warning=UPLOAD_URL is empty - the firmware will halt at boot");
    } else {
        println!("cargo:warning=UPLOAD_URL configured: {}", upload_url);
    }
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                "esp_wifi_preempt_enable"
                | "esp_wifi_preempt_yield_task"
                | "esp_wifi_preempt_task_create" => {
                    eprintln!();
                    eprintln!("💡 `esp-wifi` has no scheduler enabled. Make sure you have the `builtin-scheduler` feature enabled, or that you provide an external scheduler.");
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
}
