use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;

use chara_serial_api::transport::Transport;
use chara_serial_api::transport::serial::SerialConfig;
use chara_serial_api::{DeviceSession, DiagnosticsReport};

const KEY_POLLS: usize = 20;
const KEY_POLL_TIMEOUT: Duration = Duration::from_millis(500);
const STATUS_SETTINGS: [u16; 5] = [0x10, 0x20, 0x30, 0x40, 0x50];

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let Some(port) = args.next() else {
        print_usage();
        return Ok(());
    };

    let mut config = SerialConfig::new(port);
    let mut json = false;
    for arg in args {
        match arg.as_str() {
            "--json" => json = true,
            baud => config = config.baud_rate(baud.parse()?),
        }
    }

    println!("Connecting to device at {}...", config.path);
    let session = match DeviceSession::open_serial_with(&config) {
        Ok(session) => session,
        Err(err) => {
            print_troubleshooting();
            return Err(Box::new(err));
        }
    };

    run_probe(session, json)
}

fn run_probe<T: Transport>(
    mut session: DeviceSession<T>,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    if !session.init() {
        return Err("failed to initialize device".into());
    }

    let info = session.device_info();
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        heading("DEVICE INFORMATION");
        println!("Port: {}", info.port.as_deref().unwrap_or("unknown"));
        if let Some(baud_rate) = info.baud_rate {
            println!("Baud rate: {baud_rate}");
        }
        println!("Version: {}", info.version.as_deref().unwrap_or("unknown"));
        if let Some(identity) = &info.identity {
            println!("Company: {}", identity.company);
            println!("Device: {}", identity.device);
            println!("Chipset: {}", identity.chipset);
        }
        if let Some(caps) = info.capabilities {
            println!("Key count: {}", caps.key_count);
            println!("Layer count: {}", caps.layer_count);
            println!("Profile count: {}", caps.profile_count);
        }
    }

    heading("SYSTEM STATUS");
    let chord_count = session.chord_count();
    println!("Stored chords: {chord_count}");
    match session.ram_available() {
        Some(bytes) => println!("RAM available: {bytes} bytes"),
        None => println!("RAM available: command not supported"),
    }

    println!("\nSettings:");
    for setting_id in STATUS_SETTINGS {
        if let Some(value) = session.setting(0, setting_id) {
            println!("  Setting 0x{setting_id:02X}: {value}");
        }
    }

    heading("SAMPLE CHORDS");
    for index in 0..chord_count.min(3) {
        let chord = session.chord(index);
        println!("\nChord #{index}:");
        println!("  Actions hex: {}", chord.actions_hex);
        println!("  Actions: {:?}", chord.actions);
        println!("  Phrase hex: {}", chord.phrase_hex);
        println!("  Phrase: {}", format_phrase(&chord.phrase));
    }

    heading("REAL-TIME KEY TEST");
    println!("Press any key on the device...");
    for _ in 0..KEY_POLLS {
        match session.query_key(Some(KEY_POLL_TIMEOUT)) {
            Some(0) => {}
            Some(key) => println!("  Key pressed: {key} (0x{key:X})"),
            None => println!("  No response"),
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    heading("COMPREHENSIVE TEST");
    let report = session.diagnostics();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    session.close();
    Ok(())
}

fn print_summary(report: &DiagnosticsReport) {
    println!("Summary:");
    println!("- Firmware: {}", report.version.as_deref().unwrap_or("unknown"));
    println!("- Device: {}", report.identity.as_deref().unwrap_or("unknown"));
    println!("- Chords: {}", report.chord_count);
    match report.ram_available {
        Some(bytes) => println!("- RAM: {bytes}"),
        None => println!("- RAM: n/a"),
    }
    if !report.settings.is_empty() {
        println!("- Settings read: {}", report.settings.len());
    }
    if let Some(chord) = &report.sample_chord {
        println!("- Sample chord phrase: {}", format_phrase(&chord.phrase));
    }
}

fn format_phrase(phrase: &[u16]) -> String {
    let codes: Vec<String> = phrase.iter().map(|code| format!("0x{code:x}")).collect();
    format!("[{}]", codes.join(", "))
}

fn heading(title: &str) {
    println!("\n{}", "=".repeat(50));
    println!("{title}");
    println!("{}", "=".repeat(50));
}

fn print_troubleshooting() {
    eprintln!("Troubleshooting tips:");
    eprintln!("1. Check that the device is connected");
    eprintln!("2. Check the port name (e.g. ls /dev/tty*)");
    eprintln!("3. Check permissions on the port");
    eprintln!("4. Try a different baud rate (9600, 57600, 115200)");
}

fn print_usage() {
    println!("Usage:");
    println!("  cargo run --example device_probe -- <PORT> [BAUD] [--json]");
}
