use std::error::Error;
use std::process::ExitCode;

use chara_serial_api::DeviceSession;

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
    let Some(port) = std::env::args().nth(1) else {
        print_usage();
        return Ok(());
    };

    println!("Testing connection to {port}...");
    let mut session = DeviceSession::open_serial(&port)?;

    let version = session.command(&["VERSION"]);
    if version.is_empty() {
        println!("no response to VERSION");
    } else {
        println!("version: {}", version.join(" "));
    }

    let identity = session.command(&["ID"]);
    if identity.len() >= 3 {
        println!("device: {}", identity.join(" "));
    } else {
        println!("no response to ID");
    }

    session.close();
    Ok(())
}

fn print_usage() {
    println!("Usage:");
    println!("  cargo run --example quick_check -- <PORT>");
}
