//! Integration tests for the VA-meter firmware.
//!
//! Run after flashing the firmware with an INA219 attached to the I2C bus.

mod device;
mod protocol;

use clap::Parser;
use colored::Colorize;

use device::{resolve_port, DeviceClient};
use tests::{print_results, run_all_tests};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for the VA-meter firmware")]
struct Args {
    /// Serial port for the device (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "19200")]
    baud: u32,

    /// Reset the board through RTS and check the startup banner
    #[arg(long)]
    reset: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Resolve port (auto-detect if "auto")
    let port = resolve_port(&args.port, args.baud)?;

    println!("{}", "VA-Meter Integration Tests".bold());
    println!("Port: {}", port);
    println!("Baud: {}", args.baud);
    println!();

    println!("Connecting to device...");
    let mut device = DeviceClient::new(&port, args.baud)?;

    if args.reset {
        device.wait_for_banner()?;
        println!("{}", "Banner received".green());
    } else {
        // Wait for bootloader output to finish, then clear buffer
        std::thread::sleep(std::time::Duration::from_secs(1));
        device.clear_buffer()?;
    }
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut device);
    print_results(&results);

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
