mod hexdump;
mod menu;

use anyhow::{Context, Result};
use bleuart_core::session::{Session, SessionConfig};
use bleuart_core::transport::SimulatedDevice;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use hexdump::{hexdump, parse_hex};

#[derive(Parser, Debug)]
#[command(author, version, about = "BLE UART command link tool (device simulator backend)", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Session configuration file (TOML)
    #[arg(long)]
    config: Option<String>,

    /// ADC value reported by the simulated device
    #[arg(long, default_value_t = 0)]
    adc_value: u16,

    /// Status byte reported by the simulated device
    #[arg(long, default_value_t = 0)]
    status_byte: u8,

    /// Diagnosis report (hex) returned by the simulated device
    #[arg(long)]
    diagnosis: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Switch the LED
    Led {
        #[arg(value_enum)]
        state: LedState,
    },
    /// Query the system status byte
    Status,
    /// Fetch the streamed test payload
    LargeData,
    /// Read the ADC sample
    Adc,
    /// Request diagnosis data
    Diagnosis,
    /// Interactive test menu
    Menu,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LedState {
    On,
    Off,
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };

    let mut device = SimulatedDevice::new()
        .with_adc_value(args.adc_value)
        .with_status(args.status_byte);
    if let Some(hex) = &args.diagnosis {
        let report = parse_hex(hex).context("invalid --diagnosis value")?;
        device = device.with_diagnosis(report);
    }

    let session = Session::new(device, config)?;

    match args.command {
        Command::Led { state } => {
            let on = session.set_led(matches!(state, LedState::On))?;
            println!("LED {}", if on { "ON" } else { "OFF" });
        }
        Command::Status => println!("System status: {}", session.system_status()?),
        Command::LargeData => {
            let data = session.large_data()?;
            println!("Received large data, total size: {} bytes", data.len());
            for line in hexdump(&data) {
                println!("{}", line);
            }
        }
        Command::Adc => println!("ADC value: {}", session.read_adc()?),
        Command::Diagnosis => {
            let report = session.diagnosis()?;
            for line in hexdump(&report) {
                println!("{}", line);
            }
        }
        Command::Menu => {
            // The menu starts from a disconnected link, like a fresh radio.
            session.transport().disconnect();
            menu::run(&session)?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting BLE UART tool (simulator backend)...");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
