//! Interactive test menu.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use bleuart_core::session::Session;
use bleuart_core::transport::SimulatedDevice;
use tracing::{error, info};

use crate::hexdump::hexdump;

/// Menu entries, keyed by the input that selects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Connection,
    Led,
    Status,
    LargeData,
    Adc,
    Quit,
    Invalid,
}

fn parse_choice(input: &str) -> Choice {
    match input.trim() {
        "0" => Choice::Connection,
        "1" => Choice::Led,
        "2" => Choice::Status,
        "3" => Choice::LargeData,
        "4" => Choice::Adc,
        "q" | "Q" => Choice::Quit,
        _ => Choice::Invalid,
    }
}

fn print_menu(connected: bool) {
    println!("\nAvailable commands:");
    if connected {
        println!("0. Disconnect device");
        println!("1. LED Control Test");
        println!("2. System Status Test");
        println!("3. Large Data Transfer Test");
        println!("4. ADC Data Test");
    } else {
        println!("0. Connect to device");
    }
    println!("q. Exit");
}

fn read_line(input: &mut impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Run the menu until the user quits or stdin closes.
pub fn run(session: &Session<SimulatedDevice>) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    println!("\nBLE UART Device Testing Program");
    println!("==============================");

    loop {
        let connected = session.is_connected();
        print_menu(connected);
        print!("\nSelect a command: ");
        io::stdout().flush()?;

        let Some(line) = read_line(&mut input)? else {
            break;
        };

        match (connected, parse_choice(&line)) {
            (_, Choice::Quit) => break,
            (false, Choice::Connection) => {
                session.transport().reconnect();
                println!("Connected to {}", session.transport().name());
            }
            (false, _) => println!("Invalid choice. Please connect to device first."),
            (true, Choice::Connection) => {
                session.transport().disconnect();
                println!("Device disconnected successfully!");
            }
            (true, Choice::Led) => {
                if let Err(e) = session.send_led(true) {
                    error!("Failed to turn LED on: {}", e);
                    continue;
                }
                info!("LED turned ON");
                println!("Press Enter to turn it off...");
                read_line(&mut input)?;
                match session.send_led(false) {
                    Ok(()) => info!("LED turned OFF"),
                    Err(e) => error!("Failed to turn LED off: {}", e),
                }
            }
            (true, Choice::Status) => match session.system_status() {
                Ok(status) => println!("System status: {}", status),
                Err(e) => error!("Failed to get system status: {}", e),
            },
            (true, Choice::LargeData) => match session.large_data() {
                Ok(data) => {
                    println!("Received large data, total size: {} bytes", data.len());
                    for line in hexdump(&data) {
                        println!("{}", line);
                    }
                }
                Err(e) => error!("Failed to receive large data: {}", e),
            },
            (true, Choice::Adc) => match session.read_adc() {
                Ok(value) => println!("ADC value: {}", value),
                Err(e) => error!("Failed to get ADC data: {}", e),
            },
            (true, Choice::Invalid) => println!("Invalid choice. Please try again."),
        }
    }

    if session.is_connected() {
        session.transport().disconnect();
        info!("Disconnected from device");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("0\n"), Choice::Connection);
        assert_eq!(parse_choice(" 3 "), Choice::LargeData);
        assert_eq!(parse_choice("q"), Choice::Quit);
        assert_eq!(parse_choice("7"), Choice::Invalid);
    }

    #[test]
    fn test_read_line_eof() {
        let mut input = io::Cursor::new(b"2\n".to_vec());
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some("2\n"));
        assert_eq!(read_line(&mut input).unwrap(), None);
    }
}
