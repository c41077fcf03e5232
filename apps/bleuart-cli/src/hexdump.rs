//! Hex + ASCII dump of received payloads.

use anyhow::{Context, Result, bail};

/// Bytes per dump line.
const LINE_WIDTH: usize = 16;

/// Format `data` as `OOOO: HH HH ... ASCII` lines, 16 bytes each.
pub fn hexdump(data: &[u8]) -> Vec<String> {
    data.chunks(LINE_WIDTH)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = chunk
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
                .collect();
            format!("{:04X}: {:<48} {}", i * LINE_WIDTH, hex, ascii)
        })
        .collect()
}

/// Parse a hex string such as `DEADBEEF` or `de ad be ef`.
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = input.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if let Some(pos) = digits.iter().position(|b| !b.is_ascii_hexdigit()) {
        bail!("non-hex character at offset {}", pos);
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    digits
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            // Both bytes are ASCII hex digits, so this is valid UTF-8.
            let pair = std::str::from_utf8(pair).context("hex pair is not UTF-8")?;
            u8::from_str_radix(pair, 16).with_context(|| format!("bad hex at offset {}", i * 2))
        })
        .collect()
}
