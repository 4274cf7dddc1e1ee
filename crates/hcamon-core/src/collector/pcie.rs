//! PCIe Max Read Request Size override.
//!
//! Bits 14:12 of the PCIe device control register select the Max Read Request
//! Size. The whole high nibble is replaced, the low 12 bits are preserved, and
//! the write is verified by reading the register back.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::collector::parser::{ParseError, parse_hex_register};
use crate::collector::traits::{CommandError, CommandRunner};

#[derive(Debug, Error)]
pub enum PcieError {
    #[error("high nibble {0:#x} out of range 0..=0xf")]
    InvalidNibble(u16),
    #[error("setpci failed: {0}")]
    Command(#[from] CommandError),
    #[error("cannot parse register: {0}")]
    Parse(#[from] ParseError),
    #[error("verification failed for {slot}: wrote {expected:04x}, read back {actual:04x}")]
    Verify {
        slot: String,
        expected: u16,
        actual: u16,
    },
}

/// Replaces the high nibble of a 16-bit register value.
pub fn with_high_nibble(current: u16, nibble: u16) -> u16 {
    (current & 0x0FFF) | (nibble << 12)
}

fn read_register<R: CommandRunner + ?Sized>(
    runner: &R,
    slot: &str,
    reg: &str,
    timeout: Duration,
) -> Result<u16, PcieError> {
    let out = runner.run_checked("setpci", &["-s", slot, reg], timeout)?;
    Ok(parse_hex_register(&out)?)
}

/// Sets the Max Read Request Size nibble of the device at `slot`.
///
/// # Arguments
/// * `runner` - Command runner used for `setpci`
/// * `slot` - PCI bus-device-function address
/// * `offset` - Config-space offset of the device control register (hex, without `0x`)
/// * `nibble` - New high nibble, `0..=0xF`
///
/// # Returns
/// The value written, after it has been read back and verified.
pub fn tune_max_read_request<R: CommandRunner + ?Sized>(
    runner: &R,
    slot: &str,
    offset: &str,
    nibble: u16,
    timeout: Duration,
) -> Result<u16, PcieError> {
    if nibble > 0xF {
        return Err(PcieError::InvalidNibble(nibble));
    }
    let reg = format!("{}.w", offset);

    let current = read_register(runner, slot, &reg, timeout)?;
    let new = with_high_nibble(current, nibble);
    debug!("{}: register {} {:04x} -> {:04x}", slot, reg, current, new);

    let assignment = format!("{}={:04x}", reg, new);
    let out = runner.run("setpci", &["-s", slot, &assignment], timeout)?;
    if !out.success() {
        return Err(CommandError::Failed {
            program: "setpci".to_string(),
            status: out.status,
            output: out.output.trim().to_string(),
        }
        .into());
    }

    let actual = read_register(runner, slot, &reg, timeout)?;
    if actual != new {
        return Err(PcieError::Verify {
            slot: slot.to_string(),
            expected: new,
            actual,
        });
    }

    if current != new {
        info!("{}: max read request register set to {:04x}", slot, new);
    }
    Ok(new)
}
