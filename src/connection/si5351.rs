//! Si5351 output programming
//!
//! A reference clock change is applied by driving one Si5351 output from PLLA: the
//! PLL runs at an even integer multiple of the requested rate inside its 600-900 MHz
//! lock range, the output Multisynth divides by that integer, and the crystal-to-PLL
//! ratio carries the fraction. Both dividers use the chip's `P1/P2/P3` encoding.

use super::spi::WRITE_FLAG;
use crate::{ConnectionError, Result};

const PLL_MIN_HZ: u64 = 600_000_000;
const PLL_MAX_HZ: u64 = 900_000_000;

/// Largest fractional denominator the chip accepts.
const MAX_DENOMINATOR: u64 = 1_048_575;

const MULTISYNTH_MIN_DIVIDER: u64 = 8;
const MULTISYNTH_MAX_DIVIDER: u64 = 2048;
const PLL_MIN_MULTIPLIER: u64 = 15;
const PLL_MAX_MULTIPLIER: u64 = 90;

/// Highest output with the regular eight-register Multisynth block.
pub const MAX_OUTPUT: u8 = 5;

const PLLA_PARAMETERS: u8 = 26;
const MULTISYNTH0_PARAMETERS: u8 = 42;
const CLK0_CONTROL: u8 = 16;
const PLL_RESET: u8 = 177;

/// Powered up, integer mode, PLLA source, Multisynth output, 8 mA drive.
const CLK_CONTROL_INTEGER_PLLA: u8 = 0x4F;
const PLLA_RESET: u8 = 0x20;

/// Divider `a + b / c` in register form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Divider {
    a: u64,
    b: u64,
    c: u64,
}

impl Divider {
    fn registers(self, base: u8) -> [(u8, u8); 8] {
        let floor = 128 * self.b / self.c;
        let p1 = 128 * self.a + floor - 512;
        let p2 = 128 * self.b - self.c * floor;
        let p3 = self.c;
        let bytes = [
            (p3 >> 8) as u8,
            p3 as u8,
            ((p1 >> 16) & 0x03) as u8,
            (p1 >> 8) as u8,
            p1 as u8,
            (((p3 >> 12) & 0xF0) | ((p2 >> 16) & 0x0F)) as u8,
            (p2 >> 8) as u8,
            p2 as u8,
        ];
        let mut registers = [(0u8, 0u8); 8];
        for (offset, byte) in bytes.into_iter().enumerate() {
            registers[offset] = (base + offset as u8, byte);
        }
        registers
    }
}

/// Register writes that set `output` to `rate_hz` from a `crystal_hz` reference.
pub(crate) fn output_registers(crystal_hz: u64, rate_hz: f64, output: u8) -> Result<Vec<(u8, u8)>> {
    if output > MAX_OUTPUT {
        return Err(ConnectionError::invalid_argument(format!("Si5351 output {} is not programmable", output)));
    }
    if !rate_hz.is_finite() || rate_hz < 1.0 {
        return Err(ConnectionError::invalid_argument(format!("reference clock rate {} Hz", rate_hz)));
    }
    let rate = rate_hz.round() as u64;

    let mut divider = PLL_MAX_HZ / rate;
    if divider % 2 == 1 {
        divider -= 1;
    }
    if !(MULTISYNTH_MIN_DIVIDER..=MULTISYNTH_MAX_DIVIDER).contains(&divider) {
        return Err(ConnectionError::invalid_argument(format!(
            "reference clock rate {} Hz is outside the Si5351 output range",
            rate
        )));
    }
    let pll = rate * divider;
    debug_assert!((PLL_MIN_HZ..=PLL_MAX_HZ).contains(&pll));

    let multiplier = pll / crystal_hz.max(1);
    if !(PLL_MIN_MULTIPLIER..=PLL_MAX_MULTIPLIER).contains(&multiplier) {
        return Err(ConnectionError::invalid_argument(format!(
            "crystal {} Hz cannot reach a {} Hz PLL",
            crystal_hz, pll
        )));
    }
    let remainder = pll % crystal_hz;
    let pll_divider = if crystal_hz <= MAX_DENOMINATOR {
        Divider { a: multiplier, b: remainder, c: crystal_hz }
    } else {
        let b = (remainder * MAX_DENOMINATOR + crystal_hz / 2) / crystal_hz;
        Divider { a: multiplier, b, c: MAX_DENOMINATOR }
    };
    let output_divider = Divider { a: divider, b: 0, c: 1 };

    let mut registers = Vec::with_capacity(18);
    registers.extend(pll_divider.registers(PLLA_PARAMETERS));
    registers.extend(output_divider.registers(MULTISYNTH0_PARAMETERS + 8 * output));
    registers.push((CLK0_CONTROL + output, CLK_CONTROL_INTEGER_PLLA));
    registers.push((PLL_RESET, PLLA_RESET));
    Ok(registers)
}

/// Si5351 SPI write word for one register.
pub(crate) fn write_word(address: u8, data: u8) -> u32 {
    WRITE_FLAG | (u32::from(address) << 8) | u32::from(data)
}
