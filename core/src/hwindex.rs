//! `HwIndex`: the 12-bit address space binding every switch-matrix cell, I2C
//! expander bit, and hardware-PWM channel to one flat identifier.
//!
//! `idx in [0, 320)` is the switch-state address space (`Matrix`/`I2c`);
//! `idx in [320, 324)` is a second, smaller reserved band for the four
//! fixed hardware-PWM channels. Only `idx >= 324` decodes to `Invalid`.

use crate::config::{HW_PWM_CHANNELS, I2C_ADDR_BASE, I2C_ADDRS_PER_CHANNEL, I2C_CHANNELS, MATRIX_COLS};

/// Which part of the address space a [`HwIndex`] decodes into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    /// `byte in [0, MATRIX_COLS)`: switch-matrix cell (column = byte, row = bit).
    Matrix,
    /// `byte in [MATRIX_COLS, MATRIX_COLS + 4*8)`: an I2C GPIO expander bit.
    I2c,
    /// `byte == MATRIX_COLS + 4*8`, `bit in [0, HW_PWM_CHANNELS)`: one of the
    /// four fixed hardware-PWM channels, reserved immediately past the last
    /// I2C byte so the flat index space stays a single contiguous range.
    HwPwm,
    /// Outside the addressable range, or otherwise unusable.
    Invalid,
}

/// A decoded [`HwIndex`]: the byte/bit split plus, for I2C-kind indices, the
/// channel and address that byte lives on, and for HwPwm-kind indices the
/// PWM channel number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HwIndex {
    raw: u16,
    pub kind: Kind,
    pub channel: u8,
    pub address: u8,
    pub byte: u8,
    pub bit: u8,
}

impl HwIndex {
    /// Decodes a raw 12-bit-ish index:
    /// `byte = idx/8, bit = idx%8`; `byte in [0,7]` is a matrix cell,
    /// `byte in [8,39]` is an I2C expander bit with
    /// `channel = (byte-8)/8`, `address = (byte-8)%8 + 0x40`; `byte == 40`
    /// with `bit in [0,4)` is a hardware-PWM channel.
    pub fn decode(idx: u16) -> Self {
        let byte = (idx / 8) as u8;
        let bit = (idx % 8) as u8;
        let matrix_bytes = MATRIX_COLS as u8;
        let i2c_bytes = (I2C_CHANNELS * I2C_ADDRS_PER_CHANNEL) as u8;
        let hw_pwm_byte = matrix_bytes + i2c_bytes;

        if byte < matrix_bytes {
            HwIndex {
                raw: idx,
                kind: Kind::Matrix,
                channel: 0,
                address: 0,
                byte,
                bit,
            }
        } else if byte < matrix_bytes + i2c_bytes {
            let rel = byte - matrix_bytes;
            let channel = rel / I2C_ADDRS_PER_CHANNEL as u8;
            let address = rel % I2C_ADDRS_PER_CHANNEL as u8 + I2C_ADDR_BASE;
            HwIndex {
                raw: idx,
                kind: Kind::I2c,
                channel,
                address,
                byte,
                bit,
            }
        } else if byte == hw_pwm_byte && (bit as usize) < HW_PWM_CHANNELS {
            HwIndex {
                raw: idx,
                kind: Kind::HwPwm,
                channel: bit,
                address: 0,
                byte,
                bit,
            }
        } else {
            HwIndex {
                raw: idx,
                kind: Kind::Invalid,
                channel: 0,
                address: 0,
                byte,
                bit,
            }
        }
    }

    /// Re-encodes back to the flat 12-bit-ish index. `encode(decode(idx)) ==
    /// idx` for every valid `idx`.
    pub fn encode(&self) -> u16 {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.kind != Kind::Invalid
    }

    /// The hardware-PWM channel number, valid only when `kind == HwPwm`.
    pub fn hw_pwm_channel(&self) -> u8 {
        self.channel
    }
}
