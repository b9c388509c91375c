//! Concrete [`pbio_core::Hal`] binding for this board's registers. Modeled
//! on a polled I2C controller (status-bit TIP/RXACK handshake) and
//! two-phase ticktimer/watchdog register handling, targeting this board's
//! own register map (`mem_map.rs`).

use volatile::Volatile;

use pbio_core::Hal;

use crate::mem_map::{offset, HW_CRG_BASE, HW_HWPWM_BASE, HW_I2C_BASE, HW_LED_BASE, HW_MATRIX_BASE, HW_SOLENOID_BASE, HW_TICKTIMER_BASE};

const TICKS_PER_MS: u64 = 100;

const I2C_STATUS_TIP: u32 = 1 << 0;
const I2C_STATUS_RXACK: u32 = 1 << 1;
const I2C_COMMAND_STA: u32 = 1 << 0;
const I2C_COMMAND_STO: u32 = 1 << 1;
const I2C_COMMAND_WR: u32 = 1 << 2;
const I2C_COMMAND_RD: u32 = 1 << 3;
const I2C_COMMAND_ACK: u32 = 1 << 4;

unsafe fn reg(base: usize, word_offset: usize) -> &'static mut Volatile<u32> {
    &mut *((base + word_offset * 4) as *mut Volatile<u32>)
}

/// The real hardware `Hal`. Construction is `unsafe` because it creates
/// aliased `&mut` register views over MMIO addresses fixed by the board;
/// exactly one instance must exist for the process lifetime, taken once in
/// `main`.
pub struct HalImpl;

impl HalImpl {
    /// # Safety
    /// Must be called at most once; the returned handle gives exclusive
    /// access to every MMIO register this firmware touches.
    pub unsafe fn new() -> Self {
        HalImpl
    }

    fn now_u64(&self) -> u64 {
        unsafe {
            let lo = reg(HW_TICKTIMER_BASE, offset::TICKTIMER_TIME0).read() as u64;
            let hi = reg(HW_TICKTIMER_BASE, offset::TICKTIMER_TIME1).read() as u64;
            lo | (hi << 32)
        }
    }

    fn i2c_tip_wait(&self, channel: u8, deadline_ms: u32) -> bool {
        let base = HW_I2C_BASE[channel as usize];
        unsafe {
            while reg(base, offset::I2C_STATUS).read() & I2C_STATUS_TIP == 0 {
                if self.now_ms() > deadline_ms {
                    return false;
                }
            }
            while reg(base, offset::I2C_STATUS).read() & I2C_STATUS_TIP != 0 {
                if self.now_ms() > deadline_ms {
                    return false;
                }
            }
        }
        true
    }
}

impl Hal for HalImpl {
    fn now_ms(&self) -> u32 {
        (self.now_u64() / TICKS_PER_MS) as u32
    }

    fn i2c_write(&mut self, channel: u8, address: u8, bytes: &[u8], deadline_ms: u32) -> Result<(), pbio_core::CoreError> {
        let base = HW_I2C_BASE[channel as usize];
        unsafe {
            reg(base, offset::I2C_TXR).write(((address as u32) << 1) | 0);
            reg(base, offset::I2C_COMMAND).write(I2C_COMMAND_STA | I2C_COMMAND_WR);
            if !self.i2c_tip_wait(channel, deadline_ms) {
                return Err(pbio_core::CoreError::I2cTransient);
            }
            if reg(base, offset::I2C_STATUS).read() & I2C_STATUS_RXACK != 0 {
                return Err(pbio_core::CoreError::I2cTransient);
            }

            for (i, &byte) in bytes.iter().enumerate() {
                reg(base, offset::I2C_TXR).write(byte as u32);
                let last = i == bytes.len() - 1;
                let command = if last { I2C_COMMAND_STO | I2C_COMMAND_WR } else { I2C_COMMAND_WR };
                reg(base, offset::I2C_COMMAND).write(command);
                if !self.i2c_tip_wait(channel, deadline_ms) {
                    return Err(pbio_core::CoreError::I2cTransient);
                }
                if reg(base, offset::I2C_STATUS).read() & I2C_STATUS_RXACK != 0 {
                    return Err(pbio_core::CoreError::I2cTransient);
                }
            }
        }
        Ok(())
    }

    fn i2c_read(&mut self, channel: u8, address: u8, buf: &mut [u8], deadline_ms: u32) -> Result<(), pbio_core::CoreError> {
        let base = HW_I2C_BASE[channel as usize];
        unsafe {
            reg(base, offset::I2C_TXR).write(((address as u32) << 1) | 1);
            reg(base, offset::I2C_COMMAND).write(I2C_COMMAND_STA | I2C_COMMAND_WR);
            if !self.i2c_tip_wait(channel, deadline_ms) {
                return Err(pbio_core::CoreError::I2cTransient);
            }
            if reg(base, offset::I2C_STATUS).read() & I2C_STATUS_RXACK != 0 {
                return Err(pbio_core::CoreError::I2cTransient);
            }

            for (i, slot) in buf.iter_mut().enumerate() {
                let last = i == buf.len() - 1;
                let mut command = I2C_COMMAND_RD;
                if last {
                    command |= I2C_COMMAND_ACK | I2C_COMMAND_STO;
                }
                reg(base, offset::I2C_COMMAND).write(command);
                if !self.i2c_tip_wait(channel, deadline_ms) {
                    return Err(pbio_core::CoreError::I2cTransient);
                }
                *slot = reg(base, offset::I2C_RXR).read() as u8;
            }
        }
        Ok(())
    }

    fn matrix_strobe(&mut self, col: u8) {
        unsafe {
            reg(HW_MATRIX_BASE, offset::MATRIX_STROBE).write(1u32 << col);
        }
    }

    fn matrix_sample_rows(&mut self) -> u8 {
        unsafe { reg(HW_MATRIX_BASE, offset::MATRIX_ROWS).read() as u8 }
    }

    fn set_hw_pwm(&mut self, ch: u8, value: u16) {
        unsafe {
            reg(HW_HWPWM_BASE, offset::HWPWM_CHANNEL0 + ch as usize).write(value as u32);
        }
    }

    fn set_solenoid_master(&mut self, on: bool) {
        unsafe {
            reg(HW_SOLENOID_BASE, offset::SOLENOID_MASTER).write(on as u32);
        }
    }

    fn watchdog_kick(&mut self) {
        unsafe {
            // two-phase reset code sequence disarms the CRG watchdog.
            reg(HW_CRG_BASE, offset::CRG_WATCHDOG_RESET_CODE).write(0x600d);
            reg(HW_CRG_BASE, offset::CRG_WATCHDOG_RESET_CODE).write(0xc0de);
        }
    }

    fn led_shift(&mut self, channel: u8, bytes: &[u8]) {
        unsafe {
            reg(HW_LED_BASE, offset::LED_CHANNEL_SELECT).write(channel as u32);
            for &b in bytes {
                reg(HW_LED_BASE, offset::LED_TXR).write(b as u32);
            }
        }
    }
}
