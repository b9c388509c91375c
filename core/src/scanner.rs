//! Input Scanner: fixed 3 ms cadence matrix + I2C-expander
//! sampling, feeding the debouncer and then the rule engine.

use core::fmt::Write as _;

use crate::bcm::BcmEngine;
use crate::config::{
    I2C_ADDRS_PER_CHANNEL, I2C_ADDR_BASE, I2C_CHANNELS, I2C_DEGRADE_THRESHOLD, MATRIX_COLS, SCAN_PERIOD_MS,
    SWITCH_STATE_BYTES,
};
use crate::debounce::Debouncer;
use crate::hal::Hal;
use crate::rules::RuleEngine;
use crate::str_buf::StrBuf;
use crate::switch_state::SwitchState;
use crate::usb_tx::UsbTxQueue;

/// Drives the matrix/I2C sampling loop, vertical-counter debouncing, and the
/// per-channel I2C degradation tracker.
pub struct Scanner {
    debouncer: Debouncer,
    present: [[bool; I2C_ADDRS_PER_CHANNEL]; I2C_CHANNELS],
    fail_count: [u8; I2C_CHANNELS],
    degraded: [bool; I2C_CHANNELS],
    /// Whether change events are streamed to the host as they occur, or only
    /// delivered on an explicit `SW?`.
    pub async_report: bool,
}

impl Scanner {
    pub const fn new() -> Self {
        Scanner {
            debouncer: Debouncer::new(),
            present: [[false; I2C_ADDRS_PER_CHANNEL]; I2C_CHANNELS],
            fail_count: [0; I2C_CHANNELS],
            degraded: [false; I2C_CHANNELS],
            async_report: false,
        }
    }

    pub fn is_degraded(&self, channel: u8) -> bool {
        self.degraded.get(channel as usize).copied().unwrap_or(false)
    }

    /// Startup expander discovery: for
    /// every `(channel, 0x40..=0x47)`, write `0xFF` (open-drain release) and
    /// record which addresses ACK.
    pub fn probe(&mut self, hal: &mut impl Hal, deadline_ms: u32) {
        for channel in 0..I2C_CHANNELS as u8 {
            for a in 0..I2C_ADDRS_PER_CHANNEL as u8 {
                let address = I2C_ADDR_BASE + a;
                let ok = hal.i2c_write(channel, address, &[0xFF], deadline_ms).is_ok();
                self.present[channel as usize][a as usize] = ok;
            }
        }
    }

    fn byte_index(channel: u8, addr_offset: u8) -> usize {
        MATRIX_COLS + channel as usize * I2C_ADDRS_PER_CHANNEL + addr_offset as usize
    }

    /// One 3 ms scan tick: samples the matrix and
    /// every discovered, non-degraded expander, hands the result to the
    /// debouncer, then to the rule engine, then (if enabled) streams any
    /// edges to the host.
    pub fn tick<H: Hal>(
        &mut self,
        hal: &mut H,
        state: &mut SwitchState,
        rules: &mut RuleEngine,
        bcm: &mut BcmEngine,
        tx: &mut UsbTxQueue,
    ) {
        let now = hal.now_ms();
        let deadline = now + SCAN_PERIOD_MS;
        let mut raw = state.get_all();

        for col in 0..MATRIX_COLS as u8 {
            hal.matrix_strobe(col);
            raw[col as usize] = hal.matrix_sample_rows();
        }

        for channel in 0..I2C_CHANNELS as u8 {
            if self.degraded[channel as usize] {
                continue;
            }
            for a in 0..I2C_ADDRS_PER_CHANNEL as u8 {
                if !self.present[channel as usize][a as usize] {
                    continue;
                }
                let address = I2C_ADDR_BASE + a;
                let idx = Self::byte_index(channel, a);
                let mut buf = [0u8; 1];
                match hal.i2c_read(channel, address, &mut buf, deadline) {
                    Ok(()) => {
                        raw[idx] = buf[0];
                        self.fail_count[channel as usize] = 0;
                    }
                    Err(_) => {
                        // skip this byte for the current tick only
                        self.fail_count[channel as usize] = self.fail_count[channel as usize].saturating_add(1);
                        if self.fail_count[channel as usize] >= I2C_DEGRADE_THRESHOLD {
                            self.degraded[channel as usize] = true;
                        }
                    }
                }
            }
        }

        let events = self.debouncer.apply_sample(&raw, state, now);
        rules.evaluate(state, bcm, hal, SCAN_PERIOD_MS as u16);

        if self.async_report {
            for e in events.iter() {
                let mut buf: StrBuf<48> = StrBuf::new();
                let _ = write!(buf, "EV:{},{}\n\r", e.index, e.new_level as u8);
                tx.enqueue(buf.bytes());
            }
        }
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}
