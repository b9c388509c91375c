//! Binary-code-modulated (BCM) software PWM output engine.
//!
//! To emit an 8-bit PWM value `v` on a pin, bit `j` of `v` is written into bit
//! *pin* of `bcmBuffer[j]` for every plane `j`. Plane `j` is displayed for
//! `2^j` ms, so a full frame is `2^BCM_PLANES - 1` ms.

use crate::config::{BCM_PLANES, OUT_WRITER_LIST_LEN};
use crate::error::{CoreError, CoreResult};
use crate::hal::Hal;
use crate::hwindex::{HwIndex, Kind};
use heapless::Vec;

/// Per-bit pulse-expiration record: counts down `t_pulse_ms`, then rewrites
/// the bit's pattern to `low_pwm`.
#[derive(Debug, Copy, Clone)]
struct BitRule {
    /// Remaining pulse time in ms. Only meaningful while `active`.
    t_pulse_ms: i32,
    low_pwm: u8,
    /// `false` once the pulse has expired (or was never armed — a creation
    /// `t_pulse == 0` means "permanent level").
    active: bool,
}

impl BitRule {
    const fn idle() -> Self {
        BitRule {
            t_pulse_ms: 0,
            low_pwm: 0,
            active: false,
        }
    }
}

/// One active (channel, address) expander slot: its BCM bitplane buffer plus
/// the eight per-bit pulse records.
pub struct PclOutputByte {
    pub channel: u8,
    pub address: u8,
    bcm_buffer: [u8; BCM_PLANES],
    bit_rules: [BitRule; 8],
}

impl PclOutputByte {
    fn new(channel: u8, address: u8) -> Self {
        PclOutputByte {
            channel,
            address,
            bcm_buffer: [0; BCM_PLANES],
            bit_rules: [BitRule::idle(); 8],
        }
    }

    /// The byte currently emitted for bitplane `plane`.
    pub fn plane(&self, plane: usize) -> u8 {
        self.bcm_buffer[plane]
    }

    fn write_bit_pattern(&mut self, bit: u8, value: u8) {
        for (j, plane) in self.bcm_buffer.iter_mut().enumerate() {
            let level = (value >> j) & 1;
            if level != 0 {
                *plane |= 1 << bit;
            } else {
                *plane &= !(1 << bit);
            }
        }
    }
}

/// Holds every allocated expander slot (grow-only, compacted toward the
/// front) and drives the
/// geometric plane cadence.
pub struct BcmEngine {
    entries: Vec<PclOutputByte, OUT_WRITER_LIST_LEN>,
    current_plane: usize,
}

impl BcmEngine {
    pub const fn new() -> Self {
        BcmEngine {
            entries: Vec::new(),
            current_plane: 0,
        }
    }

    pub fn entries(&self) -> &[PclOutputByte] {
        &self.entries
    }

    /// The plane the next [`BcmEngine::tick`] will emit.
    pub fn next_plane(&self) -> usize {
        self.current_plane
    }

    fn find_or_alloc(&mut self, channel: u8, address: u8) -> CoreResult<usize> {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.channel == channel && e.address == address)
        {
            return Ok(pos);
        }
        self.entries
            .push(PclOutputByte::new(channel, address))
            .map_err(|_| CoreError::NoSpace)?;
        Ok(self.entries.len() - 1)
    }

    /// Allocates (or reuses) the expander slot for `location`,
    /// writes the N-plane pattern for `high_pwm`, and arms a pulse-expiry
    /// countdown unless `t_pulse == 0` ("set level permanently").
    pub fn set_pcl_output(
        &mut self,
        location: HwIndex,
        t_pulse_ms: i32,
        high_pwm: u8,
        low_pwm: u8,
    ) -> CoreResult<()> {
        if location.kind != Kind::I2c {
            return Err(CoreError::InvalidHwIndex);
        }
        let idx = self.find_or_alloc(location.channel, location.address)?;
        let entry = &mut self.entries[idx];
        entry.write_bit_pattern(location.bit, high_pwm);
        entry.bit_rules[location.bit as usize] = if t_pulse_ms > 0 {
            BitRule {
                t_pulse_ms,
                low_pwm,
                active: true,
            }
        } else {
            BitRule::idle()
        };
        Ok(())
    }

    /// Decrements every active pulse record on every entry by `dt_ms`;
    /// records that expire have their bit rewritten to `low_pwm`.
    fn handle_bit_rules(&mut self, dt_ms: u32) {
        for entry in self.entries.iter_mut() {
            for (bit, rule) in entry.bit_rules.iter_mut().enumerate() {
                if !rule.active {
                    continue;
                }
                rule.t_pulse_ms -= dt_ms as i32;
                if rule.t_pulse_ms <= 0 {
                    entry.write_bit_pattern(bit as u8, rule.low_pwm);
                    rule.active = false;
                    rule.t_pulse_ms = 0;
                }
            }
        }
    }

    /// One BCM task iteration: fire-and-forget enqueues the current plane's
    /// byte to every expander, then runs the pulse-expiry state machine with
    /// `dt = 2^current_plane` and advances the plane counter. I2C write
    /// failures are swallowed here — they are counted by the Scanner's
    /// degradation tracker on the next read.
    pub fn tick(&mut self, hal: &mut impl Hal, deadline_ms: u32) {
        let plane = self.current_plane;
        for entry in self.entries.iter() {
            let _ = hal.i2c_write(entry.channel, entry.address, &[entry.bcm_buffer[plane]], deadline_ms);
        }
        let dt = 1u32 << plane;
        self.handle_bit_rules(dt);
        self.current_plane = (self.current_plane + 1) % BCM_PLANES;
    }

    /// How long (ms) until the next `tick()` should run, given the plane it
    /// is about to emit: the BCM task's variable-delay cadence ("the j-th
    /// iteration sleeps 2^j ms").
    pub fn next_delay_ms(&self) -> u32 {
        1u32 << self.current_plane
    }
}

impl Default for BcmEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BCM_FRAME_MS;
    use crate::hal::mock::MockHal;
    use crate::hwindex::HwIndex;

    fn loc(byte: u8, bit: u8) -> HwIndex {
        HwIndex::decode((byte as u16) * 8 + bit as u16)
    }

    #[test]
    fn rejects_non_i2c_location() {
        let mut bcm = BcmEngine::new();
        let matrix_loc = loc(0, 0);
        assert_eq!(
            bcm.set_pcl_output(matrix_loc, 0, 15, 0),
            Err(CoreError::InvalidHwIndex)
        );
    }

    #[test]
    fn steady_pwm_shows_correct_planes_forever() {
        // OUT 0x48 3 -> byte 9 bit 0, steady PWM 3 of 15.
        let mut bcm = BcmEngine::new();
        let location = loc(9, 0); // channel 0, addr 0x41
        bcm.set_pcl_output(location, 0, 3, 3).unwrap();

        let entry = &bcm.entries()[0];
        assert_eq!(entry.plane(0) & 1, 1);
        assert_eq!(entry.plane(1) & 1, 1);
        assert_eq!(entry.plane(2) & 1, 0);
        assert_eq!(entry.plane(3) & 1, 0);

        // runs "forever": ticking many frames doesn't change it, no active pulse.
        let mut hal = MockHal::new();
        for _ in 0..(10 * BCM_FRAME_MS) {
            bcm.tick(&mut hal, hal.now_ms() + 100);
            hal.advance_ms(1);
        }
        let entry = &bcm.entries()[0];
        assert_eq!(entry.plane(0) & 1, 1);
        assert_eq!(entry.plane(2) & 1, 0);
    }

    #[test]
    fn pulse_expires_to_low_pwm_within_one_plane_tolerance() {
        let mut bcm = BcmEngine::new();
        let location = loc(8, 0); // channel 0, addr 0x40
        bcm.set_pcl_output(location, 10, 15, 0).unwrap();

        let mut hal = MockHal::new();
        let mut elapsed = 0u32;
        // tick through the pulse window; high pattern (all planes 1) must hold
        while elapsed < 10 {
            let entry = &bcm.entries()[0];
            assert_eq!(entry.plane(0) & 1, 1);
            assert_eq!(entry.plane(3) & 1, 1);
            let dt = bcm.next_delay_ms();
            bcm.tick(&mut hal, hal.now_ms() + 100);
            hal.advance_ms(dt);
            elapsed += dt;
        }

        // give it one extra plane's worth of tolerance
        for _ in 0..4 {
            bcm.tick(&mut hal, hal.now_ms() + 100);
        }
        let entry = &bcm.entries()[0];
        assert_eq!(entry.plane(0) & 1, 0);
        assert_eq!(entry.plane(3) & 1, 0);
    }

    #[test]
    fn no_space_when_all_slots_taken() {
        let mut bcm = BcmEngine::new();
        for ch in 0..crate::config::I2C_CHANNELS as u8 {
            for a in 0..8u8 {
                let addr = 0x40 + a;
                let idx = (8 + ch as u16 * 8 + a as u16) * 8;
                let location = HwIndex::decode(idx);
                let r = bcm.set_pcl_output(location, 0, 1, 0);
                if bcm.entries().len() > crate::config::OUT_WRITER_LIST_LEN {
                    assert_eq!(r, Err(CoreError::NoSpace));
                } else {
                    let _ = r;
                }
                let _ = addr;
            }
        }
    }

    #[test]
    fn plane_sequence_is_always_ascending_and_wrapping() {
        let mut bcm = BcmEngine::new();
        let mut hal = MockHal::new();
        let mut seen = heapless::Vec::<usize, 64>::new();
        for _ in 0..(10 * BCM_PLANES) {
            let _ = seen.push(bcm.next_plane());
            bcm.tick(&mut hal, 0);
        }
        for window in seen.windows(BCM_PLANES) {
            let expected: heapless::Vec<usize, 16> = (0..BCM_PLANES).collect();
            assert_eq!(window, expected.as_slice());
        }
    }
}
