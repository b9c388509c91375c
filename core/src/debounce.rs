//! Vertical-counter debouncer: a bit-parallel 2-bit saturating counter per
//! input bit, updated 32 bits at a time.

use crate::config::{DEBOUNCE_THRESHOLD, SWITCH_STATE_BYTES};
use crate::switch_state::{EdgeEvent, SwitchState};
use heapless::Vec;

const WORDS: usize = (SWITCH_STATE_BYTES * 8) / 32;
/// Upper bound on edges reported in a single tick; in practice far fewer
/// bits change in any one 3 ms scan window.
const MAX_EDGES_PER_TICK: usize = 64;

/// Returns, as a per-bit word mask, which counters have reached
/// `DEBOUNCE_THRESHOLD` and should flip this tick. `c1`/`c0` are the two
/// bit-planes of the 2-bit saturating counter (MSB/LSB respectively).
fn saturated_mask(c1: u32, c0: u32) -> u32 {
    match DEBOUNCE_THRESHOLD {
        1 => c0 | c1,
        2 => c1,
        _ => c1 & c0, // 3, also the hard saturation cap of a 2-bit counter
    }
}

/// Holds the per-bit 2-bit saturating counters for all 320 inputs, bit-packed
/// 32-to-a-word.
pub struct Debouncer {
    c0: [u32; WORDS],
    c1: [u32; WORDS],
}

impl Debouncer {
    pub const fn new() -> Self {
        Debouncer {
            c0: [0; WORDS],
            c1: [0; WORDS],
        }
    }

    /// Runs one debounce tick over a raw 40-byte sample vector (matrix bytes
    /// followed by I2C expander bytes), updating `state` in place and
    /// returning the edges that fired, in ascending `HwIndex` order.
    pub fn apply_sample(
        &mut self,
        raw: &[u8; SWITCH_STATE_BYTES],
        state: &mut SwitchState,
        now_ms: u32,
    ) -> Vec<EdgeEvent, MAX_EDGES_PER_TICK> {
        let mut events = Vec::new();
        let debounced = state.get_all();

        for w in 0..WORDS {
            let raw_word = word_from_bytes(raw, w);
            let deb_word = word_from_bytes(&debounced, w);
            let diff = raw_word ^ deb_word;

            let new_c1 = diff & (self.c1[w] | self.c0[w]);
            let new_c0 = diff & (self.c1[w] | !self.c0[w]);
            self.c1[w] = new_c1;
            self.c0[w] = new_c0;

            let mut flip = saturated_mask(new_c1, new_c0) & diff;
            while flip != 0 {
                let bit_in_word = flip.trailing_zeros();
                let index = (w as u32 * 32 + bit_in_word) as u16;
                let new_level = (raw_word >> bit_in_word) & 1 != 0;
                state.set_bit(index, new_level);
                self.c0[w] &= !(1 << bit_in_word);
                self.c1[w] &= !(1 << bit_in_word);
                let _ = events.push(EdgeEvent {
                    index,
                    new_level,
                    monotonic_ms: now_ms,
                });
                flip &= !(1 << bit_in_word);
            }
        }

        events
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

fn word_from_bytes(bytes: &[u8; SWITCH_STATE_BYTES], word_idx: usize) -> u32 {
    let base = word_idx * 4;
    u32::from_le_bytes([
        bytes[base],
        bytes[base + 1],
        bytes[base + 2],
        bytes[base + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_raw() -> [u8; SWITCH_STATE_BYTES] {
        [0u8; SWITCH_STATE_BYTES]
    }

    #[test]
    fn single_spurious_sample_never_flips_at_threshold_ge_2() {
        // DEBOUNCE_THRESHOLD defaults to 3 in config.rs; one disagreeing tick
        // must not flip the debounced bit.
        let mut d = Debouncer::new();
        let mut s = SwitchState::new();
        let mut raw = zero_raw();
        raw[0] = 0b0000_0001; // bit 0 momentarily set

        let events = d.apply_sample(&raw, &mut s, 0);
        assert!(events.is_empty());
        assert!(!s.get_bit(0));

        // and it settles right back
        let events = d.apply_sample(&zero_raw(), &mut s, 3);
        assert!(events.is_empty());
        assert!(!s.get_bit(0));
    }

    #[test]
    fn stable_change_flips_on_exactly_the_threshold_tick() {
        let mut d = Debouncer::new();
        let mut s = SwitchState::new();
        let mut raw = zero_raw();
        raw[0] = 0b0000_0001;

        for tick in 1..DEBOUNCE_THRESHOLD {
            let events = d.apply_sample(&raw, &mut s, tick as u32 * 3);
            assert!(events.is_empty(), "flipped early on tick {tick}");
            assert!(!s.get_bit(0));
        }

        let events = d.apply_sample(&raw, &mut s, DEBOUNCE_THRESHOLD as u32 * 3);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 0);
        assert!(events[0].new_level);
        assert!(s.get_bit(0));
    }

    #[test]
    fn settles_back_to_zero_symmetrically() {
        let mut d = Debouncer::new();
        let mut s = SwitchState::new();
        let mut raw = zero_raw();
        raw[0] = 1;
        for tick in 1..=DEBOUNCE_THRESHOLD {
            d.apply_sample(&raw, &mut s, tick as u32 * 3);
        }
        assert!(s.get_bit(0));

        raw[0] = 0;
        for tick in 1..DEBOUNCE_THRESHOLD {
            let events = d.apply_sample(&raw, &mut s, tick as u32 * 3);
            assert!(events.is_empty());
        }
        let events = d.apply_sample(&raw, &mut s, DEBOUNCE_THRESHOLD as u32 * 3);
        assert_eq!(events.len(), 1);
        assert!(!events[0].new_level);
        assert!(!s.get_bit(0));
    }

    #[test]
    fn multiple_bits_debounce_independently_in_one_word() {
        let mut d = Debouncer::new();
        let mut s = SwitchState::new();
        let mut raw = zero_raw();
        raw[0] = 0b0000_0001;
        raw[1] = 0b0000_0010;

        for tick in 1..DEBOUNCE_THRESHOLD {
            d.apply_sample(&raw, &mut s, tick as u32 * 3);
        }
        let events = d.apply_sample(&raw, &mut s, DEBOUNCE_THRESHOLD as u32 * 3);
        assert_eq!(events.len(), 2);
        // ascending HwIndex order
        assert!(events[0].index < events[1].index);
        assert!(s.get_bit(0));
        assert!(s.get_bit(9));
    }
}
