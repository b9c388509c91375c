//! Compile-time sizing and cadence constants.
//!
//! These stay fixed defaults rather than host-configurable values, collected
//! here as top-level `const`s instead of a runtime config struct.

/// Number of BCM bitplanes per expander byte.
pub const BCM_PLANES: usize = 4;

/// Full BCM frame length in ms: `2^BCM_PLANES - 1`.
pub const BCM_FRAME_MS: u32 = (1u32 << BCM_PLANES) - 1;

/// Maximum PWM value representable at `BCM_PLANES` bits, inclusive.
pub const MAX_BCM_PWM: u8 = (1u8 << BCM_PLANES) - 1;

/// Consecutive disagreeing samples needed to flip a debounced bit (default 3
/// consecutive ticks at 333 Hz is ~9 ms).
pub const DEBOUNCE_THRESHOLD: u8 = 3;

/// Input scan cadence.
pub const SCAN_PERIOD_MS: u32 = 3;

/// Matrix strobe settle time before sampling rows.
pub const MATRIX_SETTLE_US: u32 = 5;

/// LED heartbeat cadence.
pub const HEARTBEAT_PERIOD_MS: u32 = 300;

/// Maximum number of installed quick-fire rules.
pub const MAX_QUICK_RULES: usize = 64;

/// Maximum number of distinct (channel, address) expander slots tracked by
/// the BCM output engine.
pub const OUT_WRITER_LIST_LEN: usize = 32;

/// Number of matrix columns / I2C channels.
pub const MATRIX_COLS: usize = 8;
/// Number of matrix rows.
pub const MATRIX_ROWS: usize = 8;
/// Number of I2C channels carrying expanders.
pub const I2C_CHANNELS: usize = 4;
/// Number of candidate expander addresses per channel (0x40..=0x47).
pub const I2C_ADDRS_PER_CHANNEL: usize = 8;
/// Base address of the expander address range.
pub const I2C_ADDR_BASE: u8 = 0x40;

/// Total number of addressable input/output bits: 8 matrix bytes plus
/// `I2C_CHANNELS * I2C_ADDRS_PER_CHANNEL` expander bytes, 8 bits each.
pub const HW_INDEX_COUNT: usize = (MATRIX_COLS + I2C_CHANNELS * I2C_ADDRS_PER_CHANNEL) * 8;

/// Number of bytes in the canonical switch-state bit-vector (`HW_INDEX_COUNT / 8`).
pub const SWITCH_STATE_BYTES: usize = HW_INDEX_COUNT / 8;

/// Number of hardware-PWM channels.
pub const HW_PWM_CHANNELS: usize = 4;

/// Maximum value accepted by `set_hw_pwm`.
pub const MAX_HW_PWM: u16 = 0xFFF;

/// Consecutive I2C failures on a channel before it is marked degraded.
pub const I2C_DEGRADE_THRESHOLD: u8 = 8;

/// Depth of the USB TX byte queue.
pub const USB_TX_QUEUE_LEN: usize = 512;

/// Hardware watchdog period (a 1 s hardware watchdog).
pub const WATCHDOG_PERIOD_MS: u32 = 1000;

/// Maximum tokenized command line length in bytes.
pub const CMD_LINE_LEN: usize = 96;

/// Maximum number of whitespace-separated tokens accepted per command line.
pub const CMD_MAX_TOKENS: usize = 12;
