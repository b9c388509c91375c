//! Command Parser / Reporter: a line-oriented ASCII
//! console over USB-CDC. Tokenized by whitespace; malformed input never
//! mutates state.

use core::fmt::Write as _;

use crate::bcm::BcmEngine;
use crate::config::{CMD_MAX_TOKENS, MAX_BCM_PWM, MAX_QUICK_RULES};
use crate::hal::Hal;
use crate::hwindex::HwIndex;
use crate::rules::RuleEngine;
use crate::str_buf::StrBuf;
use crate::switch_state::SwitchState;
use crate::usb_tx::UsbTxQueue;
use heapless::Vec;

/// Length of a response line buffer: long enough for `SW?`'s ten
/// `0xWWWWWWWW,` words plus the terminator.
const RESP_BUF_LEN: usize = 160;

const IDN: &str = "PBIO-EC,0.1.0";

const HELP_LINES: &[&str] = &[
    "?                                                          List commands",
    "*IDN?                                                      Identity string",
    "SW?                                                        Dump debounced switch state",
    "OUT <hw> <tp> <hi> <lo>                                    Pulse then hold",
    "OUT <hw> <pwm>                                             Steady PWM",
    "RUL <id> <in> <out> <tHold> <tP> <pH> <pL> <posEdge> <autoOff> <lvlTrig>  Install rule",
    "RULE <id>                                                  Enable rule",
    "RULD <id>                                                  Disable rule",
    "LED <ch> <b0> <b1> ...                                     Push raw LED bytes",
];

/// Parses decimal, `0x`/`0X`-prefixed hex, and `0`-prefixed octal integers
/// (decimal, hex, octal).
pub fn parse_num(tok: &str) -> Option<u32> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if tok.len() > 1 && tok.as_bytes()[0] == b'0' {
        u32::from_str_radix(&tok[1..], 8).ok()
    } else {
        tok.parse::<u32>().ok()
    }
}

fn tokenize(line: &str) -> Vec<&str, CMD_MAX_TOKENS> {
    let mut toks = Vec::new();
    for t in line.split_whitespace() {
        if toks.push(t).is_err() {
            break;
        }
    }
    toks
}

fn respond(tx: &mut UsbTxQueue, line: &str) {
    let mut buf: StrBuf<RESP_BUF_LEN> = StrBuf::new();
    // A line too long for the buffer is truncated rather than panicking;
    // none of our own formatted responses ever reach RESP_BUF_LEN.
    let _ = buf.write_str(line);
    let _ = write!(buf, "\n\r");
    tx.enqueue(buf.bytes());
}

fn respond_fmt(tx: &mut UsbTxQueue, args: core::fmt::Arguments) {
    let mut buf: StrBuf<RESP_BUF_LEN> = StrBuf::new();
    let _ = buf.write_fmt(args);
    let _ = write!(buf, "\n\r");
    tx.enqueue(buf.bytes());
}

/// Parses and executes one command line against the shared subsystems,
/// pushing every response line (including diagnostics) to `tx`. Never
/// mutates `rules`/`bcm`/`hal` state on a parse error.
pub fn dispatch<H: Hal>(
    line: &str,
    rules: &mut RuleEngine,
    bcm: &mut BcmEngine,
    state: &SwitchState,
    hal: &mut H,
    tx: &mut UsbTxQueue,
) {
    let toks = tokenize(line);
    let Some(&cmd) = toks.first() else { return };

    match cmd {
        "?" => {
            for l in HELP_LINES {
                respond(tx, l);
            }
        }
        "*IDN?" => respond(tx, IDN),
        "SW?" => cmd_sw(state, tx),
        "OUT" => cmd_out(&toks, bcm, hal, tx),
        "RUL" => cmd_rul(&toks, rules, tx),
        "RULE" => cmd_rule_toggle(&toks, rules, tx, true),
        "RULD" => cmd_rule_toggle(&toks, rules, tx, false),
        "LED" => cmd_led(&toks, hal, tx),
        _ => respond_fmt(tx, format_args!("[CMDLINE_BAD_CMD] {line}")),
    }
}

fn cmd_sw(state: &SwitchState, tx: &mut UsbTxQueue) {
    let words = state.as_words();
    let mut buf: StrBuf<RESP_BUF_LEN> = StrBuf::new();
    let _ = buf.write_str("SW:");
    for (i, w) in words.iter().enumerate() {
        if i > 0 {
            let _ = buf.write_str(",");
        }
        let _ = write!(buf, "{:#010x}", w);
    }
    let _ = write!(buf, "\n\r");
    tx.enqueue(buf.bytes());
}

fn cmd_out<H: Hal>(toks: &[&str], bcm: &mut BcmEngine, hal: &mut H, tx: &mut UsbTxQueue) {
    if toks.len() != 3 && toks.len() != 5 {
        if toks.len() < 3 {
            respond(tx, "[CMDLINE_TOO_FEW_ARGS]");
        } else {
            respond(tx, "[CMDLINE_TOO_MANY_ARGS]");
        }
        return;
    }

    let Some(hw_raw) = parse_num(toks[1]) else {
        respond(tx, "[CMDLINE_INVALID_ARG]");
        return;
    };
    let location = HwIndex::decode(hw_raw as u16);

    let (t_pulse, hi, lo) = if toks.len() == 3 {
        let Some(pwm) = parse_num(toks[2]) else {
            respond(tx, "[CMDLINE_INVALID_ARG]");
            return;
        };
        if pwm > MAX_BCM_PWM as u32 {
            respond_fmt(tx, format_args!("Cmd_OUT(): PWMvalue must be < {}", MAX_BCM_PWM as u32 + 1));
            return;
        }
        (0i32, pwm as u8, pwm as u8)
    } else {
        let (Some(tp), Some(hi), Some(lo)) = (parse_num(toks[2]), parse_num(toks[3]), parse_num(toks[4])) else {
            respond(tx, "[CMDLINE_INVALID_ARG]");
            return;
        };
        if hi > MAX_BCM_PWM as u32 || lo > MAX_BCM_PWM as u32 {
            respond_fmt(tx, format_args!("Cmd_OUT(): PWMvalue must be < {}", MAX_BCM_PWM as u32 + 1));
            return;
        }
        (tp as i32, hi as u8, lo as u8)
    };

    use crate::hwindex::Kind;
    match location.kind {
        Kind::I2c => {
            if bcm.set_pcl_output(location, t_pulse, hi, lo).is_err() {
                respond_fmt(tx, format_args!("Cmd_OUT(): hwIndex={} NoSpace", hw_raw));
            }
        }
        Kind::HwPwm => {
            hal.set_hw_pwm(location.hw_pwm_channel(), hi as u16);
        }
        Kind::Matrix => {
            respond_fmt(tx, format_args!("Cmd_OUT(): hwIndex={} is a SM input", hw_raw));
        }
        Kind::Invalid => {
            respond_fmt(tx, format_args!("Cmd_OUT(): hwIndex={} is invalid", hw_raw));
        }
    }
}

fn cmd_rul(toks: &[&str], rules: &mut RuleEngine, tx: &mut UsbTxQueue) {
    if toks.len() != 11 {
        if toks.len() < 11 {
            respond(tx, "[CMDLINE_TOO_FEW_ARGS]");
        } else {
            respond(tx, "[CMDLINE_TOO_MANY_ARGS]");
        }
        return;
    }

    let mut nums: Vec<u32, 10> = Vec::new();
    for t in &toks[1..11] {
        match parse_num(t) {
            Some(n) => {
                let _ = nums.push(n);
            }
            None => {
                respond(tx, "[CMDLINE_INVALID_ARG]");
                return;
            }
        }
    }

    let id = nums[0] as usize;
    let input = HwIndex::decode(nums[1] as u16);
    let output = HwIndex::decode(nums[2] as u16);
    let t_hold_off = nums[3] as u16;
    let t_pulse = nums[4] as i32;
    if nums[5] > MAX_BCM_PWM as u32 || nums[6] > MAX_BCM_PWM as u32 {
        respond_fmt(tx, format_args!("Cmd_RUL(): PWMvalue must be < {}", MAX_BCM_PWM as u32 + 1));
        return;
    }
    let pwm_high = nums[5] as u8;
    let pwm_low = nums[6] as u8;
    let pos_edge = nums[7] != 0;
    let auto_off = nums[8] != 0;
    let level_trig = nums[9] != 0;

    if id >= MAX_QUICK_RULES {
        respond_fmt(tx, format_args!("Cmd_RUL(): id={} out of range", id));
        return;
    }

    if rules
        .install(id, input, output, t_hold_off, t_pulse, pwm_high, pwm_low, pos_edge, auto_off, level_trig)
        .is_err()
    {
        respond_fmt(tx, format_args!("Cmd_RUL(): invalid input/output for id={}", id));
    }
}

fn cmd_rule_toggle(toks: &[&str], rules: &mut RuleEngine, tx: &mut UsbTxQueue, enable: bool) {
    if toks.len() != 2 {
        if toks.len() < 2 {
            respond(tx, "[CMDLINE_TOO_FEW_ARGS]");
        } else {
            respond(tx, "[CMDLINE_TOO_MANY_ARGS]");
        }
        return;
    }
    let Some(id) = parse_num(toks[1]) else {
        respond(tx, "[CMDLINE_INVALID_ARG]");
        return;
    };
    let id = id as usize;
    let result = if enable { rules.enable(id) } else { rules.disable(id) };
    if result.is_err() {
        let verb = if enable { "RULE" } else { "RULD" };
        respond_fmt(tx, format_args!("Cmd_{}(): id={} not installed", verb, id));
    }
}

fn cmd_led<H: Hal>(toks: &[&str], hal: &mut H, tx: &mut UsbTxQueue) {
    if toks.len() < 3 {
        respond(tx, "[CMDLINE_TOO_FEW_ARGS]");
        return;
    }
    let Some(ch) = parse_num(toks[1]) else {
        respond(tx, "[CMDLINE_INVALID_ARG]");
        return;
    };
    let mut bytes: Vec<u8, 64> = Vec::new();
    for t in &toks[2..] {
        match parse_num(t) {
            Some(b) if b <= 0xFF => {
                let _ = bytes.push(b as u8);
            }
            _ => {
                respond(tx, "[CMDLINE_INVALID_ARG]");
                return;
            }
        }
    }
    hal.led_shift(ch as u8, &bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockHal;

    fn fresh() -> (RuleEngine, BcmEngine, SwitchState, MockHal, UsbTxQueue) {
        (RuleEngine::new(), BcmEngine::new(), SwitchState::new(), MockHal::new(), UsbTxQueue::new())
    }

    fn drain_line(tx: &mut UsbTxQueue) -> heapless::String<RESP_BUF_LEN> {
        let mut buf = [0u8; RESP_BUF_LEN];
        let n = tx.drain_into(&mut buf);
        heapless::String::from_utf8(heapless::Vec::from_slice(&buf[..n]).unwrap()).unwrap()
    }

    #[test]
    fn parse_num_handles_all_three_radixes() {
        assert_eq!(parse_num("42"), Some(42));
        assert_eq!(parse_num("0x2A"), Some(42));
        assert_eq!(parse_num("052"), Some(42));
        assert_eq!(parse_num("0"), Some(0));
        assert_eq!(parse_num("xyz"), None);
    }

    #[test]
    fn sw_query_shape_after_reset() {
        let (mut rules, mut bcm, state, mut hal, mut tx) = fresh();
        dispatch("SW?", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        let line = drain_line(&mut tx);
        assert_eq!(
            line.as_str(),
            "SW:0x00000000,0x00000000,0x00000000,0x00000000,0x00000000,0x00000000,0x00000000,0x00000000,0x00000000,0x00000000\n\r"
        );
    }

    #[test]
    fn out_steady_pwm_writes_correct_planes() {
        let (mut rules, mut bcm, state, mut hal, mut tx) = fresh();
        dispatch("OUT 72 3", &mut rules, &mut bcm, &state, &mut hal, &mut tx); // 72 = byte9*8 -> ch0 addr 0x41 bit 0
        assert!(tx.is_empty());
        let entry = bcm.entries().iter().find(|e| e.address == 0x41).unwrap();
        assert_eq!(entry.plane(0) & 1, 1);
        assert_eq!(entry.plane(1) & 1, 1);
        assert_eq!(entry.plane(2) & 1, 0);
    }

    #[test]
    fn out_on_matrix_input_is_rejected() {
        let (mut rules, mut bcm, state, mut hal, mut tx) = fresh();
        dispatch("OUT 5 15", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        let line = drain_line(&mut tx);
        assert_eq!(line.as_str(), "Cmd_OUT(): hwIndex=5 is a SM input\n\r");
        assert!(bcm.entries().is_empty());
    }

    #[test]
    fn unknown_command_is_reported_and_echoed() {
        let (mut rules, mut bcm, state, mut hal, mut tx) = fresh();
        dispatch("FROB 1 2", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        let line = drain_line(&mut tx);
        assert_eq!(line.as_str(), "[CMDLINE_BAD_CMD] FROB 1 2\n\r");
    }

    #[test]
    fn rul_then_rule_then_ruld_round_trip() {
        let (mut rules, mut bcm, state, mut hal, mut tx) = fresh();
        dispatch("RUL 0 0x00 0x40 50 10 15 0 1 0 0", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        assert!(tx.is_empty());
        assert!(rules.rule(0).unwrap().enabled);

        dispatch("RULD 0", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        assert!(!rules.rule(0).unwrap().enabled);

        dispatch("RULE 0", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        assert!(rules.rule(0).unwrap().enabled);
    }

    #[test]
    fn too_few_args_is_diagnosed() {
        let (mut rules, mut bcm, state, mut hal, mut tx) = fresh();
        dispatch("OUT 5", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        let line = drain_line(&mut tx);
        assert_eq!(line.as_str(), "[CMDLINE_TOO_FEW_ARGS]\n\r");
    }

    #[test]
    fn led_command_forwards_bytes_to_hal() {
        let (mut rules, mut bcm, state, mut hal, mut tx) = fresh();
        dispatch("LED 0 1 2 3", &mut rules, &mut bcm, &state, &mut hal, &mut tx);
        assert!(tx.is_empty());
        assert_eq!(hal.led_frames.len(), 1);
        assert_eq!(hal.led_frames[0].0, 0);
        assert_eq!(hal.led_frames[0].1.as_slice(), &[1, 2, 3]);
    }
}
