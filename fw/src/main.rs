#![no_main]
#![no_std]

//! Firmware entry point: a cooperative superloop (no RTOS) gating the Input
//! Scanner, BCM output writer, LED
//! heartbeat and command console at their respective cadences, with the
//! Supervisor's fault latch checked every iteration.

mod critical_section_impl;
mod hal_impl;
mod mem_map;

use core::fmt::Write as _;
use core::panic::PanicInfo;

use pbio_core::bcm::BcmEngine;
use pbio_core::cmd;
use pbio_core::config::{CMD_LINE_LEN, SCAN_PERIOD_MS};
use pbio_core::rules::RuleEngine;
use pbio_core::scanner::Scanner;
use pbio_core::str_buf::StrBuf;
use pbio_core::supervisor::{FaultKind, Supervisor};
use pbio_core::switch_state::SwitchState;
use pbio_core::usb_tx::UsbTxQueue;
use pbio_core::{Hal, Heartbeat};

use hal_impl::HalImpl;
use mem_map::{offset, HW_CRG_BASE, HW_UART_BASE};
use riscv_rt::entry;
use volatile::Volatile;

const LOG_LEVEL: pbio_debug::LL = pbio_debug::LL::Info;

unsafe fn uart_putc(byte: u8) {
    let p = (HW_UART_BASE + offset::UART_RXTX * 4) as *mut Volatile<u32>;
    (*p).write(byte as u32);
}

fn uart_try_getc() -> Option<u8> {
    // Polls the RXEMPTY flag rather than blocking: every received byte
    // feeds the command line directly.
    unsafe {
        let empty_p = (HW_UART_BASE + offset::UART_RXEMPTY * 4) as *mut Volatile<u32>;
        if (*empty_p).read() != 0 {
            return None;
        }
        let rxtx_p = (HW_UART_BASE + offset::UART_RXTX * 4) as *mut Volatile<u32>;
        Some((*rxtx_p).read() as u8)
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo<'_>) -> ! {
    // Mirrors the Supervisor's own AssertFailed path: gate solenoids first,
    // unconditionally, with no dependency on any data structure that may be
    // in a torn state.
    unsafe {
        hal_impl::HalImpl::new().set_solenoid_master(false);
    }
    loop {}
}

fn enable_watchdog() {
    unsafe {
        let p = (HW_CRG_BASE + offset::CRG_WATCHDOG_ENABLE * 4) as *mut Volatile<u32>;
        (*p).write(1);
    }
}

#[entry]
fn main() -> ! {
    pbio_debug::set_sink(|b| unsafe { uart_putc(b) });
    pbio_debug::logln!(LOG_LEVEL, "pbio-fw up");

    let mut hal = unsafe { HalImpl::new() };
    let mut state = SwitchState::new();
    let mut rules = RuleEngine::new();
    let mut bcm = BcmEngine::new();
    let mut scanner = Scanner::new();
    let mut supervisor = Supervisor::new();
    let mut heartbeat = Heartbeat::new();
    let mut tx = UsbTxQueue::new();
    let mut line_buf: StrBuf<CMD_LINE_LEN> = StrBuf::new();

    scanner.probe(&mut hal, hal.now_ms() + 100);
    pbio_debug::logln!(LOG_LEVEL, "expander probe done");

    enable_watchdog();

    let mut last_scan_ms = hal.now_ms();
    let mut last_bcm_ms = hal.now_ms();
    let mut last_wdt_ms = hal.now_ms();
    let mut prev_loop_ms = hal.now_ms();

    loop {
        let now = hal.now_ms();
        let loop_dt = now.wrapping_sub(prev_loop_ms);
        prev_loop_ms = now;

        if supervisor.should_gate_solenoids() {
            hal.set_solenoid_master(false);
        }

        if now.wrapping_sub(last_scan_ms) >= SCAN_PERIOD_MS {
            last_scan_ms = now;
            scanner.tick(&mut hal, &mut state, &mut rules, &mut bcm, &mut tx);
            supervisor.request_feed();
        }

        let bcm_delay = bcm.next_delay_ms();
        if now.wrapping_sub(last_bcm_ms) >= bcm_delay {
            last_bcm_ms = now;
            if supervisor.should_gate_solenoids() {
                // Plane counter does not advance while gated: a latched
                // fault has no unlatch path, so the BCM cadence only
                // matters again after a reset, which reinitializes it anyway.
            } else {
                bcm.tick(&mut hal, now + SCAN_PERIOD_MS);
            }
        }

        if let Some(pattern) = heartbeat.tick(loop_dt) {
            hal.led_shift(0, &[pattern]);
        }

        // Models the watchdog ISR in software: this board has
        // no vectored interrupt wired up for it yet, so the 1 s deadline is
        // polled here instead of firing asynchronously. Functionally
        // equivalent as long as no single loop iteration can itself run
        // long enough to miss the deadline, which holds since every task
        // above bounds its own work to one scan/BCM/heartbeat period.
        if now.wrapping_sub(last_wdt_ms) >= pbio_core::config::WATCHDOG_PERIOD_MS {
            last_wdt_ms = now;
            if supervisor.on_watchdog_fire() {
                hal.watchdog_kick();
            } else {
                hal.set_solenoid_master(false);
                hal.led_shift(0, &[0]);
            }
        }

        if let Some(byte) = uart_try_getc() {
            match byte {
                b'\n' | b'\r' | 0 => {
                    if !line_buf.is_empty() {
                        if let Ok(line) = line_buf.as_str() {
                            cmd::dispatch(line, &mut rules, &mut bcm, &state, &mut hal, &mut tx);
                        }
                        line_buf.clear();
                    }
                }
                other => {
                    let mut one = [0u8; 1];
                    one[0] = other;
                    if let Ok(s) = core::str::from_utf8(&one) {
                        let _ = line_buf.write_str(s);
                    }
                }
            }
        }

        let mut drained = [0u8; 16];
        let n = tx.drain_into(&mut drained);
        for &b in &drained[..n] {
            unsafe { uart_putc(b) };
        }

        if let Some(fault) = check_runtime_faults() {
            supervisor.latch(fault);
        }
    }
}

/// Placeholder for the stack-overflow/allocation-failure/assertion-failure
/// detection paths: this firmware has no heap and no recursive
/// call graph deep enough to overflow the stack under normal operation, so
/// there is nothing to observe here yet. Kept as an explicit hook so a
/// future stack-painting or MPU-based check has a place to report into the
/// Supervisor.
fn check_runtime_faults() -> Option<FaultKind> {
    None
}
