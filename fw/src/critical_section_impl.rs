//! Single-hart `critical-section` backend: this target has exactly one
//! core and no nested interrupt controller beyond machine-mode traps, so a
//! critical section is just "disable interrupts, remember whether they were
//! already off". `pbio-debug`'s `critical_section::with` calls (and any
//! future use inside `pbio-fw` itself) resolve to this at link time.

use core::arch::asm;
use critical_section::{set_impl, Impl, RawRestoreState};

struct SingleHartCriticalSection;
set_impl!(SingleHartCriticalSection);

const MSTATUS_MIE: usize = 0b1000;

unsafe impl Impl for SingleHartCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let mstatus: usize;
        // 0x8 == MSTATUS_MIE; csrrci's uimm5 operand must be a literal, so it
        // can't be substituted from the named constant above.
        asm!("csrrci {0}, mstatus, 0x8", out(reg) mstatus);
        (mstatus & MSTATUS_MIE) != 0
    }

    unsafe fn release(was_active: RawRestoreState) {
        if was_active {
            asm!("csrsi mstatus, 0x8");
        }
    }
}
