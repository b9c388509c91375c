//! Hardware-independent core of the pinball/arcade I/O controller: switch
//! debouncing, BCM PWM output, the quick-fire rule engine, and the USB
//! command console. Generic over [`hal::Hal`] so it builds and tests on the
//! host; `pbio-fw` supplies the real peripheral bindings.

#![cfg_attr(not(test), no_std)]

pub mod bcm;
pub mod cmd;
pub mod config;
pub mod debounce;
pub mod error;
pub mod hal;
pub mod hwindex;
pub mod leds;
pub mod rules;
pub mod scanner;
pub mod str_buf;
pub mod supervisor;
pub mod switch_state;
pub mod usb_tx;

pub use bcm::BcmEngine;
pub use error::{CoreError, CoreResult};
pub use hal::Hal;
pub use hwindex::HwIndex;
pub use leds::Heartbeat;
pub use rules::RuleEngine;
pub use scanner::Scanner;
pub use supervisor::{FaultKind, Supervisor};
pub use switch_state::SwitchState;
pub use usb_tx::UsbTxQueue;
