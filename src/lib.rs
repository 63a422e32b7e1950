//! PADCTL tracks ownership and lifecycle of the GPIO pads exposed by the
//! Raspberry Pi's RP1 I/O controller. It arbitrates which subsystem currently
//! owns a pad, returns unowned pads to a safe, high-impedance default state,
//! and keeps pads that back long-lived system hardware (status indicators,
//! USB workarounds) untouched across a bulk reset sweep.
//!
//! Register access goes through either a memory-mapped window on
//! `/dev/gpiomem0`, or a simulated register file that reproduces the pad
//! bit semantics for tests and non-hardware environments.
//!
//! PADCTL requires Raspberry Pi OS or any similar, recent, Linux
//! distribution. Both `gnu` and `musl` libc targets are supported.

// Used by rustdoc to link other crates to padctl's docs
#![doc(html_root_url = "https://docs.rs/padctl/0.2.0")]

pub mod pads;
pub mod system;
