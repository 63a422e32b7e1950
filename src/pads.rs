//! Ownership and lifecycle tracking for the GPIO pads.
//!
//! ## Pads
//!
//! Pads are addressed by their line number in bank 0. A pad is considered
//! free when its input buffer and output driver are both disabled, which is
//! the exact electrical signature [`PadRegistry::reset`] leaves behind. For
//! ordinary pads this is derived from register readback rather than stored
//! bookkeeping, so a pad taken over by a peripheral driver reads as busy
//! without the registry being told about it.
//!
//! A small, board-specific set of pads is dedicated to system hardware: a
//! one-wire status LED, the clock/data pair of a two-wire status indicator,
//! or an audio amplifier enable line. These pads are tracked by explicit
//! in-use flags instead of register readback, set by [`claim`] and cleared
//! by [`reset`]. Which pads play these roles comes from the
//! [`system::Target`] the registry is constructed with.
//!
//! ## Reset sweep
//!
//! [`reset_all`] returns every pad to the safe default state: function
//! select restored to plain GPIO, input buffer disabled, pull-up and
//! pull-down disabled, output driver disabled. Pads marked with
//! [`persist`] are skipped entirely, so hardware that must survive the
//! sweep (a status LED signal, a debug-critical USB pad) keeps its
//! configuration. A direct [`reset`] of a persisted pad still resets it
//! and drops the mark; only the bulk sweep honors persistence.
//!
//! When a status indicator pad becomes free again, the registry invokes
//! the indicator's reinitialization entry point installed with
//! [`set_indicator_reinit`], so the indicator resumes rendering through
//! the returned pad. For the two-wire pair, this only happens once both
//! pads are free at the same time.
//!
//! ## Register access
//!
//! Register access goes through a backend selected at construction:
//! [`open`] maps the pads window through `/dev/gpiomem0`, while
//! [`simulated`] uses an in-memory register file with the same bit
//! semantics for tests and non-hardware environments.
//!
//! ## Examples
//!
//! ```
//! use padctl::pads::PadRegistry;
//! use padctl::system::{Board, Target};
//!
//! let (mut registry, _regs) = PadRegistry::simulated(Target::new(Board::StatusHat));
//!
//! // Claim the status LED pad for a driver, then return it to the pool.
//! registry.claim(18);
//! assert!(!registry.is_free(18));
//! registry.reset(18);
//! assert!(registry.is_free(18));
//! ```
//!
//! [`claim`]: struct.PadRegistry.html#method.claim
//! [`persist`]: struct.PadRegistry.html#method.persist
//! [`reset`]: struct.PadRegistry.html#method.reset
//! [`reset_all`]: struct.PadRegistry.html#method.reset_all
//! [`open`]: struct.PadRegistry.html#method.open
//! [`simulated`]: struct.PadRegistry.html#method.simulated
//! [`set_indicator_reinit`]: struct.PadRegistry.html#method.set_indicator_reinit
//! [`PadRegistry::reset`]: struct.PadRegistry.html#method.reset
//! [`system::Target`]: ../system/struct.Target.html

use std::error;
use std::fmt;
use std::io;
use std::result;
use std::sync::Arc;

mod padmem;
mod pinset;

use crate::system::Target;

use self::padmem::PadRegisters;

pub use self::padmem::sim::SimPads;
pub use self::pinset::PinSet;

/// Errors that can occur when accessing the pad registers.
#[derive(Debug)]
pub enum Error {
    /// Permission denied when opening `/dev/gpiomem0` for read/write
    /// access.
    ///
    /// Make sure the current user is a member of the `gpio` group, or
    /// update the `udev` rules to grant access to `/dev/gpiomem0`.
    PermissionDenied(String),
    /// I/O error.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::PermissionDenied(ref path) => write!(f, "Permission denied: {}", path),
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result type returned from methods that can have `padctl::pads::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Built-in pull-up/pull-down resistor states.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Bias {
    Off,
    PullDown,
    PullUp,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Bias::Off => write!(f, "Off"),
            Bias::PullDown => write!(f, "PullDown"),
            Bias::PullUp => write!(f, "PullUp"),
        }
    }
}

/// Roles a pad can play in the system.
///
/// Most pads are ordinary I/O lines. The remaining roles identify pads
/// dedicated to system hardware, tracked by explicit in-use flags rather
/// than register readback.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Role {
    /// Ordinary I/O line.
    Io,
    /// One-wire status LED output.
    StatusLed,
    /// Clock pad of the two-wire status indicator.
    StatusClock,
    /// Data pad of the two-wire status indicator.
    StatusData,
    /// Audio amplifier enable line.
    AmpEnable,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Role::Io => write!(f, "I/O"),
            Role::StatusLed => write!(f, "Status LED"),
            Role::StatusClock => write!(f, "Status clock"),
            Role::StatusData => write!(f, "Status data"),
            Role::AmpEnable => write!(f, "Amp enable"),
        }
    }
}

/// Identity of a single pad.
///
/// `Pad`s are retrieved from a [`PadRegistry`] with [`PadRegistry::pad`],
/// and carry the pad's line number and resolved [`Role`].
///
/// [`PadRegistry`]: struct.PadRegistry.html
/// [`PadRegistry::pad`]: struct.PadRegistry.html#method.pad
/// [`Role`]: enum.Role.html
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Pad {
    number: u8,
    role: Role,
}

impl Pad {
    /// Returns the pad's line number.
    #[inline]
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Returns the pad's role.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }
}

/// Tracks ownership and lifecycle of the GPIO pads.
///
/// The registry owns the set of pads that survive a reset sweep, the
/// in-use flags for pads dedicated to system hardware, and a handle to
/// the pad registers. All bookkeeping is expected to run on a single
/// control thread; the registry performs no locking of its own.
pub struct PadRegistry {
    target: Target,
    regs: Arc<dyn PadRegisters>,
    roles: [Role; PinSet::WIDTH as usize],
    never_reset: PinSet,
    status_led_in_use: bool,
    status_clock_in_use: bool,
    status_data_in_use: bool,
    amp_enable_in_use: bool,
    indicator_reinit: Option<Box<dyn FnMut() + Send>>,
}

impl fmt::Debug for PadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PadRegistry")
            .field("target", &self.target)
            .field("regs", &self.regs)
            .field("roles", &format_args!("{{ .. }}"))
            .field("never_reset", &self.never_reset)
            .field("status_led_in_use", &self.status_led_in_use)
            .field("status_clock_in_use", &self.status_clock_in_use)
            .field("status_data_in_use", &self.status_data_in_use)
            .field("amp_enable_in_use", &self.amp_enable_in_use)
            .field("indicator_reinit", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl PadRegistry {
    /// Constructs a new `PadRegistry` backed by the memory-mapped pad
    /// registers.
    pub fn open(target: Target) -> Result<PadRegistry> {
        let regs = Arc::new(padmem::mmap::PadMem::open()?);

        Ok(PadRegistry::with_registers(target, regs))
    }

    /// Constructs a new `PadRegistry` backed by a simulated register
    /// file, along with a handle to the register file for inspection.
    ///
    /// The simulated registers reproduce the pad control bit semantics of
    /// the hardware, so the registry behaves identically in tests and on
    /// non-hardware targets.
    pub fn simulated(target: Target) -> (PadRegistry, Arc<SimPads>) {
        let sim = Arc::new(SimPads::new());

        (PadRegistry::with_registers(target, sim.clone()), sim)
    }

    fn with_registers(target: Target, regs: Arc<dyn PadRegisters>) -> PadRegistry {
        // Resolve the target's dedicated pad assignments into a role
        // table keyed by line number, so claim/free/reset dispatch on a
        // single lookup.
        let mut roles = [Role::Io; PinSet::WIDTH as usize];

        let assignments = [
            (target.status_led(), Role::StatusLed),
            (target.status_clock(), Role::StatusClock),
            (target.status_data(), Role::StatusData),
            (target.amp_enable(), Role::AmpEnable),
        ];

        for (pin, role) in assignments {
            if let Some(pin) = pin {
                if pin < target.pad_lines() {
                    roles[pin as usize] = role;
                }
            }
        }

        PadRegistry {
            target,
            regs,
            roles,
            never_reset: PinSet::new(),
            status_led_in_use: false,
            status_clock_in_use: false,
            status_data_in_use: false,
            amp_enable_in_use: false,
            indicator_reinit: None,
        }
    }

    /// Returns the target description the registry was constructed with.
    pub fn target(&self) -> Target {
        self.target
    }

    /// Returns the identity of the pad at the specified line number, or
    /// `None` if the line number is out of range.
    pub fn pad(&self, pin: u8) -> Option<Pad> {
        if pin >= self.target.pad_lines() {
            return None;
        }

        Some(Pad {
            number: pin,
            role: self.roles[pin as usize],
        })
    }

    /// Installs the status indicator's reinitialization entry point.
    ///
    /// The callback is invoked whenever a reset frees the status LED pad,
    /// or, for the two-wire indicator, once both the clock and data pads
    /// are free at the same time, so the indicator driver can resume
    /// rendering through the returned pads.
    pub fn set_indicator_reinit<C>(&mut self, callback: C)
    where
        C: FnMut() + Send + 'static,
    {
        self.indicator_reinit = Some(Box::new(callback));
    }

    /// Excludes a pad from [`reset_all`] sweeps.
    ///
    /// Marking a pad has no effect on the pad registers, and is
    /// idempotent. The mark is dropped again by a direct [`reset`] of
    /// the same pad. Out-of-range line numbers are ignored.
    ///
    /// [`reset`]: #method.reset
    /// [`reset_all`]: #method.reset_all
    pub fn persist(&mut self, pin: u8) {
        if pin >= self.target.pad_lines() {
            return;
        }

        self.never_reset.insert(pin);
    }

    /// Returns `true` if the pad is excluded from [`reset_all`] sweeps.
    ///
    /// [`reset_all`]: #method.reset_all
    pub fn is_persistent(&self, pin: u8) -> bool {
        self.never_reset.contains(pin)
    }

    /// Returns the set of pads excluded from [`reset_all`] sweeps.
    ///
    /// [`reset_all`]: #method.reset_all
    pub fn persisted(&self) -> PinSet {
        self.never_reset
    }

    /// Marks a pad as in use.
    ///
    /// For pads dedicated to system hardware this sets the pad's in-use
    /// flag, and is idempotent. For ordinary pads this is a bookkeeping
    /// no-op: their in-use state surfaces through the pad configuration
    /// performed by the claiming peripheral driver. Out-of-range line
    /// numbers are ignored.
    pub fn claim(&mut self, pin: u8) {
        if pin >= self.target.pad_lines() {
            return;
        }

        match self.roles[pin as usize] {
            Role::StatusLed => self.status_led_in_use = true,
            Role::StatusClock => self.status_clock_in_use = true,
            Role::StatusData => self.status_data_in_use = true,
            Role::AmpEnable => self.amp_enable_in_use = true,
            Role::Io => {}
        }
    }

    /// Returns `true` if the pad is free.
    ///
    /// Pads dedicated to system hardware report the negation of their
    /// in-use flag. Ordinary pads are free when their input buffer and
    /// output driver are both disabled, read back from the pad
    /// registers. The pad parked by the USB enumeration workaround
    /// always reports free; out-of-range line numbers always report
    /// busy.
    pub fn is_free(&self, pin: u8) -> bool {
        if pin >= self.target.pad_lines() {
            return false;
        }

        if self.target.usb_errata_pad() == Some(pin) {
            return true;
        }

        match self.roles[pin as usize] {
            Role::StatusLed => !self.status_led_in_use,
            Role::StatusClock => !self.status_clock_in_use,
            Role::StatusData => !self.status_data_in_use,
            Role::AmpEnable => !self.amp_enable_in_use,
            Role::Io => !self.regs.input_enabled(pin) && self.regs.output_disabled(pin),
        }
    }

    /// Resets a pad to the safe default state.
    ///
    /// The pad's function select is restored to plain GPIO, and the pad
    /// is shut down fully: input buffer disabled, pull-up and pull-down
    /// disabled, output driver disabled. The pad is also removed from
    /// the [`persist`] set, even when the removal makes no difference.
    ///
    /// Resetting a pad dedicated to system hardware clears its in-use
    /// flag and, for the status indicator pads, invokes the indicator's
    /// reinitialization entry point (see [`set_indicator_reinit`]).
    ///
    /// Out-of-range line numbers and the pad parked by the USB
    /// enumeration workaround are ignored.
    ///
    /// [`persist`]: #method.persist
    /// [`set_indicator_reinit`]: #method.set_indicator_reinit
    pub fn reset(&mut self, pin: u8) {
        if pin >= self.target.pad_lines() || self.target.usb_errata_pad() == Some(pin) {
            return;
        }

        self.never_reset.remove(pin);

        // Shut the pad down fully: both pulls are disabled, and so are
        // both buffers.
        self.regs.reinit(pin);
        self.regs.disable_input(pin);
        self.regs.set_bias(pin, Bias::Off);
        self.regs.disable_output(pin);

        match self.roles[pin as usize] {
            Role::StatusLed => {
                self.status_led_in_use = false;
                self.resume_indicator();
            }
            Role::StatusClock => {
                self.status_clock_in_use = false;
                self.resume_indicator_if_pair_free();
            }
            Role::StatusData => {
                self.status_data_in_use = false;
                self.resume_indicator_if_pair_free();
            }
            Role::AmpEnable => self.amp_enable_in_use = false,
            Role::Io => {}
        }
    }

    /// Resets every pad that isn't excluded from the sweep.
    ///
    /// Iterates over all pad lines and performs the full [`reset`]
    /// effect on each one, skipping pads marked with [`persist`].
    /// Skipped pads receive no register writes and keep their [`persist`]
    /// mark. This is the operation invoked between independent program
    /// executions to return the system to a known state.
    ///
    /// [`persist`]: #method.persist
    /// [`reset`]: #method.reset
    pub fn reset_all(&mut self) {
        for pin in 0..self.target.pad_lines() {
            if self.never_reset.contains(pin) {
                continue;
            }

            self.reset(pin);
        }
    }

    fn resume_indicator(&mut self) {
        if let Some(ref mut callback) = self.indicator_reinit {
            callback();
        }
    }

    // The two-wire indicator can only resume once it owns the complete
    // pair again.
    fn resume_indicator_if_pair_free(&mut self) {
        if !self.status_clock_in_use && !self.status_data_in_use {
            self.resume_indicator();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::system::Board;

    fn errata_target() -> Target {
        let mut target = Target::custom();
        target.set_usb_errata_pad(Some(15));
        target
    }

    #[test]
    fn reset_leaves_pad_free() {
        let (mut registry, sim) = PadRegistry::simulated(Target::custom());

        sim.enable_input(6);
        sim.enable_output(6);
        sim.set_bias(6, Bias::PullUp);
        sim.select_function(6, 2);
        assert!(!registry.is_free(6));

        registry.reset(6);

        assert!(registry.is_free(6));
        assert!(!registry.is_persistent(6));
        assert_eq!(sim.bias(6), Bias::Off);
        // Function select back to plain GPIO
        assert_eq!(sim.funcsel(6), 5);
    }

    #[test]
    fn errata_pad_is_never_reset() {
        let (mut registry, sim) = PadRegistry::simulated(errata_target());

        sim.enable_output(15);
        let writes = sim.write_count(15);

        registry.reset(15);
        registry.reset_all();

        assert_eq!(sim.write_count(15), writes);
        // Reported free regardless of register state
        assert!(registry.is_free(15));
    }

    #[test]
    fn persisted_pad_survives_sweep() {
        let (mut registry, sim) = PadRegistry::simulated(Target::custom());

        sim.enable_output(2);
        registry.persist(2);
        let writes = sim.write_count(2);

        registry.reset_all();

        assert_eq!(sim.write_count(2), writes);
        assert!(!registry.is_free(2));
        assert!(registry.is_persistent(2));
    }

    #[test]
    fn persist_is_idempotent() {
        let (mut registry, _sim) = PadRegistry::simulated(Target::custom());

        registry.persist(3);
        registry.persist(3);

        assert_eq!(registry.persisted().len(), 1);
    }

    #[test]
    fn direct_reset_overrides_persistence() {
        let (mut registry, sim) = PadRegistry::simulated(Target::custom());

        sim.enable_output(7);
        registry.persist(7);

        registry.reset(7);

        assert!(!registry.is_persistent(7));
        assert!(registry.is_free(7));
    }

    #[test]
    fn claim_of_status_led_is_idempotent() {
        let (mut registry, _sim) = PadRegistry::simulated(Target::new(Board::StatusHat));

        registry.claim(18);
        assert!(!registry.is_free(18));

        registry.claim(18);
        assert!(!registry.is_free(18));

        registry.reset(18);
        assert!(registry.is_free(18));
    }

    #[test]
    fn claim_of_ordinary_pad_stores_nothing() {
        let (mut registry, sim) = PadRegistry::simulated(Target::custom());

        // The pad only reads as busy once a peripheral configures it
        registry.claim(9);
        assert!(registry.is_free(9));

        sim.enable_input(9);
        assert!(!registry.is_free(9));

        registry.reset(9);
        assert!(registry.is_free(9));
    }

    #[test]
    fn status_led_reset_triggers_reinit() {
        let (mut registry, _sim) = PadRegistry::simulated(Target::new(Board::StatusHat));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.set_indicator_reinit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.claim(18);
        registry.reset(18);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn two_wire_indicator_resumes_once_pair_is_free() {
        let (mut registry, _sim) = PadRegistry::simulated(Target::new(Board::ClockedStatusHat));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.set_indicator_reinit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.claim(23);
        registry.claim(24);

        // The clock pad is still claimed, so the indicator can't resume
        registry.reset(23);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry.reset(24);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_reinit_hook_is_tolerated() {
        let (mut registry, _sim) = PadRegistry::simulated(Target::new(Board::StatusHat));

        registry.claim(18);
        registry.reset(18);

        assert!(registry.is_free(18));
    }

    #[test]
    fn out_of_range_lines_are_ignored() {
        let (mut registry, sim) = PadRegistry::simulated(Target::custom());

        registry.persist(40);
        registry.reset(40);
        registry.claim(40);

        assert!(registry.persisted().is_empty());
        assert!(!registry.is_free(40));
        assert_eq!(registry.pad(40), None);
        assert_eq!(sim.write_count(40), 0);
    }

    #[test]
    fn roles_resolve_by_line_number() {
        let (registry, _sim) = PadRegistry::simulated(Target::new(Board::ClockedStatusHat));

        assert_eq!(registry.pad(23).unwrap().role(), Role::StatusData);
        assert_eq!(registry.pad(24).unwrap().role(), Role::StatusClock);
        assert_eq!(registry.pad(10).unwrap().role(), Role::Io);
        assert_eq!(registry.pad(10).unwrap().number(), 10);
    }

    #[test]
    fn amp_enable_tracks_claim_and_reset() {
        let (mut registry, _sim) = PadRegistry::simulated(Target::new(Board::AmpHat));

        registry.claim(22);
        assert!(!registry.is_free(22));

        registry.reset(22);
        assert!(registry.is_free(22));
    }

    #[test]
    fn sweep_resets_everything_except_persisted_pads() {
        let (mut registry, sim) = PadRegistry::simulated(errata_target());

        registry.persist(2);
        sim.enable_output(2);
        let pad2_writes = sim.write_count(2);

        sim.enable_input(5);
        sim.enable_output(5);

        registry.reset_all();

        // Pad 2 untouched and still excluded from future sweeps
        assert_eq!(sim.write_count(2), pad2_writes);
        assert!(registry.is_persistent(2));
        assert_eq!(registry.persisted().len(), 1);

        // Pad 5 and every other unmarked pad are back to the free state
        assert!(registry.is_free(5));
        for pin in 0..registry.target().pad_lines() {
            if pin == 2 {
                continue;
            }

            assert!(registry.is_free(pin));
        }
    }

    #[test]
    fn sweep_releases_claimed_indicator_pads() {
        let (mut registry, _sim) = PadRegistry::simulated(Target::new(Board::ClockedStatusHat));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.set_indicator_reinit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.claim(23);
        registry.claim(24);
        registry.reset_all();

        assert!(registry.is_free(23));
        assert!(registry.is_free(24));
        // The pair becomes simultaneously free once, on the second reset
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
