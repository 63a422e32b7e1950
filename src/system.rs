//! Board and target description.
//!
//! Use [`Target`] to describe the hardware configuration the pad registry
//! manages: how many pad lines the GPIO block exposes, which pad is parked
//! by the USB controller's enumeration workaround, and which pads are
//! dedicated to system hardware like an onboard status indicator or an
//! audio amplifier enable line.
//!
//! A `Target` is resolved once at startup, either from a known [`Board`]
//! or from the product string found in a HAT's identification EEPROM, and
//! treated as constant afterwards.
//!
//! [`Target`]: struct.Target.html
//! [`Board`]: enum.Board.html

use std::error;
use std::fmt;
use std::result;

// Usable pad lines in bank 0. The bank's registers are 32 bits wide, but
// the two top lines are reserved for internal use.
const PAD_LINES: u8 = 30;

// Parked by the USB controller's device enumeration workaround. Never
// reset, always reported free.
const USB_ENUMERATION_PAD: u8 = 15;

/// Errors that can occur when resolving the board description.
#[derive(Debug)]
pub enum Error {
    /// Unknown board.
    ///
    /// The product string doesn't match any of the boards with dedicated
    /// pad assignments known to this release. Use [`Target::custom`] to
    /// describe the hardware manually.
    ///
    /// [`Target::custom`]: struct.Target.html#method.custom
    UnknownBoard,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::UnknownBoard => write!(f, "Unknown board"),
        }
    }
}

impl error::Error for Error {}

/// Result type returned from methods that can have `system::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Identifiable boards with dedicated pad assignments.
///
/// `Board` might be extended with additional variants in a minor or
/// patch revision, and must not be exhaustively matched against.
/// Instead, add a `_` catch-all arm to match future variants.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Board {
    /// Bare 40-pin header, no pads dedicated to system hardware.
    BareHeader,
    /// Carrier with a one-wire status LED on pad 18.
    StatusHat,
    /// Carrier with a two-wire status indicator, data on pad 23 and
    /// clock on pad 24.
    ClockedStatusHat,
    /// Carrier with an audio amplifier enable line on pad 22.
    AmpHat,
    /// `Board` might be extended with additional variants in a minor or
    /// patch revision, and must not be exhaustively matched against.
    /// Instead, add a `_` catch-all arm to match future variants.
    #[doc(hidden)]
    __Nonexhaustive,
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Board::BareHeader => write!(f, "Bare header"),
            Board::StatusHat => write!(f, "Status HAT"),
            Board::ClockedStatusHat => write!(f, "Clocked status HAT"),
            Board::AmpHat => write!(f, "Amp HAT"),
            Board::__Nonexhaustive => write!(f, "__Nonexhaustive"),
        }
    }
}

// Identify the board based on the product string stored in the HAT's
// identification EEPROM, exposed through /proc/device-tree/hat/product.
fn parse_hat_product(product: &str) -> Result<Board> {
    // Strip the trailing NUL and any revision suffix appended by the
    // EEPROM flashing tools.
    let mut product = product.trim_end_matches('\0');
    if let Some(idx) = product.find(" Rev ") {
        product = &product[..idx];
    }

    let board = match product {
        "Status HAT" | "Status HAT Mini" => Board::StatusHat,
        "Clocked Status HAT" => Board::ClockedStatusHat,
        "Amp HAT" | "Amp HAT DAC" => Board::AmpHat,
        _ => return Err(Error::UnknownBoard),
    };

    Ok(board)
}

/// Hardware description resolved at startup.
///
/// `Target` carries the configuration constants the pad registry needs:
/// the number of usable pad lines, the pad parked by the USB enumeration
/// workaround, and the dedicated pad assignments for the board's system
/// hardware. Construct one from a known [`Board`] with [`new`], from a
/// HAT product string with [`from_hat_product`], or field by field with
/// [`custom`].
///
/// [`Board`]: enum.Board.html
/// [`new`]: #method.new
/// [`from_hat_product`]: #method.from_hat_product
/// [`custom`]: #method.custom
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Target {
    board: Option<Board>,
    pad_lines: u8,
    usb_errata_pad: Option<u8>,
    status_led: Option<u8>,
    status_clock: Option<u8>,
    status_data: Option<u8>,
    amp_enable: Option<u8>,
}

impl Target {
    /// Constructs a new `Target` for a known board.
    pub fn new(board: Board) -> Target {
        let mut target = Target {
            board: Some(board),
            pad_lines: PAD_LINES,
            usb_errata_pad: Some(USB_ENUMERATION_PAD),
            status_led: None,
            status_clock: None,
            status_data: None,
            amp_enable: None,
        };

        match board {
            Board::BareHeader => {}
            Board::StatusHat => target.status_led = Some(18),
            Board::ClockedStatusHat => {
                target.status_data = Some(23);
                target.status_clock = Some(24);
            }
            Board::AmpHat => target.amp_enable = Some(22),
            Board::__Nonexhaustive => unreachable!(),
        }

        target
    }

    /// Constructs a new `Target` based on the product string stored in a
    /// HAT's identification EEPROM.
    ///
    /// On a Raspberry Pi, the product string can be read from
    /// `/proc/device-tree/hat/product`.
    pub fn from_hat_product(product: &str) -> Result<Target> {
        Ok(Target::new(parse_hat_product(product)?))
    }

    /// Constructs a new `Target` without any dedicated pad assignments.
    ///
    /// Use the `set_` methods to describe hardware that isn't covered by
    /// one of the known [`Board`]s, or to configure a simulated target
    /// for testing.
    ///
    /// [`Board`]: enum.Board.html
    pub fn custom() -> Target {
        Target {
            board: None,
            pad_lines: PAD_LINES,
            usb_errata_pad: None,
            status_led: None,
            status_clock: None,
            status_data: None,
            amp_enable: None,
        }
    }

    /// Returns the board this target was resolved from, if any.
    pub fn board(&self) -> Option<Board> {
        self.board
    }

    /// Returns the number of usable pad lines.
    pub fn pad_lines(&self) -> u8 {
        self.pad_lines
    }

    /// Returns the pad parked by the USB enumeration workaround, if any.
    pub fn usb_errata_pad(&self) -> Option<u8> {
        self.usb_errata_pad
    }

    /// Returns the pad driving the one-wire status LED, if any.
    pub fn status_led(&self) -> Option<u8> {
        self.status_led
    }

    /// Returns the clock pad of the two-wire status indicator, if any.
    pub fn status_clock(&self) -> Option<u8> {
        self.status_clock
    }

    /// Returns the data pad of the two-wire status indicator, if any.
    pub fn status_data(&self) -> Option<u8> {
        self.status_data
    }

    /// Returns the audio amplifier enable pad, if any.
    pub fn amp_enable(&self) -> Option<u8> {
        self.amp_enable
    }

    /// Sets the pad parked by the USB enumeration workaround.
    pub fn set_usb_errata_pad(&mut self, pad: Option<u8>) {
        self.usb_errata_pad = pad;
    }

    /// Sets the pad driving the one-wire status LED.
    pub fn set_status_led(&mut self, pad: Option<u8>) {
        self.status_led = pad;
    }

    /// Sets the data and clock pads of the two-wire status indicator.
    ///
    /// The two pads are assigned as a pair. The indicator's driver only
    /// resumes rendering once both pads are free again.
    pub fn set_status_pair(&mut self, pads: Option<(u8, u8)>) {
        match pads {
            Some((data, clock)) => {
                self.status_data = Some(data);
                self.status_clock = Some(clock);
            }
            None => {
                self.status_data = None;
                self.status_clock = None;
            }
        }
    }

    /// Sets the audio amplifier enable pad.
    pub fn set_amp_enable(&mut self, pad: Option<u8>) {
        self.amp_enable = pad;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_tables() {
        let target = Target::new(Board::BareHeader);
        assert_eq!(target.pad_lines(), 30);
        assert_eq!(target.usb_errata_pad(), Some(15));
        assert_eq!(target.status_led(), None);
        assert_eq!(target.amp_enable(), None);

        let target = Target::new(Board::StatusHat);
        assert_eq!(target.status_led(), Some(18));

        let target = Target::new(Board::ClockedStatusHat);
        assert_eq!(target.status_data(), Some(23));
        assert_eq!(target.status_clock(), Some(24));
        assert_eq!(target.status_led(), None);

        let target = Target::new(Board::AmpHat);
        assert_eq!(target.amp_enable(), Some(22));
    }

    #[test]
    fn hat_product_strings() {
        assert_eq!(
            Target::from_hat_product("Status HAT").unwrap().board(),
            Some(Board::StatusHat)
        );

        // EEPROM strings are NUL-terminated and may carry a revision
        assert_eq!(
            Target::from_hat_product("Amp HAT Rev 1.1\0").unwrap().board(),
            Some(Board::AmpHat)
        );

        assert!(matches!(
            Target::from_hat_product("Weather Station"),
            Err(Error::UnknownBoard)
        ));
    }

    #[test]
    fn custom_target() {
        let mut target = Target::custom();
        assert_eq!(target.usb_errata_pad(), None);

        target.set_status_pair(Some((5, 6)));
        target.set_usb_errata_pad(Some(15));
        assert_eq!(target.status_data(), Some(5));
        assert_eq!(target.status_clock(), Some(6));

        target.set_status_pair(None);
        assert_eq!(target.status_data(), None);
        assert_eq!(target.status_clock(), None);
    }
}
