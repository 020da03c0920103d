//! Arbitration of an SPI bus shared with other peripherals.
//!
//! The flash chip is often wired to the same SPI peripheral as a radio or a
//! display, each wanting its own clock polarity, bit order and divider. The
//! driver saves whatever mode the bus is in, applies the flash mode for one
//! command sequence, and puts the previous mode back before leaving the
//! critical section.

/// Platform hook for saving and restoring the shared SPI peripheral's mode.
///
/// On an AVR-like target `Mode` would be the pair of control and status
/// register values; on targets where the flash owns the bus, use [`Dedicated`].
pub trait SharedBus {
    /// Snapshot of the bus configuration
    type Mode: Copy;

    /// Capture the current bus configuration
    fn save(&mut self) -> Self::Mode;

    /// Apply the configuration the flash expects (SPI mode 0, MSB first)
    fn configure(&mut self);

    /// Put back a configuration captured by `save()`
    fn restore(&mut self, mode: Self::Mode);
}

/// A bus with no other users, nothing to save or restore
#[derive(Debug, Default, Clone, Copy)]
pub struct Dedicated;

impl SharedBus for Dedicated {
    type Mode = ();

    fn save(&mut self) -> Self::Mode {}

    fn configure(&mut self) {}

    fn restore(&mut self, _mode: Self::Mode) {}
}
