/*!
This is a platform agnostic Rust driver for the [Spansion S25FL series serial NOR flash SPI memory chips](https://www.infineon.com/cms/en/product/memories/nor-flash/standard-spi-nor-flash/),
based on the [`embedded-hal`](https://github.com/rust-embedded/embedded-hal) traits.

The chip is expected to share its SPI peripheral with other devices (a radio, typically). Every
command runs inside a critical section which saves the bus mode, applies the flash mode, drives
chip-select, and restores the previous mode afterwards. See [`SharedBus`].

This driver allows you to:

- Verify the JEDEC identifier and globally unprotect the array. See: `initialize()`.
- Read the JEDEC identifier and the 12-byte factory unique identifier. See: `read_device_id()`, `read_unique_id()`.
- Read a single byte or N bytes from a memory address. See: `read_byte()`, `read_bytes()`.
- Write a single byte or up to a 256-byte page starting on a memory address. See: `write_byte()`, `write_bytes()`.
- Erase 4K, 32K, 64K and 512K blocks, or the whole chip. See: `block_erase_4k()` and friends, `bulk_erase()`.
- Read, poll and log the status registers. See: `read_status()`, `busy()`, `log_status()`.

Writes never erase. Flash bits only go from 1 to 0, so the target range must be erased first.

# Supported devices

| Device | Memory bytes | Memory bits | JEDEC ID | Datasheet |
|-------:|------------:|------------:|---------:|:-----------|
| S25fl127s | 16 MB | 128 Mbit | `01 20 18` | [S25FL127S] |
| AnyNor | 16 MB addressable | - | not checked | - |

[S25FL127S]: https://www.infineon.com/dgdl/Infineon-S25FL127S_128_Mbit_16_Mbyte_3.0V_SPI_Flash_Memory-DataSheet-v13_00-EN.pdf

# Blocking

Every command except the status reads first polls the WIP bit until the chip is ready. There is
no timeout: an erase of the whole chip takes tens of seconds, and a missing chip with MISO floating
high blocks forever. A weak pull-down on MISO makes a missing chip read as idle instead.

# Usage

```rust,ignore
use s25fl::*;

// 1. Ensure spi and cs are defined (device specific)

// 2. Instantiate the S25FL127S on a bus it does not share
let mut flash = S25fl::new(spi, cs, Dedicated, device_type::S25fl127s);

// 3. Check the identifier and clear the block protection bits
assert!(flash.initialize().unwrap());

// 4. Erase the first sector, then write and read back some bytes
flash.block_erase_4k(0x00_u32).unwrap();
flash.write_bytes(0x00_u32, b"test").unwrap();
let mut data = [0_u8; 4];
flash.read_bytes(0x00_u32, &mut data).unwrap();
assert_eq!(&data, b"test");

// 5. Read the factory unique identifier
let uid = flash.read_unique_id().unwrap();
```

*/
#![deny(unsafe_code)]
#![cfg_attr(not(test), no_std)]

extern crate bit_field;
extern crate embedded_hal as hal;

mod bus;
mod spiflash;

pub use bus::{Dedicated, SharedBus};
pub use spiflash::DeviceType;

/// Bytes in a program page
pub const PAGE_SIZE: usize = 256;
/// Bytes erased by `block_erase_4k()`
pub const SECTOR_4K: u32 = 0x1000;
/// Bytes erased by `block_erase_64k()`
pub const BLOCK_64K: u32 = 0x1_0000;
/// Length of the factory unique identifier
pub const UNIQUE_ID_LEN: usize = 12;
/// Length of the manufacturer ID and CFI table returned by `9Fh`
pub const ID_TABLE_LEN: usize = 320;

/// Spansion S25FL NOR flash driver
#[derive(Debug)]
pub struct S25fl<SPI, CS, BUS, DT>
where
    BUS: SharedBus,
{
    /// The concrete SPI device implementation
    spi: SPI,
    /// The SPI chip select pin
    cs: CS,
    /// The shared bus mode registers
    bus: BUS,
    /// The flash device type
    dt: DT,
    /// Expected JEDEC identifier, `None` skips the check in `initialize()`
    pub jedec_id: Option<u32>,
    /// Bus mode saved while chip-select is asserted
    saved_mode: Option<BUS::Mode>,
    unique_id: [u8; UNIQUE_ID_LEN],
}

/// All instructions used by this crate
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Write status register 1 (WRR)
    WriteStatus = 0x01,
    /// Program 1 to 256 bytes within a page (PP)
    PageProgram = 0x02,
    /// Read data at low frequency (READ)
    Read = 0x03,
    /// Clear the write enable latch (WRDI)
    WriteDisable = 0x04,
    /// Read status register 1 (RDSR1)
    ReadStatus = 0x05,
    /// Set the write enable latch (WREN)
    WriteEnable = 0x06,
    /// Read status register 2 (RDSR2)
    ReadStatus2 = 0x07,
    /// Read data with one dummy byte after the address (FAST_READ)
    FastRead = 0x0B,
    /// Erase a 4KB sector (P4E)
    SectorErase4K = 0x20,
    /// Read the one time program region
    OtpRead = 0x4B,
    /// Erase the whole array (BE)
    BulkErase = 0x60,
    /// Read the JEDEC manufacturer and device identifier
    ReadId = 0x9F,
    /// Erase a 64KB sector (SE)
    BlockErase64K = 0xD8,
}

/// All possible errors in this crate
#[derive(Debug)]
pub enum Error<S, P> {
    /// SPI bus error
    SpiError(S),
    /// Pin error
    PinError(P),
    /// Too much data passed for a page program
    TooMuchData,
}

/// Status register 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u8);

/// Status register 2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status2(pub u8);

/// Types of devices supported by this crate
pub mod device_type {
    /// Spansion S25FL127S, 16MB (128Mbit) NOR flash
    #[derive(Debug, Default, Clone, Copy)]
    pub struct S25fl127s;
    /// Any 3-byte addressed NOR flash with the same command set, identifier not checked
    #[derive(Debug, Default, Clone, Copy)]
    pub struct AnyNor;
}

type SpiRes<S, P> = Result<(), Error<S, P>>;
