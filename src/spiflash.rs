use super::*;
use bit_field::BitField;
use hal::blocking::spi::{Transfer, Write};
use hal::digital::v2::OutputPin;
use log::{debug, info, warn};

pub trait DeviceType {
    const JEDEC_ID: Option<u32>;
    const CAPACITY: u32;
}

// Macros
macro_rules! impl_device_type {
    ($devicetype:ident, $a:expr, $b:expr) => {
        impl DeviceType for device_type::$devicetype {
            const JEDEC_ID: Option<u32> = $a;
            const CAPACITY: u32 = $b;
        }
    };
}

impl_device_type!(S25fl127s, Some(0x01_2018_u32), 0x100_0000_u32);
impl_device_type!(AnyNor, None, 0x100_0000_u32);

/// Opcode followed by the address truncated to 24 bits, MSB first
fn command_and_address(instruction: Instruction, address: u32) -> [u8; 4] {
    let mut word = address;
    word.set_bits(24..32, instruction as u32);
    word.to_be_bytes()
}

impl Status {
    /// Write in progress (WIP)
    pub fn busy(self) -> bool {
        self.0.get_bit(0)
    }

    /// Write enable latch (WEL)
    pub fn write_enabled(self) -> bool {
        self.0.get_bit(1)
    }

    /// Block protection bits BP2..BP0
    pub fn block_protect(self) -> u8 {
        self.0.get_bits(2..5)
    }

    /// The last erase failed (E_ERR)
    pub fn erase_error(self) -> bool {
        self.0.get_bit(5)
    }

    /// The last program failed (P_ERR)
    pub fn program_error(self) -> bool {
        self.0.get_bit(6)
    }

    /// Status register write disable (SRWD)
    pub fn write_disable(self) -> bool {
        self.0.get_bit(7)
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Status2 {
    /// A page program is suspended (PS)
    pub fn program_suspended(self) -> bool {
        self.0.get_bit(0)
    }

    /// A sector erase is suspended (ES)
    pub fn erase_suspended(self) -> bool {
        self.0.get_bit(1)
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl<SPI, S, P, CS, BUS, DT> S25fl<SPI, CS, BUS, DT>
where
    SPI: Transfer<u8, Error = S> + Write<u8, Error = S>,
    CS: OutputPin<Error = P>,
    BUS: SharedBus,
    DT: DeviceType,
{
    /// Create the driver, no bus traffic happens until `initialize()`
    pub fn new(spi: SPI, cs: CS, bus: BUS, dt: DT) -> Self {
        S25fl {
            spi,
            cs,
            bus,
            dt,
            jedec_id: DT::JEDEC_ID,
            saved_mode: None,
            unique_id: [0; UNIQUE_ID_LEN],
        }
    }

    /// Release chip-select, wait for the chip, check the identifier and globally unprotect.
    ///
    /// Returns `Ok(false)` when the identifier does not match the expected one, in which case
    /// nothing is written to the chip.
    pub fn initialize(&mut self) -> Result<bool, Error<S, P>> {
        self.cs.set_high().map_err(Error::PinError)?;
        self.wakeup()?;
        self.wait_until_ready()?;

        if let Some(expected) = self.jedec_id {
            let found = self.read_device_id()?;
            debug!("JEDEC ID: {:06X}", found);
            if found != expected {
                warn!(
                    "JEDEC ID mismatch: expected {:06X}, got {:06X}",
                    expected, found
                );
                return Ok(false);
            }
        }

        // Clear BP2..BP0
        self.write_command(&[Instruction::WriteStatus as u8, 0])?;
        Ok(true)
    }

    /// Give back the SPI bus, chip-select pin and bus handle
    pub fn release(self) -> (SPI, CS, BUS) {
        (self.spi, self.cs, self.bus)
    }

    /// Addressable size of the device in bytes
    pub fn capacity(&self) -> u32 {
        DT::CAPACITY
    }

    /// Save the bus mode, apply the flash mode and assert chip-select
    fn select(&mut self) -> SpiRes<S, P> {
        self.saved_mode = Some(self.bus.save());
        self.bus.configure();
        self.cs.set_low().map_err(Error::PinError)
    }

    /// Deassert chip-select and restore the bus mode
    fn unselect(&mut self) -> SpiRes<S, P> {
        let res = self.cs.set_high().map_err(Error::PinError);
        if let Some(mode) = self.saved_mode.take() {
            self.bus.restore(mode);
        }
        res
    }

    /// Run one command sequence with the chip selected, interrupts disabled.
    ///
    /// Chip-select is deasserted and the bus mode restored even when a transfer fails.
    fn transaction<R, F>(&mut self, f: F) -> Result<R, Error<S, P>>
    where
        F: FnOnce(&mut SPI) -> Result<R, S>,
    {
        critical_section::with(|_cs| -> Result<R, Error<S, P>> {
            let res = match self.select() {
                Ok(()) => f(&mut self.spi).map_err(Error::SpiError),
                Err(e) => Err(e),
            };
            let released = self.unselect();
            let out = res?;
            released?;
            Ok(out)
        })
    }

    /// Busy-poll, then send `bytes` and read the response into the same buffer
    fn command(&mut self, bytes: &mut [u8]) -> SpiRes<S, P> {
        self.wait_until_ready()?;
        self.transaction(|spi| spi.transfer(bytes).map(|_| ()))
    }

    /// Busy-poll, set the write enable latch, then send `bytes`
    fn write_command(&mut self, bytes: &[u8]) -> SpiRes<S, P> {
        self.wait_until_ready()?;
        self.transaction(|spi| spi.write(&[Instruction::WriteEnable as u8]))?;
        self.transaction(|spi| spi.write(bytes))
    }

    /// Return status register 1, without waiting for the chip
    pub fn read_status(&mut self) -> Result<Status, Error<S, P>> {
        let mut buf: [u8; 2] = [Instruction::ReadStatus as u8, 0];
        self.transaction(|spi| spi.transfer(&mut buf).map(|_| ()))?;
        Ok(Status(buf[1]))
    }

    /// Return status register 2, without waiting for the chip
    pub fn read_status2(&mut self) -> Result<Status2, Error<S, P>> {
        let mut buf: [u8; 2] = [Instruction::ReadStatus2 as u8, 0];
        self.transaction(|spi| spi.transfer(&mut buf).map(|_| ()))?;
        Ok(Status2(buf[1]))
    }

    /// Return true while a write or erase is in progress
    pub fn busy(&mut self) -> Result<bool, Error<S, P>> {
        Ok(self.read_status()?.busy())
    }

    /// Poll the status register until the chip is idle. There is no timeout.
    pub fn wait_until_ready(&mut self) -> SpiRes<S, P> {
        while self.busy()? {}
        Ok(())
    }

    /// Read both status registers and log them in binary
    pub fn log_status(&mut self) -> Result<(Status, Status2), Error<S, P>> {
        let sr1 = self.read_status()?;
        let sr2 = self.read_status2()?;
        info!("Status Register 1 (Binary): {:08b}", sr1.bits());
        info!("Status Register 2 (Binary): {:08b}", sr2.bits());
        Ok((sr1, sr2))
    }

    /// Return the 24-bit JEDEC manufacturer and device identifier
    pub fn read_device_id(&mut self) -> Result<u32, Error<S, P>> {
        let mut buf: [u8; 4] = [Instruction::ReadId as u8, 0, 0, 0];
        self.command(&mut buf)?;
        Ok(u32::from_be_bytes([0, buf[1], buf[2], buf[3]]))
    }

    /// Read the manufacturer identifier and CFI table into `buf`
    pub fn read_id_table(&mut self, buf: &mut [u8]) -> SpiRes<S, P> {
        self.wait_until_ready()?;
        for b in buf.iter_mut() {
            *b = 0;
        }
        self.transaction(|spi| {
            spi.write(&[Instruction::ReadId as u8])?;
            spi.transfer(buf).map(|_| ())
        })
    }

    /// Read the 320-byte identifier and CFI table and log it in rows of 32 bytes
    pub fn log_id_table(&mut self) -> SpiRes<S, P> {
        let mut table = [0_u8; ID_TABLE_LEN];
        self.read_id_table(&mut table)?;
        for (i, row) in table.chunks(32).enumerate() {
            info!("{:03X}: {:02X?}", i * 32, row);
        }
        Ok(())
    }

    /// Read the factory programmed unique identifier from the start of the OTP region.
    ///
    /// Only needs to be called once, the value stays available through `unique_id()`.
    pub fn read_unique_id(&mut self) -> Result<&[u8; UNIQUE_ID_LEN], Error<S, P>> {
        // address 0 and one dummy byte
        let mut buf: [u8; 5 + UNIQUE_ID_LEN] = [0; 5 + UNIQUE_ID_LEN];
        buf[0] = Instruction::OtpRead as u8;
        self.command(&mut buf)?;
        self.unique_id.clone_from_slice(&buf[5..]);
        Ok(&self.unique_id)
    }

    /// The identifier captured by the last `read_unique_id()`, zeroes before that
    pub fn unique_id(&self) -> &[u8; UNIQUE_ID_LEN] {
        &self.unique_id
    }

    /// Read a single byte from an address
    pub fn read_byte(&mut self, address: u32) -> Result<u8, Error<S, P>> {
        let mut buf: [u8; 5] = [0; 5];
        buf[..4].clone_from_slice(&command_and_address(Instruction::Read, address));
        self.command(&mut buf)?;
        Ok(buf[4])
    }

    /// Read N-bytes sequentially, starting from an address
    pub fn read_bytes(&mut self, address: u32, bytes: &mut [u8]) -> SpiRes<S, P> {
        let mut header: [u8; 5] = [0; 5];
        header[..4].clone_from_slice(&command_and_address(Instruction::FastRead, address));
        for b in bytes.iter_mut() {
            *b = 0;
        }
        self.wait_until_ready()?;
        self.transaction(|spi| {
            spi.write(&header)?;
            spi.transfer(bytes).map(|_| ())
        })
    }

    /// Write a single byte to an erased address
    pub fn write_byte(&mut self, address: u32, byte: u8) -> SpiRes<S, P> {
        let mut buf: [u8; 5] = [0; 5];
        buf[..4].clone_from_slice(&command_and_address(Instruction::PageProgram, address));
        buf[4] = byte;
        self.write_command(&buf)
    }

    /// Program up to 256 bytes starting from an erased address.
    ///
    /// The chip wraps around within the addressed page: bytes past the page end are written to
    /// the start of the same page.
    pub fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> SpiRes<S, P> {
        if bytes.len() > PAGE_SIZE {
            return Err(Error::TooMuchData);
        }
        let header = command_and_address(Instruction::PageProgram, address);
        self.wait_until_ready()?;
        self.transaction(|spi| spi.write(&[Instruction::WriteEnable as u8]))?;
        self.transaction(|spi| {
            spi.write(&header)?;
            spi.write(bytes)
        })
    }

    /// Clear the write enable latch
    pub fn write_disable(&mut self) -> SpiRes<S, P> {
        self.wait_until_ready()?;
        self.transaction(|spi| spi.write(&[Instruction::WriteDisable as u8]))
    }

    /// Erase the 4KB sector containing the address
    pub fn block_erase_4k(&mut self, address: u32) -> SpiRes<S, P> {
        self.write_command(&command_and_address(Instruction::SectorErase4K, address))
    }

    /// Erase 32KB as eight consecutive 4KB sectors
    pub fn block_erase_32k(&mut self, address: u32) -> SpiRes<S, P> {
        for i in 0..8 {
            self.block_erase_4k(address.wrapping_add(i * SECTOR_4K))?;
        }
        Ok(())
    }

    /// Erase the 64KB sector containing the address
    pub fn block_erase_64k(&mut self, address: u32) -> SpiRes<S, P> {
        self.write_command(&command_and_address(Instruction::BlockErase64K, address))
    }

    /// Erase 512KB as eight consecutive 64KB sectors
    pub fn block_erase_512k(&mut self, address: u32) -> SpiRes<S, P> {
        for i in 0..8 {
            self.block_erase_64k(address.wrapping_add(i * BLOCK_64K))?;
        }
        Ok(())
    }

    /// Erase the first 512KB of the array
    pub fn chip_erase(&mut self) -> SpiRes<S, P> {
        self.block_erase_512k(0)
    }

    /// Erase the whole array.
    ///
    /// Takes up to a minute on a 16MB part. This returns once the command is sent; poll `busy()`
    /// or just issue the next command, which waits for the chip anyway.
    pub fn bulk_erase(&mut self) -> SpiRes<S, P> {
        self.write_command(&[Instruction::BulkErase as u8])
    }

    /// Deep power-down is not supported on this family, no bus traffic
    pub fn sleep(&mut self) -> SpiRes<S, P> {
        Ok(())
    }

    /// Deep power-down is not supported on this family, no bus traffic
    pub fn wakeup(&mut self) -> SpiRes<S, P> {
        Ok(())
    }
}
