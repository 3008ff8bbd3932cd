// Copyright 2020, 2021 Adam Greig
// Licensed under the Apache-2.0 and MIT licenses.

//! dataflash-boot
//!
//! This crate loads a boot image, and optionally a device tree blob, out of a
//! SPI serial dataflash or NOR flash into memory. It is intended for early boot
//! stages with no operating system: all operations are synchronous and polled,
//! and nothing is allocated.
//!
//! Atmel AT45 and AT25/AT26 dataflash, Spansion S25FL512S and Micron N25Q parts
//! are identified from their JEDEC ID, and their page geometry and addressing
//! scheme are worked out before reading. An optional recovery erase of
//! sector 0 can be triggered by a button at boot.

#![cfg_attr(not(feature = "std"), no_std)]

use core::time::Duration;

pub mod geometry;
pub mod id;
pub mod load;
pub mod read;
pub mod recovery;
pub mod sreg;

#[cfg(all(test, feature = "std"))]
mod sim;

pub use geometry::{At45Density, DeviceDescriptor, Family, Geometry};
pub use id::{JedecId, Manufacturer};
pub use load::{
    load_dataflash, ImageInfo, ImageInspector, ImageKind, ImageRegion, LoadConfig, LoadOutcome,
    SpiMode,
};
pub use read::AddressWidth;
pub use recovery::{poll_until, EraseTiming, PollOutcome, RecoveryConfig, RecoveryOutcome};
pub use sreg::{At25Status, At45Status, MicronFlagStatus, SpansionStatus};

#[cfg(feature = "std")]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unsupported serial flash manufacturer ID 0x{id:02X}.")]
    UnsupportedManufacturer { id: u8 },
    #[error("Unsupported serial flash family 0x{family:02X} for manufacturer 0x{manufacturer:02X}.")]
    UnsupportedFamily { manufacturer: u8, family: u8 },
    #[error("Unsupported AT45 density code 0x{density:02X}.")]
    UnsupportedDensity { density: u8 },
    #[error("Sector protection still set after unprotect, status 0x{status:02X}.")]
    UnprotectFailed { status: u8 },
    #[error("{family} sector 0 erase timed out after {polls} status polls.")]
    EraseTimedOut { family: Family, polls: u32 },
    #[error("Serial flash read of {length} bytes from 0x{offset:08X} failed.")]
    ReadError {
        offset: u32,
        length: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("Could not determine the {kind} image length.")]
    ImageLengthError {
        kind: ImageKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("The {kind} image is {length} bytes but only {capacity} bytes are available.")]
    ImageTooLarge { kind: ImageKind, length: usize, capacity: usize },

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}
#[cfg(not(feature = "std"))]
#[derive(Debug)]
pub enum Error {
    UnsupportedManufacturer { id: u8 },
    UnsupportedFamily { manufacturer: u8, family: u8 },
    UnsupportedDensity { density: u8 },
    UnprotectFailed { status: u8 },
    EraseTimedOut { family: Family, polls: u32 },
    ReadError { offset: u32, length: usize },
    ImageLengthError { kind: ImageKind },
    ImageTooLarge { kind: ImageKind, length: usize, capacity: usize },

    Transport,
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(feature = "std")]
pub type AnyhowResult<T> = anyhow::Result<T>;
#[cfg(not(feature = "std"))]
pub type AnyhowResult<T> = Result<T>;

#[cfg(feature = "std")]
pub(crate) fn transport_error(msg: &'static str) -> Error {
    Error::Transport(anyhow::Error::msg(msg))
}
#[cfg(not(feature = "std"))]
pub(crate) fn transport_error(msg: &'static str) -> Error {
    log::error!("SPI transport error: {}", msg);
    Error::Transport
}

/// Trait for the SPI controller the serial flash is attached to.
///
/// Chip-select is driven manually: `DataFlash` calls `cs_activate()` before
/// the first byte of a command frame and `cs_deactivate()` after the last.
/// Every byte written shifts one byte in, which is returned by the following
/// `read_byte()`.
pub trait SpiBus {
    /// Configure the controller for the serial flash chip-select.
    fn init(&mut self, mode: SpiMode, clock_hz: u32) -> AnyhowResult<()>;

    fn enable(&mut self);

    fn disable(&mut self);

    fn cs_activate(&mut self);

    fn cs_deactivate(&mut self);

    /// Read the controller status register, discarding any pending events.
    fn clear_status(&mut self);

    /// Shift `byte` out on MOSI.
    fn write_byte(&mut self, byte: u8) -> AnyhowResult<()>;

    /// Return the byte shifted in on MISO by the last `write_byte()`.
    fn read_byte(&mut self) -> AnyhowResult<u8>;

    /// Busy-wait for `dur`.
    fn sleep(&mut self, dur: Duration);
}

/// Trait for reading the level of a GPIO pin, used for the recovery button.
pub trait Gpio {
    /// Returns true if `pin` is at a high level.
    fn read(&mut self, pin: u32) -> bool;
}

/// Serial flash driver.
///
/// Wraps a `SpiBus` and provides command framing, status reads, probing,
/// array reads and the recovery erase.
pub struct DataFlash<'a, B: SpiBus> {
    bus: &'a mut B,
}

impl<'a, B: SpiBus> DataFlash<'a, B> {
    /// Create a new DataFlash using the given bus, which must already be
    /// initialised and enabled.
    pub fn new(bus: &'a mut B) -> Self {
        DataFlash { bus }
    }

    /// Send command and address bytes `cmd`, then clock in `data.len()` bytes into `data`.
    ///
    /// Chip-select is asserted for the whole frame and always released
    /// before returning, including when a byte exchange fails.
    pub fn send_command(&mut self, cmd: &[u8], data: &mut [u8]) -> Result<()> {
        if cmd.is_empty() {
            log::error!("Refusing to send an empty command frame");
            return Err(transport_error("empty command frame"));
        }

        log::trace!("SPI command: write {:02X?}, read {} bytes", cmd, data.len());
        self.bus.cs_activate();
        let result = self.shift_frame(cmd, data);
        self.bus.cs_deactivate();

        match &result {
            Ok(()) if !data.is_empty() => log::trace!("SPI command: read {:02X?}", data),
            Ok(()) => (),
            Err(_) => log::error!("SPI command 0x{:02X} failed", cmd[0]),
        }
        result
    }

    fn shift_frame(&mut self, cmd: &[u8], data: &mut [u8]) -> Result<()> {
        self.bus.clear_status();
        for &byte in cmd {
            self.bus.write_byte(byte)?;
            self.bus.read_byte()?;
        }
        for byte in data.iter_mut() {
            self.bus.write_byte(0)?;
            *byte = self.bus.read_byte()?;
        }
        Ok(())
    }

    /// Writes `command` followed by up to four parameter bytes, without reading any response.
    pub fn write<C: Into<u8>>(&mut self, command: C, params: &[u8]) -> Result<()> {
        let mut frame = [0u8; 5];
        if params.len() > frame.len() - 1 {
            return Err(transport_error("too many command parameter bytes"));
        }
        frame[0] = command.into();
        frame[1..=params.len()].copy_from_slice(params);
        self.send_command(&frame[..=params.len()], &mut [])
    }

    /// Convenience method for issuing a single command and not caring about the returned data.
    pub fn command<C: Into<u8>>(&mut self, command: C) -> Result<()> {
        self.write(command, &[])
    }

    /// Send the WriteEnable command, setting the WEL bit in the status register.
    pub fn write_enable(&mut self) -> Result<()> {
        self.command(Command::WriteEnable)
    }

    /// Read the AT45 status register.
    pub fn read_status_at45(&mut self) -> Result<u8> {
        self.read_register(Command::ReadStatusAT45)
    }

    /// Read the AT25/AT26 status register.
    pub fn read_status_at25(&mut self) -> Result<u8> {
        self.read_register(Command::ReadStatus)
    }

    /// Read the Spansion status register 1.
    pub fn read_status_spansion(&mut self) -> Result<u8> {
        self.read_register(Command::ReadStatus)
    }

    /// Read the Micron flag status register.
    pub fn read_flag_status_micron(&mut self) -> Result<u8> {
        self.read_register(Command::ReadFlagStatus)
    }

    /// Read the raw status byte `family` reports readiness in.
    pub fn read_status(&mut self, family: Family) -> Result<u8> {
        match family {
            Family::At45 => self.read_status_at45(),
            Family::At26F | Family::At26Df => self.read_status_at25(),
            Family::S25Fl512S => self.read_status_spansion(),
            Family::N25Q => self.read_flag_status_micron(),
        }
    }

    fn read_register(&mut self, command: Command) -> Result<u8> {
        let mut status = [0u8; 1];
        self.send_command(&[command.into()], &mut status)?;
        Ok(status[0])
    }

    #[cfg(feature = "recovery")]
    pub(crate) fn sleep(&mut self, dur: Duration) {
        self.bus.sleep(dur);
    }
}

/// Serial flash command opcodes.
///
/// The common set is shared by the AT25/AT26, Spansion and Micron parts;
/// AT45 dataflash uses its own status and page erase opcodes.
#[derive(Copy, Clone, Debug, num_enum::IntoPrimitive)]
#[allow(unused)]
#[repr(u8)]
pub(crate) enum Command {
    ReadJEDECID = 0x9F,
    FastRead = 0x0B,

    // Common instruction set.
    WriteEnable = 0x06,
    WriteDisable = 0x04,
    ReadStatus = 0x05,
    WriteStatus = 0x01,
    PageProgram = 0x02,
    ReadFlagStatus = 0x70,

    // Erase instructions.
    Erase4K = 0x20,
    Erase32K = 0x52,
    Erase64K = 0xD8,
    ChipErase = 0xC7,

    // AT45 dataflash.
    ReadStatusAT45 = 0xD7,
    PageEraseAT45 = 0x81,
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sim::SimFlash;

    #[test]
    fn test_send_command_frames_data() {
        let mut sim = SimFlash::new([0x1F, 0x26, 0x00, 0x01, 0x00]);
        let mut flash = DataFlash::new(&mut sim);
        let mut id = [0u8; 5];
        flash.send_command(&[0x9F], &mut id).unwrap();
        assert_eq!(id, [0x1F, 0x26, 0x00, 0x01, 0x00]);
        assert_eq!(sim.cs_activations, 1);
        assert_eq!(sim.cs_deactivations, 1);
        assert_eq!(sim.status_clears, 1);
        assert_eq!(sim.frames, vec![vec![0x9F, 0, 0, 0, 0, 0]]);
    }

    #[test]
    fn test_send_command_rejects_empty_frame() {
        let mut sim = SimFlash::new([0x1F, 0x26, 0x00, 0x01, 0x00]);
        let mut flash = DataFlash::new(&mut sim);
        let err = flash.send_command(&[], &mut [0u8; 4]).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(sim.cs_activations, 0);
        assert!(sim.frames.is_empty());
    }

    #[test]
    fn test_send_command_releases_cs_on_failure() {
        let mut sim = SimFlash::new([0x1F, 0x26, 0x00, 0x01, 0x00]);
        sim.fail_frame = Some(0);
        let mut flash = DataFlash::new(&mut sim);
        let err = flash.send_command(&[0x9F], &mut [0u8; 5]).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(sim.cs_activations, 1);
        assert_eq!(sim.cs_deactivations, 1);
    }

    #[test]
    fn test_write_frames_parameters() {
        let mut sim = SimFlash::new([0x1F, 0x47, 0x00, 0x00, 0x00]);
        let mut flash = DataFlash::new(&mut sim);
        flash.write(Command::Erase4K, &[0, 0, 0]).unwrap();
        flash.write_enable().unwrap();
        assert!(flash.write(Command::Erase4K, &[0; 5]).is_err());
        assert_eq!(sim.frames, vec![vec![0x20, 0, 0, 0], vec![0x06]]);
    }

    #[test]
    fn test_status_readers_use_family_opcodes() {
        let mut sim = SimFlash::new([0x1F, 0x26, 0x00, 0x01, 0x00]);
        sim.status = 0xA5;
        let mut flash = DataFlash::new(&mut sim);
        for family in [Family::At45, Family::At26Df, Family::S25Fl512S, Family::N25Q].iter() {
            assert_eq!(flash.read_status(*family).unwrap(), 0xA5);
        }
        let opcodes: Vec<u8> = sim.frames.iter().map(|f| f[0]).collect();
        assert_eq!(opcodes, vec![0xD7, 0x05, 0x05, 0x70]);
    }
}
