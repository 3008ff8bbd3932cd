use crate::geometry::{DeviceDescriptor, Family};
use crate::{Command, DataFlash, Error, Result, SpiBus};

/// Page count above which Atmel parts need a full 32 bit read address.
const WIDE_ADDRESS_PAGES: u32 = 16384;

/// Address field layout of a fast read frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressWidth {
    /// Three address bytes followed by a dummy byte.
    ThreeWithDummy,
    /// Four address bytes, no dummy byte.
    Four,
}

impl DeviceDescriptor {
    /// Translate a logical byte offset into the address sent to the device.
    ///
    /// Parts not using power of 2 pages take the page index and the byte
    /// within the page as separate bit fields.
    pub fn physical_address(&self, offset: u32) -> u32 {
        if self.is_power_2 {
            offset
        } else {
            let page = offset / self.page_size;
            let byte = offset % self.page_size;
            // `byte` is below `page_size`, itself below `1 << page_offset`,
            // so the fields never overlap.
            (page << self.page_offset) + byte
        }
    }

    pub fn address_width(&self) -> AddressWidth {
        match self.family {
            Family::S25Fl512S | Family::N25Q => AddressWidth::ThreeWithDummy,
            _ if self.page_count > WIDE_ADDRESS_PAGES => AddressWidth::Four,
            _ => AddressWidth::ThreeWithDummy,
        }
    }

    /// Build the fast read command frame for physical address `address`.
    pub fn read_frame(&self, address: u32) -> [u8; 5] {
        let a = address.to_be_bytes();
        match self.address_width() {
            AddressWidth::ThreeWithDummy => [Command::FastRead.into(), a[1], a[2], a[3], 0x00],
            AddressWidth::Four => [Command::FastRead.into(), a[0], a[1], a[2], a[3]],
        }
    }
}

impl<'a, B: SpiBus> DataFlash<'a, B> {
    /// Read `dest.len()` bytes starting at logical byte `offset` into `dest`.
    ///
    /// The whole read is a single FastRead transfer.
    pub fn read_array(&mut self, desc: &DeviceDescriptor, offset: u32, dest: &mut [u8])
        -> Result<()>
    {
        let address = desc.physical_address(offset);
        let frame = desc.read_frame(address);
        log::trace!("Reading {} bytes from offset 0x{:08X} (address 0x{:08X})",
                    dest.len(), offset, address);
        let length = dest.len();
        self.send_command(&frame, dest).map_err(|err| {
            log::error!("Serial flash read error at 0x{:08X}, {} bytes", offset, length);
            read_error(err, offset, length)
        })
    }
}

#[cfg(feature = "std")]
fn read_error(err: Error, offset: u32, length: usize) -> Error {
    match err {
        Error::Transport(source) => Error::ReadError { offset, length, source },
        err => err,
    }
}
#[cfg(not(feature = "std"))]
fn read_error(err: Error, offset: u32, length: usize) -> Error {
    match err {
        Error::Transport => Error::ReadError { offset, length },
        err => err,
    }
}
