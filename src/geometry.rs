use crate::id::{JedecId, Manufacturer};
use crate::sreg::At45Status;
use crate::{Command, DataFlash, Error, Result, SpiBus};

/// Serial flash families.
///
/// Each family shares command opcodes and status register semantics.
/// The discriminant is the family code derived from the JEDEC device ID.
#[derive(Copy, Clone, Debug, PartialEq, Eq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Family {
    /// Atmel AT26F.
    At26F = 0x00,
    /// Atmel AT45 dataflash.
    At45 = 0x20,
    /// Atmel AT25DF and AT26DF.
    At26Df = 0x40,
    /// Spansion S25FL512S.
    S25Fl512S = 0x02,
    /// Micron N25Q.
    N25Q = 0xBA,
}

impl Family {
    /// Classify a part from its manufacturer and family code.
    pub fn classify(manufacturer: Manufacturer, family_code: u8) -> Result<Self> {
        let family = match (manufacturer, family_code) {
            (Manufacturer::Atmel, 0x00) => Some(Family::At26F),
            (Manufacturer::Atmel, 0x20) => Some(Family::At45),
            (Manufacturer::Atmel, 0x40) => Some(Family::At26Df),
            (Manufacturer::Spansion, 0x02) => Some(Family::S25Fl512S),
            (Manufacturer::Micron, 0xBA) => Some(Family::N25Q),
            _ => None,
        };
        family.ok_or_else(|| {
            log::error!("Unsupported serial flash family 0x{:02X} from {:?}",
                        family_code, manufacturer);
            Error::UnsupportedFamily { manufacturer: manufacturer.into(), family: family_code }
        })
    }

    /// True for the AT25/AT26 families, which share a command set.
    pub fn is_at25(&self) -> bool {
        matches!(self, Family::At26F | Family::At26Df)
    }

    /// Geometry of families with fixed parameters, None for AT45.
    pub fn fixed_geometry(&self) -> Option<Geometry> {
        match self {
            Family::At26F | Family::At26Df => Some(AT25_GEOMETRY),
            Family::S25Fl512S => Some(S25FL512S_GEOMETRY),
            Family::N25Q => Some(N25Q_GEOMETRY),
            Family::At45 => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Family::At26F => "AT26F",
            Family::At45 => "AT45",
            Family::At26Df => "AT26DF",
            Family::S25Fl512S => "S25FL512S",
            Family::N25Q => "N25Q",
        }
    }
}

impl core::fmt::Display for Family {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Page geometry of a serial flash.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub page_count: u32,
    pub page_size: u32,
    /// Bit position of the page index within a page/byte encoded address.
    pub page_offset: u8,
}

/// AT25DF321 and compatible.
const AT25_GEOMETRY: Geometry = Geometry { page_count: 16384, page_size: 256, page_offset: 0 };

// The page counts of these two are nominal, only large enough to select
// wide read framing. They are not the device capacity.
const S25FL512S_GEOMETRY: Geometry = Geometry { page_count: 50000, page_size: 512, page_offset: 0 };
const N25Q_GEOMETRY: Geometry = Geometry { page_count: 50000, page_size: 256, page_offset: 0 };

/// One row of the AT45 density table.
#[derive(Copy, Clone, Debug)]
pub struct At45Density {
    /// Density code as found in status register bits [5:2].
    pub code: u8,
    pub part: &'static str,
    pub geometry: Geometry,
}

const fn at45(code: u8, part: &'static str, pages: u32, size: u32, offset: u8) -> At45Density {
    At45Density {
        code,
        part,
        geometry: Geometry { page_count: pages, page_size: size, page_offset: offset },
    }
}

/// Supported AT45 densities.
pub const AT45_DENSITIES: [At45Density; 7] = [
    at45(0x0C, "AT45DB011D", 512, 264, 9),
    at45(0x14, "AT45DB021D", 1024, 264, 9),
    at45(0x1C, "AT45DB041D", 2048, 264, 9),
    at45(0x24, "AT45DB081D", 4096, 264, 9),
    at45(0x2C, "AT45DB161D", 4096, 528, 10),
    at45(0x34, "AT45DB321D", 8192, 528, 10),
    at45(0x3C, "AT45DB642D", 8192, 1056, 11),
];

/// AT45 densities which are recognised but disabled.
///
/// No hardware has been available to check these. The 12 bit offset with
/// 2112 byte pages in particular needs confirming against a datasheet.
pub const AT45_UNVERIFIED_DENSITIES: [At45Density; 3] = [
    at45(0x10, "AT45DB1282D", 16384, 1056, 11),
    at45(0x18, "AT45DB2562D", 16384, 2112, 12),
    at45(0x20, "AT45DB5122D", 32768, 2112, 12),
];

/// Look up an AT45 density code.
pub fn at45_density(code: u8) -> Result<&'static At45Density> {
    if let Some(density) = AT45_DENSITIES.iter().find(|d| d.code == code) {
        return Ok(density);
    }
    match AT45_UNVERIFIED_DENSITIES.iter().find(|d| d.code == code) {
        Some(density) => log::error!("{} (density 0x{:02X}) is not supported", density.part, code),
        None => log::error!("Unsupported AT45 density code 0x{:02X}", code),
    }
    Err(Error::UnsupportedDensity { density: code })
}

/// Geometry and addressing of the probed serial flash.
///
/// Built once by `DataFlash::probe()` and not modified afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub family: Family,
    pub page_count: u32,
    pub page_size: u32,
    /// Shift of the page index when composing an address.
    /// Only used when `is_power_2` is false, and zero otherwise.
    pub page_offset: u8,
    /// If true, addresses are linear byte offsets.
    pub is_power_2: bool,
}

impl DeviceDescriptor {
    /// Create a descriptor for a linearly addressed part.
    pub fn linear(family: Family, geometry: Geometry) -> Self {
        DeviceDescriptor {
            family,
            page_count: geometry.page_count,
            page_size: geometry.page_size,
            page_offset: 0,
            is_power_2: true,
        }
    }

    /// Create a descriptor for an AT45 part.
    pub fn at45(geometry: Geometry, is_power_2: bool) -> Self {
        DeviceDescriptor {
            family: Family::At45,
            page_count: geometry.page_count,
            page_size: geometry.page_size,
            page_offset: if is_power_2 { 0 } else { geometry.page_offset },
            is_power_2,
        }
    }
}

impl<'a, B: SpiBus> DataFlash<'a, B> {
    /// Read the five byte manufacturer and device ID.
    pub fn read_jedec_id(&mut self) -> Result<JedecId> {
        let mut id = [0u8; 5];
        self.send_command(&[Command::ReadJEDECID.into()], &mut id)?;
        let id = JedecId(id);
        log::debug!("Read ID: {}", id);
        Ok(id)
    }

    /// Identify the attached serial flash and work out its geometry.
    pub fn probe(&mut self) -> Result<DeviceDescriptor> {
        log::debug!("Probing serial flash");
        let id = self.read_jedec_id()?;
        let manufacturer = id.manufacturer()?;
        let family_code = manufacturer.family_code(id.device_byte());
        let family = Family::classify(manufacturer, family_code)?;

        let desc = match family.fixed_geometry() {
            Some(geometry) => DeviceDescriptor::linear(family, geometry),
            None => self.probe_at45()?,
        };
        log::debug!("Found {} flash: {} pages of {} bytes, power of 2: {}",
                    desc.family, desc.page_count, desc.page_size, desc.is_power_2);
        Ok(desc)
    }

    /// AT45 geometry depends on the density and page size configuration
    /// reported in the status register.
    fn probe_at45(&mut self) -> Result<DeviceDescriptor> {
        let status = At45Status(self.read_status_at45()?);
        log::debug!("AT45 status: {:02X}", status.0);
        let density = at45_density(status.get_density())?;
        log::debug!("Found {}", density.part);
        Ok(DeviceDescriptor::at45(density.geometry, status.get_power_of_2()))
    }
}
