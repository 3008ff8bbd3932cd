use core::convert::TryFrom;

use crate::{Error, Result};

/// JEDEC manufacturer codes of the supported serial flash vendors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Manufacturer {
    Spansion = 0x01,
    Atmel = 0x1F,
    Micron = 0x20,
}

impl Manufacturer {
    /// Extract the family code from the first device ID byte.
    ///
    /// Atmel packs the family into the top three bits, with the density below;
    /// the other vendors use the whole byte.
    pub fn family_code(&self, device_byte: u8) -> u8 {
        match self {
            Manufacturer::Atmel => device_byte & 0xE0,
            Manufacturer::Spansion | Manufacturer::Micron => device_byte,
        }
    }
}

/// Store the ID read off a serial flash with the 0x9F command.
///
/// Byte 0 is the manufacturer ID, bytes 1 and 2 the device ID and,
/// where present, bytes 3 and 4 extended device information.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JedecId(pub [u8; 5]);

impl JedecId {
    pub fn manufacturer_id(&self) -> u8 {
        self.0[0]
    }

    /// First device ID byte, which carries the family code.
    pub fn device_byte(&self) -> u8 {
        self.0[1]
    }

    /// Match the manufacturer ID against the supported vendors.
    pub fn manufacturer(&self) -> Result<Manufacturer> {
        Manufacturer::try_from(self.manufacturer_id()).map_err(|_| {
            log::error!("Unsupported serial flash manufacturer ID 0x{:02X}", self.manufacturer_id());
            Error::UnsupportedManufacturer { id: self.manufacturer_id() }
        })
    }

    /// Look up a manufacturer name from the JEDEC ID.
    #[cfg(feature = "std")]
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        match jep106::JEP106Code::new(0, self.manufacturer_id() & 0x7F).get() {
            // Spansion parts use the code inherited from AMD.
            Some(mfn) if mfn == "AMD" => Some("AMD/Spansion"),
            // Micron N25Q parts use the code inherited from Numonyx/ST.
            Some(mfn) if mfn == "STMicroelectronics" => Some("STMicroelectronics/Micron"),
            Some(mfn) => Some(mfn),
            None => None,
        }
    }
}

impl core::fmt::Display for JedecId {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Manufacturer 0x{:02X}", self.manufacturer_id())?;
        #[cfg(feature = "std")]
        {
            if let Some(mfn) = self.manufacturer_name() {
                write!(f, " ({})", mfn)?;
            }
        }
        write!(f, ", Device {:02X?}", &self.0[1..])
    }
}

#[test]
fn test_family_code() {
    assert_eq!(Manufacturer::Atmel.family_code(0x26), 0x20);
    assert_eq!(Manufacturer::Atmel.family_code(0x47), 0x40);
    assert_eq!(Manufacturer::Atmel.family_code(0x04), 0x00);
    assert_eq!(Manufacturer::Spansion.family_code(0x02), 0x02);
    assert_eq!(Manufacturer::Micron.family_code(0xBA), 0xBA);
}

#[test]
fn test_manufacturer() {
    assert_eq!(JedecId([0x1F, 0x26, 0, 1, 0]).manufacturer().unwrap(), Manufacturer::Atmel);
    assert_eq!(JedecId([0x01, 0x02, 0x20, 0, 0]).manufacturer().unwrap(), Manufacturer::Spansion);
    assert_eq!(JedecId([0x20, 0xBA, 0x21, 0, 0]).manufacturer().unwrap(), Manufacturer::Micron);
    assert!(matches!(
        JedecId([0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).manufacturer(),
        Err(Error::UnsupportedManufacturer { id: 0xFF })
    ));
}
