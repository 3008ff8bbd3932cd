/// AT45 dataflash status register, read with 0xD7.
#[derive(Copy, Clone, Debug)]
pub struct At45Status(pub u8);

impl At45Status {
    /// Get RDY/BUSY bit; unlike most flashes, set means ready.
    pub fn get_ready(&self) -> bool {
        self.0 & 0b1000_0000 != 0
    }

    /// Get density code, bits [5:2] left in place.
    pub fn get_density(&self) -> u8 {
        self.0 & 0b0011_1100
    }

    /// Get PAGE SIZE bit, set when configured for binary (power of 2) pages.
    pub fn get_power_of_2(&self) -> bool {
        self.0 & 0b0000_0001 != 0
    }
}

/// AT25/AT26 status register, read with 0x05.
#[derive(Copy, Clone, Debug)]
pub struct At25Status(pub u8);

impl At25Status {
    /// Get RDY/BSY bit; set means busy.
    pub fn get_busy(&self) -> bool {
        self.0 & 0b0000_0001 != 0
    }

    /// Get WEL (write enable latch) bit.
    pub fn get_wel(&self) -> bool {
        self.0 & 0b0000_0010 != 0
    }

    /// Get SWP (software protection) bits.
    ///
    /// Non-zero if any sector is software protected.
    pub fn get_swp(&self) -> u8 {
        self.0 & 0b0000_1100
    }

    /// Get EPE (erase/program error) bit.
    pub fn get_epe(&self) -> bool {
        self.0 & 0b0010_0000 != 0
    }

    /// Get SPRL (sector protection registers locked) bit.
    pub fn get_sprl(&self) -> bool {
        self.0 & 0b1000_0000 != 0
    }

    /// True if any sector protection or the protection lock is still in effect.
    pub fn is_protected(&self) -> bool {
        self.get_swp() != 0 || self.get_sprl()
    }
}

/// Spansion status register 1, read with 0x05.
#[derive(Copy, Clone, Debug)]
pub struct SpansionStatus(pub u8);

impl SpansionStatus {
    /// Get WIP (write in progress) bit.
    pub fn get_busy(&self) -> bool {
        self.0 & 0b0000_0001 != 0
    }
}

/// Micron flag status register, read with 0x70.
#[derive(Copy, Clone, Debug)]
pub struct MicronFlagStatus(pub u8);

impl MicronFlagStatus {
    /// Get program/erase controller bit; set means ready.
    pub fn get_ready(&self) -> bool {
        self.0 & 0b1000_0000 != 0
    }
}

#[test]
fn test_at45_status() {
    // AT45DB161D, ready, default page size.
    let status = At45Status(0xAC);
    assert!(status.get_ready());
    assert!(!status.get_power_of_2());
    assert_eq!(status.get_density(), 0x2C);
    assert!(At45Status(0xAD).get_power_of_2());
    assert!(!At45Status(0x2C).get_ready());
}

#[test]
fn test_at25_protection() {
    assert!(!At25Status(0x00).is_protected());
    assert!(At25Status(0x0C).is_protected());
    assert!(At25Status(0x80).is_protected());
    assert!(!At25Status(0x23).is_protected());
    assert!(At25Status(0x23).get_epe());
    assert!(At25Status(0x03).get_busy());
    assert!(At25Status(0x03).get_wel());
}
