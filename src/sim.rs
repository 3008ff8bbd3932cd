//! Simulated serial flash and recovery button for tests.

use std::collections::VecDeque;
use std::time::Duration;

use crate::{AnyhowResult, Gpio, SpiBus, SpiMode};

/// A serial flash on a simulated SPI controller.
///
/// Every frame written while chip-select is active is recorded in `frames`
/// (the bytes shifted out). The response to each byte is worked out from the
/// opcode at the start of the frame:
///
/// * 0x9F returns `id`;
/// * 0x05, 0x70 and 0xD7 return the next byte of `status_script`, or `status`
///   once the script is exhausted;
/// * 0x0B returns `memory`, starting at the frame's address.
pub struct SimFlash {
    pub id: [u8; 5],
    pub memory: Vec<u8>,
    /// (page size, page offset) to translate AT45 page/byte addresses back
    /// into `memory` indices. Addresses are linear when None.
    pub page_translation: Option<(u32, u8)>,
    /// If true, 0x0B frames carry a 4 byte address and no dummy byte.
    pub four_byte_reads: bool,
    pub status: u8,
    pub status_script: VecDeque<u8>,
    /// Fail the first byte exchange of the frame with this index.
    pub fail_frame: Option<usize>,
    pub fail_init: bool,

    pub frames: Vec<Vec<u8>>,
    pub init_args: Option<(SpiMode, u32)>,
    pub enables: usize,
    pub disables: usize,
    pub cs_activations: usize,
    pub cs_deactivations: usize,
    pub status_clears: usize,
    pub slept: Duration,

    frame: Vec<u8>,
    cs_active: bool,
    rx: u8,
    read_base: Option<usize>,
}

impl SimFlash {
    pub fn new(id: [u8; 5]) -> Self {
        SimFlash {
            id,
            memory: Vec::new(),
            page_translation: None,
            four_byte_reads: false,
            status: 0x00,
            status_script: VecDeque::new(),
            fail_frame: None,
            fail_init: false,
            frames: Vec::new(),
            init_args: None,
            enables: 0,
            disables: 0,
            cs_activations: 0,
            cs_deactivations: 0,
            status_clears: 0,
            slept: Duration::from_millis(0),
            frame: Vec::new(),
            cs_active: false,
            rx: 0xFF,
            read_base: None,
        }
    }

    /// Fill `len` bytes of memory with a pattern that does not repeat on page boundaries.
    pub fn fill_pattern(&mut self, len: usize) {
        self.memory = (0..len).map(|i| (i ^ (i >> 8) ^ (i >> 16)) as u8).collect();
    }

    fn linear_index(&self, address: u32) -> usize {
        match self.page_translation {
            Some((page_size, page_offset)) => {
                let page = address >> page_offset;
                let byte = address & ((1 << page_offset) - 1);
                (page * page_size + byte) as usize
            }
            None => address as usize,
        }
    }

    fn respond(&mut self) -> u8 {
        let idx = self.frame.len() - 1;
        match self.frame[0] {
            0x9F => self.id.get(idx.wrapping_sub(1)).copied().unwrap_or(0x00),
            0x05 | 0x70 | 0xD7 if idx == 1 => {
                self.status_script.pop_front().unwrap_or(self.status)
            }
            0x0B => {
                let header = 5;
                if idx + 1 == header {
                    let a = &self.frame[1..];
                    let address = if self.four_byte_reads {
                        u32::from_be_bytes([a[0], a[1], a[2], a[3]])
                    } else {
                        u32::from_be_bytes([0, a[0], a[1], a[2]])
                    };
                    self.read_base = Some(self.linear_index(address));
                }
                match self.read_base {
                    Some(base) if idx >= header => {
                        self.memory.get(base + idx - header).copied().unwrap_or(0xFF)
                    }
                    _ => 0xFF,
                }
            }
            _ => 0xFF,
        }
    }
}

impl SpiBus for SimFlash {
    fn init(&mut self, mode: SpiMode, clock_hz: u32) -> AnyhowResult<()> {
        if self.fail_init {
            anyhow::bail!("simulated SPI init failure");
        }
        self.init_args = Some((mode, clock_hz));
        Ok(())
    }

    fn enable(&mut self) {
        self.enables += 1;
    }

    fn disable(&mut self) {
        self.disables += 1;
    }

    fn cs_activate(&mut self) {
        assert!(!self.cs_active, "chip-select activated twice");
        self.cs_active = true;
        self.cs_activations += 1;
        self.frame.clear();
        self.read_base = None;
    }

    fn cs_deactivate(&mut self) {
        assert!(self.cs_active, "chip-select deactivated while inactive");
        self.cs_active = false;
        self.cs_deactivations += 1;
        self.frames.push(std::mem::take(&mut self.frame));
    }

    fn clear_status(&mut self) {
        self.status_clears += 1;
    }

    fn write_byte(&mut self, byte: u8) -> AnyhowResult<()> {
        if !self.cs_active {
            anyhow::bail!("byte written without chip-select");
        }
        if self.fail_frame == Some(self.frames.len()) {
            anyhow::bail!("simulated SPI fault in frame {}", self.frames.len());
        }
        self.frame.push(byte);
        self.rx = self.respond();
        Ok(())
    }

    fn read_byte(&mut self) -> AnyhowResult<u8> {
        Ok(self.rx)
    }

    fn sleep(&mut self, dur: Duration) {
        self.slept += dur;
    }
}

/// A recovery button pin at a fixed level, recording which pins were read.
pub struct SimButton {
    pub level: bool,
    pub reads: Vec<u32>,
}

impl Gpio for SimButton {
    fn read(&mut self, pin: u32) -> bool {
        self.reads.push(pin);
        self.level
    }
}
