use crate::error::{StoryError, StoryResult};
use crate::header::{Header, HEADER_SIZE};
use crate::instruction::Instruction;
use log::debug;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

/// Represents a loaded story file with owned, read-only memory
pub struct StoryImage {
    /// The raw story memory
    memory: Vec<u8>,
    /// The parsed header
    pub header: Header,
}

impl StoryImage {
    /// Create a new story image from memory bytes
    pub fn from_memory(memory: Vec<u8>) -> StoryResult<Self> {
        if memory.len() < HEADER_SIZE {
            return Err(StoryError::ImageTooSmall(memory.len()));
        }
        let header = Header::new(&memory);
        debug!(
            "Loaded story image: version {}, {} bytes",
            header.version,
            memory.len()
        );

        Ok(StoryImage { memory, header })
    }

    /// Read a story file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> StoryResult<Self> {
        let mut file = File::open(path)?;
        let mut memory = Vec::new();
        file.read_to_end(&mut memory)?;
        StoryImage::from_memory(memory)
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.memory
    }

    /// Read a byte, failing soft on addresses beyond the image
    pub fn read_byte(&self, addr: usize) -> StoryResult<u8> {
        self.memory
            .get(addr)
            .copied()
            .ok_or(StoryError::AddressOutOfBounds(addr, self.memory.len()))
    }

    /// Read a big-endian word
    pub fn read_word(&self, addr: usize) -> StoryResult<u16> {
        let high = self.read_byte(addr)?;
        let low = self.read_byte(addr + 1)?;
        Ok(((high as u16) << 8) | low as u16)
    }

    /// Borrow `len` bytes starting at `addr`
    pub fn read_slice(&self, addr: usize, len: usize) -> StoryResult<&[u8]> {
        let end = addr
            .checked_add(len)
            .ok_or(StoryError::AddressOutOfBounds(addr, self.memory.len()))?;
        self.memory
            .get(addr..end)
            .ok_or(StoryError::AddressOutOfBounds(end, self.memory.len()))
    }

    /// Decode the instruction at `addr` using this image's version
    pub fn decode_instruction(&self, addr: usize) -> StoryResult<Instruction> {
        Instruction::decode(&self.memory, addr, self.header.version)
    }

    /// Unpack a routine address based on version
    pub fn unpack_routine_address(&self, packed: u16) -> usize {
        match self.header.version {
            1..=3 => (packed as usize) * 2,
            4..=7 => (packed as usize) * 4,
            8 => (packed as usize) * 8,
            _ => (packed as usize) * 2,
        }
    }
}
