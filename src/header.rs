use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

/// Size of the fixed story file header
pub const HEADER_SIZE: usize = 64;

fn word_at(bytes: &[u8], addr: usize) -> u16 {
    ((bytes[addr] as u16) << 8) | (bytes[addr + 1] as u16)
}

/// Decoded story file header.
///
/// Callers must hand in at least `HEADER_SIZE` bytes; `StoryImage::from_memory`
/// enforces this before constructing a header.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u8,
    pub release: u16,
    pub serial: String,
    pub base_high_mem: u16,
    pub base_static_mem: u16,
    pub initial_pc: u16,
    pub abbrev_table: u16,
    pub len_file: usize,
    pub checksum_file: u16,
    pub dictionary: u16,
    pub object_table_addr: u16,
    pub global_variables: u16,
}

impl Header {
    pub fn new(bytes: &[u8]) -> Header {
        let file_words = word_at(bytes, 0x1A) as usize;
        let version = bytes[0];
        Header {
            version,
            release: word_at(bytes, 2),
            serial: bytes[0x12..0x18]
                .iter()
                .map(|b| if b.is_ascii_graphic() { *b as char } else { '?' })
                .collect(),
            base_high_mem: word_at(bytes, 4),
            base_static_mem: word_at(bytes, 0x0E),
            initial_pc: word_at(bytes, 6),
            abbrev_table: word_at(bytes, 0x18),
            len_file: file_words * file_length_multiplier(version),
            checksum_file: word_at(bytes, 0x1C),
            dictionary: word_at(bytes, 0x08),
            object_table_addr: word_at(bytes, 0x0A),
            global_variables: word_at(bytes, 0x0C),
        }
    }

    /// The property defaults table sits at the very start of the object table
    pub fn property_defaults(&self) -> usize {
        self.object_table_addr as usize
    }
}

fn file_length_multiplier(version: u8) -> usize {
    match version {
        1..=3 => 2,
        4..=5 => 4,
        _ => 8,
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Serial number:            {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.serial,
            self.base_high_mem,
            self.initial_pc,
            self.dictionary,
            self.object_table_addr,
            self.global_variables,
            self.base_static_mem,
            self.abbrev_table,
            self.len_file,
            self.checksum_file,
        )
    }
}
