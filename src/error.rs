// Story image error handling

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum StoryError {
    // Loading errors
    ImageTooSmall(usize), // actual length
    Io(String),
    Config(String),

    // Decoding errors
    AddressOutOfBounds(usize, usize), // address, image length
    InvalidObject(u16, String),       // object number, reason
    InvalidProperty(u8, String),      // property number, reason
    InvalidText(usize, String),       // address, reason
    InvalidInstruction(usize, String),
}

impl fmt::Display for StoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoryError::ImageTooSmall(len) => {
                write!(f, "Story file too small for header: {} bytes", len)
            }
            StoryError::Io(msg) => write!(f, "I/O error: {}", msg),
            StoryError::Config(msg) => write!(f, "Configuration error: {}", msg),
            StoryError::AddressOutOfBounds(addr, len) => {
                write!(
                    f,
                    "Address {:#06x} out of bounds (image length {:#06x})",
                    addr, len
                )
            }
            StoryError::InvalidObject(obj, reason) => {
                write!(f, "Invalid object {}: {}", obj, reason)
            }
            StoryError::InvalidProperty(prop, reason) => {
                write!(f, "Invalid property {}: {}", prop, reason)
            }
            StoryError::InvalidText(addr, reason) => {
                write!(f, "Cannot decode text at {:#06x}: {}", addr, reason)
            }
            StoryError::InvalidInstruction(addr, reason) => {
                write!(f, "Cannot decode instruction at {:#06x}: {}", addr, reason)
            }
        }
    }
}

impl std::error::Error for StoryError {}

impl From<std::io::Error> for StoryError {
    fn from(err: std::io::Error) -> Self {
        StoryError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for StoryError {
    fn from(err: toml::de::Error) -> Self {
        StoryError::Config(err.to_string())
    }
}

pub type StoryResult<T> = Result<T, StoryError>;
