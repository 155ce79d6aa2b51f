pub mod classify;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod exits;
pub mod graph;
pub mod header;
pub mod instruction;
pub mod objects;
pub mod pipeline;
pub mod rooms;
pub mod story;
pub mod text;
pub mod validate;

// Synthetic story images, used by the unit and integration tests
pub mod builder;

pub use config::MapperConfig;
pub use error::{StoryError, StoryResult};
pub use graph::MapReport;
pub use pipeline::{extract_map, extract_map_validated};
pub use story::StoryImage;
