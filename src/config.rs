use crate::error::StoryResult;
use crate::objects::PropertyEncoding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunable constants of the map-recovery heuristics.
///
/// Every field has a default, so a TOML file only needs the values it changes:
///
/// ```toml
/// fallback_start = 120
/// portable_properties = [5, 6, 9, 11]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    /// Highest object number considered when looking for rooms in v1-3
    /// stories, and by the clustered phases in every version
    pub max_scan_object: u16,
    /// Highest object number the fallback scan reaches in v4+ stories
    pub max_scan_object_extended: u16,
    /// Room candidates need strictly more properties than this
    pub candidate_min_properties: usize,
    /// Fewer clustered rooms than this triggers the numeric-range fallback
    pub min_rooms_before_fallback: usize,
    /// First object number of the fallback range
    pub fallback_start: u16,
    /// Fallback range end (exclusive), further capped by the scan limit
    pub fallback_end: u16,
    /// Minimum share of readable characters in a valid object name
    pub name_validity_threshold: f64,
    /// Properties below this number are never exit properties
    pub min_exit_property: u8,
    /// Dictionary extra bytes above this are not property hints
    pub max_hint_property: u8,
    /// Any of these properties marks an object as portable
    pub portable_properties: Vec<u8>,
    /// Instructions decoded per room routine by the cross-validator
    pub validator_instruction_limit: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            max_scan_object: 255,
            max_scan_object_extended: 2000,
            candidate_min_properties: 3,
            min_rooms_before_fallback: 10,
            fallback_start: 142,
            fallback_end: 300,
            name_validity_threshold: 0.7,
            min_exit_property: 13,
            max_hint_property: 31,
            // value, trophy value, capacity
            portable_properties: vec![5, 6, 9],
            validator_instruction_limit: 100,
        }
    }
}

impl MapperConfig {
    pub fn from_toml_str(source: &str) -> StoryResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> StoryResult<Self> {
        let source = fs::read_to_string(path)?;
        MapperConfig::from_toml_str(&source)
    }

    /// Highest object number worth scanning for a story of this encoding
    pub fn scan_limit(&self, encoding: PropertyEncoding) -> u16 {
        match encoding {
            PropertyEncoding::Legacy => self.max_scan_object,
            PropertyEncoding::Extended => self.max_scan_object_extended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoryError;
    use test_log::test;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            MapperConfig::from_toml_str("").unwrap(),
            MapperConfig::default()
        );
    }

    #[test]
    fn test_partial_override() {
        let config = MapperConfig::from_toml_str(
            "fallback_start = 120\nportable_properties = [5, 6, 9, 11]\n",
        )
        .unwrap();
        assert_eq!(config.fallback_start, 120);
        assert_eq!(config.portable_properties, vec![5, 6, 9, 11]);
        assert_eq!(config.min_exit_property, 13);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = MapperConfig::from_toml_str("room_start = 5\n");
        assert!(matches!(result, Err(StoryError::Config(_))));
    }

    #[test]
    fn test_scan_limit_follows_encoding() {
        let config = MapperConfig::default();
        assert_eq!(config.scan_limit(PropertyEncoding::Legacy), 255);
        assert_eq!(config.scan_limit(PropertyEncoding::Extended), 2000);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MapperConfig::load("/nonexistent/gruemap.toml"),
            Err(StoryError::Io(_))
        ));
    }
}
