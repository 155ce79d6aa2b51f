use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::{debug, info, trace, warn};

use crate::config::MapperConfig;
use crate::objects::ObjectTable;
use crate::story::StoryImage;
use crate::text;

/// Result of room identification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifiedRooms {
    /// Room object number -> short name, ascending
    pub rooms: BTreeMap<u16, String>,
    /// The most common parent of room-like objects, if any were seen
    pub container: Option<u16>,
    /// Whether the numeric-range scan had to run
    pub used_fallback: bool,
}

impl IdentifiedRooms {
    pub fn contains(&self, obj_num: u16) -> bool {
        self.rooms.contains_key(&obj_num)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Lowest room number; objects below it are items and scenery
    pub fn lowest(&self) -> Option<u16> {
        self.rooms.keys().next().copied()
    }
}

/// Short name of an object when it decodes and looks like real text
fn valid_name(table: &ObjectTable, obj_num: u16, config: &MapperConfig) -> Option<String> {
    match table.object_name(obj_num) {
        Ok(name) if text::is_valid_name(&name, config.name_validity_threshold) => Some(name),
        Ok(name) => {
            debug!("Object {} has an unusable name {:?}", obj_num, name);
            None
        }
        Err(e) => {
            debug!("Object {}: {}", obj_num, e);
            None
        }
    }
}

/// Work out which objects are locations.
///
/// Rooms share a parent (the rooms container) and carry more properties than
/// ordinary objects, so the parent most common among property-rich objects is
/// taken as the container. When that finds too few rooms, objects from a
/// conventional starting number onwards are taken instead.
pub fn identify_rooms(image: &StoryImage, config: &MapperConfig) -> IdentifiedRooms {
    let table = ObjectTable::new(image);
    let limit = config.scan_limit(table.encoding());
    let scan_end = limit.min(config.max_scan_object).min(table.count());
    let mut found = IdentifiedRooms::default();

    // Phase 1: tally the parents of room-like objects
    let mut parent_counts: IndexMap<u16, usize> = IndexMap::new();
    for obj_num in 1..=scan_end {
        let Ok(obj) = table.object(obj_num) else {
            continue;
        };
        if valid_name(&table, obj_num, config).is_none() {
            continue;
        }
        let prop_count = table.properties(obj_num).len();
        if prop_count > config.candidate_min_properties {
            trace!(
                "Room candidate {} (parent {}, {} properties)",
                obj_num, obj.parent, prop_count
            );
            *parent_counts.entry(obj.parent).or_insert(0) += 1;
        }
    }

    // Ties go to the parent seen first
    let mut best: Option<(u16, usize)> = None;
    for (&parent, &count) in &parent_counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((parent, count));
        }
    }
    found.container = best.map(|(parent, _)| parent);

    // Phase 2: every readable child of the container is a room
    if let Some(container) = found.container {
        debug!(
            "Rooms container is object {} ({} candidates)",
            container,
            parent_counts.get(&container).copied().unwrap_or(0)
        );
        for obj_num in 1..=scan_end {
            let Ok(obj) = table.object(obj_num) else {
                continue;
            };
            if obj.parent != container {
                continue;
            }
            if let Some(name) = valid_name(&table, obj_num, config) {
                found.rooms.insert(obj_num, name);
            }
        }
    } else {
        debug!(
            "No room candidates with more than {} properties",
            config.candidate_min_properties
        );
    }

    // Phase 3: numeric-range fallback
    if found.rooms.len() < config.min_rooms_before_fallback {
        found.used_fallback = true;
        let fallback_end = config.fallback_end.min(limit);
        debug!(
            "Only {} clustered rooms, scanning objects {}..{}",
            found.rooms.len(),
            config.fallback_start,
            fallback_end
        );
        for obj_num in config.fallback_start..fallback_end {
            if found.rooms.contains_key(&obj_num) {
                continue;
            }
            if table.object(obj_num).is_err() {
                break;
            }
            if let Some(name) = valid_name(&table, obj_num, config) {
                found.rooms.insert(obj_num, name);
            }
        }
    }

    if found.rooms.is_empty() {
        warn!("No rooms identified");
    } else {
        info!(
            "Identified {} rooms (container {:?}, fallback {})",
            found.rooms.len(),
            found.container,
            found.used_fallback
        );
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ObjectSpec, StoryBuilder};
    use test_log::test;

    const ROOM_NAMES: [&str; 12] = [
        "West of House",
        "North of House",
        "South of House",
        "Behind House",
        "Kitchen",
        "Attic",
        "Living Room",
        "Cellar",
        "Troll Room",
        "East-West Passage",
        "Round Room",
        "Maze",
    ];

    fn room_spec(name: &str, container: u16) -> ObjectSpec {
        ObjectSpec::new(name)
            .parent(container)
            .property(11, &[0x00, 0x10])
            .property(12, &[0x00])
            .property(14, &[0x22])
            .property(17, &[0x00, 0x20])
    }

    /// Object 1 is the container, 2..=13 rooms, then a few items
    fn clustered_builder() -> StoryBuilder {
        let mut builder = StoryBuilder::new(3);
        let container = builder.add_object(ObjectSpec::new("Rooms"));
        for name in ROOM_NAMES {
            builder.add_object(room_spec(name, container));
        }
        builder.add_object(
            ObjectSpec::new("brass lantern")
                .parent(6)
                .property(5, &[0x05]),
        );
        builder.add_object(
            ObjectSpec::new("globals")
                .property(1, &[0])
                .property(2, &[0])
                .property(3, &[0])
                .property(4, &[0]),
        );
        builder
    }

    #[test]
    fn test_clustered_rooms() {
        let image = clustered_builder().build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert_eq!(found.container, Some(1));
        assert!(!found.used_fallback);
        assert_eq!(found.len(), ROOM_NAMES.len());
        assert_eq!(found.rooms.get(&6).map(String::as_str), Some("Kitchen"));
        assert!(!found.contains(1));
        assert!(!found.contains(14));
        assert_eq!(found.lowest(), Some(2));
    }

    #[test]
    fn test_identification_is_idempotent() {
        let image = clustered_builder().build_image().unwrap();
        let config = MapperConfig::default();
        let first = identify_rooms(&image, &config);
        assert_eq!(first, identify_rooms(&image, &config));
    }

    #[test]
    fn test_low_property_children_join_container() {
        let mut builder = clustered_builder();
        // Sparse room: only one property, still a child of the container
        builder.add_object(ObjectSpec::new("Dark Place").parent(1).property(11, &[0]));
        let image = builder.build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert!(found.contains(16));
    }

    #[test]
    fn test_garbled_names_excluded() {
        let mut builder = clustered_builder();
        builder.add_object(room_spec("ab#/(", 1));
        let image = builder.build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert!(!found.contains(16));
        assert_eq!(found.len(), ROOM_NAMES.len());
    }

    #[test]
    fn test_tie_goes_to_first_parent() {
        let mut builder = StoryBuilder::new(3);
        builder.add_object(ObjectSpec::new("first"));
        builder.add_object(ObjectSpec::new("second"));
        builder.add_object(room_spec("Hall", 2));
        builder.add_object(room_spec("Study", 1));
        let image = builder.build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert_eq!(found.container, Some(2));
        assert!(found.used_fallback);
        assert_eq!(found.rooms.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_fallback_scans_from_conventional_offset() {
        let mut builder = StoryBuilder::new(3);
        builder.fill_objects_to(141);
        let lamp = ObjectSpec::new("lamp").parent(142);
        builder.set_object(5, lamp).unwrap();
        builder.add_object(ObjectSpec::new("Kitchen"));
        builder.add_object(ObjectSpec::new("Cellar"));
        builder.add_object(ObjectSpec::new("%$#@!&*"));
        builder.add_object(ObjectSpec::new("Attic"));
        let image = builder.build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert_eq!(found.container, None);
        assert!(found.used_fallback);
        assert_eq!(
            found.rooms.keys().copied().collect::<Vec<_>>(),
            vec![142, 143, 145]
        );
    }

    #[test]
    fn test_fallback_respects_config() {
        let mut builder = StoryBuilder::new(3);
        builder.fill_objects_to(20);
        let image = builder.build_image().unwrap();
        let config = MapperConfig {
            fallback_start: 10,
            fallback_end: 13,
            ..MapperConfig::default()
        };
        let found = identify_rooms(&image, &config);
        assert_eq!(
            found.rooms.keys().copied().collect::<Vec<_>>(),
            vec![10, 11, 12]
        );
        assert_eq!(found.rooms.get(&10).map(String::as_str), Some("thing 10"));
    }

    #[test]
    fn test_fallback_reaches_past_255_in_v5() {
        let mut builder = StoryBuilder::new(5);
        builder.fill_objects_to(141);
        for id in 142..=270 {
            builder.add_object(ObjectSpec::new(&format!("Room {}", id)));
        }
        let image = builder.build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert_eq!(found.container, None);
        assert!(found.used_fallback);
        assert_eq!(found.len(), 129);
        assert_eq!(found.rooms.keys().last(), Some(&270));
        assert_eq!(found.rooms.get(&256).map(String::as_str), Some("Room 256"));
    }

    #[test]
    fn test_fallback_stops_at_v3_limit() {
        let mut builder = StoryBuilder::new(3);
        builder.fill_objects_to(255);
        let image = builder.build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert_eq!(found.lowest(), Some(142));
        assert_eq!(found.rooms.keys().last(), Some(&254));
    }

    #[test]
    fn test_empty_object_table() {
        let image = StoryBuilder::new(3).build_image().unwrap();
        let found = identify_rooms(&image, &MapperConfig::default());
        assert!(found.is_empty());
        assert_eq!(found.container, None);
    }
}
