use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use crate::config::MapperConfig;
use crate::graph::RoomGraph;
use crate::objects::ObjectTable;
use crate::rooms::IdentifiedRooms;
use crate::story::StoryImage;

/// Property numbers whose values point at other rooms.
///
/// Low-numbered properties hold descriptions, synonyms and action routines,
/// so only numbers from `min_exit_property` up are considered. A property
/// counts once any room's value for it contains another room's number.
pub fn discover_exit_properties(
    image: &StoryImage,
    rooms: &IdentifiedRooms,
    config: &MapperConfig,
) -> BTreeSet<u8> {
    let table = ObjectTable::new(image);
    let mut exit_props = BTreeSet::new();

    for &room in rooms.rooms.keys() {
        for (prop_num, data) in table.properties(room).iter() {
            if prop_num < config.min_exit_property || exit_props.contains(&prop_num) {
                continue;
            }
            if let Some(&byte) = data
                .iter()
                .find(|&&b| b as u16 != room && rooms.contains(b as u16))
            {
                debug!(
                    "Property {} of room {} holds room {}: exit property",
                    prop_num, room, byte
                );
                exit_props.insert(prop_num);
            }
        }
    }

    if exit_props.is_empty() {
        warn!("No exit properties found");
    } else {
        info!("Exit properties: {:?}", exit_props);
    }
    exit_props
}

/// Keep only hints for properties that turned out to be exits
pub fn filter_hints(
    hints: &BTreeMap<u8, String>,
    exit_props: &BTreeSet<u8>,
) -> BTreeMap<u8, String> {
    hints
        .iter()
        .filter(|(prop, _)| exit_props.contains(prop))
        .map(|(&prop, word)| (prop, word.clone()))
        .collect()
}

/// Rooms other than `room` named by a property value.
///
/// A single byte is the destination itself. Longer values (exit tables that
/// also carry flags or a condition) are searched for distinct room numbers
/// in order.
pub fn room_references(data: &[u8], room: u16, graph: &RoomGraph) -> Vec<u16> {
    let is_other_room = |b: u8| b as u16 != room && graph.contains(b as u16);

    if let [only] = data {
        return if is_other_room(*only) {
            vec![*only as u16]
        } else {
            Vec::new()
        };
    }

    let mut refs: Vec<u16> = Vec::new();
    for &b in data {
        if is_other_room(b) && !refs.contains(&(b as u16)) {
            refs.push(b as u16);
        }
    }
    refs
}

/// Label for exits stored in `prop_num`
pub fn exit_label(prop_num: u8, hints: &BTreeMap<u8, String>) -> String {
    hints
        .get(&prop_num)
        .cloned()
        .unwrap_or_else(|| format!("p{}", prop_num))
}

/// Fill in each room's exits and return how many were added.
///
/// Each exit property gives at most one exit per room, labelled with the
/// property's hint word or `p<N>`. A label already used in the room wins
/// over later ones.
pub fn extract_exits(
    image: &StoryImage,
    graph: &mut RoomGraph,
    exit_props: &BTreeSet<u8>,
    hints: &BTreeMap<u8, String>,
) -> usize {
    if graph.is_empty() || exit_props.is_empty() {
        return 0;
    }
    let hints = filter_hints(hints, exit_props);
    let table = ObjectTable::new(image);
    let mut total = 0;

    for room in graph.room_ids() {
        let properties = table.properties(room);
        for &prop_num in exit_props {
            let Some(data) = properties.get(prop_num) else {
                continue;
            };
            let Some(&dest) = room_references(data, room, graph).first() else {
                continue;
            };
            let label = exit_label(prop_num, &hints);
            if graph.add_exit(room, &label, dest) {
                total += 1;
            } else {
                debug!(
                    "Room {}: label {:?} already used, dropping exit to {}",
                    room, label, dest
                );
            }
        }
    }

    let words: BTreeSet<&str> = graph
        .rooms()
        .flat_map(|r| r.exits.keys().map(String::as_str))
        .collect();
    info!("Extracted {} exits, labels {:?}", total, words);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ObjectSpec, StoryBuilder};
    use crate::dictionary::word_property_hints;
    use crate::rooms::identify_rooms;
    use test_log::test;

    struct Fixture {
        image: StoryImage,
        rooms: IdentifiedRooms,
        config: MapperConfig,
    }

    impl Fixture {
        fn new(builder: StoryBuilder) -> Self {
            let image = builder.build_image().unwrap();
            let config = MapperConfig::default();
            let rooms = identify_rooms(&image, &config);
            Fixture {
                image,
                rooms,
                config,
            }
        }

        fn run(&self) -> (BTreeSet<u8>, RoomGraph) {
            let props = discover_exit_properties(&self.image, &self.rooms, &self.config);
            let hints = word_property_hints(&self.image, &self.config);
            let mut graph = RoomGraph::from_rooms(&self.rooms.rooms);
            extract_exits(&self.image, &mut graph, &props, &hints);
            (props, graph)
        }
    }

    /// Rooms from 142 on, found by the fallback scan
    fn fallback_builder(rooms: Vec<ObjectSpec>) -> StoryBuilder {
        let mut builder = StoryBuilder::new(3);
        builder.fill_objects_to(141);
        for room in rooms {
            builder.add_object(room);
        }
        builder
    }

    #[test]
    fn test_low_properties_never_exits() {
        let fixture = Fixture::new(fallback_builder(vec![
            ObjectSpec::new("Kitchen")
                .property(12, &[143])
                .property(4, &[143]),
            ObjectSpec::new("Cellar").property(13, &[142]),
        ]));
        let (props, graph) = fixture.run();
        assert_eq!(props.into_iter().collect::<Vec<_>>(), vec![13]);
        assert!(graph.room(142).unwrap().exits.is_empty());
        assert_eq!(graph.room(143).unwrap().exits.get("p13"), Some(&142));
    }

    #[test]
    fn test_self_reference_is_not_an_exit() {
        let fixture = Fixture::new(fallback_builder(vec![
            ObjectSpec::new("Kitchen").property(20, &[142]),
            ObjectSpec::new("Cellar").property(21, &[143, 142]),
        ]));
        let (props, graph) = fixture.run();
        assert_eq!(props.into_iter().collect::<Vec<_>>(), vec![21]);
        assert_eq!(graph.room(143).unwrap().exits.get("p21"), Some(&142));
        assert_eq!(graph.exit_count(), 1);
    }

    #[test]
    fn test_dictionary_label() {
        let mut builder = fallback_builder(vec![
            ObjectSpec::new("Kitchen").property(15, &[143]),
            ObjectSpec::new("Cellar"),
        ]);
        builder.add_word("down", &[0x40, 15, 0]);
        builder.add_word("north", &[0x40, 31, 0]);
        let (props, graph) = Fixture::new(builder).run();
        assert!(props.contains(&15));
        let kitchen = graph.room(142).unwrap();
        assert_eq!(kitchen.exits.len(), 1);
        assert_eq!(kitchen.exits.get("down"), Some(&143));
    }

    #[test]
    fn test_short_entries_give_synthetic_label() {
        let mut builder = fallback_builder(vec![
            ObjectSpec::new("Kitchen").property(15, &[143]),
            ObjectSpec::new("Cellar"),
        ]);
        builder.set_entry_length(4);
        builder.add_word("down", &[]);
        let (_, graph) = Fixture::new(builder).run();
        assert_eq!(graph.room(142).unwrap().exits.get("p15"), Some(&143));
    }

    #[test]
    fn test_multi_byte_value_first_room_wins() {
        let fixture = Fixture::new(fallback_builder(vec![
            ObjectSpec::new("Kitchen").property(22, &[0x00, 144, 143, 144]),
            ObjectSpec::new("Cellar"),
            ObjectSpec::new("Attic"),
        ]));
        let (_, graph) = fixture.run();
        let kitchen = graph.room(142).unwrap();
        assert_eq!(kitchen.exits.len(), 1);
        assert_eq!(kitchen.exits.get("p22"), Some(&144));
    }

    #[test]
    fn test_label_collision_drops_later_exit() {
        let mut builder = fallback_builder(vec![
            ObjectSpec::new("Kitchen")
                .property(15, &[143])
                .property(16, &[144]),
            ObjectSpec::new("Cellar"),
            ObjectSpec::new("Attic"),
        ]);
        // Both properties hint at the same word
        builder.add_word("down", &[15, 16, 0]);
        let (props, graph) = Fixture::new(builder).run();
        assert_eq!(props.len(), 2);
        let kitchen = graph.room(142).unwrap();
        assert_eq!(kitchen.exits.len(), 1);
        assert_eq!(kitchen.exits.get("down"), Some(&143));
    }

    #[test]
    fn test_room_references() {
        let mut names = BTreeMap::new();
        for (id, name) in [(10, "a"), (11, "b"), (12, "c")] {
            names.insert(id, name.to_string());
        }
        let graph = RoomGraph::from_rooms(&names);
        assert_eq!(room_references(&[11], 10, &graph), vec![11]);
        assert!(room_references(&[10], 10, &graph).is_empty());
        assert!(room_references(&[99], 10, &graph).is_empty());
        assert_eq!(room_references(&[12, 10, 11, 12], 10, &graph), vec![12, 11]);
    }

    #[test]
    fn test_filter_hints() {
        let mut hints = BTreeMap::new();
        hints.insert(3, "take".to_string());
        hints.insert(15, "down".to_string());
        let props: BTreeSet<u8> = [15, 20].into_iter().collect();
        let filtered = filter_hints(&hints, &props);
        assert_eq!(filtered.len(), 1);
        assert_eq!(exit_label(15, &filtered), "down");
        assert_eq!(exit_label(20, &filtered), "p20");
    }
}
