use log::{debug, info, warn};

use crate::classify::{associate_objects, classify_objects};
use crate::config::MapperConfig;
use crate::dictionary::Dictionary;
use crate::exits::{discover_exit_properties, extract_exits, filter_hints};
use crate::graph::{MapReport, RoomGraph, StorySummary, WordHint};
use crate::rooms::identify_rooms;
use crate::story::StoryImage;
use crate::validate::GraphValidator;

/// Recover the room map of a story.
///
/// Stages run in order, each handed the results of the ones before it.
/// Nothing here fails: a story with no recognisable rooms or exits produces
/// an emptier report.
pub fn extract_map(image: &StoryImage, config: &MapperConfig) -> MapReport {
    run(image, config, None)
}

/// As [`extract_map`], then let `validator` check the finished graph
pub fn extract_map_validated(
    image: &StoryImage,
    config: &MapperConfig,
    validator: &dyn GraphValidator,
) -> MapReport {
    run(image, config, Some(validator))
}

fn run(
    image: &StoryImage,
    config: &MapperConfig,
    validator: Option<&dyn GraphValidator>,
) -> MapReport {
    info!(
        "Mapping story version {}, release {}, serial {}",
        image.header.version, image.header.release, image.header.serial
    );

    let rooms = identify_rooms(image, config);
    let objects = classify_objects(image, &rooms, config);
    let exit_props = discover_exit_properties(image, &rooms, config);

    let dictionary = match Dictionary::new(image) {
        Ok(dictionary) => {
            debug!("{}", dictionary);
            Some(dictionary)
        }
        Err(e) => {
            warn!("Cannot read dictionary: {}", e);
            None
        }
    };
    let hints = dictionary
        .as_ref()
        .map(|d| d.word_property_hints(image, config))
        .unwrap_or_default();
    let hints = filter_hints(&hints, &exit_props);
    if !exit_props.is_empty() && hints.is_empty() {
        info!("No dictionary words for exit properties, using p<N> labels");
    }

    let mut graph = RoomGraph::from_rooms(&rooms.rooms);
    extract_exits(image, &mut graph, &exit_props, &hints);
    associate_objects(&mut graph, &objects);

    let vocabulary = dictionary
        .as_ref()
        .map(|d| d.words(image))
        .unwrap_or_default();

    let validation = validator.map(|v| v.validate(image, &graph));

    info!(
        "Found {} rooms, {} exits and {} objects",
        graph.len(),
        graph.exit_count(),
        objects.len()
    );

    MapReport {
        story: StorySummary::from(&image.header),
        container: rooms.container,
        used_fallback: rooms.used_fallback,
        exit_properties: exit_props.into_iter().collect(),
        word_hints: hints
            .into_iter()
            .map(|(property, word)| WordHint { property, word })
            .collect(),
        vocabulary,
        rooms: graph.into_rooms(),
        objects,
        validation,
    }
}
