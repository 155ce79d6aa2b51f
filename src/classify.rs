use log::{debug, info, trace};
use serde::Serialize;

use crate::config::MapperConfig;
use crate::graph::RoomGraph;
use crate::objects::ObjectTable;
use crate::rooms::IdentifiedRooms;
use crate::story::StoryImage;
use crate::text;

/// A portable object found below the room range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameObject {
    pub id: u16,
    pub name: String,
    /// Parent at the start of play
    pub parent: u16,
    /// The parent when that parent is a room
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<u16>,
}

/// Find portable objects.
///
/// Items are numbered before rooms in the stories this targets, so only
/// objects below the lowest room number are considered. Anything carrying a
/// value, trophy value or capacity property can be picked up or holds things.
pub fn classify_objects(
    image: &StoryImage,
    rooms: &IdentifiedRooms,
    config: &MapperConfig,
) -> Vec<GameObject> {
    let Some(lowest_room) = rooms.lowest() else {
        debug!("No rooms, so no object range to classify");
        return Vec::new();
    };
    let table = ObjectTable::new(image);
    let mut objects = Vec::new();

    for obj_num in 1..lowest_room {
        let obj = match table.object(obj_num) {
            Ok(obj) => obj,
            Err(e) => {
                debug!("Stopping object scan: {}", e);
                break;
            }
        };
        trace!("{}", obj);
        let name = match table.object_name(obj_num) {
            Ok(name) if text::is_valid_name(&name, config.name_validity_threshold) => name,
            _ => continue,
        };

        let properties = table.properties(obj_num);
        let portable = config
            .portable_properties
            .iter()
            .any(|&prop| properties.contains(prop));
        if !portable {
            continue;
        }

        let location = rooms.contains(obj.parent).then_some(obj.parent);
        debug!(
            "Portable object {} {:?} (parent {}, room {:?})",
            obj_num, name, obj.parent, location
        );
        objects.push(GameObject {
            id: obj_num,
            name,
            parent: obj.parent,
            location,
        });
    }

    info!("Classified {} portable objects", objects.len());
    objects
}

/// List each located object by name under its room
pub fn associate_objects(graph: &mut RoomGraph, objects: &[GameObject]) {
    for obj in objects {
        if let Some(room) = obj.location.and_then(|id| graph.room_mut(id)) {
            room.objects.push(obj.name.clone());
        }
    }
}
