use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use indexmap::IndexMap;
use serde::Serialize;

use crate::classify::GameObject;
use crate::header::Header;
use crate::validate::ValidationReport;

/// A location and the exits recovered for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub id: u16,
    pub name: String,
    /// Exit label -> destination room, in discovery order
    pub exits: IndexMap<String, u16>,
    /// Names of portable objects found here at start of play
    pub objects: Vec<String>,
}

impl Room {
    pub fn new(id: u16, name: &str) -> Self {
        Room {
            id,
            name: name.to_string(),
            exits: IndexMap::new(),
            objects: Vec::new(),
        }
    }
}

/// Rooms keyed by object number. Exits only ever point at rooms in the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomGraph {
    rooms: BTreeMap<u16, Room>,
}

impl RoomGraph {
    pub fn from_rooms(rooms: &BTreeMap<u16, String>) -> Self {
        RoomGraph {
            rooms: rooms
                .iter()
                .map(|(&id, name)| (id, Room::new(id, name)))
                .collect(),
        }
    }

    pub fn contains(&self, id: u16) -> bool {
        self.rooms.contains_key(&id)
    }

    pub fn room(&self, id: u16) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn room_mut(&mut self, id: u16) -> Option<&mut Room> {
        self.rooms.get_mut(&id)
    }

    pub fn room_ids(&self) -> Vec<u16> {
        self.rooms.keys().copied().collect()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Record an exit. Refused when either end is not a room, for self
    /// loops, and when the label is already taken in `from`.
    pub fn add_exit(&mut self, from: u16, label: &str, to: u16) -> bool {
        if from == to || !self.rooms.contains_key(&to) {
            return false;
        }
        let Some(room) = self.rooms.get_mut(&from) else {
            return false;
        };
        if room.exits.contains_key(label) {
            return false;
        }
        room.exits.insert(label.to_string(), to);
        true
    }

    pub fn exit_count(&self) -> usize {
        self.rooms.values().map(|r| r.exits.len()).sum()
    }

    pub fn into_rooms(self) -> Vec<Room> {
        self.rooms.into_values().collect()
    }
}

/// Story identification carried into the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorySummary {
    pub version: u8,
    pub release: u16,
    pub serial: String,
}

impl From<&Header> for StorySummary {
    fn from(header: &Header) -> Self {
        StorySummary {
            version: header.version,
            release: header.release,
            serial: header.serial.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordHint {
    pub property: u8,
    pub word: String,
}

/// Everything recovered from one story file, ready for a renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapReport {
    pub story: StorySummary,
    pub container: Option<u16>,
    pub used_fallback: bool,
    pub exit_properties: Vec<u8>,
    pub word_hints: Vec<WordHint>,
    pub vocabulary: Vec<String>,
    pub rooms: Vec<Room>,
    pub objects: Vec<GameObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl MapReport {
    pub fn room(&self, id: u16) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn exit_count(&self) -> usize {
        self.rooms.iter().map(|r| r.exits.len()).sum()
    }

    /// Hint word for an exit property, if the dictionary supplied one
    pub fn hint(&self, property: u8) -> Option<&str> {
        self.word_hints
            .iter()
            .find(|h| h.property == property)
            .map(|h| h.word.as_str())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

impl Display for MapReport {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        writeln!(
            f,
            "Version {}, release {}, serial {}",
            self.story.version, self.story.release, self.story.serial
        )?;
        writeln!(
            f,
            "{} rooms, {} exits, {} portable objects",
            self.rooms.len(),
            self.exit_count(),
            self.objects.len()
        )?;
        write!(f, "Exit properties:")?;
        for prop in &self.exit_properties {
            match self.hint(*prop) {
                Some(word) => write!(f, " {} ({})", prop, word)?,
                None => write!(f, " {}", prop)?,
            }
        }
        writeln!(f)?;

        let names: BTreeMap<u16, &str> = self
            .rooms
            .iter()
            .map(|r| (r.id, r.name.as_str()))
            .collect();
        for room in &self.rooms {
            writeln!(f)?;
            writeln!(f, "[{}] {}", room.id, room.name)?;
            for (label, dest) in &room.exits {
                writeln!(
                    f,
                    "    {} -> {} [{}]",
                    label,
                    names.get(dest).copied().unwrap_or("?"),
                    dest
                )?;
            }
            if !room.objects.is_empty() {
                writeln!(f, "    objects: {}", room.objects.join(", "))?;
            }
        }

        if !self.objects.is_empty() {
            writeln!(f)?;
            writeln!(f, "Portable objects:")?;
            for obj in &self.objects {
                match obj.location {
                    Some(room) => writeln!(
                        f,
                        "    [{}] {} in {}",
                        obj.id,
                        obj.name,
                        names.get(&room).copied().unwrap_or("?")
                    )?,
                    None => writeln!(f, "    [{}] {} (parent {})", obj.id, obj.name, obj.parent)?,
                }
            }
        }

        if !self.vocabulary.is_empty() {
            writeln!(f)?;
            writeln!(f, "Vocabulary ({} words):", self.vocabulary.len())?;
            for chunk in self.vocabulary.chunks(8) {
                writeln!(f, "    {}", chunk.join(" "))?;
            }
        }

        if let Some(validation) = &self.validation {
            writeln!(f)?;
            write!(f, "{}", validation)?;
        }
        Ok(())
    }
}
