use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use log::{debug, info, trace};
use serde::Serialize;

use crate::config::MapperConfig;
use crate::graph::RoomGraph;
use crate::instruction::OperandType;
use crate::objects::ObjectTable;
use crate::story::StoryImage;

/// Property holding a room's action routine
pub const ACTION_PROPERTY: u8 = 1;

/// A second opinion on a recovered room graph. Validators report; they never
/// change the graph.
pub trait GraphValidator {
    fn name(&self) -> &'static str;
    fn validate(&self, image: &StoryImage, graph: &RoomGraph) -> ValidationReport;
}

/// What a validator found for one room
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomCheck {
    pub room: u16,
    /// Other rooms named as constants in the room's routine, in order
    pub referenced: Vec<u16>,
    /// Labels of extracted exits whose destination is referenced
    pub corroborated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub validator: String,
    pub rooms: Vec<RoomCheck>,
}

impl ValidationReport {
    pub fn room(&self, id: u16) -> Option<&RoomCheck> {
        self.rooms.iter().find(|c| c.room == id)
    }

    pub fn corroborated_count(&self) -> usize {
        self.rooms.iter().map(|c| c.corroborated.len()).sum()
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        writeln!(
            f,
            "{}: {} rooms with routines, {} exits corroborated",
            self.validator,
            self.rooms.len(),
            self.corroborated_count()
        )?;
        for check in &self.rooms {
            write!(f, "    [{}] references", check.room)?;
            for r in &check.referenced {
                write!(f, " {}", r)?;
            }
            if !check.corroborated.is_empty() {
                write!(f, "; confirms {}", check.corroborated.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Looks for room numbers among the constant operands of each room's action
/// routine. Only the first `instruction_limit` instructions are decoded and
/// no control flow is followed.
pub struct RoutineReferenceValidator {
    instruction_limit: usize,
}

impl RoutineReferenceValidator {
    pub fn new(config: &MapperConfig) -> Self {
        RoutineReferenceValidator {
            instruction_limit: config.validator_instruction_limit,
        }
    }

    /// Byte address of the first instruction of `room`'s action routine
    fn routine_start(&self, image: &StoryImage, table: &ObjectTable, room: u16) -> Option<usize> {
        let properties = table.properties(room);
        let data = properties.get(ACTION_PROPERTY)?;
        if data.len() < 2 {
            return None;
        }
        let packed = u16::from_be_bytes([data[0], data[1]]);
        if packed == 0 {
            return None;
        }
        let addr = image.unpack_routine_address(packed);
        let num_locals = image.read_byte(addr).ok()? as usize;
        // Initial values for locals are only stored before V5
        let header_len = if image.version() <= 4 {
            1 + num_locals * 2
        } else {
            1
        };
        Some(addr + header_len)
    }

    fn referenced_rooms(
        &self,
        image: &StoryImage,
        graph: &RoomGraph,
        room: u16,
        start: usize,
    ) -> Vec<u16> {
        let mut refs = Vec::new();
        let mut pc = start;
        for _ in 0..self.instruction_limit {
            if pc >= image.len() {
                break;
            }
            let inst = match image.decode_instruction(pc) {
                Ok(inst) => inst,
                Err(e) => {
                    debug!("Room {} routine: {}", room, e);
                    break;
                }
            };
            trace!("{:05x}: {}", pc, inst.format_with_version(image.version()));
            for (op_type, &value) in inst.operand_types.iter().zip(&inst.operands) {
                if *op_type == OperandType::Variable {
                    continue;
                }
                if value != room && graph.contains(value) && !refs.contains(&value) {
                    refs.push(value);
                }
            }
            pc += inst.size;
        }
        refs
    }
}

impl GraphValidator for RoutineReferenceValidator {
    fn name(&self) -> &'static str {
        "routine references"
    }

    fn validate(&self, image: &StoryImage, graph: &RoomGraph) -> ValidationReport {
        let table = ObjectTable::new(image);
        let mut rooms = Vec::new();

        for room in graph.rooms() {
            let Some(start) = self.routine_start(image, &table, room.id) else {
                continue;
            };
            let referenced = self.referenced_rooms(image, graph, room.id, start);
            let corroborated = room
                .exits
                .iter()
                .filter(|(_, dest)| referenced.contains(dest))
                .map(|(label, _)| label.clone())
                .collect();
            rooms.push(RoomCheck {
                room: room.id,
                referenced,
                corroborated,
            });
        }

        let report = ValidationReport {
            validator: self.name().to_string(),
            rooms,
        };
        info!(
            "Validated {} room routines, {} exits corroborated",
            report.rooms.len(),
            report.corroborated_count()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ObjectSpec, StoryBuilder};
    use test_log::test;

    // insert_obj #7 #143; je V8f #144 ?~rfalse; rtrue
    const KITCHEN_CODE: &[u8] = &[0x0E, 0x07, 0x8F, 0x41, 0x8F, 0x90, 0x40, 0xB0];

    fn graph_for(image: &StoryImage) -> RoomGraph {
        let config = MapperConfig::default();
        let rooms = crate::rooms::identify_rooms(image, &config);
        let mut graph = RoomGraph::from_rooms(&rooms.rooms);
        graph.add_exit(142, "down", 143);
        graph.add_exit(142, "west", 145);
        graph
    }

    fn image_with_routine(version: u8) -> StoryImage {
        let mut builder = StoryBuilder::new(version);
        builder.fill_objects_to(141);
        let packed = builder.add_routine(2, KITCHEN_CODE).unwrap();
        builder.add_object(
            ObjectSpec::new("Kitchen")
                .property(1, &packed.to_be_bytes())
                .property(15, &[143]),
        );
        builder.add_object(ObjectSpec::new("Cellar"));
        builder.add_object(ObjectSpec::new("Attic"));
        builder.add_object(ObjectSpec::new("Garden").property(1, &[0, 0]));
        builder.build_image().unwrap()
    }

    #[test]
    fn test_routine_references_v3() {
        let image = image_with_routine(3);
        let graph = graph_for(&image);
        let validator = RoutineReferenceValidator::new(&MapperConfig::default());
        let report = validator.validate(&image, &graph);
        assert_eq!(report.rooms.len(), 1);
        let kitchen = report.room(142).unwrap();
        // 143 as a variable number is ignored
        assert_eq!(kitchen.referenced, vec![143, 144]);
        assert_eq!(kitchen.corroborated, vec!["down"]);
        assert_eq!(report.corroborated_count(), 1);
    }

    #[test]
    fn test_routine_references_v5() {
        let image = image_with_routine(5);
        let graph = graph_for(&image);
        let validator = RoutineReferenceValidator::new(&MapperConfig::default());
        let report = validator.validate(&image, &graph);
        assert_eq!(report.room(142).unwrap().referenced, vec![143, 144]);
    }

    #[test]
    fn test_instruction_limit() {
        let image = image_with_routine(3);
        let graph = graph_for(&image);
        let config = MapperConfig {
            validator_instruction_limit: 1,
            ..MapperConfig::default()
        };
        let report = RoutineReferenceValidator::new(&config).validate(&image, &graph);
        assert_eq!(report.room(142).unwrap().referenced, vec![143]);
    }

    #[test]
    fn test_validation_leaves_graph_alone() {
        let image = image_with_routine(3);
        let graph = graph_for(&image);
        let before = graph.clone();
        let validator = RoutineReferenceValidator::new(&MapperConfig::default());
        let report = validator.validate(&image, &graph);
        assert_eq!(graph, before);
        let text = report.to_string();
        assert!(text.contains("[142] references 143 144; confirms down"));
    }
}
