/// Object and property table access, version aware
///
/// V1-3 object format:
/// - at most 255 objects, 9-byte entries
/// - 32 attributes, 31 default properties, property numbers 1-31
/// - one size byte per property: number in the bottom 5 bits, size - 1 in the top 3
///
/// V4+ object format:
/// - up to 65535 objects, 14-byte entries
/// - 48 attributes, 63 default properties, property numbers 1-63
/// - one or two size bytes per property, data up to 64 bytes
use std::fmt::{Display, Error, Formatter};

use bitvec::prelude::*;
use indexmap::IndexMap;
use log::{debug, trace};

use crate::error::{StoryError, StoryResult};
use crate::story::StoryImage;
use crate::text;

pub const MAX_OBJECTS_V3: u16 = 255;
pub const MAX_OBJECTS_V4: u16 = 65535;

/// Property record encoding, selected by story version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyEncoding {
    /// Versions 1-3
    Legacy,
    /// Versions 4 and later
    Extended,
}

impl PropertyEncoding {
    pub fn for_version(version: u8) -> Self {
        if version <= 3 {
            PropertyEncoding::Legacy
        } else {
            PropertyEncoding::Extended
        }
    }

    pub fn max_property(&self) -> u8 {
        match self {
            PropertyEncoding::Legacy => 31,
            PropertyEncoding::Extended => 63,
        }
    }

    pub fn max_property_size(&self) -> usize {
        match self {
            PropertyEncoding::Legacy => 8,
            PropertyEncoding::Extended => 64,
        }
    }

    pub fn attribute_bytes(&self) -> usize {
        match self {
            PropertyEncoding::Legacy => 4,
            PropertyEncoding::Extended => 6,
        }
    }

    pub fn entry_size(&self) -> usize {
        match self {
            PropertyEncoding::Legacy => 9,
            PropertyEncoding::Extended => 14,
        }
    }

    pub fn max_objects(&self) -> u16 {
        match self {
            PropertyEncoding::Legacy => MAX_OBJECTS_V3,
            PropertyEncoding::Extended => MAX_OBJECTS_V4,
        }
    }

    /// Size of the property defaults table that precedes the object entries
    pub fn defaults_size(&self) -> usize {
        self.max_property() as usize * 2
    }
}

/// A decoded size/number header of one property record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyHeader {
    pub number: u8,
    pub size: usize,
    pub header_len: usize,
}

/// Decode the property header at `addr`.
/// Returns None at the terminating zero byte or when the header runs off the end.
pub fn decode_property_header(
    bytes: &[u8],
    addr: usize,
    encoding: PropertyEncoding,
) -> Option<PropertyHeader> {
    let size_byte = *bytes.get(addr)?;
    if size_byte == 0 {
        return None;
    }
    match encoding {
        PropertyEncoding::Legacy => Some(PropertyHeader {
            number: size_byte & 0x1F,
            size: ((size_byte >> 5) & 0x07) as usize + 1,
            header_len: 1,
        }),
        PropertyEncoding::Extended => {
            let number = size_byte & 0x3F;
            if size_byte & 0x80 != 0 {
                // 12.4.2.1.1: a length of 0 in the second byte means 64
                let size = match bytes.get(addr + 1)? & 0x3F {
                    0 => 64,
                    n => n as usize,
                };
                Some(PropertyHeader {
                    number,
                    size,
                    header_len: 2,
                })
            } else {
                Some(PropertyHeader {
                    number,
                    size: if size_byte & 0x40 != 0 { 2 } else { 1 },
                    header_len: 1,
                })
            }
        }
    }
}

/// Property number -> raw bytes, in the order the records appear in the story
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTable {
    entries: IndexMap<u8, Vec<u8>>,
}

impl PropertyTable {
    pub fn new() -> Self {
        PropertyTable::default()
    }

    /// Decode property records starting at `start` (just past the short name).
    ///
    /// Never reads outside `bytes`: a header or data block that would run past
    /// the end terminates the table.
    pub fn decode(bytes: &[u8], start: usize, encoding: PropertyEncoding) -> PropertyTable {
        let mut table = PropertyTable::new();
        let mut addr = start;

        while let Some(header) = decode_property_header(bytes, addr, encoding) {
            if header.number == 0 {
                // A non-zero size byte with property number 0 is illegal
                debug!("Property number 0 at {:#06x}, ending table", addr);
                break;
            }
            let data_start = addr + header.header_len;
            let Some(data) = bytes.get(data_start..data_start + header.size) else {
                debug!(
                    "Property {} at {:#06x} runs past end of image",
                    header.number, addr
                );
                break;
            };
            trace!(
                "Property {} at {:#06x}: {} bytes",
                header.number, addr, header.size
            );
            table
                .entries
                .entry(header.number)
                .or_insert_with(|| data.to_vec());
            addr = data_start + header.size;
        }

        table
    }

    /// Encode the records (followed by the terminating zero byte)
    pub fn encode(&self, encoding: PropertyEncoding) -> StoryResult<Vec<u8>> {
        let mut bytes = Vec::new();
        for (&number, data) in &self.entries {
            if number == 0 || number > encoding.max_property() {
                return Err(StoryError::InvalidProperty(
                    number,
                    format!("number out of range for {:?} encoding", encoding),
                ));
            }
            if data.is_empty() || data.len() > encoding.max_property_size() {
                return Err(StoryError::InvalidProperty(
                    number,
                    format!("{} bytes is not a valid size", data.len()),
                ));
            }
            match encoding {
                PropertyEncoding::Legacy => {
                    bytes.push((((data.len() - 1) as u8) << 5) | number);
                }
                PropertyEncoding::Extended => match data.len() {
                    1 => bytes.push(number),
                    2 => bytes.push(0x40 | number),
                    n => {
                        bytes.push(0x80 | number);
                        bytes.push(0x80 | (n as u8 & 0x3F));
                    }
                },
            }
            bytes.extend_from_slice(data);
        }
        bytes.push(0);
        Ok(bytes)
    }

    /// Insert a record; an existing number keeps its first value
    pub fn insert(&mut self, number: u8, data: Vec<u8>) -> bool {
        if self.entries.contains_key(&number) {
            return false;
        }
        self.entries.insert(number, data);
        true
    }

    pub fn get(&self, number: u8) -> Option<&[u8]> {
        self.entries.get(&number).map(|v| v.as_slice())
    }

    pub fn contains(&self, number: u8) -> bool {
        self.entries.contains_key(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.entries.iter().map(|(&n, v)| (n, v.as_slice()))
    }
}

impl FromIterator<(u8, Vec<u8>)> for PropertyTable {
    fn from_iter<I: IntoIterator<Item = (u8, Vec<u8>)>>(iter: I) -> Self {
        let mut table = PropertyTable::new();
        for (number, data) in iter {
            table.insert(number, data);
        }
        table
    }
}

/// One entry of the object table
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub id: u16,
    pub parent: u16,
    pub sibling: u16,
    pub child: u16,
    pub attributes: BitVec<u8, Msb0>,
    pub property_addr: usize,
}

impl ObjectRecord {
    pub fn attribute(&self, attr_num: u16) -> bool {
        self.attributes
            .get(attr_num as usize)
            .map(|bit| *bit)
            .unwrap_or(false)
    }

    pub fn attribute_numbers(&self) -> Vec<usize> {
        self.attributes.iter_ones().collect()
    }

    pub fn relationships(&self) -> (u16, u16, u16) {
        (self.parent, self.sibling, self.child)
    }
}

impl Display for ObjectRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "Object {}: attributes {:?}, parent {}, sibling {}, child {}, properties at {:#06x}",
            self.id,
            self.attribute_numbers(),
            self.parent,
            self.sibling,
            self.child,
            self.property_addr
        )
    }
}

/// Read-only view of a story's object table
pub struct ObjectTable<'a> {
    image: &'a StoryImage,
    encoding: PropertyEncoding,
    tree_base: usize,
    count: u16,
}

impl<'a> ObjectTable<'a> {
    pub fn new(image: &'a StoryImage) -> Self {
        let encoding = PropertyEncoding::for_version(image.version());
        let tree_base = image.header.property_defaults() + encoding.defaults_size();
        let count = estimate_object_count(image, encoding, tree_base);
        debug!(
            "Object table at {:#06x}: {} objects ({:?} encoding)",
            tree_base, count, encoding
        );
        ObjectTable {
            image,
            encoding,
            tree_base,
            count,
        }
    }

    pub fn encoding(&self) -> PropertyEncoding {
        self.encoding
    }

    /// Number of objects, assuming entries end where the first property table begins
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn object_addr(&self, obj_num: u16) -> StoryResult<usize> {
        if obj_num == 0 || obj_num > self.count {
            return Err(StoryError::InvalidObject(
                obj_num,
                format!("outside object table (1..={})", self.count),
            ));
        }
        Ok(self.tree_base + (obj_num - 1) as usize * self.encoding.entry_size())
    }

    pub fn object(&self, obj_num: u16) -> StoryResult<ObjectRecord> {
        let addr = self.object_addr(obj_num)?;
        let entry = self.image.read_slice(addr, self.encoding.entry_size())?;
        let attr_len = self.encoding.attribute_bytes();
        let attributes = BitVec::<u8, Msb0>::from_slice(&entry[..attr_len]);

        let (parent, sibling, child) = match self.encoding {
            PropertyEncoding::Legacy => (entry[4] as u16, entry[5] as u16, entry[6] as u16),
            PropertyEncoding::Extended => (
                u16::from_be_bytes([entry[6], entry[7]]),
                u16::from_be_bytes([entry[8], entry[9]]),
                u16::from_be_bytes([entry[10], entry[11]]),
            ),
        };
        let prop_offset = self.encoding.entry_size() - 2;
        let property_addr =
            u16::from_be_bytes([entry[prop_offset], entry[prop_offset + 1]]) as usize;

        Ok(ObjectRecord {
            id: obj_num,
            parent,
            sibling,
            child,
            attributes,
            property_addr,
        })
    }

    /// Decode the object's short name
    pub fn object_name(&self, obj_num: u16) -> StoryResult<String> {
        let obj = self.object(obj_num)?;
        let text_len = self.image.read_byte(obj.property_addr)? as usize;
        if text_len == 0 {
            return Ok(String::new());
        }
        let (name, _) = text::decode_string_limited(
            self.image.bytes(),
            obj.property_addr + 1,
            text_len * 2,
            self.image.header.abbrev_table as usize,
        )?;
        Ok(name)
    }

    /// All properties of an object. Unreadable objects have an empty table.
    pub fn properties(&self, obj_num: u16) -> PropertyTable {
        let obj = match self.object(obj_num) {
            Ok(obj) => obj,
            Err(e) => {
                debug!("No properties for object {}: {}", obj_num, e);
                return PropertyTable::new();
            }
        };
        let Ok(text_len) = self.image.read_byte(obj.property_addr) else {
            debug!(
                "Property address {:#06x} of object {} is outside the image",
                obj.property_addr, obj_num
            );
            return PropertyTable::new();
        };
        let start = obj.property_addr + 1 + text_len as usize * 2;
        PropertyTable::decode(self.image.bytes(), start, self.encoding)
    }

    pub fn has_property(&self, obj_num: u16, prop_num: u8) -> bool {
        self.properties(obj_num).contains(prop_num)
    }

    /// Attribute test; unreadable objects and out-of-range attributes read as unset
    pub fn attribute(&self, obj_num: u16, attr_num: u16) -> bool {
        self.object(obj_num)
            .map(|obj| obj.attribute(attr_num))
            .unwrap_or(false)
    }

    pub fn relationships(&self, obj_num: u16) -> StoryResult<(u16, u16, u16)> {
        Ok(self.object(obj_num)?.relationships())
    }
}

/// The largest valid object number is not stored anywhere. Like Infodump, assume
/// the entries end where the lowest property table seen so far begins.
fn estimate_object_count(image: &StoryImage, encoding: PropertyEncoding, tree_base: usize) -> u16 {
    let entry_size = encoding.entry_size();
    let mut lowest_table = image.len();
    let mut count: u16 = 0;

    while count < encoding.max_objects() {
        let addr = tree_base + count as usize * entry_size;
        if addr + entry_size > lowest_table {
            break;
        }
        let Ok(prop_addr) = image.read_word(addr + entry_size - 2) else {
            break;
        };
        let prop_addr = prop_addr as usize;
        if prop_addr < addr + entry_size {
            // Points back into the object table: not an object entry
            break;
        }
        lowest_table = lowest_table.min(prop_addr);
        count += 1;
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ObjectSpec, StoryBuilder};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use test_log::test;

    fn sample_image(version: u8) -> StoryImage {
        let mut builder = StoryBuilder::new(version);
        builder.add_object(
            ObjectSpec::new("brass lantern")
                .property(5, &[0x00, 0x0A])
                .property(18, &[0x12, 0x34, 0x56])
                .attribute(2)
                .attribute(31),
        );
        builder.add_object(ObjectSpec::new("Kitchen").parent(3).sibling(1).child(4));
        builder.add_object(ObjectSpec::new("Rooms"));
        builder.add_object(ObjectSpec::new("sack").parent(2).property(9, &[8]));
        builder.build_image().unwrap()
    }

    #[test]
    fn test_object_count_and_names() {
        for version in [3, 5] {
            let image = sample_image(version);
            let table = ObjectTable::new(&image);
            assert_eq!(table.count(), 4);
            assert_eq!(table.object_name(1).unwrap(), "brass lantern");
            assert_eq!(table.object_name(2).unwrap(), "Kitchen");
            assert!(table.object(0).is_err());
            assert!(table.object(5).is_err());
        }
    }

    #[test]
    fn test_relationships_and_attributes() {
        let image = sample_image(3);
        let table = ObjectTable::new(&image);
        assert_eq!(table.relationships(2).unwrap(), (3, 1, 4));
        assert_eq!(table.relationships(4).unwrap(), (2, 0, 0));
        assert!(table.attribute(1, 2));
        assert!(table.attribute(1, 31));
        assert!(!table.attribute(1, 3));
        // Out of range for V3 attributes
        assert!(!table.attribute(1, 40));
        assert!(!table.attribute(99, 2));
        assert_eq!(table.object(1).unwrap().attribute_numbers(), vec![2, 31]);
    }

    #[test]
    fn test_object_record_summary() {
        let image = sample_image(3);
        let table = ObjectTable::new(&image);
        let lantern = table.object(1).unwrap().to_string();
        assert!(lantern.starts_with("Object 1: attributes [2, 31], parent 0"));
        let kitchen = table.object(2).unwrap().to_string();
        assert!(kitchen.starts_with("Object 2: attributes [], parent 3, sibling 1, child 4"));
    }

    #[test]
    fn test_properties_decoded_in_story_order() {
        for version in [3, 4] {
            let image = sample_image(version);
            let table = ObjectTable::new(&image);
            let props = table.properties(1);
            let numbers: Vec<u8> = props.iter().map(|(n, _)| n).collect();
            // Stored in descending order
            assert_eq!(numbers, vec![18, 5]);
            assert_eq!(props.get(5), Some(&[0x00, 0x0A][..]));
            assert_eq!(props.get(18), Some(&[0x12, 0x34, 0x56][..]));
            assert!(table.has_property(4, 9));
            assert!(!table.has_property(4, 5));
            assert!(table.properties(3).is_empty());
        }
    }

    #[test]
    fn test_extended_encoding_long_property() {
        let mut builder = StoryBuilder::new(5);
        let data: Vec<u8> = (1..=64).collect();
        builder.add_object(
            ObjectSpec::new("table")
                .property(40, &data)
                .property(2, &[7]),
        );
        let image = builder.build_image().unwrap();
        let table = ObjectTable::new(&image);
        let props = table.properties(1);
        assert_eq!(props.get(40).map(|d| d.len()), Some(64));
        assert_eq!(props.get(2), Some(&[7][..]));
    }

    #[test]
    fn test_property_address_outside_image_is_empty() {
        let image = sample_image(3);
        let table = ObjectTable::new(&image);
        let entry = table.object_addr(4).unwrap();
        let mut bytes = image.bytes().to_vec();
        bytes[entry + 7] = 0xFF;
        bytes[entry + 8] = 0xF0;
        let broken = StoryImage::from_memory(bytes).unwrap();
        let table = ObjectTable::new(&broken);
        assert!(table.properties(4).is_empty());
        assert!(!table.has_property(4, 9));
        assert!(table.object_name(4).is_err());
    }

    #[test]
    fn test_decode_extended_headers() {
        let bytes = [0x05, 0x41, 0x93, 0x80, 0x00];
        assert_eq!(
            decode_property_header(&bytes, 0, PropertyEncoding::Extended),
            Some(PropertyHeader { number: 5, size: 1, header_len: 1 })
        );
        assert_eq!(
            decode_property_header(&bytes, 1, PropertyEncoding::Extended),
            Some(PropertyHeader { number: 1, size: 2, header_len: 1 })
        );
        // Second size byte of 0x80 means 64
        assert_eq!(
            decode_property_header(&bytes, 2, PropertyEncoding::Extended),
            Some(PropertyHeader { number: 19, size: 64, header_len: 2 })
        );
        assert_eq!(
            decode_property_header(&bytes, 4, PropertyEncoding::Extended),
            None
        );
        assert_eq!(
            decode_property_header(&bytes, 9, PropertyEncoding::Legacy),
            None
        );
    }

    #[test]
    fn test_round_trip_both_encodings() {
        let legacy: PropertyTable = vec![
            (31, vec![1, 2, 3, 4, 5, 6, 7, 8]),
            (17, vec![143]),
            (4, vec![0xAB, 0xCD]),
        ]
        .into_iter()
        .collect();
        let bytes = legacy.encode(PropertyEncoding::Legacy).unwrap();
        assert_eq!(
            PropertyTable::decode(&bytes, 0, PropertyEncoding::Legacy),
            legacy
        );

        let extended: PropertyTable = vec![
            (63, (0..64).collect::<Vec<u8>>()),
            (40, vec![1, 2, 3]),
            (12, vec![9, 9]),
            (1, vec![42]),
        ]
        .into_iter()
        .collect();
        let bytes = extended.encode(PropertyEncoding::Extended).unwrap();
        assert_eq!(
            PropertyTable::decode(&bytes, 0, PropertyEncoding::Extended),
            extended
        );
    }

    #[test]
    fn test_encode_rejects_invalid_records() {
        let too_long: PropertyTable = vec![(3, vec![0; 9])].into_iter().collect();
        assert!(too_long.encode(PropertyEncoding::Legacy).is_err());
        assert!(too_long.encode(PropertyEncoding::Extended).is_ok());

        let bad_number: PropertyTable = vec![(40, vec![1])].into_iter().collect();
        assert!(bad_number.encode(PropertyEncoding::Legacy).is_err());
    }

    #[test]
    fn test_truncated_record_ends_table() {
        // Property 7 claims 4 bytes but only 2 remain
        let bytes = [0x0A, 0x55, 0x67, 0x01, 0x02];
        let table = PropertyTable::decode(&bytes, 0, PropertyEncoding::Legacy);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(10), Some(&[0x55][..]));
        assert!(!table.contains(7));
    }

    #[test]
    fn test_duplicate_numbers_keep_first() {
        let bytes = [0x0F, 0x01, 0x0F, 0x02, 0x00];
        let table = PropertyTable::decode(&bytes, 0, PropertyEncoding::Legacy);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(15), Some(&[0x01][..]));
    }

    #[test]
    fn test_random_bytes_never_read_past_end() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..2000 {
            let len = rng.gen_range(0..96);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let start = rng.gen_range(0..len + 4);
            for encoding in [PropertyEncoding::Legacy, PropertyEncoding::Extended] {
                let table = PropertyTable::decode(&bytes, start, encoding);
                let total: usize = table.iter().map(|(_, d)| d.len()).sum();
                assert!(total <= bytes.len());
                for (number, data) in table.iter() {
                    assert!(number >= 1 && number <= encoding.max_property());
                    assert!(!data.is_empty() && data.len() <= encoding.max_property_size());
                }
            }
        }
    }
}
