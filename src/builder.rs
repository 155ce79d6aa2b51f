// Synthetic story images for tests and fixtures.
//
// Layout produced by `StoryBuilder::build`:
//   0x0000  header
//   0x0040  abbreviation table (empty)
//   0x0100  property defaults, object entries, property tables, dictionary
//   CODE_BASE  routines added with `add_routine`
use crate::error::{StoryError, StoryResult};
use crate::header::HEADER_SIZE;
use crate::objects::{PropertyEncoding, PropertyTable};
use crate::story::StoryImage;
use crate::text;

const ABBREV_TABLE: usize = 0x40;
const OBJECT_TABLE: usize = 0x100;
pub const CODE_BASE: usize = 0x6000;

#[derive(Debug, Clone, Default)]
pub struct ObjectSpec {
    pub name: String,
    pub parent: u16,
    pub sibling: u16,
    pub child: u16,
    pub attributes: Vec<u16>,
    pub properties: Vec<(u8, Vec<u8>)>,
}

impl ObjectSpec {
    pub fn new(name: &str) -> Self {
        ObjectSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn parent(mut self, parent: u16) -> Self {
        self.parent = parent;
        self
    }

    pub fn sibling(mut self, sibling: u16) -> Self {
        self.sibling = sibling;
        self
    }

    pub fn child(mut self, child: u16) -> Self {
        self.child = child;
        self
    }

    pub fn attribute(mut self, attr: u16) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn property(mut self, number: u8, data: &[u8]) -> Self {
        self.properties.push((number, data.to_vec()));
        self
    }
}

/// Builds a minimal but well-formed story file in memory
pub struct StoryBuilder {
    version: u8,
    objects: Vec<ObjectSpec>,
    entry_length: u8,
    words: Vec<(String, Vec<u8>)>,
    code: Vec<u8>,
}

impl StoryBuilder {
    pub fn new(version: u8) -> Self {
        StoryBuilder {
            version,
            objects: Vec::new(),
            entry_length: text::dictionary_text_len(version) as u8 + 3,
            words: Vec::new(),
            code: Vec::new(),
        }
    }

    /// Add an object and return its number; `build` rejects tables that overflow
    pub fn add_object(&mut self, spec: ObjectSpec) -> u16 {
        self.objects.push(spec);
        u16::try_from(self.objects.len()).unwrap_or(u16::MAX)
    }

    /// Pad the object table with plain, property-less objects up to `last`
    pub fn fill_objects_to(&mut self, last: u16) {
        while self.objects.len() < last as usize {
            let n = self.objects.len() + 1;
            self.objects.push(ObjectSpec::new(&format!("thing {}", n)));
        }
    }

    /// Replace an existing object (1-based)
    pub fn set_object(&mut self, obj_num: u16, spec: ObjectSpec) -> StoryResult<()> {
        let count = self.objects.len();
        let slot = (obj_num as usize)
            .checked_sub(1)
            .and_then(|i| self.objects.get_mut(i))
            .ok_or_else(|| {
                StoryError::InvalidObject(obj_num, format!("no such object (1..={})", count))
            })?;
        *slot = spec;
        Ok(())
    }

    pub fn set_entry_length(&mut self, entry_length: u8) {
        self.entry_length = entry_length;
    }

    /// Add a dictionary word followed by its extra bytes (padded or cut to fit)
    pub fn add_word(&mut self, word: &str, extra: &[u8]) {
        self.words.push((word.to_string(), extra.to_vec()));
    }

    /// Add a routine with `num_locals` zeroed locals and return its packed address
    pub fn add_routine(&mut self, num_locals: u8, code: &[u8]) -> StoryResult<u16> {
        let scale = if self.version <= 3 { 2 } else { 4 };
        while self.code.len() % scale != 0 {
            self.code.push(0);
        }
        let addr = CODE_BASE + self.code.len();
        self.code.push(num_locals);
        if self.version <= 4 {
            self.code.extend(std::iter::repeat(0).take(num_locals as usize * 2));
        }
        self.code.extend_from_slice(code);
        u16::try_from(addr / scale).map_err(|_| StoryError::AddressOutOfBounds(addr, CODE_BASE))
    }

    pub fn build(&self) -> StoryResult<Vec<u8>> {
        let encoding = PropertyEncoding::for_version(self.version);
        if self.objects.len() > encoding.max_objects() as usize {
            return Err(StoryError::InvalidObject(
                encoding.max_objects(),
                format!("{} objects do not fit the table", self.objects.len()),
            ));
        }
        let mut memory = vec![0u8; OBJECT_TABLE];

        // Property defaults, then object entries
        memory.resize(OBJECT_TABLE + encoding.defaults_size(), 0);
        let entries_start = memory.len();
        let entries_end = entries_start + self.objects.len() * encoding.entry_size();
        memory.resize(entries_end, 0);

        for (i, spec) in self.objects.iter().enumerate() {
            let prop_addr = memory.len();
            let entry = entries_start + i * encoding.entry_size();
            write_entry(&mut memory[entry..], spec, encoding, prop_addr)?;

            let name = if spec.name.is_empty() {
                Vec::new()
            } else {
                text::encode_string(&spec.name)
            };
            let name_words = u8::try_from(name.len() / 2).map_err(|_| {
                StoryError::InvalidText(prop_addr, format!("name {:?} is too long", spec.name))
            })?;
            memory.push(name_words);
            memory.extend_from_slice(&name);

            let mut sorted = spec.properties.clone();
            sorted.sort_by(|a, b| b.0.cmp(&a.0));
            let table: PropertyTable = sorted.into_iter().collect();
            memory.extend_from_slice(&table.encode(encoding)?);
        }

        // Dictionary
        let dictionary = memory.len();
        let separators = [b'.', b',', b'"'];
        memory.push(separators.len() as u8);
        memory.extend_from_slice(&separators);
        memory.push(self.entry_length);
        memory.extend_from_slice(&word_bytes(self.words.len(), dictionary)?);
        for (word, extra) in &self.words {
            let mut entry = text::encode_dictionary_word(word, self.version);
            entry.extend_from_slice(extra);
            entry.resize(self.entry_length as usize, 0);
            memory.extend_from_slice(&entry);
        }

        if memory.len() > CODE_BASE {
            return Err(StoryError::AddressOutOfBounds(memory.len(), CODE_BASE));
        }
        memory.resize(CODE_BASE, 0);
        memory.extend_from_slice(&self.code);
        let scale = if self.version <= 3 { 2 } else { 4 };
        while memory.len() % scale != 0 || memory.len() == CODE_BASE {
            memory.push(0);
        }

        let file_words = word_bytes(memory.len() / scale, memory.len())?;
        let header = &mut memory[..HEADER_SIZE];
        header[0] = self.version;
        header[2..4].copy_from_slice(&1u16.to_be_bytes());
        header[4..6].copy_from_slice(&word_bytes(CODE_BASE, CODE_BASE)?);
        header[6..8].copy_from_slice(&word_bytes(CODE_BASE, CODE_BASE)?);
        header[8..10].copy_from_slice(&word_bytes(dictionary, dictionary)?);
        header[0x0A..0x0C].copy_from_slice(&word_bytes(OBJECT_TABLE, OBJECT_TABLE)?);
        header[0x0C..0x0E].copy_from_slice(&word_bytes(OBJECT_TABLE, OBJECT_TABLE)?);
        header[0x0E..0x10].copy_from_slice(&word_bytes(dictionary, dictionary)?);
        header[0x12..0x18].copy_from_slice(b"000000");
        header[0x18..0x1A].copy_from_slice(&word_bytes(ABBREV_TABLE, ABBREV_TABLE)?);
        header[0x1A..0x1C].copy_from_slice(&file_words);

        Ok(memory)
    }

    pub fn build_image(&self) -> StoryResult<StoryImage> {
        StoryImage::from_memory(self.build()?)
    }
}

/// Big-endian word for a value that must fit 16 bits; `addr` locates the error
fn word_bytes(value: usize, addr: usize) -> StoryResult<[u8; 2]> {
    u16::try_from(value)
        .map(u16::to_be_bytes)
        .map_err(|_| StoryError::AddressOutOfBounds(addr, u16::MAX as usize))
}

fn write_entry(
    entry: &mut [u8],
    spec: &ObjectSpec,
    encoding: PropertyEncoding,
    prop_addr: usize,
) -> StoryResult<()> {
    for &attr in &spec.attributes {
        let byte = attr as usize / 8;
        if byte < encoding.attribute_bytes() {
            entry[byte] |= 0x80 >> (attr % 8);
        }
    }
    match encoding {
        PropertyEncoding::Legacy => {
            let related = [spec.parent, spec.sibling, spec.child];
            for (slot, &obj_num) in related.iter().enumerate() {
                entry[4 + slot] = u8::try_from(obj_num).map_err(|_| {
                    StoryError::InvalidObject(obj_num, "needs more than one byte".to_string())
                })?;
            }
            entry[7..9].copy_from_slice(&word_bytes(prop_addr, prop_addr)?);
        }
        PropertyEncoding::Extended => {
            entry[6..8].copy_from_slice(&spec.parent.to_be_bytes());
            entry[8..10].copy_from_slice(&spec.sibling.to_be_bytes());
            entry[10..12].copy_from_slice(&spec.child.to_be_bytes());
            entry[12..14].copy_from_slice(&word_bytes(prop_addr, prop_addr)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_set_object_outside_table() {
        let mut builder = StoryBuilder::new(3);
        builder.fill_objects_to(3);
        assert!(builder.set_object(3, ObjectSpec::new("lamp")).is_ok());
        assert!(matches!(
            builder.set_object(0, ObjectSpec::new("lamp")),
            Err(StoryError::InvalidObject(0, _))
        ));
        assert!(matches!(
            builder.set_object(4, ObjectSpec::new("lamp")),
            Err(StoryError::InvalidObject(4, _))
        ));
    }

    #[test]
    fn test_values_that_do_not_fit_are_rejected() {
        let mut builder = StoryBuilder::new(3);
        builder.add_object(ObjectSpec::new("lamp").parent(300));
        assert!(matches!(builder.build(), Err(StoryError::InvalidObject(300, _))));

        let mut builder = StoryBuilder::new(3);
        builder.add_object(ObjectSpec::new(&"a".repeat(800)));
        assert!(matches!(builder.build(), Err(StoryError::InvalidText(_, _))));

        let mut builder = StoryBuilder::new(3);
        builder.fill_objects_to(256);
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_routine_address_is_packed() {
        let mut builder = StoryBuilder::new(3);
        let packed = builder.add_routine(0, &[0xB0]).unwrap();
        assert_eq!(packed as usize, CODE_BASE / 2);
        let image = builder.build_image().unwrap();
        assert_eq!(image.read_byte(CODE_BASE + 1).unwrap(), 0xB0);
    }
}
