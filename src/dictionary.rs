use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

use log::debug;

use crate::config::MapperConfig;
use crate::error::StoryResult;
use crate::story::StoryImage;
use crate::text;

/// Smallest entry length: the encoded text of a V1-3 word
pub const MIN_ENTRY_LENGTH: u8 = 4;

#[derive(Debug, Clone)]
pub struct Dictionary {
    pub n: u8,
    pub input_codes: Vec<u8>,
    pub entry_length: u8,
    pub number_of_entries: usize,
    /// Address of the first entry
    pub entries_addr: usize,
    /// Bytes of encoded text at the start of every entry
    pub text_len: usize,
}

/// One decoded dictionary entry
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryEntry {
    pub word: String,
    pub extra: Vec<u8>,
}

impl Dictionary {
    pub fn new(image: &StoryImage) -> StoryResult<Dictionary> {
        let mut cur_pos = image.header.dictionary as usize;
        let n = image.read_byte(cur_pos)?;
        cur_pos += 1;
        let input_codes = image.read_slice(cur_pos, n as usize)?.to_vec();
        cur_pos += n as usize;
        let entry_length = image.read_byte(cur_pos)?;
        cur_pos += 1;
        let number_of_entries = image.read_word(cur_pos)? as usize;
        cur_pos += 2;

        Ok(Dictionary {
            n,
            input_codes,
            entry_length,
            number_of_entries,
            entries_addr: cur_pos,
            text_len: text::dictionary_text_len(image.version()),
        })
    }

    /// Entries carry extra bytes only when longer than the encoded text
    pub fn has_extra_bytes(&self) -> bool {
        self.entry_length > MIN_ENTRY_LENGTH && self.entry_length as usize > self.text_len
    }

    /// Decode every entry that lies inside the image. A negative entry count
    /// (V6 unsorted dictionaries) is not handled; the count is read unsigned.
    pub fn entries(&self, image: &StoryImage) -> Vec<DictionaryEntry> {
        let entry_length = self.entry_length as usize;
        let mut entries = Vec::with_capacity(self.number_of_entries);
        if entry_length == 0 {
            return entries;
        }

        for i in 0..self.number_of_entries {
            let addr = self.entries_addr + i * entry_length;
            let Ok(raw) = image.read_slice(addr, entry_length) else {
                debug!(
                    "Dictionary entry {} at {:#06x} is outside the image",
                    i, addr
                );
                break;
            };
            let text_len = self.text_len.min(entry_length);
            let word = match text::decode_string_limited(
                image.bytes(),
                addr,
                text_len,
                image.header.abbrev_table as usize,
            ) {
                Ok((word, _)) => word.trim().to_lowercase(),
                Err(e) => {
                    debug!("Cannot decode dictionary entry {}: {}", i, e);
                    String::new()
                }
            };
            entries.push(DictionaryEntry {
                word,
                extra: raw[text_len..].to_vec(),
            });
        }
        entries
    }

    /// The vocabulary in dictionary order
    pub fn words(&self, image: &StoryImage) -> Vec<String> {
        self.entries(image).into_iter().map(|e| e.word).collect()
    }

    /// Property number -> first word whose extra bytes mention it.
    ///
    /// Some compilers store a direction's property number in the extra bytes of
    /// the direction word. Not every extra byte is such a number; callers keep
    /// only the entries for properties confirmed as exits.
    pub fn word_property_hints(
        &self,
        image: &StoryImage,
        config: &MapperConfig,
    ) -> BTreeMap<u8, String> {
        let mut hints = BTreeMap::new();
        if !self.has_extra_bytes() {
            debug!(
                "Dictionary entries are {} bytes: no property hints",
                self.entry_length
            );
            return hints;
        }

        for entry in self.entries(image) {
            if entry.word.is_empty() {
                continue;
            }
            for &byte in &entry.extra {
                if (1..=config.max_hint_property).contains(&byte) {
                    hints.entry(byte).or_insert_with(|| entry.word.clone());
                }
            }
        }
        debug!("Dictionary property hints: {:?}", hints);
        hints
    }
}

/// Property-number hints from the story's dictionary, empty when it has none
pub fn word_property_hints(image: &StoryImage, config: &MapperConfig) -> BTreeMap<u8, String> {
    match Dictionary::new(image) {
        Ok(dictionary) => dictionary.word_property_hints(image, config),
        Err(e) => {
            debug!("Cannot read dictionary header: {}", e);
            BTreeMap::new()
        }
    }
}

impl Display for Dictionary {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        writeln!(
            f,
            "Number of separator / input codes: {}, word size: {}, word count: {}",
            self.n, self.entry_length, self.number_of_entries
        )?;
        write!(f, "separators:")?;
        for c in &self.input_codes {
            write!(f, " '{}'", *c as char)?;
        }
        Ok(())
    }
}
