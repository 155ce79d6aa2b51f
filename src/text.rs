use crate::error::{StoryError, StoryResult};
use log::{debug, trace};

/// The three alphabets for Z-string decoding
pub const ALPHABET_A0: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHABET_A2_V3: &[u8] = b" \r0123456789.,!?_#'\"/\\-:()";

/// Punctuation that still counts towards a readable object name
const NAME_PUNCTUATION: &str = " -.,!?'\"";

/// Prevent runaway decoding of misaligned text
const MAX_ZCHARS: usize = 1000;

/// Decode a Z-string from memory starting at the given address
/// Returns the decoded string and the number of bytes consumed
pub fn decode_string(
    memory: &[u8],
    addr: usize,
    abbrev_table_addr: usize,
) -> StoryResult<(String, usize)> {
    decode_string_recursive(memory, addr, memory.len(), abbrev_table_addr, 0)
}

/// Decode a Z-string that may not extend past `addr + max_bytes`
pub fn decode_string_limited(
    memory: &[u8],
    addr: usize,
    max_bytes: usize,
    abbrev_table_addr: usize,
) -> StoryResult<(String, usize)> {
    let end = addr.saturating_add(max_bytes).min(memory.len());
    decode_string_recursive(memory, addr, end, abbrev_table_addr, 0)
}

fn decode_string_recursive(
    memory: &[u8],
    addr: usize,
    end: usize,
    abbrev_table_addr: usize,
    depth: u8,
) -> StoryResult<(String, usize)> {
    if depth > 3 {
        return Err(StoryError::InvalidText(
            addr,
            "abbreviation recursion too deep".to_string(),
        ));
    }
    if addr >= memory.len() {
        return Err(StoryError::AddressOutOfBounds(addr, memory.len()));
    }

    let mut result = String::new();
    let mut offset = addr;

    // First, collect all z-characters
    let mut all_zchars = Vec::new();
    let mut is_end = false;

    let limit = end.min(memory.len());
    while !is_end && offset + 1 < limit && all_zchars.len() < MAX_ZCHARS {
        let word = ((memory[offset] as u16) << 8) | (memory[offset + 1] as u16);
        offset += 2;

        // Bit 15 marks the last word
        is_end = (word & 0x8000) != 0;

        let zchars = [
            ((word >> 10) & 0x1F) as u8,
            ((word >> 5) & 0x1F) as u8,
            (word & 0x1F) as u8,
        ];
        trace!(
            "Z-word {:04x} = Z-chars {:?}, is_end={}",
            word, zchars, is_end
        );
        all_zchars.extend_from_slice(&zchars);
    }

    let mut abbrev_shift = 0;
    let mut current_alphabet = 0; // 0=A0, 1=A1, 2=A2

    let mut i = 0;
    while i < all_zchars.len() {
        let zc = all_zchars[i];
        i += 1;
        if abbrev_shift > 0 {
            let abbrev_num = (abbrev_shift - 1) * 32 + zc;
            abbrev_shift = 0;

            let abbrev_entry_addr = abbrev_table_addr.saturating_add(abbrev_num as usize * 2);
            if abbrev_entry_addr + 1 >= memory.len() {
                continue;
            }
            let abbrev_word_addr =
                ((memory[abbrev_entry_addr] as u16) << 8) | (memory[abbrev_entry_addr + 1] as u16);
            let abbrev_byte_addr = (abbrev_word_addr as usize).saturating_mul(2);
            if abbrev_byte_addr == 0 || abbrev_byte_addr + 1 >= memory.len() {
                debug!(
                    "Invalid abbreviation address {:04x} (memory size: {}), skipping",
                    abbrev_byte_addr,
                    memory.len()
                );
                continue;
            }

            match decode_string_recursive(
                memory,
                abbrev_byte_addr,
                memory.len(),
                abbrev_table_addr,
                depth + 1,
            ) {
                Ok((abbrev_str, _)) => result.push_str(&abbrev_str),
                Err(e) => debug!("Error decoding abbreviation {}: {}", abbrev_num, e),
            }
            continue;
        }

        match zc {
            0 => result.push(' '),
            1..=3 => abbrev_shift = zc,
            4 => current_alphabet = 1,
            5 => current_alphabet = 2,
            _ => {
                let ch = match current_alphabet {
                    0 => ALPHABET_A0[(zc - 6) as usize] as char,
                    1 => ALPHABET_A1[(zc - 6) as usize] as char,
                    _ => {
                        if zc == 6 {
                            // ZSCII escape: next two z-chars hold a 10-bit code
                            if i + 1 < all_zchars.len() {
                                let zscii_code =
                                    ((all_zchars[i] as u16) << 5) | all_zchars[i + 1] as u16;
                                i += 2;
                                if (32..=126).contains(&zscii_code) {
                                    zscii_code as u8 as char
                                } else {
                                    '?'
                                }
                            } else {
                                '?'
                            }
                        } else if zc == 7 {
                            '\n'
                        } else {
                            ALPHABET_A2_V3[(zc - 6) as usize] as char
                        }
                    }
                };
                result.push(ch);
                // Shifts are temporary in V3+
                current_alphabet = 0;
            }
        }
    }

    Ok((result, offset - addr))
}

/// Fraction of characters that are alphanumeric or common punctuation
pub fn name_quality(name: &str) -> f64 {
    let total = name.chars().count();
    if total == 0 {
        return 0.0;
    }
    let readable = name
        .chars()
        .filter(|c| !c.is_control() && (c.is_alphanumeric() || NAME_PUNCTUATION.contains(*c)))
        .count();
    readable as f64 / total as f64
}

/// Names decoded from misaligned text come out as mostly symbols; reject those
pub fn is_valid_name(name: &str, threshold: f64) -> bool {
    !name.trim().is_empty() && name_quality(name) >= threshold
}

fn zchars_for(ch: char) -> Vec<u8> {
    if ch == ' ' {
        return vec![0];
    }
    if let Some(pos) = ALPHABET_A0.iter().position(|&c| c as char == ch) {
        return vec![pos as u8 + 6];
    }
    if let Some(pos) = ALPHABET_A1.iter().position(|&c| c as char == ch) {
        return vec![4, pos as u8 + 6];
    }
    if let Some(pos) = ALPHABET_A2_V3.iter().skip(2).position(|&c| c as char == ch) {
        return vec![5, pos as u8 + 8];
    }
    let code = if ch.is_ascii() { ch as u16 } else { b'?' as u16 };
    vec![5, 6, ((code >> 5) & 0x1F) as u8, (code & 0x1F) as u8]
}

fn pack_zchars(zchars: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(zchars.len() / 3 * 2);
    let chunks: Vec<&[u8]> = zchars.chunks(3).collect();
    for (n, chunk) in chunks.iter().enumerate() {
        let mut word = ((chunk[0] as u16) << 10) | ((chunk[1] as u16) << 5) | (chunk[2] as u16);
        if n + 1 == chunks.len() {
            word |= 0x8000;
        }
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// Encode text as a Z-string (padded to whole words, end bit set)
pub fn encode_string(text: &str) -> Vec<u8> {
    let mut zchars: Vec<u8> = text.chars().flat_map(zchars_for).collect();
    if zchars.is_empty() {
        zchars.push(5);
    }
    while zchars.len() % 3 != 0 {
        zchars.push(5);
    }
    pack_zchars(&zchars)
}

/// Encoded dictionary text length: 4 bytes in V1-3, 6 bytes in V4+
pub fn dictionary_text_len(version: u8) -> usize {
    if version <= 3 {
        4
    } else {
        6
    }
}

/// Encode a word the way the dictionary stores it (truncated, lower case)
pub fn encode_dictionary_word(word: &str, version: u8) -> Vec<u8> {
    let max_zchars = dictionary_text_len(version) / 2 * 3;
    let mut zchars: Vec<u8> = word
        .to_lowercase()
        .chars()
        .flat_map(zchars_for)
        .take(max_zchars)
        .collect();
    while zchars.len() < max_zchars {
        zchars.push(5);
    }
    pack_zchars(&zchars)
}
