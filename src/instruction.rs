use crate::error::{StoryError, StoryResult};
use crate::text;
use std::fmt::{Display, Error, Formatter};

/// Operand types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from 2-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            OperandType::LargeConstant => 2,
            OperandType::SmallConstant | OperandType::Variable => 1,
            OperandType::Omitted => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandCount {
    OP0,
    OP1,
    OP2,
    VAR,
}

#[derive(Debug, Clone)]
pub struct BranchInfo {
    /// True if branch on true, false if branch on false
    pub on_true: bool,
    /// Branch offset (0-1 = return false/true, 2+ = jump)
    pub offset: i16,
}

/// A decoded instruction. Only the parts needed to walk routines are kept:
/// opcode identity, operands and total length.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: u8,
    pub ext_opcode: Option<u8>,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    pub operand_types: Vec<OperandType>,
    pub operands: Vec<u16>,
    pub store_var: Option<u8>,
    pub branch: Option<BranchInfo>,
    pub text: Option<String>,
    /// Total size of instruction in bytes
    pub size: usize,
}

fn byte_at(memory: &[u8], addr: usize, what: &str) -> StoryResult<u8> {
    memory
        .get(addr)
        .copied()
        .ok_or_else(|| StoryError::InvalidInstruction(addr, format!("{} out of bounds", what)))
}

impl Instruction {
    /// Decode an instruction from memory at the given address
    pub fn decode(memory: &[u8], addr: usize, version: u8) -> StoryResult<Self> {
        let mut offset = addr;
        let opcode_byte = byte_at(memory, offset, "opcode")?;
        offset += 1;

        let form = match opcode_byte >> 6 {
            0b11 => InstructionForm::Variable,
            0b10 if opcode_byte == 0xBE && version >= 5 => InstructionForm::Extended,
            0b10 => InstructionForm::Short,
            _ => InstructionForm::Long,
        };

        let (opcode, ext_opcode, operand_count) = match form {
            InstructionForm::Long => (opcode_byte & 0x1F, None, OperandCount::OP2),
            InstructionForm::Short => {
                let count = if (opcode_byte >> 4) & 0x03 == 0x03 {
                    OperandCount::OP0
                } else {
                    OperandCount::OP1
                };
                (opcode_byte & 0x0F, None, count)
            }
            InstructionForm::Variable => {
                let count = if opcode_byte & 0x20 == 0 {
                    OperandCount::OP2
                } else {
                    OperandCount::VAR
                };
                (opcode_byte & 0x1F, None, count)
            }
            InstructionForm::Extended => {
                let ext = byte_at(memory, offset, "extended opcode")?;
                offset += 1;
                (opcode_byte, Some(ext), OperandCount::VAR)
            }
        };

        let mut operand_types = Vec::new();
        match form {
            InstructionForm::Long => {
                for mask in [0x40, 0x20] {
                    operand_types.push(if opcode_byte & mask != 0 {
                        OperandType::Variable
                    } else {
                        OperandType::SmallConstant
                    });
                }
            }
            InstructionForm::Short => {
                if operand_count == OperandCount::OP1 {
                    operand_types.push(OperandType::from_bits((opcode_byte >> 4) & 0x03));
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                // call_vs2 and call_vn2 carry a second type byte
                let type_byte_count = if form == InstructionForm::Variable
                    && operand_count == OperandCount::VAR
                    && (opcode == 0x0C || opcode == 0x1A)
                {
                    2
                } else {
                    1
                };
                let mut type_bytes = Vec::with_capacity(type_byte_count);
                for _ in 0..type_byte_count {
                    type_bytes.push(byte_at(memory, offset, "operand types")?);
                    offset += 1;
                }
                'types: for type_byte in type_bytes {
                    for i in 0..4 {
                        let op_type = OperandType::from_bits(type_byte >> (6 - i * 2));
                        if op_type == OperandType::Omitted {
                            break 'types;
                        }
                        operand_types.push(op_type);
                    }
                }
            }
        }

        let mut operands = Vec::with_capacity(operand_types.len());
        for op_type in &operand_types {
            match op_type {
                OperandType::LargeConstant => {
                    let high = byte_at(memory, offset, "large constant")?;
                    let low = byte_at(memory, offset + 1, "large constant")?;
                    operands.push(((high as u16) << 8) | low as u16);
                }
                OperandType::SmallConstant | OperandType::Variable => {
                    operands.push(byte_at(memory, offset, "operand")? as u16);
                }
                OperandType::Omitted => break,
            }
            offset += op_type.size();
        }

        let store_var = if stores_result(opcode, ext_opcode, form, operand_count, version) {
            let var = byte_at(memory, offset, "store variable")?;
            offset += 1;
            Some(var)
        } else {
            None
        };

        let branch = if has_branch(opcode, form, operand_count, version) {
            let first_byte = byte_at(memory, offset, "branch offset")?;
            offset += 1;
            let on_true = (first_byte & 0x80) != 0;
            let offset_val = if (first_byte & 0x40) != 0 {
                (first_byte & 0x3F) as i16
            } else {
                let second_byte = byte_at(memory, offset, "branch offset")?;
                offset += 1;
                let val = (((first_byte & 0x3F) as i16) << 8) | (second_byte as i16);
                if val & 0x2000 != 0 {
                    val | (0xC000u16 as i16)
                } else {
                    val
                }
            };
            Some(BranchInfo {
                on_true,
                offset: offset_val,
            })
        } else {
            None
        };

        let text = if form == InstructionForm::Short
            && operand_count == OperandCount::OP0
            && (opcode == 0x02 || opcode == 0x03)
        {
            let abbrev_addr = if memory.len() >= 0x1A {
                ((memory[0x18] as usize) << 8) | memory[0x19] as usize
            } else {
                0x40
            };
            let (string, len) = text::decode_string(memory, offset, abbrev_addr)
                .map_err(|e| StoryError::InvalidInstruction(addr, e.to_string()))?;
            offset += len;
            Some(string)
        } else {
            None
        };

        Ok(Instruction {
            opcode,
            ext_opcode,
            form,
            operand_count,
            operand_types,
            operands,
            store_var,
            branch,
            text,
            size: offset - addr,
        })
    }

    /// Get a human-readable name for the instruction
    pub fn name(&self, version: u8) -> &'static str {
        match self.form {
            InstructionForm::Extended => lookup(EXT_NAMES, self.ext_opcode.unwrap_or(0xFF)),
            InstructionForm::Long => lookup(OP2_NAMES, self.opcode),
            InstructionForm::Variable if self.operand_count == OperandCount::OP2 => {
                lookup(OP2_NAMES, self.opcode)
            }
            InstructionForm::Variable => match self.opcode {
                0x00 if version >= 4 => "call_vs",
                0x04 if version >= 5 => "aread",
                _ => lookup(VAR_NAMES, self.opcode),
            },
            InstructionForm::Short if self.operand_count == OperandCount::OP0 => {
                match self.opcode {
                    0x09 if version >= 5 => "catch",
                    _ => lookup(OP0_NAMES, self.opcode),
                }
            }
            InstructionForm::Short => match self.opcode {
                0x0F if version >= 5 => "call_1n",
                _ => lookup(OP1_NAMES, self.opcode),
            },
        }
    }

    /// Mnemonic followed by the operands, e.g. `je #0005, V8f ?+10`
    pub fn format_with_version(&self, version: u8) -> String {
        format!("{}{}", self.name(version), self)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for (i, (op, op_type)) in self.operands.iter().zip(&self.operand_types).enumerate() {
            write!(f, "{}", if i == 0 { " " } else { ", " })?;
            match op_type {
                OperandType::Variable => write!(f, "V{:02x}", op)?,
                _ => write!(f, "#{:04x}", op)?,
            }
        }
        if let Some(text) = &self.text {
            write!(f, " {:?}", text)?;
        }
        if let Some(var) = self.store_var {
            write!(f, " -> V{:02x}", var)?;
        }
        if let Some(branch) = &self.branch {
            write!(f, " ?{}", if branch.on_true { "" } else { "~" })?;
            match branch.offset {
                0 => write!(f, "rfalse")?,
                1 => write!(f, "rtrue")?,
                n => write!(f, "{:+}", n)?,
            }
        }
        Ok(())
    }
}

fn lookup(table: &[&'static str], opcode: u8) -> &'static str {
    table.get(opcode as usize).copied().unwrap_or("unknown")
}

const OP2_NAMES: &[&str] = &[
    "unknown",
    "je",
    "jl",
    "jg",
    "dec_chk",
    "inc_chk",
    "jin",
    "test",
    "or",
    "and",
    "test_attr",
    "set_attr",
    "clear_attr",
    "store",
    "insert_obj",
    "loadw",
    "loadb",
    "get_prop",
    "get_prop_addr",
    "get_next_prop",
    "add",
    "sub",
    "mul",
    "div",
    "mod",
    "call_2s",
    "call_2n",
    "set_colour",
    "throw",
];

const OP1_NAMES: &[&str] = &[
    "jz",
    "get_sibling",
    "get_child",
    "get_parent",
    "get_prop_len",
    "inc",
    "dec",
    "print_addr",
    "call_1s",
    "remove_obj",
    "print_obj",
    "ret",
    "jump",
    "print_paddr",
    "load",
    "not",
];

const OP0_NAMES: &[&str] = &[
    "rtrue",
    "rfalse",
    "print",
    "print_ret",
    "nop",
    "save",
    "restore",
    "restart",
    "ret_popped",
    "pop",
    "quit",
    "new_line",
    "show_status",
    "verify",
    "extended",
    "piracy",
];

const VAR_NAMES: &[&str] = &[
    "call",
    "storew",
    "storeb",
    "put_prop",
    "sread",
    "print_char",
    "print_num",
    "random",
    "push",
    "pull",
    "split_window",
    "set_window",
    "call_vs2",
    "erase_window",
    "erase_line",
    "set_cursor",
    "get_cursor",
    "set_text_style",
    "buffer_mode",
    "output_stream",
    "input_stream",
    "sound_effect",
    "read_char",
    "scan_table",
    "not",
    "call_vn",
    "call_vn2",
    "tokenise",
    "encode_text",
    "copy_table",
    "print_table",
    "check_arg_count",
];

const EXT_NAMES: &[&str] = &[
    "save",
    "restore",
    "log_shift",
    "art_shift",
    "set_font",
    "draw_picture",
    "picture_data",
    "erase_picture",
    "set_margins",
    "save_undo",
    "restore_undo",
    "print_unicode",
    "check_unicode",
];

fn stores_result_2op(opcode: u8) -> bool {
    matches!(opcode, 0x08 | 0x09 | 0x0F..=0x19)
}

fn has_branch_2op(opcode: u8) -> bool {
    matches!(opcode, 0x01..=0x07 | 0x0A)
}

fn stores_result(
    opcode: u8,
    ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    version: u8,
) -> bool {
    match (form, operand_count) {
        (InstructionForm::Extended, _) => {
            matches!(ext_opcode, Some(0x00..=0x04 | 0x09 | 0x0A | 0x0C))
        }
        (InstructionForm::Long, _) | (InstructionForm::Variable, OperandCount::OP2) => {
            stores_result_2op(opcode)
        }
        (InstructionForm::Variable, _) => match opcode {
            0x00 | 0x07 | 0x0C | 0x16 | 0x17 | 0x18 => true,
            0x04 => version >= 5,
            0x09 => version == 6,
            _ => false,
        },
        (InstructionForm::Short, OperandCount::OP0) => match opcode {
            0x05 | 0x06 => version == 4,
            0x09 => version >= 5,
            _ => false,
        },
        (InstructionForm::Short, _) => match opcode {
            0x01..=0x04 | 0x08 | 0x0E => true,
            0x0F => version <= 4,
            _ => false,
        },
    }
}

fn has_branch(opcode: u8, form: InstructionForm, operand_count: OperandCount, version: u8) -> bool {
    match (form, operand_count) {
        (InstructionForm::Extended, _) => false,
        (InstructionForm::Long, _) | (InstructionForm::Variable, OperandCount::OP2) => {
            has_branch_2op(opcode)
        }
        (InstructionForm::Variable, _) => matches!(opcode, 0x17 | 0x1F),
        (InstructionForm::Short, OperandCount::OP0) => match opcode {
            0x05 | 0x06 => version <= 3,
            0x0D | 0x0F => true,
            _ => false,
        },
        (InstructionForm::Short, _) => matches!(opcode, 0x00..=0x02),
    }
}
