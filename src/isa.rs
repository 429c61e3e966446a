//! Instruction set shared by the assembler and the runtime.
//!
//! Every instruction is a 10 byte, big-endian record:
//!
//! ```text
//! 00   00   00 00 00 00   00 00 00 00
//! |    |    |             | dest
//! |    |    | source
//! |    | size class
//! | opcode
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ImageError;

/// Size of a single encoded record in bytes.
pub const RECORD_SIZE: usize = 10;

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    /// Halt and catch fire
    Hcf = 0x00,
    /// reg0 + reg1 -> reg2
    Add = 0x01,
    /// reg0 - reg1 -> reg2
    Sub = 0x02,
    /// reg0 / reg1 -> reg2
    Div = 0x03,
    /// reg0 * reg1 -> reg2
    Mul = 0x04,
    /// Literal source, masked to size, -> dest(reg)
    LoadImm = 0x05,
    /// Memory at source -> memory at dest
    Move = 0x06,
    /// Memory at source -> dest(reg)
    Load = 0x07,
    /// source(reg) -> memory at dest
    Store = 0x08,
    /// Swap the 16 bit halves of dest(reg)
    Swap = 0x09,
    /// source(reg) <-> dest(reg)
    Exchange = 0x0A,
    /// source(reg) ^ 0 -> dest(reg)
    Not = 0x0B,
    /// source(reg) & dest(reg) -> dest(reg)
    And = 0x0C,
    /// source(reg) | dest(reg) -> dest(reg)
    Or = 0x0D,
    /// source(reg) ^ dest(reg) -> dest(reg)
    Xor = 0x0E,
    /// source -> pc
    Jump = 0x0F,
    /// dest -> pc if source(reg) == 0
    JumpEqZero = 0x10,
    /// dest -> pc if source(reg) != 0
    JumpNeqZero = 0x11,
    /// dest(reg) -> debug output
    DebugOut = 0x12,
    /// source(reg) -> dest(reg)
    Copy = 0x13,
    /// Does nothing
    Mu = 0xFF,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hcf => "hcf",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Div => "div",
            Opcode::Mul => "mul",
            Opcode::LoadImm => "loadi",
            Opcode::Move => "move",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Swap => "swap",
            Opcode::Exchange => "exchange",
            Opcode::Not => "not",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Jump => "jump",
            Opcode::JumpEqZero => "jeqz",
            Opcode::JumpNeqZero => "jnez",
            Opcode::DebugOut => "dout",
            Opcode::Copy => "copy",
            Opcode::Mu => "mu",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let op = match value {
            0x00 => Opcode::Hcf,
            0x01 => Opcode::Add,
            0x02 => Opcode::Sub,
            0x03 => Opcode::Div,
            0x04 => Opcode::Mul,
            0x05 => Opcode::LoadImm,
            0x06 => Opcode::Move,
            0x07 => Opcode::Load,
            0x08 => Opcode::Store,
            0x09 => Opcode::Swap,
            0x0A => Opcode::Exchange,
            0x0B => Opcode::Not,
            0x0C => Opcode::And,
            0x0D => Opcode::Or,
            0x0E => Opcode::Xor,
            0x0F => Opcode::Jump,
            0x10 => Opcode::JumpEqZero,
            0x11 => Opcode::JumpNeqZero,
            0x12 => Opcode::DebugOut,
            0x13 => Opcode::Copy,
            0xFF => Opcode::Mu,
            unknown => return Err(unknown),
        };
        Ok(op)
    }
}

/// Operand width carried in the second byte of every record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Size {
    Byte = 0,
    Word = 1,
    Longword = 2,
    /// Constant variants mark the last operand as a literal rather than a register.
    ConstByte = 3,
    ConstWord = 4,
    ConstLongword = 5,
}

impl Size {
    /// Width of the operand in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Size::Byte | Size::ConstByte => 1,
            Size::Word | Size::ConstWord => 2,
            Size::Longword | Size::ConstLongword => 4,
        }
    }

    /// Mask keeping only the bits that fit in this size.
    pub fn mask(self) -> u32 {
        match self.bytes() {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => 0xFFFF_FFFF,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Size::Byte => "byte",
            Size::Word => "word",
            Size::Longword => "longword",
            Size::ConstByte => "const byte",
            Size::ConstWord => "const word",
            Size::ConstLongword => "const longword",
        }
    }
}

impl TryFrom<u8> for Size {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Size::Byte),
            1 => Ok(Size::Word),
            2 => Ok(Size::Longword),
            3 => Ok(Size::ConstByte),
            4 => Ok(Size::ConstWord),
            5 => Ok(Size::ConstLongword),
            unknown => Err(unknown),
        }
    }
}

impl FromStr for Size {
    type Err = ();

    /// Only the sizes that can be written in source.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "byte" => Ok(Size::Byte),
            "word" => Ok(Size::Word),
            "longword" => Ok(Size::Longword),
            _ => Err(()),
        }
    }
}

/// Index of one of the 16 registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Register(u8);

impl Register {
    pub fn new(index: u8) -> Option<Self> {
        ((index as usize) < REGISTER_COUNT).then_some(Register(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = match s {
            "reg0" => 0,
            "reg1" => 1,
            "reg2" => 2,
            "reg3" => 3,
            "reg4" => 4,
            "reg5" => 5,
            "reg6" => 6,
            "reg7" => 7,
            "reg8" => 8,
            "reg9" => 9,
            "reg10" => 10,
            "reg11" => 11,
            "reg12" => 12,
            "reg13" => 13,
            "reg14" => 14,
            "reg15" => 15,
            _ => return Err(()),
        };
        Ok(Register(index))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg{}", self.0)
    }
}

/// One decoded instruction. Fields are kept raw so that any 10 bytes can be decoded.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Record {
    pub opcode: u8,
    pub size: u8,
    pub source: u32,
    pub dest: u32,
}

impl Record {
    pub fn new(opcode: Opcode, size: Size, source: u32, dest: u32) -> Self {
        Record {
            opcode: opcode as u8,
            size: size as u8,
            source,
            dest,
        }
    }

    /// Record without operands, e.g. `hcf` or `add`.
    pub fn bare(opcode: Opcode) -> Self {
        Record::new(opcode, Size::Byte, 0, 0)
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0; RECORD_SIZE];
        out[0] = self.opcode;
        out[1] = self.size;
        out[2..6].copy_from_slice(&self.source.to_be_bytes());
        out[6..10].copy_from_slice(&self.dest.to_be_bytes());
        out
    }

    pub fn decode(raw: &[u8; RECORD_SIZE]) -> Self {
        Record {
            opcode: raw[0],
            size: raw[1],
            source: u32::from_be_bytes([raw[2], raw[3], raw[4], raw[5]]),
            dest: u32::from_be_bytes([raw[6], raw[7], raw[8], raw[9]]),
        }
    }
}

/// Renders the record in source syntax where possible.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(opcode) = Opcode::try_from(self.opcode) else {
            return write!(f, ".unknown {:#04x}", self.opcode);
        };
        let size = Size::try_from(self.size)
            .map(Size::name)
            .unwrap_or("<bad size>");
        let (src, dst) = (self.source & 0xFF, self.dest & 0xFF);
        let (src_lit, dst_lit) = (self.source, self.dest);
        match opcode {
            Opcode::Hcf | Opcode::Add | Opcode::Sub | Opcode::Div | Opcode::Mul | Opcode::Mu => {
                f.write_str(opcode.mnemonic())
            }
            Opcode::LoadImm => write!(f, "{src_lit:#x} -> reg{dst} {size}"),
            Opcode::Move => write!(f, "move {size} {src_lit:#x} -> {dst_lit:#x}"),
            Opcode::Load => write!(f, "load {size} reg{dst} <- {src_lit:#x}"),
            Opcode::Store => write!(f, "store {size} reg{src} -> {dst_lit:#x}"),
            Opcode::Swap | Opcode::DebugOut => write!(f, "{} reg{dst}", opcode.mnemonic()),
            Opcode::Exchange => write!(f, "exchange reg{src} <-> reg{dst}"),
            Opcode::Not | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Copy => {
                write!(f, "{} reg{src} -> reg{dst}", opcode.mnemonic())
            }
            Opcode::Jump => match self.size {
                s if s == Size::ConstLongword as u8 => write!(f, "jump {src_lit}"),
                _ => write!(f, "jump reg{src}"),
            },
            Opcode::JumpEqZero | Opcode::JumpNeqZero => {
                let cond = if opcode == Opcode::JumpEqZero {
                    "equal to"
                } else {
                    "not equal to"
                };
                let target = if self.size == Size::ConstLongword as u8 {
                    dst_lit.to_string()
                } else {
                    format!("reg{dst}")
                };
                write!(f, "jump to {target} if reg{src} is {cond} zero")
            }
        }
    }
}

/// Split an image into records.
pub fn records(image: &[u8]) -> Result<impl Iterator<Item = Record> + '_, ImageError> {
    if image.len() % RECORD_SIZE != 0 {
        return Err(ImageError::Misaligned { len: image.len() });
    }
    Ok(image.chunks_exact(RECORD_SIZE).map(|chunk| {
        let mut raw = [0; RECORD_SIZE];
        raw.copy_from_slice(chunk);
        Record::decode(&raw)
    }))
}

/// Concatenate records into a flat image.
pub fn emit(records: &[Record]) -> Vec<u8> {
    records.iter().flat_map(|rec| rec.encode()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_is_big_endian() {
        let rec = Record::new(Opcode::LoadImm, Size::Word, 0x0102_0304, 0x0A0B_0C0D);
        assert_eq!(
            rec.encode(),
            [0x05, 0x01, 0x01, 0x02, 0x03, 0x04, 0x0A, 0x0B, 0x0C, 0x0D]
        );
    }

    #[test]
    fn hcf_is_all_zero() {
        assert_eq!(Record::bare(Opcode::Hcf).encode(), [0; RECORD_SIZE]);
    }

    #[test]
    fn decode_keeps_unknown_opcodes() {
        let raw = [0x42, 0x09, 0, 0, 0, 1, 0, 0, 0, 2];
        let rec = Record::decode(&raw);
        assert_eq!(rec.opcode, 0x42);
        assert_eq!(rec.size, 0x09);
        assert!(Opcode::try_from(rec.opcode).is_err());
        assert_eq!(rec.to_string(), ".unknown 0x42");
    }

    #[test]
    fn opcode_table() {
        for byte in 0..=u8::MAX {
            if let Ok(op) = Opcode::try_from(byte) {
                assert_eq!(op as u8, byte, "{}", op.mnemonic());
            }
        }
        assert_eq!(Opcode::try_from(0x13), Ok(Opcode::Copy));
        assert_eq!(Opcode::try_from(0xFF), Ok(Opcode::Mu));
        assert_eq!(Opcode::try_from(0x14), Err(0x14));
    }

    #[test]
    fn size_masks() {
        assert_eq!(Size::Byte.mask(), 0xFF);
        assert_eq!(Size::ConstWord.mask(), 0xFFFF);
        assert_eq!(Size::Longword.mask(), u32::MAX);
        assert!("const".parse::<Size>().is_err());
    }

    #[test]
    fn register_names() {
        assert_eq!("reg0".parse::<Register>().map(Register::index), Ok(0));
        assert_eq!("reg15".parse::<Register>().map(Register::index), Ok(15));
        assert!("reg16".parse::<Register>().is_err());
        assert!("r1".parse::<Register>().is_err());
        assert!(Register::new(16).is_none());
    }

    #[test]
    fn disassembly() {
        let cases = [
            (Record::bare(Opcode::Hcf), "hcf"),
            (Record::new(Opcode::LoadImm, Size::Byte, 42, 3), "0x2a -> reg3 byte"),
            (
                Record::new(Opcode::Store, Size::Word, 1, 0x200000),
                "store word reg1 -> 0x200000",
            ),
            (Record::new(Opcode::Jump, Size::ConstLongword, 10, 0), "jump 10"),
            (
                Record::new(Opcode::JumpNeqZero, Size::ConstLongword, 4, 30),
                "jump to 30 if reg4 is not equal to zero",
            ),
        ];
        for (rec, text) in cases {
            assert_eq!(rec.to_string(), text);
        }
    }

    #[test]
    fn misaligned_image() {
        assert!(records(&[0; 11]).is_err());
        assert_eq!(records(&[0; 20]).unwrap().count(), 2);
    }
}
