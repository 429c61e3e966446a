use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

// Assembler errors

/// Any error that aborts compilation. No image is produced once one of these is raised.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("Expected {expected}, found {found}")]
    #[diagnostic(
        code(parse::unexpected_token),
        help("check the operands for this instruction")
    )]
    Syntax {
        expected: String,
        found: String,
        #[label("unexpected token")]
        span: SourceSpan,
    },

    #[error("Encountered an invalid literal `{text}`")]
    #[diagnostic(
        code(lex::bad_lit),
        help("literals are unsigned, fit in 32 bits and may use 0x, 0b or 0o prefixes")
    )]
    InvalidLiteral {
        text: String,
        #[label("incorrect literal")]
        span: SourceSpan,
    },

    #[error("Expected {expected}, found `{found}`")]
    #[diagnostic(
        code(parse::invalid_operand),
        help("registers are named reg0 to reg15, sizes are byte, word or longword")
    )]
    InvalidOperand {
        expected: &'static str,
        found: String,
        #[label("invalid operand")]
        span: SourceSpan,
    },

    #[error("Duplicate label `{name}`")]
    #[diagnostic(
        code(parse::duplicate_label),
        help("block labels are only allowed once per file")
    )]
    DuplicateLabel {
        name: String,
        #[label("duplicate label")]
        span: SourceSpan,
    },

    #[error("Label `{name}` is never defined")]
    #[diagnostic(
        code(parse::unresolved_label),
        help("define a block with this label somewhere in the file")
    )]
    UnresolvedLabel {
        name: String,
        #[label("unresolved label")]
        span: SourceSpan,
    },
}

impl AsmError {
    pub fn span(&self) -> SourceSpan {
        match self {
            Self::Syntax { span, .. }
            | Self::InvalidLiteral { span, .. }
            | Self::InvalidOperand { span, .. }
            | Self::DuplicateLabel { span, .. }
            | Self::UnresolvedLabel { span, .. } => *span,
        }
    }
}

// Runtime faults

/// Fatal condition raised while executing a record. Execution must not continue.
///
/// A clean `hcf` is not a fault, see [`crate::Step::Halted`].
#[derive(Debug, Error, Diagnostic, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("Tried to write to read-only memory at {addr:#08x} (pc {pc:#08x})")]
    #[diagnostic(
        code(runtime::memory_protection),
        help("only addresses from 0x200000 upwards are writable")
    )]
    MemoryProtection { addr: u32, pc: u32 },

    #[error("Unknown opcode {opcode:#04x} at {pc:#08x}")]
    #[diagnostic(code(runtime::unknown_opcode))]
    UnknownOpcode { opcode: u8, pc: u32 },

    #[error("Division by zero at {pc:#08x}")]
    #[diagnostic(code(runtime::arithmetic), help("`div` divides reg0 by reg1"))]
    Arithmetic { pc: u32 },

    #[error("Register index {index} out of range at {pc:#08x}")]
    #[diagnostic(code(runtime::invalid_register), help("registers range from 0 to 15"))]
    InvalidRegister { index: u8, pc: u32 },

    #[error("Size class {size:#04x} is not valid for `{mnemonic}` at {pc:#08x}")]
    #[diagnostic(code(runtime::invalid_size))]
    InvalidSize {
        size: u8,
        mnemonic: &'static str,
        pc: u32,
    },

    #[error("Address {addr:#08x} is outside of memory (pc {pc:#08x})")]
    #[diagnostic(
        code(runtime::address_out_of_range),
        help("addresses must be below 0x280000")
    )]
    AddressOutOfRange { addr: u32, pc: u32 },

    #[error("Jump target {target:#08x} is not on a record boundary (pc {pc:#08x})")]
    #[diagnostic(code(runtime::misaligned_jump))]
    MisalignedJump { target: u32, pc: u32 },
}

impl Fault {
    /// Address of the record that raised the fault.
    pub fn pc(&self) -> u32 {
        match *self {
            Self::MemoryProtection { pc, .. }
            | Self::UnknownOpcode { pc, .. }
            | Self::Arithmetic { pc }
            | Self::InvalidRegister { pc, .. }
            | Self::InvalidSize { pc, .. }
            | Self::AddressOutOfRange { pc, .. }
            | Self::MisalignedJump { pc, .. } => pc,
        }
    }
}

// Image errors

/// Raised when a binary image cannot be loaded into ROM.
#[derive(Debug, Error, Diagnostic, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image of {len} bytes does not fit in ROM")]
    #[diagnostic(code(image::too_large), help("ROM holds 2 MiB of records"))]
    TooLarge { len: usize },

    #[error("Image of {len} bytes is not aligned to 10 byte records")]
    #[diagnostic(
        code(image::misaligned),
        help("make sure the file was produced by `nova compile`")
    )]
    Misaligned { len: usize },
}
