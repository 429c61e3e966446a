use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::error::AsmError;
use crate::isa::{self, Record, RECORD_SIZE};
use crate::span::Span;

// Symbol table of label -> byte offset in the image
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Which 4 byte field of a record a patch overwrites.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Field {
    Source,
    Dest,
}

impl Field {
    /// Offset of the field inside an encoded record.
    pub fn offset(self) -> usize {
        match self {
            Field::Source => 2,
            Field::Dest => 6,
        }
    }
}

/// Reference to a label that is filled in once every block has been seen.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Patch {
    /// Index of the record holding the reference
    pub record: usize,
    pub field: Field,
    pub label: String,
    /// Where the label was referenced, for diagnostics
    pub span: Span,
}

impl Patch {
    /// Byte offset of the patched field in the final image.
    pub fn image_offset(&self) -> usize {
        self.record * RECORD_SIZE + self.field.offset()
    }
}

/// Assembly intermediate representation: records laid out in image order, plus the
/// symbol and patch tables needed to resolve label references.
#[derive(Debug, Default)]
pub struct Air {
    records: Vec<Record>,
    symbols: FxMap<String, u32>,
    patches: Vec<Patch>,
}

impl Air {
    pub fn new() -> Self {
        Air::default()
    }

    /// Byte offset the next record will be emitted at.
    pub fn next_offset(&self) -> u32 {
        (self.records.len() * RECORD_SIZE) as u32
    }

    /// Bind a label to the current offset. Error if defined twice.
    pub fn define_label(&mut self, name: &str, span: Span) -> Result<(), AsmError> {
        if self.symbols.contains_key(name) {
            return Err(AsmError::DuplicateLabel {
                name: name.to_string(),
                span: span.into(),
            });
        }
        let offset = self.next_offset();
        self.symbols.insert(name.to_string(), offset);
        Ok(())
    }

    pub fn add_record(&mut self, record: Record) {
        self.records.push(record)
    }

    /// Add a record with one field left open for `label`.
    pub fn add_record_patched(&mut self, record: Record, field: Field, label: &str, span: Span) {
        self.patches.push(Patch {
            record: self.records.len(),
            field,
            label: label.to_string(),
            span,
        });
        self.records.push(record);
    }

    pub fn label_offset(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, u32)> {
        self.symbols.iter().map(|(name, offs)| (name.as_str(), *offs))
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn get(&self, idx: usize) -> &Record {
        &self.records[idx]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Use labels filled during parsing to resolve every patch, in source order.
    /// Consumes the AIR; on error nothing is returned.
    pub fn backpatch(mut self) -> Result<Vec<Record>, AsmError> {
        for patch in &self.patches {
            let Some(&offset) = self.symbols.get(&patch.label) else {
                return Err(AsmError::UnresolvedLabel {
                    name: patch.label.clone(),
                    span: patch.span.into(),
                });
            };
            let record = &mut self.records[patch.record];
            match patch.field {
                Field::Source => record.source = offset,
                Field::Dest => record.dest = offset,
            }
        }
        Ok(self.records)
    }

    /// Resolve labels and encode the final image.
    pub fn emit(self) -> Result<Vec<u8>, AsmError> {
        Ok(isa::emit(&self.backpatch()?))
    }
}
