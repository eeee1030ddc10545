//! Word-level instruction emitter.

use nesl_backend_core::BackendError;
use spirv::Op;

use crate::id::SpirvId;

/// An append-only stream of SPIR-V words.
///
/// An instruction whose word count does not fit in 16 bits is not written;
/// the first such instruction is kept and reported by [`check`](Self::check).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpirvGenerator {
    words: Vec<u32>,
    oversized: Option<(Op, usize)>,
}

impl SpirvGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one instruction: the `wordcount << 16 | opcode` word
    /// followed by its operands.
    pub fn emit(&mut self, op: Op, operands: &[u32]) {
        let count = operands.len() + 1;
        let Ok(packed) = u16::try_from(count) else {
            self.oversized.get_or_insert((op, count));
            return;
        };
        self.words.push(u32::from(packed) << 16 | op as u32);
        self.words.extend_from_slice(operands);
    }

    /// Appends an instruction whose operands start with result ids.
    pub fn emit_ids(&mut self, op: Op, ids: &[SpirvId], literals: &[u32]) {
        let operands: Vec<u32> = ids
            .iter()
            .map(|id| id.raw())
            .chain(literals.iter().copied())
            .collect();
        self.emit(op, &operands);
    }

    /// Appends a raw word, e.g. a header field.
    pub fn word(&mut self, word: u32) {
        self.words.push(word);
    }

    pub fn extend(&mut self, other: &SpirvGenerator) {
        self.words.extend_from_slice(&other.words);
        self.oversized = self.oversized.or(other.oversized);
    }

    /// Fails if any instruction was too long to encode.
    pub fn check(&self) -> Result<(), BackendError> {
        match self.oversized {
            Some((op, count)) => Err(BackendError::Unsupported(format!(
                "Op{op:?} needs {count} words, more than the {} an instruction can hold",
                u16::MAX
            ))),
            None => Ok(()),
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Serializes the words big-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }
}

/// Encodes a literal string: UTF-8, nul-terminated, padded to a word
/// boundary, first byte in the lowest-order bits of each word.
pub fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
