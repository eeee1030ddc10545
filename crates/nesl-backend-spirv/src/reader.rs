//! Reads emitted modules back through `rspirv` for inspection and disassembly.

use rspirv::binary::{Disassemble, ParseState};
use rspirv::dr::{self, Instruction, Operand};
use spirv::Op;

/// Errors raised while reading a module.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("module length {0} is not a multiple of 4")]
    Unaligned(usize),
    #[error("module is shorter than its 5-word header")]
    Truncated,
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("malformed module: {0}")]
    Malformed(#[from] ParseState),
}

/// A loaded module.
#[derive(Clone, Debug)]
pub struct ParsedModule {
    pub header: dr::ModuleHeader,
    pub module: dr::Module,
}

impl ParsedModule {
    /// Parses a module in either byte order.
    pub fn parse(bytes: &[u8]) -> Result<Self, ReadError> {
        if bytes.len() % 4 != 0 {
            return Err(ReadError::Unaligned(bytes.len()));
        }
        if bytes.len() < 20 {
            return Err(ReadError::Truncated);
        }
        let big: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let words = if big[0] == spirv::MAGIC_NUMBER {
            big
        } else if big[0].swap_bytes() == spirv::MAGIC_NUMBER {
            big.into_iter().map(u32::swap_bytes).collect()
        } else {
            return Err(ReadError::BadMagic(big[0]));
        };

        let mut module = dr::load_words(&words)?;
        // The loader rebuilds the header and keeps only version and bound.
        let mut header = module
            .header
            .take()
            .unwrap_or_else(|| dr::ModuleHeader::new(words[3]));
        header.generator = words[2];
        header.reserved_word = words[4];
        module.header = Some(header.clone());
        Ok(Self { header, module })
    }

    /// Every instruction in module order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.module.all_inst_iter()
    }

    pub fn count(&self, op: Op) -> usize {
        self.instructions()
            .filter(|i| i.class.opcode == op)
            .count()
    }

    /// Instructions from the first `OpFunction` to the end.
    pub fn function_section(&self) -> impl Iterator<Item = &Instruction> {
        self.module.functions.iter().flat_map(dr::Function::all_inst_iter)
    }

    pub fn disassemble(&self) -> String {
        self.module.disassemble()
    }
}

/// Ids an instruction uses, not counting its own result.
pub fn referenced_ids(instr: &Instruction) -> Vec<u32> {
    instr
        .result_type
        .into_iter()
        .chain(instr.operands.iter().filter_map(|operand| match *operand {
            Operand::IdRef(id) => Some(id),
            _ => None,
        }))
        .collect()
}

/// Parses and disassembles a module.
pub fn disassemble(bytes: &[u8]) -> Result<String, ReadError> {
    Ok(ParsedModule::parse(bytes)?.disassemble())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{SpirvGenerator, string_words};

    fn module(body: impl FnOnce(&mut SpirvGenerator)) -> Vec<u8> {
        let mut words = SpirvGenerator::new();
        for word in [spirv::MAGIC_NUMBER, 0x0001_0200, 7, 3, 0] {
            words.word(word);
        }
        body(&mut words);
        words.to_bytes()
    }

    #[test]
    fn parses_header_and_instructions() {
        let bytes = module(|g| {
            g.emit(Op::TypeFloat, &[1, 32]);
            g.emit(Op::Constant, &[1, 2, 0x3fc0_0000]);
        });
        let parsed = ParsedModule::parse(&bytes).unwrap();
        assert_eq!(parsed.header.bound, 3);
        assert_eq!(parsed.header.generator, 7);
        assert_eq!(parsed.header.version(), (1, 2));
        assert_eq!(parsed.instructions().count(), 2);

        let constant = parsed.instructions().nth(1).unwrap();
        assert_eq!(constant.result_id, Some(2));
        assert_eq!(constant.operands, vec![Operand::LiteralBit32(0x3fc0_0000)]);
        assert_eq!(referenced_ids(constant), vec![1]);
        assert_eq!(parsed.count(Op::Constant), 1);
    }

    #[test]
    fn accepts_little_endian() {
        let bytes = module(|g| g.emit(Op::TypeVoid, &[1]));
        let swapped: Vec<u8> = bytes
            .chunks_exact(4)
            .flat_map(|c| [c[3], c[2], c[1], c[0]])
            .collect();
        let a = ParsedModule::parse(&swapped).unwrap();
        let b = ParsedModule::parse(&bytes).unwrap();
        assert_eq!(a.header, b.header);
        assert_eq!(a.disassemble(), b.disassemble());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(ParsedModule::parse(&[0; 6]), Err(ReadError::Unaligned(6))));
        assert!(matches!(ParsedModule::parse(&[0; 8]), Err(ReadError::Truncated)));
        assert!(matches!(ParsedModule::parse(&[0; 20]), Err(ReadError::BadMagic(0))));

        let mut bytes = module(|g| g.emit(Op::TypeFloat, &[1, 32]));
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(ParsedModule::parse(&bytes), Err(ReadError::Malformed(_))));
    }

    #[test]
    fn disassembly_marks_ids() {
        let bytes = module(|g| {
            g.emit(Op::TypeVoid, &[1]);
            g.emit(Op::TypeFunction, &[2, 1]);
            g.emit(Op::TypeFloat, &[3, 32]);
            g.emit(Op::Function, &[1, 4, 0, 2]);
            g.emit(Op::Label, &[5]);
            g.emit(Op::Return, &[]);
            g.emit(Op::FunctionEnd, &[]);
        });
        let mut entry = vec![spirv::ExecutionModel::GLCompute as u32, 4];
        entry.extend(string_words("Main"));
        let mut with_entry = module(|g| g.emit(Op::EntryPoint, &entry));
        with_entry.extend_from_slice(&bytes[20..]);

        let text = disassemble(&with_entry).unwrap();
        assert!(text.contains("; Bound: 3"), "{text}");
        assert!(text.contains("OpEntryPoint GLCompute %4 \"Main\""), "{text}");
        assert!(text.contains("%3 = OpTypeFloat 32"), "{text}");
        assert!(text.contains("%4 = OpFunction  %1"), "{text}");
    }
}
