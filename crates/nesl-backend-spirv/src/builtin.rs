//! Structural interning of built-in types and constants.
//!
//! Every entry is keyed by its opcode plus operand words (minus the result
//! id) and lands in the shared type section exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use nesl_backend_core::BackendError;
use spirv::{Op, StorageClass};

use crate::generator::SpirvGenerator;
use crate::id::{IdAllocator, SpirvId};
use crate::types::{Shape, SpirvType};

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
struct Key {
    op: Op,
    result_type: Option<SpirvId>,
    operands: Vec<u32>,
}

/// The module's type/constant section with its interning table.
#[derive(Debug, Default)]
pub struct TypeSection {
    section: Mutex<SpirvGenerator>,
    interned: RwLock<HashMap<Key, SpirvId>>,
}

impl TypeSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of a structurally equal entry, emitting it on first use.
    ///
    /// Hits only take the read lock. Misses serialize on the section lock,
    /// which also covers id allocation so declarations appear in id order.
    pub fn intern(
        &self,
        ids: &IdAllocator,
        op: Op,
        result_type: Option<SpirvId>,
        operands: &[u32],
    ) -> SpirvId {
        let key = Key {
            op,
            result_type,
            operands: operands.to_vec(),
        };
        if let Some(&id) = self
            .interned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return id;
        }

        let mut section = self.section.lock().unwrap_or_else(PoisonError::into_inner);
        let mut interned = self.interned.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(&id) = interned.get(&key) {
            return id;
        }
        let id = ids.next_id();
        emit(&mut section, op, result_type, id, operands);
        interned.insert(key, id);
        id
    }

    /// Emits an entry that must stay distinct from structurally equal ones.
    pub fn declare(&self, ids: &IdAllocator, op: Op, operands: &[u32]) -> SpirvId {
        let mut section = self.section.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ids.next_id();
        emit(&mut section, op, None, id, operands);
        id
    }

    pub fn len(&self) -> usize {
        self.interned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> SpirvGenerator {
        self.section
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn void(&self, ids: &IdAllocator) -> SpirvType {
        SpirvType {
            id: self.intern(ids, Op::TypeVoid, None, &[]),
            name: "void".into(),
            shape: Shape::Void,
        }
    }

    pub fn bool(&self, ids: &IdAllocator) -> SpirvType {
        SpirvType {
            id: self.intern(ids, Op::TypeBool, None, &[]),
            name: "bool".into(),
            shape: Shape::Bool,
        }
    }

    pub fn int(&self, ids: &IdAllocator, width: u32, signed: bool) -> SpirvType {
        SpirvType {
            id: self.intern(ids, Op::TypeInt, None, &[width, u32::from(signed)]),
            name: format!("{}{width}", if signed { "i" } else { "u" }).into(),
            shape: Shape::Int { width, signed },
        }
    }

    pub fn float(&self, ids: &IdAllocator, width: u32) -> SpirvType {
        SpirvType {
            id: self.intern(ids, Op::TypeFloat, None, &[width]),
            name: format!("f{width}").into(),
            shape: Shape::Float { width },
        }
    }

    pub fn vector(&self, ids: &IdAllocator, component: SpirvType, count: u32) -> SpirvType {
        SpirvType {
            id: self.intern(ids, Op::TypeVector, None, &[component.id.raw(), count]),
            name: format!("vec{count}<{}>", component.name).into(),
            shape: Shape::Vector {
                component: Arc::new(component),
                count,
            },
        }
    }

    pub fn function_pointer(&self, ids: &IdAllocator, pointee: &SpirvType) -> SpirvId {
        self.intern(
            ids,
            Op::TypePointer,
            None,
            &[StorageClass::Function as u32, pointee.id.raw()],
        )
    }

    pub fn function_type(
        &self,
        ids: &IdAllocator,
        return_type: &SpirvType,
        parameters: &[SpirvType],
    ) -> SpirvId {
        let operands: Vec<u32> = std::iter::once(return_type.id.raw())
            .chain(parameters.iter().map(|p| p.id.raw()))
            .collect();
        self.intern(ids, Op::TypeFunction, None, &operands)
    }

    /// A 32-bit scalar constant of type `ty`, given by its bit pattern.
    pub fn constant(&self, ids: &IdAllocator, ty: &SpirvType, bits: u32) -> SpirvId {
        self.intern(ids, Op::Constant, Some(ty.id), &[bits])
    }

    /// Lowers a platform representation name such as `OpTypeFloat 32` or
    /// `OpTypeVector {T} 4`.
    ///
    /// `argument` resolves `{Name}` placeholders to already lowered types.
    pub fn by_name(
        &self,
        ids: &IdAllocator,
        name: &str,
        argument: impl FnOnce(&str) -> Result<SpirvType, BackendError>,
    ) -> Result<SpirvType, BackendError> {
        let unsupported = || BackendError::Unsupported(format!("built-in type `{name}`"));
        let tokens: Vec<&str> = name.split_whitespace().collect();
        match tokens.as_slice() {
            ["OpTypeVoid"] => Ok(self.void(ids)),
            ["OpTypeBool"] => Ok(self.bool(ids)),
            ["OpTypeInt", "32", signedness] => {
                let signed = match *signedness {
                    "0" => false,
                    "1" => true,
                    _ => return Err(unsupported()),
                };
                Ok(self.int(ids, 32, signed))
            }
            ["OpTypeFloat", "32"] => Ok(self.float(ids, 32)),
            ["OpTypeVector", component, count] => {
                let count: u32 = count
                    .parse()
                    .ok()
                    .filter(|n| (2..=4).contains(n))
                    .ok_or_else(unsupported)?;
                let parameter = component
                    .strip_prefix('{')
                    .and_then(|c| c.strip_suffix('}'))
                    .ok_or_else(unsupported)?;
                let component = argument(parameter)?;
                if !matches!(
                    component.shape,
                    Shape::Bool | Shape::Int { .. } | Shape::Float { .. }
                ) {
                    return Err(BackendError::Unsupported(format!(
                        "vector of non-scalar type {component}"
                    )));
                }
                Ok(self.vector(ids, component, count))
            }
            _ => Err(unsupported()),
        }
    }
}

fn emit(
    section: &mut SpirvGenerator,
    op: Op,
    result_type: Option<SpirvId>,
    id: SpirvId,
    operands: &[u32],
) {
    let mut words = Vec::with_capacity(operands.len() + 2);
    if let Some(ty) = result_type {
        words.push(ty.raw());
    }
    words.push(id.raw());
    words.extend_from_slice(operands);
    section.emit(op, &words);
}
