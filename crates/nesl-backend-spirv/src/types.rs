//! Lowered types.

use std::fmt;
use std::sync::Arc;

use crate::id::SpirvId;

/// How a lowered type behaves under the instruction lowering.
#[derive(Clone, Debug)]
pub enum Shape {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Arc<SpirvType>, count: u32 },
    Struct { fields: Arc<[SpirvType]> },
}

/// A type declared in the module's type section.
///
/// Two lowered types are the same type exactly when their ids are equal;
/// the name only serves diagnostics.
#[derive(Clone, Debug)]
pub struct SpirvType {
    pub id: SpirvId,
    pub name: Arc<str>,
    pub shape: Shape,
}

impl SpirvType {
    pub fn is_void(&self) -> bool {
        matches!(self.shape, Shape::Void)
    }

    /// The scalar shape arithmetic dispatches on: the component for vectors,
    /// the type itself otherwise.
    pub fn scalar(&self) -> &Shape {
        match &self.shape {
            Shape::Vector { component, .. } => &component.shape,
            shape => shape,
        }
    }
}

impl PartialEq for SpirvType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SpirvType {}

impl fmt::Display for SpirvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
