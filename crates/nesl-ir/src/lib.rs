//! Nesl intermediate representation.
//!
//! A declaration graph of types and methods whose bodies are flat
//! instruction lists over numbered local variables. Generic types and
//! methods are instantiated on demand; every instantiation is built once
//! and shared by all callers.

pub mod cache;
mod display;
mod error;
mod instr;
mod method;
mod program;
mod types;
mod validate;

pub use cache::{OnceMap, Reentrant};
pub use display::dump_program;
pub use error::IrError;
pub use instr::{Arity, Instruction, MethodRef, OpCode, Operand, VarId};
pub use method::{Method, MethodDecl, MethodInstance, PartialMethod};
pub use program::{LookupOrder, Program};
pub use types::{
    Attribute, Constraint, Field, GenericParam, PlatformRepresentation, Substitution, Ty,
    TypeDecl, TypeInstance,
};
pub use validate::validate_program;
