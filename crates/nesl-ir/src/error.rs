//! Error types for the Nesl IR.

/// Errors that can occur when constructing, instantiating or validating IR.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// `make_generic` was called on a method without generic parameters.
    #[error("method {method} is not generic")]
    NotGeneric { method: String },

    /// `construct` was called on a type without generic parameters.
    #[error("type {ty} is not generic")]
    TypeNotGeneric { ty: String },

    /// A generic method was instantiated while its owner is still generic.
    #[error("unable to construct generic method {method} on unconstructed generic type {owner}")]
    UnconstructedOwner { method: String, owner: String },

    /// The number of type arguments does not match the generic parameters.
    #[error("{item} expects {expected} type argument(s), but {found} were given")]
    ArityMismatch {
        item: String,
        expected: usize,
        found: usize,
    },

    /// A type argument does not satisfy its parameter's constraint set.
    #[error("type argument {argument} does not satisfy constraint `{constraint}` of {parameter}")]
    ConstraintViolation {
        parameter: String,
        argument: String,
        constraint: String,
    },

    /// A still-generic method or type reached a consumer that needs it concrete.
    #[error("{0} is still generic")]
    StillGeneric(String),

    /// A program already declares a type with this full name.
    #[error("duplicate type {0}")]
    DuplicateType(String),

    /// No declaration with the given full name is visible from the program.
    #[error("unknown type {0}")]
    UnknownType(String),

    /// A method reference does not match any declared method.
    #[error("unknown method {name} (index {index}) on {owner}")]
    UnknownMethod {
        owner: String,
        name: String,
        index: usize,
    },

    /// An instruction was built with the wrong number of operands.
    #[error("{opcode} expects {expected} operand(s), found {found}")]
    OperandCount {
        opcode: String,
        expected: String,
        found: usize,
    },

    /// A call chain leads back to a method that is already on the chain.
    #[error("recursive call: {}", .0.join(" -> "))]
    RecursiveCall(Vec<String>),

    /// A struct contains itself by value.
    #[error("recursive layout: {}", .0.join(" -> "))]
    RecursiveLayout(Vec<String>),

    /// A construct-once cell was re-entered by the thread building it.
    #[error("cyclic construction")]
    CyclicConstruction,
}

impl From<crate::cache::Reentrant> for IrError {
    fn from(_: crate::cache::Reentrant) -> Self {
        Self::CyclicConstruction
    }
}
