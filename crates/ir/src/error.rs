//! Error types for jitkit-ir

use jitkit_memory::MemoryError;
use thiserror::Error;

use crate::ids::TypeId;

/// IR construction and cloning errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("Unknown type t{0}")]
    UnknownType(TypeId),

    #[error("Type t{ty} is not a struct")]
    NotAStruct { ty: TypeId },

    #[error("Literal of type t{ty} needs {expected} bytes, got {actual}")]
    LiteralSize {
        ty: TypeId,
        expected: usize,
        actual: usize,
    },

    #[error("Field {name} at bit {offset_bits} does not fit struct t{owner} of {size_bits} bits")]
    FieldOutOfBounds {
        owner: TypeId,
        name: String,
        offset_bits: u64,
        size_bits: u64,
    },

    #[error("Struct t{owner} already has a field named {name}")]
    DuplicateField { owner: TypeId, name: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl IrError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownType(_) => "IR:TYPE:UNKNOWN",
            Self::NotAStruct { .. } => "IR:TYPE:NOT_STRUCT",
            Self::LiteralSize { .. } => "IR:LITERAL:SIZE",
            Self::FieldOutOfBounds { .. } => "IR:FIELD:BOUNDS",
            Self::DuplicateField { .. } => "IR:FIELD:DUPLICATE",
            Self::Memory(err) => err.code(),
        }
    }
}

/// Result type for IR operations
pub type IrResult<T> = Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_errors_keep_their_code() {
        let err: IrError = MemoryError::out_of_memory(64).into();
        assert_eq!(err.code(), "MEM:ALLOC:OOM");
        assert_eq!(err.to_string(), MemoryError::out_of_memory(64).to_string());
    }

    #[test]
    fn display_uses_id_prefixes() {
        let err = IrError::LiteralSize {
            ty: TypeId::new(3),
            expected: 4,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Literal of type t3 needs 4 bytes, got 2");
    }
}
