use std::error::Error;
use std::fmt;

use cellalloc::CellError;

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    BadAllocationRequest,
    OutOfMemory,
    BoundsError,
    StackOverflow,
    NotAnInteger,
}

/// Error type for the fallible edges of the heap API. Allocation itself is
/// infallible from the caller's perspective (it aborts on OOM), so this is
/// reserved for operations a mutator can meaningfully recover from.
#[derive(Debug, PartialEq)]
pub struct HeapError {
    kind: ErrorKind,
}

impl HeapError {
    pub fn new(kind: ErrorKind) -> HeapError {
        HeapError { kind }
    }

    pub fn error_kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::BadAllocationRequest => {
                write!(f, "An invalid memory size allocation was requested!")
            }
            ErrorKind::OutOfMemory => write!(f, "Out of memory!"),
            ErrorKind::BoundsError => write!(f, "Indexing bounds error"),
            ErrorKind::StackOverflow => write!(f, "Mutator stack overflow"),
            ErrorKind::NotAnInteger => write!(f, "Value has no exact integer form"),
        }
    }
}

impl From<CellError> for HeapError {
    fn from(other: CellError) -> HeapError {
        match other {
            CellError::OOM => HeapError::new(ErrorKind::OutOfMemory),
            CellError::BadRequest => HeapError::new(ErrorKind::BadAllocationRequest),
        }
    }
}

impl Error for HeapError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_error_conversion() {
        let e: HeapError = CellError::OOM.into();
        assert_eq!(*e.error_kind(), ErrorKind::OutOfMemory);

        let e: HeapError = CellError::BadRequest.into();
        assert_eq!(*e.error_kind(), ErrorKind::BadAllocationRequest);
    }
}
