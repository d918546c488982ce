//! Object model and reachability-based garbage collector for a small
//! Smalltalk-family virtual machine.
//!
//! The heap keeps a doubly-linked list of *incoming* edges on every object,
//! so reclamation reasons backwards from a random sample instead of tracing
//! forward from roots, and `become` can re-identify objects by rewriting
//! their incoming edges in place.

mod activation;
mod arrays;
mod behavior;
mod bignum;
mod bytes;
mod error;
mod handles;
mod header;
mod heap;
mod interp;
mod mutator;
mod numbers;
mod object;
mod printer;
mod random;
mod refs;
mod regular;
mod store;
mod value;
mod weak;

pub use crate::activation::{Activation, Closure, Method, MAX_TEMPS};
pub use crate::arrays::Array;
pub use crate::behavior::{AbstractMixin, Behavior, Class, Metaclass};
pub use crate::bignum::{
    to_decimal_string, Digit, DivOperationType, DivResultType, LargeInteger,
};
pub use crate::bytes::{ByteArray, ByteString, Bytes};
pub use crate::error::{ErrorKind, HeapError};
pub use crate::handles::{HandleScope, HANDLES_CAPACITY};
pub use crate::header::{
    ACTIVATION_CID, ARRAY_CID, BYTE_ARRAY_CID, CLOSURE_CID, EPHEMERON_CID,
    FIRST_REGULAR_OBJECT_CID, FLOAT64_CID, LARGE_INTEGER_CID, MEDIUM_INTEGER_CID,
    SMALL_INTEGER_CID, STRING_CID, WEAK_ARRAY_CID,
};
pub use crate::heap::{AllocKind, GcReason, Heap};
pub use crate::interp::Interpreter;
pub use crate::mutator::Mutator;
pub use crate::numbers::{Float64, MediumInteger};
pub use crate::object::{ForwardingCorpse, HeapObject};
pub use crate::printer::{class_of, to_debug_string};
pub use crate::random::Random;
pub use crate::refs::Ref;
pub use crate::regular::RegularObject;
pub use crate::store::{Message, ObjectStore};
pub use crate::value::Value;
pub use crate::weak::{Ephemeron, WeakArray};
