//! Byte-shaped objects: raw byte arrays and strings. Both share the same
//! layout, a small-integer length word followed by the bytes, and carry no
//! outgoing edges. Strings additionally use the canonical header bit, set on
//! interned symbols; their hash rides in the hash half of the header word
//! like any other identity hash.

use std::ops::Deref;
use std::slice;

use crate::header::{BYTE_ARRAY_CID, STRING_CID};
use crate::object::{HeapObject, ObjectLayout};
use crate::value::Value;

#[repr(C)]
pub(crate) struct BytesLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) size: Value,
}

/// Common accessors for the two byte-shaped class ids
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Bytes(HeapObject);

impl Bytes {
    pub fn cast(obj: HeapObject) -> Bytes {
        debug_assert!(obj.cid() == BYTE_ARRAY_CID || obj.cid() == STRING_CID);
        Bytes(obj)
    }

    /// Cast without inspecting the class id; used while the header itself is
    /// being interrogated for size recovery.
    pub(crate) fn cast_unchecked(obj: HeapObject) -> Bytes {
        Bytes(obj)
    }

    fn layout(self) -> *mut BytesLayout {
        self.0.addr() as *mut BytesLayout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    pub fn size(self) -> Value {
        unsafe { (*self.layout()).size }
    }

    pub(crate) fn init_size(self, size: Value) {
        debug_assert!(size.is_small_integer());
        unsafe { (*self.layout()).size = size }
    }

    pub fn length(self) -> usize {
        self.size().small_value() as usize
    }

    fn element_addr(self, index: usize) -> *mut u8 {
        unsafe { (self.layout() as *mut u8).add(std::mem::size_of::<BytesLayout>() + index) }
    }

    pub fn byte_at(self, index: usize) -> u8 {
        debug_assert!(index < self.length());
        unsafe { *self.element_addr(index) }
    }

    pub fn set_byte_at(self, index: usize, value: u8) {
        debug_assert!(index < self.length());
        unsafe { *self.element_addr(index) = value }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.element_addr(0), self.length()) }
    }

    pub fn copy_from_slice(self, bytes: &[u8]) {
        debug_assert!(bytes.len() == self.length());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.element_addr(0), bytes.len())
        }
    }
}

impl Deref for Bytes {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ByteArray(Bytes);

impl ByteArray {
    pub fn cast(obj: HeapObject) -> ByteArray {
        debug_assert!(obj.cid() == BYTE_ARRAY_CID);
        ByteArray(Bytes(obj))
    }
}

impl Deref for ByteArray {
    type Target = Bytes;

    fn deref(&self) -> &Bytes {
        &self.0
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ByteString(Bytes);

impl ByteString {
    pub fn cast(obj: HeapObject) -> ByteString {
        debug_assert!(obj.cid() == STRING_CID);
        ByteString(Bytes(obj))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.as_slice()).unwrap_or("<invalid utf-8>")
    }
}

impl Deref for ByteString {
    type Target = Bytes;

    fn deref(&self) -> &Bytes {
        &self.0
    }
}
