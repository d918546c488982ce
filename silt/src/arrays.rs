//! Fixed-length object arrays. The length is a plain small-integer word (it
//! is not an edge) followed by one `Ref` per element.

use std::ops::Deref;

use crate::header::ARRAY_CID;
use crate::object::{HeapObject, ObjectLayout};
use crate::refs::Ref;
use crate::value::Value;

#[repr(C)]
pub(crate) struct ArrayLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) size: Value,
    pub(crate) elements: [Ref; 0],
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Array(HeapObject);

impl Array {
    pub fn cast(obj: HeapObject) -> Array {
        debug_assert!(obj.cid() == ARRAY_CID);
        Array(obj)
    }

    fn layout(self) -> *mut ArrayLayout {
        self.0.addr() as *mut ArrayLayout
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

    pub(crate) fn element_ref(self, index: usize) -> *mut Ref {
        debug_assert!(index < self.length());
        unsafe { ((*self.layout()).elements.as_mut_ptr()).add(index) }
    }

    pub fn element(self, index: usize) -> Value {
        unsafe { (*self.element_ref(index)).target() }
    }

    pub fn set_element(self, index: usize, value: Value) {
        unsafe { (*self.element_ref(index)).update(self.0.value(), value) }
    }

    pub fn init_element(self, index: usize, value: Value) {
        unsafe { (*self.element_ref(index)).init(self.0.value(), value) }
    }
}

impl Deref for Array {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}
