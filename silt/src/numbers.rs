//! Boxed numeric objects. Medium integers cover the full `i64` range for
//! values that fall outside the tagged small-integer range; floats are plain
//! boxed doubles. Neither carries outgoing edges.

use std::ops::Deref;

use crate::header::{FLOAT64_CID, MEDIUM_INTEGER_CID};
use crate::object::{HeapObject, ObjectLayout};

#[repr(C)]
pub(crate) struct MediumIntegerLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) value: i64,
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct MediumInteger(HeapObject);

impl MediumInteger {
    pub fn cast(obj: HeapObject) -> MediumInteger {
        debug_assert!(obj.cid() == MEDIUM_INTEGER_CID);
        MediumInteger(obj)
    }

    fn layout(self) -> *mut MediumIntegerLayout {
        self.0.addr() as *mut MediumIntegerLayout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    pub fn value(self) -> i64 {
        unsafe { (*self.layout()).value }
    }

    pub fn set_value(self, value: i64) {
        unsafe { (*self.layout()).value = value }
    }
}

impl Deref for MediumInteger {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}

#[repr(C)]
pub(crate) struct Float64Layout {
    pub(crate) base: ObjectLayout,
    pub(crate) value: f64,
}

#[derive(Copy, Clone, PartialEq)]
pub struct Float64(HeapObject);

impl Float64 {
    pub fn cast(obj: HeapObject) -> Float64 {
        debug_assert!(obj.cid() == FLOAT64_CID);
        Float64(obj)
    }

    fn layout(self) -> *mut Float64Layout {
        self.0.addr() as *mut Float64Layout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    pub fn value(self) -> f64 {
        unsafe { (*self.layout()).value }
    }

    pub fn set_value(self, value: f64) {
        unsafe { (*self.layout()).value = value }
    }
}

impl Deref for Float64 {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}
