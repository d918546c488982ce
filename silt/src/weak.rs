//! Weakly-referencing objects.
//!
//! A weak array's outgoing edges participate in incoming lists like any
//! other edge, but the collector classifies them by the source's class id
//! and excludes them from reachability; when the sole remaining referents
//! die, the surviving slots are overwritten with nil.
//!
//! An ephemeron is a key/value/finalizer triple. Its key edge is likewise
//! excluded from the key's reachability; when the key proves unreachable
//! through every other path, the collector nils the key and value and hands
//! the finalizer to the interpreter's signal queue.

use std::ops::Deref;

use crate::header::{EPHEMERON_CID, WEAK_ARRAY_CID};
use crate::object::{HeapObject, ObjectLayout};
use crate::refs::Ref;
use crate::value::Value;

#[repr(C)]
pub(crate) struct WeakArrayLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) size: Value,
    pub(crate) elements: [Ref; 0],
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct WeakArray(HeapObject);

impl WeakArray {
    pub fn cast(obj: HeapObject) -> WeakArray {
        debug_assert!(obj.cid() == WEAK_ARRAY_CID);
        WeakArray(obj)
    }

    fn layout(self) -> *mut WeakArrayLayout {
        self.0.addr() as *mut WeakArrayLayout
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

impl Deref for WeakArray {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}

#[repr(C)]
pub(crate) struct EphemeronLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) klass: Ref,
    pub(crate) key: Ref,
    pub(crate) value: Ref,
    pub(crate) finalizer: Ref,
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Ephemeron(HeapObject);

impl Ephemeron {
    pub fn cast(obj: HeapObject) -> Ephemeron {
        debug_assert!(obj.cid() == EPHEMERON_CID);
        Ephemeron(obj)
    }

    fn layout(self) -> *mut EphemeronLayout {
        self.0.addr() as *mut EphemeronLayout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    /// Address of the key edge; the collector compares incoming edges
    /// against this to recognize ephemeron-key references.
    pub(crate) fn key_ref(self) -> *mut Ref {
        unsafe { &mut (*self.layout()).key as *mut Ref }
    }

    pub(crate) fn value_ref(self) -> *mut Ref {
        unsafe { &mut (*self.layout()).value as *mut Ref }
    }

    pub fn key(self) -> Value {
        unsafe { (*self.layout()).key.target() }
    }

    pub fn set_key(self, value: Value) {
        unsafe { (*self.layout()).key.update(self.0.value(), value) }
    }

    pub fn init_key(self, value: Value) {
        unsafe { (*self.layout()).key.init(self.0.value(), value) }
    }

    pub fn value(self) -> Value {
        unsafe { (*self.layout()).value.target() }
    }

    pub fn set_value(self, value: Value) {
        unsafe { (*self.layout()).value.update(self.0.value(), value) }
    }

    pub fn init_value(self, value: Value) {
        unsafe { (*self.layout()).value.init(self.0.value(), value) }
    }

    pub fn finalizer(self) -> Value {
        unsafe { (*self.layout()).finalizer.target() }
    }

    pub fn set_finalizer(self, value: Value) {
        unsafe { (*self.layout()).finalizer.update(self.0.value(), value) }
    }

    pub fn init_finalizer(self, value: Value) {
        unsafe { (*self.layout()).finalizer.init(self.0.value(), value) }
    }
}

impl Deref for Ephemeron {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}
