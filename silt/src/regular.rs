//! Regular objects: a class edge followed by a fixed number of named slots.
//! The slot count is not stored; it falls out of the allocation size, which
//! is why regular class ids must always have a valid header size tag.

use std::mem::size_of;
use std::ops::Deref;

use crate::header::{EPHEMERON_CID, FIRST_REGULAR_OBJECT_CID};
use crate::object::{HeapObject, ObjectLayout};
use crate::refs::Ref;
use crate::value::Value;

#[repr(C)]
pub(crate) struct RegularObjectLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) klass: Ref,
    pub(crate) slots: [Ref; 0],
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct RegularObject(HeapObject);

impl RegularObject {
    pub fn cast(obj: HeapObject) -> RegularObject {
        debug_assert!(obj.cid() >= FIRST_REGULAR_OBJECT_CID || obj.cid() == EPHEMERON_CID);
        RegularObject(obj)
    }

    fn layout(self) -> *mut RegularObjectLayout {
        self.0.addr() as *mut RegularObjectLayout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    pub fn num_slots(self) -> usize {
        (self.0.heap_size() - size_of::<RegularObjectLayout>()) / size_of::<Ref>()
    }

    pub fn klass(self) -> Value {
        unsafe { (*self.layout()).klass.target() }
    }

    pub fn set_klass(self, value: Value) {
        unsafe { (*self.layout()).klass.update(self.0.value(), value) }
    }

    pub fn init_klass(self, value: Value) {
        unsafe { (*self.layout()).klass.init(self.0.value(), value) }
    }

    pub(crate) fn slot_ref(self, index: usize) -> *mut Ref {
        debug_assert!(index < self.num_slots());
        unsafe { ((*self.layout()).slots.as_mut_ptr()).add(index) }
    }

    pub fn slot(self, index: usize) -> Value {
        unsafe { (*self.slot_ref(index)).target() }
    }

    pub fn set_slot(self, index: usize, value: Value) {
        unsafe { (*self.slot_ref(index)).update(self.0.value(), value) }
    }

    pub fn init_slot(self, index: usize, value: Value) {
        unsafe { (*self.slot_ref(index)).init(self.0.value(), value) }
    }
}

impl Deref for RegularObject {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}
