//! Behaviors: the class-side object family. Classes, metaclasses and mixins
//! are ordinary regular objects; these views name their slots. A behavior's
//! `id` slot holds the small-integer class id its instances carry, and its
//! `format` slot the instance slot count.

use std::mem::size_of;
use std::ops::Deref;

use crate::object::HeapObject;
use crate::refs::Ref;
use crate::regular::RegularObject;
use crate::value::Value;

const SUPERCLASS_SLOT: usize = 0;
const METHODS_SLOT: usize = 1;
const ENCLOSING_OBJECT_SLOT: usize = 2;
const MIXIN_SLOT: usize = 3;
const CLASS_ID_SLOT: usize = 4;
const FORMAT_SLOT: usize = 5;

// class-only
const NAME_SLOT: usize = 6;
const SUBCLASSES_SLOT: usize = 7;

// metaclass-only
const THIS_CLASS_SLOT: usize = 6;

/// Slot counts for the two behavior shapes
pub const CLASS_NUM_SLOTS: usize = 8;
pub const METACLASS_NUM_SLOTS: usize = 7;

// mixin slots
const MIXIN_NAME_SLOT: usize = 0;
const MIXIN_METHODS_SLOT: usize = 1;
const ENCLOSING_MIXIN_SLOT: usize = 2;

pub const MIXIN_NUM_SLOTS: usize = 3;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Behavior(RegularObject);

impl Behavior {
    pub fn cast(obj: HeapObject) -> Behavior {
        Behavior(RegularObject::cast(obj))
    }

    pub fn object(self) -> HeapObject {
        self.0.object()
    }

    pub fn regular(self) -> RegularObject {
        self.0
    }

    /// A behavior is a regular object with either the class or the
    /// metaclass slot complement.
    pub fn assert_could_be_behavior(self) {
        debug_assert!(self.object().value().is_heap_object());
        let heap_slots = self.object().heap_size() / size_of::<Ref>();
        debug_assert!(heap_slots == 9 || heap_slots == 10);
    }

    pub fn superclass(self) -> Value {
        self.0.slot(SUPERCLASS_SLOT)
    }

    pub fn init_superclass(self, value: Value) {
        self.0.init_slot(SUPERCLASS_SLOT, value)
    }

    pub fn methods(self) -> Value {
        self.0.slot(METHODS_SLOT)
    }

    pub fn init_methods(self, value: Value) {
        self.0.init_slot(METHODS_SLOT, value)
    }

    pub fn set_methods(self, value: Value) {
        self.0.set_slot(METHODS_SLOT, value)
    }

    pub fn enclosing_object(self) -> Value {
        self.0.slot(ENCLOSING_OBJECT_SLOT)
    }

    pub fn init_enclosing_object(self, value: Value) {
        self.0.init_slot(ENCLOSING_OBJECT_SLOT, value)
    }

    pub fn mixin(self) -> Value {
        self.0.slot(MIXIN_SLOT)
    }

    pub fn init_mixin(self, value: Value) {
        self.0.init_slot(MIXIN_SLOT, value)
    }

    pub fn id(self) -> Value {
        self.0.slot(CLASS_ID_SLOT)
    }

    pub fn set_id(self, value: Value) {
        self.0.set_slot(CLASS_ID_SLOT, value)
    }

    pub fn init_id(self, value: Value) {
        self.0.init_slot(CLASS_ID_SLOT, value)
    }

    pub fn format(self) -> Value {
        self.0.slot(FORMAT_SLOT)
    }

    pub fn init_format(self, value: Value) {
        self.0.init_slot(FORMAT_SLOT, value)
    }
}

impl Deref for Behavior {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        self.0.deref()
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Class(Behavior);

impl Class {
    pub fn cast(obj: HeapObject) -> Class {
        Class(Behavior::cast(obj))
    }

    pub fn name(self) -> Value {
        (self.0).0.slot(NAME_SLOT)
    }

    pub fn init_name(self, value: Value) {
        (self.0).0.init_slot(NAME_SLOT, value)
    }

    pub fn subclasses(self) -> Value {
        (self.0).0.slot(SUBCLASSES_SLOT)
    }

    pub fn init_subclasses(self, value: Value) {
        (self.0).0.init_slot(SUBCLASSES_SLOT, value)
    }
}

impl Deref for Class {
    type Target = Behavior;

    fn deref(&self) -> &Behavior {
        &self.0
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Metaclass(Behavior);

impl Metaclass {
    pub fn cast(obj: HeapObject) -> Metaclass {
        Metaclass(Behavior::cast(obj))
    }

    pub fn this_class(self) -> Value {
        (self.0).0.slot(THIS_CLASS_SLOT)
    }

    pub fn init_this_class(self, value: Value) {
        (self.0).0.init_slot(THIS_CLASS_SLOT, value)
    }
}

impl Deref for Metaclass {
    type Target = Behavior;

    fn deref(&self) -> &Behavior {
        &self.0
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct AbstractMixin(RegularObject);

impl AbstractMixin {
    pub fn cast(obj: HeapObject) -> AbstractMixin {
        AbstractMixin(RegularObject::cast(obj))
    }

    pub fn name(self) -> Value {
        self.0.slot(MIXIN_NAME_SLOT)
    }

    pub fn init_name(self, value: Value) {
        self.0.init_slot(MIXIN_NAME_SLOT, value)
    }

    pub fn methods(self) -> Value {
        self.0.slot(MIXIN_METHODS_SLOT)
    }

    pub fn init_methods(self, value: Value) {
        self.0.init_slot(MIXIN_METHODS_SLOT, value)
    }

    pub fn enclosing_mixin(self) -> Value {
        self.0.slot(ENCLOSING_MIXIN_SLOT)
    }

    pub fn init_enclosing_mixin(self, value: Value) {
        self.0.init_slot(ENCLOSING_MIXIN_SLOT, value)
    }
}

impl Deref for AbstractMixin {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        self.0.deref()
    }
}
