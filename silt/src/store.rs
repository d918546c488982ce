//! The object store, the root singleton through which the interpreter
//! reaches everything it needs by name, and the `Message` shape used to
//! reify message sends. Both are regular objects viewed through fixed slot
//! indices.

use std::ops::Deref;

use crate::object::HeapObject;
use crate::regular::RegularObject;
use crate::value::Value;

const MESSAGE_SELECTOR_SLOT: usize = 0;
const MESSAGE_ARGUMENTS_SLOT: usize = 1;

/// Instance slot count recorded in the Message behavior's format
pub const MESSAGE_NUM_SLOTS: usize = 2;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Message(RegularObject);

impl Message {
    pub fn cast(obj: HeapObject) -> Message {
        Message(RegularObject::cast(obj))
    }

    pub fn object(self) -> HeapObject {
        self.0.object()
    }

    pub fn selector(self) -> Value {
        self.0.slot(MESSAGE_SELECTOR_SLOT)
    }

    pub fn set_selector(self, value: Value) {
        self.0.set_slot(MESSAGE_SELECTOR_SLOT, value)
    }

    pub fn init_selector(self, value: Value) {
        self.0.init_slot(MESSAGE_SELECTOR_SLOT, value)
    }

    pub fn arguments(self) -> Value {
        self.0.slot(MESSAGE_ARGUMENTS_SLOT)
    }

    pub fn set_arguments(self, value: Value) {
        self.0.set_slot(MESSAGE_ARGUMENTS_SLOT, value)
    }

    pub fn init_arguments(self, value: Value) {
        self.0.init_slot(MESSAGE_ARGUMENTS_SLOT, value)
    }
}

impl Deref for Message {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        self.0.deref()
    }
}

const NIL_SLOT: usize = 0;
const FALSE_SLOT: usize = 1;
const TRUE_SLOT: usize = 2;
const SCHEDULER_SLOT: usize = 3;
const COMMON_SELECTORS_SLOT: usize = 4;
const DOES_NOT_UNDERSTAND_SLOT: usize = 5;
const NON_BOOLEAN_RECEIVER_SLOT: usize = 6;
const CANNOT_RETURN_SLOT: usize = 7;
const ABOUT_TO_RETURN_THROUGH_SLOT: usize = 8;
const UNUSED_BYTECODE_SLOT: usize = 9;
const DISPATCH_MESSAGE_SLOT: usize = 10;
const DISPATCH_SIGNAL_SLOT: usize = 11;

const ARRAY_CLS_SLOT: usize = 12;
const BYTE_ARRAY_CLS_SLOT: usize = 13;
const STRING_CLS_SLOT: usize = 14;
const CLOSURE_CLS_SLOT: usize = 15;
const EPHEMERON_CLS_SLOT: usize = 16;
const FLOAT64_CLS_SLOT: usize = 17;
const LARGE_INTEGER_CLS_SLOT: usize = 18;
const MEDIUM_INTEGER_CLS_SLOT: usize = 19;
const MESSAGE_CLS_SLOT: usize = 20;
const SMALL_INTEGER_CLS_SLOT: usize = 21;
const WEAK_ARRAY_CLS_SLOT: usize = 22;
const ACTIVATION_CLS_SLOT: usize = 23;
const METHOD_CLS_SLOT: usize = 24;

pub const OBJECT_STORE_NUM_SLOTS: usize = 25;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ObjectStore(RegularObject);

macro_rules! store_slot {
    ($get:ident, $init:ident, $slot:expr) => {
        pub fn $get(self) -> Value {
            self.0.slot($slot)
        }

        pub fn $init(self, value: Value) {
            self.0.init_slot($slot, value)
        }
    };
}

impl ObjectStore {
    pub fn cast(obj: HeapObject) -> ObjectStore {
        ObjectStore(RegularObject::cast(obj))
    }

    pub fn object(self) -> HeapObject {
        self.0.object()
    }

    store_slot!(nil_obj, init_nil_obj, NIL_SLOT);
    store_slot!(false_obj, init_false_obj, FALSE_SLOT);
    store_slot!(true_obj, init_true_obj, TRUE_SLOT);
    store_slot!(scheduler, init_scheduler, SCHEDULER_SLOT);
    store_slot!(common_selectors, init_common_selectors, COMMON_SELECTORS_SLOT);
    store_slot!(
        does_not_understand,
        init_does_not_understand,
        DOES_NOT_UNDERSTAND_SLOT
    );
    store_slot!(
        non_boolean_receiver,
        init_non_boolean_receiver,
        NON_BOOLEAN_RECEIVER_SLOT
    );
    store_slot!(cannot_return, init_cannot_return, CANNOT_RETURN_SLOT);
    store_slot!(
        about_to_return_through,
        init_about_to_return_through,
        ABOUT_TO_RETURN_THROUGH_SLOT
    );
    store_slot!(unused_bytecode, init_unused_bytecode, UNUSED_BYTECODE_SLOT);
    store_slot!(dispatch_message, init_dispatch_message, DISPATCH_MESSAGE_SLOT);
    store_slot!(dispatch_signal, init_dispatch_signal, DISPATCH_SIGNAL_SLOT);

    store_slot!(array_cls, init_array_cls, ARRAY_CLS_SLOT);
    store_slot!(byte_array_cls, init_byte_array_cls, BYTE_ARRAY_CLS_SLOT);
    store_slot!(string_cls, init_string_cls, STRING_CLS_SLOT);
    store_slot!(closure_cls, init_closure_cls, CLOSURE_CLS_SLOT);
    store_slot!(ephemeron_cls, init_ephemeron_cls, EPHEMERON_CLS_SLOT);
    store_slot!(float64_cls, init_float64_cls, FLOAT64_CLS_SLOT);
    store_slot!(large_integer_cls, init_large_integer_cls, LARGE_INTEGER_CLS_SLOT);
    store_slot!(
        medium_integer_cls,
        init_medium_integer_cls,
        MEDIUM_INTEGER_CLS_SLOT
    );
    store_slot!(message_cls, init_message_cls, MESSAGE_CLS_SLOT);
    store_slot!(small_integer_cls, init_small_integer_cls, SMALL_INTEGER_CLS_SLOT);
    store_slot!(weak_array_cls, init_weak_array_cls, WEAK_ARRAY_CLS_SLOT);
    store_slot!(activation_cls, init_activation_cls, ACTIVATION_CLS_SLOT);
    store_slot!(method_cls, init_method_cls, METHOD_CLS_SLOT);
}

impl Deref for ObjectStore {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        self.0.deref()
    }
}
