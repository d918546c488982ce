//! Execution-state objects: activations (stack frames), closures, and
//! compiled methods.
//!
//! Activations carry a fixed temp vector; every temp edge is initialized at
//! allocation so the collector can always walk the full span. Methods are
//! regular objects viewed through a fixed slot layout, with the access
//! modifier, primitive index and argument/temp counts packed into one small
//! integer header word.

use std::ops::Deref;

use crate::header::{ACTIVATION_CID, CLOSURE_CID};
use crate::object::{HeapObject, ObjectLayout};
use crate::refs::Ref;
use crate::value::Value;

/// Deepest expression stack an activation can hold
pub const MAX_TEMPS: usize = 35;

#[repr(C)]
pub(crate) struct ActivationLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) sender: Ref,
    pub(crate) bci: Ref,
    pub(crate) method: Ref,
    pub(crate) closure: Ref,
    pub(crate) receiver: Ref,
    pub(crate) stack_depth: Ref,
    pub(crate) temps: [Ref; MAX_TEMPS],
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Activation(HeapObject);

impl Activation {
    pub fn cast(obj: HeapObject) -> Activation {
        debug_assert!(obj.cid() == ACTIVATION_CID);
        Activation(obj)
    }

    fn layout(self) -> *mut ActivationLayout {
        self.0.addr() as *mut ActivationLayout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    pub fn sender(self) -> Value {
        unsafe { (*self.layout()).sender.target() }
    }

    pub fn set_sender(self, value: Value) {
        unsafe { (*self.layout()).sender.update(self.0.value(), value) }
    }

    pub fn bci(self) -> Value {
        unsafe { (*self.layout()).bci.target() }
    }

    pub fn set_bci(self, value: Value) {
        unsafe { (*self.layout()).bci.update(self.0.value(), value) }
    }

    pub fn method(self) -> Value {
        unsafe { (*self.layout()).method.target() }
    }

    pub fn set_method(self, value: Value) {
        unsafe { (*self.layout()).method.update(self.0.value(), value) }
    }

    pub fn closure(self) -> Value {
        unsafe { (*self.layout()).closure.target() }
    }

    pub fn set_closure(self, value: Value) {
        unsafe { (*self.layout()).closure.update(self.0.value(), value) }
    }

    pub fn receiver(self) -> Value {
        unsafe { (*self.layout()).receiver.target() }
    }

    pub fn set_receiver(self, value: Value) {
        unsafe { (*self.layout()).receiver.update(self.0.value(), value) }
    }

    pub fn stack_depth(self) -> usize {
        unsafe { (*self.layout()).stack_depth.target() }.small_value() as usize
    }

    pub fn set_stack_depth(self, depth: usize) {
        unsafe {
            (*self.layout())
                .stack_depth
                .update(self.0.value(), Value::small(depth as isize))
        }
    }

    pub fn temp(self, index: usize) -> Value {
        debug_assert!(index < MAX_TEMPS);
        unsafe { (*self.layout()).temps[index].target() }
    }

    pub fn set_temp(self, index: usize, value: Value) {
        debug_assert!(index < MAX_TEMPS);
        unsafe { (*self.layout()).temps[index].update(self.0.value(), value) }
    }

    /// Drop `drop_count` values off the expression stack and push one
    pub fn pop_n_and_push(self, drop_count: usize, value: Value) {
        debug_assert!(drop_count <= self.stack_depth());
        self.set_stack_depth(self.stack_depth() - drop_count + 1);
        self.set_temp(self.stack_depth() - 1, value);
    }

    pub fn push(self, value: Value) {
        self.pop_n_and_push(0, value);
    }
}

impl Deref for Activation {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}

#[repr(C)]
pub(crate) struct ClosureLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) num_copied: Value,
    pub(crate) defining_activation: Ref,
    pub(crate) initial_bci: Ref,
    pub(crate) num_args: Ref,
    pub(crate) copied: [Ref; 0],
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Closure(HeapObject);

impl Closure {
    pub fn cast(obj: HeapObject) -> Closure {
        debug_assert!(obj.cid() == CLOSURE_CID);
        Closure(obj)
    }

    fn layout(self) -> *mut ClosureLayout {
        self.0.addr() as *mut ClosureLayout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    pub fn num_copied(self) -> usize {
        unsafe { (*self.layout()).num_copied }.small_value() as usize
    }

    pub(crate) fn init_num_copied(self, count: Value) {
        debug_assert!(count.is_small_integer());
        unsafe { (*self.layout()).num_copied = count }
    }

    pub fn defining_activation(self) -> Value {
        unsafe { (*self.layout()).defining_activation.target() }
    }

    pub fn set_defining_activation(self, value: Value) {
        unsafe {
            (*self.layout())
                .defining_activation
                .update(self.0.value(), value)
        }
    }

    pub fn initial_bci(self) -> Value {
        unsafe { (*self.layout()).initial_bci.target() }
    }

    pub fn set_initial_bci(self, value: Value) {
        unsafe { (*self.layout()).initial_bci.update(self.0.value(), value) }
    }

    pub fn num_args(self) -> Value {
        unsafe { (*self.layout()).num_args.target() }
    }

    pub fn set_num_args(self, value: Value) {
        unsafe { (*self.layout()).num_args.update(self.0.value(), value) }
    }

    pub(crate) fn copied_ref(self, index: usize) -> *mut Ref {
        debug_assert!(index < self.num_copied());
        unsafe { ((*self.layout()).copied.as_mut_ptr()).add(index) }
    }

    pub fn copied(self, index: usize) -> Value {
        unsafe { (*self.copied_ref(index)).target() }
    }

    pub fn set_copied(self, index: usize, value: Value) {
        unsafe { (*self.copied_ref(index)).update(self.0.value(), value) }
    }
}

impl Deref for Closure {
    type Target = HeapObject;

    fn deref(&self) -> &HeapObject {
        &self.0
    }
}

// Method header word fields
const ACCESS_SHIFT: usize = 28;
const PRIMITIVE_SHIFT: usize = 16;
const PRIMITIVE_MASK: isize = 1023;
const NUM_TEMPS_SHIFT: usize = 8;
const COUNT_MASK: isize = 255;

/// A compiled method viewed through its fixed slots: header word, literal
/// array, bytecode, defining mixin, selector, and source. Methods are
/// ordinary regular objects; this view just names the slots.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Method(crate::regular::RegularObject);

const METHOD_HEADER_SLOT: usize = 0;
const METHOD_LITERALS_SLOT: usize = 1;
const METHOD_BYTECODE_SLOT: usize = 2;
const METHOD_MIXIN_SLOT: usize = 3;
const METHOD_SELECTOR_SLOT: usize = 4;
const METHOD_SOURCE_SLOT: usize = 5;

pub const METHOD_NUM_SLOTS: usize = 6;

impl Method {
    pub fn cast(obj: HeapObject) -> Method {
        Method(crate::regular::RegularObject::cast(obj))
    }

    pub fn object(self) -> HeapObject {
        self.0.object()
    }

    pub fn header(self) -> Value {
        self.0.slot(METHOD_HEADER_SLOT)
    }

    pub fn init_header(self, value: Value) {
        self.0.init_slot(METHOD_HEADER_SLOT, value)
    }

    pub fn literals(self) -> Value {
        self.0.slot(METHOD_LITERALS_SLOT)
    }

    pub fn init_literals(self, value: Value) {
        self.0.init_slot(METHOD_LITERALS_SLOT, value)
    }

    pub fn bytecode(self) -> Value {
        self.0.slot(METHOD_BYTECODE_SLOT)
    }

    pub fn init_bytecode(self, value: Value) {
        self.0.init_slot(METHOD_BYTECODE_SLOT, value)
    }

    pub fn mixin(self) -> Value {
        self.0.slot(METHOD_MIXIN_SLOT)
    }

    pub fn init_mixin(self, value: Value) {
        self.0.init_slot(METHOD_MIXIN_SLOT, value)
    }

    pub fn selector(self) -> Value {
        self.0.slot(METHOD_SELECTOR_SLOT)
    }

    pub fn init_selector(self, value: Value) {
        self.0.init_slot(METHOD_SELECTOR_SLOT, value)
    }

    pub fn source(self) -> Value {
        self.0.slot(METHOD_SOURCE_SLOT)
    }

    pub fn init_source(self, value: Value) {
        self.0.init_slot(METHOD_SOURCE_SLOT, value)
    }

    fn header_value(self) -> isize {
        self.header().small_value()
    }

    pub fn is_public(self) -> bool {
        self.header_value() >> ACCESS_SHIFT == 0
    }

    pub fn is_protected(self) -> bool {
        self.header_value() >> ACCESS_SHIFT == 1
    }

    pub fn is_private(self) -> bool {
        self.header_value() >> ACCESS_SHIFT == 2
    }

    pub fn primitive(self) -> usize {
        ((self.header_value() >> PRIMITIVE_SHIFT) & PRIMITIVE_MASK) as usize
    }

    pub fn num_args(self) -> usize {
        (self.header_value() & COUNT_MASK) as usize
    }

    pub fn num_temps(self) -> usize {
        ((self.header_value() >> NUM_TEMPS_SHIFT) & COUNT_MASK) as usize
    }

    /// Pack a method header word from its parts
    pub fn pack_header(access: usize, primitive: usize, num_temps: usize, num_args: usize) -> Value {
        debug_assert!(access <= 2);
        debug_assert!(primitive <= PRIMITIVE_MASK as usize);
        debug_assert!(num_temps <= COUNT_MASK as usize);
        debug_assert!(num_args <= COUNT_MASK as usize);
        Value::small(
            ((access << ACCESS_SHIFT)
                | (primitive << PRIMITIVE_SHIFT)
                | (num_temps << NUM_TEMPS_SHIFT)
                | num_args) as isize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::Behavior;
    use crate::heap::AllocKind;
    use crate::interp::Interpreter;
    use crate::mutator::Mutator;
    use crate::object::HeapObject;
    use crate::store::ObjectStore;

    #[test]
    fn method_header_packing() {
        let header = Method::pack_header(2, 77, 5, 3);
        let h = header.small_value();
        assert_eq!(h >> ACCESS_SHIFT, 2);
        assert_eq!((h >> PRIMITIVE_SHIFT) & PRIMITIVE_MASK, 77);
        assert_eq!((h >> NUM_TEMPS_SHIFT) & COUNT_MASK, 5);
        assert_eq!(h & COUNT_MASK, 3);
    }

    #[test]
    fn method_instance_decodes_its_header() {
        let mut mutator = Mutator::new();
        let store = ObjectStore::cast(HeapObject::from_value(mutator.object_store()));
        let method_cls = Behavior::cast(HeapObject::from_value(store.method_cls()));
        let cid = method_cls.id().small_value() as usize;
        let nil = mutator.nil_obj();

        let obj = mutator
            .heap()
            .allocate_regular_object(cid, METHOD_NUM_SLOTS, AllocKind::Normal);
        mutator.push_root(obj.object().value()).unwrap();

        let method = Method::cast(obj.object());
        method.init_header(Method::pack_header(1, 0, 4, 2));
        let literals = mutator.heap().allocate_array(0, AllocKind::Normal);
        method.init_literals(literals.object().value());
        let bytecode = mutator.heap().allocate_byte_array(8, AllocKind::Normal);
        method.init_bytecode(bytecode.object().value());
        method.init_mixin(nil);
        let selector = mutator.make_string("at:put:", AllocKind::Normal);
        method.init_selector(selector.object().value());
        method.init_source(nil);

        assert!(method.is_protected());
        assert!(!method.is_public());
        assert!(!method.is_private());
        assert_eq!(method.primitive(), 0);
        assert_eq!(method.num_temps(), 4);
        assert_eq!(method.num_args(), 2);
        assert_eq!(method.selector(), selector.object().value());
        assert_eq!(method.literals(), literals.object().value());
        assert_eq!(method.bytecode(), bytecode.object().value());
        assert_eq!(method.mixin(), nil);
        assert_eq!(method.source(), nil);

        mutator.heap().verify();
        mutator.pop_root();
    }

    #[test]
    fn activation_and_closure_wiring() {
        let mut mutator = Mutator::new();

        let activation = mutator.heap().allocate_activation(AllocKind::Normal);
        mutator.push_root(activation.object().value()).unwrap();
        let closure = mutator.heap().allocate_closure(2, AllocKind::Normal);
        mutator.push_root(closure.object().value()).unwrap();

        closure.set_defining_activation(activation.object().value());
        closure.set_initial_bci(Value::small(1));
        closure.set_num_args(Value::small(0));
        closure.set_copied(0, Value::small(11));
        closure.set_copied(1, activation.object().value());
        assert_eq!(closure.num_copied(), 2);
        assert_eq!(closure.defining_activation(), activation.object().value());
        assert_eq!(closure.initial_bci(), Value::small(1));
        assert_eq!(closure.num_args(), Value::small(0));
        assert_eq!(closure.copied(0), Value::small(11));
        assert_eq!(closure.copied(1), activation.object().value());

        let sender = mutator.heap().allocate_activation(AllocKind::Normal);
        activation.set_sender(sender.object().value());
        activation.set_bci(Value::small(7));
        activation.set_closure(closure.object().value());
        assert_eq!(activation.sender(), sender.object().value());
        assert_eq!(activation.bci(), Value::small(7));
        assert_eq!(activation.closure(), closure.object().value());

        // the mutual references survive a full collection while rooted
        mutator.heap().collect_all(crate::heap::GcReason::Explicit);
        assert_eq!(activation.closure(), closure.object().value());
        assert_eq!(closure.defining_activation(), activation.object().value());
        mutator.heap().verify();

        mutator.pop_root();
        mutator.pop_root();
    }
}
