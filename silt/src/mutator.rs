//! A minimal embedding of the heap: owns the root set, a working stack, a
//! method-lookup cache and the ephemeron signal queue, and bootstraps the
//! core object graph (built-in behaviors, nil/true/false, the object store)
//! that a snapshot would normally provide.
//!
//! The bytecode interpreter proper lives elsewhere; this shell is what the
//! stress driver and the tests mutate the heap through.

use fnv::FnvHashMap;

use crate::behavior::{Behavior, Class, CLASS_NUM_SLOTS};
use crate::bytes::ByteString;
use crate::error::{ErrorKind, HeapError};
use crate::header::*;
use crate::heap::{AllocKind, Heap};
use crate::interp::Interpreter;
use crate::object::HeapObject;
use crate::refs::Ref;
use crate::regular::RegularObject;
use crate::store::{ObjectStore, MESSAGE_NUM_SLOTS, OBJECT_STORE_NUM_SLOTS};
use crate::value::Value;

/// Working-stack depth; enough for the stress driver and the tests
pub const STACK_CAPACITY: usize = 64;

pub struct Mutator {
    heap: Heap,

    // Root edges. These live inside the boxed Mutator so their addresses
    // are stable for incoming-list membership.
    store_ref: Ref,
    nil_ref: Ref,
    true_ref: Ref,
    false_ref: Ref,

    stack: Box<[Ref]>,
    stack_depth: usize,

    // (class word, selector word) -> method
    cache: FnvHashMap<(usize, usize), Value>,
    cache_flushes: usize,

    // Finalizers mourned out of dead ephemerons, rooted until taken
    signals: Vec<Box<Ref>>,
}

impl Mutator {
    pub fn new() -> Box<Mutator> {
        Mutator::new_with_seed(0)
    }

    pub fn new_with_seed(seed: u64) -> Box<Mutator> {
        let stack = (0..STACK_CAPACITY)
            .map(|_| Ref::new_unlinked())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let mut mutator = Box::new(Mutator {
            heap: Heap::new_with_seed(seed),
            store_ref: Ref::new_unlinked(),
            nil_ref: Ref::new_unlinked(),
            true_ref: Ref::new_unlinked(),
            false_ref: Ref::new_unlinked(),
            stack,
            stack_depth: 0,
            cache: FnvHashMap::default(),
            cache_flushes: 0,
            signals: Vec::new(),
        });

        for slot in mutator.stack.iter_mut() {
            slot.init_root(Value::null());
        }
        mutator.store_ref.init_root(Value::null());
        mutator.nil_ref.init_root(Value::null());
        mutator.true_ref.init_root(Value::null());
        mutator.false_ref.init_root(Value::null());

        let raw: *mut Mutator = &mut *mutator;
        unsafe {
            (*raw).heap.initialize_interpreter(raw);
        }

        bootstrap(&mut mutator);
        mutator
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn store(&self) -> ObjectStore {
        ObjectStore::cast(HeapObject::from_value(self.store_ref.target()))
    }

    /// Push a value onto the working stack, rooting it for GC
    pub fn push_root(&mut self, value: Value) -> Result<(), HeapError> {
        if self.stack_depth == self.stack.len() {
            return Err(HeapError::new(ErrorKind::StackOverflow));
        }
        self.stack[self.stack_depth].update_no_check(value);
        self.stack_depth += 1;
        Ok(())
    }

    pub fn pop_root(&mut self) -> Value {
        debug_assert!(self.stack_depth > 0);
        self.stack_depth -= 1;
        let value = self.stack[self.stack_depth].target();
        self.stack[self.stack_depth].update_no_check(Value::null());
        value
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    /// Peek a live stack root
    pub fn root_at(&self, index: usize) -> Value {
        debug_assert!(index < self.stack_depth);
        self.stack[index].target()
    }

    pub fn cached_lookup(&self, class: Value, selector: Value) -> Option<Value> {
        self.cache.get(&(class.raw(), selector.raw())).copied()
    }

    pub fn cache_method(&mut self, class: Value, selector: Value, method: Value) {
        self.cache.insert((class.raw(), selector.raw()), method);
    }

    /// How many times a collection or become has invalidated the cache
    pub fn cache_flushes(&self) -> usize {
        self.cache_flushes
    }

    pub fn pending_finalizers(&self) -> usize {
        self.signals.len()
    }

    /// Dequeue the oldest mourned finalizer, releasing its root
    pub fn take_finalizer(&mut self) -> Option<Value> {
        if self.signals.is_empty() {
            return None;
        }
        let mut edge = self.signals.remove(0);
        let value = edge.target();
        edge.update_no_check(Value::null());
        Some(value)
    }

    /// Allocate a heap string holding `text`
    pub fn make_string(&self, text: &str, kind: AllocKind) -> ByteString {
        let result = self.heap.allocate_string(text.len(), kind);
        result.copy_from_slice(text.as_bytes());
        result
    }
}

impl Interpreter for Mutator {
    fn visit_roots(&mut self, visit: &mut dyn FnMut(&mut Ref)) {
        visit(&mut self.store_ref);
        visit(&mut self.nil_ref);
        visit(&mut self.true_ref);
        visit(&mut self.false_ref);
        for edge in self.signals.iter_mut() {
            visit(edge);
        }
    }

    fn visit_stack(&mut self, visit: &mut dyn FnMut(&mut Ref)) {
        for i in 0..self.stack_depth {
            visit(&mut self.stack[i]);
        }
    }

    fn clear_cache(&mut self) {
        self.cache.clear();
        self.cache_flushes += 1;
    }

    fn enqueue_finalizer(&mut self, finalizer: Value) {
        let mut edge = Box::new(Ref::new_unlinked());
        edge.init_root(finalizer);
        self.signals.push(edge);
    }

    fn nil_obj(&self) -> Value {
        self.nil_ref.target()
    }

    fn true_obj(&self) -> Value {
        self.true_ref.target()
    }

    fn false_obj(&self) -> Value {
        self.false_ref.target()
    }

    fn object_store(&self) -> Value {
        self.store_ref.target()
    }
}

/// Build the core graph a snapshot would normally provide: one class object
/// per built-in cid, the shell classes the tests need, nil/true/false, and
/// the object store. Everything is allocated in snapshot mode and patched
/// up by `initialize_after_snapshot`.
fn bootstrap(mutator: &mut Mutator) {
    let kind = AllocKind::Snapshot;
    let heap = &mutator.heap;

    // ids for the regular-object classes
    let cid_class = heap.allocate_class_id();
    let cid_undefined = heap.allocate_class_id();
    let cid_true = heap.allocate_class_id();
    let cid_false = heap.allocate_class_id();
    let cid_store = heap.allocate_class_id();
    let cid_method = heap.allocate_class_id();

    let make_class = || heap.allocate_regular_object(cid_class, CLASS_NUM_SLOTS, kind);

    let class_cls = make_class();
    let undefined_cls = make_class();
    let true_cls = make_class();
    let false_cls = make_class();
    let store_cls = make_class();
    let message_cls = make_class();
    let method_cls = make_class();

    let builtins: [(usize, &str); 11] = [
        (SMALL_INTEGER_CID, "SmallInteger"),
        (MEDIUM_INTEGER_CID, "MediumInteger"),
        (LARGE_INTEGER_CID, "LargeInteger"),
        (FLOAT64_CID, "Float64"),
        (BYTE_ARRAY_CID, "ByteArray"),
        (STRING_CID, "String"),
        (ARRAY_CID, "Array"),
        (WEAK_ARRAY_CID, "WeakArray"),
        (EPHEMERON_CID, "Ephemeron"),
        (ACTIVATION_CID, "Activation"),
        (CLOSURE_CID, "Closure"),
    ];
    let builtin_classes: Vec<RegularObject> = builtins.iter().map(|_| make_class()).collect();

    heap.register_class(cid_class, Behavior::cast(class_cls.object()));
    heap.register_class(cid_undefined, Behavior::cast(undefined_cls.object()));
    heap.register_class(cid_true, Behavior::cast(true_cls.object()));
    heap.register_class(cid_false, Behavior::cast(false_cls.object()));
    heap.register_class(cid_store, Behavior::cast(store_cls.object()));
    heap.register_class(cid_method, Behavior::cast(method_cls.object()));
    for ((cid, _), cls) in builtins.iter().zip(&builtin_classes) {
        heap.register_class(*cid, Behavior::cast(cls.object()));
    }
    // The Message behavior is deliberately left unregistered; the heap
    // registers it on the first message allocation.

    // the well-known instances
    let nil = heap.allocate_regular_object(cid_undefined, 0, kind).object().value();
    let true_obj = heap.allocate_regular_object(cid_true, 0, kind).object().value();
    let false_obj = heap.allocate_regular_object(cid_false, 0, kind).object().value();
    let store_obj = heap.allocate_regular_object(cid_store, OBJECT_STORE_NUM_SLOTS, kind);

    let intern = |text: &str| {
        let s = mutator.make_string(text, kind);
        s.object().set_is_canonical(true);
        s.object().value()
    };

    let fill_class = |cls: RegularObject, name: &str, format: usize| {
        let behavior = Behavior::cast(cls.object());
        behavior.init_superclass(nil);
        behavior.init_methods(heap.allocate_array(0, kind).object().value());
        behavior.init_enclosing_object(nil);
        behavior.init_mixin(nil);
        behavior.init_format(Value::small(format as isize));
        let class = Class::cast(cls.object());
        class.init_name(intern(name));
        class.init_subclasses(heap.allocate_weak_array(0, kind).object().value());
    };

    fill_class(class_cls, "Class", CLASS_NUM_SLOTS);
    fill_class(undefined_cls, "UndefinedObject", 0);
    fill_class(true_cls, "True", 0);
    fill_class(false_cls, "False", 0);
    fill_class(store_cls, "ObjectStore", OBJECT_STORE_NUM_SLOTS);
    fill_class(message_cls, "Message", MESSAGE_NUM_SLOTS);
    fill_class(method_cls, "Method", crate::activation::METHOD_NUM_SLOTS);
    for ((_, name), cls) in builtins.iter().zip(&builtin_classes) {
        fill_class(*cls, name, 0);
    }

    // unregistered, so its id must read as nil until first use
    Behavior::cast(message_cls.object()).init_id(nil);

    // the object store
    let store = ObjectStore::cast(store_obj.object());
    store.init_nil_obj(nil);
    store.init_false_obj(false_obj);
    store.init_true_obj(true_obj);
    store.init_scheduler(nil);

    let common_selectors = heap.allocate_array(4, kind);
    for (i, selector) in ["value", "value:", "doesNotUnderstand:", "printString"]
        .iter()
        .enumerate()
    {
        common_selectors.init_element(i, intern(selector));
    }
    store.init_common_selectors(common_selectors.object().value());

    store.init_does_not_understand(intern("doesNotUnderstand:"));
    store.init_non_boolean_receiver(intern("nonBooleanReceiver:"));
    store.init_cannot_return(intern("cannotReturn:"));
    store.init_about_to_return_through(intern("aboutToReturn:through:"));
    store.init_unused_bytecode(intern("unusedBytecode"));
    store.init_dispatch_message(intern("dispatchMessage:"));
    store.init_dispatch_signal(intern("dispatchSignal:"));

    store.init_array_cls(builtin_classes[6].object().value());
    store.init_byte_array_cls(builtin_classes[4].object().value());
    store.init_string_cls(builtin_classes[5].object().value());
    store.init_closure_cls(builtin_classes[10].object().value());
    store.init_ephemeron_cls(builtin_classes[8].object().value());
    store.init_float64_cls(builtin_classes[3].object().value());
    store.init_large_integer_cls(builtin_classes[2].object().value());
    store.init_medium_integer_cls(builtin_classes[1].object().value());
    store.init_message_cls(message_cls.object().value());
    store.init_small_integer_cls(builtin_classes[0].object().value());
    store.init_weak_array_cls(builtin_classes[7].object().value());
    store.init_activation_cls(builtin_classes[9].object().value());
    store.init_method_cls(method_cls.object().value());

    // roots, then the snapshot fixup that needs them
    mutator.nil_ref.update_no_check(nil);
    mutator.true_ref.update_no_check(true_obj);
    mutator.false_ref.update_no_check(false_obj);
    mutator.store_ref.update_no_check(store_obj.object().value());

    mutator.heap.initialize_after_snapshot();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::GcReason;

    #[test]
    fn bootstrap_produces_consistent_graph() {
        let mutator = Mutator::new();
        mutator.heap().verify();

        assert!(mutator.nil_obj().is_heap_object());
        assert!(mutator.true_obj().is_heap_object());
        assert!(mutator.false_obj().is_heap_object());
        assert_ne!(mutator.nil_obj(), mutator.true_obj());
        assert_ne!(mutator.true_obj(), mutator.false_obj());

        let store = mutator.store();
        assert_eq!(store.nil_obj(), mutator.nil_obj());
        assert_eq!(store.true_obj(), mutator.true_obj());
        assert_eq!(store.false_obj(), mutator.false_obj());
    }

    #[test]
    fn bootstrap_survives_full_collection() {
        let mutator = Mutator::new();
        let strings_before = mutator.heap().count_instances(STRING_CID);

        mutator.heap().collect_all(GcReason::Explicit);
        mutator.heap().verify();

        // every bootstrap object is reachable from the store
        assert_eq!(mutator.heap().count_instances(STRING_CID), strings_before);
    }

    #[test]
    fn builtin_classes_are_registered() {
        let mutator = Mutator::new();
        for cid in FIRST_LEGAL_CID..FIRST_REGULAR_OBJECT_CID {
            let cls = mutator.heap().class_at(cid);
            assert!(cls.object().in_class_table());
            assert_eq!(cls.id().small_value() as usize, cid);
        }
    }

    #[test]
    fn stack_roots_push_and_pop() {
        let mut mutator = Mutator::new();
        let arr = mutator.heap().allocate_array(2, AllocKind::Normal);
        mutator.push_root(arr.object().value()).unwrap();
        assert_eq!(mutator.stack_depth(), 1);

        mutator.heap().collect_all(GcReason::Explicit);
        mutator.heap().verify();
        assert!(mutator.heap().count_instances(ARRAY_CID) >= 1);

        assert_eq!(mutator.pop_root(), arr.object().value());
        assert_eq!(mutator.stack_depth(), 0);
    }

    #[test]
    fn stack_overflow_reports() {
        let mut mutator = Mutator::new();
        for _ in 0..STACK_CAPACITY {
            mutator.push_root(Value::small(1)).unwrap();
        }
        let err = mutator.push_root(Value::small(2)).unwrap_err();
        assert_eq!(*err.error_kind(), ErrorKind::StackOverflow);
    }

    #[test]
    fn method_cache_round_trip_and_flush() {
        let mut mutator = Mutator::new();
        let cls = mutator.heap().class_at(ARRAY_CID).object().value();
        let selector = mutator.make_string("size", AllocKind::Normal).object().value();

        assert!(mutator.cached_lookup(cls, selector).is_none());
        mutator.cache_method(cls, selector, Value::small(99));
        assert_eq!(mutator.cached_lookup(cls, selector), Some(Value::small(99)));

        mutator.clear_cache();
        assert!(mutator.cached_lookup(cls, selector).is_none());
        assert_eq!(mutator.cache_flushes(), 1);
    }

    #[test]
    fn message_allocation_registers_class_lazily() {
        let mutator = Mutator::new();
        let store = mutator.store();
        let message_cls = Behavior::cast(HeapObject::from_value(store.message_cls()));
        assert_eq!(message_cls.id(), mutator.nil_obj());

        let message = mutator.heap().allocate_message();
        let cid = message.object().cid();
        assert!(cid >= FIRST_REGULAR_OBJECT_CID);
        assert_eq!(
            Behavior::cast(HeapObject::from_value(store.message_cls()))
                .id()
                .small_value() as usize,
            cid
        );
        assert_eq!(
            mutator.heap().class_at(cid).object().value(),
            store.message_cls()
        );

        // the second allocation reuses the registered id
        let message2 = mutator.heap().allocate_message();
        assert_eq!(message2.object().cid(), cid);
        mutator.heap().verify();
    }

    #[test]
    fn message_slots_round_trip() {
        let mut mutator = Mutator::new();

        let message = mutator.heap().allocate_message();
        mutator.push_root(message.object().value()).unwrap();

        let selector = mutator.make_string("at:put:", AllocKind::Normal);
        message.set_selector(selector.object().value());
        let arguments = mutator.heap().allocate_array(2, AllocKind::Normal);
        message.set_arguments(arguments.object().value());
        arguments.init_element(0, Value::small(1));
        arguments.init_element(1, mutator.nil_obj());

        assert_eq!(message.selector(), selector.object().value());
        assert_eq!(message.arguments(), arguments.object().value());
        mutator.heap().verify();
        mutator.pop_root();
    }

    #[test]
    fn canonical_bit_marks_selectors() {
        let mutator = Mutator::new();
        let store = mutator.store();
        let dnu = HeapObject::from_value(store.does_not_understand());
        assert!(dnu.is_canonical());
    }
}
