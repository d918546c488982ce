//! The managed heap: object table, class table, allocation entry points,
//! the incremental backtracing GC step, weak/ephemeron mourning, and the
//! become primitive.
//!
//! Reclamation never traces forward from roots. Each allocation (outside
//! snapshot mode) runs a bounded step: sample a few object-table entries at
//! random and, for each, walk its transitive *incoming* closure. If the walk
//! drains without touching a root edge or a handle, nothing outside the
//! closure can reach the candidate and the whole closure is freed as a unit.

use std::cell::UnsafeCell;
use std::mem::size_of;
use std::ptr::NonNull;
use std::time::Instant;

use cellalloc::Cell;

use crate::activation::{Activation, ActivationLayout, Closure, ClosureLayout};
use crate::arrays::{Array, ArrayLayout};
use crate::behavior::Behavior;
use crate::bignum::{Digit, LargeInteger, LargeIntegerLayout};
use crate::bytes::{ByteArray, ByteString, Bytes, BytesLayout};
use crate::error::HeapError;
use crate::handles::HANDLES_CAPACITY;
use crate::header::*;
use crate::interp::Interpreter;
use crate::numbers::{Float64, Float64Layout, MediumInteger, MediumIntegerLayout};
use crate::object::{for_each_pointer, ForwardingCorpse, HeapObject};
use crate::random::Random;
use crate::refs::Ref;
use crate::regular::{RegularObject, RegularObjectLayout};
use crate::store::{Message, ObjectStore, MESSAGE_NUM_SLOTS};
use crate::value::Value;
use crate::weak::{Ephemeron, WeakArray, WeakArrayLayout};

const TRACE_GROWTH: bool = false;
const TRACE_BECOME: bool = false;

/// Reachability samples taken per allocation
const GC_ROUNDS: usize = 3;

const INITIAL_CLASS_TABLE_CAPACITY: usize = 1024;
const INITIAL_TABLE_CAPACITY: usize = 8 * 1024;

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum AllocKind {
    Normal,
    /// Bulk graph construction: the pre-allocation GC step is suppressed
    Snapshot,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GcReason {
    ClassTable,
    Explicit,
}

impl GcReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GcReason::ClassTable => "class-table",
            GcReason::Explicit => "explicit",
        }
    }
}

struct HeapState {
    heap_size: usize,

    // Class table: cid -> class object, with vacated slots forming a free
    // list threaded through the slots as small integers.
    class_table: Vec<Value>,
    class_table_capacity: usize,
    class_table_free: usize,

    // Every live object, densely packed; slot 0 is reserved unused.
    table: Vec<Value>,

    worklist: Vec<HeapObject>,

    interpreter: Option<*mut dyn Interpreter>,

    handles: [*mut Value; HANDLES_CAPACITY],
    handles_size: usize,

    random: Random,

    max_gc_time: u64,
    total_gc_time: u64,
    gc_count: u64,
}

pub struct Heap {
    state: UnsafeCell<HeapState>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::new_with_seed(0)
    }

    pub fn new_with_seed(seed: u64) -> Heap {
        let mut class_table = Vec::with_capacity(INITIAL_CLASS_TABLE_CAPACITY);
        class_table.resize(FIRST_REGULAR_OBJECT_CID, Value::null());

        let mut table = Vec::with_capacity(INITIAL_TABLE_CAPACITY);
        table.push(Value::null());

        Heap {
            state: UnsafeCell::new(HeapState {
                heap_size: 0,
                class_table,
                class_table_capacity: INITIAL_CLASS_TABLE_CAPACITY,
                class_table_free: 0,
                table,
                worklist: Vec::with_capacity(1024),
                interpreter: None,
                handles: [std::ptr::null_mut(); HANDLES_CAPACITY],
                handles_size: 0,
                random: Random::new(seed),
                max_gc_time: 0,
                total_gc_time: 0,
                gc_count: 0,
            }),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut HeapState {
        unsafe { &mut *self.state.get() }
    }

    /// Register the single mutator. The pointer must stay valid and the
    /// interpreter must not move for the heap's whole lifetime.
    ///
    /// # Safety
    /// The caller keeps `interpreter` alive and pinned until the heap is
    /// dropped.
    pub unsafe fn initialize_interpreter(&self, interpreter: *mut dyn Interpreter) {
        let st = self.state();
        debug_assert!(st.interpreter.is_none());
        st.interpreter = Some(interpreter);
    }

    fn interp(&self) -> &mut dyn Interpreter {
        unsafe { &mut *self.state().interpreter.expect("interpreter not initialized") }
    }

    pub fn size(&self) -> usize {
        self.state().heap_size
    }

    pub fn gc_count(&self) -> u64 {
        self.state().gc_count
    }

    pub(crate) fn push_handle(&self, slot: *mut Value) {
        let st = self.state();
        assert!(
            st.handles_size < HANDLES_CAPACITY,
            "handle stack overflow; restructure the native operation"
        );
        st.handles[st.handles_size] = slot;
        st.handles_size += 1;
    }

    pub(crate) fn pop_handle(&self) {
        let st = self.state();
        debug_assert!(st.handles_size > 0);
        st.handles_size -= 1;
    }

    pub fn handles(&self) -> usize {
        self.state().handles_size
    }

    // -----------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------

    /// Raw sized allocation. Runs a GC step first in normal mode, so the
    /// collector is paced by allocation traffic.
    fn allocate(&self, size: usize, kind: AllocKind) -> usize {
        if kind != AllocKind::Snapshot {
            self.gc_step();
        }

        let cell = Cell::new(size, OBJECT_ALIGNMENT)
            .map_err(HeapError::from)
            .unwrap_or_else(|err| panic!("failed to allocate {} bytes: {}", size, err));
        let addr = cell.into_mut_ptr().as_ptr() as usize;

        self.state().heap_size += size;
        addr
    }

    fn register_instance(&self, obj: HeapObject) {
        let st = self.state();
        let index = st.table.len();
        debug_assert!(index <= INDEX_FIELD_MASK);
        st.table.push(obj.value());
        obj.set_table_index(index);
    }

    /// Put every edge slot into the neutral self-linked state so later
    /// `init_*` accessors and collector walks never see garbage
    fn init_fresh_refs(obj: HeapObject) {
        for_each_pointer(obj, |r| unsafe { (*r).init(obj.value(), Value::null()) });
    }

    fn zero_body(obj: HeapObject, offset: usize) {
        let size = obj.heap_size();
        unsafe {
            std::ptr::write_bytes((obj.addr() + offset) as *mut u8, 0, size - offset);
        }
    }

    pub fn allocate_regular_object(
        &self,
        cid: usize,
        num_slots: usize,
        kind: AllocKind,
    ) -> RegularObject {
        debug_assert!(cid == EPHEMERON_CID || cid >= FIRST_REGULAR_OBJECT_CID);
        let heap_size =
            allocation_size(num_slots * size_of::<Ref>() + size_of::<RegularObjectLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, cid, heap_size);
        self.register_instance(obj);
        let result = RegularObject::cast(obj);
        Self::init_fresh_refs(obj);
        if kind != AllocKind::Snapshot {
            let cls = self.class_at(cid);
            cls.assert_could_be_behavior();
            result.init_klass(cls.object().value());
        }
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_ephemeron(&self, kind: AllocKind) -> Ephemeron {
        let obj = self.allocate_regular_object(EPHEMERON_CID, 3, kind);
        Ephemeron::cast(obj.object())
    }

    pub fn allocate_array(&self, num_slots: usize, kind: AllocKind) -> Array {
        let heap_size = allocation_size(num_slots * size_of::<Ref>() + size_of::<ArrayLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, ARRAY_CID, heap_size);
        self.register_instance(obj);
        let result = Array::cast(obj);
        result.init_size(Value::small(num_slots as isize));
        Self::init_fresh_refs(obj);
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_weak_array(&self, num_slots: usize, kind: AllocKind) -> WeakArray {
        let heap_size =
            allocation_size(num_slots * size_of::<Ref>() + size_of::<WeakArrayLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, WEAK_ARRAY_CID, heap_size);
        self.register_instance(obj);
        let result = WeakArray::cast(obj);
        result.init_size(Value::small(num_slots as isize));
        Self::init_fresh_refs(obj);
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_byte_array(&self, num_bytes: usize, kind: AllocKind) -> ByteArray {
        let heap_size = allocation_size(num_bytes + size_of::<BytesLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, BYTE_ARRAY_CID, heap_size);
        self.register_instance(obj);
        let result = ByteArray::cast(obj);
        Bytes::cast(obj).init_size(Value::small(num_bytes as isize));
        Self::zero_body(obj, size_of::<BytesLayout>());
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_string(&self, num_bytes: usize, kind: AllocKind) -> ByteString {
        let heap_size = allocation_size(num_bytes + size_of::<BytesLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, STRING_CID, heap_size);
        self.register_instance(obj);
        let result = ByteString::cast(obj);
        Bytes::cast(obj).init_size(Value::small(num_bytes as isize));
        Self::zero_body(obj, size_of::<BytesLayout>());
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_closure(&self, num_copied: usize, kind: AllocKind) -> Closure {
        let heap_size =
            allocation_size(num_copied * size_of::<Ref>() + size_of::<ClosureLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, CLOSURE_CID, heap_size);
        self.register_instance(obj);
        let result = Closure::cast(obj);
        result.init_num_copied(Value::small(num_copied as isize));
        Self::init_fresh_refs(obj);
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_activation(&self, kind: AllocKind) -> Activation {
        let heap_size = allocation_size(size_of::<ActivationLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, ACTIVATION_CID, heap_size);
        self.register_instance(obj);
        Self::init_fresh_refs(obj);
        debug_assert!(obj.heap_size() == heap_size);
        Activation::cast(obj)
    }

    pub fn allocate_medium_integer(&self, kind: AllocKind) -> MediumInteger {
        let heap_size = allocation_size(size_of::<MediumIntegerLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, MEDIUM_INTEGER_CID, heap_size);
        self.register_instance(obj);
        let result = MediumInteger::cast(obj);
        result.set_value(0);
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_large_integer(&self, capacity: usize, kind: AllocKind) -> LargeInteger {
        let heap_size =
            allocation_size(capacity * size_of::<Digit>() + size_of::<LargeIntegerLayout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, LARGE_INTEGER_CID, heap_size);
        self.register_instance(obj);
        let result = LargeInteger::cast(obj);
        result.init_capacity(capacity);
        result.set_negative(false);
        Self::zero_body(obj, size_of::<LargeIntegerLayout>());
        result.set_size(0);
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    pub fn allocate_float64(&self, kind: AllocKind) -> Float64 {
        let heap_size = allocation_size(size_of::<Float64Layout>());
        let addr = self.allocate(heap_size, kind);
        let obj = HeapObject::initialize(addr, FLOAT64_CID, heap_size);
        self.register_instance(obj);
        let result = Float64::cast(obj);
        result.set_value(0.0);
        debug_assert!(obj.heap_size() == heap_size);
        result
    }

    /// Allocate a reified message send. Lazily registers the Message
    /// behavior the first time, which can itself run a GC step, so the
    /// behavior is re-read from the store afterward.
    pub fn allocate_message(&self) -> Message {
        let store = ObjectStore::cast(HeapObject::from_value(self.interp().object_store()));
        let mut behavior = Behavior::cast(HeapObject::from_value(store.message_cls()));
        behavior.assert_could_be_behavior();

        let mut id = behavior.id();
        if id == self.interp().nil_obj() {
            let cid = self.allocate_class_id();
            let store = ObjectStore::cast(HeapObject::from_value(self.interp().object_store()));
            behavior = Behavior::cast(HeapObject::from_value(store.message_cls()));
            self.register_class(cid, behavior);
            id = behavior.id();
        }
        debug_assert!(id.is_small_integer());

        let num_slots = behavior.format().small_value() as usize;
        debug_assert!(num_slots == MESSAGE_NUM_SLOTS);
        let obj = self.allocate_regular_object(id.small_value() as usize, num_slots, AllocKind::Normal);
        Message::cast(obj.object())
    }

    // -----------------------------------------------------------------
    // Class registry
    // -----------------------------------------------------------------

    pub fn allocate_class_id(&self) -> usize {
        {
            let st = self.state();
            if st.class_table_free != 0 {
                return Self::pop_free_cid(st);
            }
            if st.class_table.len() < st.class_table_capacity {
                st.class_table.push(Value::null());
                return st.class_table.len() - 1;
            }
        }

        if TRACE_GROWTH {
            eprintln!("Collecting to free class table entries");
        }
        self.collect_all(GcReason::ClassTable);

        let st = self.state();
        if st.class_table_free != 0 {
            return Self::pop_free_cid(st);
        }

        st.class_table_capacity += st.class_table_capacity >> 1;
        if TRACE_GROWTH {
            eprintln!("Growing class table to {}", st.class_table_capacity);
        }
        st.class_table.push(Value::null());
        st.class_table.len() - 1
    }

    fn pop_free_cid(st: &mut HeapState) -> usize {
        let cid = st.class_table_free;
        st.class_table_free = st.class_table[cid].small_value() as usize;
        st.class_table[cid] = Value::null();
        cid
    }

    pub fn register_class(&self, cid: usize, cls: Behavior) {
        let st = self.state();
        debug_assert!(st.class_table[cid].is_null());
        st.class_table[cid] = cls.object().value();
        cls.set_id(Value::small(cid as isize));
        cls.assert_could_be_behavior();
        debug_assert!(cls.object().cid() >= FIRST_REGULAR_OBJECT_CID);
        cls.object().set_in_class_table(true);
    }

    pub fn class_at(&self, cid: usize) -> Behavior {
        let st = self.state();
        debug_assert!(cid > ILLEGAL_CID);
        debug_assert!(cid < st.class_table.len());
        Behavior::cast(HeapObject::from_value(st.class_table[cid]))
    }

    /// After bulk construction, stamp registered ids into the class objects
    /// and give every regular object its class edge from the table.
    pub fn initialize_after_snapshot(&self) {
        let nil = self.interp().nil_obj();

        let class_table_len = self.state().class_table.len();
        for cid in FIRST_LEGAL_CID..class_table_len {
            let entry = self.state().class_table[cid];
            if !entry.is_heap_object() {
                continue;
            }
            let cls = Behavior::cast(HeapObject::from_value(entry));
            cls.assert_could_be_behavior();
            if cls.id() == nil {
                cls.set_id(Value::small(cid as isize));
            }
            cls.object().set_in_class_table(true);
        }

        let table_len = self.state().table.len();
        for i in 1..table_len {
            let obj = HeapObject::from_value(self.state().table[i]);
            let cid = obj.cid();
            if cid == EPHEMERON_CID || cid >= FIRST_REGULAR_OBJECT_CID {
                let regular = RegularObject::cast(obj);
                if !regular.klass().is_heap_object() {
                    let cls = self.class_at(cid);
                    regular.init_klass(cls.object().value());
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Instance scans
    // -----------------------------------------------------------------

    pub fn count_instances(&self, cid: usize) -> usize {
        let st = self.state();
        let mut instances = 0;
        for i in 1..st.table.len() {
            if HeapObject::from_value(st.table[i]).cid() == cid {
                instances += 1;
            }
        }
        instances
    }

    /// Fill `array` with every instance of `cid`, returning how many there
    /// were. Fails without writing when the output array is too small. The
    /// output slots must still be in their freshly allocated state.
    pub fn collect_instances(&self, cid: usize, array: Array) -> Result<usize, HeapError> {
        let total = self.count_instances(cid);
        if total > array.length() {
            return Err(HeapError::new(crate::error::ErrorKind::BoundsError));
        }

        let st = self.state();
        let mut instances = 0;
        for i in 1..st.table.len() {
            let obj = HeapObject::from_value(st.table[i]);
            if obj.cid() == cid {
                array.init_element(instances, obj.value());
                instances += 1;
            }
        }
        Ok(instances)
    }

    // -----------------------------------------------------------------
    // The GC step
    // -----------------------------------------------------------------

    /// One bounded collection step: a few random samples, each either
    /// cleared of marks or reclaimed as a whole closure
    pub(crate) fn gc_step(&self) {
        let start = Instant::now();

        for _ in 0..GC_ROUNDS {
            let st = self.state();
            let index = (st.random.next_u64() % st.table.len() as u64) as usize;
            if index == 0 {
                // unused entry
                continue;
            }

            let candidate = HeapObject::from_value(st.table[index]);
            debug_assert!(candidate.table_index() == index);
            debug_assert!(candidate.cid() >= FIRST_LEGAL_CID);

            self.reclaim_candidate(st, candidate);
        }

        self.record_gc_time(start);
    }

    /// Advisory full collection: give every object-table entry a
    /// reachability check. Entries are visited from the top so closures
    /// swapped down by removal are still reached.
    pub fn collect_all(&self, reason: GcReason) {
        if TRACE_GROWTH {
            eprintln!("collect-all ({})", reason.as_str());
        }
        let start = Instant::now();

        let mut index = self.state().table.len() - 1;
        while index >= 1 {
            let st = self.state();
            if index < st.table.len() {
                let candidate = HeapObject::from_value(st.table[index]);
                self.reclaim_candidate(st, candidate);
            }
            index -= 1;
        }

        self.record_gc_time(start);
    }

    fn record_gc_time(&self, start: Instant) {
        let st = self.state();
        let time = start.elapsed().as_nanos() as u64;
        if time > st.max_gc_time {
            st.max_gc_time = time;
        }
        st.total_gc_time += time;
        st.gc_count += 1;
    }

    fn reclaim_candidate(&self, st: &mut HeapState, candidate: HeapObject) {
        if self.check_reachable(st, candidate) {
            for i in 0..st.worklist.len() {
                let obj = st.worklist[i];
                obj.set_is_marked(false);
                obj.set_is_weak_referent(false);
            }
        } else {
            let mut includes_class = false;
            for i in 0..st.worklist.len() {
                let obj = st.worklist[i];
                if obj.in_class_table() {
                    includes_class = true;
                }
                self.unlink(st, obj, true);
            }
            for i in 0..st.worklist.len() {
                let obj = st.worklist[i];
                Self::free(st, obj);
            }
            if includes_class {
                let interp = st.interpreter.expect("interpreter not initialized");
                unsafe { (*interp).clear_cache() };
            }
        }
        st.worklist.clear();
    }

    /// Walk the transitive incoming closure of `obj`. Returns true as soon
    /// as a root edge, a handle, or one of the heavy singletons is found;
    /// otherwise the drained worklist *is* the unreachable closure.
    fn check_reachable(&self, st: &mut HeapState, obj: HeapObject) -> bool {
        let interp = st.interpreter.expect("interpreter not initialized");
        let (nil, tru, fls) = unsafe {
            (
                (*interp).nil_obj(),
                (*interp).true_obj(),
                (*interp).false_obj(),
            )
        };

        // The incoming lists of these singletons are enormous; identity
        // makes them live without touching the worklist.
        if obj.value() == nil || obj.value() == tru || obj.value() == fls {
            return true;
        }

        debug_assert!(!obj.is_marked());
        debug_assert!(st.worklist.is_empty());
        obj.set_is_marked(true);
        st.worklist.push(obj);

        let mut cursor = 0;
        while cursor < st.worklist.len() {
            let obj = st.worklist[cursor];
            cursor += 1;

            for i in 0..st.handles_size {
                if unsafe { *st.handles[i] } == obj.value() {
                    return true;
                }
            }

            let mut is_weak_referent = false;
            unsafe {
                let head = obj.incoming();
                let mut incoming = (*head).next;
                while incoming != head {
                    let r = incoming as *mut Ref;
                    debug_assert!((*r).target() == obj.value());

                    let source = (*r).source();
                    if source.is_null() {
                        // a root edge
                        return true;
                    }

                    let src = HeapObject::from_value(source);
                    debug_assert!(src.cid() != FREE_LIST_ELEMENT_CID);
                    debug_assert!(src.cid() != FORWARDING_CORPSE_CID);

                    if src.cid() == WEAK_ARRAY_CID {
                        is_weak_referent = true;
                    } else if src.cid() == EPHEMERON_CID
                        && std::ptr::eq(r, Ephemeron::cast(src).key_ref())
                    {
                        // a key edge never keeps its key alive
                        is_weak_referent = true;
                    } else if !src.is_marked() {
                        src.set_is_marked(true);
                        st.worklist.push(src);
                    }

                    incoming = (*incoming).next;
                }
            }
            if is_weak_referent {
                obj.set_is_weak_referent(true);
            }
        }

        false
    }

    /// Detach a dead object: retarget surviving weak watchers, mourn
    /// surviving ephemerons whose key this was, null the outgoing heap
    /// edges, and swap the object out of the table. Small-integer slots are
    /// left alone; length and class-id data is still needed by `free`.
    ///
    /// `mourn` is false during become, where the object is being
    /// re-identified rather than collected.
    fn unlink(&self, st: &mut HeapState, obj: HeapObject, mourn: bool) {
        if mourn && obj.is_weak_referent() {
            let interp = st.interpreter.expect("interpreter not initialized");
            let nil = unsafe { (*interp).nil_obj() };

            // snapshot the watcher list; retargeting edges rewrites it
            let mut watchers: Vec<*mut Ref> = Vec::new();
            unsafe {
                let head = obj.incoming();
                let mut incoming = (*head).next;
                while incoming != head {
                    watchers.push(incoming as *mut Ref);
                    incoming = (*incoming).next;
                }
            }

            for r in watchers {
                unsafe {
                    let source = (*r).source();
                    debug_assert!(!source.is_null());
                    let src = HeapObject::from_value(source);

                    if src.cid() == WEAK_ARRAY_CID {
                        (*r).update_no_check(nil);
                    } else if src.cid() == EPHEMERON_CID && !src.is_marked() {
                        let eph = Ephemeron::cast(src);
                        if std::ptr::eq(r, eph.key_ref()) {
                            let finalizer = eph.finalizer();
                            let finalizer_dying = finalizer.is_heap_object()
                                && HeapObject::from_value(finalizer).is_marked();
                            if !finalizer_dying {
                                (*interp).enqueue_finalizer(finalizer);
                            }
                            (*eph.key_ref()).update_no_check(nil);
                            (*eph.value_ref()).update_no_check(nil);
                        }
                    }
                }
            }
        }

        // Null outgoing edges; some targets outlive this closure.
        for_each_pointer(obj, |p| unsafe {
            if (*p).target().is_heap_object() {
                (*p).update(obj.value(), Value::null());
            }
        });

        let index = obj.table_index();
        debug_assert!(index > 0 && index < st.table.len());
        let last_index = st.table.len() - 1;
        let last = HeapObject::from_value(st.table[last_index]);
        debug_assert!(last.cid() >= FIRST_LEGAL_CID);
        debug_assert!(last.table_index() == last_index);
        obj.set_table_index(0);
        last.set_table_index(index);
        st.table[index] = last.value();
        st.table.pop();
    }

    fn free(st: &mut HeapState, obj: HeapObject) {
        debug_assert!(obj.incoming_is_empty());

        if obj.in_class_table() {
            let cid = Behavior::cast(obj).id().small_value() as usize;
            debug_assert!(st.class_table[cid] == obj.value());
            st.class_table[cid] = Value::small(st.class_table_free as isize);
            st.class_table_free = cid;
        }

        let size = obj.heap_size();
        st.heap_size -= size;
        unsafe {
            drop(Cell::from_raw_parts(
                NonNull::new_unchecked(obj.addr() as *mut u8),
                size,
                OBJECT_ALIGNMENT,
            ));
        }
    }

    // -----------------------------------------------------------------
    // Become
    // -----------------------------------------------------------------

    /// Atomically re-identify pairs: every reference to `old[i]` afterwards
    /// reaches `new[i]`. Identity hashes travel with the identity. Returns
    /// false when the arrays disagree in length or contain immediates.
    pub fn become_forward(&self, old: Array, new: Array) -> bool {
        if old.length() != new.length() {
            return false;
        }

        let length = old.length();
        if TRACE_BECOME {
            eprintln!("become({})", length);
        }

        for i in 0..length {
            if !old.element(i).is_heap_object() || !new.element(i).is_heap_object() {
                return false;
            }
        }

        let mut corpses: Vec<(HeapObject, usize)> = Vec::with_capacity(length);

        for i in 0..length {
            let forwarder = HeapObject::from_value(old.element(i));
            let forwardee = HeapObject::from_value(new.element(i));

            debug_assert!(forwarder.cid() != FORWARDING_CORPSE_CID);
            debug_assert!(forwardee.cid() != FORWARDING_CORPSE_CID);

            forwardee.set_header_hash(forwarder.header_hash());
            forwardee
                .set_in_class_table(forwardee.in_class_table() || forwarder.in_class_table());

            let heap_size = forwarder.heap_size();

            self.unlink(self.state(), forwarder, false);

            HeapObject::initialize(forwarder.addr(), FORWARDING_CORPSE_CID, heap_size);
            let corpse = ForwardingCorpse::cast(forwarder);
            if forwarder.size_in_header() == 0 {
                corpse.set_overflow_size(heap_size);
            }
            debug_assert!(forwarder.heap_size() == heap_size);

            corpse.set_target(forwardee.value());
            corpses.push((forwarder, heap_size));
        }

        self.forward_class_ids();
        self.forward_roots();
        self.forward_heap(); // with forwarded class ids
        self.mourn_class_table_forwarded();

        self.interp().clear_cache();

        // Every incoming edge has been retargeted; the corpses are pure
        // metadata now and the sampler can never find them, so release the
        // storage here.
        let st = self.state();
        for (corpse, heap_size) in corpses {
            debug_assert!(corpse.incoming_is_empty());
            st.heap_size -= heap_size;
            unsafe {
                drop(Cell::from_raw_parts(
                    NonNull::new_unchecked(corpse.addr() as *mut u8),
                    heap_size,
                    OBJECT_ALIGNMENT,
                ));
            }
        }

        true
    }

    fn forward_ref(r: &mut Ref) {
        let old_target = r.target();
        if !old_target.is_heap_object() {
            return;
        }
        let obj = HeapObject::from_value(old_target);
        if obj.cid() == FORWARDING_CORPSE_CID {
            let new_target = ForwardingCorpse::cast(obj).target();
            debug_assert!(
                HeapObject::from_value(new_target).cid() != FORWARDING_CORPSE_CID
            );
            r.update_no_check(new_target);
        }
    }

    unsafe fn forward_slot(slot: *mut Value) {
        let old_target = *slot;
        if !old_target.is_heap_object() {
            return;
        }
        let obj = HeapObject::from_value(old_target);
        if obj.cid() == FORWARDING_CORPSE_CID {
            *slot = ForwardingCorpse::cast(obj).target();
        }
    }

    /// For forwarded classes, keep the old cid: instances keep their header
    /// cid and the class identity at that cid becomes the forwardee.
    fn forward_class_ids(&self) {
        let nil = self.interp().nil_obj();
        let st = self.state();

        for cid in FIRST_LEGAL_CID..st.class_table.len() {
            let entry = st.class_table[cid];
            if !entry.is_heap_object() {
                continue;
            }
            let old_class = HeapObject::from_value(entry);
            if old_class.cid() != FORWARDING_CORPSE_CID {
                continue;
            }

            let new_class =
                Behavior::cast(HeapObject::from_value(ForwardingCorpse::cast(old_class).target()));
            debug_assert!(new_class.object().cid() != FORWARDING_CORPSE_CID);

            if new_class.id() != nil {
                debug_assert!(new_class.id().is_small_integer());
                // migrate instances carrying the new class's previous cid
                let new_cid = new_class.id().small_value() as usize;
                st.class_table[new_cid] = old_class.value();
            }

            new_class.set_id(Value::small(cid as isize));
            st.class_table[cid] = new_class.object().value();
        }
    }

    fn forward_roots(&self) {
        let st = self.state();
        for i in 0..st.handles_size {
            unsafe { Self::forward_slot(st.handles[i]) };
        }

        let interp = st.interpreter.expect("interpreter not initialized");
        unsafe {
            (*interp).visit_roots(&mut Self::forward_ref);
            (*interp).visit_stack(&mut Self::forward_ref);
        }
    }

    fn forward_heap(&self) {
        let st = self.state();
        for i in 1..st.table.len() {
            let obj = HeapObject::from_value(st.table[i]);
            debug_assert!(obj.cid() >= FIRST_LEGAL_CID);

            // rewrite the cid first if this object's class was forwarded
            let entry = st.class_table[obj.cid()];
            if entry.is_heap_object() {
                let old_class = HeapObject::from_value(entry);
                if old_class.cid() == FORWARDING_CORPSE_CID {
                    let new_class = Behavior::cast(HeapObject::from_value(
                        ForwardingCorpse::cast(old_class).target(),
                    ));
                    debug_assert!(new_class.id().is_small_integer());
                    obj.set_cid(new_class.id().small_value() as usize);
                }
            }

            for_each_pointer(obj, |p| unsafe { Self::forward_ref(&mut *p) });
        }
    }

    fn mourn_class_table_forwarded(&self) {
        let st = self.state();
        for cid in FIRST_LEGAL_CID..st.class_table.len() {
            let entry = st.class_table[cid];
            if !entry.is_heap_object() {
                continue;
            }
            if HeapObject::from_value(entry).cid() != FORWARDING_CORPSE_CID {
                continue;
            }

            st.class_table[cid] = Value::small(st.class_table_free as isize);
            st.class_table_free = cid;
        }
    }

    // -----------------------------------------------------------------
    // Identity hash
    // -----------------------------------------------------------------

    /// The identity hash, assigning a random nonzero one on first
    /// observation. Stable for the object's lifetime and carried across
    /// become.
    pub fn identity_hash(&self, obj: HeapObject) -> usize {
        let mut hash = obj.header_hash();
        if hash == 0 {
            let st = self.state();
            loop {
                hash = st.random.next_u64() as usize & HASH_FIELD_MAX;
                if hash != 0 {
                    break;
                }
            }
            obj.set_header_hash(hash);
        }
        hash
    }

    // -----------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------

    /// Exhaustively assert the table, edge and accounting invariants.
    /// Intended for tests and debugging; cost is quadratic in edges.
    pub fn verify(&self) {
        let st = self.state();
        let mut total = 0usize;

        for i in 1..st.table.len() {
            let obj = HeapObject::from_value(st.table[i]);
            assert_eq!(obj.table_index(), i);
            assert!(obj.cid() >= FIRST_LEGAL_CID);
            assert!(!obj.is_marked());
            total += obj.heap_size();

            if obj.in_class_table() {
                let cid = Behavior::cast(obj).id().small_value() as usize;
                assert!(st.class_table[cid] == obj.value());
            }

            for_each_pointer(obj, |p| unsafe {
                assert!((*p).source() == obj.value());
                let target = (*p).target();
                if target.is_heap_object() {
                    let head = HeapObject::from_value(target).incoming();
                    let mut found = false;
                    let mut incoming = (*head).next;
                    while incoming != head {
                        if incoming as *mut Ref == p {
                            found = true;
                            break;
                        }
                        incoming = (*incoming).next;
                    }
                    assert!(found, "edge missing from target's incoming list");
                } else {
                    assert!((*p).link.is_empty());
                }
            });

            unsafe {
                let head = obj.incoming();
                let mut incoming = (*head).next;
                while incoming != head {
                    assert!((*(incoming as *mut Ref)).target() == obj.value());
                    incoming = (*incoming).next;
                }
            }
        }

        assert_eq!(total, st.heap_size, "heap size accounting drifted");

        for cid in FIRST_LEGAL_CID..st.class_table.len() {
            let entry = st.class_table[cid];
            if entry.is_heap_object() {
                let cls = Behavior::cast(HeapObject::from_value(entry));
                assert!(cls.object().in_class_table());
                assert_eq!(cls.id().small_value() as usize, cid);
            }
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let st = self.state();

        // wholesale teardown: list discipline no longer matters
        for i in 1..st.table.len() {
            let obj = HeapObject::from_value(st.table[i]);
            let size = obj.heap_size();
            unsafe {
                drop(Cell::from_raw_parts(
                    NonNull::new_unchecked(obj.addr() as *mut u8),
                    size,
                    OBJECT_ALIGNMENT,
                ));
            }
        }

        eprintln!(
            "max-gc: {} ns, total-gc: {} ns, gc-count: {}",
            st.max_gc_time, st.total_gc_time, st.gc_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Class, CLASS_NUM_SLOTS};
    use crate::handles::HandleScope;
    use crate::mutator::Mutator;

    fn incoming_len(obj: HeapObject) -> usize {
        let mut len = 0;
        unsafe {
            let head = obj.incoming();
            let mut incoming = (*head).next;
            while incoming != head {
                len += 1;
                incoming = (*incoming).next;
            }
        }
        len
    }

    /// Build a class-shaped regular object suitable for registration
    fn make_test_class(mutator: &mut Mutator, name: &str) -> Behavior {
        let heap = mutator.heap();
        let class_cid = heap.class_at(ARRAY_CID).object().cid();
        let cls = heap.allocate_regular_object(class_cid, CLASS_NUM_SLOTS, AllocKind::Normal);
        mutator.push_root(cls.object().value()).unwrap();

        let nil = mutator.nil_obj();
        let behavior = Behavior::cast(cls.object());
        behavior.init_superclass(nil);
        behavior.init_enclosing_object(nil);
        behavior.init_mixin(nil);
        behavior.init_id(nil);
        behavior.init_format(Value::small(0));

        let heap = mutator.heap();
        let methods = heap.allocate_array(0, AllocKind::Normal);
        behavior.set_methods(methods.object().value());

        let name_obj = mutator.make_string(name, AllocKind::Normal);
        let class = Class::cast(cls.object());
        class.init_name(name_obj.object().value());
        let subclasses = mutator.heap().allocate_weak_array(0, AllocKind::Normal);
        class.init_subclasses(subclasses.object().value());

        mutator.pop_root();
        behavior
    }

    #[test]
    fn byte_array_alloc_read_reclaim() {
        let mutator = Mutator::new();
        let heap = mutator.heap();
        let before = heap.count_instances(BYTE_ARRAY_CID);

        let bytes = heap.allocate_byte_array(5, AllocKind::Normal);
        for i in 0..5 {
            bytes.set_byte_at(i, (i + 1) as u8);
        }
        assert_eq!(bytes.byte_at(2), 3);
        assert_eq!(Bytes::cast(bytes.object()).as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(heap.count_instances(BYTE_ARRAY_CID), before + 1);
        heap.verify();

        // no root holds the array; a full pass must reclaim it
        heap.collect_all(GcReason::Explicit);
        assert_eq!(heap.count_instances(BYTE_ARRAY_CID), before);
        heap.verify();
    }

    #[test]
    fn cycle_is_reclaimed_as_a_unit() {
        let mutator = Mutator::new();
        let heap = mutator.heap();
        let before = heap.count_instances(ARRAY_CID);

        let a = heap.allocate_array(1, AllocKind::Normal);
        let mut a_value = a.object().value();
        let b = {
            let _scope = HandleScope::new(heap, &mut a_value);
            heap.allocate_array(1, AllocKind::Normal)
        };
        a.set_element(0, b.object().value());
        b.set_element(0, a.object().value());
        heap.verify();

        heap.collect_all(GcReason::Explicit);
        assert_eq!(heap.count_instances(ARRAY_CID), before);
        heap.verify();
    }

    #[test]
    fn sampling_reclaims_cycles_without_full_pass() {
        let mutator = Mutator::new_with_seed(12345);
        let heap = mutator.heap();
        let before = heap.count_instances(ARRAY_CID);

        let a = heap.allocate_array(1, AllocKind::Normal);
        let mut a_value = a.object().value();
        let b = {
            let _scope = HandleScope::new(heap, &mut a_value);
            heap.allocate_array(1, AllocKind::Normal)
        };
        a.set_element(0, b.object().value());
        b.set_element(0, a.object().value());

        // enough bounded steps to sample one of the two with certainty for
        // this seed
        for _ in 0..2000 {
            heap.gc_step();
            if heap.count_instances(ARRAY_CID) == before {
                break;
            }
        }
        assert_eq!(heap.count_instances(ARRAY_CID), before);
        heap.verify();
    }

    #[test]
    fn weak_array_does_not_retain() {
        let mut mutator = Mutator::new();
        let heap = mutator.heap();
        let before = heap.count_instances(BYTE_ARRAY_CID);

        let weak = heap.allocate_weak_array(2, AllocKind::Normal);
        mutator.push_root(weak.object().value()).unwrap();

        let target = mutator.heap().allocate_byte_array(3, AllocKind::Normal);
        weak.init_element(0, target.object().value());
        weak.set_element(1, Value::small(17));
        assert_eq!(weak.element(0), target.object().value());
        mutator.heap().verify();

        mutator.heap().collect_all(GcReason::Explicit);

        // the target is gone and the slot now reads nil; the small-integer
        // slot is untouched
        assert_eq!(mutator.heap().count_instances(BYTE_ARRAY_CID), before);
        assert_eq!(weak.element(0), mutator.nil_obj());
        assert_eq!(weak.element(1), Value::small(17));
        assert!(mutator.heap().count_instances(WEAK_ARRAY_CID) >= 1);
        mutator.heap().verify();

        mutator.pop_root();
    }

    #[test]
    fn ephemeron_mourns_unreachable_key() {
        let mut mutator = Mutator::new();

        let ephemeron = mutator.heap().allocate_ephemeron(AllocKind::Normal);
        mutator.push_root(ephemeron.object().value()).unwrap();

        // the key stays rooted until the ephemeron is fully wired; a key
        // edge alone would let an interleaved step mourn it early
        let key = mutator.heap().allocate_byte_array(1, AllocKind::Normal);
        mutator.push_root(key.object().value()).unwrap();
        ephemeron.init_key(key.object().value());
        let value = mutator.heap().allocate_array(0, AllocKind::Normal);
        ephemeron.init_value(value.object().value());
        let finalizer = mutator.heap().allocate_array(0, AllocKind::Normal);
        ephemeron.init_finalizer(finalizer.object().value());
        let finalizer_value = finalizer.object().value();
        mutator.heap().verify();
        mutator.pop_root();

        let byte_arrays = mutator.heap().count_instances(BYTE_ARRAY_CID);

        mutator.heap().collect_all(GcReason::Explicit);

        // the key died; key and value slots are cleared and the finalizer
        // is queued exactly once
        assert_eq!(mutator.heap().count_instances(BYTE_ARRAY_CID), byte_arrays - 1);
        assert_eq!(ephemeron.key(), mutator.nil_obj());
        assert_eq!(ephemeron.value(), mutator.nil_obj());
        assert_eq!(ephemeron.finalizer(), finalizer_value);
        assert_eq!(mutator.pending_finalizers(), 1);
        mutator.heap().verify();

        // with the value edge cleared, the value object dies next pass
        let arrays = mutator.heap().count_instances(ARRAY_CID);
        mutator.heap().collect_all(GcReason::Explicit);
        assert_eq!(mutator.heap().count_instances(ARRAY_CID), arrays - 1);

        assert_eq!(mutator.take_finalizer(), Some(finalizer_value));
        assert_eq!(mutator.pending_finalizers(), 0);

        mutator.heap().collect_all(GcReason::Explicit);
        assert_eq!(mutator.pending_finalizers(), 0);
        mutator.heap().verify();

        mutator.pop_root();
    }

    #[test]
    fn ephemeron_dying_with_its_key_runs_no_finalizer() {
        let mut mutator = Mutator::new();

        let ephemeron = mutator.heap().allocate_ephemeron(AllocKind::Normal);
        mutator.push_root(ephemeron.object().value()).unwrap();
        let key = mutator.heap().allocate_byte_array(1, AllocKind::Normal);
        mutator.push_root(key.object().value()).unwrap();
        ephemeron.set_key(key.object().value());
        let finalizer = mutator.heap().allocate_array(0, AllocKind::Normal);
        ephemeron.set_finalizer(finalizer.object().value());
        mutator.pop_root();
        mutator.pop_root();

        // both the ephemeron and its key are unreachable now; the
        // ephemeron's closure is discovered first and takes the key edge
        // with it, so nothing is mourned
        mutator.heap().collect_all(GcReason::Explicit);
        assert_eq!(mutator.pending_finalizers(), 0);
        mutator.heap().verify();
    }

    #[test]
    fn handles_protect_across_collection() {
        let mutator = Mutator::new();
        let heap = mutator.heap();
        let before = heap.count_instances(ARRAY_CID);

        let mut value = heap.allocate_array(1, AllocKind::Normal).object().value();
        {
            let _scope = HandleScope::new(heap, &mut value);
            assert_eq!(heap.handles(), 1);
            heap.collect_all(GcReason::Explicit);
            assert_eq!(heap.count_instances(ARRAY_CID), before + 1);
            heap.verify();
        }
        assert_eq!(heap.handles(), 0);

        heap.collect_all(GcReason::Explicit);
        assert_eq!(heap.count_instances(ARRAY_CID), before);
        heap.verify();
    }

    #[test]
    fn setting_a_ref_to_its_value_is_idempotent() {
        let mut mutator = Mutator::new();
        let heap = mutator.heap();

        let arr = heap.allocate_array(3, AllocKind::Normal);
        mutator.push_root(arr.object().value()).unwrap();
        let target = mutator.heap().allocate_byte_array(1, AllocKind::Normal);

        arr.set_element(0, target.object().value());
        arr.set_element(1, target.object().value());
        let len = incoming_len(target.object());

        arr.set_element(0, target.object().value());
        assert_eq!(incoming_len(target.object()), len);
        mutator.heap().verify();
        mutator.pop_root();
    }

    #[test]
    fn class_registry_round_trip() {
        let mut mutator = Mutator::new();

        let cls = make_test_class(&mut mutator, "Widget");
        let cid = mutator.heap().allocate_class_id();
        mutator.heap().register_class(cid, cls);

        assert_eq!(cls.id().small_value() as usize, cid);
        assert_eq!(mutator.heap().class_at(cid).object(), cls.object());
        assert!(cls.object().in_class_table());
        mutator.heap().verify();
    }

    #[test]
    fn dead_class_returns_its_cid() {
        let mut mutator = Mutator::new();

        let cls = make_test_class(&mut mutator, "Ephemeral");
        let cid = mutator.heap().allocate_class_id();
        mutator.heap().register_class(cid, cls);
        let flushes = mutator.cache_flushes();

        // nothing roots the class; collecting it must free the cid and
        // flush the method cache
        mutator.heap().collect_all(GcReason::Explicit);
        assert!(mutator.cache_flushes() > flushes);

        let recycled = mutator.heap().allocate_class_id();
        assert_eq!(recycled, cid);
        mutator.heap().verify();
    }

    #[test]
    fn become_swaps_class_identity() {
        let mut mutator = Mutator::new();

        let c1 = make_test_class(&mut mutator, "Before");
        let cid1 = mutator.heap().allocate_class_id();
        mutator.heap().register_class(cid1, c1);
        mutator.push_root(c1.object().value()).unwrap();

        let c2 = make_test_class(&mut mutator, "After");
        let cid2 = mutator.heap().allocate_class_id();
        mutator.heap().register_class(cid2, c2);
        mutator.push_root(c2.object().value()).unwrap();

        let instance = mutator
            .heap()
            .allocate_regular_object(cid1, 0, AllocKind::Normal);
        mutator.push_root(instance.object().value()).unwrap();

        let old = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(old.object().value()).unwrap();
        old.set_element(0, c1.object().value());
        let new = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(new.object().value()).unwrap();
        new.set_element(0, c2.object().value());

        let flushes = mutator.cache_flushes();
        assert!(mutator.heap().become_forward(old, new));

        // instances keep their cid; the class identity at that cid is now
        // the forwardee
        assert_eq!(instance.object().cid(), cid1);
        assert_eq!(
            mutator.heap().class_at(cid1).object(),
            c2.object()
        );
        assert_eq!(
            Behavior::cast(mutator.heap().class_at(cid1).object())
                .id()
                .small_value() as usize,
            cid1
        );
        assert_eq!(
            RegularObject::cast(instance.object()).klass(),
            c2.object().value()
        );
        assert!(mutator.cache_flushes() > flushes);

        // the forwarded arrays resolve to the forwardee as well
        assert_eq!(old.element(0), c2.object().value());
        mutator.heap().verify();

        for _ in 0..5 {
            mutator.pop_root();
        }
    }

    #[test]
    fn become_preserves_identity_hash() {
        let mut mutator = Mutator::new();

        let a = mutator.heap().allocate_array(0, AllocKind::Normal);
        mutator.push_root(a.object().value()).unwrap();
        let b = mutator.heap().allocate_array(0, AllocKind::Normal);
        mutator.push_root(b.object().value()).unwrap();

        let hash = mutator.heap().identity_hash(a.object());
        assert_ne!(hash, 0);

        let old = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(old.object().value()).unwrap();
        old.set_element(0, a.object().value());
        let new = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(new.object().value()).unwrap();
        new.set_element(0, b.object().value());

        assert!(mutator.heap().become_forward(old, new));
        assert_eq!(mutator.heap().identity_hash(b.object()), hash);
        mutator.heap().verify();

        for _ in 0..4 {
            mutator.pop_root();
        }
    }

    #[test]
    fn become_rejects_bad_input() {
        let mut mutator = Mutator::new();

        let old = mutator.heap().allocate_array(2, AllocKind::Normal);
        mutator.push_root(old.object().value()).unwrap();
        let new = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(new.object().value()).unwrap();

        // length mismatch
        assert!(!mutator.heap().become_forward(old, new));

        // small integers are not re-identifiable
        let old2 = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(old2.object().value()).unwrap();
        old2.set_element(0, Value::small(3));
        let new2 = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(new2.object().value()).unwrap();
        let target = mutator.heap().allocate_array(0, AllocKind::Normal);
        new2.set_element(0, target.object().value());
        assert!(!mutator.heap().become_forward(old2, new2));
        mutator.heap().verify();

        for _ in 0..4 {
            mutator.pop_root();
        }
    }

    #[test]
    fn become_rewrites_stack_roots() {
        let mut mutator = Mutator::new();

        let a = mutator.heap().allocate_byte_array(1, AllocKind::Normal);
        mutator.push_root(a.object().value()).unwrap();
        let b = mutator.heap().allocate_byte_array(1, AllocKind::Normal);
        mutator.push_root(b.object().value()).unwrap();

        let old = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(old.object().value()).unwrap();
        old.set_element(0, a.object().value());
        let new = mutator.heap().allocate_array(1, AllocKind::Normal);
        mutator.push_root(new.object().value()).unwrap();
        new.set_element(0, b.object().value());

        assert!(mutator.heap().become_forward(old, new));
        mutator.heap().verify();

        mutator.pop_root();
        mutator.pop_root();
        // the stack root that held the forwarder now reads the forwardee
        mutator.pop_root();
        assert_eq!(mutator.pop_root(), b.object().value());
    }

    #[test]
    fn size_field_overflow_recovers_from_length() {
        let mutator = Mutator::new();
        let heap = mutator.heap();

        // larger than the size field can encode
        let num_bytes = (SIZE_FIELD_MAX + 1) << OBJECT_ALIGNMENT_LOG2;
        let big = heap.allocate_byte_array(num_bytes, AllocKind::Normal);
        assert_eq!(big.object().size_in_header(), 0);
        assert_eq!(
            big.object().heap_size(),
            allocation_size(num_bytes + size_of::<BytesLayout>())
        );
        heap.verify();

        let before = heap.count_instances(BYTE_ARRAY_CID);
        heap.collect_all(GcReason::Explicit);
        assert_eq!(heap.count_instances(BYTE_ARRAY_CID), before - 1);
        heap.verify();
    }

    #[test]
    fn medium_integer_and_float_round_trip() {
        let mut mutator = Mutator::new();
        let heap = mutator.heap();

        let mint = heap.allocate_medium_integer(AllocKind::Normal);
        mint.set_value(i64::min_value());
        assert_eq!(mint.value(), i64::min_value());
        mutator.push_root(mint.object().value()).unwrap();

        let float = mutator.heap().allocate_float64(AllocKind::Normal);
        float.set_value(2.5);
        assert_eq!(float.value(), 2.5);

        mutator.heap().verify();
        mutator.pop_root();
    }

    #[test]
    fn activation_stack_protocol() {
        let mut mutator = Mutator::new();

        let activation = mutator.heap().allocate_activation(AllocKind::Normal);
        mutator.push_root(activation.object().value()).unwrap();
        assert_eq!(activation.stack_depth(), 0);

        activation.push(Value::small(10));
        activation.push(Value::small(20));
        assert_eq!(activation.stack_depth(), 2);
        assert_eq!(activation.temp(1), Value::small(20));

        activation.pop_n_and_push(2, Value::small(30));
        assert_eq!(activation.stack_depth(), 1);
        assert_eq!(activation.temp(0), Value::small(30));

        let receiver = mutator.heap().allocate_array(0, AllocKind::Normal);
        activation.set_receiver(receiver.object().value());
        mutator.heap().collect_all(GcReason::Explicit);
        assert_eq!(activation.receiver(), receiver.object().value());
        mutator.heap().verify();
        mutator.pop_root();
    }

    #[test]
    fn collect_instances_fills_an_array() {
        let mut mutator = Mutator::new();
        let heap = mutator.heap();

        let a = heap.allocate_byte_array(1, AllocKind::Normal);
        mutator.push_root(a.object().value()).unwrap();
        let b = mutator.heap().allocate_byte_array(2, AllocKind::Normal);
        mutator.push_root(b.object().value()).unwrap();

        let total = mutator.heap().count_instances(BYTE_ARRAY_CID);
        assert!(total >= 2);

        let too_small = mutator.heap().allocate_array(total - 1, AllocKind::Normal);
        mutator.push_root(too_small.object().value()).unwrap();
        assert!(mutator
            .heap()
            .collect_instances(BYTE_ARRAY_CID, too_small)
            .is_err());

        let out = mutator.heap().allocate_array(total, AllocKind::Normal);
        mutator.push_root(out.object().value()).unwrap();
        assert_eq!(
            mutator.heap().collect_instances(BYTE_ARRAY_CID, out),
            Ok(total)
        );
        let mut found = 0;
        for i in 0..total {
            let element = out.element(i);
            assert_eq!(element.class_id(), BYTE_ARRAY_CID);
            if element == a.object().value() || element == b.object().value() {
                found += 1;
            }
        }
        assert_eq!(found, 2);
        mutator.heap().verify();

        for _ in 0..4 {
            mutator.pop_root();
        }
    }

    #[test]
    fn gc_is_counted_and_paced_by_allocation() {
        let mutator = Mutator::new();
        let heap = mutator.heap();

        let before = heap.gc_count();
        heap.allocate_array(1, AllocKind::Normal);
        heap.allocate_array(1, AllocKind::Snapshot);
        heap.allocate_array(1, AllocKind::Normal);

        // snapshot allocation takes no step
        assert_eq!(heap.gc_count(), before + 2);
    }

    #[test]
    fn heap_size_tracks_allocation_and_reclamation() {
        let mutator = Mutator::new();
        let heap = mutator.heap();

        let before = heap.size();
        heap.allocate_byte_array(1000, AllocKind::Normal);
        assert!(heap.size() > before);

        heap.collect_all(GcReason::Explicit);
        assert_eq!(heap.size(), before);
        heap.verify();
    }
}
