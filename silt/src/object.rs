//! `HeapObject` and the header every heap object carries.
//!
//! An object cell starts with two header words (state bits + size tag +
//! class id, then hash/table-index) followed by the sentinel head of the
//! object's incoming edge list. Typed views in the sibling modules overlay
//! `#[repr(C)]` layout structs on the cell; all of them begin with
//! `ObjectLayout`.
//!
//! `HeapObject` is a copyable tagged word. Its accessors dereference the
//! underlying cell, so they are only meaningful while the object is live;
//! the heap's ownership of the object table is what upholds that.

use std::mem::size_of;

use crate::activation::{ActivationLayout, MAX_TEMPS};
use crate::arrays::Array;
use crate::bignum::{Digit, LargeInteger, LargeIntegerLayout};
use crate::bytes::{Bytes, BytesLayout};
use crate::header::*;
use crate::refs::{Link, Ref};
use crate::regular::RegularObjectLayout;
use crate::value::{Value, HEAP_OBJECT_TAG};
use crate::weak::WeakArray;

/// The fixed prefix of every heap object
#[repr(C)]
pub struct ObjectLayout {
    pub(crate) header: usize,
    pub(crate) hash_index: usize,
    pub(crate) incoming: Link,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct HeapObject(Value);

impl Value {
    /// Class id of any value; total because small integers carry cid 3
    pub fn class_id(self) -> usize {
        if self.is_small_integer() {
            SMALL_INTEGER_CID
        } else {
            HeapObject::from_value(self).cid()
        }
    }
}

impl HeapObject {
    pub fn from_value(value: Value) -> HeapObject {
        debug_assert!(value.is_heap_object());
        HeapObject(value)
    }

    pub fn from_addr(addr: usize) -> HeapObject {
        HeapObject(Value::from_raw(addr + HEAP_OBJECT_TAG))
    }

    pub fn value(self) -> Value {
        self.0
    }

    pub fn addr(self) -> usize {
        self.0.raw() - HEAP_OBJECT_TAG
    }

    pub(crate) fn layout(self) -> *mut ObjectLayout {
        self.addr() as *mut ObjectLayout
    }

    fn header_word(self) -> usize {
        unsafe { (*self.layout()).header }
    }

    fn set_header_word(self, word: usize) {
        unsafe { (*self.layout()).header = word }
    }

    fn hash_index_word(self) -> usize {
        unsafe { (*self.layout()).hash_index }
    }

    fn set_hash_index_word(self, word: usize) {
        unsafe { (*self.layout()).hash_index = word }
    }

    pub fn is_marked(self) -> bool {
        self.header_word() & MARK_BIT != 0
    }

    pub fn set_is_marked(self, value: bool) {
        self.set_header_bit(MARK_BIT, value)
    }

    pub fn is_weak_referent(self) -> bool {
        self.header_word() & WEAK_REFERENT_BIT != 0
    }

    pub fn set_is_weak_referent(self, value: bool) {
        self.set_header_bit(WEAK_REFERENT_BIT, value)
    }

    pub fn in_class_table(self) -> bool {
        self.header_word() & IN_CLASS_TABLE_BIT != 0
    }

    pub fn set_in_class_table(self, value: bool) {
        self.set_header_bit(IN_CLASS_TABLE_BIT, value)
    }

    pub fn is_canonical(self) -> bool {
        self.header_word() & CANONICAL_BIT != 0
    }

    pub fn set_is_canonical(self, value: bool) {
        self.set_header_bit(CANONICAL_BIT, value)
    }

    fn set_header_bit(self, bit: usize, value: bool) {
        let word = self.header_word();
        self.set_header_word(if value { word | bit } else { word & !bit });
    }

    /// The size as encoded in the header; zero when the true size did not
    /// fit the field and must be recovered from the class layout
    pub fn size_in_header(self) -> usize {
        header_size_tag(self.header_word()) << OBJECT_ALIGNMENT_LOG2
    }

    pub fn cid(self) -> usize {
        header_cid(self.header_word())
    }

    pub fn set_cid(self, cid: usize) {
        self.set_header_word(update_header_cid(self.header_word(), cid));
    }

    pub fn header_hash(self) -> usize {
        hash_word_hash(self.hash_index_word())
    }

    pub fn set_header_hash(self, hash: usize) {
        self.set_hash_index_word(update_hash_word_hash(self.hash_index_word(), hash));
    }

    pub fn table_index(self) -> usize {
        hash_word_index(self.hash_index_word())
    }

    pub fn set_table_index(self, index: usize) {
        self.set_hash_index_word(update_hash_word_index(self.hash_index_word(), index));
    }

    pub fn incoming(self) -> *mut Link {
        unsafe { &mut (*self.layout()).incoming as *mut Link }
    }

    pub fn incoming_is_empty(self) -> bool {
        unsafe { (*self.incoming()).is_empty() }
    }

    /// Stamp a fresh header over the cell at `addr`. The size tag is zeroed
    /// when the size exceeds the field, which is only legal for the sentinel
    /// kinds and variable-length layouts that can recover it.
    pub fn initialize(addr: usize, cid: usize, heap_size: usize) -> HeapObject {
        debug_assert!(cid != ILLEGAL_CID);
        debug_assert!(heap_size & OBJECT_ALIGNMENT_MASK == 0);
        debug_assert!(heap_size > 0);

        let mut size_tag = heap_size >> OBJECT_ALIGNMENT_LOG2;
        if size_tag > SIZE_FIELD_MAX {
            size_tag = 0;
            debug_assert!(cid < FIRST_REGULAR_OBJECT_CID);
        }

        let obj = HeapObject::from_addr(addr);
        obj.set_header_word(encode_header(size_tag, cid));
        obj.set_hash_index_word(0);
        unsafe { (*obj.incoming()).init() };

        debug_assert!(obj.cid() == cid);
        debug_assert!(!obj.is_marked());
        obj
    }

    /// The object's allocation size in bytes, consulting the class layout
    /// when the header tag overflowed
    pub fn heap_size(self) -> usize {
        let tagged = self.size_in_header();
        if tagged != 0 {
            return tagged;
        }
        self.heap_size_from_class()
    }

    fn heap_size_from_class(self) -> usize {
        match self.cid() {
            FORWARDING_CORPSE_CID => ForwardingCorpse::cast(self).overflow_size(),
            FREE_LIST_ELEMENT_CID => FreeListElement::cast(self).overflow_size(),
            BYTE_ARRAY_CID | STRING_CID => {
                let length = Bytes::cast_unchecked(self).length();
                allocation_size(length + size_of::<BytesLayout>())
            }
            ARRAY_CID => {
                let length = Array::cast(self).length();
                allocation_size(length * size_of::<Ref>() + size_of::<crate::arrays::ArrayLayout>())
            }
            WEAK_ARRAY_CID => {
                let length = WeakArray::cast(self).length();
                allocation_size(length * size_of::<Ref>() + size_of::<crate::weak::WeakArrayLayout>())
            }
            LARGE_INTEGER_CID => {
                let capacity = LargeInteger::cast(self).capacity();
                allocation_size(capacity * size_of::<Digit>() + size_of::<LargeIntegerLayout>())
            }
            // fixed-size layouts always fit the size field
            cid => unreachable!("size overflow for cid {}", cid),
        }
    }

    /// The object's outgoing edges as (first slot, slot count). Byte-shaped
    /// and numeric objects have none.
    pub fn pointer_span(self) -> (*mut Ref, usize) {
        unsafe {
            match self.cid() {
                ARRAY_CID => {
                    let arr = Array::cast(self);
                    match arr.length() {
                        0 => (std::ptr::null_mut(), 0),
                        len => (arr.element_ref(0), len),
                    }
                }
                WEAK_ARRAY_CID => {
                    let arr = WeakArray::cast(self);
                    match arr.length() {
                        0 => (std::ptr::null_mut(), 0),
                        len => (arr.element_ref(0), len),
                    }
                }
                ACTIVATION_CID => {
                    let layout = self.addr() as *mut ActivationLayout;
                    let first = &mut (*layout).sender as *mut Ref;
                    (first, 6 + MAX_TEMPS)
                }
                CLOSURE_CID => {
                    let layout = self.addr() as *mut crate::activation::ClosureLayout;
                    let first = &mut (*layout).defining_activation as *mut Ref;
                    let copied = crate::activation::Closure::cast(self).num_copied();
                    (first, 3 + copied)
                }
                cid if cid == EPHEMERON_CID || cid >= FIRST_REGULAR_OBJECT_CID => {
                    let layout = self.addr() as *mut RegularObjectLayout;
                    let first = &mut (*layout).klass as *mut Ref;
                    let slots =
                        (self.heap_size() - size_of::<RegularObjectLayout>()) / size_of::<Ref>();
                    (first, 1 + slots)
                }
                _ => (std::ptr::null_mut(), 0),
            }
        }
    }
}

/// Walk every outgoing edge slot of an object
pub(crate) fn for_each_pointer(obj: HeapObject, mut f: impl FnMut(*mut Ref)) {
    let (first, count) = obj.pointer_span();
    for i in 0..count {
        f(unsafe { first.add(i) });
    }
}

/// The tombstone left behind by become: the hash/index word is repurposed
/// to hold the forward target.
#[repr(C)]
pub(crate) struct ForwardingCorpseLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) overflow_size: usize,
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ForwardingCorpse(HeapObject);

impl ForwardingCorpse {
    pub fn cast(obj: HeapObject) -> ForwardingCorpse {
        debug_assert!(obj.cid() == FORWARDING_CORPSE_CID);
        ForwardingCorpse(obj)
    }

    fn layout(self) -> *mut ForwardingCorpseLayout {
        self.0.addr() as *mut ForwardingCorpseLayout
    }

    pub fn object(self) -> HeapObject {
        self.0
    }

    pub fn target(self) -> Value {
        Value::from_raw(unsafe { (*self.layout()).base.hash_index })
    }

    pub fn set_target(self, value: Value) {
        unsafe { (*self.layout()).base.hash_index = value.raw() }
    }

    pub fn overflow_size(self) -> usize {
        unsafe { (*self.layout()).overflow_size }
    }

    pub fn set_overflow_size(self, size: usize) {
        unsafe { (*self.layout()).overflow_size = size }
    }
}

/// Reserved header shape for free storage threaded through a table slot;
/// shares the corpse layout, with the hash/index word as the next link.
#[repr(C)]
pub(crate) struct FreeListElementLayout {
    pub(crate) base: ObjectLayout,
    pub(crate) overflow_size: usize,
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct FreeListElement(HeapObject);

impl FreeListElement {
    pub fn cast(obj: HeapObject) -> FreeListElement {
        debug_assert!(obj.cid() == FREE_LIST_ELEMENT_CID);
        FreeListElement(obj)
    }

    fn layout(self) -> *mut FreeListElementLayout {
        self.0.addr() as *mut FreeListElementLayout
    }

    pub fn next(self) -> Value {
        Value::from_raw(unsafe { (*self.layout()).base.hash_index })
    }

    pub fn set_next(self, value: Value) {
        debug_assert!(value.is_null() || value.is_heap_object());
        unsafe { (*self.layout()).base.hash_index = value.raw() }
    }

    pub fn overflow_size(self) -> usize {
        unsafe { (*self.layout()).overflow_size }
    }

    pub fn set_overflow_size(self, size: usize) {
        unsafe { (*self.layout()).overflow_size = size }
    }
}
