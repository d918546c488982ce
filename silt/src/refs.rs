//! Edge records.
//!
//! Every slot that can hold a heap reference is a `Ref`: a `(from, to)` pair
//! threaded onto the incoming list of its current target. The incoming list
//! is a circular doubly-linked list whose sentinel head lives in the target's
//! header, so "who points at me" is answerable in place. That is what lets
//! reclamation walk backwards instead of tracing forward from roots.
//!
//! A linked `Ref` must never move: its neighbors hold its address. Refs live
//! either inside an object's cell (one per outgoing slot) or in a pinned
//! root holder (a boxed field, a fixed stack slot).

use crate::object::HeapObject;
use crate::value::Value;

/// A node in a circular doubly-linked list. A sentinel head is "empty" when
/// both links point at itself.
#[repr(C)]
pub struct Link {
    pub(crate) prev: *mut Link,
    pub(crate) next: *mut Link,
}

impl Link {
    pub fn init(&mut self) {
        let this = self as *mut Link;
        self.prev = this;
        self.next = this;
    }

    pub fn is_empty(&self) -> bool {
        self.next as *const Link == self as *const Link
    }

    /// Splice `new_link` into the list headed by `self`. `new_link` must be
    /// self-linked.
    pub unsafe fn insert(&mut self, new_link: *mut Link) {
        debug_assert!((*new_link).next == new_link);
        debug_assert!((*new_link).prev == new_link);

        let before = self.prev;
        let after = self as *mut Link;

        (*before).next = new_link;
        (*new_link).prev = before;

        (*after).prev = new_link;
        (*new_link).next = after;
    }

    /// Unsplice `self` from its list and return it to the self-linked state.
    pub unsafe fn remove(&mut self) {
        let this = self as *mut Link;
        debug_assert!(self.next != this);
        debug_assert!(self.prev != this);

        let before = self.prev;
        let after = self.next;
        (*before).next = after;
        (*after).prev = before;

        self.prev = this;
        self.next = this;
    }
}

/// An edge: one reference-carrying slot. When `to` is a heap object the edge
/// is a member of that object's incoming list; when `to` is a small integer
/// or null the link is self-linked and carries no list membership. A null
/// `from` marks the edge as a GC root rather than a graph edge.
#[repr(C)]
pub struct Ref {
    pub(crate) link: Link,
    pub(crate) from: Value,
    pub(crate) to: Value,
}

impl Ref {
    /// An edge with no list membership and null endpoints. Must be placed at
    /// its final address and re-initialized with `init`/`init_root` before
    /// use.
    pub fn new_unlinked() -> Ref {
        Ref {
            link: Link {
                prev: std::ptr::null_mut(),
                next: std::ptr::null_mut(),
            },
            from: Value::null(),
            to: Value::null(),
        }
    }

    pub fn target(&self) -> Value {
        self.to
    }

    pub fn source(&self) -> Value {
        self.from
    }

    pub fn is_root(&self) -> bool {
        self.from.is_null()
    }

    /// First initialization of an edge in fresh or neutral storage. Does not
    /// read the previous contents, so it is the only operation legal on an
    /// uninitialized slot.
    pub fn init(&mut self, source: Value, target: Value) {
        self.link.init();
        self.from = source;
        self.to = target;
        if target.is_heap_object() {
            unsafe {
                (*HeapObject::from_value(target).incoming()).insert(&mut self.link);
            }
            debug_assert!(!self.link.is_empty());
        }
    }

    /// Initialize a root edge: `from` is null so the collector treats any
    /// object this edge reaches as live.
    pub fn init_root(&mut self, target: Value) {
        self.init(Value::null(), target);
    }

    /// Retarget an initialized edge, maintaining incoming-list membership on
    /// both sides. `source` must match the edge's recorded source.
    pub fn update(&mut self, source: Value, target: Value) {
        debug_assert!(self.from == source);
        debug_assert!(source.is_null() || source.is_heap_object());
        self.update_no_check(target);
    }

    pub fn update_no_check(&mut self, target: Value) {
        if self.to.is_heap_object() {
            unsafe { self.link.remove() };
        } else {
            debug_assert!(self.link.is_empty());
        }
        self.to = target;
        if target.is_heap_object() {
            unsafe {
                (*HeapObject::from_value(target).incoming()).insert(&mut self.link);
            }
            debug_assert!(!self.link.is_empty());
        }
    }
}
