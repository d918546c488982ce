//! Best-effort human-readable rendering of heap values, for diagnostics and
//! the stress driver. Never allocates on the heap and tolerates partially
//! initialized objects.

use itertools::Itertools;

use crate::activation::MAX_TEMPS;
use crate::arrays::Array;
use crate::behavior::Class;
use crate::bignum::{self, LargeInteger};
use crate::bytes::{ByteString, Bytes};
use crate::header::*;
use crate::heap::Heap;
use crate::numbers::{Float64, MediumInteger};
use crate::object::HeapObject;
use crate::regular::RegularObject;
use crate::value::Value;
use crate::weak::WeakArray;

/// Render a value for debug output. One level deep: nested containers
/// print as their class names.
pub fn to_debug_string(heap: &Heap, value: Value) -> String {
    if value.is_null() {
        return String::from("null");
    }
    if value.is_small_integer() {
        return value.small_value().to_string();
    }

    let obj = HeapObject::from_value(value);
    match obj.cid() {
        FORWARDING_CORPSE_CID => String::from("<forwarded>"),
        FREE_LIST_ELEMENT_CID => String::from("<free>"),
        MEDIUM_INTEGER_CID => MediumInteger::cast(obj).value().to_string(),
        LARGE_INTEGER_CID => bignum::to_decimal_string(LargeInteger::cast(obj)),
        FLOAT64_CID => format!("{:?}", Float64::cast(obj).value()),
        BYTE_ARRAY_CID => {
            let bytes = Bytes::cast(obj);
            format!("#[{}]", bytes.as_slice().iter().join(", "))
        }
        STRING_CID => format!("'{}'", ByteString::cast(obj).as_str()),
        ARRAY_CID => {
            let array = Array::cast(obj);
            format!(
                "{{{}}}",
                (0..array.length())
                    .map(|i| shallow_name(heap, array.element(i)))
                    .join(", ")
            )
        }
        WEAK_ARRAY_CID => format!("<weak array of {}>", WeakArray::cast(obj).length()),
        EPHEMERON_CID => String::from("<ephemeron>"),
        ACTIVATION_CID => format!("<activation of {} temps>", MAX_TEMPS),
        CLOSURE_CID => String::from("<closure>"),
        cid => format!("a {}", class_name(heap, cid)),
    }
}

fn shallow_name(heap: &Heap, value: Value) -> String {
    if value.is_null() {
        return String::from("null");
    }
    if value.is_small_integer() {
        return value.small_value().to_string();
    }
    let cid = HeapObject::from_value(value).cid();
    match cid {
        STRING_CID => format!("'{}'", ByteString::cast(HeapObject::from_value(value)).as_str()),
        ARRAY_CID => String::from("an Array"),
        _ => format!("a {}", class_name(heap, cid)),
    }
}

fn class_name(heap: &Heap, cid: usize) -> String {
    let cls = heap.class_at(cid);
    let name = Class::cast(cls.object()).name();
    if name.is_heap_object() && HeapObject::from_value(name).cid() == STRING_CID {
        String::from(ByteString::cast(HeapObject::from_value(name)).as_str())
    } else {
        format!("<cid {}>", cid)
    }
}

/// Class of any value, via the class table for header cids and through the
/// klass edge for regular objects.
pub fn class_of(heap: &Heap, value: Value) -> Value {
    let cid = value.class_id();
    if cid == EPHEMERON_CID || cid >= FIRST_REGULAR_OBJECT_CID {
        let regular = RegularObject::cast(HeapObject::from_value(value));
        let klass = regular.klass();
        if klass.is_heap_object() {
            return klass;
        }
    }
    heap.class_at(cid).object().value()
}
