//! Object header encoding: class-id constants, alignment, and the bitfields
//! packed into the two header words that prefix every heap object.
//!
//! Word one holds the state bits, the size tag and the class id. Word two
//! holds the identity hash in its high half and the object-table index in
//! its low half; a forwarding corpse repurposes the entire word as the
//! forward target.

use std::mem::size_of;

// Reserved class ids. Small integers have no heap representation but
// participate as cid 3 so `Value::class_id` is total.
pub const ILLEGAL_CID: usize = 0;
pub const FORWARDING_CORPSE_CID: usize = 1;
pub const FREE_LIST_ELEMENT_CID: usize = 2;

pub const FIRST_LEGAL_CID: usize = 3;

pub const SMALL_INTEGER_CID: usize = 3;
pub const MEDIUM_INTEGER_CID: usize = 4;
pub const LARGE_INTEGER_CID: usize = 5;
pub const FLOAT64_CID: usize = 6;
pub const BYTE_ARRAY_CID: usize = 7;
pub const STRING_CID: usize = 8;
pub const ARRAY_CID: usize = 9;
pub const WEAK_ARRAY_CID: usize = 10;
pub const EPHEMERON_CID: usize = 11;
pub const ACTIVATION_CID: usize = 12;
pub const CLOSURE_CID: usize = 13;

pub const FIRST_REGULAR_OBJECT_CID: usize = 14;

pub const WORD_SIZE: usize = size_of::<usize>();
pub const WORD_SIZE_LOG2: usize = WORD_SIZE.trailing_zeros() as usize;

// Object sizes are aligned to twice the word size; the size tag counts in
// units of this granularity.
pub const OBJECT_ALIGNMENT: usize = 2 * WORD_SIZE;
pub const OBJECT_ALIGNMENT_LOG2: usize = WORD_SIZE_LOG2 + 1;
pub const OBJECT_ALIGNMENT_MASK: usize = OBJECT_ALIGNMENT - 1;

/// Round a byte count up to the object alignment granularity
pub fn allocation_size(size: usize) -> usize {
    (size + OBJECT_ALIGNMENT_MASK) & !OBJECT_ALIGNMENT_MASK
}

// Header word, low to high:
//   bit 0  mark (in the backtracing worklist)
//   bit 1  weak referent (a weak array or ephemeron key edge points here)
//   bit 2  registered in the class table
//   bit 3  canonical (interned symbols)
//   then the size tag, then the class id.
pub const MARK_BIT: usize = 1 << 0;
pub const WEAK_REFERENT_BIT: usize = 1 << 1;
pub const IN_CLASS_TABLE_BIT: usize = 1 << 2;
pub const CANONICAL_BIT: usize = 1 << 3;

#[cfg(target_pointer_width = "64")]
pub const SIZE_FIELD_SHIFT: usize = 16;
#[cfg(target_pointer_width = "64")]
pub const SIZE_FIELD_BITS: usize = 16;
#[cfg(target_pointer_width = "64")]
pub const CLASS_ID_FIELD_SHIFT: usize = 32;
#[cfg(target_pointer_width = "64")]
pub const CLASS_ID_FIELD_BITS: usize = 32;

#[cfg(target_pointer_width = "32")]
pub const SIZE_FIELD_SHIFT: usize = 8;
#[cfg(target_pointer_width = "32")]
pub const SIZE_FIELD_BITS: usize = 8;
#[cfg(target_pointer_width = "32")]
pub const CLASS_ID_FIELD_SHIFT: usize = 16;
#[cfg(target_pointer_width = "32")]
pub const CLASS_ID_FIELD_BITS: usize = 16;

pub const SIZE_FIELD_MAX: usize = (1 << SIZE_FIELD_BITS) - 1;
pub const CLASS_ID_FIELD_MAX: usize = (1 << CLASS_ID_FIELD_BITS) - 1;

const SIZE_FIELD_MASK: usize = SIZE_FIELD_MAX << SIZE_FIELD_SHIFT;
const CLASS_ID_FIELD_MASK: usize = CLASS_ID_FIELD_MAX << CLASS_ID_FIELD_SHIFT;

pub fn encode_header(size_tag: usize, cid: usize) -> usize {
    debug_assert!(size_tag <= SIZE_FIELD_MAX);
    debug_assert!(cid != ILLEGAL_CID && cid <= CLASS_ID_FIELD_MAX);
    (size_tag << SIZE_FIELD_SHIFT) | (cid << CLASS_ID_FIELD_SHIFT)
}

pub fn header_size_tag(header: usize) -> usize {
    (header & SIZE_FIELD_MASK) >> SIZE_FIELD_SHIFT
}

pub fn header_cid(header: usize) -> usize {
    (header & CLASS_ID_FIELD_MASK) >> CLASS_ID_FIELD_SHIFT
}

pub fn update_header_cid(header: usize, cid: usize) -> usize {
    debug_assert!(cid != ILLEGAL_CID && cid <= CLASS_ID_FIELD_MAX);
    (header & !CLASS_ID_FIELD_MASK) | (cid << CLASS_ID_FIELD_SHIFT)
}

// Hash/index word: low half is the object-table index, high half the
// identity hash.
pub const INDEX_FIELD_BITS: usize = WORD_SIZE * 8 / 2;
pub const INDEX_FIELD_MASK: usize = (1 << INDEX_FIELD_BITS) - 1;
pub const HASH_FIELD_MAX: usize = INDEX_FIELD_MASK;

pub fn hash_word_index(word: usize) -> usize {
    word & INDEX_FIELD_MASK
}

pub fn hash_word_hash(word: usize) -> usize {
    word >> INDEX_FIELD_BITS
}

pub fn update_hash_word_index(word: usize, index: usize) -> usize {
    debug_assert!(index <= INDEX_FIELD_MASK);
    (word & !INDEX_FIELD_MASK) | index
}

pub fn update_hash_word_hash(word: usize, hash: usize) -> usize {
    debug_assert!(hash <= HASH_FIELD_MAX);
    (word & INDEX_FIELD_MASK) | (hash << INDEX_FIELD_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let h = encode_header(12, ARRAY_CID);
        assert_eq!(header_size_tag(h), 12);
        assert_eq!(header_cid(h), ARRAY_CID);
        assert_eq!(h & MARK_BIT, 0);
    }

    #[test]
    fn cid_rewrite_preserves_rest() {
        let h = encode_header(SIZE_FIELD_MAX, CLOSURE_CID) | MARK_BIT | CANONICAL_BIT;
        let h = update_header_cid(h, FIRST_REGULAR_OBJECT_CID);
        assert_eq!(header_cid(h), FIRST_REGULAR_OBJECT_CID);
        assert_eq!(header_size_tag(h), SIZE_FIELD_MAX);
        assert_ne!(h & MARK_BIT, 0);
        assert_ne!(h & CANONICAL_BIT, 0);
    }

    #[test]
    fn hash_word_halves() {
        let w = update_hash_word_index(0, 77);
        let w = update_hash_word_hash(w, 0xbeef);
        assert_eq!(hash_word_index(w), 77);
        assert_eq!(hash_word_hash(w), 0xbeef);

        let w = update_hash_word_index(w, 3);
        assert_eq!(hash_word_index(w), 3);
        assert_eq!(hash_word_hash(w), 0xbeef);
    }

    #[test]
    fn alignment_rounding() {
        assert_eq!(allocation_size(1), OBJECT_ALIGNMENT);
        assert_eq!(allocation_size(OBJECT_ALIGNMENT), OBJECT_ALIGNMENT);
        assert_eq!(
            allocation_size(OBJECT_ALIGNMENT + 1),
            2 * OBJECT_ALIGNMENT
        );
    }
}
