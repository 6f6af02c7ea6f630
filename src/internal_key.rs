//! Internal key packing and the comparator that lifts a user comparator
//! over it.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::codec::{get_fixed64, put_fixed64};
use crate::comparator::Comparator;

/// A 1-byte value-type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    /// A tombstone; carries an empty value.
    Deletion = 0x00,
    /// An ordinary put.
    Value = 0x01,
}

impl ValueType {
    /// Decodes a raw tag byte.
    pub fn from_u8(b: u8) -> Option<ValueType> {
        match b {
            0x00 => Some(ValueType::Deletion),
            0x01 => Some(ValueType::Value),
            _ => None,
        }
    }
}

const TRAILER_LEN: usize = 8;

/// Packs `(user_key, sequence, type)` into `user_key ‖ u64_le((seq<<8)|type)`.
///
/// `sequence` is a 56-bit monotone counter; only its low 56 bits are used.
pub fn pack(user_key: &[u8], sequence: u64, value_type: ValueType) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_key.len() + TRAILER_LEN);
    out.extend_from_slice(user_key);
    let trailer = (sequence << 8) | (value_type as u64);
    put_fixed64(&mut out, trailer);
    out
}

/// The decoded parts of an internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalKeyParts<'a> {
    /// The original user-supplied key.
    pub user_key: &'a [u8],
    /// The sequence number the mutation was assigned.
    pub sequence: u64,
    /// Whether this is a put or a tombstone.
    pub value_type: ValueType,
}

/// Decodes `packed` into its constituent parts.
///
/// `packed` must be at least 8 bytes long; the last 8 bytes are the
/// trailer, everything before is the user key.
pub fn unpack(packed: &[u8]) -> Option<InternalKeyParts<'_>> {
    if packed.len() < TRAILER_LEN {
        return None;
    }
    let split = packed.len() - TRAILER_LEN;
    let (user_key, trailer_bytes) = packed.split_at(split);
    let trailer = get_fixed64(trailer_bytes).ok()?;
    let value_type = ValueType::from_u8((trailer & 0xff) as u8)?;
    let sequence = trailer >> 8;
    Some(InternalKeyParts {
        user_key,
        sequence,
        value_type,
    })
}

/// Lifts a user [`Comparator`] into a comparator over packed internal keys:
/// compares user keys first, and among equal user keys orders by
/// descending sequence number (newer mutations sort first).
pub struct InternalKeyComparator<C: Comparator> {
    user_cmp: Arc<C>,
}

impl<C: Comparator> InternalKeyComparator<C> {
    /// Wraps `user_cmp` as the user-key order.
    pub fn new(user_cmp: Arc<C>) -> Self {
        InternalKeyComparator { user_cmp }
    }

    /// The wrapped user comparator.
    pub fn user_comparator(&self) -> &C {
        &self.user_cmp
    }
}

// Hand-written rather than derived so this doesn't require `C: Clone`;
// cloning only bumps the `Arc`'s refcount.
impl<C: Comparator> Clone for InternalKeyComparator<C> {
    fn clone(&self) -> Self {
        InternalKeyComparator {
            user_cmp: Arc::clone(&self.user_cmp),
        }
    }
}

impl<C: Comparator> Comparator for InternalKeyComparator<C> {
    fn name(&self) -> &'static str {
        "lessdb.InternalKeyComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let pa = unpack(a).expect("internal key shorter than trailer");
        let pb = unpack(b).expect("internal key shorter than trailer");

        let user_order = self.user_cmp.compare(pa.user_key, pb.user_key);
        if user_order != Ordering::Equal {
            return user_order;
        }
        // Larger packed trailer -> earlier, because sequence dominates the
        // high bits and newer writes must be reported first.
        let ta = (pa.sequence << 8) | (pa.value_type as u64);
        let tb = (pb.sequence << 8) | (pb.value_type as u64);
        tb.cmp(&ta)
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let Some(start_parts) = unpack(start) else {
            return;
        };
        let Some(limit_parts) = unpack(limit) else {
            return;
        };
        let mut user_start = start_parts.user_key.to_vec();
        self.user_cmp
            .find_shortest_separator(&mut user_start, limit_parts.user_key);
        if user_start.len() < start_parts.user_key.len()
            && self
                .user_cmp
                .compare(start_parts.user_key, &user_start)
                == Ordering::Less
        {
            // a shorter user key was found; append the largest possible
            // trailer so this separator still sorts before any mutation of
            // that same (shortened) user key.
            let mut out = user_start;
            put_fixed64(&mut out, u64::MAX);
            *start = out;
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let Some(parts) = unpack(key) else {
            return;
        };
        let mut user_key = parts.user_key.to_vec();
        self.user_cmp.find_short_successor(&mut user_key);
        if user_key.len() < parts.user_key.len()
            && self.user_cmp.compare(parts.user_key, &user_key) == Ordering::Less
        {
            let mut out = user_key;
            put_fixed64(&mut out, u64::MAX);
            *key = out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;

    #[test]
    fn pack_unpack_round_trip() {
        let packed = pack(b"abc", 1, ValueType::Value);
        let parts = unpack(&packed).unwrap();
        assert_eq!(parts.user_key, b"abc");
        assert_eq!(parts.sequence, 1);
        assert_eq!(parts.value_type, ValueType::Value);
    }

    #[test]
    fn pack_matches_spec_example() {
        let packed = pack(b"abc", 1, ValueType::Value);
        let mut expected = b"abc".to_vec();
        expected.extend_from_slice(&0x0100000000000000u64.to_le_bytes());
        assert_eq!(packed, expected);
    }

    #[test]
    fn newer_sequence_sorts_first() {
        let cmp = InternalKeyComparator::new(Arc::new(BytewiseComparator));
        let older = pack(b"abc", 1, ValueType::Value);
        let newer = pack(b"abc", 2, ValueType::Value);
        // newer (seq=2) must compare less than older (seq=1): sorts first.
        assert_eq!(cmp.compare(&newer, &older), Ordering::Less);
        assert_eq!(cmp.compare(&older, &newer), Ordering::Greater);
    }

    #[test]
    fn user_key_dominates_sequence() {
        let cmp = InternalKeyComparator::new(Arc::new(BytewiseComparator));
        let a = pack(b"a", 100, ValueType::Value);
        let b = pack(b"b", 1, ValueType::Value);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
    }
}
