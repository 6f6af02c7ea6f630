use super::*;
use crate::comparator::BytewiseComparator;

fn newest_seq() -> u64 {
    u64::MAX >> 8
}

#[test]
fn put_then_find_returns_latest_value() {
    let mt = Memtable::new(BytewiseComparator);
    mt.put(1, b"a", b"one");
    mt.put(2, b"a", b"two");

    let mut it = mt.find(b"a", newest_seq(), ValueType::Value);
    let entry = it.entry().unwrap();
    assert_eq!(entry.value, b"two");
    it.advance();
    let entry = it.entry().unwrap();
    assert_eq!(entry.value, b"one");
}

#[test]
fn iteration_is_sorted_by_internal_key() {
    let mt = Memtable::new(BytewiseComparator);
    mt.put(1, b"banana", b"2");
    mt.put(2, b"apple", b"1");
    mt.put(3, b"cherry", b"3");

    let keys: Vec<Vec<u8>> = mt
        .iter()
        .map(|e| {
            crate::internal_key::unpack(e.internal_key)
                .unwrap()
                .user_key
                .to_vec()
        })
        .collect();
    assert_eq!(keys, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);
}

#[test]
fn delete_inserts_tombstone_with_empty_value() {
    let mt = Memtable::new(BytewiseComparator);
    mt.put(1, b"k", b"v");
    mt.delete(2, b"k");

    let it = mt.find(b"k", newest_seq(), ValueType::Value);
    let entry = it.entry().unwrap();
    let parts = crate::internal_key::unpack(entry.internal_key).unwrap();
    assert_eq!(parts.value_type, ValueType::Deletion);
    assert!(entry.value.is_empty());
}

#[test]
fn bytes_used_grows_with_inserts() {
    let mt = Memtable::new(BytewiseComparator);
    let before = mt.bytes_used();
    for i in 0..100u64 {
        mt.put(i + 1, format!("key{i}").as_bytes(), b"value");
    }
    assert!(mt.bytes_used() > before);
}

#[test]
fn find_on_missing_key_lands_on_next_user_key() {
    let mt = Memtable::new(BytewiseComparator);
    mt.put(1, b"b", b"1");
    mt.put(2, b"d", b"2");

    let it = mt.find(b"c", newest_seq(), ValueType::Value);
    let entry = it.entry().unwrap();
    let parts = crate::internal_key::unpack(entry.internal_key).unwrap();
    assert_eq!(parts.user_key, b"d");
}

#[test]
fn find_past_every_key_reaches_end() {
    let mt = Memtable::new(BytewiseComparator);
    mt.put(1, b"a", b"1");
    let it = mt.find(b"z", newest_seq(), ValueType::Value);
    assert!(it.is_end());
}
