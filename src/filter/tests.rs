use super::*;

#[test]
fn no_false_negatives_across_many_keys() {
    let keys: Vec<Vec<u8>> = (0..500).map(|i| format!("key-{i}").into_bytes()).collect();
    let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
    let filter = BloomFilter::build(&refs);
    for key in &keys {
        assert!(filter.might_contain(key), "false negative for {key:?}");
    }
}

#[test]
fn absent_keys_are_mostly_rejected() {
    let keys: Vec<Vec<u8>> = (0..1000).map(|i| format!("present-{i}").into_bytes()).collect();
    let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
    let filter = BloomFilter::build(&refs);

    let mut false_positives = 0;
    for i in 0..1000 {
        let probe = format!("absent-{i}").into_bytes();
        if filter.might_contain(&probe) {
            false_positives += 1;
        }
    }
    // generous bound: default bits_per_key=10 targets ~1% FP rate.
    assert!(false_positives < 50, "too many false positives: {false_positives}");
}

#[test]
fn encode_decode_round_trip_preserves_membership() {
    let keys: [&[u8]; 3] = [b"alpha", b"beta", b"gamma"];
    let filter = BloomFilter::build(&keys);
    let encoded = filter.encode();
    let decoded = BloomFilter::decode(&encoded).unwrap();
    for key in keys {
        assert!(decoded.might_contain(key));
    }
}

#[test]
fn empty_filter_rejects_everything_probabilistically() {
    let filter = BloomFilter::new(0, 10);
    assert!(!filter.might_contain(b"anything"));
}
