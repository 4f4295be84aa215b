use helpers::reviews::create_vocabulary;
use rand::{rngs::StdRng, SeedableRng};
use review_index::{
    base::Len,
    compress::{decode_sequence, encode, encode_into},
    dictionary::{DictionaryBuilder, TermDictionary},
};
use rstest::rstest;

/// Number of bytes of the code of `n` (header included)
fn code_bytes(n: u32) -> usize {
    let k = (u32::BITS - n.leading_zeros()) as usize;
    1 + (2 * k - 1 + 7) / 8
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(127)]
#[case(128)]
#[case(16383)]
#[case((1 << 20) - 1)]
#[case(1 << 30)]
fn codec_round_trip(#[case] n: u32) {
    let bytes = encode(n).unwrap();
    assert_eq!(bytes.len(), code_bytes(n));
    assert_eq!(decode_sequence(&bytes).unwrap(), vec![n]);
}

#[test]
fn codec_sequence() {
    let values = [1, 2, 127, 128, 16383, (1 << 20) - 1, 1 << 30, 5, 1];
    let mut bytes = Vec::new();
    for value in values {
        encode_into(value, &mut bytes).unwrap();
    }
    assert_eq!(
        bytes.len(),
        values.iter().map(|&v| code_bytes(v)).sum::<usize>()
    );
    assert_eq!(decode_sequence(&bytes).unwrap(), values.to_vec());
}

fn dictionary(keys: &[String], block_size: usize) -> TermDictionary {
    let mut builder = DictionaryBuilder::new(block_size).unwrap();
    for (ix, key) in keys.iter().enumerate() {
        builder.push(key, 2 * ix as u32).unwrap();
    }
    TermDictionary::open(builder.finish()).unwrap()
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(6)]
#[case(24)]
#[case(1000)]
fn front_coding_round_trip(#[case] block_size: usize) {
    let mut rng = StdRng::seed_from_u64(block_size as u64);
    let keys = create_vocabulary(300, &mut rng);
    let dictionary = dictionary(&keys, block_size);

    assert_eq!(dictionary.len(), keys.len());
    assert_eq!(dictionary.num_blocks(), keys.len().div_ceil(block_size));
    for (ix, key) in keys.iter().enumerate() {
        assert_eq!(dictionary.lookup(key), Some(ix), "lookup of {}", key);
        assert_eq!(dictionary.key_at(ix).unwrap().as_ref(), Some(key));
        assert_eq!(dictionary.posting_offset(ix), Some(2 * ix as u64));
    }
    assert_eq!(dictionary.key_at(keys.len()).unwrap(), None);

    let iterated: Vec<Vec<u8>> = dictionary.keys().collect();
    assert_eq!(
        iterated,
        keys.iter().map(|k| k.as_bytes().to_vec()).collect::<Vec<_>>()
    );
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(24)]
fn block_search_matches_scan(#[case] block_size: usize) {
    let mut rng = StdRng::seed_from_u64(17);
    let vocabulary = create_vocabulary(400, &mut rng);

    // Index every other word, the others are absent
    let keys: Vec<String> = vocabulary.iter().step_by(2).cloned().collect();
    let dictionary = dictionary(&keys, block_size);

    for word in vocabulary.iter() {
        let expected = keys.iter().position(|k| k == word);
        assert_eq!(dictionary.lookup(word), expected, "lookup of {}", word);
    }
    for absent in ["", "~", "0000000000", "hhhhhhhhh"] {
        assert_eq!(
            dictionary.lookup(absent),
            keys.iter().position(|k| k == absent)
        );
    }
}
