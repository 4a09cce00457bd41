//! Property tests: indexed search must agree with a direct scan.

use proptest::prelude::*;
use sigindex::{index::BLOCK_LEN, ByteIndex, Signature};

/// Buffers over a small alphabet so signatures actually hit
fn buffer() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![0x00u8, 0x48, 0x8B, 0x90, 0xCC, 0xFF]), 0..600)
}

/// Pattern octets: `None` is a wildcard
fn pattern() -> impl Strategy<Value = Vec<Option<u8>>> {
    prop::collection::vec(
        prop_oneof![
            3 => prop::sample::select(vec![0x00u8, 0x48, 0x8B, 0x90, 0xCC, 0xFF]).prop_map(Some),
            1 => Just(None),
        ],
        2..8,
    )
    .prop_filter("needs two concrete bytes", |octets| {
        octets.iter().flatten().count() >= 2
    })
}

fn render(octets: &[Option<u8>]) -> String {
    octets
        .iter()
        .map(|octet| match octet {
            Some(byte) => format!("{byte:02x}"),
            None => "??".to_owned(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn naive_find_all(buf: &[u8], sig: &Signature) -> Vec<usize> {
    (0..buf.len()).filter(|&at| sig.matches_at(buf, at)).collect()
}

proptest! {
    #[test]
    fn find_all_agrees_with_direct_scan(buf in buffer(), octets in pattern()) {
        let sig = Signature::parse(&render(&octets)).unwrap();
        let index = ByteIndex::new(&buf).unwrap();

        let found = index.find_all(&sig);

        prop_assert_eq!(&found, &naive_find_all(&buf, &sig));
        prop_assert!(found.windows(2).all(|w| w[0] < w[1]));
        for &at in &found {
            prop_assert!(at + sig.len() <= buf.len());
            for &(pos, value) in sig.concrete() {
                prop_assert_eq!(buf[at + pos], value);
            }
        }
    }

    #[test]
    fn find_first_is_head_of_find_all(buf in buffer(), octets in pattern()) {
        let sig = Signature::parse(&render(&octets)).unwrap();
        let index = ByteIndex::new(&buf).unwrap();

        prop_assert_eq!(index.find_first(&sig), index.find_all(&sig).first().copied());
    }

    #[test]
    fn count_matches_occurrences(buf in prop::collection::vec(any::<u8>(), 0..2048)) {
        let index = ByteIndex::new(&buf).unwrap();

        for value in 0..=255u8 {
            let expected = buf.iter().filter(|&&b| b == value).count() as u32;
            prop_assert_eq!(index.count(value), expected);
            prop_assert_eq!(index.offsets(value).count() as u32, expected);
        }
    }

    #[test]
    fn rebuilding_is_idempotent(buf in buffer(), octets in pattern()) {
        let sig = Signature::parse(&render(&octets)).unwrap();

        let first = ByteIndex::new(&buf).unwrap().find_all(&sig);
        let second = ByteIndex::new(&buf).unwrap().find_all(&sig);

        prop_assert_eq!(first, second);
    }

    #[test]
    fn rendered_signatures_parse_back(octets in pattern()) {
        let sig = Signature::parse(&render(&octets)).unwrap();
        prop_assert_eq!(Signature::parse(&sig.to_string()), Ok(sig));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn matches_across_blocks(
        marks in prop::collection::btree_set(0..BLOCK_LEN * 3 - 16, 1..12),
        gap in 1usize..16,
    ) {
        let mut buf = vec![0x90u8; BLOCK_LEN * 3];
        for &at in &marks {
            buf[at] = 0xE8;
            buf[at + gap] = 0xC3;
        }

        let text = format!("E8{} C3", " ??".repeat(gap - 1));
        let sig = Signature::parse(&text).unwrap();
        let index = ByteIndex::new(&buf).unwrap();

        prop_assert_eq!(index.find_all(&sig), naive_find_all(&buf, &sig));
    }
}
