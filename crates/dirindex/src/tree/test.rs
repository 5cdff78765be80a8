use std::collections::BTreeMap;

use dirindex_types::comparator::{natural, reversed};
use itertools::Itertools;
use proptest::{collection::vec, prelude::*};

use super::format::check_payload_len;
use super::{OrderedTree, TreeSerializer};
use crate::codec::{I64Codec, StringCodec, U64Codec, UnitCodec};
use crate::cursor::Cursor;
use crate::error::{DecodeError, IndexError};
use crate::test::init_test_logger;

fn set_of(keys: &[i64]) -> OrderedTree<i64> {
    let mut tree = OrderedTree::new(natural());
    for &key in keys {
        tree.insert(key, ());
    }
    tree.validate();
    tree
}

fn keys_of(tree: &OrderedTree<i64>) -> Vec<i64> {
    tree.keys().copied().collect()
}

#[test]
fn insert_keeps_order_and_rejects_duplicates() {
    let mut tree = set_of(&[50, 20, 80, 10, 30, 70, 90, 25]);
    assert!(!tree.insert(30, ()));
    assert_eq!(tree.len(), 8);
    assert_eq!(keys_of(&tree), [10, 20, 25, 30, 50, 70, 80, 90]);
    assert_eq!(tree.key(tree.first().unwrap()), &10);
    assert_eq!(tree.key(tree.last().unwrap()), &90);
}

#[test]
fn ascending_and_descending_inserts_stay_balanced() {
    let ascending = set_of(&(0..1000).collect::<Vec<_>>());
    assert_eq!(ascending.len(), 1000);
    let descending = set_of(&(0..1000).rev().collect::<Vec<_>>());
    assert_eq!(keys_of(&ascending), keys_of(&descending));
}

#[test]
fn clear_empties_tree() {
    let mut tree = set_of(&[3, 1, 2]);
    tree.clear();
    assert!(tree.is_empty());
    assert_eq!(tree.first(), None);
    assert_eq!(tree.last(), None);
    assert!(tree.insert(7, ()));
    tree.validate();
    assert_eq!(keys_of(&tree), [7]);
}

/// Removing 110 from this tree once corrupted the sibling links, leaving
/// some of the remaining keys unreachable.
#[test]
fn remove_regression() {
    let keys = [2, 14, 26, 86, 110, 122, 134, 182];
    let mut tree = OrderedTree::new(natural::<i64>());
    for key in keys {
        assert!(tree.insert(key, format!("value {key}")));
    }
    assert_eq!(tree.remove(&110), Some("value 110".to_string()));
    tree.validate();

    for key in [2, 14, 26, 86, 122, 134, 182] {
        let id = tree.find(&key).unwrap();
        assert_eq!(tree.value(id), &format!("value {key}"));
    }
    assert!(tree.find(&110).is_none());
    assert_eq!(
        tree.keys().copied().collect::<Vec<_>>(),
        [2, 14, 26, 86, 122, 134, 182]
    );
    assert_eq!(
        tree.keys().rev().copied().collect::<Vec<_>>(),
        [182, 134, 122, 86, 26, 14, 2]
    );
}

#[test]
fn remove_edges() {
    let mut tree = set_of(&[1]);
    assert_eq!(tree.remove(&2), None);
    assert_eq!(tree.remove(&1), Some(()));
    assert!(tree.is_empty());
    assert_eq!(tree.first(), None);
    assert_eq!(tree.last(), None);
    tree.validate();

    let mut tree = set_of(&[1, 2, 3, 4, 5]);
    tree.remove(&1);
    assert_eq!(tree.key(tree.first().unwrap()), &2);
    tree.remove(&5);
    assert_eq!(tree.key(tree.last().unwrap()), &4);
    assert_eq!(tree.prev(tree.first().unwrap()), None);
    assert_eq!(tree.next(tree.last().unwrap()), None);
    tree.validate();
}

#[test]
fn node_slots_are_reused() {
    let mut tree = set_of(&[1, 2, 3]);
    tree.remove(&2);
    tree.insert(4, ());
    assert_eq!(tree.nodes.len(), 3);
    assert_eq!(keys_of(&tree), [1, 3, 4]);
    tree.validate();
}

#[test]
fn range_probes() {
    let tree = set_of(&[10, 20, 30]);
    let key = |id| *tree.key(id);
    assert_eq!(tree.find_greater_or_equal(&20).map(key), Some(20));
    assert_eq!(tree.find_greater_or_equal(&21).map(key), Some(30));
    assert_eq!(tree.find_greater_or_equal(&31).map(key), None);
    assert_eq!(tree.find_greater(&20).map(key), Some(30));
    assert_eq!(tree.find_greater(&5).map(key), Some(10));
    assert_eq!(tree.find_greater(&30).map(key), None);
    assert_eq!(tree.find_less_or_equal(&20).map(key), Some(20));
    assert_eq!(tree.find_less_or_equal(&19).map(key), Some(10));
    assert_eq!(tree.find_less_or_equal(&9).map(key), None);
    assert_eq!(tree.find_less(&20).map(key), Some(10));
    assert_eq!(tree.find_less(&35).map(key), Some(30));
    assert_eq!(tree.find_less(&10).map(key), None);
}

#[test]
fn custom_comparator() {
    let mut tree = OrderedTree::new(reversed(natural::<i64>()));
    for key in [1, 3, 2] {
        tree.insert(key, ());
    }
    tree.validate();
    assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [3, 2, 1]);
}

#[test]
fn get_mut_overwrites() {
    let mut tree = OrderedTree::new(natural::<String>());
    tree.insert("cn".to_string(), 1);
    *tree.get_mut(&"cn".to_string()).unwrap() = 2;
    assert_eq!(tree.get(&"cn".to_string()), Some(&2));
    assert_eq!(format!("{tree:?}"), r#"{"cn": 2}"#);
}

#[test]
fn cursor_walks_both_ways() {
    let tree = set_of(&[1, 2, 3]);
    let mut cursor = tree.cursor();
    assert!(!cursor.available());
    assert_eq!(cursor.get(), Err(crate::IndexError::InvalidPosition));

    let mut forward = Vec::new();
    while cursor.next().unwrap() {
        forward.push(*cursor.get().unwrap());
    }
    assert_eq!(forward, [1, 2, 3]);
    assert!(!cursor.next().unwrap());

    let mut backward = Vec::new();
    while cursor.previous().unwrap() {
        backward.push(*cursor.get().unwrap());
    }
    assert_eq!(backward, [3, 2, 1]);
    assert!(!cursor.previous().unwrap());
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.get(), Ok(&1));
}

#[test]
fn cursor_positioning() {
    let tree = set_of(&[10, 20, 30]);
    let mut cursor = tree.cursor();

    cursor.before(&20).unwrap();
    assert!(!cursor.available());
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.get(), Ok(&20));

    cursor.before(&20).unwrap();
    assert!(cursor.previous().unwrap());
    assert_eq!(cursor.get(), Ok(&10));

    cursor.after(&20).unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.get(), Ok(&30));

    cursor.after(&20).unwrap();
    assert!(cursor.previous().unwrap());
    assert_eq!(cursor.get(), Ok(&20));

    cursor.before(&15).unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.get(), Ok(&20));

    cursor.after(&30).unwrap();
    assert!(!cursor.next().unwrap());
    cursor.after(&30).unwrap();
    assert!(cursor.previous().unwrap());
    assert_eq!(cursor.get(), Ok(&30));

    cursor.before(&5).unwrap();
    assert!(!cursor.previous().unwrap());

    assert!(cursor.last().unwrap());
    assert_eq!(cursor.get(), Ok(&30));
    assert!(cursor.first().unwrap());
    assert_eq!(cursor.get(), Ok(&10));
}

#[test]
fn cursor_on_empty_tree() {
    let tree = set_of(&[]);
    let mut cursor = tree.cursor();
    assert!(!cursor.first().unwrap());
    assert!(!cursor.last().unwrap());
    assert!(!cursor.available());
}

#[test]
fn serialize_empty() {
    let serializer = TreeSerializer::for_keys(natural::<i64>(), I64Codec);
    let bytes = serializer.serialize(&set_of(&[])).unwrap();
    assert_eq!(bytes, [0, 0, 0, 0]);
    let tree = serializer.deserialize(&bytes).unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
}

#[test]
fn serialize_single_node() {
    init_test_logger();
    let serializer = TreeSerializer::for_keys(natural::<i64>(), I64Codec);
    let bytes = serializer.serialize(&set_of(&[0])).unwrap();
    let tree = serializer.deserialize(&bytes).unwrap();
    tree.validate();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.key(tree.first().unwrap()), &0);
    assert_eq!(tree.key(tree.last().unwrap()), &0);
}

#[test]
fn serialized_layout() {
    let serializer = TreeSerializer::for_keys(natural::<u64>(), U64Codec);
    let mut tree = OrderedTree::new(natural::<u64>());
    tree.insert(1, ());
    tree.insert(2, ());
    let bytes = serializer.serialize(&tree).unwrap();
    // Key 1 is the root and key 2 its right child.
    #[rustfmt::skip]
    let expected = [
        0, 0, 0, 2,                         // node count
        0, 0, 0, 0,                         // root index
        0xff, 0xff, 0xff, 0xff,             // node 0: no left child
        0, 0, 0, 1,                         //         right child is node 1
        0xff,                               //         right-heavy
        0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 1, //         key 1
        0, 0, 0, 0,                         //         empty value
        0xff, 0xff, 0xff, 0xff,             // node 1: no left child
        0xff, 0xff, 0xff, 0xff,             //         no right child
        0,                                  //         balanced
        0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 2, //         key 2
        0, 0, 0, 0,                         //         empty value
    ];
    assert_eq!(bytes, expected);
}

#[test]
fn serialize_with_values() {
    let serializer = TreeSerializer::new(natural::<String>(), StringCodec, U64Codec);
    let mut tree = OrderedTree::new(natural::<String>());
    for (index, name) in ["cn", "ou", "dc", "uid", "sn"].iter().enumerate() {
        tree.insert(name.to_string(), index as u64);
    }
    let copy = serializer
        .deserialize(&serializer.serialize(&tree).unwrap())
        .unwrap();
    copy.validate();
    assert_eq!(
        copy.iter().collect::<Vec<_>>(),
        tree.iter().collect::<Vec<_>>()
    );
}

#[test]
fn payload_lengths_fit_prefix() {
    assert_eq!(check_payload_len(0, "encoded key"), Ok(()));
    assert_eq!(check_payload_len(u32::MAX as usize, "encoded key"), Ok(()));
    #[cfg(target_pointer_width = "64")]
    {
        let error = check_payload_len(u32::MAX as usize + 1, "encoded value").unwrap_err();
        assert!(matches!(&error, IndexError::Encode(message) if message.contains("encoded value")));
        assert_eq!(error.kind(), std::io::ErrorKind::InvalidInput);
    }
}

#[test]
fn deserialize_rejects_bad_input() {
    let serializer = TreeSerializer::for_keys(natural::<i64>(), I64Codec);
    assert_eq!(serializer.deserialize(&[]).unwrap_err(), DecodeError::Empty);
    assert!(matches!(
        serializer.deserialize(&[0, 0]).unwrap_err(),
        DecodeError::Truncated(_)
    ));
    assert!(matches!(
        serializer.deserialize(&[0, 0, 0, 0, 1]).unwrap_err(),
        DecodeError::Malformed(_)
    ));

    let good = serializer.serialize(&set_of(&[1, 2, 3])).unwrap();
    for len in 1..good.len() {
        assert!(
            serializer.deserialize(&good[..len]).is_err(),
            "prefix of {len} bytes decoded"
        );
    }

    // A codec failure is reported as such.
    let strings = TreeSerializer::for_keys(natural::<String>(), StringCodec);
    let mut bad_utf8 = strings
        .serialize(&{
            let mut tree = OrderedTree::new(natural::<String>());
            tree.insert("a".to_string(), ());
            tree
        })
        .unwrap();
    let key_offset = 4 + 4 + 4 + 4 + 1 + 4;
    bad_utf8[key_offset] = 0xff;
    assert!(matches!(
        strings.deserialize(&bad_utf8).unwrap_err(),
        DecodeError::Codec(_)
    ));
}

#[test]
fn deserialize_rejects_corrupt_structure() {
    let serializer = TreeSerializer::for_keys(natural::<i64>(), I64Codec);
    let good = serializer.serialize(&set_of(&[1, 2, 3])).unwrap();
    // Layout: count, root, then 3 records of 4 + 4 + 1 + 4 + 8 + 4 = 25 bytes.
    let record = |index: usize| 8 + index * 25;

    // Root out of range.
    let mut bytes = good.clone();
    bytes[4..8].copy_from_slice(&7u32.to_be_bytes());
    assert!(matches!(serializer.deserialize(&bytes), Err(DecodeError::Malformed(_))));

    // Wrong balance factor on a leaf.
    let mut bytes = good.clone();
    bytes[record(0) + 8] = 1;
    assert!(matches!(serializer.deserialize(&bytes), Err(DecodeError::Malformed(_))));

    // A leaf pointing at the root.
    let mut bytes = good.clone();
    bytes[record(0)..record(0) + 4].copy_from_slice(&1u32.to_be_bytes());
    assert!(matches!(serializer.deserialize(&bytes), Err(DecodeError::Malformed(_))));

    // Keys out of order.
    let mut bytes = good.clone();
    bytes[record(0) + 13..record(0) + 21].copy_from_slice(&5i64.to_be_bytes());
    assert!(matches!(serializer.deserialize(&bytes), Err(DecodeError::Malformed(_))));

    // Trailing garbage.
    let mut bytes = good;
    bytes.push(0);
    assert!(matches!(serializer.deserialize(&bytes), Err(DecodeError::Malformed(_))));
}

#[derive(Clone, Debug)]
enum Op {
    Insert(i64),
    Remove(i64),
}

fn ops(max_key: i64, max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    vec(
        prop_oneof![
            3 => (0..max_key).prop_map(Op::Insert),
            2 => (0..max_key).prop_map(Op::Remove),
        ],
        0..max_ops,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn matches_btree_model(ops in ops(64, 200)) {
        let mut tree = OrderedTree::new(natural::<i64>());
        let mut model = BTreeMap::new();
        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Insert(key) => {
                    let inserted = tree.insert(key, step);
                    prop_assert_eq!(inserted, !model.contains_key(&key));
                    model.entry(key).or_insert(step);
                }
                Op::Remove(key) => {
                    prop_assert_eq!(tree.remove(&key), model.remove(&key));
                }
            }
            tree.validate();
        }
        prop_assert!(tree.keys().tuple_windows().all(|(a, b)| a < b));
        prop_assert!(tree.keys().rev().tuple_windows().all(|(a, b)| a > b));
        prop_assert_eq!(
            tree.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            model.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn round_trip(ops in ops(200, 300), probes in vec(0i64..200, 20)) {
        let mut tree = OrderedTree::new(natural::<i64>());
        for op in ops {
            match op {
                Op::Insert(key) => { tree.insert(key, ()); }
                Op::Remove(key) => { tree.remove(&key); }
            }
        }
        let serializer = TreeSerializer::new(natural::<i64>(), I64Codec, UnitCodec);
        let copy = serializer.deserialize(&serializer.serialize(&tree).unwrap()).unwrap();
        copy.validate();
        prop_assert_eq!(copy.len(), tree.len());
        prop_assert_eq!(copy.is_empty(), tree.is_empty());
        prop_assert_eq!(copy.first().map(|id| *copy.key(id)), tree.first().map(|id| *tree.key(id)));
        prop_assert_eq!(copy.last().map(|id| *copy.key(id)), tree.last().map(|id| *tree.key(id)));
        for probe in probes {
            prop_assert_eq!(copy.contains(&probe), tree.contains(&probe));
        }
        // Same shape, so re-serializing gives the same bytes.
        prop_assert_eq!(serializer.serialize(&copy).unwrap(), serializer.serialize(&tree).unwrap());
    }

    #[test]
    fn cursor_symmetry(keys in vec(0i64..100, 1..50), steps in vec(any::<bool>(), 0..40)) {
        let tree = set_of(&keys);
        let mut cursor = tree.cursor();
        prop_assert!(cursor.first().unwrap());
        let start = *cursor.get().unwrap();
        for forward in steps {
            if forward {
                if cursor.next().unwrap() {
                    let here = *cursor.get().unwrap();
                    prop_assert!(cursor.previous().unwrap());
                    prop_assert!(*cursor.get().unwrap() < here);
                    prop_assert!(cursor.next().unwrap());
                    prop_assert_eq!(*cursor.get().unwrap(), here);
                } else {
                    prop_assert!(cursor.previous().unwrap());
                }
            } else if !cursor.previous().unwrap() {
                prop_assert!(cursor.next().unwrap());
            }
        }
        prop_assert!(cursor.first().unwrap());
        prop_assert_eq!(*cursor.get().unwrap(), start);
    }
}
