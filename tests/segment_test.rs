#![allow(missing_docs)]

use std::io::Cursor;

use graphcodec::CodecError;
use graphcodec::segment::{Terminator, capture};
use proptest::prelude::*;

const BUDGET: usize = 1 << 20;

/// Captures segments until the source runs dry, the way a record reader would.
fn split_all(data: &[u8], marks: &[&[u8]]) -> Vec<(Vec<u8>, Option<usize>)> {
    let mut cursor = Cursor::new(data);
    let mut parts = Vec::new();
    loop {
        match capture(&mut cursor, marks, BUDGET) {
            Ok(segment) => {
                let done = segment.terminator == Terminator::EndOfStream;
                parts.push((segment.bytes.clone(), segment.mark_index()));
                if done {
                    return parts;
                }
            }
            Err(e) if e.is_end_of_data() => {
                parts.push((Vec::new(), None));
                return parts;
            }
            Err(e) => panic!("unexpected capture error: {e}"),
        }
    }
}

#[test]
fn records_split_on_either_mark() {
    let data = b"alpha\r\nbeta\n\ngamma\r\n\r\ndelta";
    let parts = split_all(data, &[&b"\r\n"[..], &b"\n\n"[..]]);
    let expected: Vec<(Vec<u8>, Option<usize>)> = vec![
        (b"alpha".to_vec(), Some(0)),
        (b"beta".to_vec(), Some(1)),
        (b"gamma".to_vec(), Some(0)),
        (Vec::new(), Some(0)),
        (b"delta".to_vec(), None),
    ];
    assert_eq!(parts, expected);
}

#[test]
fn budget_exhaustion_is_reported_with_consumed_bytes() {
    let data = vec![b'x'; 1000];
    let mut cursor = Cursor::new(&data[..]);
    match capture(&mut cursor, &[b"||"], 300) {
        Err(CodecError::StreamExhausted { consumed }) => assert!(consumed <= 300),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn sequential_capture_matches_str_split(data in "[a|]{0,900}") {
        let parts = split_all(data.as_bytes(), &[&b"||"[..]]);
        let captured: Vec<String> = parts
            .iter()
            .map(|(bytes, _)| String::from_utf8(bytes.clone()).unwrap())
            .collect();
        let expected: Vec<String> = data.split("||").map(str::to_owned).collect();
        prop_assert_eq!(captured, expected);
    }
}
