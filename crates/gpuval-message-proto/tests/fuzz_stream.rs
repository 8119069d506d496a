// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Decoder robustness: arbitrary bytes never panic, valid streams decode in wire order.

use gpuval_message_proto::{
    ChunkedStreamWriter, ChunkedView, Coordinate, DetailChunk, MessageStream,
    ResourceBoundsChunk, ResourceIndexOutOfBounds, ResourceToken,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn fuzz_arbitrary_bytes_no_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        if let Ok(stream) = MessageStream::decode(&bytes) {
            if let Ok(view) = ChunkedView::<ResourceIndexOutOfBounds>::new(&stream) {
                for record in view.into_iter().flatten() {
                    let _ = record.message();
                    let _ = record.detail_chunk();
                }
            }
        }
    }

    #[test]
    fn fuzz_valid_header_garbage_records(
        count in 0u32..8,
        body in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut bytes = ChunkedStreamWriter::<ResourceIndexOutOfBounds>::new().finish();
        bytes[12..16].copy_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&body);

        let stream = MessageStream::decode(&bytes).unwrap();
        let view = ChunkedView::<ResourceIndexOutOfBounds>::new(&stream).unwrap();
        let results: Vec<_> = view.into_iter().collect();
        // At most one error, and it is always last.
        let first_err = results.iter().position(Result::is_err);
        if let Some(pos) = first_err {
            prop_assert_eq!(pos, results.len() - 1);
        }
        prop_assert!(results.len() <= count as usize + 1);
    }

    #[test]
    fn written_records_decode_in_wire_order(
        words in prop::collection::vec(any::<u32>(), 1..32),
        with_detail in prop::collection::vec(any::<bool>(), 32),
    ) {
        let mut w = ChunkedStreamWriter::new();
        for (i, word) in words.iter().enumerate() {
            let msg = ResourceIndexOutOfBounds::from_word(*word);
            if with_detail[i] {
                let detail = DetailChunk {
                    token: ResourceToken(*word),
                    coordinate: Coordinate::new(i as u32, 0, 1),
                };
                w.push(&msg, &[(ResourceBoundsChunk::Detail, &detail.to_bytes())]).unwrap();
            } else {
                w.push(&msg, &[]).unwrap();
            }
        }
        let bytes = w.finish();
        let stream = MessageStream::decode(&bytes).unwrap();
        let records = ChunkedView::<ResourceIndexOutOfBounds>::new(&stream)
            .unwrap()
            .validate()
            .unwrap();

        prop_assert_eq!(records.len(), words.len());
        for (i, record) in records.iter().enumerate() {
            prop_assert_eq!(record.message().to_word(), words[i]);
            prop_assert_eq!(record.has_chunk(ResourceBoundsChunk::Detail), with_detail[i]);
            if with_detail[i] {
                prop_assert_eq!(record.detail_chunk().unwrap().coordinate.x, i as u32);
            }
        }
    }
}
