#![no_main]

use libfuzzer_sys::fuzz_target;
use memory_match_client::codec::{self, FrameAssembler};
use memory_match_client::GameRoom;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Whole-frame path.
    let _ = codec::decode::<GameRoom>(text);

    // Same bytes split into fragments at every char boundary near the middle.
    let mut split = text.len() / 2;
    while !text.is_char_boundary(split) {
        split += 1;
    }
    let (head, tail) = text.split_at(split);
    let mut assembler = FrameAssembler::new();
    assert!(assembler.push(head, false).is_none());
    let joined = assembler.push(tail, true).unwrap_or_default();
    assert_eq!(joined, text);
    assert_eq!(
        codec::decode::<GameRoom>(&joined).is_some(),
        codec::decode::<GameRoom>(text).is_some()
    );
});
