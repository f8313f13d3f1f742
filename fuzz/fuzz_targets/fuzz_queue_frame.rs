#![no_main]

use libfuzzer_sys::fuzz_target;
use memory_match_client::codec;
use memory_match_client::Matchmaking;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = codec::try_decode::<Matchmaking>(text);
    }
});
