#![no_main]

use libfuzzer_sys::fuzz_target;
use match_clock_sync::protocol::{MatchClock, MatchEvent, Possession};

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<MatchClock>(data);
    let _ = serde_json::from_slice::<Possession>(data);
    let _ = serde_json::from_slice::<MatchEvent>(data);
});
