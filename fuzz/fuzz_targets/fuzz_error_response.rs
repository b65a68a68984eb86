#![no_main]

use libfuzzer_sys::fuzz_target;
use match_clock_sync::MatchClockError;

fuzz_target!(|data: &[u8]| {
    let Some((&status, body)) = data.split_first() else {
        return;
    };
    // Spread the first byte over the 2xx..5xx range.
    let status = 200 + u16::from(status) * 2;
    let body = String::from_utf8_lossy(body);

    let err = MatchClockError::from_response(status, &body);
    let message = err.user_message();
    assert!(!message.is_empty());
    assert!(!message.contains('\n'));
});
