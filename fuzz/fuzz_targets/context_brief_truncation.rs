#![no_main]

use libfuzzer_sys::fuzz_target;
use memoryhub_policy::truncate_with_suffix;

fuzz_target!(|data: (&str, u8)| {
    let (text, budget_byte) = data;
    // Exercise the full range a token_budget*4 computation can produce,
    // including budgets smaller than the suffix itself.
    let max_bytes = budget_byte as usize;

    // Must never panic on a multi-byte char boundary, regardless of where
    // `max_bytes` lands inside a UTF-8 sequence.
    let truncated = truncate_with_suffix(text, max_bytes);

    if text.len() <= max_bytes {
        assert_eq!(truncated, text);
    }
});
