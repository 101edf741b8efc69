#![no_main]

use libfuzzer_sys::fuzz_target;
use memoryhub_types::{parse_context_stamp, BusinessError, ConsistencyStamp, ErrorCode};

fuzz_target!(|data: &[u8]| {
    let Ok(json_str) = std::str::from_utf8(data) else {
        return;
    };

    // ConsistencyStamp: every pull/push response roundtrips byte-for-byte
    // through JSON.
    if let Ok(stamp) = serde_json::from_str::<ConsistencyStamp>(json_str) {
        if let Ok(roundtripped) = serde_json::to_string(&stamp) {
            let parsed: ConsistencyStamp =
                serde_json::from_str(&roundtripped).expect("round-tripped stamp must parse");
            assert_eq!(stamp, parsed);
        }
    }

    // BusinessError: error codes always round-trip and never panic on
    // arbitrary `details` payloads.
    if let Ok(err) = serde_json::from_str::<BusinessError>(json_str) {
        let payload = err.to_payload();
        assert!(payload["error_code"].is_string());
        if let Ok(roundtripped) = serde_json::to_string(&err) {
            let parsed: BusinessError =
                serde_json::from_str(&roundtripped).expect("round-tripped error must parse");
            assert_eq!(err.error_code, parsed.error_code);
        }
    }

    if let Ok(code) = serde_json::from_str::<ErrorCode>(json_str) {
        let roundtripped = serde_json::to_string(&code).unwrap();
        let parsed: ErrorCode = serde_json::from_str(&roundtripped).unwrap();
        assert_eq!(code, parsed);
    }

    // `parse_context_stamp` must never panic, regardless of what a client
    // sends back as `context_stamp` — only return a typed error.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) {
        let _ = parse_context_stamp(Some(&value));
    }
});
