#![no_main]

use libfuzzer_sys::fuzz_target;
use tempfile::tempdir;

// Feeds arbitrary bytes in as a single Python source file and exercises the
// indexer end to end: hashing, language inference, and the import-edge
// extractor must all tolerate content that is not valid Python, or not
// valid UTF-8 at all, without panicking.
fuzz_target!(|data: &[u8]| {
    let dir = match tempdir() {
        Ok(d) => d,
        Err(_) => return,
    };
    if std::fs::write(dir.path().join("fuzzed.py"), data).is_err() {
        return;
    }

    let _ = memoryhub_catalog::build_snapshot(dir.path(), 10_000_000, None);
});
