#![no_main]

use libfuzzer_sys::fuzz_target;
use tempfile::tempdir;

fuzz_target!(|data: &[u8]| {
    let Ok(toml_str) = std::str::from_utf8(data) else {
        return;
    };

    let dir = match tempdir() {
        Ok(d) => d,
        Err(_) => return,
    };
    let path = memoryhub_config::config_path(dir.path());
    if std::fs::write(&path, toml_str).is_err() {
        return;
    }

    // A present-but-malformed file must return an error, never panic; a
    // parseable one must merge cleanly against the defaults without
    // panicking either.
    if let Ok(cfg) = memoryhub_config::load_config(dir.path()) {
        let _ = memoryhub_config::Config::default().merge(&cfg);
    }
});
