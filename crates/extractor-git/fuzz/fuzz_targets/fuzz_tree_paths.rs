#![no_main]

use bstr::{BString, ByteSlice};
use extractor_git::tree::normalize_path_bytes;
use extractor_git::{Oid, TreeEntry, TreeSnapshot};
use libfuzzer_sys::fuzz_target;

// First line: extraction paths separated by ':'; remaining lines: file paths.
// Paths are raw bytes and need not be UTF-8.
fuzz_target!(|data: &[u8]| {
    let mut lines = data.lines();
    let Some(header) = lines.next() else {
        return;
    };
    let paths: Vec<BString> = header
        .split(|b| *b == b':')
        .map(normalize_path_bytes)
        .filter(|p| !p.is_empty())
        .collect();

    let entry = TreeEntry {
        id: Oid::zero(),
        mode: 0o100644,
    };
    let mut snapshot = TreeSnapshot::new();
    for line in lines {
        let path = normalize_path_bytes(line);
        if !path.is_empty() {
            snapshot.insert(path, entry);
        }
    }

    let kept = snapshot.restrict_to(&paths);
    let dropped = snapshot.without(&paths);
    assert_eq!(kept.len() + dropped.len(), snapshot.len());

    let mut moved = snapshot.clone();
    for path in &paths {
        let mut target = BString::from(".keep/");
        target.extend_from_slice(path);
        let _ = moved.move_path(path, &target);
    }
    assert!(moved.subtree(".keep").len() <= snapshot.len());
});
