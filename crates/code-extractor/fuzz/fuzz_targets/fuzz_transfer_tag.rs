#![no_main]

use code_extractor::TransferTag;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = std::str::from_utf8(data) else {
        return;
    };

    let stripped = TransferTag::strip(message);
    assert!(message.starts_with(stripped));

    let tag = TransferTag::new("MyOrg/repo", "0123456789abcdef0123456789abcdef01234567");
    let tagged = tag.append_to(message);
    assert_eq!(TransferTag::find(&tagged), Some(tag.clone()));
    assert_eq!(tag.append_to(&tagged), tagged);
});
