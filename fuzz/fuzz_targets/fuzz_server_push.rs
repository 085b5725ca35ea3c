#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's own UTF-8 validation.
    let _ = serde_json::from_slice::<card_room_sync::ServerPush>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<card_room_sync::ServerPush>(s);
    }
});
