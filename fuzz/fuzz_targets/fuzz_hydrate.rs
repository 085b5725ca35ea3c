#![no_main]

use card_room_sync::hydrate::{hydrate, hydrate_value, HydrateContext};
use card_room_sync::CurrentUser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let user = CurrentUser::new("fuzz-user", "Fuzz");
    let ctx = HydrateContext::new(None, Some(&user));
    let Ok(state) = hydrate_value(value, &ctx) else {
        return;
    };

    // Reconciling an already reconciled room must not change it.
    assert_eq!(hydrate(&state, &ctx), state);

    let seated = state.players.iter().filter(|p| p.id == "fuzz-user").count();
    let spectating = state.spectators.iter().filter(|p| p.id == "fuzz-user").count();
    assert_eq!(seated + spectating, 1);
    assert!(state.players.iter().filter(|p| p.is_host).count() <= 1);
});
