#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = kiosk_config::load_toml(data) {
        let _ = cfg.validate();
        if let Some(slot) = &cfg.coin_slot {
            let _ = kiosk_config::check_denominations(&slot.denomination_table());
        }
    }
});
