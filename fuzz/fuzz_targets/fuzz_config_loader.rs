#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation may reject input but must never panic.
    if let Ok(cfg) = actuator_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A valid config must map onto core settings without panicking.
            let _ = actuator_core::MotorSettings::from(&cfg);
        }
    }
});
