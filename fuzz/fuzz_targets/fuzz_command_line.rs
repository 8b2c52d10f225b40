#![no_main]
use kiosk_core::protocol::{Command, Request, legacy_job_request, parse_line};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    match parse_line(data) {
        Some(Command::Structured(cmd)) => {
            let _ = Request::from_structured(&cmd);
        }
        Some(Command::Legacy(token)) => {
            let _ = legacy_job_request(&token, "HopperP1");
        }
        None => {}
    }
});
