use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use kiosk_core::line_reader::{Inbound, LineReader};
use kiosk_core::mocks::NoopActuator;
use kiosk_core::runner::{RunParams, run};
use kiosk_core::{CountingDispenser, DispenseCfg, Kiosk};
use kiosk_hardware::{SimActuator, SimInput};
use kiosk_traits::ManualClock;
use serde_json::Value;

fn kiosk(clock: &ManualClock) -> Kiosk {
    Kiosk::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_component(CountingDispenser::coin_counter(
            "CoinCounterA",
            SimInput::new(false),
            10,
            NoopActuator,
            DispenseCfg {
                timeout_ms: 50,
                ..DispenseCfg::default()
            },
        ))
        .build()
        .expect("kiosk")
}

fn lines(out: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(out)
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect()
}

#[test]
fn session_runs_until_linger_after_eof() {
    let clock = ManualClock::new();
    let mut k = kiosk(&clock);
    let input = Cursor::new(
        "{\"v\":1,\"target\":\"System\",\"cmd\":\"ping\"}\nCoinCounterA_dispense_1\n".to_string(),
    );
    let mut out = Vec::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let summary = run(
        &mut k,
        input,
        &mut out,
        &shutdown,
        RunParams {
            tick: Duration::from_millis(5),
            exit_after_eof: Some(Duration::from_millis(500)),
        },
    )
    .expect("run");

    assert_eq!(summary.lines_in, 2);
    assert!(summary.ticks >= 100, "linger is measured on the kiosk clock");
    let msgs = lines(&out);
    assert_eq!(summary.messages_out, msgs.len() as u64);
    let kinds: Vec<(&str, &str)> = msgs
        .iter()
        .map(|m| (m["source"].as_str().unwrap(), m["type"].as_str().unwrap()))
        .collect();
    assert!(kinds.contains(&("System", "ack")));
    assert!(kinds.contains(&("CoinCounter", "ack")));
    let timeouts: Vec<_> = msgs
        .iter()
        .filter(|m| m["type"] == "error" && m["data"]["event"] == "timeout")
        .collect();
    assert_eq!(timeouts.len(), 1);
}

#[test]
fn preset_shutdown_halts_immediately() {
    let clock = ManualClock::new();
    let motor = SimActuator::new("hopper");
    let probe = motor.probe();
    let mut k = Kiosk::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_component(CountingDispenser::hopper(
            "HopperP1",
            1,
            SimInput::new(false),
            10,
            motor,
            DispenseCfg::default(),
        ))
        .build()
        .expect("kiosk");
    k.handle_line("HopperP1_dispense_3");
    assert!(probe.is_on());

    let shutdown = Arc::new(AtomicBool::new(true));
    let mut out = Vec::new();
    let summary = run(&mut k, Cursor::new(String::new()), &mut out, &shutdown, RunParams::default())
        .expect("run");
    assert_eq!(summary.ticks, 0);
    assert!(!probe.is_on(), "every actuator is halted on the way out");
}

#[test]
fn reader_delivers_lines_then_eof() {
    let reader = LineReader::spawn(Cursor::new("a\n\nb\r\n".to_string()));
    let mut got = Vec::new();
    for _ in 0..200 {
        match reader.try_next() {
            Some(Inbound::Eof) => break,
            Some(Inbound::Line(l)) => got.push(l),
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    assert_eq!(got, vec!["a".to_string(), String::new(), "b".to_string()]);
}

#[test]
fn reader_drop_with_full_channel_does_not_hang() {
    let many = "x\n".repeat(LineReader::CAPACITY * 4);
    let reader = LineReader::spawn(Cursor::new(many));
    std::thread::sleep(Duration::from_millis(20));
    assert!(reader.try_next().is_some());
    drop(reader);
}

#[test]
fn non_utf8_line_does_not_end_intake() {
    let clock = ManualClock::new();
    let mut k = kiosk(&clock);
    let mut input = b"\xff\xfe\n".to_vec();
    input.extend_from_slice(b"{\"v\":1,\"target\":\"System\",\"cmd\":\"ping\"}\n");
    let mut out = Vec::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let summary = run(
        &mut k,
        Cursor::new(input),
        &mut out,
        &shutdown,
        RunParams {
            tick: Duration::from_millis(5),
            exit_after_eof: Some(Duration::from_millis(20)),
        },
    )
    .expect("run");

    assert_eq!(summary.lines_in, 1, "the undecodable line is skipped");
    let msgs = lines(&out);
    assert!(
        msgs.iter()
            .any(|m| m["source"] == "System" && m["type"] == "ack" && m["data"]["ok"] == true),
        "{msgs:?}"
    );
}

#[test]
fn reader_skips_undecodable_lines_and_keeps_reading() {
    let reader = LineReader::spawn(Cursor::new(b"a\n\xc3\x28\r\nb\n".to_vec()));
    let mut got = Vec::new();
    for _ in 0..200 {
        match reader.try_next() {
            Some(Inbound::Eof) => break,
            Some(Inbound::Line(l)) => got.push(l),
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    assert_eq!(got, vec!["a".to_string(), "b".to_string()]);
}
