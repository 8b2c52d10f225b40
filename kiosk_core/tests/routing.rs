//! Command routing and notification aggregation through a full kiosk.
use std::sync::Arc;

use kiosk_core::{
    CoinSlot, CountingDispenser, DenominationTable, DispenseCfg, DutyCycle, Envelope, Family,
    FeedCfg, Kiosk, MessageKind, PaperDispenser, PaperFeeder, PulseCounter, RelayBank,
    RelayChannel, RelayControl,
};
use kiosk_hardware::{DriveProbe, SimActuator, SimInput, SimStepper};
use kiosk_traits::ManualClock;
use rstest::rstest;
use serde_json::Value;

struct Rig {
    kiosk: Kiosk,
    clock: ManualClock,
    p1_sensor: SimInput,
    p5_sensor: SimInput,
    p1_motor: DriveProbe,
    p5_motor: DriveProbe,
    relays: Vec<DriveProbe>,
}

fn hopper_cfg() -> DispenseCfg {
    DispenseCfg {
        timeout_ms: 3000,
        status_interval_ms: 1000,
        duty: Some(DutyCycle::default()),
    }
}

fn rig() -> Rig {
    let clock = ManualClock::new();

    let coils: Vec<SimActuator> = (1..=3).map(|i| SimActuator::new(format!("relay{i}"))).collect();
    let relays = coils.iter().map(SimActuator::probe).collect();
    let bank = RelayBank::new("Relay", coils).shared();

    let p1 = SimActuator::new("HopperP1");
    let p5 = SimActuator::new("HopperP5");
    let (p1_motor, p5_motor) = (p1.probe(), p5.probe());
    let (p1_sensor, p5_sensor) = (SimInput::new(false), SimInput::new(false));

    let feeder = PaperFeeder::new(
        "Paper1",
        SimActuator::reversible("feed"),
        SimStepper::new(),
        SimInput::new(true),
        FeedCfg::default(),
    );

    let kiosk = Kiosk::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_component(CoinSlot::new(
            "CoinSlot",
            PulseCounter::new(50),
            DenominationTable::default(),
            300,
        ))
        .with_component(RelayControl::new(bank.clone()))
        .with_component(CountingDispenser::coin_counter(
            "CoinCounterA",
            SimInput::new(false),
            10,
            RelayChannel::new(bank, 1),
            DispenseCfg::default(),
        ))
        .with_component(CountingDispenser::hopper("HopperP1", 1, p1_sensor.clone(), 10, p1, hopper_cfg()))
        .with_component(CountingDispenser::hopper("HopperP5", 5, p5_sensor.clone(), 10, p5, hopper_cfg()))
        .with_component(PaperDispenser::new("Paper1", feeder))
        .build()
        .expect("kiosk");

    Rig {
        kiosk,
        clock,
        p1_sensor,
        p5_sensor,
        p1_motor,
        p5_motor,
        relays,
    }
}

impl Rig {
    fn run_ms(&mut self, ms: u64) -> Vec<Envelope> {
        let mut out = Vec::new();
        for _ in 0..ms / 5 {
            self.clock.advance_ms(5);
            out.extend(self.kiosk.poll());
        }
        out
    }

    /// One coin past a hopper exit sensor.
    fn drop_coin(&mut self, sensor: &SimInput) -> Vec<Envelope> {
        sensor.set(true);
        let mut out = self.run_ms(30);
        sensor.set(false);
        out.extend(self.run_ms(30));
        out
    }
}

fn of_kind(msgs: &[Envelope], kind: MessageKind) -> Vec<&Envelope> {
    msgs.iter().filter(|m| m.kind == kind).collect()
}

#[rstest]
fn instances_are_isolated_by_name() {
    let mut r = rig();
    let acks = r
        .kiosk
        .handle_line(r#"{"v":1,"target":"Hopper","cmd":"dispense","name":"HopperP5","value":2}"#);
    assert_eq!(of_kind(&acks, MessageKind::Ack).len(), 1);
    assert_eq!(acks[0].field("name"), "HopperP5");
    assert!(r.p5_motor.is_on());
    assert!(!r.p1_motor.is_on());

    r.run_ms(200);
    let p1 = r.p1_sensor.clone();
    let msgs = r.drop_coin(&p1);
    assert!(of_kind(&msgs, MessageKind::Status).iter().all(|m| m.field("name") != "HopperP1"));

    let p5 = r.p5_sensor.clone();
    r.drop_coin(&p5);
    let msgs = r.drop_coin(&p5);
    let events = of_kind(&msgs, MessageKind::Event);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].field("name"), "HopperP5");
    assert_eq!(events[0].field("count"), 2);
    assert_eq!(events[0].field("denomination"), 5);
    assert!(!r.p5_motor.is_on());
}

#[rstest]
#[case(r#"{"v":1,"target":"Hopper","cmd":"dispense","name":"HopperP1","value":3}"#, true)]
#[case(r#"{"v":1,"target":"Hopper","cmd":"stop","name":"HopperP1"}"#, true)]
#[case(r#"{"v":1,"target":"Hopper","cmd":"dispense","name":"HopperP1","value":0}"#, false)]
#[case(r#"{"v":1,"target":"Hopper","cmd":"dispense","name":"HopperP1","value":"x"}"#, false)]
#[case(r#"{"v":1,"target":"Hopper","cmd":"dispense","name":"HopperP1"}"#, false)]
#[case(r#"{"v":1,"target":"CoinCounter","cmd":"dispense","value":1}"#, true)]
#[case(r#"{"v":1,"target":"Relay","cmd":"setRelay","value":2,"state":"on"}"#, true)]
#[case(r#"{"v":1,"target":"Relay","cmd":"setRelay","value":9,"state":"on"}"#, false)]
#[case(r#"{"v":1,"target":"Relay","cmd":"setRelay","value":2,"state":"maybe"}"#, false)]
#[case(r#"{"v":1,"target":"Relay","cmd":"setRelay","value":2}"#, false)]
#[case(r#"{"v":1,"target":"PaperDispenser","cmd":"setStepperSteps","value":1500}"#, true)]
#[case(r#"{"v":1,"target":"PaperDispenser","cmd":"dispense","value":-1}"#, false)]
#[case(r#"{"v":1,"target":"CoinSlot","cmd":"detach"}"#, true)]
#[case(r#"{"v":1,"target":"CoinSlot","cmd":"frobnicate"}"#, false)]
#[case("hopperp1_dispense_2", true)]
#[case("relay3_off", true)]
fn every_mutation_gets_exactly_one_ack(#[case] line: &str, #[case] ok: bool) {
    let mut r = rig();
    let msgs = r.kiosk.handle_line(line);
    let acks = of_kind(&msgs, MessageKind::Ack);
    assert_eq!(acks.len(), 1, "{msgs:?}");
    assert_eq!(acks[0].field("ok"), ok, "{msgs:?}");
    if !ok {
        assert!(acks[0].field("status").is_string(), "failure carries a code: {msgs:?}");
    }
}

#[rstest]
fn reset_reports_zeroed_counters() {
    let mut r = rig();
    r.kiosk
        .handle_line(r#"{"v":1,"target":"Hopper","cmd":"dispense","name":"HopperP1","value":3}"#);
    r.run_ms(200);
    let p1 = r.p1_sensor.clone();
    r.drop_coin(&p1);

    let msgs = r
        .kiosk
        .handle_line(r#"{"v":1,"target":"Hopper","cmd":"reset","name":"HopperP1"}"#);
    assert_eq!(of_kind(&msgs, MessageKind::Ack).len(), 1);
    let status = of_kind(&msgs, MessageKind::Status);
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].field("count"), 0);
    assert_eq!(status[0].field("target"), 0);
    assert_eq!(status[0].field("status"), "idle");
    assert!(!r.p1_motor.is_on());
}

#[rstest]
fn read_only_requests_answer_with_status() {
    let mut r = rig();
    let msgs = r.kiosk.handle_line("HopperP5_get");
    assert!(of_kind(&msgs, MessageKind::Ack).is_empty());
    let status = of_kind(&msgs, MessageKind::Status);
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].source, Family::Hopper);
    assert_eq!(status[0].field("status"), "idle");

    let msgs = r.kiosk.handle_line("Relay_get");
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].field("states"), &Value::from(vec!["OFF", "OFF", "OFF"]));
}

#[rstest]
#[case(r#"{"v":2,"target":"Hopper","cmd":"get"}"#, Family::System, "unsupported_version")]
#[case(r#"{"v":1,"target":"Toaster","cmd":"get"}"#, Family::System, "unknown_target")]
#[case(r#"{"v":1,"target":"Hopper","cmd":"get"}"#, Family::Hopper, "missing_name")]
#[case(r#"{"v":1,"target":"Hopper","cmd":"get","name":"HopperP9"}"#, Family::Hopper, "unknown_instance")]
fn routing_errors(#[case] line: &str, #[case] source: Family, #[case] code: &str) {
    let mut r = rig();
    let msgs = r.kiosk.handle_line(line);
    assert_eq!(msgs.len(), 1, "{msgs:?}");
    assert_eq!(msgs[0].kind, MessageKind::Error);
    assert_eq!(msgs[0].source, source);
    assert_eq!(msgs[0].field("error"), code);
}

#[rstest]
fn unclaimed_legacy_tokens_are_silent() {
    let mut r = rig();
    assert!(r.kiosk.handle_line("hello there").is_empty());
    assert!(r.kiosk.handle_line("HopperP10_dispense_1").is_empty());
    assert!(r.kiosk.handle_line("").is_empty());
}

#[rstest]
fn system_status_fans_out_to_every_instance() {
    let mut r = rig();
    let msgs = r.kiosk.handle_line(r#"{"v":1,"target":"System","cmd":"status"}"#);
    let acks = of_kind(&msgs, MessageKind::Ack);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].field("instances"), 6);
    assert_eq!(of_kind(&msgs, MessageKind::Status).len(), 6);
    let ts = msgs[0].ts;
    assert!(msgs.iter().all(|m| m.ts == ts));
}

#[rstest]
fn counter_drives_its_relay_channel() {
    let mut r = rig();
    r.kiosk.handle_line("CoinCounterA_dispense_1");
    assert!(r.relays[0].is_on());
    let msgs = r.run_ms(3100);
    let errors = of_kind(&msgs, MessageKind::Error);
    assert_eq!(errors.len(), 1, "timeout fires once");
    assert_eq!(errors[0].field("event"), "timeout");
    assert_eq!(errors[0].field("final"), 0);
    assert!(!r.relays[0].is_on());
}

#[rstest]
fn shutdown_halts_every_actuator() {
    let mut r = rig();
    r.kiosk.handle_line("relay2_on");
    r.kiosk.handle_line("HopperP1_dispense_5");
    assert!(r.relays[1].is_on() && r.p1_motor.is_on());
    r.kiosk.shutdown();
    assert!(r.relays.iter().all(|p| !p.is_on()));
    assert!(!r.p1_motor.is_on());
}
