//! Hardware assembly: config sections to registered kiosk components.

use std::any::Any;
use std::path::Path;
use std::rc::Rc;

use eyre::{Result, WrapErr};
use kiosk_config::{CoinSlotCfg, Config, CounterCfg, HopperCfg, PaperCfg, RelayCfg};
use kiosk_core::mocks::NoopActuator;
use kiosk_core::{
    CoinSlot, CountingDispenser, DenominationTable, DispenseCfg, EdgeHandle, FeedCfg, Kiosk,
    PaperDispenser, PaperFeeder, PulseCounter, RelayBank, RelayChannel, RelayControl,
};
use kiosk_traits::{Actuator, LevelInput, Stepper, Timebase};

type DynActuator = Box<dyn Actuator>;
type DynInput = Box<dyn LevelInput>;
type DynStepper = Box<dyn Stepper>;

/// A built kiosk plus whatever must stay alive while it runs (interrupt
/// registrations, helper threads).
pub struct Assembly {
    pub kiosk: Kiosk,
    _keepalive: Vec<Box<dyn Any>>,
}

/// Where a component's actuators and sensors come from.
trait Backend {
    fn relay_output(&mut self, relay: &RelayCfg, channel: usize) -> Result<DynActuator>;
    fn counter_sensor(&mut self, counter: &CounterCfg) -> Result<DynInput>;
    fn hopper_parts(&mut self, hopper: &HopperCfg) -> Result<(DynInput, DynActuator)>;
    fn paper_parts(&mut self, paper: &PaperCfg) -> Result<(DynActuator, DynStepper, DynInput)>;
    fn coin_edges(&mut self, slot: &CoinSlotCfg, edge: EdgeHandle) -> Result<()>;
    fn keepalive(&mut self) -> Vec<Box<dyn Any>>;
}

/// Denomination table precedence: `--denominations`, then
/// `coin_slot.denominations_csv`, then the inline or stock table.
pub fn resolve_denominations(cfg: &Config, cli_csv: Option<&Path>) -> Result<Vec<(u16, u32)>> {
    if let Some(path) = cli_csv {
        return kiosk_config::load_denominations_csv(path);
    }
    match &cfg.coin_slot {
        Some(slot) => match &slot.denominations_csv {
            Some(path) => kiosk_config::load_denominations_csv(Path::new(path)),
            None => Ok(slot.denomination_table()),
        },
        None => Ok(kiosk_config::DEFAULT_DENOMINATIONS.to_vec()),
    }
}

/// Build the kiosk on the compiled-in backend.
pub fn assemble(cfg: &Config, denominations: &[(u16, u32)]) -> Result<Assembly> {
    let timebase = Timebase::default();

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let mut backend = gpio::GpioBackend::default();
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let mut backend = sim::SimBackend::new(timebase.clone(), sim::SimOptions::from_env()?);

    build_with(cfg, denominations, timebase, &mut backend)
}

fn build_with(
    cfg: &Config,
    denominations: &[(u16, u32)],
    timebase: Timebase,
    backend: &mut dyn Backend,
) -> Result<Assembly> {
    let mut builder = Kiosk::builder().with_timebase(timebase.clone());

    if let Some(slot) = &cfg.coin_slot {
        let table = DenominationTable::new(denominations.to_vec())
            .wrap_err_with(|| format!("coin slot '{}' denominations", slot.name))?;
        let counter = PulseCounter::new(slot.debounce_ms);
        counter.set_enabled(slot.attached);
        let coin_slot = CoinSlot::new(&slot.name, counter, table, slot.quiet_window_ms);
        backend
            .coin_edges(slot, coin_slot.edge_handle(timebase.clone()))
            .wrap_err_with(|| format!("coin slot '{}' pulse input", slot.name))?;
        builder = builder.with_component(coin_slot);
    }

    let bank = match &cfg.relay {
        Some(relay) => {
            let outputs = (1..=relay.pins.len())
                .map(|ch| backend.relay_output(relay, ch))
                .collect::<Result<Vec<_>>>()
                .wrap_err_with(|| format!("relay bank '{}'", relay.name))?;
            let bank = RelayBank::new(&relay.name, outputs).shared();
            builder = builder.with_component(RelayControl::new(Rc::clone(&bank)));
            Some(bank)
        }
        None => None,
    };

    for c in &cfg.counters {
        let sensor = backend
            .counter_sensor(c)
            .wrap_err_with(|| format!("counter '{}' sensor", c.name))?;
        let actuator: DynActuator = match (c.relay, &bank) {
            (Some(ch), Some(bank)) => Box::new(RelayChannel::new(Rc::clone(bank), ch)),
            (Some(ch), None) => {
                eyre::bail!(
                    "invalid configuration: counter '{}' uses relay {ch} but no [relay] section is present",
                    c.name
                )
            }
            (None, _) => Box::new(NoopActuator),
        };
        builder = builder.with_component(CountingDispenser::coin_counter(
            &c.name,
            sensor,
            c.debounce_ms,
            actuator,
            DispenseCfg::from((c, &cfg.runtime)),
        ));
    }

    for h in &cfg.hoppers {
        let (sensor, motor) = backend
            .hopper_parts(h)
            .wrap_err_with(|| format!("hopper '{}'", h.name))?;
        builder = builder.with_component(CountingDispenser::hopper(
            &h.name,
            h.denomination,
            sensor,
            h.debounce_ms,
            motor,
            DispenseCfg::from((h, &cfg.runtime)),
        ));
    }

    for p in &cfg.papers {
        let (motor, stepper, limit) = backend
            .paper_parts(p)
            .wrap_err_with(|| format!("paper dispenser '{}'", p.name))?;
        let feeder = PaperFeeder::new(&p.name, motor, stepper, limit, FeedCfg::from((p, &cfg.runtime)));
        builder = builder.with_component(PaperDispenser::new(&p.name, feeder));
    }

    let kiosk = builder.build()?;
    Ok(Assembly {
        kiosk,
        _keepalive: backend.keepalive(),
    })
}

#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
mod sim {
    use std::any::Any;
    use std::sync::Arc;
    use std::time::Duration;

    use eyre::Result;
    use kiosk_config::{CoinSlotCfg, CounterCfg, HopperCfg, PaperCfg, RelayCfg};
    use kiosk_core::EdgeHandle;
    use kiosk_hardware::{
        AcceptorTiming, AutoCoinSensor, AutoPositionSensor, DriveProbe, SimActuator, SimInput,
        SimStepper, spawn_acceptor,
    };
    use kiosk_traits::{Clock, Timebase};

    use super::{Backend, DynActuator, DynInput, DynStepper};

    /// How long the simulated feed motor pulls before the sheet reaches home.
    const PAPER_TRAVEL: Duration = Duration::from_millis(200);

    #[derive(Debug, Default, Clone, PartialEq, Eq)]
    pub struct SimOptions {
        /// Sensors answer their actuators
        pub autofeed: bool,
        /// Pulse count of each coin the simulated acceptor inserts
        pub coins: Vec<u16>,
    }

    impl SimOptions {
        /// Read `KIOSK_SIM_AUTOFEED` and `KIOSK_SIM_COINS`.
        pub fn from_env() -> Result<Self> {
            let autofeed = std::env::var("KIOSK_SIM_AUTOFEED")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false);
            let coins = match std::env::var("KIOSK_SIM_COINS") {
                Ok(list) => parse_coins(&list)?,
                Err(_) => Vec::new(),
            };
            Ok(Self { autofeed, coins })
        }
    }

    pub fn parse_coins(list: &str) -> Result<Vec<u16>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<u16>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(eyre::eyre!(
                    "KIOSK_SIM_COINS must be a comma-separated list of pulse counts, got '{s}'"
                )),
            })
            .collect()
    }

    pub struct SimBackend {
        clock: Arc<dyn Clock + Send + Sync>,
        opts: SimOptions,
        relay_probes: Vec<DriveProbe>,
        keep: Vec<Box<dyn Any>>,
    }

    impl SimBackend {
        pub fn new(timebase: Timebase, opts: SimOptions) -> Self {
            tracing::info!(autofeed = opts.autofeed, coins = opts.coins.len(), "simulation backend");
            Self {
                clock: Arc::clone(timebase.clock()),
                opts,
                relay_probes: Vec::new(),
                keep: Vec::new(),
            }
        }

        fn coin_sensor(&self, drive: Option<DriveProbe>) -> DynInput {
            match drive {
                Some(probe) if self.opts.autofeed => {
                    Box::new(AutoCoinSensor::new(probe, Arc::clone(&self.clock)))
                }
                _ => Box::new(SimInput::new(false)),
            }
        }
    }

    impl Backend for SimBackend {
        fn relay_output(&mut self, relay: &RelayCfg, channel: usize) -> Result<DynActuator> {
            let coil = SimActuator::new(format!("{}{channel}", relay.name));
            self.relay_probes.push(coil.probe());
            Ok(Box::new(coil))
        }

        fn counter_sensor(&mut self, counter: &CounterCfg) -> Result<DynInput> {
            let probe = counter
                .relay
                .and_then(|ch| self.relay_probes.get(usize::from(ch).checked_sub(1)?))
                .cloned();
            Ok(self.coin_sensor(probe))
        }

        fn hopper_parts(&mut self, hopper: &HopperCfg) -> Result<(DynInput, DynActuator)> {
            let motor = SimActuator::new(&hopper.name);
            let sensor = self.coin_sensor(Some(motor.probe()));
            Ok((sensor, Box::new(motor)))
        }

        fn paper_parts(&mut self, paper: &PaperCfg) -> Result<(DynActuator, DynStepper, DynInput)> {
            let motor = SimActuator::reversible(&paper.name);
            let limit: DynInput = if self.opts.autofeed {
                Box::new(AutoPositionSensor::new(
                    motor.probe(),
                    Arc::clone(&self.clock),
                    PAPER_TRAVEL,
                ))
            } else {
                Box::new(SimInput::new(false))
            };
            Ok((Box::new(motor), Box::new(SimStepper::new()), limit))
        }

        fn coin_edges(&mut self, slot: &CoinSlotCfg, edge: EdgeHandle) -> Result<()> {
            if self.opts.coins.is_empty() {
                return Ok(());
            }
            tracing::info!(instance = %slot.name, coins = ?self.opts.coins, "simulated acceptor armed");
            let handle = spawn_acceptor(self.opts.coins.clone(), AcceptorTiming::default(), move || {
                edge.pulse();
            });
            self.keep.push(Box::new(handle));
            Ok(())
        }

        fn keepalive(&mut self) -> Vec<Box<dyn Any>> {
            std::mem::take(&mut self.keep)
        }
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod gpio {
    use std::any::Any;

    use eyre::Result;
    use kiosk_config::{CoinSlotCfg, CounterCfg, HopperCfg, PaperCfg, RelayCfg};
    use kiosk_core::EdgeHandle;
    use kiosk_hardware::gpio::{
        GpioDcMotor, GpioInput, GpioStepper, GpioSwitch, watch_falling_edges,
    };

    use super::{Backend, DynActuator, DynInput, DynStepper};

    #[derive(Default)]
    pub struct GpioBackend {
        keep: Vec<Box<dyn Any>>,
    }

    impl Backend for GpioBackend {
        fn relay_output(&mut self, relay: &RelayCfg, channel: usize) -> Result<DynActuator> {
            let pin = relay.pins[channel - 1];
            Ok(Box::new(GpioSwitch::new(pin, relay.active_low)?))
        }

        fn counter_sensor(&mut self, counter: &CounterCfg) -> Result<DynInput> {
            Ok(Box::new(GpioInput::new(counter.sensor_pin, true)?))
        }

        fn hopper_parts(&mut self, hopper: &HopperCfg) -> Result<(DynInput, DynActuator)> {
            let sensor = GpioInput::new(hopper.sensor_pin, true)?;
            let motor = GpioSwitch::new(hopper.motor_pin, hopper.active_low)?;
            Ok((Box::new(sensor), Box::new(motor)))
        }

        fn paper_parts(&mut self, paper: &PaperCfg) -> Result<(DynActuator, DynStepper, DynInput)> {
            let pins = &paper.pins;
            let motor = GpioDcMotor::new(pins.motor_in1, pins.motor_in2, pins.motor_en)?;
            let stepper = GpioStepper::new(pins.step, pins.dir, paper.step_us)?;
            let limit = GpioInput::new(pins.limit, paper.limit_active_low)?;
            Ok((Box::new(motor), Box::new(stepper), Box::new(limit)))
        }

        fn coin_edges(&mut self, slot: &CoinSlotCfg, edge: EdgeHandle) -> Result<()> {
            let pin = watch_falling_edges(slot.pulse_pin, move || {
                edge.pulse();
            })?;
            self.keep.push(Box::new(pin));
            Ok(())
        }

        fn keepalive(&mut self) -> Vec<Box<dyn Any>> {
            std::mem::take(&mut self.keep)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sim::{SimBackend, SimOptions, parse_coins};
    use super::*;
    use kiosk_core::{Envelope, Family, MessageKind};
    use kiosk_traits::ManualClock;
    use std::sync::Arc;

    const CFG: &str = r#"
[coin_slot]
name = "CoinSlot"

[relay]
name = "Relay"
pins = [4, 5]

[[counter]]
name = "CoinCounterA"
sensor_pin = 17
relay = 1

[[hopper]]
name = "HopperP1"
denomination = 1
motor_pin = 22
sensor_pin = 23

[[paper]]
name = "Paper1"
ramp_down_ms = 100
pins = { step = 12, dir = 13, limit = 19, motor_in1 = 20, motor_in2 = 21 }
"#;

    fn sim_kiosk(autofeed: bool) -> (Assembly, ManualClock) {
        let cfg = kiosk_config::load_toml(CFG).expect("config");
        cfg.validate().expect("valid");
        let clock = ManualClock::new();
        let timebase = Timebase::new(Arc::new(clock.clone()));
        let mut backend = SimBackend::new(
            timebase.clone(),
            SimOptions {
                autofeed,
                coins: Vec::new(),
            },
        );
        let denoms = resolve_denominations(&cfg, None).expect("denominations");
        let asm = build_with(&cfg, &denoms, timebase, &mut backend).expect("assembly");
        (asm, clock)
    }

    fn run_until<F: Fn(&Envelope) -> bool>(
        kiosk: &mut Kiosk,
        clock: &ManualClock,
        max_ms: u64,
        found: F,
    ) -> Option<Envelope> {
        for _ in 0..max_ms / 5 {
            clock.advance_ms(5);
            if let Some(m) = kiosk.poll().into_iter().find(|m| found(m)) {
                return Some(m);
            }
        }
        None
    }

    #[test]
    fn every_section_becomes_an_instance() {
        let (asm, _) = sim_kiosk(false);
        let instances = asm.kiosk.instances();
        assert_eq!(
            instances,
            vec![
                (Family::CoinSlot, "CoinSlot".to_string()),
                (Family::Relay, "Relay".to_string()),
                (Family::CoinCounter, "CoinCounterA".to_string()),
                (Family::Hopper, "HopperP1".to_string()),
                (Family::PaperDispenser, "Paper1".to_string()),
            ]
        );
    }

    #[test]
    fn autofed_hopper_reaches_target() {
        let (mut asm, clock) = sim_kiosk(true);
        let acks = asm
            .kiosk
            .handle_line(r#"{"v":1,"target":"Hopper","cmd":"dispense","value":2}"#);
        assert!(acks.iter().any(|m| m.kind == MessageKind::Ack && m.field("ok") == true));
        let done = run_until(&mut asm.kiosk, &clock, 10_000, |m| m.kind == MessageKind::Event)
            .expect("target event");
        assert_eq!(done.field("event"), "target_reached");
        assert_eq!(done.field("count"), 2);
        assert_eq!(done.field("denomination"), 1);
    }

    #[test]
    fn counter_runs_its_relay_channel() {
        let (mut asm, clock) = sim_kiosk(true);
        asm.kiosk.handle_line("CoinCounterA_dispense_1");
        let done = run_until(&mut asm.kiosk, &clock, 5_000, |m| m.kind == MessageKind::Event)
            .expect("target event");
        assert_eq!(done.source, Family::CoinCounter);
        assert_eq!(done.field("target"), 1);
    }

    #[test]
    fn paper_without_autofeed_reports_jam() {
        let (mut asm, clock) = sim_kiosk(false);
        asm.kiosk.handle_line("Paper1_dispense_1");
        let err = run_until(&mut asm.kiosk, &clock, 15_000, |m| m.kind == MessageKind::Error)
            .expect("jam error");
        assert_eq!(err.field("error"), "jammed");
    }

    #[test]
    fn coin_list_parsing() {
        assert_eq!(parse_coins("1, 3,6").expect("list"), vec![1, 3, 6]);
        assert!(parse_coins("1,x").is_err());
        assert!(parse_coins("0").is_err());
    }

    #[test]
    fn counter_relay_without_bank_is_rejected() {
        let cfg = kiosk_config::load_toml(
            r#"
[[counter]]
name = "C"
sensor_pin = 3
relay = 1
"#,
        )
        .expect("config");
        let timebase = Timebase::default();
        let mut backend = SimBackend::new(timebase.clone(), SimOptions::default());
        let err = build_with(&cfg, &[(1, 1)], timebase, &mut backend)
            .err()
            .expect("missing relay bank");
        assert!(err.to_string().contains("no [relay]"));
    }
}
