#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and denomination-table parsing for the kiosk.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The denomination CSV loader enforces headers and rejects ambiguous tables.
use std::collections::HashSet;

use serde::Deserialize;
use serde::de::Deserializer;

/// Denomination CSV schema.
///
/// Expected headers:
/// pulses,value
///
/// Example:
/// pulses,value
/// 1,1
/// 3,5
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DenominationRow {
    pub pulses: u16,
    pub value: u32,
}

/// The stock acceptor programming: pulse count to coin value.
pub const DEFAULT_DENOMINATIONS: [(u16, u32); 4] = [(1, 1), (3, 5), (6, 10), (9, 20)];

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeCfg {
    /// Poll loop period in milliseconds
    pub tick_ms: u64,
    /// Period of the progress status raised by running jobs
    pub status_interval_ms: u64,
}

impl Default for RuntimeCfg {
    fn default() -> Self {
        Self {
            tick_ms: 5,
            status_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CoinSlotCfg {
    pub name: String,
    /// GPIO wired to the acceptor's pulse output
    pub pulse_pin: u8,
    pub debounce_ms: u64,
    /// Silence after the last pulse that closes a burst
    pub quiet_window_ms: u64,
    /// Start with edge intake enabled
    pub attached: bool,
    /// Optional pulse table. Accepts either:
    /// - array of tables: [{ pulses = 1, value = 1 }, ...]
    /// - array of tuples: [[1, 1], [3, 5], ...]
    #[serde(deserialize_with = "de_denominations")]
    pub denominations: Vec<(u16, u32)>,
    /// Optional CSV file with `pulses,value` rows; takes precedence over `denominations`
    pub denominations_csv: Option<String>,
}

impl Default for CoinSlotCfg {
    fn default() -> Self {
        Self {
            name: "CoinSlot".to_string(),
            pulse_pin: 2,
            debounce_ms: 50,
            quiet_window_ms: 300,
            attached: true,
            denominations: Vec::new(),
            denominations_csv: None,
        }
    }
}

impl CoinSlotCfg {
    /// Configured table, or the stock one when none is given.
    pub fn denomination_table(&self) -> Vec<(u16, u32)> {
        if self.denominations.is_empty() {
            DEFAULT_DENOMINATIONS.to_vec()
        } else {
            self.denominations.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RelayCfg {
    pub name: String,
    /// Output pins, channel 1 first
    pub pins: Vec<u8>,
    /// Relay boards that energize on a low level
    pub active_low: bool,
}

impl Default for RelayCfg {
    fn default() -> Self {
        Self {
            name: "Relay".to_string(),
            pins: vec![4, 5, 6],
            active_low: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CounterCfg {
    pub name: String,
    pub sensor_pin: u8,
    /// Relay channel (1-based) that runs this counter's feeder
    #[serde(default)]
    pub relay: Option<u8>,
    #[serde(default = "default_sensor_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_unit_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct HopperCfg {
    pub name: String,
    /// Value of one dispensed unit, reported in payloads
    pub denomination: u32,
    pub motor_pin: u8,
    pub sensor_pin: u8,
    #[serde(default = "default_true")]
    pub active_low: bool,
    #[serde(default = "default_sensor_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_unit_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub duty: DutyCfg,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DutyCfg {
    pub pulse_ms: u64,
    pub cool_ms: u64,
    /// Ignore sensor edges this soon after an ON pulse begins
    pub settle_ms: u64,
    /// Hold the next ON pulse while a unit landed this recently
    pub recent_unit_ms: u64,
}

impl Default for DutyCfg {
    fn default() -> Self {
        Self {
            pulse_ms: 1000,
            cool_ms: 500,
            settle_ms: 150,
            recent_unit_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaperCfg {
    pub name: String,
    pub pins: PaperPins,
    #[serde(default = "default_steps_per_sheet")]
    pub steps_per_sheet: u32,
    /// Half period of one step pulse in microseconds
    #[serde(default = "default_step_us")]
    pub step_us: u64,
    /// Steps issued per loop tick while a sheet is moving
    #[serde(default = "default_steps_per_tick")]
    pub steps_per_tick: u32,
    #[serde(default = "default_sheet_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_ramp_down_ms")]
    pub ramp_down_ms: u64,
    #[serde(default = "default_home_timeout_ms")]
    pub home_timeout_ms: u64,
    #[serde(default = "default_limit_debounce_ms")]
    pub limit_debounce_ms: u64,
    /// Limit switch reads low when the sheet is at the home position
    #[serde(default = "default_true")]
    pub limit_active_low: bool,
}

#[derive(Debug, Deserialize)]
pub struct PaperPins {
    pub step: u8,
    pub dir: u8,
    pub limit: u8,
    pub motor_in1: u8,
    pub motor_in2: u8,
    pub motor_en: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeCfg,
    /// Coin acceptor; absent means no coin slot is wired
    #[serde(default)]
    pub coin_slot: Option<CoinSlotCfg>,
    #[serde(default)]
    pub relay: Option<RelayCfg>,
    #[serde(default, rename = "counter")]
    pub counters: Vec<CounterCfg>,
    #[serde(default, rename = "hopper")]
    pub hoppers: Vec<HopperCfg>,
    #[serde(default, rename = "paper")]
    pub papers: Vec<PaperCfg>,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

const fn default_true() -> bool {
    true
}
const fn default_sensor_debounce_ms() -> u64 {
    10
}
const fn default_unit_timeout_ms() -> u64 {
    3000
}
const fn default_steps_per_sheet() -> u32 {
    1900
}
const fn default_step_us() -> u64 {
    900
}
const fn default_steps_per_tick() -> u32 {
    8
}
const fn default_limit_debounce_ms() -> u64 {
    20
}
const fn default_sheet_settle_ms() -> u64 {
    100
}
const fn default_ramp_down_ms() -> u64 {
    8000
}
const fn default_home_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DenominationToml {
    Tuple((u16, u32)),
    Table { pulses: u16, value: u32 },
}

fn de_denominations<'de, D>(deserializer: D) -> Result<Vec<(u16, u32)>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<DenominationToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for d in items {
            match d {
                DenominationToml::Tuple((pulses, value)) => out.push((pulses, value)),
                DenominationToml::Table { pulses, value } => out.push((pulses, value)),
            }
        }
    }
    Ok(out)
}

/// Reject tables that cannot classify unambiguously.
pub fn check_denominations(table: &[(u16, u32)]) -> eyre::Result<()> {
    if table.is_empty() {
        eyre::bail!("denomination table must have at least one row");
    }
    let mut seen = HashSet::new();
    for (pulses, value) in table {
        if *pulses == 0 {
            eyre::bail!("denomination pulses must be >= 1");
        }
        if *value == 0 {
            eyre::bail!("denomination value for {pulses} pulses must be > 0");
        }
        if !seen.insert(*pulses) {
            eyre::bail!("denomination table has duplicate pulse count {pulses}");
        }
    }
    Ok(())
}

pub fn load_denominations_csv(path: &std::path::Path) -> eyre::Result<Vec<(u16, u32)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open denomination CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["pulses", "value"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "denomination CSV must have headers 'pulses,value', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<DenominationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push((row.pulses, row.value)),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    check_denominations(&rows)?;
    Ok(rows)
}

impl Config {
    /// Total number of named instances across every family.
    pub fn instance_count(&self) -> usize {
        usize::from(self.coin_slot.is_some())
            + usize::from(self.relay.is_some())
            + self.counters.len()
            + self.hoppers.len()
            + self.papers.len()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Runtime
        if self.runtime.tick_ms == 0 {
            eyre::bail!("runtime.tick_ms must be >= 1");
        }
        if self.runtime.tick_ms > 1000 {
            eyre::bail!("runtime.tick_ms is unreasonably large (>1s)");
        }
        if self.runtime.status_interval_ms == 0 {
            eyre::bail!("runtime.status_interval_ms must be >= 1");
        }

        // Coin slot
        if let Some(slot) = &self.coin_slot {
            check_name("coin_slot.name", &slot.name)?;
            if slot.debounce_ms == 0 {
                eyre::bail!("coin_slot.debounce_ms must be >= 1");
            }
            if slot.quiet_window_ms <= slot.debounce_ms {
                eyre::bail!("coin_slot.quiet_window_ms must be > coin_slot.debounce_ms");
            }
            if slot.denominations_csv.is_none() {
                check_denominations(&slot.denomination_table())?;
            }
        }

        // Relay bank
        let channels = match &self.relay {
            Some(relay) => {
                check_name("relay.name", &relay.name)?;
                if relay.pins.is_empty() {
                    eyre::bail!("relay.pins must list at least one channel");
                }
                relay.pins.len()
            }
            None => 0,
        };

        // Counters
        let mut counter_names = HashSet::new();
        for c in &self.counters {
            check_name("counter.name", &c.name)?;
            if !counter_names.insert(c.name.as_str()) {
                eyre::bail!("counter.name '{}' is used twice", c.name);
            }
            if c.timeout_ms == 0 {
                eyre::bail!("counter.timeout_ms must be >= 1 (counter '{}')", c.name);
            }
            if let Some(ch) = c.relay
                && (ch == 0 || usize::from(ch) > channels)
            {
                eyre::bail!(
                    "counter.relay must be in 1..={channels} (counter '{}' uses {ch})",
                    c.name
                );
            }
        }

        // Hoppers
        let mut hopper_names = HashSet::new();
        for h in &self.hoppers {
            check_name("hopper.name", &h.name)?;
            if !hopper_names.insert(h.name.as_str()) {
                eyre::bail!("hopper.name '{}' is used twice", h.name);
            }
            if h.denomination == 0 {
                eyre::bail!("hopper.denomination must be > 0 (hopper '{}')", h.name);
            }
            if h.timeout_ms == 0 {
                eyre::bail!("hopper.timeout_ms must be >= 1 (hopper '{}')", h.name);
            }
            if h.duty.pulse_ms == 0 {
                eyre::bail!("hopper.duty.pulse_ms must be >= 1 (hopper '{}')", h.name);
            }
            if h.duty.settle_ms >= h.duty.pulse_ms {
                eyre::bail!(
                    "hopper.duty.settle_ms must be < hopper.duty.pulse_ms (hopper '{}')",
                    h.name
                );
            }
        }

        // Paper feeders
        let mut paper_names = HashSet::new();
        for p in &self.papers {
            check_name("paper.name", &p.name)?;
            if !paper_names.insert(p.name.as_str()) {
                eyre::bail!("paper.name '{}' is used twice", p.name);
            }
            if p.steps_per_sheet == 0 {
                eyre::bail!("paper.steps_per_sheet must be >= 1 (paper '{}')", p.name);
            }
            if p.step_us == 0 {
                eyre::bail!("paper.step_us must be >= 1 (paper '{}')", p.name);
            }
            if p.steps_per_tick == 0 {
                eyre::bail!("paper.steps_per_tick must be >= 1 (paper '{}')", p.name);
            }
            if p.home_timeout_ms == 0 {
                eyre::bail!("paper.home_timeout_ms must be >= 1 (paper '{}')", p.name);
            }
        }

        if self.instance_count() == 0 {
            eyre::bail!("config declares no instances; add at least one section");
        }

        Ok(())
    }
}

fn check_name(field: &str, name: &str) -> eyre::Result<()> {
    if name.trim().is_empty() {
        eyre::bail!("{field} must not be empty");
    }
    if name.chars().any(char::is_whitespace) {
        eyre::bail!("{field} must not contain whitespace (got '{name}')");
    }
    Ok(())
}
