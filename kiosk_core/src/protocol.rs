//! Line protocol with the host.
//!
//! Inbound: a JSON object `{"v":1,"target":..,"cmd":..,"name"?,"value"?,"state"?}`
//! or a bare legacy token such as `hopperp1_dispense_3`.
//!
//! Outbound: one envelope per line,
//! `{"v":1,"source":..,"type":"status"|"event"|"error"|"ack","ts":..,"data":{..}}`.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CommandError;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    CoinSlot,
    CoinCounter,
    Hopper,
    PaperDispenser,
    Relay,
    System,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoinSlot => "CoinSlot",
            Self::CoinCounter => "CoinCounter",
            Self::Hopper => "Hopper",
            Self::PaperDispenser => "PaperDispenser",
            Self::Relay => "Relay",
            Self::System => "System",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CoinSlot" => Self::CoinSlot,
            "CoinCounter" => Self::CoinCounter,
            "Hopper" => Self::Hopper,
            "PaperDispenser" => Self::PaperDispenser,
            "Relay" => Self::Relay,
            "System" => Self::System,
            other => return Err(format!("unknown target '{other}'")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StructuredCommand {
    #[serde(rename = "v")]
    pub version: u32,
    pub target: String,
    pub cmd: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Structured(StructuredCommand),
    Legacy(String),
}

/// Parse one inbound line. Blank lines yield `None`; anything that is not a
/// well-formed structured command is kept as a legacy token.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('{')
        && let Ok(cmd) = serde_json::from_str::<StructuredCommand>(line)
    {
        return Some(Command::Structured(cmd));
    }
    Some(Command::Legacy(line.to_string()))
}

/// A command argument after type checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Missing,
    Int(i64),
    Invalid,
}

impl Param {
    fn from_json(v: Option<&Value>) -> Self {
        match v {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Number(n)) => n.as_i64().map_or(Self::Invalid, Self::Int),
            Some(Value::String(s)) => s.trim().parse().map_or(Self::Invalid, Self::Int),
            Some(_) => Self::Invalid,
        }
    }

    /// Legacy numeric suffix; unparseable text counts as zero like the old firmware did.
    pub fn from_legacy(s: &str) -> Self {
        Self::Int(s.trim().parse().unwrap_or(0))
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }
}

/// A command as seen by the component it is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub cmd: String,
    pub value: Param,
    pub state: Option<String>,
}

impl Request {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            value: Param::Missing,
            state: None,
        }
    }

    pub fn with_value(mut self, value: Param) -> Self {
        self.value = value;
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn from_structured(cmd: &StructuredCommand) -> Self {
        Self {
            cmd: cmd.cmd.clone(),
            value: Param::from_json(cmd.value.as_ref()),
            state: cmd.state.clone(),
        }
    }
}

/// Match `<name>_<suffix>` legacy tokens case-insensitively.
/// Returns the part after `<name>_`.
pub fn strip_instance_prefix<'a>(token: &'a str, name: &str) -> Option<&'a str> {
    let head = token.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    token[name.len()..].strip_prefix('_')
}

/// The standard verbs shared by counters, hoppers and paper feeders.
pub fn legacy_job_request(token: &str, name: &str) -> Option<Request> {
    let rest = strip_instance_prefix(token, name)?.to_ascii_lowercase();
    match rest.as_str() {
        "stop" => Some(Request::new("stop")),
        "reset" => Some(Request::new("reset")),
        "get" | "status" => Some(Request::new("get")),
        _ => rest
            .strip_prefix("dispense_")
            .map(|n| Request::new("dispense").with_value(Param::from_legacy(n))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Status,
    Event,
    Error,
    Ack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u32,
    pub source: Family,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub ts: u64,
    pub data: Value,
}

impl Envelope {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// `data[key]`, or `Null` when absent.
    pub fn field(&self, key: &str) -> &Value {
        self.data.get(key).unwrap_or(&Value::Null)
    }
}

/// Acknowledgement of a state-mutating command.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    action: String,
    ok: bool,
    extra: Map<String, Value>,
}

impl Ack {
    pub fn ok(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ok: true,
            extra: Map::new(),
        }
    }

    pub fn rejected(action: impl Into<String>, code: &str) -> Self {
        Self {
            action: action.into(),
            ok: false,
            extra: Map::new(),
        }
        .with("status", code)
    }

    /// Negative ack carrying the error code and its message.
    pub fn failed(action: impl Into<String>, err: &CommandError) -> Self {
        Self::rejected(action, err.code()).with("details", err.to_string())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    fn into_data(self, name: &str) -> Value {
        let mut data = Map::new();
        data.insert("name".into(), Value::from(name));
        data.insert("action".into(), Value::from(self.action));
        data.insert("ok".into(), Value::from(self.ok));
        data.extend(self.extra);
        Value::Object(data)
    }
}

/// What a component did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack(Ack),
    /// Read-only request answered through a status notification
    Quiet,
}

/// Outbound messages produced during one dispatch or tick, stamped with the
/// same timestamp.
#[derive(Debug)]
pub struct Outbox {
    ts: u64,
    messages: Vec<Envelope>,
}

impl Outbox {
    pub fn new(ts: u64) -> Self {
        Self {
            ts,
            messages: Vec::new(),
        }
    }

    pub fn ts(&self) -> u64 {
        self.ts
    }

    pub fn push(&mut self, source: Family, kind: MessageKind, data: Value) {
        self.messages.push(Envelope {
            v: PROTOCOL_VERSION,
            source,
            kind,
            ts: self.ts,
            data,
        });
    }

    pub fn status(&mut self, source: Family, data: Value) {
        self.push(source, MessageKind::Status, data);
    }

    pub fn event(&mut self, source: Family, data: Value) {
        self.push(source, MessageKind::Event, data);
    }

    pub fn error(&mut self, source: Family, data: Value) {
        self.push(source, MessageKind::Error, data);
    }

    pub fn ack(&mut self, source: Family, name: &str, ack: Ack) {
        self.push(source, MessageKind::Ack, ack.into_data(name));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Envelope> {
        self.messages
    }
}
