//! The host loop: inbound lines in, outbound envelopes out, one tick at a time.
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;

use crate::error::Result;
use crate::line_reader::{Inbound, LineReader};
use crate::protocol::Envelope;
use crate::runtime::Kiosk;

#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    pub tick: Duration,
    /// Keep ticking this long after end of input, then return. `None` runs
    /// until the shutdown flag is set.
    pub exit_after_eof: Option<Duration>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(5),
            exit_after_eof: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines_in: u64,
    pub messages_out: u64,
    pub ticks: u64,
}

fn emit<W: Write>(out: &mut W, messages: &[Envelope], summary: &mut RunSummary) -> Result<()> {
    for m in messages {
        let line = m.to_line().wrap_err("serialize outbound envelope")?;
        writeln!(out, "{line}").wrap_err("write outbound line")?;
        summary.messages_out += 1;
    }
    if !messages.is_empty() {
        out.flush().wrap_err("flush outbound channel")?;
    }
    Ok(())
}

/// Drive `kiosk` until `shutdown` is set (or input ends, per `params`).
/// Every actuator is halted before returning, including on error.
pub fn run<R, W>(
    kiosk: &mut Kiosk,
    input: R,
    mut output: W,
    shutdown: &Arc<AtomicBool>,
    params: RunParams,
) -> Result<RunSummary>
where
    R: BufRead + Send + 'static,
    W: Write,
{
    let reader = LineReader::spawn(input);
    let mut summary = RunSummary::default();
    let result = run_inner(kiosk, &reader, &mut output, shutdown, params, &mut summary);

    let final_msgs = kiosk.shutdown();
    if result.is_ok() {
        emit(&mut output, &final_msgs, &mut summary)?;
    }
    tracing::info!(
        lines_in = summary.lines_in,
        messages_out = summary.messages_out,
        ticks = summary.ticks,
        "run loop finished"
    );
    result.map(|()| summary)
}

fn run_inner<W: Write>(
    kiosk: &mut Kiosk,
    reader: &LineReader,
    output: &mut W,
    shutdown: &Arc<AtomicBool>,
    params: RunParams,
    summary: &mut RunSummary,
) -> Result<()> {
    let mut eof_at: Option<u64> = None;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            return Ok(());
        }

        while let Some(item) = reader.try_next() {
            match item {
                Inbound::Line(line) => {
                    summary.lines_in += 1;
                    let msgs = kiosk.handle_line(&line);
                    emit(output, &msgs, summary)?;
                }
                Inbound::Eof => {
                    tracing::debug!("inbound channel reached end of input");
                    eof_at = Some(kiosk.now_ms());
                }
            }
        }

        let msgs = kiosk.poll();
        summary.ticks += 1;
        emit(output, &msgs, summary)?;

        if let (Some(at), Some(linger)) = (eof_at, params.exit_after_eof) {
            let linger_ms = u64::try_from(linger.as_millis()).unwrap_or(u64::MAX);
            if kiosk.now_ms().saturating_sub(at) >= linger_ms {
                return Ok(());
            }
        }

        kiosk.timebase().sleep(params.tick);
    }
}
