//! Background reader for the inbound line channel.
//!
//! Owns the reader on a helper thread and hands complete lines to the poll
//! loop through a bounded channel, so the loop never blocks on input.
use crossbeam_channel as xch;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    Eof,
}

pub struct LineReader {
    rx: xch::Receiver<Inbound>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl LineReader {
    pub const CAPACITY: usize = 64;

    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = xch::bounded(Self::CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::spawn(move || {
            let mut reader = reader;
            let mut buf = Vec::with_capacity(256);
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("line reader received shutdown signal");
                    return;
                }
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let Some(line) = decode_line(&buf) else {
                            tracing::warn!(bytes = buf.len(), "skipping inbound line that is not UTF-8");
                            continue;
                        };
                        if tx.send(Inbound::Line(line)).is_err() {
                            tracing::debug!("line consumer disconnected, exiting reader");
                            return;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "inbound read failed; treating as end of input");
                        break;
                    }
                }
            }
            let _ = tx.send(Inbound::Eof);
            tracing::trace!("line reader exiting cleanly");
        });

        Self {
            rx,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Next buffered item, without blocking.
    pub fn try_next(&self) -> Option<Inbound> {
        self.rx.try_recv().ok()
    }
}

/// Strip the line terminator (`\n` or `\r\n`) and decode.
fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    std::str::from_utf8(raw).ok().map(str::to_owned)
}

impl Drop for LineReader {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // A thread parked in a blocking read (stdin) cannot be woken; only
        // join once it has already finished.
        if let Some(handle) = self.join_handle.take() {
            if handle.is_finished() {
                if let Err(e) = handle.join() {
                    tracing::warn!(?e, "line reader thread panicked");
                }
            } else {
                tracing::trace!("line reader still blocked on input; detaching");
            }
        }
    }
}
