//! Optional marshalling timing traces.
//!
//! Lines look like `TIMING.START;14:03:07.112;serialization funcId=1;xid=42`
//! and `TIMING.END;14:03:07.112;serialization funcId=1;xid=42;duration(ms)=3`.
//! The END line repeats the start timestamp.

use std::time::Instant;

use chrono::{DateTime, Local};
use wirelink_settings::TraceTiming;

const CLOCK_FORMAT: &str = "%H:%M:%S%.3f";

/// Factory for timing spans bound to one sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimingTrace {
    sink: TraceTiming,
}

/// One started measurement. Dropping it without [`TimingSpan::stop`] emits nothing.
#[must_use = "call stop() to emit the END line"]
pub struct TimingSpan {
    sink: TraceTiming,
    started: Option<(Instant, DateTime<Local>)>,
}

impl TimingTrace {
    /// Create a trace writing to `sink`.
    pub fn new(sink: TraceTiming) -> Self {
        Self { sink }
    }

    /// Whether spans emit anything.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_enabled()
    }

    /// Start a span. `label` is only evaluated when tracing is enabled.
    pub fn start(&self, label: impl FnOnce() -> String) -> TimingSpan {
        if !self.is_enabled() {
            return TimingSpan {
                sink: self.sink,
                started: None,
            };
        }
        let at = Local::now();
        emit(self.sink, &start_line(&at, &label()));
        TimingSpan {
            sink: self.sink,
            started: Some((Instant::now(), at)),
        }
    }
}

impl TimingSpan {
    /// Finish the span and emit the END line.
    pub fn stop(self, label: impl FnOnce() -> String) {
        if let Some((instant, at)) = self.started {
            let elapsed_ms = instant.elapsed().as_millis();
            emit(self.sink, &end_line(&at, &label(), elapsed_ms));
        }
    }
}

fn start_line(at: &DateTime<Local>, label: &str) -> String {
    format!("TIMING.START;{};{label}", at.format(CLOCK_FORMAT))
}

fn end_line(at: &DateTime<Local>, label: &str, elapsed_ms: u128) -> String {
    format!(
        "TIMING.END;{};{label};duration(ms)={elapsed_ms}",
        at.format(CLOCK_FORMAT)
    )
}

fn emit(sink: TraceTiming, line: &str) {
    match sink {
        TraceTiming::Off => {}
        TraceTiming::Log => tracing::info!(target: "wirelink::timing", "{line}"),
        TraceTiming::Console => println!("{line}"),
    }
}
