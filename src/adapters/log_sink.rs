//! Serial-log event sink.
//!
//! The default [`EventSink`] adapter: every supervisor event becomes a
//! structured log line.

use log::{info, warn};

use crate::supervisor::events::NodeEvent;
use crate::supervisor::ports::EventSink;

#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &NodeEvent) {
        match event {
            NodeEvent::Started(mode) => info!("event: started in {mode} mode"),
            NodeEvent::ModeChanged { from, to } => {
                info!("event: mode {from} -> {to}");
            }
            NodeEvent::TransitionAbandoned { target } => {
                warn!("event: transition to {target} abandoned");
            }
            NodeEvent::ConfigStored(field) => info!("event: config field '{field}' stored"),
            NodeEvent::ReportSent {
                temperature_c,
                humidity_pct,
                charge_pct,
            } => {
                info!(
                    "event: report sent ({temperature_c:.2} degC, {humidity_pct:.3} %, {charge_pct:.2} %)"
                );
            }
            NodeEvent::ReportFailed => warn!("event: report send failed"),
            NodeEvent::DeepSleepScheduled {
                minutes,
                duration_us,
            } => {
                info!("event: deep sleep scheduled ({minutes} min, {duration_us} us)");
            }
        }
    }
}
