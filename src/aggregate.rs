//! Per-connection aggregation state and update rules
//!
//! One `ConnAggregate` accumulates everything the collector knows about a
//! live connection. Events mutate it in place until the terminal `"free"`
//! event arrives, at which point the retained events move out into a
//! `FinalizedConn` and the entry becomes a tombstone: trailing events for
//! the same connection id are discarded, guaranteeing at most one upload
//! per connection.

use crate::event::TraceEvent;
use serde_json::{Map, Value};

/// Initial allocation hint for the per-connection event buffer.
const EVENT_CAPACITY_HINT: usize = 256;

pub const EVENT_TYPE_PACKET_SENT: &str = "packet-sent";
pub const EVENT_TYPE_PACKET_ACKED: &str = "packet-acked";
pub const EVENT_TYPE_FREE: &str = "free";
pub const EVENT_TYPE_ACCEPT: &str = "accept";

#[derive(Debug)]
pub struct ConnAggregate {
    pub conn_id: i64,
    /// First and most recent `time` value seen, in tracer milliseconds.
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    /// Last (not highest) packet number of `packet-sent` / `packet-acked`.
    pub sent_pn: i64,
    pub acked_pn: i64,
    /// True count of events attributed to this connection, including ones
    /// dropped from `events` by the retention cap.
    pub total_events: u64,
    pub events: Vec<Map<String, Value>>,
    pub finalized: bool,
}

/// A completed connection, handed off to the uploader. Owns the retained
/// events; the table keeps only the finalized tombstone behind.
#[derive(Debug)]
pub struct FinalizedConn {
    pub conn_id: i64,
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub sent_pn: i64,
    pub acked_pn: i64,
    pub total_events: u64,
    pub events: Vec<Map<String, Value>>,
}

impl ConnAggregate {
    pub fn new(conn_id: i64) -> Self {
        Self {
            conn_id,
            start_time_ms: None,
            end_time_ms: None,
            sent_pn: -1,
            acked_pn: -1,
            total_events: 0,
            events: Vec::with_capacity(EVENT_CAPACITY_HINT),
            finalized: false,
        }
    }

    /// Apply one event. Returns the finalized connection when this event
    /// was the terminal `"free"`, `None` otherwise.
    ///
    /// `max_events` caps the retained payload; the terminal event is
    /// always retained even past the cap so the payload never loses its
    /// end-of-life marker.
    pub fn apply(&mut self, event: TraceEvent, max_events: usize) -> Option<FinalizedConn> {
        if self.finalized {
            return None;
        }

        if let Some(time) = event.time_ms() {
            if self.start_time_ms.is_none() {
                self.start_time_ms = Some(time);
            }
            self.end_time_ms = Some(time);
        }

        let event_type = event.event_type().map(str::to_owned);
        match event_type.as_deref() {
            Some(EVENT_TYPE_PACKET_SENT) => {
                if let Some(pn) = event.packet_number() {
                    self.sent_pn = pn;
                }
            }
            Some(EVENT_TYPE_PACKET_ACKED) => {
                if let Some(pn) = event.packet_number() {
                    self.acked_pn = pn;
                }
            }
            _ => {}
        }

        self.total_events += 1;

        let is_terminal = event_type.as_deref() == Some(EVENT_TYPE_FREE);
        if self.events.len() < max_events || is_terminal {
            self.events.push(event.raw);
        }

        if is_terminal {
            self.finalized = true;
            return Some(FinalizedConn {
                conn_id: self.conn_id,
                start_time_ms: self.start_time_ms,
                end_time_ms: self.end_time_ms,
                sent_pn: self.sent_pn,
                acked_pn: self.acked_pn,
                total_events: self.total_events,
                events: std::mem::take(&mut self.events),
            });
        }

        None
    }
}
