//! Ingest path: line decoder → connection table → aggregation
//!
//! Single-threaded by construction. One `ingest_line` call per input line,
//! applied strictly in arrival order; the occasional `FinalizedConn` it
//! returns is the hand-off point to the concurrent upload side.

use crate::aggregate::FinalizedConn;
use crate::conn_table::ConnTable;
use crate::event::decode_line;

pub struct Collector {
    table: ConnTable,
    max_events_per_conn: usize,
    lines_ingested: u64,
    conns_finalized: u64,
}

impl Collector {
    pub fn new(table_capacity: usize, max_events_per_conn: usize) -> Self {
        Self {
            table: ConnTable::new(table_capacity),
            max_events_per_conn,
            lines_ingested: 0,
            conns_finalized: 0,
        }
    }

    /// Process one input line. Returns the finalized connection when this
    /// line carried the terminal event for its connection.
    pub fn ingest_line(&mut self, line: &str) -> Option<FinalizedConn> {
        self.lines_ingested += 1;

        let event = decode_line(line)?;
        let entry = self.table.get_or_create(event.conn_id);
        let finalized = entry.apply(event, self.max_events_per_conn)?;

        self.conns_finalized += 1;
        log::debug!(
            "Finalized connection {}: sent_pn={}, acked_pn={}, {} events ({} retained)",
            finalized.conn_id,
            finalized.sent_pn,
            finalized.acked_pn,
            finalized.total_events,
            finalized.events.len()
        );
        Some(finalized)
    }

    pub fn lines_ingested(&self) -> u64 {
        self.lines_ingested
    }

    pub fn conns_finalized(&self) -> u64 {
        self.conns_finalized
    }

    pub fn table(&self) -> &ConnTable {
        &self.table
    }
}
