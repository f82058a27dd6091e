//! UDP telemetry broadcast.
//!
//! Each record goes out as one datagram: a short channel tag, a comma
//! separated payload, and a trailing newline, capped at 512 bytes.
//! Fire-and-forget: the socket is non-blocking and every error is
//! swallowed. A receiver that is not listening costs nothing.

use std::net::UdpSocket;

use super::EventSink;
use crate::events::{BcdSymbol, CorrelatedMarker, SyncUpdate, TickEvent, ToneMeasurement};

const MAX_DATAGRAM: usize = 512;

pub struct TelemetrySink {
    socket: Option<UdpSocket>,
    target: String,
}

impl TelemetrySink {
    /// `target` is a `host:port` destination, typically a broadcast
    /// address. A bind failure produces an inert sink.
    pub fn new(target: &str) -> Self {
        let socket = UdpSocket::bind("0.0.0.0:0").ok().and_then(|s| {
            s.set_nonblocking(true).ok()?;
            s.set_broadcast(true).ok()?;
            Some(s)
        });
        Self {
            socket,
            target: target.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.socket.is_some()
    }

    fn send(&self, tag: &str, payload: &str) {
        let Some(socket) = &self.socket else {
            return;
        };
        let mut datagram = format!("{tag},{payload}\n");
        if datagram.len() > MAX_DATAGRAM {
            datagram.truncate(MAX_DATAGRAM - 1);
            datagram.push('\n');
        }
        // Best effort; drop on any error including backpressure.
        let _ = socket.send_to(datagram.as_bytes(), &self.target);
    }
}

impl EventSink for TelemetrySink {
    fn on_tick(&mut self, e: &TickEvent) {
        self.send(
            "TICK",
            &format!(
                "{:.3},{},{:.2},{:.2}",
                e.timestamp_ms, e.tick_number, e.duration_ms, e.snr_db
            ),
        );
    }

    fn on_correlated_marker(&mut self, e: &CorrelatedMarker) {
        self.send(
            "CORR",
            &format!(
                "{:.3},{},{:.2},{:?}",
                e.timestamp_ms, e.marker_number, e.duration_ms, e.confidence
            ),
        );
    }

    fn on_sync(&mut self, u: &SyncUpdate) {
        self.send(
            "SYNC",
            &format!(
                "{:.3},{},{},{:.3},{:.2}",
                u.timestamp_ms, u.marker_number, u.state, u.interval_sec, u.delta_ms
            ),
        );
    }

    fn on_bcd_symbol(&mut self, s: &BcdSymbol) {
        self.send(
            "BCDS",
            &format!(
                "{:.3},{},{},{:?},{:.2},{:.3}",
                s.timestamp_ms, s.symbol_index, s.second, s.value, s.pulse_duration_ms, s.confidence
            ),
        );
    }

    fn on_tone(&mut self, m: &ToneMeasurement) {
        let tag = match m.nominal_hz as u32 {
            500 => "TONE500",
            600 => "TONE600",
            _ => "TONE0",
        };
        self.send(
            tag,
            &format!(
                "{:.3},{:.4},{:.4},{:.4},{:.2},{}",
                m.timestamp_ms, m.measured_hz, m.offset_hz, m.offset_ppm, m.snr_db, m.valid
            ),
        );
    }
}
