//! Telemetry event catalog and ring buffer shared by host and embedded targets.
//!
//! Every acquisition cycle leaves a trail of state transitions, session
//! open/close events, and per-channel anomalies in a fixed-size
//! [`TelemetryRecorder`]. The emulator mirrors the trail into its transcript
//! and an embedded bridge can ship it over a diagnostics channel.

use core::fmt;
use core::time::Duration;

use heapless::{HistoryBuf, OldestOrdered};

use crate::acquisition::AcquisitionState;
use crate::bus::{Interface, TimebaseInstant};

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events emitted during acquisition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryEventKind {
    SessionOpened(Interface),
    SessionClosed(Interface),
    StateEntered(AcquisitionState),
    BusFault,
    ChannelMissing(u8),
    CycleComplete,
    CycleAborted,
    CycleRetry(u8),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::SessionOpened(interface) => {
                write!(f, "session-opened {interface}")
            }
            TelemetryEventKind::SessionClosed(interface) => {
                write!(f, "session-closed {interface}")
            }
            TelemetryEventKind::StateEntered(state) => write!(f, "state {state}"),
            TelemetryEventKind::BusFault => f.write_str("bus-fault"),
            TelemetryEventKind::ChannelMissing(index) => write!(f, "channel-missing {index}"),
            TelemetryEventKind::CycleComplete => f.write_str("cycle-complete"),
            TelemetryEventKind::CycleAborted => f.write_str("cycle-aborted"),
            TelemetryEventKind::CycleRetry(attempt) => write!(f, "cycle-retry {attempt}"),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    first_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TimebaseInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            first_at: None,
            next_event_id: 0,
        }
    }

    /// Records an event and returns its identifier.
    pub fn record(&mut self, event: TelemetryEventKind, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        if self.first_at.is_none() {
            self.first_at = Some(timestamp);
        }

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
        });

        id
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Time elapsed between the first recorded event and `record`.
    #[must_use]
    pub fn offset_of(&self, record: &TelemetryRecord<TInstant>) -> Duration {
        self.first_at
            .map_or(Duration::ZERO, |first| {
                record.timestamp.saturating_duration_since(first)
            })
    }

    /// Returns the number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Drops every stored record and restarts the relative clock.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.first_at = None;
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TimebaseInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
