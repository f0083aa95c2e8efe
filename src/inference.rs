//! The room-inference transaction.
//!
//! Every submitted batch replaces its room's readings. Once every expected
//! room has reported inside the window around now, the room with the
//! strongest average signal is compared with the last known room and the
//! position is updated. All of it happens inside one exclusive transaction,
//! so two beacons can never both act on the same round.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::error::{Result, WhereaboutsError};
use crate::persist::{
    clear_position, last_known_room, lookup_room, record_position, replace_readings,
    rooms_reporting, strongest_room, Persistor, Standing,
};

/// What makes a complete round.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub expected_rooms: usize,
    /// Half-width of the window centered on now.
    pub window: TimeDelta,
}
impl Default for Round {
    fn default() -> Self {
        Self { expected_rooms: 3, window: TimeDelta::minutes(1) }
    }
}

/// The outcome of one committed inference transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Not every room has reported within the window yet.
    Waiting { reporting: usize, expected: usize },
    Found { room: String, average: f64 },
    Moved { from: String, room: String, average: f64 },
    /// No room observed a signal; the last known room is forgotten.
    Lost { last_room: String },
    /// `None` when the cat was already lost and still is.
    Unchanged { room: Option<String> },
}

impl Decision {
    /// Whether the position changed.
    pub fn is_transition(&self) -> bool {
        matches!(self, Decision::Found { .. } | Decision::Moved { .. } | Decision::Lost { .. })
    }

    /// The location message describing this decision, if it warrants one.
    pub fn message(&self) -> Option<String> {
        match self {
            Decision::Found { room, average } => {
                Some(format!("Cat found: {room}\nAverage RSSI: {average}"))
            }
            Decision::Moved { room, average, .. } => {
                Some(format!("Cat moved: {room}\nAverage RSSI: {average}"))
            }
            Decision::Lost { last_room } => {
                Some(format!("Lost sight of the cat...\nLast seen: {last_room}"))
            }
            Decision::Waiting { .. } | Decision::Unchanged { .. } => None,
        }
    }
}

/// Compares the strongest room of a complete round with the last known room.
pub fn decide(standing: Standing, prior: Option<String>) -> Decision {
    match (standing.average, prior) {
        (None, Some(last_room)) => Decision::Lost { last_room },
        (None, None) => Decision::Unchanged { room: None },
        (Some(average), None) => Decision::Found { room: standing.room, average },
        (Some(_), Some(from)) if from == standing.room => Decision::Unchanged { room: Some(from) },
        (Some(average), Some(from)) => Decision::Moved { from, room: standing.room, average },
    }
}

impl Persistor {
    /// Ingests a batch for `device` and, when the round is complete, decides
    /// and records the position. An empty batch is stored as a single
    /// no-signal reading. Nothing is committed on error.
    pub fn infer(
        &mut self,
        device: &str,
        samples: &[i32],
        now: DateTime<Utc>,
        round: &Round,
    ) -> Result<Decision> {
        let tx = self.exclusive()?;
        let room = lookup_room(&tx, device)?.ok_or_else(|| WhereaboutsError::UnknownDevice {
            device: device.to_string(),
        })?;

        let signals: Vec<Option<i32>> = if samples.is_empty() {
            vec![None]
        } else {
            samples.iter().copied().map(Some).collect()
        };
        replace_readings(&tx, &room, &signals, now)?;

        let reporting = rooms_reporting(&tx, now - round.window, now + round.window)?;
        if reporting < round.expected_rooms {
            tx.commit()?;
            debug!(%room, reporting, expected = round.expected_rooms, "waiting for a full round");
            return Ok(Decision::Waiting { reporting, expected: round.expected_rooms });
        }

        let standing = strongest_room(&tx)?.ok_or_else(|| {
            WhereaboutsError::Storage("no readings left after ingest".into())
        })?;
        let prior = last_known_room(&tx)?;
        let decision = decide(standing, prior);
        match &decision {
            Decision::Lost { .. } => clear_position(&tx)?,
            Decision::Found { room, .. } | Decision::Moved { room, .. } => {
                record_position(&tx, room)?
            }
            Decision::Waiting { .. } | Decision::Unchanged { .. } => {}
        }
        tx.commit()?;
        debug!(%room, ?decision, "round decided");
        Ok(decision)
    }
}
