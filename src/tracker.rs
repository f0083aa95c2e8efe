//! Async front for the reading store.
//!
//! All inference transactions go through one writer connection guarded by
//! an async mutex, so they are serialized system-wide. Waiting for that
//! mutex is bounded by the lock timeout, and the SQL itself runs on a
//! blocking thread while the guard is held. Notifications are dispatched
//! only after the transaction has committed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{Result, WhereaboutsError};
use crate::inference::{Decision, Round};
use crate::notify::{Channel, Notifier};
use crate::persist::{PersistenceMode, Persistor};

pub struct Tracker {
    writer: Arc<Mutex<Persistor>>,
    // a separate connection for file stores, the writer itself when in memory
    reader: Arc<Mutex<Persistor>>,
    notifier: Arc<dyn Notifier>,
    round: Round,
    lock_timeout: Duration,
}

impl Tracker {
    pub fn open(
        mode: &PersistenceMode,
        notifier: Arc<dyn Notifier>,
        round: Round,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let writer = Persistor::new(mode)?;
        writer.set_busy_timeout(lock_timeout)?;
        let writer = Arc::new(Mutex::new(writer));
        let reader = match mode {
            PersistenceMode::InMemory => Arc::clone(&writer),
            PersistenceMode::File(_) => {
                let reader = Persistor::new(mode)?;
                reader.set_busy_timeout(lock_timeout)?;
                Arc::new(Mutex::new(reader))
            }
        };
        Ok(Self { writer, reader, notifier, round, lock_timeout })
    }

    /// Wraps an already opened store; reads and writes share its connection.
    pub fn with_persistor(
        persistor: Persistor,
        notifier: Arc<dyn Notifier>,
        round: Round,
        lock_timeout: Duration,
    ) -> Self {
        let writer = Arc::new(Mutex::new(persistor));
        let reader = Arc::clone(&writer);
        Self { writer, reader, notifier, round, lock_timeout }
    }

    /// Runs `work` on a blocking thread while holding the store's mutex.
    async fn with_store<T, F>(&self, store: &Arc<Mutex<Persistor>>, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Persistor) -> Result<T> + Send + 'static,
    {
        let mut guard = tokio::time::timeout(self.lock_timeout, Arc::clone(store).lock_owned())
            .await
            .map_err(|_| {
                WhereaboutsError::Storage(format!(
                    "timed out after {:?} waiting for the reading store",
                    self.lock_timeout
                ))
            })?;
        tokio::task::spawn_blocking(move || work(&mut *guard)).await?
    }

    /// Submits a batch of signal strengths from `device`, timestamped now.
    pub async fn submit_readings(&self, device: &str, samples: Vec<i32>) -> Result<Decision> {
        self.submit_readings_at(device, samples, Utc::now()).await
    }

    /// Submits a batch captured at `now`. The location notification, if
    /// any, goes out after the transaction has committed.
    pub async fn submit_readings_at(
        &self,
        device: &str,
        samples: Vec<i32>,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        let device_id = device.to_string();
        let round = self.round.clone();
        let count = samples.len();
        let decision = self
            .with_store(&self.writer, move |persistor| {
                persistor.infer(&device_id, &samples, now, &round)
            })
            .await?;
        if let Some(text) = decision.message() {
            info!(device, ?decision, "location changed");
            self.notifier.dispatch(Channel::Location, text);
        } else {
            info!(device, samples = count, ?decision, "readings stored");
        }
        Ok(decision)
    }

    /// Resolves the room of a booted device and announces it. Returns the room.
    pub async fn report_boot(&self, device: &str) -> Result<String> {
        let room = self.room_of(device).await?.ok_or_else(|| WhereaboutsError::UnknownDevice {
            device: device.to_string(),
        })?;
        info!(device, %room, "device booted");
        self.notifier.dispatch(Channel::Boot, room.clone());
        Ok(room)
    }

    pub async fn room_of(&self, device: &str) -> Result<Option<String>> {
        let device = device.to_string();
        self.with_store(&self.reader, move |persistor| persistor.room_of(&device)).await
    }

    pub async fn last_known_room(&self) -> Result<Option<String>> {
        self.with_store(&self.reader, |persistor| persistor.last_known_room()).await
    }

    /// Adds or reassigns a device in the directory.
    pub async fn assign_device(&self, device: &str, room: &str) -> Result<()> {
        let (device, room) = (device.to_string(), room.to_string());
        self.with_store(&self.writer, move |persistor| persistor.assign_device(&device, &room))
            .await
    }
}
