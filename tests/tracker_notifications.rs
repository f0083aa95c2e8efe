use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use whereabouts::error::WhereaboutsError;
use whereabouts::inference::{Decision, Round};
use whereabouts::notify::{Channel, Notifier};
use whereabouts::persist::{PersistenceMode, Persistor};
use whereabouts::tracker::Tracker;

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(Channel, String)>>,
}
impl Recorder {
    fn sent(&self) -> Vec<(Channel, String)> {
        self.sent.lock().unwrap().clone()
    }
}
impl Notifier for Recorder {
    fn dispatch(&self, channel: Channel, text: String) {
        self.sent.lock().unwrap().push((channel, text));
    }
}

const ROOMS: [(&str, &str); 3] = [("aa:01", "kitchen"), ("aa:02", "bedroom"), ("aa:03", "living")];

fn setup() -> (Tracker, Arc<Recorder>) {
    let store = Persistor::new(&PersistenceMode::InMemory).expect("store");
    for (device, room) in ROOMS {
        store.assign_device(device, room).unwrap();
    }
    let recorder = Arc::new(Recorder::default());
    let tracker = Tracker::with_persistor(
        store,
        recorder.clone(),
        Round::default(),
        Duration::from_secs(5),
    );
    (tracker, recorder)
}

#[tokio::test]
async fn waiting_rounds_stay_quiet() {
    let (tracker, recorder) = setup();
    let decision = tracker.submit_readings("aa:01", vec![-40]).await.unwrap();
    assert!(matches!(decision, Decision::Waiting { .. }));
    tracker.submit_readings("aa:02", vec![-50]).await.unwrap();
    assert!(recorder.sent().is_empty());
    assert_eq!(tracker.last_known_room().await.unwrap(), None);
}

#[tokio::test]
async fn found_moved_and_lost_are_each_announced_once() {
    let (tracker, recorder) = setup();
    tracker.submit_readings("aa:01", vec![-40]).await.unwrap();
    tracker.submit_readings("aa:02", vec![-50]).await.unwrap();
    tracker.submit_readings("aa:03", vec![-60]).await.unwrap();
    tracker.submit_readings("aa:01", vec![-41]).await.unwrap();
    tracker.submit_readings("aa:03", vec![-20]).await.unwrap();
    tracker.submit_readings("aa:01", vec![]).await.unwrap();
    tracker.submit_readings("aa:02", vec![]).await.unwrap();
    tracker.submit_readings("aa:03", vec![]).await.unwrap();
    tracker.submit_readings("aa:03", vec![]).await.unwrap();

    assert_eq!(
        recorder.sent(),
        vec![
            (Channel::Location, "Cat found: kitchen\nAverage RSSI: -40".to_string()),
            (Channel::Location, "Cat moved: living\nAverage RSSI: -20".to_string()),
            (Channel::Location, "Lost sight of the cat...\nLast seen: living".to_string()),
        ]
    );
    assert_eq!(tracker.last_known_room().await.unwrap(), None);
}

#[tokio::test]
async fn boot_names_the_room() {
    let (tracker, recorder) = setup();
    let room = tracker.report_boot("aa:02").await.unwrap();
    assert_eq!(room, "bedroom");
    assert_eq!(recorder.sent(), vec![(Channel::Boot, "bedroom".to_string())]);
}

#[tokio::test]
async fn unknown_device_is_rejected_without_side_effects() {
    let (tracker, recorder) = setup();
    let err = tracker.report_boot("ff:ff").await.unwrap_err();
    assert!(matches!(err, WhereaboutsError::UnknownDevice { .. }));
    let err = tracker.submit_readings("ff:ff", vec![-10]).await.unwrap_err();
    assert!(matches!(err, WhereaboutsError::UnknownDevice { .. }));
    assert!(recorder.sent().is_empty());
    assert_eq!(tracker.room_of("ff:ff").await.unwrap(), None);
}

#[tokio::test]
async fn assigned_devices_can_report() {
    let (tracker, recorder) = setup();
    tracker.assign_device("bb:01", "hallway").await.unwrap();
    assert_eq!(tracker.room_of("bb:01").await.unwrap(), Some("hallway".into()));
    // reassignment replaces the room
    tracker.assign_device("bb:01", "garage").await.unwrap();
    assert_eq!(tracker.report_boot("bb:01").await.unwrap(), "garage");
    assert_eq!(recorder.sent().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rounds_announce_a_single_transition() {
    let (tracker, recorder) = setup();
    let tracker = Arc::new(tracker);
    let mut tasks = Vec::new();
    for _ in 0..5 {
        for (device, signal) in [("aa:01", -40), ("aa:02", -55), ("aa:03", -70)] {
            let tracker = Arc::clone(&tracker);
            tasks.push(tokio::spawn(async move {
                tracker.submit_readings(device, vec![signal, signal - 2]).await
            }));
        }
    }
    let mut found = 0;
    for task in tasks {
        if let Decision::Found { room, average } = task.await.unwrap().unwrap() {
            assert_eq!(room, "kitchen");
            assert_eq!(average, -41.0);
            found += 1;
        }
    }
    assert_eq!(found, 1);
    assert_eq!(
        recorder.sent(),
        vec![(Channel::Location, "Cat found: kitchen\nAverage RSSI: -41".to_string())]
    );
    assert_eq!(tracker.last_known_room().await.unwrap(), Some("kitchen".into()));
}

fn file_tracker(
    dir: &tempfile::TempDir,
    expected_rooms: usize,
    lock_timeout: Duration,
) -> (Tracker, Arc<Recorder>, PersistenceMode) {
    let path = dir.path().join("whereabouts.db").to_string_lossy().into_owned();
    let mode = PersistenceMode::File(path);
    let recorder = Arc::new(Recorder::default());
    let round = Round { expected_rooms, ..Round::default() };
    let tracker = Tracker::open(&mode, recorder.clone(), round, lock_timeout).expect("tracker");
    (tracker, recorder, mode)
}

fn side_connection(mode: &PersistenceMode) -> rusqlite::Connection {
    let PersistenceMode::File(path) = mode else { unreachable!() };
    rusqlite::Connection::open(path).expect("side connection")
}

#[tokio::test]
async fn held_database_lock_times_out_without_notifying() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, recorder, mode) = file_tracker(&dir, 1, Duration::from_millis(200));
    tracker.assign_device("aa:01", "kitchen").await.unwrap();

    // another process holds the write lock for the whole attempt
    let side = side_connection(&mode);
    side.execute_batch("begin exclusive").unwrap();

    let started = Instant::now();
    let err = tracker.submit_readings("aa:01", vec![-40]).await.unwrap_err();
    let waited = started.elapsed();
    assert!(matches!(err, WhereaboutsError::Storage(_)), "unexpected error: {err}");
    assert!(waited >= Duration::from_millis(100), "gave up after {waited:?}");
    assert!(waited < Duration::from_secs(2), "waited {waited:?}");
    assert!(recorder.sent().is_empty());
    assert_eq!(tracker.last_known_room().await.unwrap(), None);

    side.execute_batch("rollback").unwrap();
    let decision = tracker.submit_readings("aa:01", vec![-40]).await.unwrap();
    assert!(matches!(decision, Decision::Found { .. }));
    assert_eq!(recorder.sent().len(), 1);
}

#[tokio::test]
async fn failed_position_write_rolls_back_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (tracker, recorder, mode) = file_tracker(&dir, 2, Duration::from_secs(5));
    tracker.assign_device("aa:01", "kitchen").await.unwrap();
    tracker.assign_device("aa:02", "bedroom").await.unwrap();
    tracker.submit_readings("aa:01", vec![-40]).await.unwrap();
    let decision = tracker.submit_readings("aa:02", vec![-70]).await.unwrap();
    assert!(matches!(decision, Decision::Found { .. }));

    // a Position table that keeps the room but rejects the slot insert
    side_connection(&mode)
        .execute_batch(
            "
            drop table Position;
            create table Position (Room text not null);
            insert into Position (Room) values ('kitchen');
            ",
        )
        .unwrap();

    // bedroom now wins, so the round tries to record a move
    let err = tracker.submit_readings("aa:02", vec![-10, -20]).await.unwrap_err();
    assert!(matches!(err, WhereaboutsError::Storage(_)), "unexpected error: {err}");

    let store = Persistor::new(&mode).expect("store");
    let signals: Vec<_> = store.readings("bedroom").unwrap().into_iter().map(|r| r.signal).collect();
    assert_eq!(signals, vec![Some(-70)]);
    assert_eq!(store.last_known_room().unwrap(), Some("kitchen".into()));
    assert_eq!(tracker.last_known_room().await.unwrap(), Some("kitchen".into()));
    assert_eq!(
        recorder.sent(),
        vec![(Channel::Location, "Cat found: kitchen\nAverage RSSI: -40".to_string())]
    );
}
