use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveTime, Utc};
use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use clubsched::config::{ClubHours, Config};
use clubsched::engine::{Engine, EngineError};
use clubsched::model::{Event, Purpose};
use clubsched::notify::NotifyHub;
use clubsched::session::Session;

// ── Test infrastructure ──────────────────────────────────────

fn test_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("clubsched_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn start_engine() -> (Arc<Engine>, Config) {
    let config = Config {
        data_dir: test_dir(),
        ..Config::default()
    };
    let engine = Arc::new(Engine::open(&config).unwrap());
    (engine, config)
}

fn tomorrow(hour: u32, minute: u32) -> i64 {
    let date = Utc::now().date_naive() + Duration::days(1);
    date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
        .and_utc()
        .timestamp_millis()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn full_club_day() {
    let (engine, _config) = start_engine();
    let admin = Session::admin();

    let coach = assert_ok!(engine.create_trainer(&admin, Some("Coach".into())).await);
    let hall = assert_ok!(engine.create_room(&admin, Some("Hall".into()), 3).await);
    let studio = assert_ok!(engine.create_room(&admin, Some("Studio".into()), 2).await);

    // The trainer publishes their own day.
    let as_coach = Session::trainer(coach);
    assert_ok!(engine.add_availability(&as_coach, coach, tomorrow(8, 0), tomorrow(16, 0)).await);

    // Hall is taken in the morning, so only the studio is offered.
    assert_ok!(
        engine
            .book_room(&admin, hall, tomorrow(9, 0), tomorrow(11, 0), Purpose::Private)
            .await
    );
    let mut offered = Vec::new();
    let class_id = assert_ok!(
        engine
            .schedule_class(&admin, coach, tomorrow(10, 0), tomorrow(11, 0), Purpose::Group, |rooms| {
                offered = rooms.iter().map(|r| r.id).collect();
                Some(0)
            })
            .await
    );
    assert_eq!(offered, vec![studio]);

    let slots = assert_ok!(engine.trainer_availability(coach).await);
    let spans: Vec<(i64, i64)> = slots.iter().map(|s| (s.start, s.end)).collect();
    assert_eq!(spans, vec![(tomorrow(8, 0), tomorrow(10, 0)), (tomorrow(11, 0), tomorrow(16, 0))]);

    // Members fill the studio.
    let alice = Session::member(Ulid::new());
    let bob = Session::member(Ulid::new());
    assert_eq!(assert_ok!(engine.register(&alice, class_id).await), 1);
    assert_eq!(assert_ok!(engine.register(&bob, class_id).await), 2);
    let err = assert_err!(engine.register(&Session::member(Ulid::new()), class_id).await);
    assert!(matches!(err, EngineError::CapacityExceeded(2)));
    let err = assert_err!(engine.register(&alice, class_id).await);
    assert!(matches!(err, EngineError::AlreadyRegistered { .. }));

    let classes = engine.available_classes().await;
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].trainer_name.as_deref(), Some("Coach"));
    assert_eq!(classes[0].room_name.as_deref(), Some("Studio"));
    assert_eq!((classes[0].attendance, classes[0].capacity), (2, 2));
    assert!(engine.audit().await.is_empty());
}

#[tokio::test]
async fn reopen_from_data_dir() {
    let (engine, config) = start_engine();
    let admin = Session::admin();
    let coach = assert_ok!(engine.create_trainer(&admin, None).await);
    assert_ok!(engine.add_availability(&admin, coach, tomorrow(9, 0), tomorrow(17, 0)).await);
    assert_ok!(engine.create_room(&admin, None, 5).await);
    let class_id = assert_ok!(
        engine
            .schedule_class(&admin, coach, tomorrow(9, 0), tomorrow(10, 0), Purpose::Private, |_| Some(0))
            .await
    );
    assert_ok!(engine.register(&Session::member(Ulid::new()), class_id).await);
    drop(engine);

    let reopened = Engine::open(&config).unwrap();
    let class = assert_ok!(reopened.get_class(class_id).await);
    assert_eq!(class.attendance, 1);
    assert_eq!(class.purpose, Purpose::Private);
    let slots = assert_ok!(reopened.trainer_availability(coach).await);
    assert_eq!(slots.len(), 1);
    assert_eq!((slots[0].start, slots[0].end), (tomorrow(10, 0), tomorrow(17, 0)));
}

#[tokio::test]
async fn parallel_scheduling_never_double_books() {
    let (engine, _config) = start_engine();
    let admin = Session::admin();
    let room = assert_ok!(engine.create_room(&admin, None, 10).await);
    let mut trainers = Vec::new();
    for _ in 0..8 {
        let t = assert_ok!(engine.create_trainer(&admin, None).await);
        assert_ok!(engine.add_availability(&admin, t, tomorrow(9, 0), tomorrow(12, 0)).await);
        trainers.push(t);
    }

    // Eight trainers want the only room at the same hour.
    let handles: Vec<_> = trainers
        .iter()
        .map(|&t| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .schedule_class(
                        &Session::admin(),
                        t,
                        tomorrow(10, 0),
                        tomorrow(11, 0),
                        Purpose::Group,
                        |_| Some(0),
                    )
                    .await
            })
        })
        .collect();
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
        e,
        EngineError::NoRoomsAvailable(_) | EngineError::Conflict { .. }
    )));
    assert_eq!(assert_ok!(engine.room_bookings(room).await).len(), 1);

    // Losers keep their whole morning.
    let untouched = join_all(trainers.iter().map(|&t| engine.trainer_availability(t))).await;
    let full_mornings = untouched
        .into_iter()
        .filter(|r| r.as_ref().is_ok_and(|s| s.len() == 1 && s[0].end - s[0].start == 3 * 3_600_000))
        .count();
    assert_eq!(full_mornings, 7);
    assert!(engine.audit().await.is_empty());
}

#[tokio::test]
async fn club_hours_follow_utc_offset() {
    // Club two hours east of UTC: 05:00 UTC is 07:00 local.
    let hours = ClubHours::new(120, 6, 22).unwrap();
    let path = test_dir().join("offset.wal");
    let engine = Engine::new(path, Arc::new(NotifyHub::new()), hours).unwrap();
    let admin = Session::admin();
    let t = assert_ok!(engine.create_trainer(&admin, None).await);

    assert_ok!(engine.add_availability(&admin, t, tomorrow(5, 0), tomorrow(7, 0)).await);
    let err = assert_err!(engine.add_availability(&admin, t, tomorrow(19, 0), tomorrow(21, 0)).await);
    assert!(matches!(err, EngineError::OutOfBusinessHours(_)));
}

#[tokio::test]
async fn subscribers_see_registrations() {
    let (engine, _config) = start_engine();
    let admin = Session::admin();
    let t = assert_ok!(engine.create_trainer(&admin, None).await);
    assert_ok!(engine.add_availability(&admin, t, tomorrow(9, 0), tomorrow(12, 0)).await);
    assert_ok!(engine.create_room(&admin, None, 5).await);
    let class_id = assert_ok!(
        engine
            .schedule_class(&admin, t, tomorrow(9, 0), tomorrow(10, 0), Purpose::Group, |_| Some(0))
            .await
    );

    let mut rx = engine.notify.subscribe(class_id);
    let member = Ulid::new();
    assert_ok!(engine.register(&Session::member(member), class_id).await);
    let event = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, Event::MemberRegistered { class_id, member_id: member });
}
