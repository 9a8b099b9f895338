//! Unit tests for the event log.

use rusqlite::Connection;

use crate::event::time_of_day;
use crate::store::{append_event, count_events, prune_events, recent_events};

/// Creates an in-memory SQLite database with migrations applied.
fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    vigil_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn append_n(conn: &Connection, n: i64) {
    for i in 1..=n {
        append_event(conn, "voice/test", &format!("payload-{i}")).expect("append should succeed");
    }
}

// ── append_event tests ───────────────────────────────────────────────

#[test]
fn append_assigns_dense_ascending_ids() {
    let conn = test_db();

    for i in 1..=50i64 {
        let event = append_event(&conn, "voice/wake", "hey").expect("append should succeed");
        assert_eq!(event.id, i, "ids must be dense and ascending");
    }

    let events = recent_events(&conn, 50).unwrap();
    let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, (1..=50).collect::<Vec<i64>>());
}

#[test]
fn append_stores_topic_payload_and_timestamp() {
    let conn = test_db();

    let event = append_event(&conn, "satellites/kitchen/status", "online")
        .expect("append should succeed");

    let (timestamp, topic, payload): (String, String, String) = conn
        .query_row(
            "SELECT timestamp, topic, payload FROM events WHERE id = ?1",
            [event.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("should read back row");

    assert_eq!(topic, "satellites/kitchen/status");
    assert_eq!(payload, "online");
    assert_eq!(timestamp, event.timestamp);
    assert!(timestamp.contains('T'), "timestamp should be ISO-8601");
}

#[test]
fn appended_event_converts_to_wire_frame() {
    let conn = test_db();

    let event = append_event(&conn, "voice/wake", "hey-assistant").unwrap();
    let frame = event.to_frame();

    assert_eq!(frame.id, Some(event.id));
    assert_eq!(frame.topic, "voice/wake");
    assert_eq!(frame.payload, "hey-assistant");
    assert_eq!(frame.time, time_of_day(&event.timestamp));
}

// ── recent_events tests ──────────────────────────────────────────────

#[test]
fn recent_returns_oldest_first() {
    let conn = test_db();
    append_n(&conn, 10);

    let events = recent_events(&conn, 10).unwrap();
    assert_eq!(events.len(), 10);
    for pair in events.windows(2) {
        assert!(pair[0].id < pair[1].id, "events must be ascending by id");
    }
}

#[test]
fn recent_honors_the_limit() {
    let conn = test_db();
    append_n(&conn, 10);

    let events = recent_events(&conn, 3).unwrap();
    assert_eq!(events.len(), 3);
    // The three newest, still oldest-first.
    let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![8, 9, 10]);
}

#[test]
fn recent_with_zero_limit_is_empty() {
    let conn = test_db();
    append_n(&conn, 5);

    assert!(recent_events(&conn, 0).unwrap().is_empty());
    assert!(recent_events(&conn, -1).unwrap().is_empty());
}

#[test]
fn recent_on_empty_log_is_empty() {
    let conn = test_db();
    assert!(recent_events(&conn, 200).unwrap().is_empty());
}

// ── prune_events tests ───────────────────────────────────────────────

#[test]
fn prune_keeps_exactly_the_newest() {
    let conn = test_db();
    append_n(&conn, 20);

    let deleted = prune_events(&conn, 5).unwrap();
    assert_eq!(deleted, 15);
    assert_eq!(count_events(&conn).unwrap(), 5);

    let ids: Vec<i64> = recent_events(&conn, 100)
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![16, 17, 18, 19, 20]);
}

#[test]
fn prune_under_the_bound_is_a_noop() {
    let conn = test_db();
    append_n(&conn, 3);

    assert_eq!(prune_events(&conn, 5).unwrap(), 0);
    assert_eq!(count_events(&conn).unwrap(), 3);
}

#[test]
fn prune_is_idempotent() {
    let conn = test_db();
    append_n(&conn, 10);

    assert_eq!(prune_events(&conn, 4).unwrap(), 6);
    assert_eq!(prune_events(&conn, 4).unwrap(), 0);
    assert_eq!(prune_events(&conn, 4).unwrap(), 0);
    assert_eq!(count_events(&conn).unwrap(), 4);
}

#[test]
fn ids_keep_increasing_after_a_prune() {
    let conn = test_db();
    append_n(&conn, 10);
    prune_events(&conn, 2).unwrap();

    // AUTOINCREMENT must not reuse the deleted ids.
    let event = append_event(&conn, "voice/test", "after-prune").unwrap();
    assert_eq!(event.id, 11);
}

// ── concurrency tests ────────────────────────────────────────────────

/// File-backed pool for tests that need real cross-connection writes;
/// each pooled `:memory:` checkout would otherwise see its own database.
fn pooled_db(dir: &tempfile::TempDir) -> vigil_db::DbPool {
    let path = dir.path().join("log-test.db");
    let pool =
        vigil_db::create_pool(path.to_str().unwrap(), Default::default()).expect("pool creation");
    vigil_db::run_migrations(&pool.get().unwrap()).expect("migrations should succeed");
    pool
}

#[test]
fn concurrent_appends_assign_exactly_one_id_each() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pooled_db(&dir);

    let handles: Vec<_> = (0..4)
        .map(|writer| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..25 {
                    let conn = pool.get().expect("connection checkout");
                    let event = append_event(&conn, "voice/test", &format!("w{writer}-{i}"))
                        .expect("append should succeed");
                    ids.push(event.id);
                }
                ids
            })
        })
        .collect();

    let mut all_ids: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("writer thread should not panic"))
        .collect();
    all_ids.sort_unstable();

    // 100 appends from 4 writers must yield ids exactly 1..=100, no gaps
    // and no duplicates regardless of interleaving.
    assert_eq!(all_ids, (1..=100).collect::<Vec<i64>>());
}

#[test]
fn prune_racing_appends_never_loses_the_new_row() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pooled_db(&dir);
    {
        let conn = pool.get().unwrap();
        for i in 0..100 {
            append_event(&conn, "voice/seed", &format!("s{i}")).unwrap();
        }
    }

    let append_pool = pool.clone();
    let appender = std::thread::spawn(move || {
        let mut last_id = 0;
        for i in 0..200 {
            let conn = append_pool.get().expect("connection checkout");
            let event = append_event(&conn, "voice/test", &format!("a{i}"))
                .expect("append should succeed");
            assert!(event.id > last_id, "ids must keep increasing under pruning");
            last_id = event.id;
        }
        last_id
    });

    let prune_pool = pool.clone();
    let pruner = std::thread::spawn(move || {
        for _ in 0..200 {
            let conn = prune_pool.get().expect("connection checkout");
            prune_events(&conn, 5).expect("prune should succeed");
        }
    });

    let last_id = appender.join().expect("appender should not panic");
    pruner.join().expect("pruner should not panic");

    // The final append (newest row) must have survived every prune.
    assert_eq!(last_id, 300);
    let conn = pool.get().unwrap();
    let newest = recent_events(&conn, 1).unwrap();
    assert_eq!(newest[0].id, 300);
    assert_eq!(newest[0].payload, "a199");
}

#[test]
fn retention_window_scenario_5001_events() {
    let conn = test_db();
    append_n(&conn, 5001);

    let deleted = prune_events(&conn, 5000).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(count_events(&conn).unwrap(), 5000);

    let newest = recent_events(&conn, 1).unwrap();
    assert_eq!(newest.len(), 1);
    assert_eq!(newest[0].id, 5001);
}
