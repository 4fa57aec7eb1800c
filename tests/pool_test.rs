//! Integration tests for the pool engine: dedup, convergence, outcome
//! bookkeeping, lifecycle and the worker panic boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use foreman::{
    Pool, PoolConfig, PoolError, PoolState, SubmitOutcome, Task, TaskHandler, TaskStatus,
};

/// Poll `all_done` until it holds or the deadline passes.
fn wait_all_done<K, P>(pool: &Pool<K, P>) -> bool
where
    K: Eq + std::hash::Hash + Clone + Send + std::fmt::Debug + 'static,
    P: Clone + Send + 'static,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if pool.all_done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn always_true<K, P>() -> TaskHandler<K, P> {
    Arc::new(|_task| true)
}

#[test]
fn five_tasks_converge_to_done_and_stop_cleanly() {
    // Scenario: two workers, identities 1..5, handler always succeeds.
    let pool: Pool<u32, ()> = Pool::new(PoolConfig { workers: 2 });
    pool.start(always_true()).unwrap();
    assert_eq!(pool.state(), PoolState::Running);

    for id in 1..=5u32 {
        assert_eq!(
            pool.submit(Task::new(id, ())).unwrap(),
            SubmitOutcome::Dispatched
        );
    }

    assert!(wait_all_done(&pool));
    let snapshot = pool.snapshot();
    assert_eq!(snapshot.len(), 5);
    assert!(snapshot.values().all(|t| t.status() == TaskStatus::Done));

    pool.shutdown();
    assert_eq!(pool.state(), PoolState::Stopped);
    assert!(matches!(
        pool.submit(Task::new(6, ())),
        Err(PoolError::NotStarted)
    ));
}

#[test]
fn duplicate_identity_is_dispatched_once() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let handler: TaskHandler<&'static str, u32> = Arc::new(move |_task| {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    });

    let pool = Pool::new(PoolConfig { workers: 2 });
    pool.start(handler).unwrap();

    assert_eq!(
        pool.submit(Task::new("seg-1.ts", 1)).unwrap(),
        SubmitOutcome::Dispatched
    );
    assert_eq!(
        pool.submit(Task::new("seg-1.ts", 2)).unwrap(),
        SubmitOutcome::Duplicate
    );

    assert!(wait_all_done(&pool));
    pool.shutdown();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let snapshot = pool.snapshot();
    assert_eq!(snapshot.len(), 1);
    // The first submission's payload won the race.
    assert_eq!(*snapshot["seg-1.ts"].payload(), 1);
}

#[test]
fn concurrent_duplicate_submitters_race_to_one_entry() {
    // Scenario: two callers submit identity 42 with different payloads.
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let handler: TaskHandler<u32, &'static str> = Arc::new(move |_task| {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    });

    let pool = Arc::new(Pool::new(PoolConfig { workers: 3 }));
    pool.start(handler).unwrap();

    let submitters: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|payload| {
            let pool = pool.clone();
            thread::spawn(move || pool.submit(Task::new(42u32, payload)).unwrap())
        })
        .collect();
    let outcomes: Vec<SubmitOutcome> = submitters.into_iter().map(|h| h.join().unwrap()).collect();

    // Exactly one of the two won the registration.
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == SubmitOutcome::Dispatched)
            .count(),
        1
    );

    assert!(wait_all_done(&pool));
    pool.shutdown();

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(pool.snapshot().len(), 1);
}

#[test]
fn even_identities_done_odd_identities_failed() {
    let handler: TaskHandler<u64, ()> = Arc::new(|task| task.identity() % 2 == 0);
    let pool = Pool::new(PoolConfig { workers: 3 });
    pool.start(handler).unwrap();

    for id in 0..10u64 {
        pool.submit(Task::new(id, ())).unwrap();
    }
    assert!(wait_all_done(&pool));
    pool.shutdown();

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.len(), 10);
    for (id, task) in snapshot {
        if id % 2 == 0 {
            assert_eq!(task.status(), TaskStatus::Done, "task {id}");
        } else {
            assert_eq!(task.status(), TaskStatus::Failed, "task {id}");
        }
    }
}

#[test]
fn submit_before_start_is_rejected() {
    let pool: Pool<u32, ()> = Pool::default();
    assert!(matches!(
        pool.submit(Task::new(1, ())),
        Err(PoolError::NotStarted)
    ));
    assert_eq!(pool.state(), PoolState::Unstarted);
}

#[test]
fn shutdown_is_idempotent_from_any_state() {
    let pool: Pool<u32, ()> = Pool::default();
    // No-op before start.
    pool.shutdown();
    assert_eq!(pool.state(), PoolState::Unstarted);

    pool.start(always_true()).unwrap();
    pool.shutdown();
    pool.shutdown();
    assert_eq!(pool.state(), PoolState::Stopped);
}

#[test]
fn start_twice_is_an_error() {
    let pool: Pool<u32, ()> = Pool::default();
    pool.start(always_true()).unwrap();
    assert!(matches!(
        pool.start(always_true()),
        Err(PoolError::AlreadyRunning)
    ));
    pool.shutdown();
}

#[test]
fn restart_after_stop_resets_the_registry() {
    let pool: Pool<u32, ()> = Pool::new(PoolConfig { workers: 1 });
    pool.start(always_true()).unwrap();
    pool.submit(Task::new(1, ())).unwrap();
    assert!(wait_all_done(&pool));
    pool.shutdown();

    pool.start(always_true()).unwrap();
    assert!(pool.snapshot().is_empty());
    // The identity from the previous generation is fresh again.
    assert_eq!(
        pool.submit(Task::new(1, ())).unwrap(),
        SubmitOutcome::Dispatched
    );
    assert!(wait_all_done(&pool));
    pool.shutdown();
}

#[test]
fn all_done_is_vacuously_true_with_no_submissions() {
    let pool: Pool<u32, ()> = Pool::default();
    pool.start(always_true()).unwrap();
    assert!(pool.all_done());
    pool.shutdown();
}

#[test]
fn handler_panic_leaves_task_pending_and_pool_stoppable() {
    let handler: TaskHandler<u32, ()> = Arc::new(|task| {
        if *task.identity() == 13 {
            panic!("boom");
        }
        true
    });
    let pool = Pool::new(PoolConfig { workers: 1 });
    pool.start(handler).unwrap();

    pool.submit(Task::new(13, ())).unwrap();
    // The worker dies at the panic boundary; no result is ever recorded.
    thread::sleep(Duration::from_millis(200));
    assert!(!pool.all_done());
    assert_eq!(pool.snapshot()[&13].status(), TaskStatus::Pending);

    // Shutdown must still join the dead worker set without wedging.
    pool.shutdown();
    assert_eq!(pool.state(), PoolState::Stopped);
}

#[test]
fn in_flight_handler_runs_to_completion_across_shutdown() {
    let handler: TaskHandler<u32, ()> = Arc::new(|_task| {
        thread::sleep(Duration::from_millis(200));
        true
    });
    let pool = Pool::new(PoolConfig { workers: 1 });
    pool.start(handler).unwrap();
    pool.submit(Task::new(1, ())).unwrap();

    // Let the worker pick the task up, then stop while it is mid-handler.
    thread::sleep(Duration::from_millis(50));
    pool.shutdown();

    // Workers are joined before the sink, so the final result was both
    // completed and recorded.
    assert_eq!(pool.snapshot()[&1].status(), TaskStatus::Done);
}
