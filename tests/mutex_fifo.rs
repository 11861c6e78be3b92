use skein::{Failure, Runtime, Task, mutex, sleep};

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

#[test]
fn contended_locks_are_granted_in_arrival_order() {
    let mut rt = Runtime::new();
    let order = Arc::new(StdMutex::new(Vec::new()));
    let order_main = order.clone();

    rt.block_on(async move {
        let resource = Arc::new(String::from("shared state"));
        let guard = mutex(&resource);

        // D runs first and holds the lock while A, B, C queue up.
        let d = Task::spawn(async move {
            guard.lock().await;
            sleep(Duration::from_millis(50)).await;
            guard.done().expect("holder releases");
        });

        let mut waiters = Vec::new();
        for name in ["A", "B", "C"] {
            let order = order.clone();
            waiters.push(Task::spawn(async move {
                guard.lock().await;
                order.lock().unwrap().push(name);
                guard.done().expect("holder releases");
            }));
        }

        d.await.expect("D completes");
        for handle in waiters {
            handle.await.expect("waiter completes");
        }
    });

    assert_eq!(*order_main.lock().unwrap(), vec!["A", "B", "C"]);
}

#[test]
fn trylock_never_suspends() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let resource = Arc::new(42u64);
        let guard = mutex(&resource);

        assert!(guard.try_lock());

        // Held by the main task: a spawned task is refused immediately.
        let refused = Task::spawn(async move { guard.try_lock() });
        assert!(!refused.await.expect("task completes"));

        guard.done().expect("release");
        assert!(guard.try_lock());
        guard.done().expect("release");
    });
}

#[test]
fn release_by_non_holder_is_an_error() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let resource = Arc::new(7i32);
        let guard = mutex(&resource);

        assert!(guard.try_lock());

        let outsider = Task::spawn(async move { guard.done() });
        assert_eq!(
            outsider.await.expect("task completes"),
            Err(Failure::NotMutexHolder)
        );

        guard.done().expect("actual holder releases");
    });
}

#[test]
fn holder_introspection_tracks_grants() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let resource = Arc::new([0u8; 8]);
        let guard = mutex(&resource);

        assert_eq!(guard.holder(), None);

        let task = Task::spawn(async move {
            guard.lock().await;
            sleep(Duration::from_millis(50)).await;
            guard.done().expect("release");
        });

        sleep(Duration::from_millis(20)).await;
        assert_eq!(guard.holder(), Some(task.id()));

        task.await.expect("task completes");
        assert_eq!(guard.holder(), None);
    });
}

#[test]
fn killing_the_holder_frees_the_next_waiter() {
    let mut rt = Runtime::new();
    let acquired = Arc::new(StdMutex::new(false));
    let acquired_main = acquired.clone();

    rt.block_on(async move {
        let resource = Arc::new(String::from("held forever"));
        let guard = mutex(&resource);

        let holder = Task::spawn(async move {
            guard.lock().await;
            // Far beyond the test's patience; only a kill frees this.
            sleep(Duration::from_millis(60_000)).await;
            guard.done().expect("unreached");
        });

        let acquired_task = acquired.clone();
        let waiter = Task::spawn(async move {
            guard.lock().await;
            *acquired_task.lock().unwrap() = true;
            guard.done().expect("release");
        });

        sleep(Duration::from_millis(50)).await;
        assert_eq!(guard.holder(), Some(holder.id()));

        holder.kill();
        waiter.await.expect("waiter completes after kill");
        assert_eq!(holder.await, Err(Failure::Killed));
    });

    assert!(*acquired_main.lock().unwrap());
}
