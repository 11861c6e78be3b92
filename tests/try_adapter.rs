use skein::{Failure, Runtime, Status, Task, new_try, new_try_with, sleep};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn ok_results_pass_through_unwrapped() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let task = Task::spawn(async {
            let mut check = new_try();
            let value: i32 = check.check(Ok(42)).await;
            value
        });

        assert_eq!(task.await, Ok(42));
    });
}

#[test]
fn failure_runs_cleanup_once_and_terminates_the_task() {
    let mut rt = Runtime::new();
    let cleanups = Arc::new(AtomicUsize::new(0));
    let reached_after = Arc::new(AtomicBool::new(false));

    let cleanups_task = cleanups.clone();
    let reached_task = reached_after.clone();

    rt.block_on(async move {
        let task = Task::spawn(async move {
            let mut check = new_try_with(move || {
                cleanups_task.fetch_add(1, Ordering::SeqCst);
            });

            let fine: Status<u8> = Ok(1);
            check.check(fine).await;

            let broken: Status<u8> = Err(Failure::Error);
            check.check(broken).await;

            // Termination point: nothing below may run.
            reached_task.store(true, Ordering::SeqCst);
        });

        assert_eq!(task.await, Err(Failure::Error));
    });

    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert!(!reached_after.load(Ordering::SeqCst));
}

#[test]
fn termination_reason_is_the_failed_value() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let task = Task::spawn(async {
            let mut check = new_try();
            let broken: Status<()> = Err(Failure::Timeout);
            check.check(broken).await;
        });

        let reason = task.await.unwrap_err();
        assert_eq!(reason, Failure::Timeout);
        assert_eq!(reason.to_string(), "TIMEOUT");
    });
}

#[test]
fn sibling_tasks_survive_a_termination() {
    let mut rt = Runtime::new();
    let sibling_done = Arc::new(AtomicBool::new(false));
    let sibling_flag = sibling_done.clone();

    rt.block_on(async move {
        let doomed = Task::spawn(async {
            let mut check = new_try();
            let broken: Status<()> = Err(Failure::Eof);
            check.check(broken).await;
        });

        let sibling = Task::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            sibling_flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(doomed.await, Err(Failure::Eof));
        sibling.await.expect("sibling completes");
    });

    assert!(sibling_done.load(Ordering::SeqCst));
}
