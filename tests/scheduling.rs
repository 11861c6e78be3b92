use skein::{Failure, Runtime, RuntimeBuilder, Socket, Task, sleep, yield_now};

use std::io::{Read, Write};
use std::net::TcpListener as StdTcpListener;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

#[test]
fn a_slow_task_does_not_stall_its_siblings() {
    let mut rt = Runtime::new();
    let quick_elapsed = Arc::new(StdMutex::new(None));
    let quick_elapsed_main = quick_elapsed.clone();

    rt.block_on(async move {
        let silent = StdTcpListener::bind("127.0.0.1:0").expect("bind silent");
        let silent_port = silent.local_addr().expect("local addr").port();

        let echo = StdTcpListener::bind("127.0.0.1:0").expect("bind echo");
        let echo_port = echo.local_addr().expect("local addr").port();

        let silent_server = std::thread::spawn(move || {
            let (peer, _) = silent.accept().expect("accept");
            std::thread::sleep(Duration::from_millis(700));
            drop(peer);
        });

        let echo_server = std::thread::spawn(move || {
            let (mut peer, _) = echo.accept().expect("accept");
            for _ in 0..3 {
                let mut buf = [0u8; 1];
                peer.read_exact(&mut buf).expect("read");
                peer.write_all(&buf).expect("write");
            }
        });

        // Slow task: blocked in a 400 ms receive the whole time.
        let slow = Task::spawn(async move {
            let mut sock = Socket::new();
            sock.connect("127.0.0.1", silent_port, "tcp")
                .await
                .expect("connect");
            sock.set_timeout(400);
            let err = sock.receive().await.unwrap_err();
            assert_eq!(err, Failure::Timeout);
            sock.close().expect("close");
        });

        // Quick task: three round trips that must interleave freely.
        let started = Instant::now();
        let quick_flag = quick_elapsed.clone();
        let quick = Task::spawn(async move {
            let mut sock = Socket::new();
            sock.set_timeout(5_000);
            sock.connect("127.0.0.1", echo_port, "tcp")
                .await
                .expect("connect");

            for byte in [b'x', b'y', b'z'] {
                sock.send(&[byte]).await.expect("send");
                let reply = sock.receive_bytes(1).await.expect("receive");
                assert_eq!(reply, [byte]);
            }

            sock.close().expect("close");
            *quick_flag.lock().unwrap() = Some(started.elapsed());
        });

        quick.await.expect("quick completes");
        slow.await.expect("slow completes");

        silent_server.join().unwrap();
        echo_server.join().unwrap();
    });

    // The quick task finished while the slow one was still parked.
    let elapsed = quick_elapsed_main.lock().unwrap().expect("quick ran");
    assert!(elapsed < Duration::from_millis(300), "stalled: {elapsed:?}");
}

#[test]
fn timeouts_are_clamped_to_the_floor() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (peer, _) = listener.accept().expect("accept");
            std::thread::sleep(Duration::from_millis(300));
            drop(peer);
        });

        let mut sock = Socket::new();
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        // Requested 1 ms; the floor turns it into 10 ms, and expiry must
        // not land early.
        sock.set_timeout(1);
        let started = Instant::now();
        let err = sock.receive().await.unwrap_err();

        assert_eq!(err, Failure::Timeout);
        assert!(started.elapsed() >= Duration::from_millis(10));

        sock.close().expect("close");
        server.join().unwrap();
    });
}

#[test]
fn builder_timeout_seeds_new_sockets() {
    let mut rt = RuntimeBuilder::new().default_timeout_ms(120).build();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (peer, _) = listener.accept().expect("accept");
            std::thread::sleep(Duration::from_millis(600));
            drop(peer);
        });

        // No per-socket set_timeout: the builder default applies.
        let mut sock = Socket::new();
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        let started = Instant::now();
        let err = sock.receive().await.unwrap_err();
        assert_eq!(err, Failure::Timeout);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(120));
        assert!(elapsed < Duration::from_millis(600));

        sock.close().expect("close");
        server.join().unwrap();
    });
}

#[test]
fn killed_tasks_stop_at_their_suspension_point() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let task = Task::spawn(async {
            sleep(Duration::from_millis(60_000)).await;
        });

        sleep(Duration::from_millis(30)).await;

        let started = Instant::now();
        task.kill();
        assert_eq!(task.await, Err(Failure::Killed));
        assert!(started.elapsed() < Duration::from_millis(5_000));
    });
}

#[test]
fn yield_now_lets_peers_run() {
    let mut rt = Runtime::new();
    let log = Arc::new(StdMutex::new(Vec::new()));
    let log_main = log.clone();

    rt.block_on(async move {
        let log_a = log.clone();
        let a = Task::spawn(async move {
            log_a.lock().unwrap().push("a1");
            yield_now().await;
            log_a.lock().unwrap().push("a2");
        });

        let log_b = log.clone();
        let b = Task::spawn(async move {
            log_b.lock().unwrap().push("b1");
        });

        a.await.expect("a completes");
        b.await.expect("b completes");
    });

    assert_eq!(*log_main.lock().unwrap(), vec!["a1", "b1", "a2"]);
}
