use skein::{Delimiter, Failure, Runtime, Socket, Span};

use std::io::Write;
use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

#[test]
fn delimited_records_arrive_in_order_without_loss() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            peer.write_all(b"one\ntwo\nthree\nrest").expect("write");
            std::thread::sleep(Duration::from_millis(400));
            peer.write_all(b"!\n").expect("write tail");
        });

        let mut sock = Socket::new();
        sock.set_timeout(5_000);
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        for expected in [&b"one"[..], b"two", b"three"] {
            let record = sock
                .receive_buf(Delimiter::pattern("\n"), false)
                .await
                .expect("record");
            assert_eq!(record, expected);
        }

        // The unmatched tail stays buffered; once the peer completes the
        // line, the next call returns it whole.
        let record = sock
            .receive_buf(Delimiter::pattern("\n"), false)
            .await
            .expect("completed tail");
        assert_eq!(record, b"rest!");

        sock.close().expect("close");
        server.join().unwrap();
    });
}

#[test]
fn keep_delimiter_controls_inclusion() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            peer.write_all(b"HTTP/1.0 200 OK\r\nbody").expect("write");
        });

        let mut sock = Socket::new();
        sock.set_timeout(5_000);
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        let line = sock
            .receive_buf(Delimiter::pattern("\r\n"), true)
            .await
            .expect("status line");
        assert_eq!(line, b"HTTP/1.0 200 OK\r\n");

        sock.close().expect("close");
        server.join().unwrap();
    });
}

#[test]
fn predicate_delimiter_drives_framing() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            // Length-prefixed record: one length byte, then payload.
            peer.write_all(&[5u8]).expect("len");
            peer.write_all(b"hello").expect("payload");
        });

        let mut sock = Socket::new();
        sock.set_timeout(5_000);
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        // Match once the full length-prefixed record has accumulated; the
        // "delimiter" is the length byte itself.
        let record = sock
            .receive_buf(
                Delimiter::func(|data| {
                    let need = match data.first() {
                        Some(&len) => 1 + len as usize,
                        None => return Ok(None),
                    };
                    if data.len() >= need {
                        Ok(Some(Span { start: 0, end: 1 }))
                    } else {
                        Ok(None)
                    }
                }),
                false,
            )
            .await
            .expect("record");
        assert_eq!(record, b"");

        let payload = sock.receive_buf(Delimiter::pattern("hello"), true).await;
        assert_eq!(payload.expect("payload"), b"hello");

        sock.close().expect("close");
        server.join().unwrap();
    });
}

#[test]
fn predicate_failures_surface_as_errors() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            peer.write_all(b"payload").expect("write");
            std::thread::sleep(Duration::from_millis(200));
        });

        let mut sock = Socket::new();
        sock.set_timeout(5_000);
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        let err = sock
            .receive_buf(Delimiter::func(|_| Err(String::from("boom"))), false)
            .await
            .unwrap_err();
        assert_eq!(err, Failure::DelimiterFn(String::from("boom")));

        let err = sock
            .receive_buf(
                Delimiter::func(|_| Ok(Some(Span { start: 4, end: 2 }))),
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(err, Failure::InvertedSpan);

        let err = sock
            .receive_buf(Delimiter::pattern("(unclosed"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Failure::Pattern(_)));

        sock.close().expect("close");
        server.join().unwrap();
    });
}

#[test]
fn other_socket_calls_invalidate_the_buffer() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            peer.write_all(b"abc\nleftover").expect("write");
            std::thread::sleep(Duration::from_millis(300));
            peer.write_all(b"fresh").expect("write fresh");
        });

        let mut sock = Socket::new();
        sock.set_timeout(5_000);
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        let record = sock
            .receive_buf(Delimiter::pattern("\n"), false)
            .await
            .expect("record");
        assert_eq!(record, b"abc");

        // `receive` is not the buffered-read method, so the retained
        // "leftover" bytes are discarded, not returned.
        let data = sock.receive().await.expect("receive");
        assert_eq!(data, b"fresh");

        sock.close().expect("close");
        server.join().unwrap();
    });
}

#[test]
fn eof_with_no_match_is_a_failure() {
    let mut rt = Runtime::new();

    rt.block_on(async {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().expect("accept");
            peer.write_all(b"no newline here").expect("write");
            // Peer closes without ever completing a record.
        });

        let mut sock = Socket::new();
        sock.set_timeout(5_000);
        sock.connect("127.0.0.1", port, "tcp").await.expect("connect");

        let err = sock
            .receive_buf(Delimiter::pattern("\n"), false)
            .await
            .unwrap_err();
        assert_eq!(err, Failure::Eof);

        sock.close().expect("close");
        server.join().unwrap();
    });
}
