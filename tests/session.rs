/*
 * This file is a part of a RESP3 client library.
 * Licensed under the GNU Affero General Public License, v3 or later.
*/

//! End-to-end tests that drive a real [`Session`] against a tiny scripted
//! TCP server on loopback, so the full handshake/call/pipeline/transaction/
//! scan/pub-sub paths are each exercised against real socket I/O rather than
//! an in-memory stand-in.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use resp3::{Config, Error, Session, Value};

/// Encode a command the same way the crate's own encoder would, purely so
/// the fake server knows how many bytes to wait for before replying --
/// tests don't reach into the crate's private codec.
fn encode(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for a in args {
        buf.extend_from_slice(format!("${}\r\n{a}\r\n", a.len()).as_bytes());
    }
    buf
}

/// Read exactly `expected.len()` bytes and assert they match, tolerating
/// however the kernel chooses to fragment the write on the other end.
fn expect_request(stream: &mut TcpStream, expected: &[u8]) {
    let mut got = vec![0u8; expected.len()];
    stream.read_exact(&mut got).expect("fake server: short read");
    assert_eq!(got, expected, "fake server received an unexpected request");
}

/// Spawn a one-shot fake server: accepts a single connection, then replays
/// `script` -- pairs of (expected request bytes, raw reply bytes) -- in
/// order, so the test body only has to describe the conversation.
fn fake_server(script: Vec<(Vec<u8>, Vec<u8>)>) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept fake client");
        for (expected_request, reply) in script {
            expect_request(&mut stream, &expected_request);
            stream.write_all(reply).expect("fake server: write reply");
        }
    });
    (port, handle)
}

fn client(port: u16) -> Session {
    let config = Config::new()
        .with_host("127.0.0.1")
        .with_port(port)
        .with_timeout(Duration::from_secs(2));
    Session::new(config)
}

#[test]
fn ping_round_trip() {
    let hello = encode(&["HELLO", "3"]);
    let ping = encode(&["PING"]);
    let (port, handle) = fake_server(vec![
        (hello, b"+OK\r\n".to_vec()),
        (ping, b"+PONG\r\n".to_vec()),
    ]);

    let mut session = client(port);
    let reply = session.call(["PING"]).unwrap();
    assert_eq!(reply, Value::SimpleString("PONG".into()));

    handle.join().unwrap();
}

#[test]
fn get_missing_key_is_a_distinguished_null() {
    let hello = encode(&["HELLO", "3"]);
    let get = encode(&["GET", "nope"]);
    let (port, handle) = fake_server(vec![
        (hello, b"+OK\r\n".to_vec()),
        (get, b"$-1\r\n".to_vec()),
    ]);

    let mut session = client(port);
    let reply = session.call(["GET", "nope"]).unwrap();
    assert_eq!(reply, Value::Bulk(None));

    handle.join().unwrap();
}

#[test]
fn pipeline_raises_the_first_command_error() {
    let hello = encode(&["HELLO", "3"]);
    let mut pipeline_request = encode(&["SET", "k", "1"]);
    pipeline_request.extend(encode(&["INCR", "k"]));
    pipeline_request.extend(encode(&["LPUSH", "k", "x"]));
    let pipeline_reply =
        b"+OK\r\n:2\r\n-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_vec();

    let (port, handle) = fake_server(vec![(hello, b"+OK\r\n".to_vec()), (pipeline_request, pipeline_reply)]);

    let mut session = client(port);
    let mut pipeline = session.pipeline();
    pipeline
        .add(["SET", "k", "1"])
        .add(["INCR", "k"])
        .add(["LPUSH", "k", "x"]);
    let err = session.execute_pipeline(&pipeline).unwrap_err();
    match err {
        Error::Command { code, .. } => assert_eq!(code, "WRONGTYPE"),
        other => panic!("expected a command error, got {other:?}"),
    }

    handle.join().unwrap();
}

#[test]
fn multi_exec_transaction_returns_the_exec_reply() {
    let hello = encode(&["HELLO", "3"]);
    let mut tx_request = encode(&["MULTI"]);
    tx_request.extend(encode(&["SET", "a", "1"]));
    tx_request.extend(encode(&["INCR", "a"]));
    tx_request.extend(encode(&["EXEC"]));
    let tx_reply = b"+OK\r\n+QUEUED\r\n+QUEUED\r\n*2\r\n+OK\r\n:2\r\n".to_vec();

    let (port, handle) = fake_server(vec![(hello, b"+OK\r\n".to_vec()), (tx_request, tx_reply)]);

    let mut session = client(port);
    let result = session
        .transaction(&[], |p| {
            p.add(["SET", "a", "1"]).add(["INCR", "a"]);
            Ok(())
        })
        .unwrap();
    assert_eq!(
        result,
        Value::Array(Some(vec![Value::SimpleString("OK".into()), Value::Integer(2)]))
    );

    handle.join().unwrap();
}

#[test]
fn auth_failure_is_classified_as_authentication() {
    let hello = encode(&["HELLO", "3", "AUTH", "default", "wrong"]);
    let (port, handle) = fake_server(vec![(hello, b"-WRONGPASS invalid username-password pair\r\n".to_vec())]);

    let config = Config::new()
        .with_host("127.0.0.1")
        .with_port(port)
        .with_password("wrong")
        .with_timeout(Duration::from_secs(2));
    let mut session = Session::new(config);
    let err = session.call(["PING"]).unwrap_err();
    assert!(err.is_authentication(), "expected an authentication error, got {err:?}");

    handle.join().unwrap();
}

#[test]
fn scan_each_drains_every_page_and_stops_on_textual_zero() {
    let hello = encode(&["HELLO", "3"]);
    let scan1 = encode(&["SCAN", "0"]);
    let scan2 = encode(&["SCAN", "17"]);
    let (port, handle) = fake_server(vec![
        (hello, b"+OK\r\n".to_vec()),
        (scan1, b"*2\r\n$2\r\n17\r\n*2\r\n$1\r\na\r\n$1\r\nb\r\n".to_vec()),
        (scan2, b"*2\r\n$1\r\n0\r\n*1\r\n$1\r\nc\r\n".to_vec()),
    ]);

    let mut session = client(port);
    let items: Vec<Value> = session.scan_each("SCAN", &[]).map(|r| r.unwrap()).collect();
    assert_eq!(
        items,
        vec![
            Value::Bulk(Some(b"a".to_vec())),
            Value::Bulk(Some(b"b".to_vec())),
            Value::Bulk(Some(b"c".to_vec())),
        ]
    );

    handle.join().unwrap();
}

#[test]
fn pubsub_handoff_then_idle_timeout_returns_none_without_closing() {
    let hello = encode(&["HELLO", "3"]);
    let subscribe = encode(&["SUBSCRIBE", "foo"]);
    let reply = [
        &b">3\r\n+subscribe\r\n+foo\r\n:1\r\n"[..],
        &b">3\r\n+message\r\n+foo\r\n+hi\r\n"[..],
    ]
    .concat();
    let (port, handle) = fake_server(vec![(hello, b"+OK\r\n".to_vec()), (subscribe, reply)]);

    let mut session = client(port);
    let mut pubsub = session.pubsub().unwrap();
    pubsub.call(["SUBSCRIBE", "foo"]).unwrap();
    let ack = pubsub.next_event(Some(Duration::from_secs(2))).unwrap().unwrap();
    match ack {
        Value::Push(parts) => assert_eq!(parts[0], Value::SimpleString("subscribe".into())),
        other => panic!("expected a push frame, got {other:?}"),
    }
    let second = pubsub.next_event(None).unwrap().unwrap();
    match second {
        Value::Push(parts) => assert_eq!(parts[0], Value::SimpleString("message".into())),
        other => panic!("expected a push frame, got {other:?}"),
    }

    handle.join().unwrap();
}
