//! Tests for the TCP transport against loopback listeners.

use std::{
    io::{BufRead, BufReader},
    net::{SocketAddr, TcpListener},
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use native_tls::{Identity, TlsAcceptor};

use super::{
    Batch, BatchWriter, Entry, LogBuffer, LogTransport, TcpEndpoint, TcpTransport, TlsOptions,
    TransportError, serialise_entry,
};

const SELF_SIGNED_CERT: &[u8] = include_bytes!("testdata/self_signed_cert.pem");
const SELF_SIGNED_KEY: &[u8] = include_bytes!("testdata/self_signed_key.pem");

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

/// Accept connections forever, reporting `(connection index, line)` pairs.
fn spawn_line_server(listener: TcpListener) -> (SocketAddr, mpsc::Receiver<(usize, String)>) {
    let addr = listener.local_addr().expect("listener has address");
    let (notify_tx, notify_rx) = mpsc::channel();
    thread::spawn(move || {
        for (index, stream) in listener.incoming().enumerate() {
            let Ok(stream) = stream else { break };
            let notify_tx = notify_tx.clone();
            thread::spawn(move || {
                for line in BufReader::new(stream).lines() {
                    let Ok(line) = line else { break };
                    if notify_tx.send((index, line)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    (addr, notify_rx)
}

fn plain_transport(addr: SocketAddr) -> TcpTransport {
    TcpTransport::new(
        TcpEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            tls: None,
        },
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
}

fn batch_of(messages: &[&str]) -> Batch {
    let buffer = LogBuffer::new();
    for message in messages {
        buffer.add(Entry::default().with_field("msg", *message));
    }
    buffer.drain()
}

fn recv_line(rx: &mpsc::Receiver<(usize, String)>) -> (usize, Value) {
    let (index, line) = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("line received");
    (index, serde_json::from_str(&line).expect("line is json"))
}

#[rstest]
fn sends_entries_as_json_lines_in_tag_order(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_line_server(tcp_listener);
    let transport = plain_transport(addr);

    let failures = transport.send_batch(&batch_of(&["one", "two", "three"]), &serialise_entry);

    assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    for expected in ["one", "two", "three"] {
        let (index, value) = recv_line(&rx);
        assert_eq!(index, 0);
        assert_eq!(value, json!({ "msg": expected }));
    }
}

#[rstest]
fn reuses_connection_across_batches(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_line_server(tcp_listener);
    let transport = plain_transport(addr);

    transport.send_batch(&batch_of(&["first"]), &serialise_entry);
    transport.send_batch(&batch_of(&["second"]), &serialise_entry);

    assert_eq!(recv_line(&rx).0, 0);
    assert_eq!(recv_line(&rx).0, 0);
}

#[rstest]
fn connection_failure_fails_every_entry(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    drop(tcp_listener);
    let transport = plain_transport(addr);
    let batch = batch_of(&["a", "b", "c"]);

    let failures = transport.send_batch(&batch, &serialise_entry);

    assert_eq!(failures.keys().copied().collect::<Vec<_>>(), batch.tags());
    assert!(
        failures
            .values()
            .all(|err| matches!(err, TransportError::Connect { .. }))
    );
}

#[rstest]
fn serialiser_failure_only_fails_that_entry(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_line_server(tcp_listener);
    let transport = plain_transport(addr);
    let batch = batch_of(&["good", "bad", "good"]);
    let serialise = |entry: &Entry| {
        if entry.get("msg") == Some(&json!("bad")) {
            Err(TransportError::Serialise("refused".into()))
        } else {
            serialise_entry(entry)
        }
    };

    let failures = transport.send_batch(&batch, &serialise);

    assert_eq!(failures.len(), 1);
    assert!(failures.contains_key(&batch.tags()[1]));
    assert_eq!(recv_line(&rx).1, json!({ "msg": "good" }));
    assert_eq!(recv_line(&rx).1, json!({ "msg": "good" }));
}

#[rstest]
fn cancel_forces_a_fresh_connection(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_line_server(tcp_listener);
    let transport = plain_transport(addr);

    transport.send_batch(&batch_of(&["before"]), &serialise_entry);
    assert_eq!(recv_line(&rx).0, 0);
    transport.cancel();
    let failures = transport.send_batch(&batch_of(&["after"]), &serialise_entry);

    assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    let (index, value) = recv_line(&rx);
    assert_eq!(index, 1);
    assert_eq!(value, json!({ "msg": "after" }));
}

#[rstest]
fn cancel_aborts_blocked_write_without_reporting_it(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    thread::spawn(move || {
        // Accept but never read so the writer blocks once buffers fill.
        let (stream, _) = tcp_listener.accept().expect("accept connection");
        thread::sleep(Duration::from_secs(5));
        drop(stream);
    });
    let transport = Arc::new(TcpTransport::new(
        TcpEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            tls: None,
        },
        Duration::from_secs(1),
        Duration::from_secs(10),
    ));
    let huge = "x".repeat(32 << 20);
    let buffer = LogBuffer::new();
    buffer.add(Entry::default().with_field("msg", huge));
    let batch = buffer.drain();

    let canceller = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            transport.cancel();
        })
    };
    let start = Instant::now();
    let failures = transport.send_batch(&batch, &serialise_entry);
    canceller.join().expect("canceller thread");

    assert!(failures.is_empty(), "aborted write must not be reported");
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "cancel should abort the write, elapsed {:?}",
        start.elapsed()
    );
}

#[rstest]
fn tls_handshake_respects_timeout(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    let (accepted_tx, accepted_rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = tcp_listener.accept().expect("accept connection");
        accepted_tx.send(()).expect("signal accepted");
        // Keep the TCP connection open without speaking TLS.
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let (result_tx, result_rx) = mpsc::channel();
    thread::spawn(move || {
        let transport = TcpTransport::new(
            TcpEndpoint {
                host: addr.ip().to_string(),
                port: addr.port(),
                tls: Some(TlsOptions {
                    domain: "localhost".into(),
                }),
            },
            Duration::from_millis(250),
            Duration::from_millis(250),
        );
        let start = Instant::now();
        let failures = transport.send_batch(&batch_of(&["secret"]), &serialise_entry);
        result_tx
            .send((failures, start.elapsed()))
            .expect("handshake result should send");
    });

    accepted_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("connection must be accepted");
    let (failures, elapsed) = result_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("handshake result should arrive");
    assert_eq!(failures.len(), 1);
    assert!(
        failures
            .values()
            .all(|err| matches!(err, TransportError::Tls { .. }))
    );
    assert!(
        elapsed < Duration::from_secs(2),
        "handshake should respect timeout, elapsed {:?}",
        elapsed
    );
}

/// Serve TLS with a certificate no trust store knows about.
fn spawn_untrusted_tls_server(listener: TcpListener) -> mpsc::Receiver<()> {
    let identity =
        Identity::from_pkcs8(SELF_SIGNED_CERT, SELF_SIGNED_KEY).expect("load test identity");
    let acceptor = TlsAcceptor::new(identity).expect("build acceptor");
    let (attempt_tx, attempt_rx) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            // The client aborts the handshake, so acceptance always fails.
            let _ = acceptor.accept(stream);
            if attempt_tx.send(()).is_err() {
                break;
            }
        }
    });
    attempt_rx
}

#[rstest]
fn untrusted_certificate_fails_every_entry_and_keeps_them_buffered(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    let attempts = spawn_untrusted_tls_server(tcp_listener);
    let transport = Arc::new(TcpTransport::new(
        TcpEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            tls: Some(TlsOptions {
                domain: "localhost".into(),
            }),
        },
        Duration::from_secs(2),
        Duration::from_secs(2),
    ));
    let buffer = Arc::new(LogBuffer::new());
    for message in ["a", "b", "c"] {
        buffer.add(Entry::default().with_field("msg", message));
    }
    let writer = BatchWriter::new(Arc::clone(&buffer), transport);

    let err = writer.flush().expect_err("untrusted server must be rejected");

    assert_eq!(err.failed, 3);
    assert_eq!(err.attempted, 3);
    assert!(
        matches!(err.source, TransportError::Tls { ref host, .. } if host == "localhost"),
        "unexpected error: {err:?}"
    );
    assert_eq!(buffer.len(), 3);
    attempts
        .recv_timeout(Duration::from_secs(2))
        .expect("server saw the handshake");
}
