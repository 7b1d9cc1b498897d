//! Loopback collector that reports each received line.

#![allow(dead_code)]

use std::{
    io::{BufRead, BufReader},
    net::{SocketAddr, TcpListener},
    sync::mpsc,
    thread,
    time::Duration,
};

use serde_json::Value;

pub struct LineServer {
    pub addr: SocketAddr,
    lines: mpsc::Receiver<String>,
}

impl LineServer {
    /// Bind an ephemeral port and read newline-delimited JSON from every
    /// connection accepted on it.
    pub fn start() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
        let addr = listener.local_addr().expect("listener has address");
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let tx = tx.clone();
                thread::spawn(move || {
                    for line in BufReader::new(stream).lines() {
                        let Ok(line) = line else { break };
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Self { addr, lines }
    }

    /// Next decoded line, or `None` if nothing arrives within `timeout`.
    pub fn next_json(&self, timeout: Duration) -> Option<Value> {
        let line = self.lines.recv_timeout(timeout).ok()?;
        Some(serde_json::from_str(&line).expect("collector received valid json"))
    }
}
