// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared helpers for session integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use bridge_scene_port::IdWidth;
use bridge_session_client::{ConnectOptions, Connection, SyncEngine, Transport};
use bridge_session_proto::wire::{decode_client_payload, split_frame, DEFAULT_MAX_PAYLOAD};
use bridge_session_proto::{ClientKind, FromClient};

#[derive(Default)]
struct Shared {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    closed: bool,
}

/// In-memory stream: scripted inbound bytes, captured outbound bytes.
///
/// Reads past the script report a timeout, or EOF once `close_inbound` was
/// called. Clones share state, so a test keeps one while the engine owns
/// the other.
#[derive(Clone, Default)]
pub struct ScriptedStream {
    shared: Rc<RefCell<Shared>>,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.shared.borrow_mut().inbound.extend(bytes);
    }

    pub fn close_inbound(&self) {
        self.shared.borrow_mut().closed = true;
    }

    /// Decode and drain everything written so far.
    pub fn take_sent(&self, width: IdWidth) -> Vec<FromClient> {
        let bytes = std::mem::take(&mut self.shared.borrow_mut().outbound);
        let mut out = Vec::new();
        let mut rest = bytes.as_slice();
        while let Some((header, payload, used)) = split_frame(rest, DEFAULT_MAX_PAYLOAD).unwrap() {
            out.push(decode_client_payload(header.kind, payload, width).unwrap());
            rest = &rest[used..];
        }
        assert!(rest.is_empty(), "partial frame left in outbound buffer");
        out
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.borrow_mut();
        if shared.inbound.is_empty() {
            if shared.closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(shared.inbound.len());
        for (dst, src) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shared.borrow_mut().outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedStream {
    fn set_receive_timeout(&mut self, _: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Engine over a scripted stream, with the initial Reset already drained.
pub fn engine(width: IdWidth) -> (SyncEngine<ScriptedStream>, ScriptedStream) {
    let stream = ScriptedStream::new();
    let opts = ConnectOptions {
        id_width: width,
        ..ConnectOptions::default()
    };
    let engine = SyncEngine::start(Connection::from_stream(stream.clone(), &opts)).unwrap();
    assert_eq!(stream.take_sent(width), vec![FromClient::Reset]);
    (engine, stream)
}

/// Message kinds, in order.
pub fn kinds(msgs: &[FromClient]) -> Vec<ClientKind> {
    msgs.iter().map(FromClient::kind).collect()
}
