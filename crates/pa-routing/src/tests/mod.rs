//! Crate-level test doubles, integration and BDD tests.

use std::collections::VecDeque;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::channel::SocketChannel;
use crate::endpoint::{Faucet, FaucetHandle, Sink, SinkHandle};
use crate::error::EndpointError;
use crate::framing::{ChannelFaucet, ChannelSink};
use crate::message::Message;
use crate::router::Router;
use crate::rule::Rule;


/// Faucet replaying queued messages and errors.
#[derive(Clone, Default)]
pub(crate) struct QueueFaucet {
    pending: Arc<Mutex<VecDeque<Result<Message, EndpointError>>>>,
    closed: Arc<AtomicBool>,
}

impl QueueFaucet {
    pub(crate) fn push(&self, message: Message) {
        self.pending.lock().expect("queue lock").push_back(Ok(message));
    }

    pub(crate) fn push_error(&self, error: EndpointError) {
        self.pending.lock().expect("queue lock").push_back(Err(error));
    }

    pub(crate) fn handle(&self) -> FaucetHandle {
        FaucetHandle::new(self.clone())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Faucet for QueueFaucet {
    fn read(&mut self) -> Result<Option<Message>, EndpointError> {
        self.pending
            .lock()
            .expect("queue lock")
            .pop_front()
            .transpose()
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Sink recording every message it accepts.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    received: Arc<Mutex<Vec<Message>>>,
    rejecting: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    pub(crate) fn handle(&self) -> SinkHandle {
        SinkHandle::new(self.clone())
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.received.lock().expect("sink lock").clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.received.lock().expect("sink lock").len()
    }

    /// Makes every later write fail as if the peer had gone away.
    pub(crate) fn hang_up(&self) {
        self.rejecting.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Sink for RecordingSink {
    fn write(&mut self, message: &Message) -> Result<(), EndpointError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(EndpointError::closed("peer hung up"));
        }
        self.received
            .lock()
            .expect("sink lock")
            .push(message.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn telegram(user: &str, text: &str) -> Message {
    Message::new()
        .with_origin([("media", "telegram"), ("user", user)])
        .with_field("text", text)
}

#[test]
fn messages_cross_a_socket_through_the_router() {
    let (router_side, app_side) = UnixStream::pair().expect("socket pair");
    let reader = SocketChannel::new(router_side).expect("reader");
    let writer = reader.try_clone().expect("writer");
    let (peer_side, peer_app) = UnixStream::pair().expect("second pair");

    let default = RecordingSink::default();
    let mut router = Router::new(default.handle());
    router.add_faucet("tg", FaucetHandle::new(ChannelFaucet::new(reader)));
    router.add_sink("tg", SinkHandle::new(ChannelSink::new(writer)));
    router.add_sink(
        "brain",
        SinkHandle::new(ChannelSink::new(
            SocketChannel::new(peer_side).expect("brain channel"),
        )),
    );
    router.add_rule(Rule::catch_all("brain").expect("rule"), "tg");

    let app = SinkHandle::new(ChannelSink::new(
        SocketChannel::new(app_side).expect("app channel"),
    ));
    app.write(&telegram("7", "hello")).expect("app write");
    app.write(&telegram("7", "again")).expect("second write");

    let report = router.tick().expect("tick");
    assert_eq!(report.delivered, 2);
    assert_eq!(default.count(), 0);

    let mut brain = ChannelFaucet::new(SocketChannel::new(peer_app).expect("brain reader"));
    let first = brain.read().expect("read").expect("first message");
    assert_eq!(first, telegram("7", "hello"));
    let second = brain.read().expect("read").expect("second message");
    assert_eq!(second, telegram("7", "again"));
}
