//! Unit tests for JSON-line framing.

use std::collections::VecDeque;
use std::os::unix::net::UnixStream;

use rstest::rstest;
use serde_json::json;

use super::*;
use crate::channel::{MockChannel, SocketChannel};

/// Builds a mock channel that hands out `chunks` in order, then nothing.
fn scripted(chunks: &[&[u8]]) -> MockChannel {
    let mut pending: VecDeque<Vec<u8>> = chunks.iter().map(|chunk| chunk.to_vec()).collect();
    let mut channel = MockChannel::new();
    channel
        .expect_read()
        .returning(move || Ok(pending.pop_front().unwrap_or_default()));
    channel
}

#[test]
fn partial_deliveries_yield_one_message_per_read() {
    let mut faucet = ChannelFaucet::new(scripted(&[b"{\"a\"", b":1}\n{\"b\":2}\n"]));

    assert_eq!(faucet.read().expect("first read"), None);
    let first = faucet.read().expect("second read").expect("message a");
    assert_eq!(first.get("a"), Some(&json!(1)));
    let second = faucet.read().expect("third read").expect("message b");
    assert_eq!(second.get("b"), Some(&json!(2)));
    assert_eq!(faucet.read().expect("idle read"), None);
    assert_eq!(faucet.buffered(), 0);
}

#[test]
fn blank_lines_are_skipped() {
    let mut faucet = ChannelFaucet::new(scripted(&[b"\n  \r\n{\"x\":true}\r\n\n"]));
    let message = faucet.read().expect("read").expect("message");
    assert_eq!(message.get("x"), Some(&json!(true)));
    assert_eq!(faucet.read().expect("idle read"), None);
}

#[rstest]
#[case::not_json(b"not json\n{\"ok\":1}\n".as_slice())]
#[case::array(b"[1,2]\n{\"ok\":1}\n".as_slice())]
#[case::string(b"\"text\"\n{\"ok\":1}\n".as_slice())]
fn malformed_line_is_isolated(#[case] input: &[u8]) {
    let mut faucet = ChannelFaucet::new(scripted(&[input]));
    let error = faucet.read().expect_err("malformed line");
    assert!(error.is_malformed(), "expected malformed: {error}");
    let message = faucet.read().expect("next read").expect("following message");
    assert_eq!(message.get("ok"), Some(&json!(1)));
}

#[test]
fn oversized_fragment_is_discarded() {
    let fragment = vec![b'x'; MAX_UNTERMINATED_LINE + 1];
    let mut faucet = ChannelFaucet::new(scripted(&[&fragment, b"{\"after\":1}\n"]));
    let error = faucet.read().expect_err("oversized fragment");
    assert!(error.is_malformed(), "expected malformed: {error}");
    assert_eq!(faucet.buffered(), 0);
    let message = faucet.read().expect("read").expect("message");
    assert_eq!(message.get("after"), Some(&json!(1)));
}

#[test]
fn closure_propagates_from_the_channel() {
    let mut channel = MockChannel::new();
    channel
        .expect_read()
        .returning(|| Err(EndpointError::closed("end of stream")));
    let mut faucet = ChannelFaucet::new(channel);
    assert!(faucet.read().expect_err("closed").is_closed());
}

#[test]
fn buffered_lines_are_served_before_closure() {
    let mut reads = 0;
    let mut channel = MockChannel::new();
    channel.expect_read().returning(move || {
        reads += 1;
        if reads == 1 {
            Ok(b"{\"n\":1}\n{\"n\":2}\n".to_vec())
        } else {
            Err(EndpointError::closed("end of stream"))
        }
    });
    let mut faucet = ChannelFaucet::new(channel);
    assert!(faucet.read().expect("first").is_some());
    assert!(faucet.read().expect("second").is_some());
    assert!(faucet.read().expect_err("closed").is_closed());
}

#[test]
fn sink_performs_a_single_terminated_write() {
    let mut channel = MockChannel::new();
    channel
        .expect_write()
        .times(1)
        .withf(|bytes: &[u8]| {
            bytes.ends_with(b"\n") && bytes.iter().filter(|byte| **byte == b'\n').count() == 1
        })
        .returning(|_| Ok(()));
    let mut sink = ChannelSink::new(channel);
    let message = Message::new().with_field("text", "two\nlines");
    sink.write(&message).expect("write");
}

#[test]
fn close_delegates_to_the_channel() {
    let mut channel = MockChannel::new();
    channel.expect_close().times(1).return_const(());
    let mut sink = ChannelSink::new(channel);
    sink.close();
}

#[test]
fn sink_output_is_readable_by_a_faucet() {
    let (left, right) = UnixStream::pair().expect("socket pair");
    let mut sink = ChannelSink::new(SocketChannel::new(left).expect("sink channel"));
    let mut faucet = ChannelFaucet::new(SocketChannel::new(right).expect("faucet channel"));
    let message = Message::new()
        .with_origin([("media", "telegram"), ("user", "42")])
        .with_destination("brain")
        .with_field("payload", json!({"nested": ["a", 1, null], "text": "x\ny"}));

    sink.write(&message).expect("write");
    let received = faucet.read().expect("read").expect("message");
    assert_eq!(received, message);
}
