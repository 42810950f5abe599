#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use ipmb::protocol;
use ipmb::transport::Link;
use ipmb::transport::memory::MemoryLink;
use ipmb::{Message, Timing};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn timing() -> Timing {
    Timing::fast()
}

/// Poll `link` until a frame arrives.
pub fn wait_frame(link: &MemoryLink) -> Vec<u8> {
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(frame) = link.read().expect("read") {
            return frame;
        }
        assert!(Instant::now() < deadline, "no frame arrived");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Poll until `cond` holds.
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Decode a frame as delivered by a link (8-bit address in byte 0).
pub fn decode_delivered(raw: &[u8]) -> Message {
    let mut frame = raw.to_vec();
    frame[0] >>= 1;
    protocol::validate_checksum(&frame).expect("checksum");
    protocol::decode(&frame).expect("decode")
}

/// Encode `msg` and write it from `link` to 7-bit `dest`.
pub fn send_frame(link: &MemoryLink, msg: &Message) {
    let frame = protocol::encode(msg).expect("encode");
    link.write(msg.dest_addr, &frame[1..]).expect("write");
}

/// Answer the request carried by `raw` from the peer side of a link.
pub fn answer(link: &MemoryLink, raw: &[u8], completion_code: u8, data: &[u8]) {
    let req = decode_delivered(raw);
    let mut resp = Message {
        dest_addr: req.src_addr >> 1,
        netfn: req.netfn + 1,
        src_addr: link.addr() << 1,
        seq: req.seq,
        cmd: req.cmd,
        completion_code,
        ..Default::default()
    };
    resp.set_data(data).expect("data");
    send_frame(link, &resp);
}
