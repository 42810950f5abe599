//! Receive worker: validates inbound frames, correlates responses with the
//! ledger and hands requests to the dispatcher.

use crate::debug;
use crate::ipmb::{BusContext, Ipmb};
use crate::ledger::Match;
use crate::observe;
use crate::protocol;
use crate::types::{Channel, IANA_BYTES, Message, cc, cmd, netfn};

pub(crate) fn run(ipmb: &Ipmb, index: usize) {
    let Ok(bus) = ipmb.bus(index) else {
        return;
    };
    let stop = &ipmb.inner.stop;
    let poll = ipmb.timing().poll_interval;

    while !stop.is_set() {
        match bus.link.read() {
            Ok(Some(raw)) => handle_frame(ipmb, bus, &raw),
            Ok(None) => {
                if stop.sleep(poll) {
                    break;
                }
            }
            Err(err) => {
                observe::link_read_failed(index, &err);
                if stop.sleep(poll) {
                    break;
                }
            }
        }
    }
}

pub(crate) fn handle_frame(ipmb: &Ipmb, bus: &BusContext, raw: &[u8]) {
    let index = bus.index();

    let frame = match protocol::normalize_inbound(raw) {
        Ok(frame) => frame,
        Err(_) => {
            observe::frame_dropped(index, "oversize frame");
            return;
        }
    };
    debug::dump_frame(index, "rx", &frame);

    if let Err(err) = protocol::validate_checksum(&frame) {
        observe::checksum_rejected(index, &err);
        return;
    }
    let msg = match protocol::decode(&frame) {
        Ok(msg) => msg,
        Err(_) => {
            observe::frame_dropped(index, "malformed frame");
            return;
        }
    };
    observe::frame_received(index, &msg);

    if msg.is_response() {
        route_response(ipmb, bus, msg);
    } else {
        route_request(ipmb, bus, msg);
    }
}

fn route_response(ipmb: &Ipmb, bus: &BusContext, mut msg: Message) {
    let index = bus.index();

    msg.seq_target = msg.seq;
    match bus.ledger.find_and_remove(&mut msg, Match::Response) {
        Ok(true) => {}
        Ok(false) => {
            observe::unmatched_response(index, &msg);
            return;
        }
        // Lock timeouts are already reported by the ledger.
        Err(_) => return,
    }

    match msg.inf_source {
        Channel::SELF => {
            // The caller blocked in `read` waits on the bus it sent on.
            if bus.responses.try_put(msg).is_err() {
                observe::frame_dropped(index, "response queue full");
            }
        }
        Channel::HOST_KCS => {
            let Some(kcs) = ipmb.kcs() else {
                observe::frame_dropped(index, "no KCS sink");
                return;
            };
            let mut buf = Vec::with_capacity(msg.data.len() + 3);
            buf.extend_from_slice(&[msg.netfn << 2, msg.cmd, msg.completion_code]);
            buf.extend_from_slice(&msg.data);
            if kcs.write(&buf).is_err() {
                observe::frame_dropped(index, "KCS write failed");
            }
        }
        Channel::ME_IPMB => {
            let Some(me) = ipmb.bus_index(Channel::ME_IPMB) else {
                observe::frame_dropped(index, "no ME bus");
                return;
            };
            let mut reply = msg.clone();
            reply.netfn = msg.netfn.wrapping_sub(1);
            reply.seq = msg.seq_source;
            if ipmb.send_response(&reply, me).is_err() {
                observe::frame_dropped(index, "ME response not queued");
            }
        }
        source => bridge_response(ipmb, bus, source, &msg),
    }
}

/// Wrap a response to a bridged request in an OEM "message out" response
/// for the bus that asked for the bridge.
fn bridge_response(ipmb: &Ipmb, bus: &BusContext, source: Channel, msg: &Message) {
    let index = bus.index();
    let Some(target) = ipmb.bus_index(source) else {
        observe::frame_dropped(index, "no bus for bridge source");
        return;
    };

    let mut reply = Message {
        netfn: netfn::OEM_1S_REQ,
        cmd: cmd::OEM_1S_MSG_OUT,
        completion_code: cc::SUCCESS,
        seq: msg.seq_source,
        ..Default::default()
    };
    let header = [
        bus.config.channel.as_u8(),
        msg.netfn,
        msg.cmd,
        msg.completion_code,
    ];
    let built = reply
        .data
        .try_extend_from_slice(&IANA_BYTES)
        .and_then(|_| reply.data.try_extend_from_slice(&header))
        .and_then(|_| reply.data.try_extend_from_slice(&msg.data));
    if built.is_err() {
        observe::frame_dropped(index, "bridged response too long");
        return;
    }

    if ipmb.send_response(&reply, target).is_err() {
        observe::frame_dropped(index, "bridged response not queued");
    }
}

fn route_request(ipmb: &Ipmb, bus: &BusContext, mut msg: Message) {
    let index = bus.index();

    if bus.config.channel == Channel::ME_IPMB
        && !ipmb.platform().request_to_bic_from_me(msg.netfn, msg.cmd)
    {
        let mut bridged = msg.clone();
        bridged.seq_source = msg.seq;
        bridged.inf_source = Channel::ME_IPMB;
        bridged.inf_target = Channel::BMC_IPMB;

        let sent = match ipmb.bus_index(Channel::BMC_IPMB) {
            Some(bmc) => ipmb.send_request(&bridged, bmc).is_ok(),
            None => false,
        };
        if !sent {
            observe::frame_dropped(index, "ME request not bridged to BMC");
            let mut reply = msg;
            reply.completion_code = cc::TIMEOUT;
            reply.data.clear();
            if ipmb.send_response(&reply, index).is_err() {
                observe::frame_dropped(index, "ME timeout response not queued");
            }
        }
        return;
    }

    msg.seq_source = msg.seq;
    msg.inf_source = bus.config.channel;
    if ipmb.notify_client(msg).is_err() {
        observe::frame_dropped(index, "request queue closed");
    }
}
