//! Transmit worker.
//!
//! Requests are staged in the ledger before they hit the wire so a fast
//! responder can never beat the registration. A staged entry only pushes
//! out the oldest request once its own write has succeeded; a failed write
//! withdraws it and leaves the ledger as it was.

use crate::debug;
use crate::engine::{Envelope, IDLE_WAIT};
use crate::error::Result;
use crate::ipmb::{BusContext, Ipmb};
use crate::observe;
use crate::protocol;
use crate::types::{Channel, Message, cc, cmd, netfn};

pub(crate) fn run(ipmb: &Ipmb, index: usize) {
    let Ok(bus) = ipmb.bus(index) else {
        return;
    };
    let stop = &ipmb.inner.stop;

    while !stop.is_set() {
        let Some(envelope) = bus.tx_queue.get_timeout(IDLE_WAIT) else {
            continue;
        };
        process(ipmb, bus, envelope);
        if stop.sleep(ipmb.timing().tx_pace) {
            break;
        }
    }
}

fn process(ipmb: &Ipmb, bus: &BusContext, mut envelope: Envelope) {
    let index = bus.index();
    let max_retries = ipmb.timing().max_retries;

    if envelope.msg.is_response() {
        if envelope.retries > max_retries {
            observe::frame_dropped(index, "response retry limit");
            return;
        }

        envelope.msg.dest_addr = bus.config.target_addr;
        match transmit(bus, &envelope.msg) {
            Ok(()) => observe::frame_sent(index, &envelope.msg),
            Err(err) => {
                envelope.retries += 1;
                observe::tx_retry(index, &envelope.msg, envelope.retries, &err);
                requeue(ipmb, bus, envelope);
            }
        }
        return;
    }

    envelope.msg.seq_target = envelope.msg.seq;
    let staged = match bus.ledger.stage(&envelope.msg, ipmb.inner.clock.now_ms()) {
        Ok(()) => true,
        Err(err) => {
            // Sent untracked; a response will find no match.
            observe::ledger_unavailable(index, "stage", &envelope.msg, &err);
            false
        }
    };

    let err = match transmit(bus, &envelope.msg) {
        Ok(()) => {
            if staged {
                if let Err(err) = bus.ledger.commit() {
                    observe::ledger_unavailable(index, "commit", &envelope.msg, &err);
                }
            }
            observe::frame_sent(index, &envelope.msg);
            return;
        }
        Err(err) => err,
    };

    if staged {
        if let Err(err) = bus.ledger.remove_request(&envelope.msg) {
            observe::ledger_unavailable(index, "withdraw", &envelope.msg, &err);
        }
    }
    envelope.retries += 1;
    observe::tx_retry(index, &envelope.msg, envelope.retries, &err);

    if envelope.retries > max_retries {
        observe::request_failed(index, &envelope.msg);
        report_failure(ipmb, &envelope.msg);
    } else {
        requeue(ipmb, bus, envelope);
    }
}

fn transmit(bus: &BusContext, msg: &Message) -> Result<()> {
    let frame = protocol::encode(msg)?;
    debug::dump_frame(bus.index(), "tx", &frame);
    bus.link.write(msg.dest_addr, protocol::wire_payload(&frame))
}

fn requeue(ipmb: &Ipmb, bus: &BusContext, envelope: Envelope) {
    if bus.tx_queue.try_put(envelope).is_err() {
        observe::frame_dropped(bus.index(), "tx queue full on retry");
    }
    ipmb.inner.stop.sleep(ipmb.timing().retry_delay);
}

/// Tell the originator of a request that it could not be delivered.
fn report_failure(ipmb: &Ipmb, msg: &Message) {
    match msg.inf_source {
        Channel::RESERVED => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                netfn = msg.netfn,
                cmd = msg.cmd,
                "undeliverable request from reserved interface"
            );
        }
        Channel::SELF => {
            // The blocked reader times out on its own.
            #[cfg(feature = "tracing")]
            tracing::warn!(
                netfn = msg.netfn,
                cmd = msg.cmd,
                "undeliverable self-originated request"
            );
        }
        Channel::HOST_KCS => {
            let Some(kcs) = ipmb.kcs() else {
                #[cfg(feature = "tracing")]
                tracing::warn!("no KCS sink for undeliverable host request");
                return;
            };
            let buf = [(msg.netfn | 0x01) << 2, msg.cmd, cc::CAN_NOT_RESPOND];
            if let Err(err) = kcs.write(&buf) {
                observe::response_failed(Channel::HOST_KCS, "kcs", &err);
            }
        }
        source => {
            let Some(target) = ipmb.bus_index(source) else {
                #[cfg(feature = "tracing")]
                tracing::warn!(%source, "no bus for undeliverable request source");
                return;
            };
            let busy = Message {
                netfn: netfn::OEM_1S_REQ,
                cmd: cmd::OEM_1S_MSG_OUT,
                completion_code: cc::NODE_BUSY,
                seq: msg.seq_source,
                ..Default::default()
            };
            // Never wait here: the target may be this worker's own queue.
            if let Err(err) = ipmb.enqueue_response(&busy, target, false) {
                observe::response_failed(source, "node_busy", &err);
            }
        }
    }
}
