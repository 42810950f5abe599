//! OEM 1S "message out": forward a request to another interface.
//!
//! Request data is `[target channel, netfn << 2, cmd, payload..]`. The
//! forwarded request keeps the caller's `seq_source` and `inf_source`, so
//! the receive worker wraps the eventual response back to the caller. On
//! any failure the caller is answered right away with an empty response.

use crate::error::Error;
use crate::ipmb::Ipmb;
use crate::observe;
use crate::types::{Channel, Message, cc};

const MSG_OUT_HEADER_LEN: usize = 3;

pub(crate) fn msg_out(ipmb: &Ipmb, msg: &mut Message) {
    if msg.completion_code != cc::INVALID_IANA {
        msg.completion_code = cc::SUCCESS;
    }

    if msg.completion_code == cc::SUCCESS {
        msg.completion_code = forward(ipmb, msg);
    }

    if msg.completion_code != cc::SUCCESS {
        msg.data.clear();
        let result = ipmb
            .bus_index(msg.inf_source)
            .ok_or(Error::Unsupported("no bus serves the bridge source"))
            .and_then(|index| ipmb.send_response(msg, index));
        if let Err(err) = result {
            observe::response_failed(msg.inf_source, "msg_out", &err);
        }
    }
}

fn forward(ipmb: &Ipmb, msg: &Message) -> u8 {
    if msg.data.len() < MSG_OUT_HEADER_LEN {
        return cc::INVALID_LENGTH;
    }

    let target = Channel(msg.data[0]);
    let Some(index) = ipmb.bus_index(target) else {
        #[cfg(feature = "tracing")]
        tracing::warn!(%target, "OEM_MSG_OUT: invalid bridge interface");
        return cc::NOT_SUPP_IN_CURR_STATE;
    };

    let mut bridged = Message {
        netfn: msg.data[1] >> 2,
        cmd: msg.data[2],
        seq_source: msg.seq_source,
        inf_source: msg.inf_source,
        inf_target: target,
        ..Default::default()
    };
    if bridged.set_data(&msg.data[MSG_OUT_HEADER_LEN..]).is_err() {
        return cc::INVALID_LENGTH;
    }

    match ipmb.send_request(&bridged, index) {
        Ok(()) => cc::SUCCESS,
        Err(err) => {
            observe::bridge_failed(target, &err);
            cc::BRIDGE_MSG_ERR
        }
    }
}
