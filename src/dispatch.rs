//! IPMI request dispatcher.
//!
//! Consumes the request queue fed by the receive workers, runs each request
//! through a [`Handler`] and routes the response back to the interface the
//! request came from.

use std::thread::{self, JoinHandle};

use crate::bridge;
use crate::engine::IDLE_WAIT;
use crate::error::{Error, Result};
use crate::ipmb::Ipmb;
use crate::observe;
use crate::types::{Channel, IANA_BYTES, Message, Payload, cc, cmd, netfn};

/// Executes IPMI commands on behalf of the dispatcher.
///
/// The handler sees OEM 1S requests with the IANA prefix already stripped.
/// It must set `completion_code` (the dispatcher presets
/// [`cc::INVALID_CMD`]) and replace `data` with the response payload.
pub trait Handler: Send + Sync {
    /// Execute `msg` in place.
    fn handle(&self, msg: &mut Message);
}

impl<F> Handler for F
where
    F: Fn(&mut Message) + Send + Sync,
{
    fn handle(&self, msg: &mut Message) {
        self(msg)
    }
}

/// Background thread serving [`Ipmb::requests`].
pub struct Dispatcher;

impl Dispatcher {
    /// Start the dispatcher thread. It exits once the [`Ipmb`] is shut down.
    pub fn spawn(ipmb: Ipmb, handler: impl Handler + 'static) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("ipmi_dispatch".to_string())
            .spawn(move || {
                let requests = ipmb.requests();
                loop {
                    match requests.recv_timeout(IDLE_WAIT) {
                        Ok(msg) => dispatch(&ipmb, &handler, msg),
                        Err(Error::Timeout) => continue,
                        Err(_) => break,
                    }
                }
            })?;
        Ok(handle)
    }
}

/// Execute one request and send its response.
pub fn dispatch(ipmb: &Ipmb, handler: &dyn Handler, mut msg: Message) {
    let platform = ipmb.platform();

    if crate::debug::enabled() {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            netfn = msg.netfn,
            cmd = msg.cmd,
            data_len = msg.data.len(),
            source = %msg.inf_source,
            "dispatching request"
        );
    }

    msg.completion_code = cc::INVALID_CMD;
    if msg.netfn == netfn::OEM_1S_REQ {
        if msg.data.starts_with(&IANA_BYTES) {
            msg.data.drain(..IANA_BYTES.len());
            handle_oem_1s(ipmb, handler, &mut msg);
        } else if platform.is_not_return_cmd(msg.netfn, msg.cmd) {
            // The command answers its source itself, so let it see the bad IANA.
            msg.completion_code = cc::INVALID_IANA;
            handle_oem_1s(ipmb, handler, &mut msg);
        } else {
            msg.completion_code = cc::INVALID_IANA;
            msg.data.clear();
        }
    } else {
        handler.handle(&mut msg);
    }

    if platform.is_not_return_cmd(msg.netfn, msg.cmd) {
        return;
    }

    if msg.completion_code != cc::SUCCESS {
        msg.data.clear();
    } else if msg.netfn == netfn::OEM_1S_REQ {
        prefix_iana(&mut msg);
    }

    respond(ipmb, &msg);
}

fn handle_oem_1s(ipmb: &Ipmb, handler: &dyn Handler, msg: &mut Message) {
    match msg.cmd {
        cmd::OEM_1S_MSG_OUT => bridge::msg_out(ipmb, msg),
        _ => handler.handle(msg),
    }
}

fn prefix_iana(msg: &mut Message) {
    let mut data = Payload::new();
    let fits = data
        .try_extend_from_slice(&IANA_BYTES)
        .and_then(|_| data.try_extend_from_slice(&msg.data));
    match fits {
        Ok(()) => msg.data = data,
        Err(_) => {
            msg.completion_code = cc::UNSPECIFIED_ERROR;
            msg.data.clear();
        }
    }
}

fn respond(ipmb: &Ipmb, msg: &Message) {
    match msg.inf_source {
        Channel::HOST_KCS => {
            let Some(kcs) = ipmb.kcs() else {
                #[cfg(feature = "tracing")]
                tracing::warn!(netfn = msg.netfn, cmd = msg.cmd, "no KCS sink for response");
                return;
            };
            let mut buf = Vec::with_capacity(msg.data.len() + 3);
            buf.extend_from_slice(&[
                msg.netfn.wrapping_add(1) << 2,
                msg.cmd,
                msg.completion_code,
            ]);
            buf.extend_from_slice(&msg.data);
            if let Err(err) = kcs.write(&buf) {
                observe::response_failed(Channel::HOST_KCS, "kcs", &err);
            }
        }
        source => {
            let result = ipmb
                .bus_index(source)
                .ok_or(Error::Unsupported("no bus serves the request source"))
                .and_then(|index| ipmb.send_response(msg, index));
            if let Err(err) = result {
                observe::response_failed(source, "ipmb", &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BusConfig, Timing};
    use crate::transport::memory::{MemoryKcs, MemoryLink};

    fn stack() -> (Ipmb, MemoryLink, MemoryKcs) {
        let (local, peer) = MemoryLink::pair(0x10, 0x20);
        let kcs = MemoryKcs::new();
        let ipmb = Ipmb::builder()
            .bus(BusConfig::new(0, Channel::BMC_IPMB, 1, 0x10, 0x20), local)
            .kcs(kcs.clone())
            .timing(Timing::fast())
            .build()
            .expect("build");
        (ipmb, peer, kcs)
    }

    fn request(netfn: u8, cmd: u8, data: &[u8], source: Channel) -> Message {
        let mut msg = Message::request(netfn, cmd, data).expect("msg");
        msg.inf_source = source;
        msg
    }

    fn echo(msg: &mut Message) {
        msg.completion_code = cc::SUCCESS;
        let data = msg.data.clone();
        msg.data.clear();
        msg.data.push(msg.cmd);
        msg.data.extend(data);
    }

    #[test]
    fn kcs_request_gets_response_netfn() {
        let (ipmb, _peer, kcs) = stack();
        dispatch(
            &ipmb,
            &echo,
            request(netfn::APP_REQ, 0x01, &[0xAA], Channel::HOST_KCS),
        );
        assert_eq!(kcs.written(), vec![vec![0x1C, 0x01, 0x00, 0x01, 0xAA]]);
        ipmb.shutdown();
    }

    #[test]
    fn unhandled_command_returns_invalid_cmd_without_data() {
        let (ipmb, _peer, kcs) = stack();
        let ignore = |_: &mut Message| {};
        dispatch(
            &ipmb,
            &ignore,
            request(netfn::CHASSIS_REQ, 0x05, &[1, 2, 3], Channel::HOST_KCS),
        );
        assert_eq!(kcs.written(), vec![vec![0x04, 0x05, cc::INVALID_CMD]]);
        ipmb.shutdown();
    }

    #[test]
    fn oem_iana_is_stripped_and_restored() {
        let (ipmb, _peer, kcs) = stack();
        let seen = std::sync::Mutex::new(Vec::new());
        let handler = |msg: &mut Message| {
            seen.lock().expect("lock").extend_from_slice(&msg.data);
            msg.completion_code = cc::SUCCESS;
            msg.data.clear();
            msg.data.push(0x55);
        };
        dispatch(
            &ipmb,
            &handler,
            request(
                netfn::OEM_1S_REQ,
                0x10,
                &[0x15, 0xA0, 0x00, 0x07],
                Channel::HOST_KCS,
            ),
        );

        assert_eq!(*seen.lock().expect("lock"), vec![0x07]);
        assert_eq!(
            kcs.written(),
            vec![vec![0xE4, 0x10, 0x00, 0x15, 0xA0, 0x00, 0x55]]
        );
        ipmb.shutdown();
    }

    #[test]
    fn wrong_iana_is_rejected() {
        let (ipmb, _peer, kcs) = stack();
        dispatch(
            &ipmb,
            &echo,
            request(netfn::OEM_1S_REQ, 0x10, &[0x01, 0x02, 0x03], Channel::HOST_KCS),
        );
        assert_eq!(kcs.written(), vec![vec![0xE4, 0x10, cc::INVALID_IANA]]);
        ipmb.shutdown();
    }

    #[test]
    fn not_return_commands_produce_no_response() {
        let (ipmb, _peer, kcs) = stack();
        dispatch(
            &ipmb,
            &echo,
            request(netfn::OEM_1S_REQ, cmd::OEM_1S_MSG_IN, &IANA_BYTES, Channel::HOST_KCS),
        );
        assert!(kcs.written().is_empty());
        ipmb.shutdown();
    }
}
