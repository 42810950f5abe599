use std::time::Duration;

use crate::error::Error;
use crate::types::{Channel, Message};

pub(crate) fn read_ok(bus: usize, netfn: u8, cmd: u8, elapsed: Duration, completion_code: u8) {
    let _ = (bus, netfn, cmd, elapsed, completion_code);

    #[cfg(feature = "metrics")]
    {
        metrics::counter!("ipmb_reads_total", "outcome" => "ok").increment(1);
        metrics::histogram!("ipmb_read_seconds").record(elapsed.as_secs_f64());
        if completion_code != 0x00 {
            metrics::counter!("ipmb_completion_code_nonzero_total").increment(1);
        }
    }

    #[cfg(feature = "tracing")]
    {
        tracing::debug!(
            bus,
            netfn,
            cmd,
            completion_code,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "ipmb read ok"
        );
    }
}

pub(crate) fn read_err(bus: usize, netfn: u8, cmd: u8, elapsed: Duration, err: &Error) {
    let _ = (bus, netfn, cmd, elapsed, err);

    #[cfg(feature = "metrics")]
    {
        metrics::counter!("ipmb_reads_total", "outcome" => "err").increment(1);
        metrics::counter!("ipmb_read_errors_total", "kind" => error_kind(err)).increment(1);
        metrics::histogram!("ipmb_read_seconds").record(elapsed.as_secs_f64());
    }

    #[cfg(feature = "tracing")]
    {
        tracing::warn!(
            bus,
            netfn,
            cmd,
            error = %err,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "ipmb read failed"
        );
    }
}

pub(crate) fn frame_sent(bus: usize, msg: &Message) {
    let _ = (bus, msg);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_frames_sent_total", "kind" => kind(msg)).increment(1);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        bus,
        netfn = msg.netfn,
        cmd = msg.cmd,
        seq = msg.seq,
        "ipmb frame sent"
    );
}

pub(crate) fn frame_received(bus: usize, msg: &Message) {
    let _ = (bus, msg);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_frames_received_total", "kind" => kind(msg)).increment(1);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        bus,
        netfn = msg.netfn,
        cmd = msg.cmd,
        seq = msg.seq,
        "ipmb frame received"
    );
}

pub(crate) fn frame_dropped(bus: usize, reason: &'static str) {
    let _ = (bus, reason);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_frames_dropped_total", "reason" => reason).increment(1);

    #[cfg(feature = "tracing")]
    tracing::warn!(bus, reason, "ipmb frame dropped");
}

pub(crate) fn checksum_rejected(bus: usize, err: &Error) {
    let _ = (bus, err);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_checksum_errors_total", "kind" => error_kind(err)).increment(1);

    #[cfg(feature = "tracing")]
    tracing::debug!(bus, error = %err, "ipmb frame rejected");
}

pub(crate) fn tx_retry(bus: usize, msg: &Message, retries: u32, err: &Error) {
    let _ = (bus, msg, retries, err);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_tx_retries_total").increment(1);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        bus,
        netfn = msg.netfn,
        cmd = msg.cmd,
        retries,
        error = %err,
        "ipmb write failed, retrying"
    );
}

pub(crate) fn request_failed(bus: usize, msg: &Message) {
    let _ = (bus, msg);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_requests_failed_total").increment(1);

    #[cfg(feature = "tracing")]
    tracing::warn!(
        bus,
        netfn = msg.netfn,
        cmd = msg.cmd,
        source = %msg.inf_source,
        "ipmb request exceeded retry limit"
    );
}

pub(crate) fn ledger_evicted(bus: usize, reason: &'static str, msg: &Message) {
    let _ = (bus, reason, msg);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_ledger_evictions_total", "reason" => reason).increment(1);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        bus,
        reason,
        netfn = msg.netfn,
        cmd = msg.cmd,
        seq = msg.seq_target,
        "ipmb pending request evicted"
    );
}

pub(crate) fn unmatched_response(bus: usize, msg: &Message) {
    let _ = (bus, msg);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_unmatched_responses_total").increment(1);

    #[cfg(feature = "tracing")]
    tracing::warn!(
        bus,
        netfn = msg.netfn,
        cmd = msg.cmd,
        seq = msg.seq,
        "no request matches response"
    );
}

pub(crate) fn queue_purged(queue: &'static str, dropped: usize) {
    let _ = (queue, dropped);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_queue_purged_total", "queue" => queue).increment(dropped as u64);

    #[cfg(feature = "tracing")]
    {
        if dropped > 0 {
            tracing::warn!(queue, dropped, "ipmb queue purged");
        }
    }
}

pub(crate) fn lock_timeout(bus: usize, lock: &'static str) {
    let _ = (bus, lock);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_lock_timeouts_total", "lock" => lock).increment(1);

    #[cfg(feature = "tracing")]
    tracing::warn!(bus, lock, "failed to lock mutex in time");
}

pub(crate) fn link_read_failed(bus: usize, err: &Error) {
    let _ = (bus, err);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_link_read_errors_total").increment(1);

    #[cfg(feature = "tracing")]
    tracing::debug!(bus, error = %err, "ipmb link read failed");
}

pub(crate) fn ledger_unavailable(bus: usize, op: &'static str, msg: &Message, err: &Error) {
    let _ = (bus, op, msg, err);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_ledger_errors_total", "op" => op).increment(1);

    #[cfg(feature = "tracing")]
    tracing::warn!(
        bus,
        op,
        netfn = msg.netfn,
        cmd = msg.cmd,
        seq = msg.seq_target,
        error = %err,
        "ipmb ledger unavailable"
    );
}

pub(crate) fn response_failed(target: Channel, what: &'static str, err: &Error) {
    let _ = (target, what, err);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_responses_failed_total", "kind" => what).increment(1);

    #[cfg(feature = "tracing")]
    tracing::warn!(%target, what, error = %err, "response not delivered");
}

pub(crate) fn bridge_failed(target: Channel, err: &Error) {
    let _ = (target, err);

    #[cfg(feature = "metrics")]
    metrics::counter!("ipmb_bridge_errors_total").increment(1);

    #[cfg(feature = "tracing")]
    tracing::warn!(%target, error = %err, "OEM_MSG_OUT send IPMB request failed");
}

#[cfg(feature = "metrics")]
fn kind(msg: &Message) -> &'static str {
    if msg.is_response() { "response" } else { "request" }
}

#[cfg(feature = "metrics")]
fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Io(_) => "io",
        Error::Timeout => "timeout",
        Error::HeaderChecksum => "header_checksum",
        Error::MessageChecksum => "message_checksum",
        Error::Protocol(_) => "protocol",
        Error::InvalidArgument(_) => "invalid_argument",
        Error::MutexLock => "mutex_lock",
        Error::UnknownBus(_) => "unknown_bus",
        Error::QueueClosed => "queue_closed",
        Error::Unsupported(_) => "unsupported",
        Error::CompletionCode { .. } => "completion_code",
    }
}
