use crate::ipmb::Ipmb;

pub(crate) fn run(ipmb: &Ipmb) {
    let interval = ipmb.timing().sweep_interval;
    while !ipmb.inner.stop.sleep(interval) {
        sweep(ipmb);
    }
}

/// Expire stale requests on every usable bus. Buses whose ledger lock
/// cannot be taken are skipped until the next pass.
pub(crate) fn sweep(ipmb: &Ipmb) -> usize {
    let now = ipmb.inner.clock.now_ms();
    let timeout = ipmb.timing().seq_timeout_ms();

    ipmb.inner
        .buses
        .iter()
        .filter(|bus| bus.config.is_usable())
        .filter_map(|bus| bus.ledger.expire(now, timeout).ok())
        .sum()
}
