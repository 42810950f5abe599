use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::commands::Command;
use crate::config::{BusConfig, Timing};
use crate::engine::{self, Envelope, Stop};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::observe;
use crate::platform::{DefaultPlatform, Platform};
use crate::queue::MsgQueue;
use crate::transport::{KcsWriter, Link};
use crate::types::{Channel, Message, cc};

/// Everything owned by one configured bus.
pub(crate) struct BusContext {
    pub(crate) config: BusConfig,
    pub(crate) link: Arc<dyn Link>,
    pub(crate) ledger: Ledger,
    pub(crate) tx_queue: MsgQueue<Envelope>,
    pub(crate) responses: MsgQueue<Message>,
    send_req: Mutex<()>,
    send_res: Mutex<()>,
    read: Mutex<()>,
}

impl BusContext {
    fn new(config: BusConfig, link: Arc<dyn Link>, timing: &Timing) -> Self {
        Self {
            ledger: Ledger::new(config.index, timing.ledger_capacity, timing.lock_timeout),
            tx_queue: MsgQueue::new(timing.tx_queue_len),
            responses: MsgQueue::new(timing.response_queue_len),
            send_req: Mutex::new(()),
            send_res: Mutex::new(()),
            read: Mutex::new(()),
            config,
            link,
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.config.index
    }
}

pub(crate) struct Inner {
    pub(crate) buses: Vec<BusContext>,
    channel_map: HashMap<Channel, usize>,
    pub(crate) timing: Timing,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) kcs: Option<Arc<dyn KcsWriter>>,
    requests: MsgQueue<Message>,
    pub(crate) stop: Stop,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a running IPMB stack.
///
/// Cloning is cheap; every clone drives the same buses. Workers run until
/// [`Ipmb::shutdown`] is called.
#[derive(Clone)]
pub struct Ipmb {
    pub(crate) inner: Arc<Inner>,
}

/// Builder for [`Ipmb`].
pub struct IpmbBuilder {
    buses: Vec<(BusConfig, Arc<dyn Link>)>,
    kcs: Option<Arc<dyn KcsWriter>>,
    platform: Arc<dyn Platform>,
    timing: Timing,
    clock: Arc<dyn Clock>,
}

impl Default for IpmbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IpmbBuilder {
    /// Create a builder with no buses, the default platform and default timing.
    pub fn new() -> Self {
        Self {
            buses: Vec::new(),
            kcs: None,
            platform: Arc::new(DefaultPlatform),
            timing: Timing::default(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Add a bus and the link that carries it.
    pub fn bus(mut self, config: BusConfig, link: impl Link + 'static) -> Self {
        let link: Arc<dyn Link> = Arc::new(link);
        self.buses.push((config, link));
        self
    }

    /// Set the host KCS sink used for responses bound for `HOST_KCS`.
    pub fn kcs(mut self, kcs: impl KcsWriter + 'static) -> Self {
        self.kcs = Some(Arc::new(kcs));
        self
    }

    /// Set the board routing policy.
    pub fn platform(mut self, platform: impl Platform + 'static) -> Self {
        self.platform = Arc::new(platform);
        self
    }

    /// Set engine timing.
    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Set the tick source for ledger timestamps.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate the bus table, then start one transmit and one receive
    /// worker per usable bus plus the sweeper.
    pub fn build(mut self) -> Result<Ipmb> {
        if self.buses.is_empty() {
            return Err(Error::InvalidArgument("at least one bus is required"));
        }
        self.buses.sort_by_key(|(config, _)| config.index);
        for (pos, (config, _)) in self.buses.iter().enumerate() {
            if config.index != pos {
                return Err(Error::InvalidArgument(
                    "bus indices must be unique and contiguous from 0",
                ));
            }
            if config.self_addr > 0x7F || config.target_addr > 0x7F {
                return Err(Error::InvalidArgument("bus addresses must be 7-bit"));
            }
        }

        let mut channel_map = HashMap::new();
        for (config, _) in self.buses.iter().filter(|(config, _)| config.is_usable()) {
            channel_map.entry(config.channel).or_insert(config.index);
        }

        let buses = self
            .buses
            .into_iter()
            .map(|(config, link)| BusContext::new(config, link, &self.timing))
            .collect();

        let ipmb = Ipmb {
            inner: Arc::new(Inner {
                buses,
                channel_map,
                requests: MsgQueue::new(self.timing.request_queue_len),
                timing: self.timing,
                clock: self.clock,
                platform: self.platform,
                kcs: self.kcs,
                stop: Stop::default(),
                workers: Mutex::new(Vec::new()),
            }),
        };

        if let Err(err) = ipmb.spawn_workers() {
            ipmb.shutdown();
            return Err(err);
        }

        Ok(ipmb)
    }
}

impl Ipmb {
    /// Create an [`IpmbBuilder`].
    pub fn builder() -> IpmbBuilder {
        IpmbBuilder::new()
    }

    fn spawn_workers(&self) -> Result<()> {
        for bus in &self.inner.buses {
            if !bus.config.is_usable() {
                continue;
            }
            let index = bus.index();

            let ipmb = self.clone();
            self.spawn(bus.config.tx_thread_name.clone(), move || {
                engine::tx::run(&ipmb, index)
            })?;

            let ipmb = self.clone();
            self.spawn(bus.config.rx_thread_name.clone(), move || {
                engine::rx::run(&ipmb, index)
            })?;
        }

        let ipmb = self.clone();
        self.spawn("ipmb_sweeper".to_string(), move || engine::sweeper::run(&ipmb))
    }

    fn spawn(&self, name: String, f: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = thread::Builder::new().name(name).spawn(f)?;
        self.inner.workers.lock().push(handle);
        Ok(())
    }

    /// Stop every worker and wait for them to exit.
    ///
    /// Blocked senders and readers are woken with [`Error::QueueClosed`].
    pub fn shutdown(&self) {
        self.inner.stop.set();
        for bus in &self.inner.buses {
            bus.tx_queue.close();
            bus.responses.close();
        }
        self.inner.requests.close();

        let workers = std::mem::take(&mut *self.inner.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }

    pub(crate) fn bus(&self, index: usize) -> Result<&BusContext> {
        self.inner.buses.get(index).ok_or(Error::UnknownBus(index))
    }

    pub(crate) fn usable_bus(&self, index: usize) -> Result<&BusContext> {
        let bus = self.bus(index)?;
        if !bus.config.is_usable() {
            return Err(Error::UnknownBus(index));
        }
        Ok(bus)
    }

    pub(crate) fn timing(&self) -> &Timing {
        &self.inner.timing
    }

    /// Bus serving `channel`, if any.
    ///
    /// Only enabled, non-reserved buses are mapped. When several of them
    /// share a channel the first in the table wins.
    pub fn bus_index(&self, channel: Channel) -> Option<usize> {
        self.inner.channel_map.get(&channel).copied()
    }

    /// Configuration of bus `index`.
    pub fn bus_config(&self, index: usize) -> Option<&BusConfig> {
        self.inner.buses.get(index).map(|bus| &bus.config)
    }

    /// Pending-request ledger of bus `index`.
    pub fn ledger(&self, index: usize) -> Option<&Ledger> {
        self.inner.buses.get(index).map(|bus| &bus.ledger)
    }

    /// Board routing policy.
    pub fn platform(&self) -> &dyn Platform {
        self.inner.platform.as_ref()
    }

    pub(crate) fn kcs(&self) -> Option<&dyn KcsWriter> {
        self.inner.kcs.as_deref()
    }

    pub(crate) fn lock_bus<'a>(
        &self,
        bus: &'a BusContext,
        lock: &'static str,
        mutex: &'a Mutex<()>,
        timeout: Duration,
    ) -> Result<parking_lot::MutexGuard<'a, ()>> {
        mutex.try_lock_for(timeout).ok_or_else(|| {
            observe::lock_timeout(bus.index(), lock);
            Error::MutexLock
        })
    }

    /// Queue a request on bus `index`.
    ///
    /// The routing fields of `msg` (`netfn`, `cmd`, `data`, `inf_source`,
    /// `inf_target`, `completion_code`, `seq_source`) are copied; addresses,
    /// LUNs and a fresh sequence number come from the bus. Waits for room in
    /// the transmit queue.
    pub fn send_request(&self, msg: &Message, index: usize) -> Result<()> {
        let bus = self.usable_bus(index)?;
        let _guard = self.lock_bus(bus, "send_req", &bus.send_req, self.timing().lock_timeout)?;

        let mut out = Message {
            netfn: msg.netfn,
            cmd: msg.cmd,
            data: msg.data.clone(),
            inf_source: msg.inf_source,
            inf_target: msg.inf_target,
            completion_code: msg.completion_code,
            seq_source: msg.seq_source,
            dest_addr: bus.config.target_addr,
            src_addr: bus.config.self_addr << 1,
            ..Default::default()
        };
        out.seq = bus.ledger.next_seq()?;

        bus.tx_queue.put(Envelope::new(out))
    }

    /// Queue the response to request `msg` on bus `index`.
    ///
    /// The response netFn is `msg.netfn + 1`, the LUNs are swapped and the
    /// request's sequence number is echoed. Waits for room in the transmit
    /// queue.
    pub fn send_response(&self, msg: &Message, index: usize) -> Result<()> {
        self.enqueue_response(msg, index, true)
    }

    pub(crate) fn enqueue_response(&self, msg: &Message, index: usize, wait: bool) -> Result<()> {
        let bus = self.usable_bus(index)?;
        let _guard = self.lock_bus(bus, "send_res", &bus.send_res, self.timing().lock_timeout)?;

        let mut out = msg.clone();
        out.netfn = msg.netfn.wrapping_add(1);
        out.dest_lun = msg.src_lun;
        out.src_lun = msg.dest_lun;
        out.seq = msg.seq;
        out.seq_source = msg.seq;
        out.dest_addr = bus.config.target_addr;
        out.src_addr = bus.config.self_addr << 1;

        let envelope = Envelope::new(out);
        if wait {
            return bus.tx_queue.put(envelope);
        }
        bus.tx_queue.try_put(envelope).map_err(|_| {
            observe::frame_dropped(index, "tx queue full");
            Error::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "transmit queue full",
            ))
        })
    }

    /// Send `msg` as a request on bus `index` and wait for its response.
    ///
    /// On success `msg` is replaced by the response; its completion code is
    /// left for the caller to inspect. Fails with [`Error::Timeout`] when no
    /// response arrives within the read timeout.
    pub fn read(&self, msg: &mut Message, index: usize) -> Result<()> {
        let start = Instant::now();
        let (req_netfn, req_cmd) = (msg.netfn, msg.cmd);

        let result = self.read_inner(msg, index);
        let elapsed = start.elapsed();
        match &result {
            Ok(()) => observe::read_ok(index, req_netfn, req_cmd, elapsed, msg.completion_code),
            Err(err) => observe::read_err(index, req_netfn, req_cmd, elapsed, err),
        }
        result
    }

    fn read_inner(&self, msg: &mut Message, index: usize) -> Result<()> {
        let bus = self.usable_bus(index)?;
        let timing = self.timing();
        let _guard = self.lock_bus(bus, "read", &bus.read, timing.read_lock_timeout())?;

        observe::queue_purged("response", bus.responses.purge());

        msg.inf_source = Channel::SELF;
        msg.inf_target = bus.config.channel;
        self.send_request(msg, index)?;

        match bus.responses.get_timeout(timing.read_timeout) {
            Some(response) => {
                *msg = response;
                Ok(())
            }
            None if bus.responses.is_closed() => Err(Error::QueueClosed),
            None => Err(Error::Timeout),
        }
    }

    /// Issue a typed command on bus `index` and parse its response.
    pub fn execute<C: Command>(&self, index: usize, command: &C) -> Result<C::Output> {
        let mut msg = Message::request(C::NETFN, C::CMD, &command.request_data())?;
        self.read(&mut msg, index)?;
        command.parse_response(&msg)
    }

    /// Hand an inbound request to the dispatcher.
    ///
    /// When the queue is full its backlog is purged and the push retried.
    pub fn notify_client(&self, msg: Message) -> Result<()> {
        let mut msg = msg;
        loop {
            match self.inner.requests.try_put(msg) {
                Ok(()) => return Ok(()),
                Err(_) if self.inner.requests.is_closed() => return Err(Error::QueueClosed),
                Err(back) => {
                    observe::queue_purged("request", self.inner.requests.purge());
                    msg = back;
                }
            }
        }
    }

    /// Receiving end of the inbound request queue.
    pub fn requests(&self) -> Requests {
        Requests { ipmb: self.clone() }
    }

    /// Accept a request from the host KCS interface.
    ///
    /// Commands the platform serves locally go to the dispatcher; everything
    /// else is bridged to the BMC. If the bridge cannot be queued the host
    /// is answered with "cannot respond".
    pub fn submit_from_kcs(&self, msg: Message) -> Result<()> {
        let mut msg = msg;
        msg.inf_source = Channel::HOST_KCS;

        if self.platform().request_to_bic_from_kcs(msg.netfn, msg.cmd) {
            return self.notify_client(msg);
        }

        msg.inf_target = Channel::BMC_IPMB;
        let bridged = self
            .bus_index(Channel::BMC_IPMB)
            .ok_or(Error::Unsupported("no bus serves BMC_IPMB"))
            .and_then(|index| self.send_request(&msg, index));

        if let Err(err) = bridged {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                netfn = msg.netfn,
                cmd = msg.cmd,
                error = %err,
                "failed to bridge KCS request"
            );

            if let Some(kcs) = self.kcs() {
                kcs.write(&[(msg.netfn | 0x01) << 2, msg.cmd, cc::CAN_NOT_RESPOND])?;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Run one timeout sweep over every usable bus now, returning the number
    /// of requests evicted.
    pub fn sweep(&self) -> usize {
        engine::sweeper::sweep(self)
    }
}

/// Receiver for requests the engines pass to the dispatcher.
#[derive(Clone)]
pub struct Requests {
    ipmb: Ipmb,
}

impl Requests {
    /// Wait up to `timeout` for the next request.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Message> {
        let queue = &self.ipmb.inner.requests;
        match queue.get_timeout(timeout) {
            Some(msg) => Ok(msg),
            None if queue.is_closed() => Err(Error::QueueClosed),
            None => Err(Error::Timeout),
        }
    }

    /// Take a request if one is waiting.
    pub fn try_recv(&self) -> Option<Message> {
        self.ipmb.inner.requests.get_timeout(Duration::ZERO)
    }

    /// Number of requests waiting.
    pub fn len(&self) -> usize {
        self.ipmb.inner.requests.len()
    }

    /// Whether no request is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
