// Heads up! Before working on this file you should read, at least, RFC 793 and
// the parts of RFC 1122 that discuss TCP. The retransmission estimator is the
// one described by Van Jacobson in "Congestion Avoidance and Control".

use core::fmt;

use heapless::Vec;

use crate::config::{TCP_CONNECTION_COUNT, TCP_LISTEN_PORT_COUNT, TCP_MSS, TCP_RECEIVE_WINDOW};
use crate::iface::InterfaceInner;
use crate::time::{Duration, Instant};
use crate::wire::{IpEndpoint, IpProtocol, Ipv6Repr, TcpControl, TcpRepr, TcpSeqNumber};

/// Period of the connection timers.
pub(crate) const TCP_TICK: Duration = Duration::from_millis(500);

/// Initial retransmission timeout, in ticks.
const RTO: u8 = 3;
const MAX_RTX: u8 = 8;
const MAX_SYN_RTX: u8 = 5;
/// Ticks spent in TIME-WAIT, and the most spent in FIN-WAIT-2.
const TIME_WAIT_TIMEOUT: u8 = 120;
/// Backoff shift is capped so the timer keeps fitting in a tick counter.
const MAX_BACKOFF_SHIFT: u8 = 4;

const FIRST_LOCAL_PORT: u16 = 1024;
const LOCAL_PORT_WRAP: u16 = 32000;
const LOCAL_PORT_RESTART: u16 = 4096;

/// The state of a TCP connection, according to [RFC 793].
///
/// There is no LISTEN state: listening is a property of a port, not of a
/// connection. There is no CLOSE-WAIT state either, as the FIN of the remote
/// end is answered with our own right away.
///
/// [RFC 793]: https://tools.ietf.org/html/rfc793
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Closed,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    LastAck,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            State::Closed => write!(f, "CLOSED"),
            State::SynSent => write!(f, "SYN-SENT"),
            State::SynReceived => write!(f, "SYN-RECEIVED"),
            State::Established => write!(f, "ESTABLISHED"),
            State::FinWait1 => write!(f, "FIN-WAIT-1"),
            State::FinWait2 => write!(f, "FIN-WAIT-2"),
            State::Closing => write!(f, "CLOSING"),
            State::TimeWait => write!(f, "TIME-WAIT"),
            State::LastAck => write!(f, "LAST-ACK"),
        }
    }
}

/// Why a connection was torn down without a close handshake.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AbortReason {
    /// The remote end sent a reset, or the application aborted.
    Reset,
    /// A segment went unacknowledged through every retransmission.
    TimedOut,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AbortReason::Reset => write!(f, "reset"),
            AbortReason::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum ConnectError {
    PortInUse,
    NoResources,
}

/// Something the application has to hear about a connection.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum TcpEvent<'a> {
    /// A SYN on the listening port created the connection.
    Accepted(u16),
    Connected,
    Received {
        data: &'a [u8],
        remote: IpEndpoint,
    },
    /// Everything staged has been acknowledged.
    Acked,
    /// The close handshake is over as far as the application is concerned.
    Closed,
    Aborted(AbortReason),
}

/// A TCP connection.
#[derive(Debug, Clone)]
pub(crate) struct Connection {
    state: State,
    local: IpEndpoint,
    remote: IpEndpoint,
    rcv_nxt: TcpSeqNumber,
    /// First unacknowledged sequence number; every segment starts here.
    snd_nxt: TcpSeqNumber,
    /// Sequence space taken by the segment in flight.
    len: usize,
    /// Payload octets in the segment in flight.
    sent_data: usize,
    /// The segment in flight was never transmitted.
    unsent: bool,
    mss: usize,
    initial_mss: usize,
    sa: u8,
    sv: u8,
    rto: u8,
    timer: u8,
    nrtx: u8,
    peer_window: usize,
    tx_data: Vec<u8, TCP_MSS>,
    close_requested: bool,
    abort_requested: bool,
}

impl Connection {
    fn new() -> Connection {
        Connection {
            state: State::Closed,
            local: IpEndpoint::default(),
            remote: IpEndpoint::default(),
            rcv_nxt: TcpSeqNumber::default(),
            snd_nxt: TcpSeqNumber::default(),
            len: 0,
            sent_data: 0,
            unsent: false,
            mss: TCP_MSS,
            initial_mss: TCP_MSS,
            sa: 0,
            sv: 4,
            rto: RTO,
            timer: RTO,
            nrtx: 0,
            peer_window: 0,
            tx_data: Vec::new(),
            close_requested: false,
            abort_requested: false,
        }
    }

    /// Reinitialize the slot for a new connection whose SYN is in flight.
    fn open(&mut self, state: State, local: IpEndpoint, remote: IpEndpoint, iss: TcpSeqNumber) {
        *self = Connection {
            local,
            remote,
            snd_nxt: iss,
            len: 1,
            ..Connection::new()
        };
        self.set_state(state);
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn local_endpoint(&self) -> IpEndpoint {
        self.local
    }

    pub(crate) fn remote_endpoint(&self) -> IpEndpoint {
        self.remote
    }

    /// The maximum segment size agreed with the remote end.
    pub(crate) fn mss(&self) -> usize {
        self.mss
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state != State::Closed
    }

    /// Whether staged or unacknowledged data keeps new data out.
    pub(crate) fn is_busy(&self) -> bool {
        self.len > 0 || !self.tx_data.is_empty()
    }

    /// Stage one segment of data. It goes out on the next dispatch.
    pub(crate) fn stage(&mut self, data: &[u8]) -> bool {
        if self.is_busy() || data.len() > self.mss {
            return false;
        }
        self.tx_data.extend_from_slice(data).is_ok()
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            net_trace!(
                "{}:{}: state={}=>{}",
                self.local,
                self.remote,
                self.state,
                state
            );
        }
        self.state = state
    }

    fn set_peer_mss(&mut self, mss: Option<u16>) {
        if let Some(mss) = mss {
            self.mss = (mss as usize).min(self.initial_mss).max(1);
        }
    }

    /// Feed a round trip measurement of a segment that was sent once into
    /// the estimator.
    fn update_rtt(&mut self) {
        let mut m = self.rto as i16 - self.timer as i16;
        m -= (self.sa >> 3) as i16;
        self.sa = (self.sa as i16 + m).clamp(0, u8::MAX as i16) as u8;
        let m = m.abs() - (self.sv >> 2) as i16;
        self.sv = (self.sv as i16 + m).clamp(0, u8::MAX as i16) as u8;
        self.rto = ((self.sa >> 3) as u16 + self.sv as u16).clamp(1, u8::MAX as u16) as u8;
    }

    /// Arm the timer for a segment that is going out for the first time.
    fn start_timer(&mut self) {
        self.timer = self.rto;
        self.nrtx = 0;
    }

    fn ack_data(&mut self) -> bool {
        let acked = self.sent_data;
        self.sent_data = 0;
        if acked == 0 {
            return false;
        }
        let remaining = self.tx_data.len() - acked;
        self.tx_data.rotate_left(acked);
        self.tx_data.truncate(remaining);
        self.tx_data.is_empty()
    }

    fn segment<'a>(&self, control: TcpControl, payload: &'a [u8]) -> TcpRepr<'a> {
        let ack_number = match (control, self.state) {
            (TcpControl::Syn, State::SynSent) => None,
            _ => Some(self.rcv_nxt),
        };
        TcpRepr {
            src_port: self.local.port,
            dst_port: self.remote.port,
            control,
            seq_number: self.snd_nxt,
            ack_number,
            window_len: TCP_RECEIVE_WINDOW.min(u16::MAX as usize) as u16,
            max_seg_size: match control {
                TcpControl::Syn => Some(self.initial_mss as u16),
                _ => None,
            },
            payload,
        }
    }

    fn send<F>(&self, cx: &mut InterfaceInner, control: TcpControl, payload: &[u8], emit: &mut F)
    where
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        let repr = self.segment(control, payload);
        let ip_repr = Ipv6Repr {
            src_addr: self.local.addr,
            dst_addr: self.remote.addr,
            next_header: IpProtocol::Tcp,
            payload_len: repr.buffer_len(),
            hop_limit: cx.hop_limit(),
        };
        net_trace!("{}:{}: sending {}", self.local, self.remote, repr);
        emit(cx, &ip_repr, &repr)
    }

    fn send_ack<F>(&self, cx: &mut InterfaceInner, emit: &mut F)
    where
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        self.send(cx, TcpControl::None, &[], emit)
    }

    /// (Re)send the segment in flight.
    fn send_outstanding<F>(&self, cx: &mut InterfaceInner, emit: &mut F)
    where
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        match self.state {
            State::SynSent | State::SynReceived => self.send(cx, TcpControl::Syn, &[], emit),
            State::Established => {
                self.send(cx, TcpControl::Psh, &self.tx_data[..self.sent_data], emit)
            }
            State::FinWait1 | State::Closing | State::LastAck => {
                self.send(cx, TcpControl::Fin, &[], emit)
            }
            _ => (),
        }
    }

    /// Pick a source address for a connection opened without one. Returns
    /// whether the connection has one.
    fn has_source(&mut self, cx: &InterfaceInner) -> bool {
        if self.local.addr.is_unspecified() {
            match cx.get_source_address_ipv6(&self.remote.addr) {
                Some(addr) => self.local.addr = addr,
                None => {
                    net_debug!("tcp: no source address for {}", self.remote.addr);
                    return false;
                }
            }
        }
        true
    }

    /// Whether the connection has something to transmit right now.
    fn wants_dispatch(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.abort_requested
            || self.unsent
            || (self.state == State::Established
                && self.len == 0
                && (!self.tx_data.is_empty() || self.close_requested))
    }
}

/// The fixed table of TCP connections, and the ports listened on.
#[derive(Debug)]
pub(crate) struct ConnectionTable {
    conns: [Connection; TCP_CONNECTION_COUNT],
    listen: Vec<u16, TCP_LISTEN_PORT_COUNT>,
    last_port: u16,
    iss: TcpSeqNumber,
    next_tick: Option<Instant>,
}

impl ConnectionTable {
    pub(crate) fn new() -> ConnectionTable {
        ConnectionTable {
            conns: core::array::from_fn(|_| Connection::new()),
            listen: Vec::new(),
            last_port: FIRST_LOCAL_PORT,
            iss: TcpSeqNumber::default(),
            next_tick: None,
        }
    }

    pub(crate) fn get(&self, index: usize) -> &Connection {
        &self.conns[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Connection {
        &mut self.conns[index]
    }

    pub(crate) fn is_listening(&self, port: u16) -> bool {
        self.listen.contains(&port)
    }

    pub(crate) fn is_port_used(&self, port: u16) -> bool {
        self.is_listening(port)
            || self
                .conns
                .iter()
                .any(|conn| conn.is_active() && conn.local.port == port)
    }

    fn next_local_port(&mut self) -> u16 {
        loop {
            self.last_port += 1;
            if self.last_port >= LOCAL_PORT_WRAP {
                self.last_port = LOCAL_PORT_RESTART;
            }
            if !self.is_port_used(self.last_port) {
                return self.last_port;
            }
        }
    }

    /// Find a slot for a new connection: a closed one, or else the one
    /// that has spent the longest in TIME-WAIT.
    fn alloc_slot(&self) -> Option<usize> {
        if let Some(index) = self.conns.iter().position(|conn| !conn.is_active()) {
            return Some(index);
        }
        self.conns
            .iter()
            .enumerate()
            .filter(|(_, conn)| conn.state == State::TimeWait)
            .max_by_key(|(_, conn)| conn.timer)
            .map(|(index, _)| index)
    }

    /// Start an active open. The SYN goes out on the next dispatch.
    pub(crate) fn connect(
        &mut self,
        local: IpEndpoint,
        remote: IpEndpoint,
    ) -> Result<usize, ConnectError> {
        let port = match local.port {
            0 => self.next_local_port(),
            port if self.is_port_used(port) => return Err(ConnectError::PortInUse),
            port => port,
        };
        let index = self.alloc_slot().ok_or(ConnectError::NoResources)?;

        let iss = self.iss;
        let conn = &mut self.conns[index];
        conn.open(
            State::SynSent,
            IpEndpoint::new(local.addr, port),
            remote,
            iss,
        );
        conn.unsent = true;
        Ok(index)
    }

    pub(crate) fn listen(&mut self, port: u16) -> Result<(), ConnectError> {
        if self.is_port_used(port) {
            return Err(ConnectError::PortInUse);
        }
        self.listen
            .push(port)
            .map_err(|_| ConnectError::NoResources)
    }

    pub(crate) fn unlisten(&mut self, port: u16) {
        self.listen.retain(|&p| p != port)
    }

    /// Ask for a graceful close. Returns whether the connection is closed
    /// already, which is the case for one that never got past SYN-SENT.
    pub(crate) fn close(&mut self, index: usize) -> bool {
        let conn = &mut self.conns[index];
        match conn.state {
            State::Closed => true,
            State::SynSent => {
                conn.set_state(State::Closed);
                true
            }
            State::SynReceived | State::Established => {
                conn.close_requested = true;
                false
            }
            _ => false,
        }
    }

    /// Ask for a reset. It goes out on the next dispatch.
    pub(crate) fn abort(&mut self, index: usize) {
        let conn = &mut self.conns[index];
        if conn.is_active() {
            conn.abort_requested = true;
        }
    }

    /// Process a received segment, emitting the answer it calls for.
    pub(crate) fn process<N, F>(
        &mut self,
        cx: &mut InterfaceInner,
        ip_repr: &Ipv6Repr,
        repr: &TcpRepr,
        mut notify: N,
        mut emit: F,
    ) where
        N: FnMut(usize, TcpEvent),
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        let found = self.conns.iter().position(|conn| {
            conn.is_active()
                && conn.local.port == repr.dst_port
                && conn.remote.port == repr.src_port
                && conn.remote.addr == ip_repr.src_addr
                && (conn.local.addr.is_unspecified() || conn.local.addr == ip_repr.dst_addr)
        });
        let Some(index) = found else {
            return self.process_unbound(cx, ip_repr, repr, &mut notify, &mut emit);
        };
        let conn = &mut self.conns[index];

        if repr.control == TcpControl::Rst {
            net_debug!("{}:{}: reset by the remote end", conn.local, conn.remote);
            conn.set_state(State::Closed);
            notify(index, TcpEvent::Aborted(AbortReason::Reset));
            return;
        }

        match conn.state {
            State::SynSent => (),
            State::SynReceived if repr.control == TcpControl::Syn => {
                net_trace!("{}:{}: duplicate SYN", conn.local, conn.remote);
                return conn.send(cx, TcpControl::Syn, &[], &mut emit);
            }
            _ => {
                let occupies_space = !repr.payload.is_empty()
                    || matches!(repr.control, TcpControl::Syn | TcpControl::Fin);
                if occupies_space && repr.seq_number != conn.rcv_nxt {
                    net_debug!(
                        "{}:{}: unacceptable SEQ ({} expected {}), sending ACK",
                        conn.local,
                        conn.remote,
                        repr.seq_number,
                        conn.rcv_nxt
                    );
                    return conn.send_ack(cx, &mut emit);
                }
            }
        }

        let mut acked = false;
        if let Some(ack_number) = repr.ack_number {
            if conn.len > 0 && ack_number == conn.snd_nxt + conn.len {
                if conn.nrtx == 0 {
                    conn.update_rtt();
                }
                conn.snd_nxt = ack_number;
                conn.len = 0;
                conn.timer = conn.rto;
                conn.nrtx = 0;
                acked = true;
                if conn.ack_data() {
                    notify(index, TcpEvent::Acked);
                }
            }
        }
        conn.peer_window = repr.window_len as usize;

        match conn.state {
            State::SynSent => {
                if repr.control == TcpControl::Syn && acked {
                    conn.set_peer_mss(repr.max_seg_size);
                    conn.rcv_nxt = repr.seq_number + 1;
                    conn.set_state(State::Established);
                    notify(index, TcpEvent::Connected);
                    conn.send_ack(cx, &mut emit);
                } else if let Some(ack_number) = repr.ack_number.filter(|_| !acked) {
                    net_debug!(
                        "{}:{}: unacceptable ACK in SYN-SENT, sending RST",
                        conn.local,
                        conn.remote
                    );
                    emit_reset(cx, ip_repr, repr, Some(ack_number), &mut emit);
                }
                return;
            }
            State::SynReceived => {
                if !acked {
                    return;
                }
                conn.set_state(State::Established);
                notify(index, TcpEvent::Connected);
            }
            _ => (),
        }

        let fin = repr.control == TcpControl::Fin;
        let data = repr.payload;
        if !data.is_empty() && conn.state != State::TimeWait {
            conn.rcv_nxt += data.len();
            let remote = conn.remote;
            notify(index, TcpEvent::Received { data, remote });
        }

        match conn.state {
            State::Established if fin && conn.len == 0 => {
                conn.rcv_nxt += 1;
                notify(index, TcpEvent::Closed);
                conn.tx_data.clear();
                conn.close_requested = false;
                conn.set_state(State::LastAck);
                conn.len = 1;
                conn.start_timer();
                conn.send(cx, TcpControl::Fin, &[], &mut emit);
            }
            State::Established => {
                if !data.is_empty() || fin {
                    conn.send_ack(cx, &mut emit);
                }
            }
            State::FinWait1 => {
                if fin {
                    conn.rcv_nxt += 1;
                    if acked {
                        conn.set_state(State::TimeWait);
                        conn.timer = 0;
                        notify(index, TcpEvent::Closed);
                    } else {
                        conn.set_state(State::Closing);
                    }
                } else if acked {
                    conn.set_state(State::FinWait2);
                    conn.timer = 0;
                }
                if fin || !data.is_empty() {
                    conn.send_ack(cx, &mut emit);
                }
            }
            State::FinWait2 => {
                if fin {
                    conn.rcv_nxt += 1;
                    conn.set_state(State::TimeWait);
                    conn.timer = 0;
                    notify(index, TcpEvent::Closed);
                }
                if fin || !data.is_empty() {
                    conn.send_ack(cx, &mut emit);
                }
            }
            State::Closing if acked => {
                conn.set_state(State::TimeWait);
                conn.timer = 0;
                notify(index, TcpEvent::Closed);
            }
            State::LastAck if acked => conn.set_state(State::Closed),
            State::TimeWait => conn.send_ack(cx, &mut emit),
            _ => (),
        }
    }

    /// Handle a segment that belongs to no connection: accept it on a
    /// listening port, or answer with a reset.
    fn process_unbound<N, F>(
        &mut self,
        cx: &mut InterfaceInner,
        ip_repr: &Ipv6Repr,
        repr: &TcpRepr,
        notify: &mut N,
        emit: &mut F,
    ) where
        N: FnMut(usize, TcpEvent),
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        match (repr.control, repr.ack_number) {
            (TcpControl::Rst, _) => (),
            (TcpControl::Syn, None) if self.is_listening(repr.dst_port) => {
                let Some(index) = self.alloc_slot() else {
                    net_debug!("tcp: no free connection for port {}", repr.dst_port);
                    return;
                };
                let iss = self.iss;
                let conn = &mut self.conns[index];
                conn.open(
                    State::SynReceived,
                    IpEndpoint::new(ip_repr.dst_addr, repr.dst_port),
                    IpEndpoint::new(ip_repr.src_addr, repr.src_port),
                    iss,
                );
                conn.set_peer_mss(repr.max_seg_size);
                conn.rcv_nxt = repr.seq_number + 1;
                conn.start_timer();
                notify(index, TcpEvent::Accepted(repr.dst_port));
                conn.send(cx, TcpControl::Syn, &[], emit);
            }
            (_, ack_number) => {
                net_debug!(
                    "tcp: no connection for [{}]:{}, sending RST",
                    ip_repr.dst_addr,
                    repr.dst_port
                );
                emit_reset(cx, ip_repr, repr, ack_number, emit);
            }
        }
    }

    /// Run the timers once per tick, then transmit whatever the connections
    /// have pending.
    pub(crate) fn dispatch<N, F>(&mut self, cx: &mut InterfaceInner, mut notify: N, mut emit: F)
    where
        N: FnMut(usize, TcpEvent),
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        let now = cx.now();
        let next_tick = *self.next_tick.get_or_insert(now + TCP_TICK);
        if now >= next_tick {
            self.next_tick = Some(now + TCP_TICK);
            self.iss += 1;
            for index in 0..self.conns.len() {
                self.tick(index, cx, &mut notify, &mut emit);
            }
        }

        for index in 0..self.conns.len() {
            self.dispatch_connection(index, cx, &mut notify, &mut emit);
        }
    }

    fn tick<N, F>(&mut self, index: usize, cx: &mut InterfaceInner, notify: &mut N, emit: &mut F)
    where
        N: FnMut(usize, TcpEvent),
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        let conn = &mut self.conns[index];
        match conn.state {
            State::Closed => (),
            State::TimeWait | State::FinWait2 => {
                conn.timer += 1;
                if conn.timer >= TIME_WAIT_TIMEOUT {
                    let was_fin_wait2 = conn.state == State::FinWait2;
                    conn.set_state(State::Closed);
                    if was_fin_wait2 {
                        notify(index, TcpEvent::Closed);
                    }
                }
            }
            _ if conn.len > 0 && !conn.unsent => {
                conn.timer = conn.timer.saturating_sub(1);
                if conn.timer > 0 {
                    return;
                }

                let max_rtx = match conn.state {
                    State::SynSent | State::SynReceived => MAX_SYN_RTX,
                    _ => MAX_RTX,
                };
                if conn.nrtx >= max_rtx {
                    net_debug!(
                        "{}:{}: no answer after {} retransmissions",
                        conn.local,
                        conn.remote,
                        conn.nrtx
                    );
                    if conn.has_source(cx) {
                        conn.send(cx, TcpControl::Rst, &[], emit);
                    }
                    conn.set_state(State::Closed);
                    notify(index, TcpEvent::Aborted(AbortReason::TimedOut));
                    return;
                }

                conn.timer = RTO << conn.nrtx.min(MAX_BACKOFF_SHIFT);
                conn.nrtx += 1;
                net_trace!(
                    "{}:{}: retransmission {} at {}",
                    conn.local,
                    conn.remote,
                    conn.nrtx,
                    cx.now()
                );
                if conn.has_source(cx) {
                    conn.send_outstanding(cx, emit);
                }
            }
            _ => (),
        }
    }

    fn dispatch_connection<N, F>(
        &mut self,
        index: usize,
        cx: &mut InterfaceInner,
        notify: &mut N,
        emit: &mut F,
    ) where
        N: FnMut(usize, TcpEvent),
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        let conn = &mut self.conns[index];
        if !conn.wants_dispatch() {
            return;
        }

        if conn.abort_requested {
            conn.abort_requested = false;
            if conn.has_source(cx) {
                conn.send(cx, TcpControl::Rst, &[], emit);
            }
            conn.set_state(State::Closed);
            notify(index, TcpEvent::Closed);
            return;
        }

        if conn.unsent {
            // The timer runs even when there is no source address to send
            // from yet, so the open still gives up after its retries.
            conn.unsent = false;
            conn.start_timer();
            if conn.has_source(cx) {
                conn.send_outstanding(cx, emit);
            }
        } else if !conn.tx_data.is_empty() {
            let mut size = conn.tx_data.len().min(conn.mss);
            if conn.peer_window > 0 && conn.peer_window < size {
                size = conn.peer_window;
            }
            conn.sent_data = size;
            conn.len = size;
            conn.start_timer();
            conn.send_outstanding(cx, emit);
        } else {
            conn.close_requested = false;
            conn.set_state(State::FinWait1);
            conn.len = 1;
            conn.start_timer();
            conn.send_outstanding(cx, emit);
        }
    }

    pub(crate) fn poll_at(&self, now: Instant) -> Option<Instant> {
        if self.conns.iter().any(Connection::wants_dispatch) {
            return Some(now);
        }
        if self.conns.iter().any(Connection::is_active) {
            return Some(self.next_tick.unwrap_or(now));
        }
        None
    }
}

/// Answer a segment nobody expects with a reset, as RFC 793 describes for
/// the CLOSED state.
fn emit_reset<F>(
    cx: &mut InterfaceInner,
    ip_repr: &Ipv6Repr,
    repr: &TcpRepr,
    ack_number: Option<TcpSeqNumber>,
    emit: &mut F,
) where
    F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
{
    let (seq_number, ack_number) = match ack_number {
        Some(ack_number) => (ack_number, None),
        None => (
            TcpSeqNumber(0),
            Some(repr.seq_number + repr.segment_len()),
        ),
    };
    let reset = TcpRepr {
        src_port: repr.dst_port,
        dst_port: repr.src_port,
        control: TcpControl::Rst,
        seq_number,
        ack_number,
        window_len: 0,
        max_seg_size: None,
        payload: &[],
    };
    let reply_ip_repr = Ipv6Repr {
        src_addr: ip_repr.dst_addr,
        dst_addr: ip_repr.src_addr,
        next_header: IpProtocol::Tcp,
        payload_len: reset.buffer_len(),
        hop_limit: cx.hop_limit(),
    };
    emit(cx, &reply_ip_repr, &reset)
}
