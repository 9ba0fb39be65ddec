use crate::channel::{Channel, InboundFrame, Scheme};
use crate::shared::{ClientId, ErrorUtils, ProtocolError, ProtocolResult};
use hashbrown::HashMap;
use indexmap::IndexSet;
use mio::net::TcpListener;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use stirrup::logging;

const LISTENER_TOKEN: mio::Token = mio::Token(0);
const EVENTS_CAPACITY: usize = 1024;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3);
// Clients heartbeat; a connection silent this long is gone.
const INGRESS_TIMEOUT: Duration = Duration::from_secs(120);

/// Connectivity and traffic events surfaced to the subserver loop, in
/// arrival order per connection.
#[derive(Debug)]
pub enum HostEvent {
    Connected(ClientId),
    Disconnected(ClientId),
    Frame(ClientId, InboundFrame),
}

/// Accepts connections on one listen socket, assigns monotonic client ids,
/// and pumps every channel's ingress/egress. One host per subserver; the
/// scheme decides which wire variant its channels speak.
pub struct Host {
    listener: TcpListener,
    poll: mio::Poll,
    events: mio::Events,

    scheme: Scheme,

    channels: Vec<Channel>,
    free: Vec<usize>,
    live: IndexSet<usize>,
    by_client: HashMap<ClientId, usize>,
    next_client_id: ClientId,

    pending: VecDeque<HostEvent>,

    housekeeping_time: Instant,

    log: logging::Logger,
}

impl Host {
    /// Binds the listen socket. Failure here is a fatal initialization error
    /// for the process.
    pub fn bind(address: &str, scheme: Scheme, log: &logging::Logger) -> ProtocolResult<Host> {
        let addr: SocketAddr = address.parse()?;
        let listener = TcpListener::bind(&addr)?;
        let poll = mio::Poll::new()?;

        poll.register(
            &listener,
            LISTENER_TOKEN,
            mio::Ready::readable(),
            mio::PollOpt::edge(),
        )?;

        logging::info!(log, "host listening"; "address" => %addr, "scheme" => ?scheme);

        Ok(Host {
            listener,
            poll,
            events: mio::Events::with_capacity(EVENTS_CAPACITY),
            scheme,
            channels: Vec::new(),
            free: Vec::new(),
            live: IndexSet::new(),
            by_client: HashMap::new(),
            next_client_id: 1,
            pending: VecDeque::new(),
            housekeeping_time: Instant::now(),
            log: log.new(logging::o!()),
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> ProtocolResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs one pump iteration: flush pending egress, poll for readiness (up
    /// to `timeout`), accept, read frames, and do periodic housekeeping.
    /// Surfaced events accumulate until `drain_events` is called.
    pub fn sync(&mut self, now: Instant, timeout: Duration) {
        if now.duration_since(self.housekeeping_time) >= HOUSEKEEPING_INTERVAL {
            self.housekeeping(now);
            self.housekeeping_time = now;
        }

        // Force send on all live channels; edge triggering alone would miss
        // frames queued while the socket sat idle-writable.
        let slots: Vec<usize> = self.live.iter().copied().collect();
        for slot in slots {
            let result = self.channels[slot].send();
            if result.has_failed() {
                self.close_slot(slot, "send error");
            } else if self.channels[slot].is_draining() && !self.channels[slot].has_egress() {
                self.close_slot(slot, "drained");
            }
        }

        self.poll
            .poll(&mut self.events, Some(timeout))
            .expect("Host poll failed");

        let mut accepted = false;
        let mut ready: Vec<(usize, bool, bool)> = Vec::new();

        for event in &self.events {
            if event.token() == LISTENER_TOKEN {
                accepted = true;
            } else {
                let slot = event.token().0 - 1;
                let readiness = event.readiness();
                ready.push((slot, readiness.is_readable(), readiness.is_writable()));
            }
        }

        if accepted {
            self.accept_all(now);
        }

        for (slot, readable, writable) in ready {
            if !self.live.contains(&slot) {
                continue;
            }

            if readable {
                if self.channels[slot].receive(now).has_failed() {
                    self.close_slot(slot, "receive error");
                    continue;
                }

                if let Err(error) = self.extract_frames(slot) {
                    if error != ProtocolError::Wait {
                        self.close_slot(slot, "framing error");
                        continue;
                    }
                }
            }

            if writable && self.channels[slot].send().has_failed() {
                self.close_slot(slot, "send error");
            }
        }
    }

    /// Drains all events accumulated since the last call.
    #[inline]
    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        self.pending.drain(..).collect()
    }

    /// Assembles and queues one outbound frame for the client. Unknown ids
    /// are ignored (the client disconnected between queueing and delivery).
    pub fn queue_frame(
        &mut self,
        client_id: ClientId,
        command_id: u16,
        writer: &mut dyn FnMut(&mut crate::stream::SinkStream<'_>) -> ProtocolResult<()>,
    ) {
        let slot = match self.by_client.get(&client_id) {
            Some(&slot) => slot,
            None => return,
        };

        if self.channels[slot].write_frame(command_id, writer).has_failed() {
            self.close_slot(slot, "write error");
        }
    }

    /// Resets the client's rolling scramble code to zero.
    pub fn reset_code(&mut self, client_id: ClientId) {
        if let Some(&slot) = self.by_client.get(&client_id) {
            self.channels[slot].reset_code();
        }
    }

    /// Tears the connection down immediately.
    pub fn disconnect(&mut self, client_id: ClientId) {
        if let Some(&slot) = self.by_client.get(&client_id) {
            self.close_slot(slot, "disconnect requested");
        }
    }

    /// Tears the connection down once its outbound buffer drains; used after
    /// terminal replies like LoginCancel.
    pub fn disconnect_after_flush(&mut self, client_id: ClientId) {
        if let Some(&slot) = self.by_client.get(&client_id) {
            if self.channels[slot].has_egress() {
                self.channels[slot].close_after_flush();
            } else {
                self.close_slot(slot, "disconnect requested");
            }
        }
    }

    pub fn client_addr(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.by_client
            .get(&client_id)
            .and_then(|&slot| self.channels[slot].peer())
    }

    fn accept_all(&mut self, now: Instant) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let slot = match self.free.pop() {
                        Some(slot) => slot,
                        None => {
                            self.channels.push(Channel::new(self.scheme, &self.log));
                            self.channels.len() - 1
                        }
                    };

                    let client_id = self.next_client_id;
                    self.next_client_id += 1;

                    self.channels[slot].open(client_id, stream, peer, now);

                    self.poll
                        .register(
                            self.channels[slot].stream().expect("Channel just opened"),
                            mio::Token(slot + 1),
                            mio::Ready::readable() | mio::Ready::writable(),
                            mio::PollOpt::edge(),
                        )
                        .expect("Stream registration failed");

                    self.live.insert(slot);
                    self.by_client.insert(client_id, slot);
                    self.pending.push_back(HostEvent::Connected(client_id));
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    logging::error!(self.log, "accept failed"; "error" => %err);
                    break;
                }
            }
        }
    }

    /// Pulls every whole frame out of the slot's read buffer.
    fn extract_frames(&mut self, slot: usize) -> ProtocolResult<()> {
        let client_id = self.channels[slot]
            .client_id()
            .expect("Live channel must carry a client id");

        while let Some(frame) = self.channels[slot].next_frame()? {
            self.pending.push_back(HostEvent::Frame(client_id, frame));
        }

        Ok(())
    }

    fn close_slot(&mut self, slot: usize, reason: &'static str) {
        let client_id = match self.channels[slot].client_id() {
            Some(client_id) => client_id,
            None => return,
        };

        logging::debug!(self.log, "closing connection";
                        "client_id" => client_id,
                        "reason" => reason);

        if let Some(stream) = self.channels[slot].stream() {
            drop(self.poll.deregister(stream));
        }
        self.channels[slot].close();

        self.live.swap_remove(&slot);
        self.free.push(slot);
        self.by_client.remove(&client_id);
        self.pending.push_back(HostEvent::Disconnected(client_id));
    }

    fn housekeeping(&mut self, now: Instant) {
        let stale: Vec<usize> = self
            .live
            .iter()
            .copied()
            .filter(|&slot| self.channels[slot].last_ingress_elapsed(now) >= INGRESS_TIMEOUT)
            .collect();

        for slot in stale {
            self.close_slot(slot, "ingress timeout");
        }
    }
}

impl crate::dispatch::CommandConduit for Host {
    fn queue_frame(
        &mut self,
        client_id: ClientId,
        command_id: u16,
        writer: &mut dyn FnMut(&mut crate::stream::SinkStream<'_>) -> ProtocolResult<()>,
    ) {
        Host::queue_frame(self, client_id, command_id, writer);
    }

    fn reset_code(&mut self, client_id: ClientId) {
        Host::reset_code(self, client_id);
    }

    fn disconnect(&mut self, client_id: ClientId) {
        Host::disconnect(self, client_id);
    }

    fn disconnect_after_flush(&mut self, client_id: ClientId) {
        Host::disconnect_after_flush(self, client_id);
    }
}
