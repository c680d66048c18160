//! An authoritative unicast DNS server for DNS-SD records.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::{
    advertiser::{AdvertiseOptions, Advertiser},
    error::e_fmt,
    records::{enum_domain_fqdn, instance_fqdn, new_records, new_service_type_ptr_record},
    Error, Result, ServiceInstance, MAX_MSG_SIZE,
};
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, Record, RecordType};
use mio::{net::UdpSocket as MioUdpSocket, Events, Interest, Poll, Token};
use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    sync::{PoisonError, RwLock},
    thread,
    time::{Duration, Instant},
};

/// The default time to allow for serving a single DNS request.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(500);

const SERVICE_SOCK_TOKEN: Token = Token(0);
const SIGNAL_SOCK_TOKEN: Token = Token(1);

/// A handle used to request a graceful shutdown of [`UnicastServer::run`].
///
/// The handle pairs a channel with a loopback wake-up datagram so that the
/// run loop, which blocks in a socket poll, notices the request promptly.
#[derive(Clone)]
pub struct Shutdown {
    sender: flume::Sender<()>,

    /// Send to this addr to wake the run loop out of its poll.
    wake_addr: SocketAddr,
}

/// The receiving half of a [`Shutdown`] handle, consumed by
/// [`UnicastServer::run`].
pub struct ShutdownSignal {
    sock: UdpSocket,
    receiver: flume::Receiver<()>,
}

impl Shutdown {
    /// Creates a new shutdown handle and the signal to pass to
    /// [`UnicastServer::run`].
    pub fn new() -> Result<(Shutdown, ShutdownSignal)> {
        // Port 0 lets the system assign a random available port.
        let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .map_err(|e| e_fmt!("failed to create shutdown signal socket: {}", e))?;

        let wake_addr = sock
            .local_addr()
            .map_err(|e| e_fmt!("failed to get signal socket addr: {}", e))?;

        // Must be nonblocking so the run loop can poll it together with
        // the service socket.
        sock.set_nonblocking(true)
            .map_err(|e| e_fmt!("failed to set nonblocking for signal socket: {}", e))?;

        let (sender, receiver) = flume::bounded(1);

        Ok((
            Shutdown { sender, wake_addr },
            ShutdownSignal { sock, receiver },
        ))
    }

    /// Requests that the server shut down. [`UnicastServer::run`] returns
    /// [`Error::Canceled`] once it has observed the request.
    pub fn signal(&self) -> Result<()> {
        // A full channel means a signal is already pending.
        let _ = self.sender.try_send(());

        let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .map_err(|e| e_fmt!("failed to create socket to send shutdown signal: {}", e))?;

        sock.send_to(b"shutdown", self.wake_addr)
            .map_err(|e| e_fmt!("shutdown signal send_to {} failed: {}", self.wake_addr, e))?;

        Ok(())
    }
}

/// A conventional (unicast) DNS server designed specifically for serving
/// DNS-SD records.
///
/// Service instances are added and removed dynamically with
/// [`advertise`](UnicastServer::advertise) and
/// [`unadvertise`](UnicastServer::unadvertise), including while
/// [`run`](UnicastServer::run) is answering queries on another thread.
///
/// The server does not support recursive queries: it answers only for
/// names it holds records for, and replies with a name error otherwise.
pub struct UnicastServer {
    /// The amount of time to allow for each DNS request.
    timeout: Duration,

    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    /// Per service type: the record advertising the type's presence in the
    /// domain, and how many advertised instances keep it alive.
    ///
    /// The key is the instance enumeration domain of the service type.
    services: HashMap<Name, ServiceEntry>,

    /// Per advertised instance: the records it owns. The key is the
    /// fully-qualified service instance name.
    instances: HashMap<Name, InstanceEntry>,

    /// All records served, by owner name and then record type. The outer
    /// map gives O(1) dispatch on the question name; the inner split keeps
    /// type-specific answers a direct lookup and ANY a concatenation.
    records: HashMap<Name, HashMap<RecordType, Vec<Record>>>,
}

struct ServiceEntry {
    type_ptr: Record,
    instance_count: usize,
}

struct InstanceEntry {
    /// Key of the service entry this instance contributes to.
    enum_domain: Name,
    records: Vec<Record>,
}

impl UnicastServer {
    /// Creates a new server with no advertised instances.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            state: RwLock::new(State::default()),
        }
    }

    /// Replaces the per-request timeout, which defaults to
    /// [`DEFAULT_QUERY_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Starts advertising a DNS-SD service instance.
    ///
    /// Advertising an instance that is already advertised as-is changes
    /// nothing and returns false. Advertising an instance whose name is
    /// already advertised but whose details differ replaces the prior
    /// records atomically.
    pub fn advertise(
        &self,
        instance: &ServiceInstance,
        options: &AdvertiseOptions,
    ) -> Result<bool> {
        let name = instance_fqdn(&instance.name)?;
        let records = new_records(instance, options)?;
        let enum_domain =
            enum_domain_fqdn(&instance.name.service_type, &instance.name.domain)?;
        let type_ptr = new_service_type_ptr_record(
            &instance.name.service_type,
            &instance.name.domain,
            Duration::ZERO,
        )?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.has_records(&records) {
            return Ok(false);
        }

        state.remove_instance(&name);

        let type_is_new = match state.services.get_mut(&enum_domain) {
            Some(entry) => {
                entry.instance_count += 1;
                false
            }
            None => true,
        };

        if type_is_new {
            state.add_record(type_ptr.clone());
            state.services.insert(
                enum_domain.clone(),
                ServiceEntry {
                    type_ptr,
                    instance_count: 1,
                },
            );
        }

        for rr in &records {
            state.add_record(rr.clone());
        }

        state.instances.insert(
            name,
            InstanceEntry {
                enum_domain,
                records,
            },
        );

        Ok(true)
    }

    /// Stops advertising a DNS-SD service instance.
    ///
    /// Returns false if the instance was not advertised.
    pub fn unadvertise(&self, instance: &ServiceInstance) -> Result<bool> {
        let name = instance_fqdn(&instance.name)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        Ok(state.remove_instance(&name))
    }

    /// Runs the server until the shutdown handle fires or a fatal
    /// transport error occurs.
    ///
    /// `network` must be `"udp"`. `address` is the socket address to bind,
    /// for example `"127.0.0.1:65353"`.
    ///
    /// Once the [`Shutdown`] handle paired with `signal` fires, the
    /// listener is torn down and [`Error::Canceled`] is returned,
    /// regardless of any listener error.
    pub fn run(&self, signal: ShutdownSignal, network: &str, address: &str) -> Result<()> {
        if network != "udp" {
            return Err(e_fmt!("unsupported network {:?}, expected \"udp\"", network));
        }

        let addr: SocketAddr = address
            .parse()
            .map_err(|e| e_fmt!("invalid listen address {:?}: {}", address, e))?;

        let sock = new_socket(addr)?;
        let mut sock = MioUdpSocket::from_std(UdpSocket::from(sock));

        let ShutdownSignal { sock: signal_sock, receiver } = signal;
        let mut signal_sock = MioUdpSocket::from_std(signal_sock);

        let mut poller =
            Poll::new().map_err(|e| e_fmt!("failed to create poller: {}", e))?;

        poller
            .registry()
            .register(&mut sock, SERVICE_SOCK_TOKEN, Interest::READABLE)
            .map_err(|e| e_fmt!("failed to register service socket: {}", e))?;
        poller
            .registry()
            .register(&mut signal_sock, SIGNAL_SOCK_TOKEN, Interest::READABLE)
            .map_err(|e| e_fmt!("failed to register signal socket: {}", e))?;

        debug!("DNS-SD server listening on {}", addr);

        let mut events = Events::with_capacity(128);
        let mut buf = [0u8; MAX_MSG_SIZE];

        loop {
            events.clear();

            if let Err(e) = poller.poll(&mut events, None) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }

                // Honor a pending shutdown before reporting the poll error.
                if receiver.try_recv().is_ok() {
                    return Err(Error::Canceled);
                }

                return Err(e_fmt!("failed to poll sockets: {}", e));
            }

            for event in events.iter() {
                match event.token() {
                    SIGNAL_SOCK_TOKEN => {
                        while signal_sock.recv_from(&mut buf).is_ok() {}

                        if receiver.try_recv().is_ok() {
                            debug!("DNS-SD server on {} shutting down", addr);
                            return Err(Error::Canceled);
                        }
                    }
                    SERVICE_SOCK_TOKEN => loop {
                        let (len, from) = match sock.recv_from(&mut buf) {
                            Ok(received) => received,
                            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                            Err(e) => {
                                debug!("error receiving DNS request: {}", e);
                                break;
                            }
                        };

                        trace!("received {} bytes from {}", len, from);

                        let Some(res) = self.build_response(&buf[..len]) else {
                            continue;
                        };

                        match res.to_vec() {
                            Ok(data) => self.send_response(&sock, &data, from),
                            Err(e) => debug!("failed to encode response: {}", e),
                        }
                    },
                    _ => {}
                }
            }
        }
    }

    /// Builds the response to send in reply to the given request, or
    /// `None` if the request does not warrant a reply.
    fn build_response(&self, data: &[u8]) -> Option<Message> {
        let req = match Message::from_vec(data) {
            Ok(req) => req,
            Err(e) => {
                debug!("failed to decode DNS request: {}", e);
                return None;
            }
        };

        // Only queries with exactly one question are served. The RFC
        // allows for multiple questions, but in practice this is
        // nonsensical; see RFC 1035 and the discussion at
        // https://stackoverflow.com/a/4085631.
        if req.queries().len() != 1 {
            return None;
        }

        let query = &req.queries()[0];

        let mut res = Message::new();
        res.set_id(req.id())
            .set_message_type(MessageType::Response)
            .set_op_code(req.op_code())
            .set_recursion_desired(req.recursion_desired())
            .set_recursion_available(false)
            .set_authoritative(true);
        res.add_query(query.clone());

        if query.query_class() != DNSClass::IN && query.query_class() != DNSClass::ANY {
            res.set_response_code(ResponseCode::NXDomain);
            return Some(res);
        }

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);

        let Some(by_type) = state.records.get(query.name()) else {
            res.set_response_code(ResponseCode::NXDomain);
            return Some(res);
        };

        // Answers are always clones: the index may be mutated as soon as
        // the read lock is released.
        if query.query_type() == RecordType::ANY {
            for records in by_type.values() {
                for rr in records {
                    res.add_answer(rr.clone());
                }
            }
        } else if let Some(records) = by_type.get(&query.query_type()) {
            for rr in records {
                res.add_answer(rr.clone());
            }
        }

        Some(res)
    }

    /// Sends a response, retrying for up to the per-request timeout while
    /// the socket is not writable.
    fn send_response(&self, sock: &MioUdpSocket, data: &[u8], to: SocketAddr) {
        let deadline = Instant::now() + self.timeout;

        loop {
            match sock.send_to(data, to) {
                Ok(_) => return,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        && Instant::now() < deadline =>
                {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    debug!("failed to send response to {}: {}", to, e);
                    return;
                }
            }
        }
    }
}

impl Default for UnicastServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Advertiser for UnicastServer {
    fn advertise(&self, instance: &ServiceInstance, options: &AdvertiseOptions) -> Result<bool> {
        UnicastServer::advertise(self, instance, options)
    }

    fn unadvertise(&self, instance: &ServiceInstance) -> Result<bool> {
        UnicastServer::unadvertise(self, instance)
    }
}

impl State {
    /// Returns true if every one of `records` is already present, compared
    /// by serialized record equality rather than identity, so records
    /// built by any equivalent prior advertise match.
    fn has_records(&self, records: &[Record]) -> bool {
        records.iter().all(|rr| self.has_record(rr))
    }

    fn has_record(&self, rr: &Record) -> bool {
        self.records
            .get(rr.name())
            .and_then(|by_type| by_type.get(&rr.record_type()))
            .map(|records| records.contains(rr))
            .unwrap_or(false)
    }

    fn add_record(&mut self, rr: Record) {
        self.records
            .entry(rr.name().clone())
            .or_default()
            .entry(rr.record_type())
            .or_default()
            .push(rr);
    }

    fn remove_record(&mut self, rr: &Record) {
        let Some(by_type) = self.records.get_mut(rr.name()) else {
            return;
        };

        if let Some(records) = by_type.get_mut(&rr.record_type()) {
            if let Some(i) = records.iter().position(|x| x == rr) {
                records.swap_remove(i);
            }

            if records.is_empty() {
                by_type.remove(&rr.record_type());
            }
        }

        if by_type.is_empty() {
            self.records.remove(rr.name());
        }
    }

    /// Removes an instance and every record associated with it, dropping
    /// the service type's presence record when the last instance of the
    /// type goes away.
    fn remove_instance(&mut self, name: &Name) -> bool {
        let Some(entry) = self.instances.remove(name) else {
            return false;
        };

        let dropped_type_ptr = match self.services.get_mut(&entry.enum_domain) {
            Some(service) => {
                service.instance_count -= 1;
                (service.instance_count == 0).then(|| service.type_ptr.clone())
            }
            None => None,
        };

        if let Some(type_ptr) = dropped_type_ptr {
            self.remove_record(&type_ptr);
            self.services.remove(&entry.enum_domain);
        }

        for rr in &entry.records {
            self.remove_record(rr);
        }

        true
    }
}

/// Creates the nonblocking UDP socket the server listens on.
fn new_socket(addr: SocketAddr) -> Result<socket2::Socket> {
    let domain = match addr {
        SocketAddr::V4(_) => socket2::Domain::IPV4,
        SocketAddr::V6(_) => socket2::Domain::IPV6,
    };

    let fd = socket2::Socket::new(domain, socket2::Type::DGRAM, None)
        .map_err(|e| e_fmt!("create socket failed: {}", e))?;

    fd.set_reuse_address(true)
        .map_err(|e| e_fmt!("set ReuseAddr failed: {}", e))?;

    fd.set_nonblocking(true)
        .map_err(|e| e_fmt!("set O_NONBLOCK: {}", e))?;

    fd.bind(&addr.into())
        .map_err(|e| e_fmt!("socket bind to {} failed: {}", &addr, e))?;

    trace!("new socket bound to {}", &addr);
    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Attributes, ServiceInstanceName};
    use hickory_proto::op::{OpCode, Query};
    use hickory_proto::rr::RData;

    fn instance(name: &str, service_type: &str, host: &str) -> ServiceInstance {
        ServiceInstance {
            name: ServiceInstanceName {
                name: name.to_string(),
                service_type: service_type.to_string(),
                domain: "example.org".to_string(),
            },
            target_host: host.to_string(),
            target_port: 12345,
            priority: 10,
            weight: 20,
            attributes: vec![Attributes::new().with_pair("<key>", name)].into(),
            ttl: Duration::ZERO,
        }
    }

    fn request(name: &str, qtype: RecordType, qclass: DNSClass) -> Vec<u8> {
        let mut req = Message::new();
        req.set_id(42)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);

        let mut q = Query::query(Name::from_ascii(name).unwrap(), qtype);
        q.set_query_class(qclass);
        req.add_query(q);

        req.to_vec().unwrap()
    }

    fn record_count(server: &UnicastServer) -> usize {
        let state = server.state.read().unwrap();
        state
            .records
            .values()
            .flat_map(|by_type| by_type.values())
            .map(Vec::len)
            .sum()
    }

    #[test]
    fn advertise_is_idempotent() {
        let server = UnicastServer::new();
        let a = instance("Instance A", "_http._tcp", "a.example.com");
        let options = AdvertiseOptions::new();

        assert_eq!(server.advertise(&a, &options), Ok(true));
        let count = record_count(&server);

        assert_eq!(server.advertise(&a, &options), Ok(false));
        assert_eq!(record_count(&server), count);
    }

    #[test]
    fn advertise_replaces_an_instance_with_the_same_name() {
        let server = UnicastServer::new();
        let options = AdvertiseOptions::new();

        let a = instance("Instance A", "_http._tcp", "a.example.com");
        assert_eq!(server.advertise(&a, &options), Ok(true));

        let mut changed = a.clone();
        changed.target_port = 54321;
        assert_eq!(server.advertise(&changed, &options), Ok(true));

        let state = server.state.read().unwrap();
        let name = instance_fqdn(&a.name).unwrap();
        let srvs = &state.records[&name][&RecordType::SRV];
        assert_eq!(srvs.len(), 1);
        match srvs[0].data() {
            Some(RData::SRV(srv)) => assert_eq!(srv.port(), 54321),
            other => panic!("unexpected rdata: {:?}", other),
        }

        // Still a single instance of the type.
        let enum_domain =
            crate::records::enum_domain_fqdn("_http._tcp", "example.org").unwrap();
        assert_eq!(state.services[&enum_domain].instance_count, 1);
    }

    #[test]
    fn service_type_presence_is_reference_counted() {
        let server = UnicastServer::new();
        let options = AdvertiseOptions::new();

        let a = instance("Instance A", "_http._tcp", "a.example.com");
        let b = instance("Instance B", "_http._tcp", "b.example.com");
        let c = instance("Instance C", "_other._udp", "c.example.com");

        server.advertise(&a, &options).unwrap();
        server.advertise(&b, &options).unwrap();
        server.advertise(&c, &options).unwrap();

        let type_enum = crate::records::type_enum_fqdn("example.org").unwrap();

        {
            let state = server.state.read().unwrap();
            assert_eq!(state.records[&type_enum][&RecordType::PTR].len(), 2);
        }

        // One _http._tcp instance remains, so its type PTR stays.
        assert_eq!(server.unadvertise(&a), Ok(true));
        {
            let state = server.state.read().unwrap();
            assert_eq!(state.records[&type_enum][&RecordType::PTR].len(), 2);
        }

        // The last _http._tcp instance goes away, and so does the PTR.
        assert_eq!(server.unadvertise(&b), Ok(true));
        {
            let state = server.state.read().unwrap();
            let ptrs = &state.records[&type_enum][&RecordType::PTR];
            assert_eq!(ptrs.len(), 1);
            match ptrs[0].data() {
                Some(RData::PTR(ptr)) => assert_eq!(
                    ptr.0,
                    Name::from_ascii("_other._udp.example.org.").unwrap()
                ),
                other => panic!("unexpected rdata: {:?}", other),
            }
        }

        assert_eq!(server.unadvertise(&c), Ok(true));
        let state = server.state.read().unwrap();
        assert!(state.records.is_empty());
        assert!(state.services.is_empty());
        assert!(state.instances.is_empty());
    }

    #[test]
    fn unadvertise_of_an_unknown_instance_changes_nothing() {
        let server = UnicastServer::new();
        let a = instance("Instance A", "_http._tcp", "a.example.com");
        assert_eq!(server.unadvertise(&a), Ok(false));
    }

    #[test]
    fn requests_without_exactly_one_question_are_dropped() {
        let server = UnicastServer::new();

        let mut req = Message::new();
        req.set_id(7)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query);
        assert!(server.build_response(&req.to_vec().unwrap()).is_none());

        req.add_query(Query::query(
            Name::from_ascii("a.example.org.").unwrap(),
            RecordType::A,
        ));
        req.add_query(Query::query(
            Name::from_ascii("b.example.org.").unwrap(),
            RecordType::A,
        ));
        assert!(server.build_response(&req.to_vec().unwrap()).is_none());
    }

    #[test]
    fn unsupported_question_classes_get_a_name_error() {
        let server = UnicastServer::new();
        let a = instance("Instance A", "_http._tcp", "a.example.com");
        server.advertise(&a, &AdvertiseOptions::new()).unwrap();

        let res = server
            .build_response(&request(
                "Instance\\ A._http._tcp.example.org.",
                RecordType::ANY,
                DNSClass::CH,
            ))
            .unwrap();

        assert_eq!(res.response_code(), ResponseCode::NXDomain);
        assert!(res.answers().is_empty());
    }

    #[test]
    fn unknown_names_get_a_name_error() {
        let server = UnicastServer::new();
        let a = instance("Instance A", "_http._tcp", "a.example.com");
        server.advertise(&a, &AdvertiseOptions::new()).unwrap();

        let res = server
            .build_response(&request(
                "nope._http._tcp.example.org.",
                RecordType::ANY,
                DNSClass::IN,
            ))
            .unwrap();

        assert_eq!(res.response_code(), ResponseCode::NXDomain);
    }

    #[test]
    fn known_names_without_the_requested_type_get_an_empty_answer() {
        let server = UnicastServer::new();
        let a = instance("Instance A", "_http._tcp", "a.example.com");
        server.advertise(&a, &AdvertiseOptions::new()).unwrap();

        let res = server
            .build_response(&request(
                "Instance\\ A._http._tcp.example.org.",
                RecordType::A,
                DNSClass::IN,
            ))
            .unwrap();

        assert_eq!(res.response_code(), ResponseCode::NoError);
        assert!(res.answers().is_empty());
    }

    #[test]
    fn any_queries_concatenate_all_record_types() {
        let server = UnicastServer::new();
        let a = instance("Instance A", "_http._tcp", "a.example.com");
        server.advertise(&a, &AdvertiseOptions::new()).unwrap();

        let res = server
            .build_response(&request(
                "Instance\\ A._http._tcp.example.org.",
                RecordType::ANY,
                DNSClass::ANY,
            ))
            .unwrap();

        assert!(res.authoritative());
        assert!(!res.recursion_available());

        let types: Vec<_> = res.answers().iter().map(Record::record_type).collect();
        assert_eq!(types.len(), 2);
        assert!(types.contains(&RecordType::SRV));
        assert!(types.contains(&RecordType::TXT));
    }
}
