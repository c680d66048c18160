//! A DNS-SD resolver that uses conventional unicast DNS queries.

#[cfg(feature = "logging")]
use crate::log::debug;
use crate::{
    error::e_fmt,
    records::{enum_domain_fqdn, instance_fqdn, selective_enum_fqdn, type_enum_fqdn},
    Attributes, Error, Result, ServiceInstance, ServiceInstanceName, MAX_MSG_SIZE,
};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    sync::atomic::{AtomicBool, AtomicU16, Ordering},
    thread,
    time::{Duration, Instant},
};

/// The default time to allow for each DNS query, across all servers.
pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(2);

static NEXT_QUERY_ID: AtomicU16 = AtomicU16::new(1);

/// Makes DNS-SD queries using unicast DNS requests.
///
/// The resolver is configured with an ordered list of upstream server
/// endpoints. A query is answered by the first server that responds
/// authoritatively; servers that are unreachable or return other response
/// codes are skipped.
pub struct UnicastResolver {
    /// Upstream DNS servers as `host:port` endpoints, tried in order.
    servers: Vec<String>,

    timeout: Duration,
}

impl UnicastResolver {
    /// Creates a resolver that queries the given `host:port` endpoints in
    /// order.
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_RESOLVER_TIMEOUT,
        }
    }

    /// Replaces the per-query timeout, which defaults to
    /// [`DEFAULT_RESOLVER_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Finds all of the service types advertised within a single domain.
    ///
    /// Returns the discovered service types without the domain suffix,
    /// for example "_http._tcp".
    ///
    /// See RFC 6763 section 9.
    pub fn enumerate_service_types(&self, domain: &str) -> Result<Vec<String>> {
        let cancel = CancelToken::default();

        let Some(res) = self.query(&cancel, type_enum_fqdn(domain)?, RecordType::PTR)? else {
            return Ok(Vec::new());
        };

        let suffix: Vec<&[u8]> = domain
            .trim_end_matches('.')
            .split('.')
            .map(str::as_bytes)
            .collect();

        let mut service_types = Vec::with_capacity(res.answers().len());

        for rr in res.answers() {
            let Some(RData::PTR(ptr)) = rr.data() else {
                continue;
            };

            let labels: Vec<&[u8]> = ptr.0.iter().collect();
            if labels.len() <= suffix.len() {
                continue;
            }

            // Skip entries that do not carry the domain suffix.
            let split = labels.len() - suffix.len();
            let in_domain = labels[split..]
                .iter()
                .zip(&suffix)
                .all(|(a, b)| a.eq_ignore_ascii_case(b));
            if !in_domain {
                continue;
            }

            service_types.push(join_labels(&labels[..split]));
        }

        Ok(service_types)
    }

    /// Finds all of the instances of a given service type that are
    /// advertised within a single domain. This operation is also known as
    /// "browsing".
    ///
    /// Returns the unqualified instance names, for example
    /// "Boardroom Printer".
    ///
    /// See RFC 6763 section 4.
    pub fn enumerate_instances(&self, service_type: &str, domain: &str) -> Result<Vec<String>> {
        self.enumerate(enum_domain_fqdn(service_type, domain)?)
    }

    /// Finds all of the instances of a given service sub-type that are
    /// advertised within a single domain. This operation is also known as
    /// "selective instance enumeration" or "sub-type browsing".
    ///
    /// See RFC 6763 section 7.1.
    pub fn enumerate_instances_by_sub_type(
        &self,
        sub_type: &str,
        service_type: &str,
        domain: &str,
    ) -> Result<Vec<String>> {
        self.enumerate(selective_enum_fqdn(sub_type, service_type, domain)?)
    }

    /// Looks up the details of a specific service instance.
    ///
    /// Returns `Ok(None)` when the instance can not be resolved, which
    /// requires at least one SRV and one TXT record. The returned
    /// instance's TTL is the minimum TTL across all of its records.
    pub fn lookup_instance(
        &self,
        instance: &str,
        service_type: &str,
        domain: &str,
    ) -> Result<Option<ServiceInstance>> {
        let name = ServiceInstanceName {
            name: instance.to_string(),
            service_type: service_type.to_string(),
            domain: domain.to_string(),
        };
        let qname = instance_fqdn(&name)?;

        // SRV and TXT are queried separately rather than with a single ANY
        // query: servers are not required to return all records they hold
        // in response to ANY. See RFC 6762 section 6.5 for the common
        // misconception.
        let cancel = CancelToken::default();
        let (tx, rx) = flume::bounded::<Message>(2);

        let (srv_outcome, txt_outcome) = thread::scope(|s| {
            let srv = s.spawn(|| self.query_into(&cancel, &tx, qname.clone(), RecordType::SRV));
            let txt = s.spawn(|| self.query_into(&cancel, &tx, qname.clone(), RecordType::TXT));
            (
                srv.join().expect("SRV query thread panicked"),
                txt.join().expect("TXT query thread panicked"),
            )
        });

        // Prefer reporting the query failure that caused its sibling to be
        // canceled.
        match (srv_outcome, txt_outcome) {
            (Err(Error::Canceled), Err(e)) | (Err(e), _) | (_, Err(e)) => return Err(e),
            (Ok(()), Ok(())) => {}
        }

        let mut found = ServiceInstance {
            name,
            ttl: Duration::MAX,
            ..Default::default()
        };

        let mut has_srv = false;
        let mut has_txt = false;

        for res in rx.try_iter() {
            for rr in res.answers() {
                let ttl = Duration::from_secs(u64::from(rr.ttl()));
                if ttl < found.ttl {
                    found.ttl = ttl;
                }

                match rr.data() {
                    Some(RData::SRV(srv)) => {
                        has_srv = true;
                        found.target_host = join_labels(&srv.target().iter().collect::<Vec<_>>());
                        found.target_port = srv.port();
                        found.priority = srv.priority();
                        found.weight = srv.weight();
                    }
                    Some(RData::TXT(txt)) => {
                        has_txt = true;

                        let mut attrs = Attributes::new();
                        for s in txt.txt_data() {
                            let (next, _) = attrs.with_txt(s)?;
                            attrs = next;
                        }

                        if !attrs.is_empty() {
                            found.attributes.push(attrs);
                        }
                    }
                    _ => {}
                }
            }
        }

        if has_srv && has_txt {
            Ok(Some(found))
        } else {
            Ok(None)
        }
    }

    fn enumerate(&self, qname: Name) -> Result<Vec<String>> {
        let cancel = CancelToken::default();

        let Some(res) = self.query(&cancel, qname, RecordType::PTR)? else {
            return Ok(Vec::new());
        };

        let mut instances = Vec::with_capacity(res.answers().len());

        for rr in res.answers() {
            if let Some(RData::PTR(ptr)) = rr.data() {
                // The instance name is the first label of the PTR target,
                // carried verbatim on the wire with no escaping.
                if let Some(first) = ptr.0.iter().next() {
                    instances.push(String::from_utf8_lossy(first).into_owned());
                }
            }
        }

        Ok(instances)
    }

    /// Runs one query and forwards an authoritative reply to `tx`.
    fn query_into(
        &self,
        cancel: &CancelToken,
        tx: &flume::Sender<Message>,
        name: Name,
        qtype: RecordType,
    ) -> Result<()> {
        match self.query(cancel, name, qtype) {
            Ok(Some(res)) => {
                let _ = tx.try_send(res);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                cancel.cancel();
                Err(e)
            }
        }
    }

    /// Performs a DNS query against each of the configured servers in
    /// turn.
    ///
    /// Returns `Ok(None)` when no server produced an authoritative result.
    /// A server that responds with NOERROR or NXDOMAIN terminates the
    /// iteration: NOERROR with an empty answer section is a valid "no such
    /// record of this type", not an unknown name.
    fn query(
        &self,
        cancel: &CancelToken,
        name: Name,
        qtype: RecordType,
    ) -> Result<Option<Message>> {
        let id = NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed);

        let mut req = Message::new();
        req.set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);

        let mut q = Query::query(name, qtype);
        q.set_query_class(DNSClass::IN);
        req.add_query(q);

        let request = req
            .to_vec()
            .map_err(|e| e_fmt!("failed to encode DNS query: {}", e))?;

        for server in &self.servers {
            if cancel.is_canceled() {
                return Err(Error::Canceled);
            }

            match self.exchange(server, id, &request) {
                Ok(res)
                    if matches!(
                        res.response_code(),
                        ResponseCode::NoError | ResponseCode::NXDomain
                    ) =>
                {
                    return Ok(Some(res));
                }
                Ok(res) => {
                    debug!(
                        "server {} answered with rcode {:?}, trying next server",
                        server,
                        res.response_code()
                    );
                }
                Err(e) => {
                    debug!("failed to query server {}: {}", server, e);
                }
            }
        }

        Ok(None)
    }

    /// Sends one request to one server and waits for the matching reply.
    fn exchange(&self, server: &str, id: u16, request: &[u8]) -> std::io::Result<Message> {
        use std::io;

        let addr = server.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no usable address for {}", server),
            )
        })?;

        let bind_addr: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let sock = UdpSocket::bind(bind_addr)?;
        sock.set_write_timeout(Some(self.timeout))?;
        sock.connect(addr)?;
        sock.send(request)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; MAX_MSG_SIZE];

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "timed out waiting for a DNS response",
                ));
            }

            sock.set_read_timeout(Some(deadline - now))?;
            let len = sock.recv(&mut buf)?;

            // Ignore datagrams that are not the reply to this request.
            let Ok(res) = Message::from_vec(&buf[..len]) else {
                continue;
            };

            if res.id() == id && res.message_type() == MessageType::Response {
                return Ok(res);
            }
        }
    }
}

/// A cooperative cancellation flag shared between the per-record-type
/// query threads of a single lookup. Checked at every server iteration
/// boundary.
#[derive(Default)]
struct CancelToken(AtomicBool);

impl CancelToken {
    fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

fn join_labels(labels: &[&[u8]]) -> String {
    labels
        .iter()
        .map(|l| String::from_utf8_lossy(l))
        .collect::<Vec<_>>()
        .join(".")
}
