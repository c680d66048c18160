//! A library for DNS-SD (DNS-based Service Discovery, RFC 6763) over
//! conventional unicast DNS.
//!
//! Most DNS-SD deployments use Multicast DNS on the `local` domain. This
//! library instead targets the unicast side of RFC 6763: it provides an
//! authoritative DNS server that serves service-discovery records for a
//! zone, and a resolver that discovers and resolves service instances by
//! querying ordinary DNS servers.
//!
//! The building blocks are usable on their own:
//!
//! - [`Attributes`] / [`AttributeCollection`]: the key/value data
//!   conveyed in an instance's TXT records.
//! - [`ServiceInstance`]: the instance model, projected onto DNS records
//!   by the functions in the crate root ([`new_records`] and friends).
//! - [`UnicastServer`]: an authoritative responder. Instances can be
//!   advertised and unadvertised while the server is answering queries.
//! - [`UnicastResolver`]: composes PTR/SRV/TXT queries against configured
//!   upstream servers and reassembles complete service instances.
//! - [`Advertiser`]: the contract shared by the in-memory server and
//!   advertisers backed by hosted DNS providers.
//!
//! # Example: advertise and resolve a service
//!
//! ```no_run
//! use std::sync::Arc;
//! use unicast_dnssd::{
//!     AdvertiseOptions, Attributes, ServiceInstance, ServiceInstanceName,
//!     Shutdown, UnicastResolver, UnicastServer,
//! };
//!
//! let server = Arc::new(UnicastServer::new());
//!
//! let instance = ServiceInstance {
//!     name: ServiceInstanceName {
//!         name: "Boardroom Printer".to_string(),
//!         service_type: "_ipp._tcp".to_string(),
//!         domain: "example.org".to_string(),
//!     },
//!     target_host: "printer.example.com".to_string(),
//!     target_port: 631,
//!     attributes: vec![Attributes::new().with_pair("rp", "ipp/print")].into(),
//!     ..Default::default()
//! };
//!
//! server.advertise(&instance, &AdvertiseOptions::new())?;
//!
//! let (shutdown, signal) = Shutdown::new()?;
//! let handle = std::thread::spawn({
//!     let server = Arc::clone(&server);
//!     move || server.run(signal, "udp", "127.0.0.1:5300")
//! });
//!
//! let resolver = UnicastResolver::new(["127.0.0.1:5300"]);
//! for name in resolver.enumerate_instances("_ipp._tcp", "example.org")? {
//!     println!("found {}", name);
//! }
//!
//! shutdown.signal()?;
//! let _ = handle.join();
//! # Ok::<(), unicast_dnssd::Error>(())
//! ```
//!
//! # Limitations
//!
//! This implementation is based on the following RFCs:
//! - DNS-SD: [RFC 6763](https://tools.ietf.org/html/rfc6763)
//! - DNS:    [RFC 1035](https://tools.ietf.org/html/rfc1035)
//! - SRV:    [RFC 2782](https://tools.ietf.org/html/rfc2782)
//!
//! We focus on serving and consuming service-discovery records, and
//! currently have the following limitations:
//! - The server answers only for records it holds; there is no recursion
//!   or forwarding, no zone transfers and no DNSSEC.
//! - Only UDP transport is supported.

#![forbid(unsafe_code)]
#![allow(clippy::single_component_path_imports)]

// log for logging (optional).
#[cfg(feature = "logging")]
use log;

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace    ( ($($tt:tt)*) => {{}} );
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! info     ( ($($tt:tt)*) => {{}} );
    macro_rules! warn     ( ($($tt:tt)*) => {{}} );
    macro_rules! error    ( ($($tt:tt)*) => {{}} );
}

mod advertiser;
mod attributes;
mod changeset;
mod error;
mod instance;
mod name;
mod records;
mod resolver;
mod server;

pub use advertiser::{AdvertiseOptions, Advertiser};
pub use attributes::{AttributeCollection, Attributes};
pub use changeset::{ChangeSet, RecordUpdate};
pub use error::{Error, Result};
pub use instance::{ServiceInstance, ServiceInstanceName, DEFAULT_TTL};
pub use name::{
    absolute_instance_enumeration_domain, absolute_selective_instance_enumeration_domain,
    absolute_service_instance_name, absolute_type_enumeration_domain, escape_instance,
    instance_enumeration_domain, parse_instance, relative_service_instance_name,
    selective_instance_enumeration_domain, type_enumeration_domain,
};
pub use records::{
    new_a_record, new_aaaa_record, new_ptr_record, new_records, new_service_type_ptr_record,
    new_srv_record, new_sub_type_ptr_record, new_txt_records,
};
pub use resolver::{UnicastResolver, DEFAULT_RESOLVER_TIMEOUT};
pub use server::{Shutdown, ShutdownSignal, UnicastServer, DEFAULT_QUERY_TIMEOUT};

/// Record and domain name types from `hickory-proto`, re-exported for use
/// with the record synthesis functions and [`ChangeSet`].
pub use hickory_proto::rr::{Name, Record};

/// The largest DNS message this crate will send or receive over UDP.
pub(crate) const MAX_MSG_SIZE: usize = 4096;
