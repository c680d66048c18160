//! The DNS-SD service instance model.

use std::time::Duration;

use crate::attributes::AttributeCollection;
use crate::name::{absolute_service_instance_name, relative_service_instance_name};

/// A fully-qualified DNS-SD service instance name.
///
/// This is the `<instance>.<service>.<domain>` triple described in RFC
/// 6763 section 4.1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ServiceInstanceName {
    /// The service instance's unqualified name, for example
    /// "Boardroom Printer".
    ///
    /// This is user-facing UTF-8; literal dots and backslashes are escaped
    /// when the name is embedded in a DNS name.
    pub name: String,

    /// The type of service that the instance provides, for example
    /// "_http._tcp" or "_airplay._tcp".
    pub service_type: String,

    /// The domain under which the instance is advertised, that is, the
    /// domain name that contains the instance's PTR, SRV and TXT records.
    ///
    /// Often "local" when using Multicast DNS, but may be any valid
    /// domain.
    pub domain: String,
}

impl ServiceInstanceName {
    /// Returns the fully-qualified DNS name that is queried to look up
    /// records about this instance, including the trailing dot.
    pub fn absolute(&self) -> String {
        absolute_service_instance_name(&self.name, &self.service_type, &self.domain)
    }

    /// Returns the DNS name of this instance relative to the domain in
    /// which its records are published.
    pub fn relative(&self) -> String {
        relative_service_instance_name(&self.name, &self.service_type)
    }
}

/// The default time-to-live for DNS-SD records: 2 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

/// A DNS-SD service instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceInstance {
    /// The instance's fully-qualified name.
    pub name: ServiceInstanceName,

    /// The fully-qualified hostname of the machine that hosts the service,
    /// without the trailing dot.
    ///
    /// This is not necessarily within the same domain as the DNS-SD
    /// records themselves.
    pub target_host: String,

    /// The TCP or UDP port on which the service is provided.
    pub target_port: u16,

    /// The priority of the instance within the pool of instances that
    /// offer the same service in the same domain. Lower values have a
    /// higher priority. See RFC 2782.
    pub priority: u16,

    /// The weight of the instance among instances with the same priority.
    /// Higher values are more likely to be chosen. See RFC 2782.
    pub weight: u16,

    /// Additional information about the instance, one attribute set per
    /// TXT record. An empty collection is published as a single empty TXT
    /// record, per RFC 6763 section 6.1.
    pub attributes: AttributeCollection,

    /// The time-to-live of the instance's DNS records.
    ///
    /// A zero duration means "unspecified": record synthesis substitutes
    /// [`DEFAULT_TTL`].
    pub ttl: Duration,
}
