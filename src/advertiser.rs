//! The advertiser interface shared by the in-memory responder and by
//! provider-backed advertisers.

use std::net::IpAddr;

use crate::{Result, ServiceInstance};

/// An interface for advertising DNS-SD service instances via a unicast DNS
/// provider.
///
/// Implementations must obey the following contract:
///
/// - [`advertise`](Advertiser::advertise) is idempotent: a second call
///   with an identical instance returns `false` and makes no backend
///   changes.
/// - A call with the same instance name but any other field modified
///   overwrites the prior state and returns `true`.
/// - [`unadvertise`](Advertiser::unadvertise) returns `false` only when no
///   state existed for the instance.
/// - An advertiser that does not control the instance's domain fails with
///   [`Error::UnsupportedDomain`](crate::Error::UnsupportedDomain) before
///   mutating any backend state.
pub trait Advertiser {
    /// Creates and/or updates DNS records to advertise the given service
    /// instance.
    ///
    /// Returns true if any changes to DNS records were made, or false if
    /// the service was already advertised as-is.
    fn advertise(&self, instance: &ServiceInstance, options: &AdvertiseOptions) -> Result<bool>;

    /// Removes and/or updates DNS records to stop advertising the given
    /// service instance.
    ///
    /// Returns true if any changes to DNS records were made, or false if
    /// the service was not advertised.
    fn unadvertise(&self, instance: &ServiceInstance) -> Result<bool>;
}

/// Options that change how a service instance is advertised.
#[derive(Clone, Debug, Default)]
pub struct AdvertiseOptions {
    ip_addresses: Vec<IpAddr>,
    sub_types: Vec<String>,
}

impl AdvertiseOptions {
    /// Returns a new empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a DNS A or AAAA record that maps the service's hostname to the
    /// given IP address.
    pub fn with_ip_address(mut self, ip: IpAddr) -> Self {
        self.ip_addresses.push(ip);
        self
    }

    /// Advertises the service as providing a specific service sub-type,
    /// for example "_printer".
    ///
    /// See RFC 6763 section 7.1.
    pub fn with_service_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_types.push(sub_type.into());
        self
    }

    /// The IP addresses to publish for the service's hostname.
    pub fn ip_addresses(&self) -> &[IpAddr] {
        &self.ip_addresses
    }

    /// The service sub-types the instance is tagged with.
    pub fn service_sub_types(&self) -> &[String] {
        &self.sub_types
    }
}
