//! Synthesis of DNS resource records from a service instance.
//!
//! A single [`ServiceInstance`] projects onto a set of records: one PTR at
//! the instance enumeration domain, one SRV and one or more TXT records at
//! the instance name, optionally PTR records at selective (sub-type)
//! enumeration domains and A/AAAA records at the target host.
//!
//! Owner names are composed label by label rather than by parsing escaped
//! presentation strings, so instance labels may contain dots, spaces or
//! arbitrary UTF-8 without any escaping at this layer.

use std::net::IpAddr;
use std::time::Duration;

use hickory_proto::rr::rdata::{A, AAAA, PTR, SRV, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record};

use crate::advertiser::AdvertiseOptions;
use crate::instance::{ServiceInstance, ServiceInstanceName, DEFAULT_TTL};
use crate::{Error, Result};

/// Returns all of the records that advertise the given service instance:
/// the instance PTR, SRV and TXT records, plus sub-type PTR records and
/// A/AAAA records for each advertise option.
///
/// Each advertised IP address produces exactly one address record: an A
/// record when the address has an IPv4 form, an AAAA record otherwise.
pub fn new_records(i: &ServiceInstance, options: &AdvertiseOptions) -> Result<Vec<Record>> {
    let mut records = vec![new_ptr_record(i)?, new_srv_record(i)?];
    records.extend(new_txt_records(i)?);

    for sub_type in options.service_sub_types() {
        records.push(new_sub_type_ptr_record(i, sub_type)?);
    }

    for &ip in options.ip_addresses() {
        let has_v4_form = match ip {
            IpAddr::V4(_) => true,
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some(),
        };

        if has_v4_form {
            records.push(new_a_record(i, ip)?);
        } else {
            records.push(new_aaaa_record(i, ip)?);
        }
    }

    Ok(records)
}

/// Returns the PTR record for a service instance, owned by the instance
/// enumeration domain.
///
/// See RFC 6763 section 4.1.
pub fn new_ptr_record(i: &ServiceInstance) -> Result<Record> {
    Ok(make_record(
        enum_domain_fqdn(&i.name.service_type, &i.name.domain)?,
        i.ttl,
        RData::PTR(PTR(instance_fqdn(&i.name)?)),
    ))
}

/// Returns the SRV record for a service instance.
///
/// See RFC 6763 section 5.
pub fn new_srv_record(i: &ServiceInstance) -> Result<Record> {
    Ok(make_record(
        instance_fqdn(&i.name)?,
        i.ttl,
        RData::SRV(SRV::new(
            i.priority,
            i.weight,
            i.target_port,
            host_fqdn(&i.target_host)?,
        )),
    ))
}

/// Returns the TXT records for a service instance, one per non-empty
/// attribute set.
///
/// If the instance has no non-empty attribute sets, a single TXT record
/// containing one empty string is returned: RFC 6763 section 6.1 requires
/// every service instance to have at least one TXT record.
pub fn new_txt_records(i: &ServiceInstance) -> Result<Vec<Record>> {
    let owner = instance_fqdn(&i.name)?;
    let mut records = Vec::new();

    for attrs in &i.attributes {
        if attrs.is_empty() {
            continue;
        }

        let strings = attrs.to_txt();
        records.push(make_record(
            owner.clone(),
            i.ttl,
            RData::TXT(TXT::from_bytes(strings.iter().map(Vec::as_slice).collect())),
        ));
    }

    if records.is_empty() {
        records.push(make_record(
            owner,
            i.ttl,
            RData::TXT(TXT::new(vec![String::new()])),
        ));
    }

    Ok(records)
}

/// Returns a PTR record that tags the instance with a service sub-type,
/// owned by the selective instance enumeration domain.
///
/// See RFC 6763 section 7.1.
pub fn new_sub_type_ptr_record(i: &ServiceInstance, sub_type: &str) -> Result<Record> {
    Ok(make_record(
        selective_enum_fqdn(sub_type, &i.name.service_type, &i.name.domain)?,
        i.ttl,
        RData::PTR(PTR(instance_fqdn(&i.name)?)),
    ))
}

/// Returns an A record that maps the instance's target host to `ip`.
///
/// Panics if `ip` has no IPv4 form. Passing such an address is a
/// programming error; [`new_records`] routes addresses to the correct
/// record type.
pub fn new_a_record(i: &ServiceInstance, ip: IpAddr) -> Result<Record> {
    let v4 = match ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4,
            None => panic!("IP address is not a valid IPv4 address"),
        },
    };

    Ok(make_record(
        host_fqdn(&i.target_host)?,
        i.ttl,
        RData::A(A(v4)),
    ))
}

/// Returns an AAAA record that maps the instance's target host to `ip`.
///
/// An IPv4 address is published in its IPv4-mapped IPv6 form.
pub fn new_aaaa_record(i: &ServiceInstance, ip: IpAddr) -> Result<Record> {
    let v6 = match ip {
        IpAddr::V6(v6) => v6,
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
    };

    Ok(make_record(
        host_fqdn(&i.target_host)?,
        i.ttl,
        RData::AAAA(AAAA(v6)),
    ))
}

/// Returns the PTR record that advertises the presence of a service type
/// within a domain, owned by the type enumeration domain.
///
/// See RFC 6763 section 9.
pub fn new_service_type_ptr_record(
    service_type: &str,
    domain: &str,
    ttl: Duration,
) -> Result<Record> {
    Ok(make_record(
        type_enum_fqdn(domain)?,
        ttl,
        RData::PTR(PTR(enum_domain_fqdn(service_type, domain)?)),
    ))
}

fn make_record(owner: Name, ttl: Duration, rdata: RData) -> Record {
    let mut rr = Record::from_rdata(owner, ttl_in_seconds(ttl), rdata);
    rr.set_dns_class(DNSClass::IN);
    rr
}

/// Returns `ttl` as a whole number of seconds for use within a DNS record,
/// substituting [`DEFAULT_TTL`] when the duration is zero.
fn ttl_in_seconds(ttl: Duration) -> u32 {
    let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
    ttl.as_secs() as u32
}

/// Returns the wire form of a fully-qualified service instance name.
pub(crate) fn instance_fqdn(name: &ServiceInstanceName) -> Result<Name> {
    let mut labels: Vec<&[u8]> = vec![name.name.as_bytes()];
    push_labels(&mut labels, &name.service_type);
    push_labels(&mut labels, &name.domain);
    name_from_labels(labels)
}

/// Returns the wire form of the instance enumeration domain for a service
/// type.
pub(crate) fn enum_domain_fqdn(service_type: &str, domain: &str) -> Result<Name> {
    let mut labels: Vec<&[u8]> = Vec::new();
    push_labels(&mut labels, service_type);
    push_labels(&mut labels, domain);
    name_from_labels(labels)
}

/// Returns the wire form of the type enumeration domain for a domain.
pub(crate) fn type_enum_fqdn(domain: &str) -> Result<Name> {
    let mut labels: Vec<&[u8]> = vec![b"_services", b"_dns-sd", b"_udp"];
    push_labels(&mut labels, domain);
    name_from_labels(labels)
}

/// Returns the wire form of the selective instance enumeration domain for
/// a service sub-type.
pub(crate) fn selective_enum_fqdn(
    sub_type: &str,
    service_type: &str,
    domain: &str,
) -> Result<Name> {
    let mut labels: Vec<&[u8]> = vec![sub_type.as_bytes(), b"_sub"];
    push_labels(&mut labels, service_type);
    push_labels(&mut labels, domain);
    name_from_labels(labels)
}

/// Returns the wire form of a hostname, fully qualified.
pub(crate) fn host_fqdn(host: &str) -> Result<Name> {
    let mut name =
        Name::from_ascii(host).map_err(|e| Error::InvalidName(format!("{}: {}", host, e)))?;
    name.set_fqdn(true);
    Ok(name)
}

fn push_labels<'a>(labels: &mut Vec<&'a [u8]>, domain: &'a str) {
    labels.extend(domain.trim_end_matches('.').split('.').map(str::as_bytes));
}

fn name_from_labels(labels: Vec<&[u8]>) -> Result<Name> {
    let mut name = Name::from_labels(labels).map_err(|e| Error::InvalidName(e.to_string()))?;
    name.set_fqdn(true);
    Ok(name)
}
