//! Composition and parsing of DNS-SD domain names.
//!
//! Naming conventions in this crate follow RFC 6763 section 4.1:
//!
//! - "instance enumeration domain": `<service>.<domain>`, queried with PTR
//!   to browse instances of one service type.
//! - "type enumeration domain": `_services._dns-sd._udp.<domain>`, queried
//!   with PTR to discover which service types exist at all.
//! - "service instance name": `<instance>.<service>.<domain>`, where the
//!   `<instance>` label is user-facing UTF-8 and must be escaped.

use crate::{Error, Result};

/// Characters that must be escaped when an `<instance>` label is embedded
/// in a DNS name. See RFC 6763 section 4.3.
const NEEDS_ESCAPE: &str = ". '@;()\"\\";

/// Escapes a service instance name for use within DNS records.
///
/// Literal dots and backslashes (and a few other characters that confuse
/// zone-file style parsers) are preceded with a backslash, per the
/// customary DNS convention described in RFC 6763 section 4.3.
pub fn escape_instance(instance: &str) -> String {
    let mut w = String::with_capacity(instance.len());

    for ch in instance.chars() {
        if NEEDS_ESCAPE.contains(ch) {
            w.push('\\');
        }
        w.push(ch);
    }

    w
}

/// Parses the `<instance>` portion of a service instance name.
///
/// `name` must be either an escaped `<instance>` label, or a full service
/// instance name beginning with one. Parsing stops at the first unescaped
/// dot.
///
/// Returns the unescaped instance name and the remaining unparsed portion
/// of `name`, not including the separating dot. The tail is empty if
/// `name` contains no unescaped dots.
///
/// Fails with [`Error::TerminatingEscape`] if the input ends while an
/// escape sequence is open.
pub fn parse_instance(name: &str) -> Result<(String, String)> {
    let mut w = String::with_capacity(name.len());
    let mut tail = "";
    let mut escaped = false;

    for (i, ch) in name.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
            continue;
        } else if ch == '.' {
            tail = &name[i + 1..];
            break;
        }

        w.push(ch);
    }

    if escaped {
        return Err(Error::TerminatingEscape);
    }

    Ok((w, tail.to_string()))
}

/// Returns the DNS name that is queried to perform "service type
/// enumeration" for a domain, i.e. to find all of the service types that
/// are advertised within it.
///
/// See RFC 6763 section 9.
pub fn type_enumeration_domain(domain: &str) -> String {
    format!("_services._dns-sd._udp.{}", domain)
}

/// Returns [`type_enumeration_domain`] as an absolute name, with the
/// trailing dot.
pub fn absolute_type_enumeration_domain(domain: &str) -> String {
    format!("{}.", type_enumeration_domain(domain))
}

/// Returns the DNS name that is queried to perform "service instance
/// enumeration" (browsing) for a service type and domain.
///
/// See RFC 6763 section 4.
pub fn instance_enumeration_domain(service_type: &str, domain: &str) -> String {
    format!("{}.{}", service_type, domain)
}

/// Returns [`instance_enumeration_domain`] as an absolute name, with the
/// trailing dot.
pub fn absolute_instance_enumeration_domain(service_type: &str, domain: &str) -> String {
    format!("{}.", instance_enumeration_domain(service_type, domain))
}

/// Returns the DNS name that is queried to perform "selective instance
/// enumeration" for a service sub-type.
///
/// Selective instance enumeration is like browsing, but the results are
/// narrowed to instances tagged with the sub-type. For example, browsing
/// finds every `_http._tcp` instance, while selective enumeration under
/// `_printer._sub._http._tcp` finds only the web servers that are printer
/// control panels.
///
/// See RFC 6763 section 7.1.
pub fn selective_instance_enumeration_domain(
    sub_type: &str,
    service_type: &str,
    domain: &str,
) -> String {
    format!(
        "{}._sub.{}",
        sub_type,
        instance_enumeration_domain(service_type, domain)
    )
}

/// Returns [`selective_instance_enumeration_domain`] as an absolute name,
/// with the trailing dot.
pub fn absolute_selective_instance_enumeration_domain(
    sub_type: &str,
    service_type: &str,
    domain: &str,
) -> String {
    format!(
        "{}.",
        selective_instance_enumeration_domain(sub_type, service_type, domain)
    )
}

/// Returns the DNS name that is queried to look up records about a single
/// service instance, relative to the domain in which it is published.
pub fn relative_service_instance_name(instance: &str, service_type: &str) -> String {
    format!("{}.{}", escape_instance(instance), service_type)
}

/// Returns the fully-qualified DNS name that is queried to look up records
/// about a single service instance, with the trailing dot.
///
/// See RFC 6763 section 4.1.
pub fn absolute_service_instance_name(instance: &str, service_type: &str, domain: &str) -> String {
    format!(
        "{}.{}.",
        escape_instance(instance),
        instance_enumeration_domain(service_type, domain)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_passes_ordinary_names_through() {
        assert_eq!(escape_instance("plain"), "plain");
        assert_eq!(escape_instance("Boardroom-Printer_2"), "Boardroom-Printer_2");
    }

    #[test]
    fn escape_prefixes_special_characters() {
        assert_eq!(escape_instance("Boardroom Printer"), "Boardroom\\ Printer");
        assert_eq!(escape_instance("a.b"), "a\\.b");
        assert_eq!(escape_instance("a\\b"), "a\\\\b");
        assert_eq!(
            escape_instance(r#"it's @home; (v2) "x""#),
            r#"it\'s\ \@home\;\ \(v2\)\ \"x\""#
        );
    }

    #[test]
    fn parse_stops_at_the_first_unescaped_dot() {
        let (instance, tail) = parse_instance("Instance\\ A._http._tcp.example.org.").unwrap();
        assert_eq!(instance, "Instance A");
        assert_eq!(tail, "_http._tcp.example.org.");
    }

    #[test]
    fn parse_unescapes_dots_and_backslashes() {
        let (instance, tail) = parse_instance("a\\.b\\\\c").unwrap();
        assert_eq!(instance, "a.b\\c");
        assert_eq!(tail, "");
    }

    #[test]
    fn parse_fails_on_terminating_escape() {
        assert_eq!(parse_instance("oops\\"), Err(Error::TerminatingEscape));
    }

    #[test]
    fn escape_round_trips_through_parse() {
        for name in ["Instance A", "dotty.name", "back\\slash", "(parens) 'quotes' \"too\"", "Ünïcode 🖨"] {
            let (parsed, tail) = parse_instance(&escape_instance(name)).unwrap();
            assert_eq!(parsed, name);
            assert_eq!(tail, "");
        }
    }

    #[test]
    fn enumeration_domains() {
        assert_eq!(
            type_enumeration_domain("example.org"),
            "_services._dns-sd._udp.example.org"
        );
        assert_eq!(
            instance_enumeration_domain("_http._tcp", "example.org"),
            "_http._tcp.example.org"
        );
        assert_eq!(
            selective_instance_enumeration_domain("_printer", "_http._tcp", "example.org"),
            "_printer._sub._http._tcp.example.org"
        );
        assert_eq!(
            absolute_instance_enumeration_domain("_http._tcp", "example.org"),
            "_http._tcp.example.org."
        );
    }

    #[test]
    fn service_instance_names() {
        assert_eq!(
            relative_service_instance_name("Instance A", "_http._tcp"),
            "Instance\\ A._http._tcp"
        );
        assert_eq!(
            absolute_service_instance_name("Instance A", "_http._tcp", "example.org"),
            "Instance\\ A._http._tcp.example.org."
        );
    }
}
