//! The semantic contract every advertiser implementation must obey,
//! exercised against the in-memory responder.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use unicast_dnssd::{
    AdvertiseOptions, Advertiser, Attributes, Error, ServiceInstance, ServiceInstanceName,
    Shutdown, UnicastResolver, UnicastServer,
};

fn instance(name: &str) -> ServiceInstance {
    ServiceInstance {
        name: ServiceInstanceName {
            name: name.to_string(),
            service_type: "_test._udp".to_string(),
            domain: "example.org".to_string(),
        },
        target_host: "host.example.com".to_string(),
        target_port: 1000,
        priority: 100,
        weight: 10,
        attributes: vec![Attributes::new().with_pair("txtvers", "1")].into(),
        ttl: Duration::from_secs(1),
    }
}

/// Asserts the advertise/unadvertise state transitions required of every
/// [`Advertiser`].
fn check_advertiser_contract(advertiser: &dyn Advertiser) {
    let options = AdvertiseOptions::new();
    let one = instance("instance-1");
    let two = instance("instance-2");

    // A fresh advertisement is a change; repeating it is not.
    assert_eq!(advertiser.advertise(&one, &options), Ok(true));
    assert_eq!(advertiser.advertise(&one, &options), Ok(false));

    // Any modified field under the same name overwrites the prior state.
    let mut moved = one.clone();
    moved.target_port = 1001;
    assert_eq!(advertiser.advertise(&moved, &options), Ok(true));

    let mut relabeled = moved.clone();
    relabeled.attributes = vec![Attributes::new().with_pair("txtvers", "2")].into();
    assert_eq!(advertiser.advertise(&relabeled, &options), Ok(true));
    assert_eq!(advertiser.advertise(&relabeled, &options), Ok(false));

    // Instances are tracked independently.
    assert_eq!(advertiser.advertise(&two, &options), Ok(true));
    assert_eq!(advertiser.unadvertise(&two), Ok(true));

    // Unadvertising reports a change only while state exists.
    assert_eq!(advertiser.unadvertise(&relabeled), Ok(true));
    assert_eq!(advertiser.unadvertise(&relabeled), Ok(false));
    assert_eq!(advertiser.unadvertise(&two), Ok(false));

    // A full re-advertise after removal is a change again.
    assert_eq!(advertiser.advertise(&one, &options), Ok(true));
    assert_eq!(advertiser.unadvertise(&one), Ok(true));
}

#[test]
fn the_unicast_server_honors_the_advertiser_contract() {
    let server = UnicastServer::new();
    check_advertiser_contract(&server);
}

#[test]
fn advertised_instances_converge_through_the_resolver() {
    let server = Arc::new(UnicastServer::new());
    let (shutdown, signal) = Shutdown::new().unwrap();

    let handle = thread::spawn({
        let server = Arc::clone(&server);
        move || server.run(signal, "udp", "127.0.0.1:65372")
    });
    thread::sleep(Duration::from_millis(100));

    let resolver = UnicastResolver::new(["127.0.0.1:65372"]);

    let one = instance("instance-1");
    let two = instance("instance-2");
    server.advertise(&one, &AdvertiseOptions::new()).unwrap();
    server.advertise(&two, &AdvertiseOptions::new()).unwrap();

    let mut found = resolver
        .enumerate_instances("_test._udp", "example.org")
        .unwrap();
    found.sort();
    assert_eq!(found, vec!["instance-1", "instance-2"]);

    let resolved = resolver
        .lookup_instance("instance-1", "_test._udp", "example.org")
        .unwrap()
        .expect("instance not found");
    assert_eq!(resolved, one);

    server.unadvertise(&one).unwrap();

    let found = resolver
        .enumerate_instances("_test._udp", "example.org")
        .unwrap();
    assert_eq!(found, vec!["instance-2"]);

    assert_eq!(
        resolver
            .lookup_instance("instance-1", "_test._udp", "example.org")
            .unwrap(),
        None
    );

    shutdown.signal().unwrap();
    assert_eq!(handle.join().unwrap(), Err(Error::Canceled));
}
