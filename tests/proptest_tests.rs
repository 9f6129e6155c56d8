//! Property-based tests for Stacksmith using proptest.
//!
//! Random inputs for the parsers and resolvers at the configuration boundary,
//! plus tag propagation over whole compositions.

mod common;

use indexmap::IndexMap;
use proptest::prelude::*;
use stacksmith::stacks::instance_type::normalize_size;
use stacksmith::stacks::{InstanceClass, InstanceSize, InstanceType, Ipv4Network, PortRange};
use stacksmith::tags::CATEGORY_TAG_KEY;
use std::net::Ipv4Addr;

// ============================================================================
// Strategies for generating test data
// ============================================================================

fn instance_class() -> impl Strategy<Value = InstanceClass> {
    prop::sample::select(InstanceClass::ALL.to_vec())
}

fn instance_size() -> impl Strategy<Value = InstanceSize> {
    prop::sample::select(InstanceSize::ALL.to_vec())
}

/// Tag keys and optional values
fn tag_map() -> impl Strategy<Value = IndexMap<String, Option<String>>> {
    prop::collection::vec(
        (
            "[a-z][a-z0-9-]{0,15}",
            prop::option::of("[ -~]{0,20}"),
        ),
        0..6,
    )
    .prop_map(|pairs| pairs.into_iter().collect())
}

// ============================================================================
// Port ranges
// ============================================================================

mod port_ranges {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: "N-M" parses to from=N, to=M
        #[test]
        fn range_bounds_are_kept(a in any::<u16>(), b in any::<u16>()) {
            let (from, to) = (a.min(b), a.max(b));
            let range = PortRange::parse(&format!("{}-{}", from, to)).unwrap();
            prop_assert_eq!(range.from_port, from);
            prop_assert_eq!(range.to_port, to);
        }

        /// Property: a bare "N" parses to from=to=N
        #[test]
        fn single_port(port in any::<u16>()) {
            let range = PortRange::parse(&port.to_string()).unwrap();
            prop_assert_eq!(range.from_port, port);
            prop_assert_eq!(range.to_port, port);
            prop_assert_eq!(range.to_string(), port.to_string());
        }

        /// Property: reversed bounds are rejected
        #[test]
        fn reversed_range_rejected(a in 1..=u16::MAX, delta in 1..1000u16) {
            let b = a.saturating_sub(delta);
            prop_assume!(b < a);
            let spec = format!("{}-{}", a, b);
            prop_assert!(PortRange::parse(&spec).is_err());
        }

        /// Property: parsing arbitrary text never panics
        #[test]
        fn parsing_never_panics(spec in "\\PC{0,30}") {
            let _ = PortRange::parse(&spec);
        }
    }
}

// ============================================================================
// Instance types
// ============================================================================

mod instance_types {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: every table entry resolves to itself
        #[test]
        fn resolve_is_deterministic(family in instance_class(), size in instance_size()) {
            let token = format!("{}.{}", family.token(), size.api_token());
            let first = InstanceType::resolve(&token).unwrap();
            let second = InstanceType::resolve(&token).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first, InstanceType::new(family, size));
        }

        /// Property: normalizing twice equals normalizing once
        #[test]
        fn normalize_is_idempotent(size in "[0-9a-z]{0,10}") {
            let once = normalize_size(&size);
            prop_assert_eq!(normalize_size(&once), once);
        }

        /// Property: tokens outside the tables fail instead of panicking
        #[test]
        fn unknown_tokens_fail(class in "[a-z][0-9]", size in "[a-z0-9]{1,8}") {
            let token = format!("{}.{}", class, size);
            let known_class = InstanceClass::ALL.iter().any(|c| c.token() == class);
            let known_size = InstanceSize::ALL
                .iter()
                .any(|s| s.key() == normalize_size(&size));
            prop_assert_eq!(InstanceType::resolve(&token).is_ok(), known_class && known_size);
        }
    }
}

// ============================================================================
// Subnet allocation
// ============================================================================

mod subnets {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: consecutive subnets are disjoint and inside the network
        #[test]
        fn subnets_are_disjoint(second_octet in any::<u8>(), mask in 17..=28u8, index in 0..100usize) {
            let net = Ipv4Network::new(Ipv4Addr::new(10, second_octet, 0, 0), 16).unwrap();
            prop_assume!((index as u64 + 1) < net.subnet_capacity(mask));

            let a = net.subnet(mask, index).unwrap();
            let b = net.subnet(mask, index + 1).unwrap();
            prop_assert!(a.is_network_address());
            prop_assert!(u32::from(a.address) < u32::from(b.address));
            prop_assert_eq!(
                u32::from(b.address) - u32::from(a.address),
                1u32 << (32 - u32::from(mask))
            );
            prop_assert_eq!(Ipv4Network::new(b.address, 16).unwrap().network(), net.network());
        }
    }
}

// ============================================================================
// Tag propagation
// ============================================================================

mod tag_propagation {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: every resource carries the configured tags, one category
        /// tag and no empty value
        #[test]
        fn every_resource_is_tagged(tags in tag_map()) {
            let config = stacksmith::config::Config {
                tags: tags.clone(),
                ..common::shop_config()
            };
            let graph = common::compose(&config);

            for stack in &graph.stacks {
                for resource in stack.resources() {
                    for key in tags.keys().filter(|k| k.as_str() != CATEGORY_TAG_KEY) {
                        prop_assert!(resource.tags.contains_key(key));
                    }
                    prop_assert_eq!(
                        resource.tags.get(CATEGORY_TAG_KEY).map(String::as_str),
                        Some(stack.kind.category())
                    );
                    prop_assert!(resource.tags.values().all(|v| !v.is_empty()));
                }
            }
        }
    }
}
