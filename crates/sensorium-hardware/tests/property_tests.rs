//! Property-based tests for registry reconciliation.
//!
//! Random sequences of plug, unplug and poll operations are applied to a
//! mock transport. After every poll the registry must hold exactly the
//! previous handles minus the removed ones, followed by the added ones in
//! enumeration order, with one open session per registered device.

mod common;

use common::Bench;
use proptest::prelude::*;
use sensorium_core::Handle;
use sensorium_hardware::mock::MockDevice;

#[derive(Debug, Clone)]
enum Op {
    PlugMotion,
    PlugThermal(usize),
    PlugUnknown,
    /// Unplug the n-th plugged board, modulo the number plugged.
    Unplug(usize),
    Poll,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::PlugMotion),
        2 => (0usize..=4).prop_map(Op::PlugThermal),
        1 => Just(Op::PlugUnknown),
        3 => any::<usize>().prop_map(Op::Unplug),
        3 => Just(Op::Poll),
    ]
}

/// Expected registry order after a poll over `attached`.
fn reconcile(previous: &[Handle], attached: &[Handle], supported: &[Handle]) -> Vec<Handle> {
    let mut next: Vec<Handle> = previous
        .iter()
        .copied()
        .filter(|handle| attached.contains(handle))
        .collect();
    for handle in attached {
        if supported.contains(handle) && !next.contains(handle) {
            next.push(*handle);
        }
    }
    next
}

proptest! {
    /// Property: the registry converges to (previous - removed) + added on
    /// every poll and never leaks a session.
    #[test]
    fn prop_registry_tracks_enumeration(ops in prop::collection::vec(op(), 1..40)) {
        let mut bench = Bench::new();
        let mut supported = Vec::new();
        let mut expected: Vec<Handle> = Vec::new();

        for op in ops {
            match op {
                Op::PlugMotion => supported.push(bench.transport.plug(MockDevice::motion(1))),
                Op::PlugThermal(inputs) => {
                    supported.push(bench.transport.plug(MockDevice::thermal(2, inputs)));
                }
                Op::PlugUnknown => {
                    bench.transport.plug(MockDevice::unknown(0x07d));
                }
                Op::Unplug(n) => {
                    let plugged = bench.transport.plugged();
                    if !plugged.is_empty() {
                        bench.transport.unplug(plugged[n % plugged.len()]);
                    }
                }
                Op::Poll => {
                    let attached = bench.transport.plugged();
                    let report = bench.registry.poll().unwrap();
                    expected = reconcile(&expected, &attached, &supported);

                    prop_assert!(report.failures.is_empty());
                    prop_assert_eq!(bench.registry.handles(), expected.clone());
                    prop_assert_eq!(bench.transport.open_sessions(), expected.len());
                }
            }
        }
    }

    /// Property: a poll never reports a handle as both connected and
    /// disconnected, and every reported handle is unique.
    #[test]
    fn prop_report_lists_are_disjoint(ops in prop::collection::vec(op(), 1..40)) {
        let mut bench = Bench::new();

        for op in ops {
            match op {
                Op::PlugMotion => {
                    bench.transport.plug(MockDevice::motion(1));
                }
                Op::PlugThermal(inputs) => {
                    bench.transport.plug(MockDevice::thermal(2, inputs));
                }
                Op::PlugUnknown => {
                    bench.transport.plug(MockDevice::unknown(0x07d));
                }
                Op::Unplug(n) => {
                    let plugged = bench.transport.plugged();
                    if !plugged.is_empty() {
                        bench.transport.unplug(plugged[n % plugged.len()]);
                    }
                }
                Op::Poll => {
                    let report = bench.registry.poll().unwrap();
                    let mut all: Vec<Handle> = report
                        .connected
                        .iter()
                        .chain(&report.disconnected)
                        .chain(&report.ignored)
                        .copied()
                        .collect();
                    let total = all.len();
                    all.sort();
                    all.dedup();
                    prop_assert_eq!(all.len(), total);
                }
            }
        }
    }
}
