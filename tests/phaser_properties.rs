use proptest::prelude::*;
use safepoint::phaser::Phaser;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy)]
enum Op {
    Register,
    Deregister,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Register), Just(Op::Deregister)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Between phases, parties track registrations and nobody is left arrived.
    #[test]
    fn party_count_tracks_registrations(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let phaser = Phaser::new();
        let mut expected = 0usize;

        for op in ops {
            match op {
                Op::Register => {
                    phaser.register();
                    expected += 1;
                }
                Op::Deregister if expected > 0 => {
                    phaser.arrive_and_deregister();
                    expected -= 1;
                }
                Op::Deregister => {}
            }
            prop_assert_eq!(phaser.registered_parties(), expected);
            prop_assert_eq!(phaser.arrived_parties(), 0);
        }
        prop_assert_eq!(phaser.phase(), 0);
    }

    /// Every party passes every phase together, whatever the group size.
    #[test]
    fn all_parties_advance_together(parties in 1usize..6, rounds in 1usize..5) {
        let phaser = Arc::new(Phaser::new());
        for _ in 0..parties {
            phaser.register();
        }
        let arrivals = Arc::new(AtomicUsize::new(0));

        crossbeam::scope(|s| {
            for _ in 0..parties {
                let phaser = Arc::clone(&phaser);
                let arrivals = Arc::clone(&arrivals);
                s.spawn(move |_| {
                    for round in 0..rounds {
                        arrivals.fetch_add(1, Ordering::SeqCst);
                        phaser.arrive_and_await_advance();
                        assert!(arrivals.load(Ordering::SeqCst) >= (round + 1) * parties);
                    }
                });
            }
        })
        .unwrap();

        prop_assert_eq!(phaser.phase(), rounds as u64);
        prop_assert_eq!(arrivals.load(Ordering::SeqCst), rounds * parties);
    }
}
