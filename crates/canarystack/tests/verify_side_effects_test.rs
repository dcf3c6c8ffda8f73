//! Verification is observation only.
//!
//! Kept in its own test binary so no other test moves the process-wide
//! counters while the snapshots are compared.

use canarystack::config::CANARY_PROTECTION;
use canarystack::{DumpSink, SentinelSite, global_metrics, guard_stack};

#[test]
fn verify_and_inspect_leave_stack_and_counters_alone() {
    let mut stack = guard_stack!()
        .expect("init should succeed")
        .with_dump_sink(DumpSink::Off);
    for v in 0..5 {
        stack.push(v).expect("push should succeed");
    }
    if CANARY_PROTECTION {
        assert!(stack.tamper().flip_sentinel_byte(SentinelSite::BufferTrailing, 2));
    }

    let before = global_metrics().snapshot();
    let state = (stack.size(), stack.capacity(), stack.allocated_byte_length());
    let slots: Vec<_> = (0..stack.capacity()).map(|i| stack.slot(i)).collect();

    for _ in 0..3 {
        assert_eq!(stack.verify().is_err(), CANARY_PROTECTION);
        assert_eq!(stack.inspect().is_fine(), !CANARY_PROTECTION);
    }

    assert_eq!(global_metrics().snapshot(), before);
    assert_eq!(
        (stack.size(), stack.capacity(), stack.allocated_byte_length()),
        state
    );
    let after: Vec<_> = (0..stack.capacity()).map(|i| stack.slot(i)).collect();
    assert_eq!(after, slots);

    // Operations count the verification they run, and the failure it finds.
    let _ = stack.push(99);
    let counted = global_metrics().snapshot();
    assert_eq!(counted.verifications, before.verifications + 1);
    if CANARY_PROTECTION {
        assert_eq!(counted.canary_failures, before.canary_failures + 1);
        assert_eq!(counted.corruption_reports, before.corruption_reports + 1);
    } else {
        assert_eq!(counted.pushes, before.pushes + 1);
    }
}
