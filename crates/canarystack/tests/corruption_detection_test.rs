use canarystack::config::{CANARY_PROTECTION, CHECKSUM_PROTECTION, DIAGNOSTICS};
use canarystack::{
    ChecksumRegion, DumpSink, GuardStack, SentinelSite, SharedBuffer, StackError, global_metrics,
    guard_stack,
};

fn stack_with(k: i32, sink: DumpSink) -> GuardStack {
    let mut stack = guard_stack!()
        .expect("init should succeed")
        .with_dump_sink(sink);
    for v in 0..k {
        stack.push(v * 11).expect("push should succeed");
    }
    stack
}

#[test]
fn clobbered_sentinel_is_dead_and_breaks_checksum() {
    if !CANARY_PROTECTION {
        return;
    }
    for site in SentinelSite::ALL {
        for byte in [0usize, 7] {
            let mut stack = stack_with(5, DumpSink::Off);
            assert!(stack.tamper().flip_sentinel_byte(site, byte));

            let report = stack.inspect();
            assert!(report.has_dead_sentinel(), "{site} byte {byte}");
            assert_eq!(report.has_bad_checksum(), CHECKSUM_PROTECTION, "{site} byte {byte}");

            assert!(matches!(stack.verify(), Err(StackError::DeadSentinel(s)) if s == site));
            assert!(matches!(stack.push(1), Err(StackError::DeadSentinel(s)) if s == site));
            assert!(matches!(stack.pop(), Err(StackError::DeadSentinel(s)) if s == site));
        }
    }
}

#[test]
fn clobbered_payload_byte_is_checksum_only() {
    if !CHECKSUM_PROTECTION {
        return;
    }
    let mut stack = stack_with(6, DumpSink::Off);
    assert!(stack.tamper().flip_slot_byte(2, 1));

    let report = stack.inspect();
    assert!(!report.has_dead_sentinel());
    assert!(report.has_bad_checksum());
    assert!(matches!(
        stack.verify(),
        Err(StackError::BadChecksum(ChecksumRegion::Payload))
    ));
    assert!(matches!(stack.pop(), Err(StackError::BadChecksum(_))));
}

#[test]
fn corrupted_stack_refuses_to_mutate() {
    if !CHECKSUM_PROTECTION {
        return;
    }
    let mut stack = stack_with(3, DumpSink::Off);
    stack.tamper().flip_slot_byte(0, 0);
    let size = stack.size();
    assert!(stack.push(9).is_err());
    assert!(stack.pop().is_err());
    assert_eq!(stack.size(), size);
}

#[test]
fn overwritten_size_is_out_of_bounds() {
    let mut stack = stack_with(2, DumpSink::Off);
    let capacity = stack.capacity();
    stack.tamper().set_size(capacity + 5);
    assert!(matches!(
        stack.push(0),
        Err(StackError::OutOfBounds { .. })
    ));
}

#[test]
fn overwritten_capacity_is_out_of_bounds() {
    let mut stack = stack_with(2, DumpSink::Off);
    stack.tamper().set_capacity(1024);
    assert!(matches!(stack.pop(), Err(StackError::OutOfBounds { .. })));
    // The dump must stay within the real buffer.
    let mut out = Vec::new();
    stack.dump(&mut out, None).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("absent from the buffer"));
}

#[test]
fn forged_payload_checksum_is_bad_checksum() {
    if !CHECKSUM_PROTECTION {
        return;
    }
    let mut stack = stack_with(2, DumpSink::Off);
    stack.tamper().set_payload_checksum(0);
    assert!(matches!(
        stack.verify(),
        Err(StackError::BadChecksum(ChecksumRegion::Payload))
    ));
}

#[test]
fn corruption_triggers_automatic_dump() {
    if !CANARY_PROTECTION {
        return;
    }
    let sink = SharedBuffer::new();
    let mut stack = stack_with(4, DumpSink::Memory(sink.clone()));
    let before = global_metrics().snapshot();

    stack
        .tamper()
        .flip_sentinel_byte(SentinelSite::BufferTrailing, 2);
    let err = stack.push(42).unwrap_err();
    assert!(matches!(err, StackError::DeadSentinel(SentinelSite::BufferTrailing)));

    let text = sink.text();
    if DIAGNOSTICS {
        assert!(text.contains("observed error: dead_sentinel"));
        assert!(text.contains("push()"), "call site missing:\n{text}");
        assert!(text.contains("corruption_detection_test.rs"));
        assert!(text.contains("buffer trailing sentinel"));
        assert!(text.contains("MISMATCH"));
        assert!(global_metrics().snapshot().dumps_written > before.dumps_written);
    } else {
        assert!(text.is_empty());
    }
}

#[test]
fn empty_pop_does_not_dump() {
    let sink = SharedBuffer::new();
    let mut stack = stack_with(0, DumpSink::Memory(sink.clone()));
    assert!(matches!(stack.pop(), Err(StackError::EmptyPop)));
    assert!(sink.contents().is_empty());
}

#[test]
fn destroy_reports_corruption_but_releases() {
    if !CANARY_PROTECTION {
        return;
    }
    let sink = SharedBuffer::new();
    let mut stack = stack_with(1, DumpSink::Memory(sink.clone()));
    stack
        .tamper()
        .flip_sentinel_byte(SentinelSite::ControlOrigin, 0);
    let err = stack.destroy().unwrap_err();
    assert!(matches!(err, StackError::DeadSentinel(SentinelSite::ControlOrigin)));
    if DIAGNOSTICS {
        assert!(sink.text().contains("destroy()"));
    }
}

#[test]
fn fatal_classification_follows_build() {
    if !CANARY_PROTECTION {
        return;
    }
    let mut stack = stack_with(1, DumpSink::Off);
    stack
        .tamper()
        .flip_sentinel_byte(SentinelSite::BufferLeading, 4);
    let err = stack.verify().unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(err.is_fatal(), canarystack::config::ABORT_ON_CORRUPTION);
}
