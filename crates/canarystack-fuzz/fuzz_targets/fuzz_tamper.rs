#![no_main]
use canarystack::{DumpSink, SentinelSite};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the element count, the rest are (site, byte) flips.
    let Some((&count, flips)) = data.split_first() else {
        return;
    };
    let mut stack = canarystack::guard_stack!()
        .expect("init")
        .with_dump_sink(DumpSink::Off);
    for value in 0..i32::from(count % 40) {
        stack.push(value).expect("push");
    }

    for pair in flips.chunks_exact(2) {
        let site = SentinelSite::ALL[usize::from(pair[0]) % SentinelSite::ALL.len()];
        stack.tamper().flip_sentinel_byte(site, usize::from(pair[1] % 8));
    }

    // Reporting never panics, whatever the damage.
    let report = stack.inspect();
    let verdict = stack.verify();
    assert_eq!(verdict.is_err(), !report.is_fine());
    let mut out = Vec::new();
    let _ = stack.dump(&mut out, verdict.as_ref().err());
    let _ = stack.pop();
    let _ = stack.destroy();
});
