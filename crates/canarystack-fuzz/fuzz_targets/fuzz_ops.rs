#![no_main]
use canarystack::config::MIN_CAPACITY;
use canarystack::{DumpSink, POISON, StackError};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Each 5-byte chunk is one op: tag byte, then a little-endian value.
    let mut stack = canarystack::guard_stack!()
        .expect("init")
        .with_dump_sink(DumpSink::Off);
    let mut model: Vec<i32> = Vec::new();

    for chunk in data.chunks_exact(5) {
        if chunk[0] & 1 == 0 {
            let value = i32::from_le_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]);
            stack.push(value).expect("push on a healthy stack");
            model.push(value);
        } else {
            match stack.pop() {
                Ok(value) => assert_eq!(Some(value), model.pop()),
                Err(StackError::EmptyPop) => assert!(model.is_empty()),
                Err(other) => panic!("pop on a healthy stack failed: {other}"),
            }
        }
        assert_eq!(stack.size(), model.len());
        assert!(stack.capacity() >= stack.size());
        assert!(stack.capacity() >= MIN_CAPACITY);
    }

    assert!(stack.verify().is_ok());
    for index in stack.size()..stack.capacity() {
        assert_eq!(stack.slot(index), Some(POISON));
    }
    stack.destroy().expect("destroy");
});
