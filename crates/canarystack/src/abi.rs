//! C ABI surface over raw stack handles.
//!
//! This is where the handle state machine is enforced: `canarystack_init`
//! produces a live handle, `canarystack_destroy` consumes it, and every other
//! entry point checks for a null handle first. Return codes are
//! [`StackError::code`] values, `0` meaning success.
//!
//! Using a handle after `canarystack_destroy` is out of contract.

#![allow(unsafe_code)]

use std::ffi::{CStr, c_char};

use crate::error::StackError;
use crate::guard::{Element, POISON};
use crate::origin::Origin;
use crate::stack::GuardStack;

/// Handle-or-error pair returned by [`canarystack_init`].
#[repr(C)]
#[derive(Debug)]
pub struct StackOption {
    pub stack: *mut GuardStack,
    pub error: i32,
}

/// Value-or-error pair returned by [`canarystack_pop`]. `value` is
/// [`POISON`] whenever `error` is non-zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementOption {
    pub value: Element,
    pub error: i32,
}

fn code_of(result: Result<(), StackError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

/// Read an optional C string, falling back to `fallback`.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn string_or(ptr: *const c_char, fallback: &str) -> String {
    if ptr.is_null() {
        return fallback.to_string();
    }
    // SAFETY: caller guarantees a NUL-terminated string.
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

/// Create a stack. `file` and `routine` describe the caller and may be null.
///
/// # Safety
///
/// `file` and `routine` must each be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canarystack_init(
    file: *const c_char,
    line: u32,
    routine: *const c_char,
) -> StackOption {
    // SAFETY: forwarded caller contract.
    let (file, routine) = unsafe { (string_or(file, "<unknown>"), string_or(routine, "<unknown>")) };
    match GuardStack::init(Origin::owned(file, line, routine)) {
        Ok(stack) => StackOption {
            stack: Box::into_raw(Box::new(stack)),
            error: 0,
        },
        Err(err) => StackOption {
            stack: std::ptr::null_mut(),
            error: err.code(),
        },
    }
}

/// Push `value`.
///
/// # Safety
///
/// `stack` must be null or a live handle from [`canarystack_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canarystack_push(stack: *mut GuardStack, value: Element) -> i32 {
    // SAFETY: caller guarantees null or a live, exclusively used handle.
    let Some(stack) = (unsafe { stack.as_mut() }) else {
        return StackError::NullReference.code();
    };
    code_of(stack.push(value))
}

/// Pop the top value.
///
/// # Safety
///
/// `stack` must be null or a live handle from [`canarystack_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canarystack_pop(stack: *mut GuardStack) -> ElementOption {
    // SAFETY: caller guarantees null or a live, exclusively used handle.
    let Some(stack) = (unsafe { stack.as_mut() }) else {
        return ElementOption {
            value: POISON,
            error: StackError::NullReference.code(),
        };
    };
    match stack.pop() {
        Ok(value) => ElementOption { value, error: 0 },
        Err(err) => ElementOption {
            value: POISON,
            error: err.code(),
        },
    }
}

/// Run the integrity verifier without mutating the stack.
///
/// # Safety
///
/// `stack` must be null or a live handle from [`canarystack_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canarystack_verify(stack: *const GuardStack) -> i32 {
    // SAFETY: caller guarantees null or a live handle.
    let Some(stack) = (unsafe { stack.as_ref() }) else {
        return StackError::NullReference.code();
    };
    code_of(stack.verify())
}

/// Number of live elements, or `usize::MAX` for a null handle.
///
/// # Safety
///
/// `stack` must be null or a live handle from [`canarystack_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canarystack_size(stack: *const GuardStack) -> usize {
    // SAFETY: caller guarantees null or a live handle.
    unsafe { stack.as_ref() }.map_or(usize::MAX, GuardStack::size)
}

/// Dump the stack to standard error.
///
/// # Safety
///
/// `stack` must be null or a live handle from [`canarystack_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canarystack_dump_stderr(stack: *const GuardStack) -> i32 {
    // SAFETY: caller guarantees null or a live handle.
    let Some(stack) = (unsafe { stack.as_ref() }) else {
        return StackError::NullReference.code();
    };
    let observed = stack.verify().err();
    let mut err = std::io::stderr().lock();
    code_of(stack.dump(&mut err, observed.as_ref()))
}

/// Verify, wipe, and release the stack. The handle is dead afterwards
/// regardless of the returned code.
///
/// # Safety
///
/// `stack` must be null or a live handle from [`canarystack_init`] that is
/// not used again.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canarystack_destroy(stack: *mut GuardStack) -> i32 {
    if stack.is_null() {
        return StackError::NullReference.code();
    }
    // SAFETY: non-null handles come from Box::into_raw in canarystack_init
    // and ownership transfers back here exactly once.
    let stack = unsafe { Box::from_raw(stack) };
    code_of(stack.destroy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::DumpSink;

    fn live() -> *mut GuardStack {
        let out = unsafe { canarystack_init(c"abi.rs".as_ptr(), 7, std::ptr::null()) };
        assert_eq!(out.error, 0);
        assert!(!out.stack.is_null());
        unsafe { (*out.stack).set_dump_sink(DumpSink::Off) };
        out.stack
    }

    #[test]
    fn null_handle_is_reported_everywhere() {
        let null_code = StackError::NullReference.code();
        unsafe {
            assert_eq!(canarystack_push(std::ptr::null_mut(), 1), null_code);
            assert_eq!(
                canarystack_pop(std::ptr::null_mut()),
                ElementOption {
                    value: POISON,
                    error: null_code
                }
            );
            assert_eq!(canarystack_verify(std::ptr::null()), null_code);
            assert_eq!(canarystack_dump_stderr(std::ptr::null()), null_code);
            assert_eq!(canarystack_destroy(std::ptr::null_mut()), null_code);
            assert_eq!(canarystack_size(std::ptr::null()), usize::MAX);
        }
    }

    #[test]
    fn lifecycle_through_the_abi() {
        let handle = live();
        unsafe {
            assert_eq!((*handle).origin().to_string(), "abi.rs(7) <unknown>()");
            for v in 0..10 {
                assert_eq!(canarystack_push(handle, v), 0);
            }
            assert_eq!(canarystack_size(handle), 10);
            assert_eq!(canarystack_verify(handle), 0);
            for expected in (0..10).rev() {
                assert_eq!(
                    canarystack_pop(handle),
                    ElementOption {
                        value: expected,
                        error: 0
                    }
                );
            }
            assert_eq!(
                canarystack_pop(handle),
                ElementOption {
                    value: POISON,
                    error: StackError::EmptyPop.code()
                }
            );
            assert_eq!(canarystack_destroy(handle), 0);
        }
    }
}
