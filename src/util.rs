//! Packing of values into a single register for the context switch.
//!
//! Values no larger than a `usize` travel by value. Anything bigger stays in
//! the frame of the side that sent it and only its address travels; that
//! frame is frozen until the receiver has read the value out.

use core::mem::{self, ManuallyDrop};
use core::ptr;

/// A value packed for transfer through `arch::switch`.
pub type EncodedValue = usize;

#[inline]
const fn fits_in_register<T>() -> bool {
    mem::size_of::<T>() <= mem::size_of::<EncodedValue>()
}

/// Packs `val`. Ownership moves to whoever calls [`decode_val`] on the
/// result, so `val` must not be touched again.
#[inline]
pub unsafe fn encode_val<T>(val: &mut ManuallyDrop<T>) -> EncodedValue {
    if fits_in_register::<T>() {
        let mut out: EncodedValue = 0;
        ptr::write_unaligned(
            (&mut out as *mut EncodedValue).cast::<T>(),
            ManuallyDrop::take(val),
        );
        out
    } else {
        (val as *mut ManuallyDrop<T>) as EncodedValue
    }
}

/// Unpacks a value produced by [`encode_val`] and takes ownership of it.
#[inline]
pub unsafe fn decode_val<T>(val: EncodedValue) -> T {
    if fits_in_register::<T>() {
        ptr::read_unaligned((&val as *const EncodedValue).cast::<T>())
    } else {
        ptr::read(val as *const T)
    }
}
