//! Raw context switching.
//!
//! Every backend exposes the same small interface:
//! - `STACK_ALIGNMENT`, the alignment of the stack pointer at call boundaries.
//! - `init_stack` writes a frame onto a fresh stack so that the first switch
//!   into it calls an [`InitialFunc`] with the switch argument.
//! - `switch` saves the running context and restores another one. The saved
//!   context is nothing more than a stack pointer; everything else lives on
//!   the stack it points to.
//! - `switch_final` restores another context without saving the running one.
//!
//! A suspended context has the same layout whether it was created by
//! `init_stack` or saved by `switch`, so either side can resume the other.

use core::mem;

use crate::util::EncodedValue;

/// Function called on a new stack by the first switch into it.
pub type InitialFunc = unsafe extern "C" fn(arg: EncodedValue) -> !;

// Symbol directives differ between ELF and Mach-O.
cfg_if::cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        macro_rules! asm_mangle {
            ($name:literal) => { concat!("_", $name) };
        }
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".private_extern ", asm_mangle!($name), "\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => { "" };
        }
    } else {
        macro_rules! asm_mangle {
            ($name:literal) => { $name };
        }
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".hidden ", asm_mangle!($name), "\n",
                    ".type ", asm_mangle!($name), ", @function\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                concat!(".size ", asm_mangle!($name), ", . - ", asm_mangle!($name), "\n")
            };
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        compile_error!("context switching is not implemented for this target");
    }
}

/// Pushes one word onto a stack that grows downwards.
#[inline]
unsafe fn push(sp: &mut usize, val: Option<StackWord>) {
    *sp -= mem::size_of::<StackWord>();
    if let Some(val) = val {
        *(*sp as *mut StackWord) = val;
    }
}
