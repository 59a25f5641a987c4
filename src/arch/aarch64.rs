//! Context switching for AArch64 (AAPCS64).
//!
//! A suspended context is a stack pointer to a 32-byte record:
//!
//! ```text
//! +--------------+
//! | Padding      |
//! +--------------+
//! | Resume PC    |
//! +--------------+
//! | Saved X29    |
//! +--------------+
//! | Saved X19    |  <- Saved stack pointer
//! +--------------+
//! ```
//!
//! X19 and X29 are reserved by LLVM and are saved explicitly. The remaining
//! callee-saved registers are declared as clobbers.
//!
//! A fresh stack holds the same record with the initial function in the X19
//! slot, a null frame pointer and the trampoline as resume address. The
//! trampoline then branches to the function held in X19 with the switch
//! argument still in X0.

use core::arch::{asm, global_asm};

use super::{push, InitialFunc};
use crate::stack::{Stack, StackPointer};
use crate::util::EncodedValue;

pub const STACK_ALIGNMENT: usize = 16;
pub type StackWord = u64;

global_asm!(
    ".balign 4",
    asm_function_begin!("cothread_init_trampoline"),
    ".cfi_startproc",
    // Stop unwinding at the root of the callee stack.
    ".cfi_undefined lr",
    "blr x19",
    // The initial function never returns.
    "brk #0",
    ".cfi_endproc",
    asm_function_end!("cothread_init_trampoline"),
);

extern "C" {
    fn cothread_init_trampoline();
}

/// Prepares `stack` so that the first switch into the returned stack pointer
/// calls `func`.
#[inline]
pub unsafe fn init_stack(stack: &impl Stack, func: InitialFunc) -> StackPointer {
    let mut sp = stack.base().get();
    debug_assert_eq!(sp % STACK_ALIGNMENT, 0);

    push(&mut sp, None);
    push(&mut sp, Some(cothread_init_trampoline as *const () as StackWord));
    push(&mut sp, Some(0));
    push(&mut sp, Some(func as *const () as StackWord));

    StackPointer::new_unchecked(sp)
}

/// Saves the running context into `save` and resumes the context at
/// `target`, handing it `arg`.
///
/// Returns the argument passed by whichever context later switches back to
/// the one saved here.
#[inline(always)]
pub unsafe fn switch(
    arg: EncodedValue,
    save: *mut Option<StackPointer>,
    target: StackPointer,
) -> EncodedValue {
    let ret_val;

    asm!(
        "stp x19, x29, [sp, #-32]!",
        "adr lr, 2f",
        "str lr, [sp, #16]",

        "mov x3, sp",
        "str x3, [x1]",

        "ldp x19, x29, [x2]",
        "ldr lr, [x2, #16]",
        "add sp, x2, #32",

        // Branch to the resume address of the target context, which is either
        // the 2 label below or the init trampoline.
        "ret",

        "2:",

        inlateout("x0") arg => ret_val,
        in("x1") save,
        in("x2") target.get() as u64,

        lateout("x20") _, lateout("x21") _, lateout("x22") _, lateout("x23") _,
        lateout("x24") _, lateout("x25") _, lateout("x26") _, lateout("x27") _,
        lateout("x28") _,
        clobber_abi("C"),
    );

    ret_val
}

/// Resumes the context at `target` without saving the running one.
///
/// Nothing with a pending destructor may be left on the current stack.
#[inline(always)]
pub unsafe fn switch_final(arg: EncodedValue, target: StackPointer) -> ! {
    asm!(
        "ldp x19, x29, [x2]",
        "ldr lr, [x2, #16]",
        "add sp, x2, #32",
        "ret",
        in("x0") arg,
        in("x2") target.get() as u64,
        options(noreturn),
    );
}
