//! Context switching for x86_64 with the System V calling convention.
//!
//! A suspended context is a stack pointer to the following words:
//!
//! ```text
//! +--------------+
//! | Saved RBP    |
//! +--------------+
//! | Saved RBX    |
//! +--------------+
//! | Resume RIP   |  <- Saved stack pointer
//! +--------------+
//! ```
//!
//! RBX and RBP are reserved by LLVM and cannot be declared as clobbers, so
//! they are pushed explicitly. All other callee-saved registers are declared
//! as clobbers which lets the compiler spill only what is actually live.
//!
//! A fresh stack looks like this:
//!
//! ```text
//! +--------------+  <- Stack base
//! | Reserved     |
//! +--------------+
//! | Reserved     |
//! +--------------+
//! | Null RBP     |
//! +--------------+
//! | Initial func |
//! +--------------+
//! | Trampoline   |  <- Initial stack pointer
//! +--------------+
//! ```
//!
//! Resuming it "returns" into the trampoline, which pops the initial function
//! and a null frame pointer and then calls the function with the switch
//! argument still in RDI.

use core::arch::{asm, global_asm};

use super::{push, InitialFunc};
use crate::stack::{Stack, StackPointer};
use crate::util::EncodedValue;

pub const STACK_ALIGNMENT: usize = 16;
pub type StackWord = u64;

// Root frame of every callee stack. RIP is marked as undefined so that
// unwinders and debuggers stop here instead of walking into garbage.
global_asm!(
    ".balign 16",
    asm_function_begin!("cothread_init_trampoline"),
    ".cfi_startproc",
    ".cfi_undefined rip",
    "pop rax",
    ".cfi_adjust_cfa_offset -8",
    "pop rbp",
    ".cfi_adjust_cfa_offset -8",
    // The stack is now 16-byte aligned, as required before a CALL.
    "call rax",
    // The initial function never returns.
    "ud2",
    ".cfi_endproc",
    asm_function_end!("cothread_init_trampoline"),
);

extern "C" {
    // Custom calling convention, only ever reached through `switch`.
    fn cothread_init_trampoline();
}

/// Prepares `stack` so that the first switch into the returned stack pointer
/// calls `func`.
#[inline]
pub unsafe fn init_stack(stack: &impl Stack, func: InitialFunc) -> StackPointer {
    let mut sp = stack.base().get();
    debug_assert_eq!(sp % STACK_ALIGNMENT, 0);

    push(&mut sp, None);
    push(&mut sp, None);
    push(&mut sp, Some(0));
    push(&mut sp, Some(func as *const () as StackWord));
    push(&mut sp, Some(cothread_init_trampoline as *const () as StackWord));

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
        "push rbp",
        "push rbx",

        // Resume address of this context.
        "lea rax, [rip + 2f]",
        "push rax",

        "mov [rsi], rsp",
        "mov rsp, rdx",

        // Jump to the resume address of the target context, which is either
        // the 2 label below or the init trampoline.
        "ret",

        "2:",
        "pop rbx",
        "pop rbp",

        // RDI is never touched so the argument flows straight through. On the
        // first switch into a stack it becomes the initial function's first
        // argument.
        inlateout("rdi") arg => ret_val,
        in("rsi") save,
        in("rdx") target.get() as u64,

        lateout("r12") _, lateout("r13") _, lateout("r14") _, lateout("r15") _,
        clobber_abi("sysv64"),
    );

    ret_val
}

/// Resumes the context at `target` without saving the running one.
///
/// Nothing with a pending destructor may be left on the current stack.
#[inline(always)]
pub unsafe fn switch_final(arg: EncodedValue, target: StackPointer) -> ! {
    asm!(
        "mov rsp, rdx",
        "ret",
        in("rdi") arg,
        in("rdx") target.get() as u64,
        options(noreturn),
    );
}
