//! Build-time selection of the context-switching backend.
//!
//! The raw context switch is only implemented for a few targets. On every
//! other target the crate still builds, but only with the thread-handoff
//! engine. We emit `cfg(context_switch)` when:
//! - the target is x86_64 or AArch64,
//! - the target is not Windows (the TEB would need updating on each switch),
//! - the compiler accepts `asm!`.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-check-cfg=cfg(context_switch)");

    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap();
    if os == "windows" || !matches!(arch.as_str(), "x86_64" | "aarch64") {
        return;
    }

    // Old compilers without stable inline assembly fall back to threads.
    let cfg = autocfg::new();
    if cfg.probe_expression("unsafe { core::arch::asm!(\"\") }") {
        autocfg::emit("context_switch");
    }
}
