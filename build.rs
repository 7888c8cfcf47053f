use std::env;
use std::fs;
use std::path::PathBuf;

// Linker setup for the firmware image. Host builds (tests, the library on its
// own) get nothing.

fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_RP2040").is_none() {
        return;
    }

    // Put memory.x where the linker searches for it
    let out = PathBuf::from(env::var("OUT_DIR").unwrap_or_default());
    let memory = include_bytes!("memory.x");
    if fs::write(out.join("memory.x"), memory).is_ok() {
        println!("cargo:rustc-link-search={}", out.display());
    }

    // Skip anything already supplied by .cargo/config.toml
    let rustflags = env::var("CARGO_ENCODED_RUSTFLAGS").unwrap_or_default();
    if !rustflags.contains("link.x") {
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
    }
    if !rustflags.contains("defmt.x") {
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
    if !rustflags.contains("--nmagic") {
        println!("cargo:rustc-link-arg-bins=--nmagic");
    }
    if !rustflags.contains("link-rp.x") {
        println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    }
}
