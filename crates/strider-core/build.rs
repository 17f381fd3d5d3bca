//! Build script for strider-core
//!
//! Checks toolchain requirements before compilation:
//! - Minimum Rust version (let-else and `Option::is_some_and` need Rust 1.70.0+)
//! - Target pointer width (target addresses are modelled as 64-bit values)

use std::env;

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match rustc_version::version() {
        Ok(found) => {
            let minimum = rustc_version::Version::new(1, 70, 0);
            if found < minimum {
                panic!("strider-core requires Rust {minimum} or newer, found {found}");
            }
        }
        Err(_) => {
            // Some build environments hide rustc; keep going
            println!("cargo:warning=could not verify Rust version");
        }
    }

    if let Ok(width) = env::var("CARGO_CFG_TARGET_POINTER_WIDTH") {
        if width != "64" {
            println!(
                "cargo:warning=strider-core targets 64-bit debuggees; host pointer width is {width} bits, large addresses may truncate in display"
            );
        }
    }
}
