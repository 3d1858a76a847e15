//! Build script for vela-compiler
//!
//! Locates the vela-runtime static library produced by the
//! `build-dependencies` entry so it can be embedded into the compiler
//! binary via `include_bytes!` in `lib.rs`.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // OUT_DIR looks like target/<profile>/build/vela-compiler-<hash>/out.
    // Cargo builds build-dependencies into the same target directory, so
    // libvela_runtime.a ends up either directly in <profile>/ or, more
    // commonly, hashed under <profile>/deps/.
    let target_dir = out_dir
        .parent() // build/<pkg>-<hash>/out -> build/<pkg>-<hash>
        .and_then(|p| p.parent()) // -> build
        .and_then(|p| p.parent()) // -> <profile>
        .expect("OUT_DIR did not have the expected target/<profile>/build/.../out shape");

    let direct_lib = target_dir.join("libvela_runtime.a");
    let runtime_lib = if direct_lib.exists() {
        direct_lib
    } else {
        let deps_dir = target_dir.join("deps");
        find_runtime_in_deps(&deps_dir).unwrap_or_else(|| {
            panic!(
                "vela-runtime static library not found.\nLooked in: {}\nAnd deps: {}\nOUT_DIR was: {}",
                direct_lib.display(),
                deps_dir.display(),
                out_dir.display()
            )
        })
    };

    println!(
        "cargo:rustc-env=VELA_RUNTIME_LIB_PATH={}",
        runtime_lib.display()
    );
    println!("cargo:rerun-if-changed={}", runtime_lib.display());
}

fn find_runtime_in_deps(deps_dir: &PathBuf) -> Option<PathBuf> {
    if !deps_dir.exists() {
        return None;
    }

    fs::read_dir(deps_dir).ok()?.find_map(|entry| {
        let entry = entry.ok()?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with("libvela_runtime") && name_str.ends_with(".a") {
            Some(entry.path())
        } else {
            None
        }
    })
}
