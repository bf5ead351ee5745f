//! Build script: compile the flat C entry points over the SiftGPU virtuals.
//!
//! The shim needs `SiftGPU.h`. It is looked up through `SIFTGPU_DIR` (the
//! SiftGPU source root or its header directory) and then the vendored
//! `third_party/SiftGPU` layout. Without a header the crate builds in
//! module-exports mode and expects the engine module to carry the flat
//! `SiftGPU_*` / `SiftMatchGPU_*` symbols itself.

use std::env;
use std::path::{Path, PathBuf};

const SHIM_SOURCE: &str = "shim/siftlink_shim.cpp";

fn header_dir_candidates(root: &Path) -> [PathBuf; 3] {
    [
        root.join("src").join("SiftGPU"),
        root.join("include"),
        root.to_path_buf(),
    ]
}

fn resolve_siftgpu_include(manifest_dir: &Path) -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Some(dir) = env::var_os("SIFTGPU_DIR") {
        roots.push(PathBuf::from(dir));
    }
    // Vendored inside the workspace: <workspace>/third_party/SiftGPU.
    if let Some(workspace) = manifest_dir.parent().and_then(Path::parent) {
        roots.push(workspace.join("third_party").join("SiftGPU"));
    }

    roots
        .iter()
        .flat_map(|root| header_dir_candidates(root))
        .find(|dir| dir.join("SiftGPU.h").is_file())
}

fn main() {
    println!("cargo:rustc-check-cfg=cfg(siftlink_shim)");
    println!("cargo:rerun-if-env-changed=SIFTGPU_DIR");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={SHIM_SOURCE}");

    if env::var_os("DOCS_RS").is_some() {
        return;
    }

    let Some(manifest_dir) = env::var_os("CARGO_MANIFEST_DIR").map(PathBuf::from) else {
        println!("cargo:warning=CARGO_MANIFEST_DIR unset; building without the SiftGPU shim");
        return;
    };

    let Some(include_dir) = resolve_siftgpu_include(&manifest_dir) else {
        println!(
            "cargo:warning=SiftGPU.h not found (SIFTGPU_DIR unset or incomplete); the engine module must export the flat SiftGPU_* symbols"
        );
        return;
    };
    println!("cargo:rerun-if-changed={}", include_dir.join("SiftGPU.h").display());

    let compiled = cc::Build::new()
        .cpp(true)
        .file(SHIM_SOURCE)
        .include(&include_dir)
        .warnings(false)
        .try_compile("siftlink_shim");

    match compiled {
        Ok(()) => println!("cargo:rustc-cfg=siftlink_shim"),
        Err(err) => println!(
            "cargo:warning=SiftGPU shim failed to compile against {}: {err}; the engine module must export the flat SiftGPU_* symbols",
            include_dir.display()
        ),
    }
}
