// Compiles the GLSL sources in the workspace `shaders/` directory to SPIR-V
// next to them (`triangle.vert` -> `triangle.vert.spv`).
//
// glslc is taken from $VULKAN_SDK, then from PATH. Without it the build goes
// on and the engine expects prebuilt `.spv` files. SKIP_SHADERS skips the step.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 3] = ["vert", "frag", "comp"];

fn find_glslc() -> Option<PathBuf> {
    let candidates = env::var("VULKAN_SDK")
        .ok()
        .map(|sdk| {
            let bin = if cfg!(target_os = "windows") {
                Path::new(&sdk).join("Bin").join("glslc.exe")
            } else {
                Path::new(&sdk).join("bin").join("glslc")
            };
            vec![bin]
        })
        .unwrap_or_default()
        .into_iter()
        .chain(std::iter::once(PathBuf::from("glslc")));

    for candidate in candidates {
        let works = Command::new(&candidate)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if works {
            return Some(candidate);
        }
    }
    None
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
            (Ok(src), Ok(dst)) => src > dst,
            _ => true,
        },
        _ => true,
    }
}

fn main() {
    let shader_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap())
        .join("..")
        .join("..")
        .join("shaders");

    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        return;
    }

    let Some(glslc) = find_glslc() else {
        println!("cargo:warning=glslc not found, using prebuilt SPIR-V from shaders/");
        return;
    };

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(e) => {
            println!(
                "cargo:warning=cannot read {}: {}",
                shader_dir.display(),
                e
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let source = entry.path();
        let is_shader = source
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_EXTENSIONS.contains(&ext));
        if !is_shader {
            continue;
        }

        let mut output = source.clone().into_os_string();
        output.push(".spv");
        let output = PathBuf::from(output);
        if !needs_compile(&source, &output) {
            continue;
        }

        let status = Command::new(&glslc)
            .arg("--target-env=vulkan1.3")
            .arg(&source)
            .arg("-o")
            .arg(&output)
            .status();
        match status {
            Ok(s) if s.success() => {}
            Ok(s) => panic!(
                "glslc failed for {} with exit code {}",
                source.display(),
                s.code().unwrap_or(-1)
            ),
            Err(e) => panic!("failed to run glslc for {}: {}", source.display(), e),
        }
    }
}
