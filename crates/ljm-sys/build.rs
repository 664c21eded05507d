//! Build script for ljm-sys.
//!
//! With the `ljm-sdk` feature the crate links against `LabJackM`. The
//! library directory can be overridden with `LJM_LIB_DIR`; otherwise the
//! vendor installer's default locations are searched.

fn main() {
    println!("cargo:rerun-if-env-changed=LJM_LIB_DIR");

    #[cfg(feature = "ljm-sdk")]
    link_labjackm();
}

#[cfg(feature = "ljm-sdk")]
fn link_labjackm() {
    use std::path::Path;

    if let Ok(dir) = std::env::var("LJM_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    } else {
        let lib_paths = [
            "/usr/local/lib",
            "/usr/lib",
            "/usr/lib/x86_64-linux-gnu",
            "/Library/Frameworks/LabJackM.framework",
            "C:\\Program Files (x86)\\LabJack\\Drivers\\64bit",
        ];

        for path in lib_paths {
            let dir = Path::new(path);
            if dir.join("libLabJackM.so").exists()
                || dir.join("libLabJackM.dylib").exists()
                || dir.join("LabJackM.lib").exists()
                || dir.join("LabJackM").exists()
            {
                println!("cargo:rustc-link-search=native={}", path);
                break;
            }
        }
    }

    println!("cargo:rustc-link-lib=dylib=LabJackM");
}
