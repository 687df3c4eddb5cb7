use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let out_path = PathBuf::from(&crate_dir).join("include").join("tensor_kernels.h");

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create include directory");
    }

    let config_path = PathBuf::from(&crate_dir).join("cbindgen.toml");
    cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(cbindgen::Config::from_file(&config_path).unwrap_or_default())
        .generate()
        .expect("unable to generate C bindings")
        .write_to_file(&out_path);

    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=cbindgen.toml");
}
