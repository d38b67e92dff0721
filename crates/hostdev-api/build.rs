//! Build script for hostdev-api.
//!
//! Compiles `proto/deviceplugin.proto` into tonic client and server stubs.
//! `protoc` is taken from `protoc-bin-vendored` unless `PROTOC` is already set.

fn main() {
    println!("cargo:rerun-if-changed=proto/deviceplugin.proto");

    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path().expect("vendored protoc not available");
        // SAFETY: build scripts are single-threaded.
        #[allow(unsafe_code)]
        unsafe {
            std::env::set_var("PROTOC", protoc);
        }
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/deviceplugin.proto"], &["proto"])
        .expect("failed to compile deviceplugin.proto");
}
