fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Build scripts run single-threaded, so mutating the environment is sound here.
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::compile_protos("proto/prodcon.proto")?;
    Ok(())
}
