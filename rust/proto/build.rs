fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/catalog.proto");
    prost_build::compile_protos(&["proto/catalog.proto"], &["proto/"])?;
    Ok(())
}
