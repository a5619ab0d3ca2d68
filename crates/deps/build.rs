use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")?;
    let manifest_path = std::path::Path::new(&manifest_dir).join("Cargo.toml");
    println!("cargo:rerun-if-changed={}", manifest_path.display());

    let manifest = cargo_toml::Manifest::from_path(&manifest_path)?;

    let out_dir = std::env::var("OUT_DIR")?;
    let mut out = std::fs::File::create(std::path::Path::new(&out_dir).join("deps.rs"))?;
    for name in manifest.dependencies.keys() {
        // crate names with dashes are imported with underscores
        writeln!(out, "pub use {};", name.replace('-', "_"))?;
    }
    Ok(())
}
