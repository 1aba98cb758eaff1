//! Re-identification backend selection CLI
//!
//! Command-line interface for identifying model formats and extracting
//! embeddings through the automatically selected backend.

#[cfg(feature = "cli")]
use reid_autobackend::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
