//! Batch Background Removal CLI Tool
//!
//! Command-line interface over the bgremove-batch library: record-table
//! batches, shared-link collection, directory archiving and PDF image extraction.

#[cfg(feature = "cli")]
use bgremove_batch::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
