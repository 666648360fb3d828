//! Bgtify CLI Tool
//!
//! Command-line interface for removing image backgrounds with the bgtify
//! pipeline and the Tract segmentation remover.

#[cfg(feature = "cli")]
use bgtify::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
