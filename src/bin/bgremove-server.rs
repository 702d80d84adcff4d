//! Background Removal API server
//!
//! HTTP service removing image backgrounds with U2-Net and IS-Net models.

#[cfg(feature = "cli")]
use bgremove_api::cli;

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
