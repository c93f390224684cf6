//! White background CLI tool
//!
//! Command-line interface for replacing image backgrounds with solid white
//! using the white-bg library.

#[cfg(feature = "cli")]
use white_bg::cli;

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
