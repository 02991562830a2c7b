//! On-device background removal CLI
//!
//! Command-line front end for the bgremove-ondevice pipeline.

use bgremove_ondevice::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
