//! bgremove-b64 command-line tool
//!
//! Removes the background of one image and prints the transparent PNG as
//! base64 on stdout, or `False` when processing fails.

#[cfg(feature = "cli")]
use bgremove_b64::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<std::process::ExitCode> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
