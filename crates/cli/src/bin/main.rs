//! Binary entry point for the jfs-mcp server.

use jfs_mcp_cli::cmd::App;

#[tokio::main]
async fn main() {
    if let Err(e) = App::run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
