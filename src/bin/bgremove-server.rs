//! Background removal HTTP server
//!
//! Serves `POST /remove-bg`, `GET /health` and `GET /models` on top of the
//! imgly-bgremove-server library.

use imgly_bgremove_server::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
