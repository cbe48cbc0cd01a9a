//! Inference Gateway
//!
//! Routes OpenAI-style chat completions between a local model server and a
//! hosted provider.

use inference_gateway::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
