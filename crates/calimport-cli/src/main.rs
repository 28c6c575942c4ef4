#[tokio::main]
async fn main() -> anyhow::Result<()> {
    calimport_cli::run().await.map_err(anyhow::Error::msg)
}
