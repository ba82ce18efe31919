#[tokio::main]
async fn main() -> anyhow::Result<()> {
    memora_client::run().await
}
