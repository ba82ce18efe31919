#[tokio::main]
async fn main() -> anyhow::Result<()> {
    memora_backend::run().await
}
