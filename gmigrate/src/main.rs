#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gmigrate::run_cli().await
}
