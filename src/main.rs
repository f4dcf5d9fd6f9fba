use eventmaster_api::cli::{self, commands::serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL and friends reach the config
    let _ = dotenvy::dotenv();
    cli::init_tracing();

    serve::handle(None).await
}
