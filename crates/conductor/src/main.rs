#[tokio::main]
async fn main() -> conductor::Result<()> {
    conductor::init_tracing();
    let mode = conductor::parse_command()?;
    tracing::info!(
        version = conductor::version::VERSION,
        git_sha = conductor::version::GIT_SHA,
        built_at = conductor::version::BUILD_TIMESTAMP,
        mode = ?mode,
        "conductor starting"
    );
    conductor::run(mode).await
}
