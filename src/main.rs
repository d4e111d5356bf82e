use chat2gemini::server::build_router;
use chat2gemini::util::{env_bind_addr, init_tracing, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let state = Arc::new(AppState::from_env());
    let app = build_router(state);

    let addr = env_bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("chat2gemini listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
