use super::types::AppState;
use anyhow::Result;
use tokio::net::TcpListener;

pub async fn serve(port: u16, state: AppState, max_body_bytes: usize) -> Result<()> {
    let app = super::routes::create_router(state, max_body_bytes);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
