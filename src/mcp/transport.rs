//! MCP transport layer for stdio and streamable HTTP.

use rmcp::ServiceExt;
use rmcp::transport::io::stdio;

use super::server::PvkgMcpServer;

/// Starts the MCP server with stdio transport.
///
/// The server reads JSON-RPC messages from stdin and writes responses to
/// stdout, so logging must stay on stderr.
///
/// # Errors
///
/// Returns an error if the server fails to start or encounters a runtime error.
pub async fn serve_stdio(server: PvkgMcpServer) -> anyhow::Result<()> {
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Starts the MCP server with streamable HTTP transport at `/mcp`.
///
/// Every session gets a clone of `server`; they all share one knowledge
/// service. Stops on Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to bind or encounters a runtime error.
pub async fn serve_http(server: PvkgMcpServer, host: &str, port: u16) -> anyhow::Result<()> {
    use rmcp::transport::streamable_http_server::{
        StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
    };
    use std::sync::Arc;

    let ct = tokio_util::sync::CancellationToken::new();

    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            cancellation_token: ct.child_token(),
            ..Default::default()
        },
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let addr = format!("{host}:{port}");
    let tcp_listener = tokio::net::TcpListener::bind(&addr).await?;

    // stdout may carry protocol traffic in other modes; announce on stderr.
    #[allow(clippy::print_stderr)]
    {
        eprintln!("pvkg MCP server listening on http://{addr}/mcp");
    }

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            ct.cancel();
        })
        .await?;

    Ok(())
}
