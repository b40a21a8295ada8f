// MCP Service Main Entry Point
// Serves the Bitbucket tools over stdio, or embeds the operation catalog with `ingest`
use anyhow::{Context, Result};
use bitbucket_dc_mcp::{
    bitbucket::BitbucketClient,
    catalog::OperationCatalog,
    embedding,
    health,
    index::{ingest_catalog, SqliteEmbeddingsRepository},
    logging::{self, TracingEventLog},
    search, McpConfig, McpServer, ToolManager,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenv::dotenv().ok();
    logging::init_tracing();

    let config = McpConfig::from_env()?;

    match std::env::args().nth(1).as_deref() {
        None | Some("serve") => serve(config).await,
        Some("ingest") => ingest(config).await,
        Some(other) => anyhow::bail!("Unknown command '{}' (expected 'serve' or 'ingest')", other),
    }
}

async fn ingest(config: McpConfig) -> Result<()> {
    let catalog = OperationCatalog::load(&config.catalog_path)?;
    let repository = SqliteEmbeddingsRepository::create(&config.embeddings_db_path)
        .await
        .with_context(|| format!("failed to create {}", config.embeddings_db_path.display()))?;

    let factory = embedding::factory_from_config(&config.embedding)?;
    let generator = factory.create().await.context("failed to load embedding model")?;

    let written = ingest_catalog(&repository, &catalog, generator.as_ref()).await?;
    generator.dispose().await;
    repository.close().await;

    info!(
        operations = written,
        path = %config.embeddings_db_path.display(),
        "Embeddings database ready"
    );
    Ok(())
}

async fn serve(config: McpConfig) -> Result<()> {
    info!("Starting Bitbucket Data Center MCP server");

    let catalog = Arc::new(OperationCatalog::load(&config.catalog_path)?);
    info!(operations = catalog.len(), "Operation catalog loaded");

    let service = search::build_search_service(&config, TracingEventLog::shared()).await?;
    let client = Arc::new(BitbucketClient::new(&config.bitbucket)?);

    let tools = ToolManager::with_default_tools(Arc::clone(&service), catalog, client);
    info!(tools = tools.tool_count(), "Initialized MCP tools");

    // Optional HTTP health check alongside the stdio protocol
    let health_handle = if config.health_port != 0 {
        Some(health::spawn_health_server(Arc::clone(&service), &config.host, config.health_port)?)
    } else {
        None
    };

    let result = McpServer::new(tools).run().await;
    if let Err(e) = &result {
        tracing::error!("MCP server error: {}", e);
    }

    service.dispose().await;
    service.cache().log_stats();

    if let Some(handle) = health_handle {
        handle.stop(true).await;
    }

    result
}
