use memory_api_http::{CancellationToken, CreateMemory, ListMemories, MemoryApiClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = MemoryApiClient::from_env()?;
    let cancel = CancellationToken::new();

    let memory = client
        .memories()
        .create(
            &CreateMemory::new("Kit prefers tea over coffee")
                .tag("preferences")
                .metadata("source", "demo"),
            &cancel,
        )
        .await?;
    println!("created {}", memory.id);

    let page = client
        .memories()
        .list(
            &ListMemories {
                limit: Some(10),
                ..ListMemories::default()
            },
            &cancel,
        )
        .await?;

    for memory in page.items {
        println!("{}: {}", memory.id, memory.content);
    }

    client.close();
    Ok(())
}
