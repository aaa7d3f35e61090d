use memory_api_http::{CancellationToken, FileUpload, MemoryApiClient, MemoryApiError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: upload <file>"))?;
    let file_name = std::path::Path::new(&path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_owned();

    let client = MemoryApiClient::from_env()?;
    let cancel = CancellationToken::new();

    // Ctrl-C aborts the upload, including any pending retry wait.
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let file = tokio::fs::File::open(&path).await?;
    let upload = FileUpload::seekable(file, file_name, "application/octet-stream")
        .field("source", "cli");

    match client.documents().upload(upload, &cancel).await {
        Ok(document) => println!("uploaded {} as {}", document.file_name, document.id),
        Err(MemoryApiError::RateLimit { retry_after, .. }) => {
            eprintln!("rate limited; retry after {retry_after:?}");
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
