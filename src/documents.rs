use tokio_util::sync::CancellationToken;

use crate::{Document, FileUpload, MemoryApiClient, Result};

const DOCUMENTS_PATH: &str = "/v1/documents";

/// Returned by [`MemoryApiClient::documents`].
#[derive(Clone, Copy, Debug)]
pub struct Documents<'a> {
    client: &'a MemoryApiClient,
}

impl<'a> Documents<'a> {
    pub(crate) fn new(client: &'a MemoryApiClient) -> Self {
        Self { client }
    }

    /// Uploads a file for ingestion. Extra form fields (space, tags, ...)
    /// travel on the [`FileUpload`].
    pub async fn upload(&self, upload: FileUpload, cancel: &CancellationToken) -> Result<Document> {
        self.client
            .send_multipart(DOCUMENTS_PATH, upload, cancel)
            .await?
            .json()
    }
}
