//! Memory resource: CRUD calls and cursor pagination.

use futures::{stream, Stream, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    ApiRequest, CreateMemory, ListMemories, Memory, MemoryApiClient, MemoryApiError, Page, Result,
};

const MEMORIES_PATH: &str = "/v1/memories";

/// Returned by [`MemoryApiClient::memories`].
#[derive(Clone, Copy, Debug)]
pub struct Memories<'a> {
    client: &'a MemoryApiClient,
}

impl<'a> Memories<'a> {
    pub(crate) fn new(client: &'a MemoryApiClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, memory: &CreateMemory, cancel: &CancellationToken) -> Result<Memory> {
        let request = ApiRequest::post(MEMORIES_PATH).json(memory)?;
        self.client.send(request, cancel).await?.json()
    }

    pub async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<Memory> {
        let request = ApiRequest::get(memory_path(id)?);
        self.client.send(request, cancel).await?.json()
    }

    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let request = ApiRequest::delete(memory_path(id)?);
        self.client.send(request, cancel).await?;
        Ok(())
    }

    /// Fetches a single page.
    pub async fn list(
        &self,
        params: &ListMemories,
        cancel: &CancellationToken,
    ) -> Result<Page<Memory>> {
        let request = ApiRequest::get(MEMORIES_PATH)
            .query_opt("limit", params.limit)
            .query_opt("cursor", params.cursor.as_deref())
            .query_opt("space_id", params.space_id.as_deref());
        self.client.send(request, cancel).await?.json()
    }

    /// Lazily walks every page starting at `params`, one request per page
    /// boundary. Calling it again restarts from `params`.
    pub fn stream(
        &self,
        params: ListMemories,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<Memory>> + Send + 'a {
        let client = self.client;
        stream::try_unfold(Some(params), move |next| {
            let cancel = cancel.clone();
            async move {
                let Some(params) = next else {
                    return Ok(None);
                };
                let page = Memories::new(client).list(&params, &cancel).await?;
                let next = page
                    .next_cursor
                    .filter(|cursor| !cursor.is_empty())
                    .map(|cursor| ListMemories {
                        cursor: Some(cursor),
                        ..params
                    });
                let items = page.items.into_iter().map(Ok::<Memory, MemoryApiError>);
                Ok::<_, MemoryApiError>(Some((stream::iter(items), next)))
            }
        })
        .try_flatten()
    }
}

/// Path of one memory. The id becomes a single percent-encoded segment;
/// dot segments would be collapsed by URL normalization and are rejected.
fn memory_path(id: &str) -> Result<String> {
    if matches!(id, "" | "." | "..") {
        return Err(MemoryApiError::InvalidRequest(format!(
            "invalid memory id '{id}'"
        )));
    }
    Ok(format!("{MEMORIES_PATH}/{}", urlencoding::encode(id)))
}
