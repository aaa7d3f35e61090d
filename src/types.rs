use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for [`Memories::create`](crate::memories::Memories::create).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CreateMemory {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CreateMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn in_space(mut self, space_id: impl Into<String>) -> Self {
        self.space_id = Some(space_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Filters and paging cursor for listing memories.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListMemories {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub space_id: Option<String>,
}

/// One page of a cursor-paginated listing.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateMemory, Memory, Page};

    #[test]
    fn create_memory_skips_empty_fields() {
        let body = serde_json::to_value(CreateMemory::new("remember this")).expect("serialize");
        assert_eq!(body, json!({"content": "remember this"}));

        let body = serde_json::to_value(
            CreateMemory::new("x")
                .in_space("sp-1")
                .tag("work")
                .metadata("source", "chat"),
        )
        .expect("serialize");
        assert_eq!(
            body,
            json!({"content": "x", "space_id": "sp-1", "tags": ["work"], "metadata": {"source": "chat"}})
        );
    }

    #[test]
    fn page_tolerates_missing_fields() {
        let page: Page<Memory> = serde_json::from_value(json!({})).expect("deserialize");
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());

        let page: Page<Memory> = serde_json::from_value(json!({
            "items": [{"id": "m1", "content": "a", "created_at": "2024-05-01T10:00:00Z"}],
            "next_cursor": "c2"
        }))
        .expect("deserialize");
        assert_eq!(page.items[0].id, "m1");
        assert!(page.items[0].created_at.is_some());
        assert_eq!(page.next_cursor.as_deref(), Some("c2"));
    }
}
