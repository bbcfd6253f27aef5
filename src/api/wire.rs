//! JSON shapes exchanged with the remote collection, playlist and push APIs.
//!
//! Byte fields (gids, picture blobs, revisions) travel as standard base64.

use serde::{Deserialize, Serialize};

use crate::ids::EntityKind;

/// `#[serde(with = "base64_bytes")]` for `Vec<u8>` fields.
pub mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ── Collection ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionItem {
    pub uri: String,
    pub added_at: i64,
    pub is_removed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub username: String,
    pub set: String,
    pub pagination_token: String,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageResponse {
    pub items: Vec<CollectionItem>,
    pub next_page_token: String,
    pub sync_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRequest {
    pub username: String,
    pub set: String,
    pub last_sync_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeltaResponse {
    pub items: Vec<CollectionItem>,
    pub sync_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub username: String,
    pub set: String,
    pub client_update_id: String,
    pub items: Vec<CollectionItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentFilterEntry {
    pub title: String,
    pub query: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentFilterResponse {
    pub content_filters: Vec<ContentFilterEntry>,
}

// ── Playlists / rootlist ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PictureSize {
    pub target_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListAttributes {
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub picture: Vec<u8>,
    pub picture_size: Vec<PictureSize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemAttributes {
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListItem {
    pub uri: String,
    pub attributes: ItemAttributes,
}

/// Per-item metadata returned alongside the rootlist, or for a single playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaylistMeta {
    pub attributes: ListAttributes,
    pub owner_username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListItems {
    pub items: Vec<ListItem>,
    pub meta_items: Vec<PlaylistMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Rootlist {
    #[serde(with = "base64_bytes")]
    pub revision: Vec<u8>,
    pub contents: ListItems,
}

/// Structural rootlist change. Applied in the order received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum RootlistOp {
    Add {
        #[serde(default)]
        from_index: u32,
        items: Vec<ListItem>,
    },
    #[serde(rename = "REM")]
    Remove {
        #[serde(default)]
        from_index: u32,
        items: Vec<ListItem>,
    },
    #[serde(rename = "MOV")]
    Move {
        #[serde(default)]
        from_index: u32,
        #[serde(default)]
        length: u32,
        #[serde(default)]
        to_index: u32,
    },
    UpdateItemAttributes {
        #[serde(default)]
        index: u32,
        #[serde(default)]
        new_attributes: ItemAttributes,
    },
    UpdateListAttributes {
        #[serde(default)]
        new_attributes: ListAttributes,
    },
    /// Any op kind this client does not know.
    #[serde(other)]
    Unknown,
}

impl RootlistOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "ADD",
            Self::Remove { .. } => "REM",
            Self::Move { .. } => "MOV",
            Self::UpdateItemAttributes { .. } => "UPDATE_ITEM_ATTRIBUTES",
            Self::UpdateListAttributes { .. } => "UPDATE_LIST_ATTRIBUTES",
            Self::Unknown => "KIND_UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Diff {
    #[serde(with = "base64_bytes")]
    pub from_revision: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub to_revision: Vec<u8>,
    pub ops: Vec<RootlistOp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RootlistDelta {
    pub diff: Diff,
}

// ── Push notifications ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateEntryType {
    Track,
    Album,
    Artist,
    Show,
    Episode,
    #[serde(other)]
    Unrecognized,
}

impl UpdateEntryType {
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Self::Track => Some(EntityKind::Track),
            Self::Album => Some(EntityKind::Album),
            Self::Artist => Some(EntityKind::Artist),
            Self::Show => Some(EntityKind::Show),
            Self::Episode => Some(EntityKind::Episode),
            Self::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionUpdateEntry {
    #[serde(with = "base64_bytes")]
    pub identifier: Vec<u8>,
    #[serde(rename = "type")]
    pub kind: UpdateEntryType,
    #[serde(default)]
    pub added_at: i64,
    #[serde(default)]
    pub removed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionUpdate {
    pub items: Vec<CollectionUpdateEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaylistModificationInfo {
    pub uri: String,
    #[serde(with = "base64_bytes")]
    pub new_revision: Vec<u8>,
}
