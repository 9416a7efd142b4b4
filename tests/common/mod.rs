//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use obj_kv::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Records
// =============================================================================

/// A product row shaped like the shop catalogue the store was built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goods {
    pub id: i64,
    pub item_id: String,
    pub goods_id: String,
    pub barcode: String,
    pub category: String,
    pub name: String,
    pub brand: String,
    pub specification: String,
    pub status: i32,
    pub status_desc: String,
    pub item_sku_id: String,
}

impl Record for Goods {
    fn primary_key(&self) -> Key {
        Key::from(self.id)
    }
}

/// Synthetic goods row `id`; `goodsId` is `2000000 + id`.
pub fn goods(id: i64) -> Goods {
    Goods {
        id,
        item_id: format!("{}", 2000 + id),
        goods_id: format!("{}", 2_000_000 + id),
        barcode: format!("69022653{:05}", id),
        category: "Sauces".to_string(),
        name: format!("Oyster sauce {}", id),
        brand: if id % 2 == 0 { "Haitian" } else { "Lee Kum Kee" }.to_string(),
        specification: "260g bottle".to_string(),
        status: 1,
        status_desc: String::new(),
        item_sku_id: format!("{}", 2500 + id),
    }
}

/// A record keyed by a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub slug: String,
    pub body: String,
}

impl Record for Note {
    fn primary_key(&self) -> Key {
        Key::from(&self.slug)
    }
}

// =============================================================================
// Schemas and adapters
// =============================================================================

pub const DB_NAME: &str = "shop";

pub fn goods_schema() -> StoreSchema {
    StoreSchema::new("goods", "id")
        .index("goodsId", true)
        .index("name", false)
        .index("brand", false)
}

pub fn notes_schema() -> StoreSchema {
    StoreSchema::new("notes", "slug")
}

pub fn config(dir: &TempDir, version: u32) -> AdapterConfig {
    AdapterConfig::new(DB_NAME, version)
        .data_dir(dir.path())
        .durability(Durability::Buffer)
        .store(goods_schema())
}

/// An adapter over a fresh database holding the `goods` store.
pub struct TestDb {
    pub dir: TempDir,
    pub adapter: StoreAdapter,
}

impl TestDb {
    pub async fn new() -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let adapter = StoreAdapter::connect(config(&dir, 1)).await?;
        Ok(Self { dir, adapter })
    }

    pub async fn with_page_size(page_size: usize) -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let adapter = StoreAdapter::connect(config(&dir, 1).cursor_page_size(page_size)).await?;
        Ok(Self { dir, adapter })
    }

    /// Insert goods `ids` in one batch.
    pub async fn seed(&self, ids: impl IntoIterator<Item = i64>) -> anyhow::Result<Vec<Goods>> {
        let items: Vec<Goods> = ids.into_iter().map(goods).collect();
        self.adapter.insert_many("goods", &items).await?;
        Ok(items)
    }
}
