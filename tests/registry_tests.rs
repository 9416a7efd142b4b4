//! Integration tests for the adapter registry.

mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{DB_NAME, Goods, config, goods};
use obj_kv::prelude::*;
use tempfile::TempDir;

#[tokio::test]
async fn test_one_adapter_per_name() -> Result<()> {
    let dir = TempDir::new()?;
    let registry = AdapterRegistry::new();

    let a = registry.get_or_create(config(&dir, 1)).await?;
    let b = registry.get_or_create(config(&dir, 1)).await?;
    assert!(Arc::ptr_eq(&a, &b));

    // Constructed, not opened.
    assert_eq!(a.state(), ConnectionState::Closed);

    a.insert("goods", &goods(1)).await?;
    let found: Option<Goods> = b.get("goods", 1).await?;
    assert_eq!(found, Some(goods(1)));
    Ok(())
}

#[tokio::test]
async fn test_existing_entry_wins_over_new_config() -> Result<()> {
    let dir = TempDir::new()?;
    let registry = AdapterRegistry::new();

    let first = registry.get_or_create(config(&dir, 1)).await?;
    let second = registry.get_or_create(config(&dir, 5)).await?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.config().version, 1);
    Ok(())
}

#[tokio::test]
async fn test_names_and_lookup() -> Result<()> {
    let dir = TempDir::new()?;
    let registry = AdapterRegistry::new();

    registry.get_or_create(config(&dir, 1)).await?;
    registry
        .get_or_create(AdapterConfig::new("audit", 1).data_dir(dir.path()))
        .await?;

    assert_eq!(registry.names().await, vec!["audit".to_string(), DB_NAME.to_string()]);
    assert!(registry.get(DB_NAME).await.is_some());
    assert!(registry.get("unknown").await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_release_closes_and_forgets() -> Result<()> {
    let dir = TempDir::new()?;
    let registry = AdapterRegistry::new();

    let adapter = registry.get_or_create(config(&dir, 1)).await?;
    adapter.insert("goods", &goods(1)).await?;
    assert_eq!(adapter.state(), ConnectionState::Open { version: 1 });

    assert!(registry.release(DB_NAME).await?);
    assert_eq!(adapter.state(), ConnectionState::Closed);
    assert!(registry.get(DB_NAME).await.is_none());
    assert!(!registry.release(DB_NAME).await?);
    drop(adapter);

    // A fresh adapter sees the persisted data.
    let reopened = registry.get_or_create(config(&dir, 1)).await?;
    assert_eq!(reopened.count("goods").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_release_with_live_cursor_leaves_holders_working() -> Result<()> {
    let dir = TempDir::new()?;
    let registry = AdapterRegistry::new();

    let adapter = registry.get_or_create(config(&dir, 1)).await?;
    adapter.insert_many("goods", &[goods(1), goods(2)]).await?;
    let mut cursor = adapter.cursor::<Goods>("goods", None, None).await?;

    assert!(registry.release(DB_NAME).await?);

    let found: Option<Goods> = adapter.get("goods", 2).await?;
    assert_eq!(found, Some(goods(2)));
    assert_eq!(cursor.next().await?.map(|g| g.id), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_not_registered() -> Result<()> {
    let registry = AdapterRegistry::new();
    let result = registry.get_or_create(AdapterConfig::new("bad name", 1)).await;
    assert!(matches!(result, Err(Error::Config(_))));
    assert!(registry.names().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_all_releases_everything() -> Result<()> {
    let dir = TempDir::new()?;
    let registry = AdapterRegistry::new();

    let adapter = registry.get_or_create(config(&dir, 1)).await?;
    adapter.open().await?;

    registry.close_all().await?;
    assert!(registry.names().await.is_empty());
    assert_eq!(adapter.state(), ConnectionState::Closed);
    Ok(())
}
