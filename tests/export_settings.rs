use anyhow::Result;
use serde_json::{json, Value};
use tempfile::tempdir;
use villaops_lib::export::{self, ExportFormat, SortDirection, TableView};
use villaops_lib::inventory::{self, InventoryItemInput};
use villaops_lib::preferences;
use villaops_lib::repo::ListQuery;

#[path = "util.rs"]
mod util;

async fn stock(store: &villaops_lib::Store) -> Result<()> {
    for (name, quantity, category) in [
        ("Towels, large", 12, "linen"),
        ("Shampoo", 40, "toiletries"),
        ("Pillow \"soft\"", 6, "linen"),
    ] {
        inventory::create_item(
            store,
            &InventoryItemInput {
                name: name.into(),
                category: Some(category.into()),
                quantity,
                min_quantity: 10,
                unit_cost: 2.5,
                ..InventoryItemInput::default()
            },
        )
        .await?;
    }
    Ok(())
}

#[tokio::test]
async fn filtered_sorted_view_exports_as_csv() -> Result<()> {
    let store = util::temp_store().await;
    stock(&store).await?;
    let dir = tempdir()?;
    let out = dir.path().join("exports").join("linen.csv");

    let view = TableView::load(&store, "inventory_items", &ListQuery::new())
        .await?
        .select_columns(&["name", "quantity"])
        .filter_text("LINEN")
        .sort_by("quantity", SortDirection::Asc);
    // The filter only looks at visible columns.
    assert_eq!(view.row_count(), 0);

    let view = TableView::load(&store, "inventory_items", &ListQuery::new())
        .await?
        .select_columns(&["name", "category", "quantity"])
        .filter_text("LINEN")
        .sort_by("quantity", SortDirection::Asc);
    let file = export::write_view(&view, &out, ExportFormat::Csv)?;
    assert_eq!(file.rows, 2);
    assert_eq!(file.sha256.len(), 64);

    let text = std::fs::read_to_string(&out)?;
    assert_eq!(
        text,
        "name,category,quantity\n\"Pillow \"\"soft\"\"\",linen,6\n\"Towels, large\",linen,12\n"
    );
    assert!(!dir.path().join("exports").join("linen.csv.partial").exists());
    Ok(())
}

#[tokio::test]
async fn json_export_keeps_visible_columns_only() -> Result<()> {
    let store = util::temp_store().await;
    stock(&store).await?;
    let dir = tempdir()?;
    let out = dir.path().join("stock.json");

    let view = TableView::load(&store, "inventory_items", &ListQuery::new())
        .await?
        .select_columns(&["name", "quantity"])
        .sort_by("quantity", SortDirection::Desc);
    export::write_view(&view, &out, ExportFormat::Json)?;

    let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    assert_eq!(parsed[0], json!({"name": "Shampoo", "quantity": 40}));
    assert_eq!(parsed.as_array().map(Vec::len), Some(3));
    Ok(())
}

#[tokio::test]
async fn unknown_tables_cannot_be_exported() -> Result<()> {
    let store = util::temp_store().await;
    let err = TableView::load(&store, "sqlite_master", &ListQuery::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "REPO/INVALID_TABLE");
    assert!("xlsx".parse::<ExportFormat>().is_err());
    Ok(())
}

#[tokio::test]
async fn settings_round_trip_between_stores() -> Result<()> {
    let source = util::temp_store().await;
    preferences::set_notifications_enabled(&source, false).await?;
    preferences::set(&source, "calendar.view", &json!({"mode": "month", "weekStart": 1})).await?;

    let dir = tempdir()?;
    let path = dir.path().join("settings.json");
    let file = export::export_settings_file(&source, &path).await?;
    assert_eq!(file.rows, 2);

    let target = util::temp_store().await;
    assert!(preferences::notifications_enabled(&target).await?);
    let restored = export::import_settings_file(&target, &path).await?;
    assert_eq!(restored, 2);
    assert!(!preferences::notifications_enabled(&target).await?);
    assert_eq!(preferences::list(&target).await?, preferences::list(&source).await?);
    Ok(())
}

#[tokio::test]
async fn settings_import_replaces_what_was_there() -> Result<()> {
    let source = util::temp_store().await;
    preferences::set(&source, "theme", &json!("dark")).await?;
    let snapshot = export::settings_to_json(&export::export_settings(&source).await?)?;

    let target = util::temp_store().await;
    preferences::set(&target, "stale", &json!(1)).await?;
    preferences::set(&target, "theme", &json!("light")).await?;
    export::import_settings(&target, &snapshot).await?;

    assert_eq!(preferences::get(&target, "stale").await?, None);
    assert_eq!(preferences::list(&target).await?, preferences::list(&source).await?);
    Ok(())
}

#[tokio::test]
async fn settings_with_unknown_version_are_rejected() -> Result<()> {
    let store = util::temp_store().await;
    let err = export::import_settings(
        &store,
        r#"{"version": 99, "exportedAt": "2025-01-01T00:00:00Z", "preferences": {"a": 1}}"#,
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "SETTINGS/VERSION");
    assert!(preferences::get(&store, "a").await?.is_none());

    let err = export::import_settings(&store, "not json").await.unwrap_err();
    assert_eq!(err.context().get("operation").map(String::as_str), Some("import_settings"));
    Ok(())
}
