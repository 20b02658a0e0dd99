use anyhow::Result;
use villaops_lib::inventory::{self, InventoryItemInput, OrderLine, OrderStatus};
use villaops_lib::realtime::{ChangeFilter, ChangeKind};

#[path = "util.rs"]
mod util;

fn item(name: &str, quantity: i64, min_quantity: i64) -> InventoryItemInput {
    InventoryItemInput {
        name: name.into(),
        quantity,
        min_quantity,
        unit_cost: 4.0,
        ..InventoryItemInput::default()
    }
}

#[tokio::test]
async fn receiving_an_order_restocks_items() -> Result<()> {
    let store = util::temp_store().await;
    let towels = inventory::create_item(&store, &item("Towels", 2, 10)).await?;
    let soap = inventory::create_item(&store, &item("Soap", 20, 5)).await?;
    assert_eq!(inventory::low_stock(&store, None).await?.len(), 1);

    let order = inventory::create_order(
        &store,
        "Linen Co",
        None,
        &[
            OrderLine { item_id: towels.id.clone(), quantity: 12, unit_cost: 3.5 },
            OrderLine { item_id: soap.id.clone(), quantity: 5, unit_cost: 1.0 },
        ],
    )
    .await?;
    assert_eq!(order.status, OrderStatus::Draft);
    let lines = inventory::order_lines(&store, &order.id).await?;
    assert_eq!(inventory::order_total(&lines), 47.0);

    // Drafts cannot be received.
    let err = inventory::receive_order(&store, &order.id).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/ORDER_STATE");
    assert_eq!(inventory::get_item(&store, &towels.id).await?.expect("item").quantity, 2);

    let placed = inventory::place_order(&store, &order.id).await?;
    assert_eq!(placed.status, OrderStatus::Ordered);
    assert!(placed.ordered_at.is_some());

    let mut changes = store.changes().subscribe(ChangeFilter::table("inventory_items"));
    let received = inventory::receive_order(&store, &order.id).await?;
    assert_eq!(received.status, OrderStatus::Received);
    assert!(received.received_at.is_some());

    assert_eq!(inventory::get_item(&store, &towels.id).await?.expect("item").quantity, 14);
    assert_eq!(inventory::get_item(&store, &soap.id).await?.expect("item").quantity, 25);
    assert!(inventory::low_stock(&store, None).await?.is_empty());

    let event = changes.try_recv().expect("restock published");
    assert_eq!(event.kind, ChangeKind::Update);

    // Receiving twice is refused.
    let err = inventory::receive_order(&store, &order.id).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/ORDER_STATE");
    assert_eq!(inventory::get_item(&store, &towels.id).await?.expect("item").quantity, 14);
    Ok(())
}

#[tokio::test]
async fn cancelled_orders_stay_cancelled() -> Result<()> {
    let store = util::temp_store().await;
    let towels = inventory::create_item(&store, &item("Towels", 2, 10)).await?;
    let order = inventory::create_order(
        &store,
        "Linen Co",
        None,
        &[OrderLine { item_id: towels.id.clone(), quantity: 3, unit_cost: 2.0 }],
    )
    .await?;
    let cancelled = inventory::cancel_order(&store, &order.id).await?;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(inventory::place_order(&store, &order.id).await.is_err());
    assert!(inventory::cancel_order(&store, &order.id).await.is_err());
    assert_eq!(
        inventory::list_orders(&store, Some(OrderStatus::Cancelled)).await?.len(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn stock_never_goes_negative() -> Result<()> {
    let store = util::temp_store().await;
    let soap = inventory::create_item(&store, &item("Soap", 3, 1)).await?;
    assert_eq!(inventory::adjust_quantity(&store, &soap.id, -3).await?.quantity, 0);
    let err = inventory::adjust_quantity(&store, &soap.id, -1).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/STOCK");

    inventory::adjust_quantity(&store, &soap.id, 5).await?;
    let err = inventory::adjust_quantity(&store, &soap.id, i64::MAX).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/STOCK");
    let kept = inventory::get_item(&store, &soap.id).await?.expect("item kept");
    assert_eq!(kept.quantity, 5);
    Ok(())
}

#[tokio::test]
async fn empty_orders_are_rejected() -> Result<()> {
    let store = util::temp_store().await;
    let err = inventory::create_order(&store, "Linen Co", None, &[]).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/ORDER_EMPTY");
    let err = inventory::create_order(&store, "  ", None, &[]).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/VENDOR");
    assert!(inventory::list_orders(&store, None).await?.is_empty());
    Ok(())
}
