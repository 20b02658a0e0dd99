use std::time::Duration;

use anyhow::Result;
use villaops_lib::realtime::{ChangeFilter, ChangeKind};
use villaops_lib::users::{self, AccessLevel, Role};

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn permission_changes_reach_only_the_watched_user() -> Result<()> {
    let store = util::temp_store().await;
    let maria = users::create_profile(&store, "maria@villas.test", Some("Maria"), Role::Housekeeper).await?;
    let tom = users::create_profile(&store, "tom@villas.test", None, Role::Maintenance).await?;

    let mut feed = users::watch_permissions(&store, &maria.id);
    assert_eq!(store.changes().active_subscriptions(), 1);

    users::set_permission(&store, &tom.id, "inventory", true, false).await?;
    users::set_permission(&store, &maria.id, "housekeeping", true, false).await?;

    let event = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await?
        .expect("hub alive");
    assert_eq!(event.kind, ChangeKind::Insert);
    assert_eq!(event.record["section"], "housekeeping");
    assert!(feed.try_recv().is_none());

    users::set_permission(&store, &maria.id, "housekeeping", true, true).await?;
    let update = feed.try_recv().expect("update delivered");
    assert_eq!(update.kind, ChangeKind::Update);
    assert_eq!(users::permissions_for(&store, &maria.id).await?.len(), 1);

    feed.unsubscribe();
    assert_eq!(store.changes().active_subscriptions(), 0);
    Ok(())
}

#[tokio::test]
async fn access_follows_role_and_section_flags() -> Result<()> {
    let store = util::temp_store().await;
    let admin = users::create_profile(&store, "admin@villas.test", None, Role::Admin).await?;
    let staff = users::create_profile(&store, "staff@villas.test", None, Role::Housekeeper).await?;

    assert!(users::has_permission(&store, &admin.id, "reports", AccessLevel::Edit).await?);
    assert!(!users::has_permission(&store, &staff.id, "reports", AccessLevel::View).await?);

    users::set_permission(&store, &staff.id, "reports", false, true).await?;
    assert!(users::has_permission(&store, &staff.id, "reports", AccessLevel::View).await?);
    assert!(users::has_permission(&store, &staff.id, "reports", AccessLevel::Edit).await?);

    users::set_role(&store, &staff.id, Role::Admin).await?;
    assert!(users::has_permission(&store, &staff.id, "anything", AccessLevel::Edit).await?);
    assert!(!users::has_permission(&store, "missing", "reports", AccessLevel::View).await?);
    Ok(())
}

#[tokio::test]
async fn invalid_emails_are_rejected() -> Result<()> {
    let store = util::temp_store().await;
    let err = users::create_profile(&store, "not-an-email", None, Role::Owner)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/EMAIL");
    assert!("janitor".parse::<Role>().is_err());
    Ok(())
}

#[tokio::test]
async fn table_filters_parse_eq_predicates() -> Result<()> {
    let store = util::temp_store().await;
    let villa = util::property(&store, "Villa Azul").await;
    let other = util::property(&store, "Villa Roca").await;
    let filter = ChangeFilter::parse("bookings", &format!("property_id=eq.{}", villa.id))?;
    let mut feed = store.changes().subscribe(filter);

    util::booking(&store, &other.id, "2025-07-01", "2025-07-03").await;
    let mine = util::booking(&store, &villa.id, "2025-07-01", "2025-07-03").await;

    let event = feed.try_recv().expect("matching booking event");
    assert_eq!(event.id, mine.id);
    assert!(feed.try_recv().is_none());
    assert!(ChangeFilter::parse("bookings", "property_id=gt.3").is_err());
    Ok(())
}
