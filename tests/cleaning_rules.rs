use std::collections::BTreeMap;

use anyhow::Result;
use villaops_lib::bookings;
use villaops_lib::cleaning::{self, CleaningActionInput, CleaningRuleInput};
use villaops_lib::housekeeping;

#[path = "util.rs"]
mod util;

fn rule(name: &str, min: u32, max: u32, days: &[(u32, &[&str])]) -> CleaningRuleInput {
    let actions_by_day: BTreeMap<u32, Vec<String>> = days
        .iter()
        .map(|(day, actions)| (*day, actions.iter().map(|a| a.to_string()).collect()))
        .collect();
    CleaningRuleInput {
        rule_name: name.into(),
        min_nights: min,
        max_nights: max,
        actions_by_day,
        is_active: true,
        is_global: true,
        property_id: None,
    }
}

#[tokio::test]
async fn four_night_stay_matches_three_to_six_rule() -> Result<()> {
    let store = util::temp_store().await;
    let villa = util::property(&store, "Villa Azul").await;
    let created = cleaning::create_rule(
        &store,
        &rule("Short stay", 3, 6, &[(1, &["standard_clean"]), (3, &["towel_change"]), (5, &["linen_change"])]),
    )
    .await?;
    assert_eq!((created.stay_range.min, created.stay_range.max), (3, 6));

    let four = util::booking(&store, &villa.id, "2025-07-01", "2025-07-05").await;
    let ten = util::booking(&store, &villa.id, "2025-08-01", "2025-08-11").await;

    let all = bookings::list_for_property(&store, &villa.id).await?;
    let selected = bookings::filter_by_stay_length(&all, 3, 6);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, four.id);

    let rules = cleaning::rules_for_stay(&store, 4, Some(&villa.id)).await?;
    assert_eq!(rules.len(), 1);
    assert!(cleaning::rules_for_stay(&store, 10, Some(&villa.id)).await?.is_empty());

    let generation = cleaning::generate_tasks_for_booking(&store, &ten).await?;
    assert_eq!(generation.rule_id, None);
    assert!(generation.created.is_empty());
    Ok(())
}

#[tokio::test]
async fn task_generation_is_idempotent() -> Result<()> {
    let store = util::temp_store().await;
    let villa = util::property(&store, "Villa Sol").await;
    cleaning::create_rule(
        &store,
        &rule("Short stay", 3, 6, &[(1, &["standard_clean"]), (3, &["towel_change"]), (5, &["linen_change"])]),
    )
    .await?;
    let stay = util::booking(&store, &villa.id, "2025-07-01", "2025-07-05").await;

    let first = cleaning::generate_tasks_for_booking(&store, &stay).await?;
    // Day 5 falls after a four-night stay.
    let mut due: Vec<(String, String)> = first
        .created
        .iter()
        .map(|t| (t.due_date.clone(), t.task_type.clone()))
        .collect();
    due.sort();
    assert_eq!(
        due,
        vec![
            ("2025-07-01".to_string(), "standard_clean".to_string()),
            ("2025-07-03".to_string(), "towel_change".to_string()),
        ]
    );

    let second = cleaning::generate_tasks_for_booking(&store, &stay).await?;
    assert!(second.created.is_empty());
    assert_eq!(second.skipped, 2);
    assert_eq!(housekeeping::list_for_booking(&store, &stay.id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn cancelled_bookings_get_no_tasks() -> Result<()> {
    let store = util::temp_store().await;
    let villa = util::property(&store, "Villa Luna").await;
    cleaning::create_rule(&store, &rule("Any", 1, 30, &[(1, &["standard_clean"])])).await?;
    let stay = util::booking(&store, &villa.id, "2025-07-01", "2025-07-03").await;
    let cancelled = bookings::set_status(&store, &stay.id, "cancelled").await?;

    let generation = cleaning::generate_tasks_for_booking(&store, &cancelled).await?;
    assert!(generation.created.is_empty());
    assert!(housekeeping::list_for_booking(&store, &stay.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn assigned_rules_win_over_global_ones() -> Result<()> {
    let store = util::temp_store().await;
    let villa = util::property(&store, "Villa Mar").await;
    let other = util::property(&store, "Villa Roca").await;
    let global = cleaning::create_rule(&store, &rule("Global", 1, 7, &[(1, &["standard_clean"])])).await?;
    let mut scoped_input = rule("Deep clean", 1, 30, &[(1, &["deep_clean"])]);
    scoped_input.is_global = false;
    let scoped = cleaning::create_rule(&store, &scoped_input).await?;

    cleaning::assign_rule(&store, &scoped.id, &villa.id).await?;
    // Assigning twice keeps a single row.
    let assignment = cleaning::assign_rule(&store, &scoped.id, &villa.id).await?;
    assert_eq!(cleaning::list_assignments(&store, Some(&villa.id)).await?.len(), 1);

    let for_villa = cleaning::rules_for_stay(&store, 4, Some(&villa.id)).await?;
    assert_eq!(for_villa[0].id, scoped.id);
    assert_eq!(for_villa[1].id, global.id);

    let for_other = cleaning::rules_for_stay(&store, 4, Some(&other.id)).await?;
    assert_eq!(for_other.len(), 1);
    assert_eq!(for_other[0].id, global.id);

    cleaning::set_assignment_active(&store, &assignment.id, false).await?;
    let after = cleaning::rules_for_stay(&store, 4, Some(&villa.id)).await?;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, global.id);
    Ok(())
}

#[tokio::test]
async fn inactive_rules_are_ignored() -> Result<()> {
    let store = util::temp_store().await;
    let created = cleaning::create_rule(&store, &rule("Any", 1, 30, &[(1, &["standard_clean"])])).await?;
    cleaning::set_rule_active(&store, &created.id, false).await?;
    assert!(cleaning::rules_for_stay(&store, 3, None).await?.is_empty());
    assert_eq!(cleaning::list_rules(&store, false).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn rule_with_reversed_bounds_is_stored_ascending() -> Result<()> {
    let store = util::temp_store().await;
    let created = cleaning::create_rule(&store, &rule("Reversed", 6, 3, &[])).await?;
    assert_eq!((created.stay_range.min, created.stay_range.max), (3, 6));
    let loaded = cleaning::get_rule(&store, &created.id).await?.expect("rule");
    assert_eq!(loaded.stay_range, created.stay_range);
    Ok(())
}

#[tokio::test]
async fn malformed_stored_json_falls_back_when_loading() -> Result<()> {
    let store = util::temp_store().await;
    let created = cleaning::create_rule(&store, &rule("Broken", 2, 4, &[(1, &["standard_clean"])])).await?;
    sqlx::query("UPDATE cleaning_rules SET stay_length_range = 'not json', actions_by_day = '{\"x\": 1, \"2\": [\"towel_change\"]}' WHERE id = ?")
        .bind(&created.id)
        .execute(store.pool())
        .await?;

    let loaded = cleaning::get_rule(&store, &created.id).await?.expect("rule");
    assert_eq!(loaded.stay_range, cleaning::FALLBACK_RANGE);
    assert_eq!(loaded.actions_by_day.len(), 1);
    assert_eq!(loaded.actions_by_day[&2], vec!["towel_change".to_string()]);
    Ok(())
}

#[tokio::test]
async fn plan_minutes_uses_action_estimates() -> Result<()> {
    let store = util::temp_store().await;
    cleaning::create_action(
        &store,
        &CleaningActionInput {
            action_type: "standard_clean".into(),
            display_name: "Standard clean".into(),
            description: None,
            estimated_minutes: 90,
            checklist: vec!["Beds".into(), "Bathrooms".into()],
        },
    )
    .await?;
    cleaning::create_action(
        &store,
        &CleaningActionInput {
            action_type: "towel_change".into(),
            display_name: "Towel change".into(),
            description: None,
            estimated_minutes: 15,
            checklist: Vec::new(),
        },
    )
    .await?;
    let created = cleaning::create_rule(
        &store,
        &rule("Week", 1, 7, &[(1, &["standard_clean"]), (3, &["towel_change", "unknown"])]),
    )
    .await?;
    let plan = cleaning::plan_for_stay(&created, 5);
    let actions = cleaning::list_actions(&store).await?;
    assert_eq!(cleaning::plan_minutes(&plan, &actions), 105);
    Ok(())
}
