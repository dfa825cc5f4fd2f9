//! FileStorage behaviour against a real directory

use budgetbot_engine::{
    Amount, Balance, BalanceStore, BalanceSubscription, BillingPeriod, Category, CategoryStore,
    FileStorage, OccurrenceStore, Operation, OperationStore, OperationType, ScheduledOccurrence,
    SubscriptionStore,
};
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use tokio_test::assert_ok;

fn create_storage() -> (FileStorage, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();
    (storage, temp_dir)
}

fn create_balance(amount: i64) -> Balance {
    Balance::new(
        "user_1".to_string(),
        "Main".to_string(),
        "USD".to_string(),
        Amount::from(amount),
    )
}

#[tokio::test]
async fn test_layout_created() {
    let (storage, _temp_dir) = create_storage();
    for dir in [
        "balances",
        "categories",
        "subscriptions",
        "occurrences",
        "operations",
    ] {
        assert!(storage.base_path().join(dir).is_dir(), "{dir} missing");
    }
}

#[tokio::test]
async fn test_balance_round_trip() {
    let (storage, _temp_dir) = create_storage();
    let mut balance = create_balance(250);
    assert_ok!(storage.create_balance(&balance).await);

    let loaded = storage.get_balance(&balance.balance_id).await.unwrap();
    assert_eq!(loaded, Some(balance.clone()));

    balance.amount = Amount::parse("199.99").unwrap();
    assert_ok!(storage.update_balance(&balance).await);
    let loaded = storage
        .get_balance(&balance.balance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.amount.to_fixed(), "199.99");

    // Amounts are stored as decimal strings.
    let raw = std::fs::read_to_string(
        storage
            .base_path()
            .join("balances")
            .join(format!("{}.json", balance.balance_id)),
    )
    .unwrap();
    assert!(raw.contains("\"199.99\""));
}

#[tokio::test]
async fn test_missing_records() {
    let (storage, _temp_dir) = create_storage();
    assert!(storage.get_balance("bal_nope").await.unwrap().is_none());
    assert!(storage.get_subscription("sub_nope").await.unwrap().is_none());
    assert!(storage.get_operation("op_nope").await.unwrap().is_none());

    // Updating something that was never created fails.
    assert!(storage.update_balance(&create_balance(1)).await.is_err());
    assert!(storage.delete_subscription("sub_nope").await.is_err());
    // Deleting an occurrence twice does not.
    assert_ok!(storage.delete_occurrence("occ_nope").await);
}

#[tokio::test]
async fn test_duplicate_create_rejected() {
    let (storage, _temp_dir) = create_storage();
    let category = Category::new("user_1".to_string(), "Food".to_string());
    assert_ok!(storage.create_category(&category).await);
    assert!(storage.create_category(&category).await.is_err());
}

#[tokio::test]
async fn test_ids_with_path_characters_rejected() {
    let (storage, _temp_dir) = create_storage();
    assert!(storage.get_balance("../escape").await.is_err());
    assert!(storage.get_balance("").await.is_err());
    let balance = create_balance(1).with_id("a/b");
    assert!(storage.create_balance(&balance).await.is_err());
}

#[tokio::test]
async fn test_subscription_crud() {
    let (storage, _temp_dir) = create_storage();
    let mut sub = BalanceSubscription::new(
        "bal_1".to_string(),
        "cat_1".to_string(),
        "Music".to_string(),
        Amount::parse("9.99").unwrap(),
        BillingPeriod::Monthly,
    );
    assert_ok!(storage.create_subscription(&sub).await);

    sub.name = "Music Family".to_string();
    assert_ok!(storage.update_subscription(&sub).await);
    let all = storage.list_subscriptions().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Music Family");
    assert_eq!(all[0].period, BillingPeriod::Monthly);

    assert_ok!(storage.delete_subscription(&sub.subscription_id).await);
    assert!(storage.list_subscriptions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_occurrence_window_is_inclusive_and_sorted() {
    let (storage, _temp_dir) = create_storage();
    let day = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
    let end = day + Duration::days(1) - Duration::nanoseconds(1);

    let at_start = ScheduledOccurrence::new("sub_a".to_string(), day);
    let at_noon = ScheduledOccurrence::new("sub_b".to_string(), day + Duration::hours(12));
    let at_end = ScheduledOccurrence::new("sub_a".to_string(), end);
    let yesterday = ScheduledOccurrence::new("sub_a".to_string(), day - Duration::seconds(1));
    let tomorrow = ScheduledOccurrence::new("sub_b".to_string(), end + Duration::nanoseconds(1));

    for occ in [&at_noon, &tomorrow, &at_end, &yesterday, &at_start] {
        assert_ok!(storage.create_occurrence(occ).await);
    }

    let due = storage.list_occurrences_between(day, end).await.unwrap();
    assert_eq!(due, vec![at_start.clone(), at_noon, at_end.clone()]);

    let for_a = storage.list_occurrences_for_subscription("sub_a").await.unwrap();
    assert_eq!(for_a, vec![yesterday, at_start, at_end]);
}

#[tokio::test]
async fn test_operation_listing_and_occurrence_lookup() {
    let (storage, _temp_dir) = create_storage();

    let spending = Operation::new(
        "bal_a".to_string(),
        OperationType::Spending,
        Amount::from(20),
        "Subscription payment: Gym".to_string(),
    )
    .with_occurrence("sub_gym".to_string(), "occ_1".to_string());
    let transfer = Operation::new(
        "bal_b".to_string(),
        OperationType::Transfer,
        Amount::from(5),
        "to savings".to_string(),
    )
    .with_transfer_balance("bal_a".to_string());
    let transfer_out = Operation::new(
        "bal_a".to_string(),
        OperationType::TransferOut,
        Amount::from(10),
        "fx".to_string(),
    )
    .with_transfer_balance("bal_c".to_string());
    let transfer_in = Operation::new(
        "bal_c".to_string(),
        OperationType::TransferIn,
        Amount::from(9),
        "fx".to_string(),
    )
    .with_transfer_balance("bal_a".to_string())
    .with_parent(transfer_out.operation_id.clone());

    for op in [&spending, &transfer, &transfer_out, &transfer_in] {
        assert_ok!(storage.create_operation(op).await);
    }

    let ids = |ops: Vec<Operation>| {
        let mut ids: Vec<String> = ops.into_iter().map(|op| op.operation_id).collect();
        ids.sort();
        ids
    };
    let mut expected_a = vec![
        spending.operation_id.clone(),
        transfer.operation_id.clone(),
        transfer_out.operation_id.clone(),
    ];
    expected_a.sort();
    assert_eq!(ids(storage.list_operations("bal_a").await.unwrap()), expected_a);
    assert_eq!(
        ids(storage.list_operations("bal_c").await.unwrap()),
        vec![transfer_in.operation_id.clone()]
    );

    let found = storage.find_by_occurrence("occ_1").await.unwrap().unwrap();
    assert_eq!(found.operation_id, spending.operation_id);
    assert!(storage.find_by_occurrence("occ_2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_operation() {
    let (storage, _temp_dir) = create_storage();
    let op = Operation::new(
        "bal_a".to_string(),
        OperationType::Incoming,
        Amount::from(7),
        "refund".to_string(),
    );
    assert_ok!(storage.create_operation(&op).await);

    assert_ok!(storage.delete_operation(&op.operation_id).await);
    assert!(storage.get_operation(&op.operation_id).await.unwrap().is_none());
    assert!(storage.list_operations("bal_a").await.unwrap().is_empty());
    // Already gone is fine.
    assert_ok!(storage.delete_operation(&op.operation_id).await);
}
