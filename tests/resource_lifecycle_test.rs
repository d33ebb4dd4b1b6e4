use assert_matches::assert_matches;
use fieldtrack_api::{
    db::{create_db_pool, run_migrations, DbPool},
    entities::resource::ResourceStatus,
    entities::resource_movement::MovementType,
    errors::ServiceError,
    events::{Event, EventSender},
    locks::ResourceLockRegistry,
    services::{resource_lifecycle::ResourceLifecycleService, TransitionContext},
};
use rust_decimal_macros::dec;
use std::{env, sync::Arc};
use tokio::sync::mpsc;
use uuid::Uuid;

struct TestCtx {
    service: ResourceLifecycleService,
    // Keeps the event channel open for the duration of the test.
    _event_rx: mpsc::Receiver<Event>,
}

async fn setup() -> TestCtx {
    env::set_var("APP__DATABASE_URL", "sqlite::memory:?cache=shared");

    let db: Arc<DbPool> = Arc::new(create_db_pool().await.expect("Failed to create DB pool"));
    run_migrations(db.as_ref())
        .await
        .expect("Failed to run migrations");

    let (tx, rx) = mpsc::channel(100);
    let event_sender = EventSender::new(tx);
    let service =
        ResourceLifecycleService::new(db.clone(), event_sender, ResourceLockRegistry::new());

    TestCtx {
        service,
        _event_rx: rx,
    }
}

fn unique_code(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[tokio::test]
async fn assign_and_return_full_cycle() {
    let ctx = setup().await;
    let custodian = Uuid::new_v4();

    let res = ctx
        .service
        .create_resource(unique_code("CYCLE"), None, None)
        .await
        .expect("create");
    assert_eq!(res.status(), Some(ResourceStatus::Available));
    assert_eq!(res.location.as_deref(), Some("warehouse"));

    let assign = ctx
        .service
        .assign_to_custodian(res.id, custodian, None, TransitionContext::default())
        .await
        .expect("assign");
    assert_eq!(assign.movement_type(), Some(MovementType::Assignment));
    assert_eq!(assign.custodian_id, Some(custodian));

    let assigned = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(assigned.status(), Some(ResourceStatus::OnLoan));
    assert_eq!(assigned.custodian_id, Some(custodian));
    assert_eq!(
        assigned.location.as_deref(),
        Some(format!("custodian:{}", custodian).as_str())
    );
    assert!(assigned.assigned_at.is_some());

    let ret = ctx
        .service
        .return_to_warehouse(res.id, TransitionContext::default())
        .await
        .expect("return");
    assert_eq!(ret.movement_type(), Some(MovementType::Return));
    // Traceability: the return records who had the unit.
    assert_eq!(ret.custodian_id, Some(custodian));

    let returned = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(returned.status(), Some(ResourceStatus::Available));
    assert_eq!(returned.custodian_id, None);
    assert_eq!(returned.assigned_at, None);
    assert_eq!(returned.location.as_deref(), Some("warehouse"));

    let history = ctx.service.movement_history(res.id).await.expect("history");
    assert_eq!(history.len(), 2);
    assert!(history[0].created_at <= history[1].created_at);
}

#[tokio::test]
async fn failed_assignment_writes_nothing() {
    let ctx = setup().await;

    let res = ctx
        .service
        .create_resource(unique_code("BUSY"), None, None)
        .await
        .expect("create");

    ctx.service
        .assign_to_custodian(res.id, Uuid::new_v4(), None, TransitionContext::default())
        .await
        .expect("first assign");

    let err = ctx
        .service
        .assign_to_custodian(res.id, Uuid::new_v4(), None, TransitionContext::default())
        .await
        .expect_err("second assign must fail");
    assert_matches!(err, ServiceError::InvalidState(_));

    // The failed transition must not have touched resource or ledger.
    let unchanged = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(unchanged.status(), Some(ResourceStatus::OnLoan));
    let history = ctx.service.movement_history(res.id).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn loan_over_active_captures_snapshot() {
    let ctx = setup().await;
    let owner = Uuid::new_v4();
    let borrower = Uuid::new_v4();

    let res = ctx
        .service
        .create_resource(unique_code("ACTIVE"), None, None)
        .await
        .expect("create");

    ctx.service
        .activate(res.id, Some(owner), Some(dec!(500.00)), TransitionContext::default())
        .await
        .expect("activate");

    let loan = ctx
        .service
        .loan_temporarily(res.id, borrower, TransitionContext::default())
        .await
        .expect("loan");

    assert!(loan.has_snapshot());
    assert_eq!(loan.original_custodian_id, Some(owner));
    assert_eq!(loan.original_sale_price, Some(dec!(500.00)));
    assert_eq!(loan.previous_status.as_deref(), Some("active"));

    let loaned = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(loaned.status(), Some(ResourceStatus::OnLoan));
    assert_eq!(loaned.custodian_id, Some(borrower));
    // Sale bookkeeping survives the interruption.
    assert_eq!(loaned.sale_price, Some(dec!(500.00)));
}

#[tokio::test]
async fn repair_restores_loan_custody() {
    let ctx = setup().await;
    let custodian = Uuid::new_v4();

    let res = ctx
        .service
        .create_resource(unique_code("REPAIR"), None, None)
        .await
        .expect("create");

    ctx.service
        .assign_to_custodian(res.id, custodian, None, TransitionContext::default())
        .await
        .expect("assign");

    let repair = ctx
        .service
        .send_to_repair(res.id, TransitionContext::default())
        .await
        .expect("send to repair");
    assert_eq!(repair.movement_type(), Some(MovementType::Repair));
    assert_eq!(repair.original_custodian_id, Some(custodian));

    let in_repair = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(in_repair.status(), Some(ResourceStatus::InRepair));
    assert_eq!(in_repair.location.as_deref(), Some("repair"));
    // Repair does not release custody bookkeeping.
    assert_eq!(in_repair.custodian_id, Some(custodian));

    let complete = ctx
        .service
        .complete_repair(res.id, TransitionContext::default())
        .await
        .expect("complete repair");
    assert_eq!(complete.movement_type(), Some(MovementType::RepairComplete));
    assert_eq!(complete.new_status.as_deref(), Some("on_loan"));

    let restored = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(restored.status(), Some(ResourceStatus::OnLoan));
    assert_eq!(restored.custodian_id, Some(custodian));
}

#[tokio::test]
async fn double_send_to_repair_is_rejected() {
    let ctx = setup().await;

    let res = ctx
        .service
        .create_resource(unique_code("DOUBLE"), None, None)
        .await
        .expect("create");

    ctx.service
        .send_to_repair(res.id, TransitionContext::default())
        .await
        .expect("first repair");

    let err = ctx
        .service
        .send_to_repair(res.id, TransitionContext::default())
        .await
        .expect_err("second repair must fail");
    assert_matches!(err, ServiceError::InvalidState(_));
}

#[tokio::test]
async fn complete_repair_without_repair_entry_defaults_to_available() {
    let ctx = setup().await;

    let res = ctx
        .service
        .create_resource(unique_code("STRANDED"), None, None)
        .await
        .expect("create");

    // Force the status without a Repair entry; the fallback must still get
    // the unit out of repair.
    ctx.service
        .restore_to_status(
            res.id,
            ResourceStatus::InRepair,
            None,
            TransitionContext::default(),
        )
        .await
        .expect("force status");

    let complete = ctx
        .service
        .complete_repair(res.id, TransitionContext::default())
        .await
        .expect("complete repair");
    assert_eq!(complete.new_status.as_deref(), Some("available"));

    let restored = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(restored.status(), Some(ResourceStatus::Available));
    assert_eq!(restored.custodian_id, None);
}

#[tokio::test]
async fn complete_repair_schedules_next_maintenance() {
    let ctx = setup().await;

    let res = ctx
        .service
        .create_resource(unique_code("MAINT"), None, Some(180))
        .await
        .expect("create");
    assert_eq!(res.next_maintenance_due, None);

    ctx.service
        .send_to_repair(res.id, TransitionContext::default())
        .await
        .expect("send to repair");
    ctx.service
        .complete_repair(res.id, TransitionContext::default())
        .await
        .expect("complete repair");

    let serviced = ctx.service.get_resource(res.id).await.expect("get");
    let due = serviced
        .next_maintenance_due
        .expect("maintenance should be scheduled");
    let days_out = (due - chrono::Utc::now()).num_days();
    assert!((179..=180).contains(&days_out), "due in {} days", days_out);
}

#[tokio::test]
async fn activation_sets_sale_fields() {
    let ctx = setup().await;
    let custodian = Uuid::new_v4();

    let res = ctx
        .service
        .create_resource(unique_code("SALE"), None, None)
        .await
        .expect("create");

    let movement = ctx
        .service
        .activate(
            res.id,
            Some(custodian),
            Some(dec!(1250.50)),
            TransitionContext::default(),
        )
        .await
        .expect("activate");
    assert_eq!(movement.movement_type(), Some(MovementType::Activation));

    let active = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(active.status(), Some(ResourceStatus::Active));
    assert_eq!(active.custodian_id, Some(custodian));
    assert_eq!(active.sale_price, Some(dec!(1250.50)));
    assert!(active.sale_date.is_some());
}

#[tokio::test]
async fn delete_is_rejected_while_history_exists() {
    let ctx = setup().await;

    let res = ctx
        .service
        .create_resource(unique_code("DEL"), None, None)
        .await
        .expect("create");

    ctx.service
        .assign_to_custodian(res.id, Uuid::new_v4(), None, TransitionContext::default())
        .await
        .expect("assign");

    let err = ctx
        .service
        .delete_resource(res.id)
        .await
        .expect_err("delete must be rejected");
    assert_matches!(err, ServiceError::Conflict(_));

    // A resource with no movements can be deleted.
    let fresh = ctx
        .service
        .create_resource(unique_code("DEL-FRESH"), None, None)
        .await
        .expect("create");
    ctx.service.delete_resource(fresh.id).await.expect("delete");

    let err = ctx.service.get_resource(fresh.id).await.expect_err("gone");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn movement_history_chains_to_current_state() {
    let ctx = setup().await;
    let custodian = Uuid::new_v4();

    let res = ctx
        .service
        .create_resource(unique_code("CHAIN"), None, None)
        .await
        .expect("create");

    ctx.service
        .assign_to_custodian(res.id, custodian, None, TransitionContext::default())
        .await
        .expect("assign");
    ctx.service
        .send_to_repair(res.id, TransitionContext::default())
        .await
        .expect("repair");
    ctx.service
        .complete_repair(res.id, TransitionContext::default())
        .await
        .expect("complete");
    ctx.service
        .return_to_warehouse(res.id, TransitionContext::default())
        .await
        .expect("return");

    let history = ctx.service.movement_history(res.id).await.expect("history");
    assert_eq!(history.len(), 4);

    // Each entry's previous_status picks up where the last one left off,
    // and the final entry matches the persisted state.
    for pair in history.windows(2) {
        assert_eq!(pair[1].previous_status, pair[0].new_status);
    }
    let current = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(
        history.last().and_then(|m| m.new_status.as_deref()),
        Some(current.status.as_str())
    );
}

#[tokio::test]
async fn restore_to_available_clears_custody() {
    let ctx = setup().await;

    let res = ctx
        .service
        .create_resource(unique_code("RESET"), None, None)
        .await
        .expect("create");

    ctx.service
        .assign_to_custodian(res.id, Uuid::new_v4(), None, TransitionContext::default())
        .await
        .expect("assign");

    let movement = ctx
        .service
        .restore_to_status(
            res.id,
            ResourceStatus::Available,
            None,
            TransitionContext::default(),
        )
        .await
        .expect("restore");
    // Target Available logs a Return.
    assert_eq!(movement.movement_type(), Some(MovementType::Return));

    let reset = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(reset.status(), Some(ResourceStatus::Available));
    assert_eq!(reset.custodian_id, None);
    assert_eq!(reset.location.as_deref(), Some("warehouse"));
}

#[tokio::test]
async fn operations_succeed_when_event_channel_closed() {
    let ctx = setup().await;
    // Nobody listening: every post-commit publish fails, but the committed
    // transitions must still succeed.
    drop(ctx._event_rx);
    let custodian = Uuid::new_v4();

    let res = ctx
        .service
        .create_resource(unique_code("DEAF"), None, None)
        .await
        .expect("create without a consumer");

    ctx.service
        .assign_to_custodian(res.id, custodian, None, TransitionContext::default())
        .await
        .expect("assign without a consumer");

    let assigned = ctx.service.get_resource(res.id).await.expect("get");
    assert_eq!(assigned.status(), Some(ResourceStatus::OnLoan));
    assert_eq!(assigned.custodian_id, Some(custodian));
}
