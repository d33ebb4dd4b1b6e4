use assert_matches::assert_matches;
use fieldtrack_api::{
    db::{create_db_pool, run_migrations, DbPool},
    entities::resource::{self, ResourceStatus},
    entities::resource_movement::{CausalRef, MovementType},
    errors::ServiceError,
    events::{Event, EventSender},
    ledger,
    locks::ResourceLockRegistry,
    services::{
        field_reports::{EquipmentOperation, FieldReportService},
        resource_lifecycle::ResourceLifecycleService,
        restoration::RestorationService,
        tickets::TicketService,
        TransitionContext,
    },
};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use std::{env, sync::Arc};
use tokio::sync::mpsc;
use uuid::Uuid;

struct TestCtx {
    db: Arc<DbPool>,
    lifecycle: ResourceLifecycleService,
    restoration: RestorationService,
    tickets: TicketService,
    reports: FieldReportService,
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
    let locks = ResourceLockRegistry::new();

    let lifecycle = ResourceLifecycleService::new(db.clone(), event_sender.clone(), locks.clone());
    let restoration = RestorationService::new(db.clone(), event_sender.clone(), locks.clone());
    let tickets = TicketService::new(db.clone(), event_sender.clone(), restoration.clone());
    let reports = FieldReportService::new(
        db.clone(),
        event_sender,
        lifecycle.clone(),
        restoration.clone(),
    );

    TestCtx {
        db,
        lifecycle,
        restoration,
        tickets,
        reports,
        _event_rx: rx,
    }
}

fn unique_code(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn unique_number(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[tokio::test]
async fn closing_a_ticket_restores_every_touched_resource() {
    let ctx = setup().await;
    let owner = Uuid::new_v4();
    let borrower = Uuid::new_v4();

    let ticket = ctx
        .tickets
        .create_ticket(unique_number("TK"), "Printer jam".into(), Some(borrower))
        .await
        .expect("create ticket");
    let ticket_ref = CausalRef::Ticket(ticket.id);

    // Unit A is active at its owner, with a maintenance schedule from an
    // earlier repair; the ticket loans it to someone else.
    let unit_a = ctx
        .lifecycle
        .create_resource(unique_code("UNIT-A"), None, Some(90))
        .await
        .expect("create A");
    ctx.lifecycle
        .send_to_repair(unit_a.id, TransitionContext::default())
        .await
        .expect("send A to repair");
    ctx.lifecycle
        .complete_repair(unit_a.id, TransitionContext::default())
        .await
        .expect("complete A repair");
    ctx.lifecycle
        .activate(unit_a.id, Some(owner), Some(dec!(500.00)), TransitionContext::default())
        .await
        .expect("activate A");
    let a_before = ctx
        .lifecycle
        .get_resource(unit_a.id)
        .await
        .expect("A before ticket");
    assert!(a_before.next_maintenance_due.is_some());
    ctx.lifecycle
        .loan_temporarily(
            unit_a.id,
            borrower,
            TransitionContext::default().with_causal_ref(ticket_ref),
        )
        .await
        .expect("loan A");

    // Unit B goes out as substitute equipment under the same ticket.
    let unit_b = ctx
        .lifecycle
        .create_resource(unique_code("UNIT-B"), None, None)
        .await
        .expect("create B");
    ctx.lifecycle
        .loan_substitute(
            unit_b.id,
            borrower,
            TransitionContext::default().with_causal_ref(ticket_ref),
        )
        .await
        .expect("substitute loan B");

    let (closed, report) = ctx.tickets.close_ticket(ticket.id, None).await.expect("close");
    assert_eq!(closed.status, "closed");
    assert!(closed.closed_at.is_some());
    assert_eq!(report.restored, 2);
    assert_eq!(report.failed, 0);

    // A is back exactly as before the ticket: active at its owner, with
    // every snapshot field verbatim.
    let a = ctx.lifecycle.get_resource(unit_a.id).await.expect("get A");
    assert_eq!(a.status(), Some(ResourceStatus::Active));
    assert_eq!(a.custodian_id, Some(owner));
    assert_eq!(a.sale_price, Some(dec!(500.00)));
    assert_eq!(a.sale_date, a_before.sale_date);
    assert_eq!(a.next_maintenance_due, a_before.next_maintenance_due);
    assert_eq!(a.assigned_at, a_before.assigned_at);
    assert_eq!(a.location, a_before.location);

    // B goes home to the warehouse.
    let b = ctx.lifecycle.get_resource(unit_b.id).await.expect("get B");
    assert_eq!(b.status(), Some(ResourceStatus::Available));
    assert_eq!(b.custodian_id, None);
    assert_eq!(b.location.as_deref(), Some("warehouse"));

    // Ticket movements are retained, compensating entries included.
    let tagged = ledger::movements_by_causal_ref(ctx.db.as_ref(), ticket_ref)
        .await
        .expect("tagged movements");
    assert_eq!(tagged.len(), 4);
    assert_eq!(
        tagged
            .iter()
            .filter(|m| m.movement_type() == Some(MovementType::Restore))
            .count(),
        2
    );

    // Running the restoration again is a no-op.
    let rerun = ctx
        .restoration
        .restore_by_causal_ref(ticket_ref, TransitionContext::default())
        .await
        .expect("rerun");
    assert_eq!(rerun.restored, 0);
    assert_eq!(rerun.skipped, 2);
    assert_eq!(rerun.failed, 0);
}

#[tokio::test]
async fn reopened_ticket_restores_movements_made_since() {
    let ctx = setup().await;
    let owner = Uuid::new_v4();
    let borrower1 = Uuid::new_v4();
    let borrower2 = Uuid::new_v4();

    let ticket = ctx
        .tickets
        .create_ticket(unique_number("TK"), "Recurring fault".into(), Some(borrower1))
        .await
        .expect("create ticket");
    let ticket_ref = CausalRef::Ticket(ticket.id);

    let unit = ctx
        .lifecycle
        .create_resource(unique_code("UNIT"), None, None)
        .await
        .expect("create");
    ctx.lifecycle
        .activate(unit.id, Some(owner), Some(dec!(500.00)), TransitionContext::default())
        .await
        .expect("activate");

    ctx.lifecycle
        .loan_temporarily(
            unit.id,
            borrower1,
            TransitionContext::default().with_causal_ref(ticket_ref),
        )
        .await
        .expect("first loan");

    let (_, report) = ctx.tickets.close_ticket(ticket.id, None).await.expect("first close");
    assert_eq!(report.restored, 1);

    // The fault comes back: reopen and loan the unit out again under the
    // same ticket.
    ctx.tickets.reopen_ticket(ticket.id).await.expect("reopen");
    ctx.lifecycle
        .loan_temporarily(
            unit.id,
            borrower2,
            TransitionContext::default().with_causal_ref(ticket_ref),
        )
        .await
        .expect("second loan");

    let loaned = ctx.lifecycle.get_resource(unit.id).await.expect("get loaned");
    assert_eq!(loaned.status(), Some(ResourceStatus::OnLoan));

    // The earlier compensating entry must not mask the new loan.
    let (_, report2) = ctx
        .tickets
        .close_ticket(ticket.id, None)
        .await
        .expect("second close");
    assert_eq!(report2.restored, 1);
    assert_eq!(report2.failed, 0);

    let unit = ctx.lifecycle.get_resource(unit.id).await.expect("get");
    assert_eq!(unit.status(), Some(ResourceStatus::Active));
    assert_eq!(unit.custodian_id, Some(owner));
    assert_eq!(unit.sale_price, Some(dec!(500.00)));
}

#[tokio::test]
async fn restoration_skips_missing_and_counts_failed_resources() {
    let ctx = setup().await;
    let borrower = Uuid::new_v4();

    let ticket = ctx
        .tickets
        .create_ticket(unique_number("TK"), "Site visit".into(), Some(borrower))
        .await
        .expect("create ticket");
    let ticket_ref = CausalRef::Ticket(ticket.id);

    let mut units = Vec::new();
    for i in 0..3 {
        let unit = ctx
            .lifecycle
            .create_resource(unique_code(&format!("UNIT-{}", i)), None, None)
            .await
            .expect("create");
        ctx.lifecycle
            .loan_temporarily(
                unit.id,
                borrower,
                TransitionContext::default().with_causal_ref(ticket_ref),
            )
            .await
            .expect("loan");
        units.push(unit);
    }

    // First unit's row disappears out of band; its movements stay behind.
    resource::Entity::delete_by_id(units[0].id)
        .exec(ctx.db.as_ref())
        .await
        .expect("delete row");

    // Second unit's status is corrupted to something the state machine
    // does not know.
    let corrupted = ctx
        .lifecycle
        .get_resource(units[1].id)
        .await
        .expect("get corrupted");
    let mut active: resource::ActiveModel = corrupted.into();
    active.status = Set("limbo".to_string());
    active.update(ctx.db.as_ref()).await.expect("corrupt status");

    let (_, report) = ctx.tickets.close_ticket(ticket.id, None).await.expect("close");
    assert_eq!(report.restored, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 1);

    // The healthy unit is back; the failed one is left for manual
    // correction, untouched.
    let healthy = ctx.lifecycle.get_resource(units[2].id).await.expect("get healthy");
    assert_eq!(healthy.status(), Some(ResourceStatus::Available));
    let stuck = ctx.lifecycle.get_resource(units[1].id).await.expect("get stuck");
    assert_eq!(stuck.status, "limbo");

    // Retrying the close is rejected, but a direct retry of the
    // restoration only picks up the two still pending.
    let retry = ctx
        .restoration
        .restore_by_causal_ref(ticket_ref, TransitionContext::default())
        .await
        .expect("retry");
    assert_eq!(retry.restored, 0);
    assert_eq!(retry.skipped, 2);
    assert_eq!(retry.failed, 1);
}

#[tokio::test]
async fn closing_a_closed_ticket_is_rejected() {
    let ctx = setup().await;

    let ticket = ctx
        .tickets
        .create_ticket(unique_number("TK"), "No-show".into(), None)
        .await
        .expect("create ticket");

    ctx.tickets.close_ticket(ticket.id, None).await.expect("close");

    let err = ctx
        .tickets
        .close_ticket(ticket.id, None)
        .await
        .expect_err("second close must fail");
    assert_matches!(err, ServiceError::InvalidState(_));

    // After reopening, closing again only restores movements made since.
    ctx.tickets.reopen_ticket(ticket.id).await.expect("reopen");
    let (_, report) = ctx
        .tickets
        .close_ticket(ticket.id, None)
        .await
        .expect("close again");
    assert_eq!(report.restored, 0);
}

#[tokio::test]
async fn deleting_a_field_report_restores_and_purges() {
    let ctx = setup().await;
    let owner = Uuid::new_v4();
    let site_custodian = Uuid::new_v4();

    let report = ctx
        .reports
        .create_report(unique_number("FR"), None, Some(site_custodian))
        .await
        .expect("create report");
    let report_ref = CausalRef::FieldReport(report.id);

    // X goes out as a substitute; Y, active at its owner, is picked up for
    // repair.
    let unit_x = ctx
        .lifecycle
        .create_resource(unique_code("UNIT-X"), None, None)
        .await
        .expect("create X");
    let unit_y = ctx
        .lifecycle
        .create_resource(unique_code("UNIT-Y"), None, None)
        .await
        .expect("create Y");
    ctx.lifecycle
        .activate(unit_y.id, Some(owner), None, TransitionContext::default())
        .await
        .expect("activate Y");

    let outcome = ctx
        .reports
        .apply_operations(
            report.id,
            vec![
                EquipmentOperation::SubstituteLoan {
                    resource_id: unit_x.id,
                    note: None,
                },
                EquipmentOperation::PickupForRepair {
                    resource_id: unit_y.id,
                    note: Some("Broken feeder".into()),
                },
            ],
            None,
        )
        .await
        .expect("apply operations");
    assert_eq!(outcome.applied, 2);
    assert!(outcome.errors.is_empty());

    let x = ctx.lifecycle.get_resource(unit_x.id).await.expect("get X");
    assert_eq!(x.status(), Some(ResourceStatus::OnLoan));
    let y = ctx.lifecycle.get_resource(unit_y.id).await.expect("get Y");
    assert_eq!(y.status(), Some(ResourceStatus::InRepair));

    let restoration = ctx
        .reports
        .delete_report(report.id, None)
        .await
        .expect("delete report");
    assert_eq!(restoration.restored, 2);
    assert_eq!(restoration.failed, 0);

    // Both units are back; the report and its movements are gone.
    let x = ctx.lifecycle.get_resource(unit_x.id).await.expect("get X");
    assert_eq!(x.status(), Some(ResourceStatus::Available));
    let y = ctx.lifecycle.get_resource(unit_y.id).await.expect("get Y");
    assert_eq!(y.status(), Some(ResourceStatus::Active));
    assert_eq!(y.custodian_id, Some(owner));

    let err = ctx
        .reports
        .get_report(report.id)
        .await
        .expect_err("report should be gone");
    assert_matches!(err, ServiceError::NotFound(_));

    let tagged = ledger::movements_by_causal_ref(ctx.db.as_ref(), report_ref)
        .await
        .expect("tagged movements");
    assert!(tagged.is_empty());

    // The compensating entries survive the purge, untagged.
    let x_history = ctx
        .lifecycle
        .movement_history(unit_x.id)
        .await
        .expect("X history");
    assert_eq!(x_history.len(), 1);
    assert_eq!(x_history[0].movement_type(), Some(MovementType::Restore));
    assert_eq!(x_history[0].causal_ref(), None);
}

#[tokio::test]
async fn report_operations_collect_failures_without_aborting() {
    let ctx = setup().await;

    // No custodian on the report, so loans cannot resolve one.
    let report = ctx
        .reports
        .create_report(unique_number("FR"), None, None)
        .await
        .expect("create report");

    let unit = ctx
        .lifecycle
        .create_resource(unique_code("UNIT"), None, None)
        .await
        .expect("create");

    let outcome = ctx
        .reports
        .apply_operations(
            report.id,
            vec![
                EquipmentOperation::Loan {
                    resource_id: unit.id,
                    note: None,
                },
                // Not on loan: skipped, not an error.
                EquipmentOperation::ReturnFromLoan {
                    resource_id: unit.id,
                    note: None,
                },
                EquipmentOperation::Other {
                    resource_id: unit.id,
                    note: Some("Inspected on site".into()),
                },
                // Unknown resource: collected as a failure.
                EquipmentOperation::OnSiteRepair {
                    resource_id: Uuid::new_v4(),
                    note: None,
                },
            ],
            None,
        )
        .await
        .expect("apply operations");

    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.errors.len(), 2);

    // The unit itself only got the generic entry.
    let history = ctx
        .lifecycle
        .movement_history(unit.id)
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].movement_type(), Some(MovementType::Generic));
    assert_eq!(history[0].new_status.as_deref(), Some("available"));
}

#[tokio::test]
async fn direct_restoration_with_no_movements_is_empty() {
    let ctx = setup().await;

    let report = ctx
        .restoration
        .restore_by_causal_ref(
            CausalRef::Ticket(Uuid::new_v4()),
            TransitionContext::default(),
        )
        .await
        .expect("restore");

    assert_eq!(report.restored, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failed, 0);
}
