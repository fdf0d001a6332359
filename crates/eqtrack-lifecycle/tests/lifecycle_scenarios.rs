//! End-to-end lifecycle scenarios against the in-memory store.

use std::sync::Arc;

use chrono::NaiveDate;

use eqtrack_core::{DeviceId, DocumentKind, Timestamp, UserId};
use eqtrack_lifecycle::{
    AuditRecorder, CacheTag, CycleError, Engine, EngineConfig, FailPoint, LoanSlipFilter,
    MemoryStore, NoopAudit, OperationContext, RecordingInvalidator, WarrantyFilter,
};
use eqtrack_state::{
    Device, DeviceStatus, LoanLineStatus, LoanSlipStatus, MaintenanceLineStatus,
    MaintenanceSlipStatus, ResolveItem, ReturnSlipStatus, WarrantySource, WarrantyStatus,
};

struct Fixture {
    store: MemoryStore,
    engine: Engine<MemoryStore>,
    cache: Arc<RecordingInvalidator>,
    clerk: UserId,
    borrower: UserId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    fn with_config(config: EngineConfig) -> Self {
        let store = MemoryStore::new();
        let cache = Arc::new(RecordingInvalidator::new());
        let engine = Engine::new(store.clone(), config)
            .unwrap()
            .with_cache(cache.clone());
        let clerk = store.add_user();
        let borrower = store.add_user();
        Self {
            store,
            engine,
            cache,
            clerk,
            borrower,
        }
    }

    fn device(&self, expiry: Option<NaiveDate>) -> DeviceId {
        self.store.add_device(Device::new("Laptop", expiry))
    }

    fn status(&self, id: DeviceId) -> DeviceStatus {
        self.store.device(id).unwrap().status
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

// ── Loan round trip ──────────────────────────────────────────────────

#[tokio::test]
async fn test_loan_round_trip() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let slip = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a, b])
        .await
        .unwrap();
    assert_eq!(slip.status, LoanSlipStatus::Borrowing);
    assert_eq!(fx.status(a), DeviceStatus::OnLoan);
    assert_eq!(fx.status(b), DeviceStatus::OnLoan);

    let first = fx
        .engine
        .loans()
        .return_devices(&mut ctx, slip.id, &[ResolveItem::returned(a)])
        .await
        .unwrap();
    assert_eq!(first.document.status, LoanSlipStatus::PartialReturned);
    assert!(first.warranties.is_empty());
    assert_eq!(fx.status(a), DeviceStatus::Available);
    assert_eq!(fx.status(b), DeviceStatus::OnLoan);

    let second = fx
        .engine
        .loans()
        .return_devices(&mut ctx, slip.id, &[ResolveItem::broken(b, "hinge snapped")])
        .await
        .unwrap();
    assert_eq!(second.document.status, LoanSlipStatus::Closed);
    assert_eq!(fx.status(b), DeviceStatus::Broken);

    let warranties = fx.store.warranties_of(b);
    assert_eq!(warranties.len(), 1);
    assert_eq!(warranties[0].status, WarrantyStatus::Pending);
    assert_eq!(warranties[0].prior_device_status, DeviceStatus::Broken);
    assert_eq!(warranties[0].source, WarrantySource::LoanSlip(slip.id));
    assert_eq!(warranties[0].reason, "hinge snapped");
}

#[tokio::test]
async fn test_return_on_closed_slip_conflicts() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let slip = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();
    fx.engine
        .loans()
        .return_devices(&mut ctx, slip.id, &[ResolveItem::returned(a)])
        .await
        .unwrap();
    let err = fx
        .engine
        .loans()
        .return_devices(&mut ctx, slip.id, &[ResolveItem::returned(a)])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
}

#[tokio::test]
async fn test_resolve_validates_before_writing() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let stranger = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let slip = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a, b])
        .await
        .unwrap();

    for items in [
        vec![],
        vec![ResolveItem::returned(a), ResolveItem::returned(a)],
        vec![ResolveItem::returned(a), ResolveItem::returned(stranger)],
    ] {
        let err = fx
            .engine
            .loans()
            .return_devices(&mut ctx, slip.id, &items)
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Validation(_)), "{err}");
    }
    assert_eq!(fx.status(a), DeviceStatus::OnLoan);
    let reloaded = fx.engine.loans().get(slip.id).await.unwrap();
    assert_eq!(reloaded.status, LoanSlipStatus::Borrowing);
}

// ── Loan creation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_requires_parties_and_available_devices() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let unknown = UserId::new();
    let err = fx
        .engine
        .loans()
        .create(&mut ctx, unknown, fx.clerk, &[a])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));

    let err = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));

    fx.engine
        .maintenance()
        .create(&mut ctx, a, None, "battery swelling", date(2026, 1, 5))
        .await
        .unwrap();
    let err = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));
    assert_eq!(fx.status(a), DeviceStatus::Maintenance);
}

#[tokio::test]
async fn test_soft_deleted_device_is_missing() {
    let fx = Fixture::new();
    let a = fx.device(None);
    fx.store.soft_delete_device(a);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let err = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));
    assert!(matches!(
        fx.engine.device(a).await,
        Err(CycleError::NotFound { .. })
    ));
}

// ── Loan cancellation ────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_compensates_and_is_terminal() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = AuditRecorder::new();
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let slip = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();
    let cancelled = fx.engine.loans().cancel(&mut ctx, slip.id).await.unwrap();
    assert_eq!(cancelled.status, LoanSlipStatus::Cancelled);
    assert_eq!(fx.status(a), DeviceStatus::Available);

    let err = fx.engine.loans().cancel(&mut ctx, slip.id).await.unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
    assert_eq!(fx.status(a), DeviceStatus::Available);
    drop(ctx);

    // The rejected second cancel leaves no unpaired snapshot behind.
    assert_eq!(audit.before.len(), 2);
    assert_eq!(audit.after.len(), 2);
    assert!(audit.before[0].is_null());
    assert_eq!(audit.before[1]["status"], "BORROWING");
    assert_eq!(audit.after[1]["status"], "CANCELLED");
}

#[tokio::test]
async fn test_cancel_after_partial_return_conflicts() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let slip = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a, b])
        .await
        .unwrap();
    fx.engine
        .loans()
        .return_devices(&mut ctx, slip.id, &[ResolveItem::returned(a)])
        .await
        .unwrap();
    let err = fx.engine.loans().cancel(&mut ctx, slip.id).await.unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
    assert_eq!(fx.status(b), DeviceStatus::OnLoan);
}

#[tokio::test]
async fn test_list_filters_by_status_and_borrower() {
    let fx = Fixture::new();
    let other = fx.store.add_user();
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let first = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[fx.device(None)])
        .await
        .unwrap();
    fx.engine
        .loans()
        .create(&mut ctx, other, fx.clerk, &[fx.device(None)])
        .await
        .unwrap();
    fx.engine.loans().cancel(&mut ctx, first.id).await.unwrap();

    let mine = fx
        .engine
        .loans()
        .list(&LoanSlipFilter {
            borrower_id: Some(fx.borrower),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    let borrowing = fx
        .engine
        .loans()
        .list(&LoanSlipFilter {
            status: Some(LoanSlipStatus::Borrowing),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(borrowing.len(), 1);
    assert_eq!(borrowing[0].borrower_id, other);
}

// ── Return slips ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_return_slip_cancel_reopens_loan() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let loan = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a, b])
        .await
        .unwrap();

    let recorded = fx
        .engine
        .returns()
        .create(
            &mut ctx,
            loan.id,
            fx.borrower,
            None,
            &[ResolveItem::returned(a), ResolveItem::broken(b, "water damage")],
        )
        .await
        .unwrap();
    assert_eq!(recorded.parent.status, LoanSlipStatus::Closed);
    assert_eq!(recorded.document.status, ReturnSlipStatus::Returned);
    assert_eq!(recorded.document.return_date, ctx.now);
    assert_eq!(recorded.warranties.len(), 1);
    assert_eq!(
        recorded.warranties[0].source,
        WarrantySource::ReturnSlip(recorded.document.id)
    );

    let reverted = fx
        .engine
        .returns()
        .cancel(&mut ctx, recorded.document.id)
        .await
        .unwrap();
    assert_eq!(reverted.document.status, ReturnSlipStatus::Cancelled);
    assert_eq!(reverted.parent.status, LoanSlipStatus::Borrowing);
    assert!(reverted
        .parent
        .details
        .iter()
        .all(|d| d.status == LoanLineStatus::Borrowed && d.return_date.is_none()));
    assert_eq!(reverted.rejected_warranties.len(), 1);
    assert_eq!(fx.status(a), DeviceStatus::OnLoan);
    assert_eq!(fx.status(b), DeviceStatus::OnLoan);
    assert_eq!(fx.store.warranties_of(b)[0].status, WarrantyStatus::Rejected);

    let err = fx
        .engine
        .returns()
        .cancel(&mut ctx, recorded.document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
}

#[tokio::test]
async fn test_backdated_return_slip_stamps_loan_lines() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit).at(at("2026-03-10T10:00:00Z"));
    let loan = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a, b])
        .await
        .unwrap();

    let returned_on = at("2026-03-08T09:00:00Z");
    let recorded = fx
        .engine
        .returns()
        .create(
            &mut ctx,
            loan.id,
            fx.borrower,
            Some(returned_on),
            &[ResolveItem::returned(a), ResolveItem::broken(b, "cracked screen")],
        )
        .await
        .unwrap();
    assert_eq!(recorded.document.return_date, returned_on);
    for detail in &recorded.parent.details {
        assert_eq!(detail.return_date, Some(recorded.document.return_date));
    }
    let stored = fx.engine.loans().get(loan.id).await.unwrap();
    assert!(stored
        .details
        .iter()
        .all(|d| d.return_date == Some(returned_on)));

    assert_eq!(recorded.warranties.len(), 1);
    assert_eq!(recorded.warranties[0].request_date, date(2026, 3, 8));
    // Codes still follow the day the slip was written.
    assert_eq!(recorded.document.code.to_string(), "RS_100326_001");
}

#[tokio::test]
async fn test_return_cancel_blocked_by_processing_warranty() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let loan = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();
    let recorded = fx
        .engine
        .returns()
        .create(&mut ctx, loan.id, fx.borrower, None, &[ResolveItem::broken(a, "dead")])
        .await
        .unwrap();
    let warranty = &recorded.warranties[0];
    fx.engine.warranties().assign(&mut ctx, warranty.id).await.unwrap();
    assert_eq!(fx.status(a), DeviceStatus::UnderWarranty);

    let err = fx
        .engine
        .returns()
        .cancel(&mut ctx, recorded.document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
    assert_eq!(fx.status(a), DeviceStatus::UnderWarranty);
    let slip = fx.engine.returns().get(recorded.document.id).await.unwrap();
    assert_eq!(slip.status, ReturnSlipStatus::Returned);
}

#[tokio::test]
async fn test_return_cancel_after_device_moved_on() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let loan = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();
    let recorded = fx
        .engine
        .returns()
        .create(&mut ctx, loan.id, fx.borrower, None, &[ResolveItem::returned(a)])
        .await
        .unwrap();
    fx.engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();

    let err = fx
        .engine
        .returns()
        .cancel(&mut ctx, recorded.document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
}

#[tokio::test]
async fn test_return_requires_known_returner() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let loan = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();
    let err = fx
        .engine
        .returns()
        .create(&mut ctx, loan.id, UserId::new(), None, &[ResolveItem::returned(a)])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));
}

// ── Maintenance ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_maintenance_return_and_cancel() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let partner = fx.store.add_partner();
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let slip = fx
        .engine
        .maintenance()
        .create(&mut ctx, a, Some(partner), "keyboard", date(2026, 2, 2))
        .await
        .unwrap();
    assert_eq!(slip.status, MaintenanceSlipStatus::Sending);
    assert_eq!(fx.status(a), DeviceStatus::Maintenance);

    let recorded = fx
        .engine
        .maintenance()
        .create_return(&mut ctx, slip.id, &[ResolveItem::broken(a, "board fried")])
        .await
        .unwrap();
    assert_eq!(recorded.parent.status, MaintenanceSlipStatus::Closed);
    assert_eq!(fx.status(a), DeviceStatus::Broken);
    assert_eq!(
        recorded.warranties[0].source,
        WarrantySource::MaintenanceReturnSlip(recorded.document.id)
    );

    let reverted = fx
        .engine
        .maintenance()
        .cancel_return(&mut ctx, recorded.document.id)
        .await
        .unwrap();
    assert_eq!(reverted.parent.status, MaintenanceSlipStatus::Sending);
    assert_eq!(reverted.parent.details[0].status, MaintenanceLineStatus::Sent);
    assert_eq!(fx.status(a), DeviceStatus::Maintenance);
    assert!(fx
        .engine
        .warranties()
        .list(&WarrantyFilter::open_for(a))
        .await
        .unwrap()
        .is_empty());

    let cancelled = fx.engine.maintenance().cancel(&mut ctx, slip.id).await.unwrap();
    assert_eq!(cancelled.status, MaintenanceSlipStatus::Cancelled);
    assert_eq!(fx.status(a), DeviceStatus::Available);
}

#[tokio::test]
async fn test_maintenance_validation() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let blank = fx
        .engine
        .maintenance()
        .create(&mut ctx, a, None, "   ", date(2026, 2, 2))
        .await
        .unwrap_err();
    assert!(matches!(blank, CycleError::Validation(_)));

    let unknown_partner = fx
        .engine
        .maintenance()
        .create(&mut ctx, a, Some(eqtrack_core::PartnerId::new()), "fan", date(2026, 2, 2))
        .await
        .unwrap_err();
    assert!(matches!(unknown_partner, CycleError::Validation(_)));
    assert_eq!(fx.status(a), DeviceStatus::Available);
}

#[tokio::test]
async fn test_maintenance_cancel_after_return_conflicts() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let slip = fx
        .engine
        .maintenance()
        .create(&mut ctx, a, None, "fan", date(2026, 2, 2))
        .await
        .unwrap();
    fx.engine
        .maintenance()
        .create_return(&mut ctx, slip.id, &[ResolveItem::returned(a)])
        .await
        .unwrap();
    let err = fx.engine.maintenance().cancel(&mut ctx, slip.id).await.unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
    let err = fx
        .engine
        .maintenance()
        .create_return(&mut ctx, slip.id, &[ResolveItem::returned(a)])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
}

// ── Warranty ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_warranty_expiry_boundary() {
    let fx = Fixture::new();
    let a = fx.device(Some(date(2026, 6, 30)));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let err = fx
        .engine
        .warranties()
        .create_request(&mut ctx, a, "screen flicker", date(2026, 7, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));
    assert_eq!(fx.status(a), DeviceStatus::Available);

    let warranty = fx
        .engine
        .warranties()
        .create_request(&mut ctx, a, "screen flicker", date(2026, 6, 30))
        .await
        .unwrap();
    assert_eq!(warranty.status, WarrantyStatus::Pending);
    assert_eq!(warranty.prior_device_status, DeviceStatus::Available);
    assert_eq!(fx.status(a), DeviceStatus::UnderWarranty);
}

#[tokio::test]
async fn test_duplicate_open_warranty_rejected() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    fx.engine
        .warranties()
        .create_request(&mut ctx, a, "fan", date(2026, 3, 1))
        .await
        .unwrap();
    let err = fx
        .engine
        .warranties()
        .create_request(&mut ctx, a, "fan again", date(2026, 3, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));
    assert_eq!(fx.store.warranties_of(a).len(), 1);
}

#[tokio::test]
async fn test_warranty_full_cycle_and_reject_restores() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let w = fx
        .engine
        .warranties()
        .create_request(&mut ctx, a, "fan", date(2026, 3, 1))
        .await
        .unwrap();
    let err = fx.engine.warranties().complete(&mut ctx, w.id).await.unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));
    fx.engine.warranties().assign(&mut ctx, w.id).await.unwrap();
    let done = fx.engine.warranties().complete(&mut ctx, w.id).await.unwrap();
    assert_eq!(done.status, WarrantyStatus::Completed);
    assert_eq!(fx.status(a), DeviceStatus::Available);
    let err = fx.engine.warranties().reject(&mut ctx, w.id).await.unwrap_err();
    assert!(matches!(err, CycleError::Conflict(_)));

    // A broken device keeps its BROKEN status after a rejection.
    let loan = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[b])
        .await
        .unwrap();
    let resolved = fx
        .engine
        .loans()
        .return_devices(&mut ctx, loan.id, &[ResolveItem::broken(b, "cracked")])
        .await
        .unwrap();
    let auto = &resolved.warranties[0];
    fx.engine.warranties().assign(&mut ctx, auto.id).await.unwrap();
    assert_eq!(fx.status(b), DeviceStatus::UnderWarranty);
    let rejected = fx.engine.warranties().reject(&mut ctx, auto.id).await.unwrap();
    assert_eq!(rejected.status, WarrantyStatus::Rejected);
    assert_eq!(fx.status(b), DeviceStatus::Broken);

    // A BROKEN device can be sent under warranty again directly.
    let again = fx
        .engine
        .warranties()
        .create_request(&mut ctx, b, "second opinion", date(2026, 3, 9))
        .await
        .unwrap();
    assert_eq!(again.prior_device_status, DeviceStatus::Broken);
    assert_eq!(fx.status(b), DeviceStatus::UnderWarranty);
}

#[tokio::test]
async fn test_warranty_requires_available_or_broken() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    fx.engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();
    let err = fx
        .engine
        .warranties()
        .create_request(&mut ctx, a, "fan", date(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));
    let err = fx
        .engine
        .warranties()
        .create_request(&mut ctx, DeviceId::new(), "fan", date(2026, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Validation(_)));
}

#[tokio::test]
async fn test_second_breakage_reuses_open_warranty() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    let slip = fx
        .engine
        .maintenance()
        .create(&mut ctx, a, None, "fan", date(2026, 2, 2))
        .await
        .unwrap();
    let first = fx
        .engine
        .maintenance()
        .create_return(&mut ctx, slip.id, &[ResolveItem::broken(a, "dead")])
        .await
        .unwrap();
    assert_eq!(first.warranties.len(), 1);
    fx.engine
        .maintenance()
        .cancel_return(&mut ctx, first.document.id)
        .await
        .unwrap();
    let second = fx
        .engine
        .maintenance()
        .create_return(&mut ctx, slip.id, &[ResolveItem::broken(a, "still dead")])
        .await
        .unwrap();
    assert_eq!(second.warranties.len(), 1);
    let open: Vec<_> = fx
        .store
        .warranties_of(a)
        .into_iter()
        .filter(|w| w.status.is_open())
        .collect();
    assert_eq!(open.len(), 1);
}

// ── Atomicity ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failure_mid_create_changes_nothing() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);

    fx.store.fail_nth(FailPoint::DeviceUpdate, 2);
    let err = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a, b])
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Store(_)));
    assert_eq!(fx.status(a), DeviceStatus::Available);
    assert_eq!(fx.status(b), DeviceStatus::Available);
    assert!(fx
        .engine
        .loans()
        .list(&LoanSlipFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert!(fx.cache.tags().is_empty());
}

#[tokio::test]
async fn test_failure_on_warranty_insert_rolls_back_resolution() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let slip = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();

    fx.store.fail_once(FailPoint::WarrantyInsert);
    fx.engine
        .loans()
        .return_devices(&mut ctx, slip.id, &[ResolveItem::broken(a, "cracked")])
        .await
        .unwrap_err();
    assert_eq!(fx.status(a), DeviceStatus::OnLoan);
    let reloaded = fx.engine.loans().get(slip.id).await.unwrap();
    assert_eq!(reloaded.details[0].status, LoanLineStatus::Borrowed);
    assert!(fx.store.warranties_of(a).is_empty());
}

#[tokio::test]
async fn test_failed_commit_changes_nothing() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    fx.store.fail_once(FailPoint::Commit);
    assert!(fx
        .engine
        .maintenance()
        .create(&mut ctx, a, None, "fan", date(2026, 2, 2))
        .await
        .is_err());
    assert_eq!(fx.status(a), DeviceStatus::Available);
}

// ── Concurrency ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_racing_creates_on_one_device() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let (mut audit_a, mut audit_b) = (NoopAudit, NoopAudit);
    let mut ctx_a = OperationContext::new(fx.clerk, &mut audit_a);
    let mut ctx_b = OperationContext::new(fx.clerk, &mut audit_b);
    let loans = fx.engine.loans();
    let maintenance = fx.engine.maintenance();
    let devices = [a];

    let (loan, repair) = tokio::join!(
        loans.create(&mut ctx_a, fx.borrower, fx.clerk, &devices),
        maintenance.create(&mut ctx_b, a, None, "fan", date(2026, 2, 2)),
    );
    assert_eq!(
        loan.is_ok() as u8 + repair.is_ok() as u8,
        1,
        "exactly one operation must commit"
    );
    let loser = loan.err().or(repair.err()).unwrap();
    assert!(matches!(loser, CycleError::Conflict(_)));
    assert_ne!(fx.status(a), DeviceStatus::Available);
}

#[tokio::test]
async fn test_racing_returns_on_one_loan_slip() {
    let fx = Fixture::new();
    let (a, b) = (fx.device(None), fx.device(None));
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    let loan = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a, b])
        .await
        .unwrap();
    drop(ctx);

    let (mut audit_a, mut audit_b) = (NoopAudit, NoopAudit);
    let mut ctx_a = OperationContext::new(fx.clerk, &mut audit_a);
    let mut ctx_b = OperationContext::new(fx.clerk, &mut audit_b);
    let loans = fx.engine.loans();
    let returns = fx.engine.returns();
    let (item_a, item_b) = ([ResolveItem::returned(a)], [ResolveItem::returned(b)]);

    // Different devices, same header: only the slip version collides.
    let (direct, slip) = tokio::join!(
        loans.return_devices(&mut ctx_a, loan.id, &item_a),
        returns.create(&mut ctx_b, loan.id, fx.borrower, None, &item_b),
    );
    assert_eq!(
        direct.is_ok() as u8 + slip.is_ok() as u8,
        1,
        "exactly one return must commit"
    );
    let winner_a = direct.is_ok();
    let loser = direct.err().or(slip.err()).unwrap();
    assert!(matches!(loser, CycleError::Conflict(_)));

    let stored = fx.engine.loans().get(loan.id).await.unwrap();
    assert_eq!(stored.status, LoanSlipStatus::PartialReturned);
    let (back, held) = if winner_a { (a, b) } else { (b, a) };
    assert_eq!(fx.status(back), DeviceStatus::Available);
    assert_eq!(fx.status(held), DeviceStatus::OnLoan);
}

// ── Codes and cache ──────────────────────────────────────────────────

#[tokio::test]
async fn test_codes_sequential_per_day() {
    let fx = Fixture::new();
    let mut audit = NoopAudit;
    let mut codes = Vec::new();
    for now in [
        "2026-01-15T08:00:00Z",
        "2026-01-15T23:59:59Z",
        "2026-01-16T00:00:00Z",
    ] {
        let mut ctx = OperationContext::new(fx.clerk, &mut audit).at(at(now));
        let slip = fx
            .engine
            .loans()
            .create(&mut ctx, fx.borrower, fx.clerk, &[fx.device(None)])
            .await
            .unwrap();
        codes.push(slip.code.to_string());
    }
    assert_eq!(codes, ["LS_150126_001", "LS_150126_002", "LS_160126_001"]);

    let mut ctx = OperationContext::new(fx.clerk, &mut audit).at(at("2026-01-15T09:00:00Z"));
    let w = fx
        .engine
        .warranties()
        .create_request(&mut ctx, fx.device(None), "fan", date(2026, 1, 15))
        .await
        .unwrap();
    assert_eq!(w.code.as_str(), "WR_150126_01");
    assert_eq!(w.code.kind(), Some(DocumentKind::Warranty));
}

#[tokio::test]
async fn test_code_day_follows_configured_offset() {
    let fx = Fixture::with_config(EngineConfig {
        code_utc_offset_minutes: 7 * 60,
        invalidate_cache: true,
    });
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit).at(at("2026-01-15T18:30:00Z"));
    let slip = fx
        .engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[fx.device(None)])
        .await
        .unwrap();
    assert_eq!(slip.code.as_str(), "LS_160126_001");
}

#[tokio::test]
async fn test_cache_signalled_after_commit_only() {
    let fx = Fixture::new();
    let a = fx.device(None);
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    fx.engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap();
    assert_eq!(fx.cache.tags(), vec![CacheTag::Loan, CacheTag::Devices]);

    fx.cache.clear();
    fx.engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[a])
        .await
        .unwrap_err();
    assert!(fx.cache.tags().is_empty());
}

#[tokio::test]
async fn test_cache_failure_is_not_fatal() {
    let store = MemoryStore::new();
    let clerk = store.add_user();
    let a = store.add_device(Device::new("Laptop", None));
    let cache = Arc::new(RecordingInvalidator::failing());
    let engine = Engine::new(store.clone(), EngineConfig::default())
        .unwrap()
        .with_cache(cache.clone());
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(clerk, &mut audit);
    let slip = engine.loans().create(&mut ctx, clerk, clerk, &[a]).await.unwrap();
    assert_eq!(slip.status, LoanSlipStatus::Borrowing);
    assert_eq!(cache.tags().len(), 2);
    assert_eq!(store.device(a).unwrap().status, DeviceStatus::OnLoan);
}

#[tokio::test]
async fn test_cache_disabled_by_config() {
    let fx = Fixture::with_config(EngineConfig {
        code_utc_offset_minutes: 0,
        invalidate_cache: false,
    });
    let mut audit = NoopAudit;
    let mut ctx = OperationContext::new(fx.clerk, &mut audit);
    fx.engine
        .loans()
        .create(&mut ctx, fx.borrower, fx.clerk, &[fx.device(None)])
        .await
        .unwrap();
    assert!(fx.cache.tags().is_empty());
}
