//! Row types for SQLx mapping and their conversion into domain records.
//!
//! Decoding never guesses: an unknown status or malformed code is reported
//! as `StoreError::Corrupt`.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use eqtrack_core::{CoreError, DocumentCode, Timestamp};
use eqtrack_lifecycle::StoreError;
use eqtrack_state::{
    Device, LoanSlip, LoanSlipDetail, MaintenanceReturnSlip, MaintenanceReturnSlipDetail,
    MaintenanceSlip, MaintenanceSlipDetail, ResolveItem, ReturnSlip, ReturnSlipDetail, Warranty,
    WarrantySource,
};

fn corrupt(entity: &'static str) -> impl Fn(CoreError) -> StoreError {
    move |e| StoreError::Corrupt {
        entity,
        detail: e.to_string(),
    }
}

fn ts(dt: DateTime<Utc>) -> Timestamp {
    Timestamp::from_utc(dt)
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
pub(crate) struct DeviceRow {
    id: Uuid,
    name: String,
    serial_number: Option<String>,
    status: String,
    warranty_expiration_date: Option<NaiveDate>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl DeviceRow {
    pub(crate) fn into_record(self) -> Result<Device, StoreError> {
        Ok(Device {
            id: self.id.into(),
            name: self.name,
            serial_number: self.serial_number,
            status: self.status.parse().map_err(corrupt("device"))?,
            warranty_expiration_date: self.warranty_expiration_date,
            version: self.version,
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
            deleted_at: self.deleted_at.map(ts),
        })
    }
}

// ── Loan slips ───────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
pub(crate) struct LoanSlipRow {
    pub(crate) id: Uuid,
    code: String,
    borrower_id: Uuid,
    loaner_id: Uuid,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl LoanSlipRow {
    pub(crate) fn into_record(self, details: Vec<LoanSlipDetail>) -> Result<LoanSlip, StoreError> {
        Ok(LoanSlip {
            id: self.id.into(),
            code: DocumentCode::parse(&self.code).map_err(corrupt("loan slip"))?,
            borrower_id: self.borrower_id.into(),
            loaner_id: self.loaner_id.into(),
            status: self.status.parse().map_err(corrupt("loan slip"))?,
            created_by: self.created_by.into(),
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
            version: self.version,
            details,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LoanDetailRow {
    id: Uuid,
    pub(crate) loan_slip_id: Uuid,
    device_id: Uuid,
    status: String,
    return_date: Option<DateTime<Utc>>,
    note: Option<String>,
}

impl LoanDetailRow {
    pub(crate) fn into_record(self) -> Result<LoanSlipDetail, StoreError> {
        Ok(LoanSlipDetail {
            id: self.id.into(),
            loan_slip_id: self.loan_slip_id.into(),
            device_id: self.device_id.into(),
            status: self.status.parse().map_err(corrupt("loan slip line"))?,
            return_date: self.return_date.map(ts),
            note: self.note,
        })
    }
}

// ── Return slips ─────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
pub(crate) struct ReturnSlipRow {
    id: Uuid,
    code: String,
    loan_slip_id: Uuid,
    returner_id: Uuid,
    return_date: DateTime<Utc>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl ReturnSlipRow {
    pub(crate) fn into_record(
        self,
        lines: Vec<ResolveLineRow>,
    ) -> Result<ReturnSlip, StoreError> {
        let details = lines
            .into_iter()
            .map(|line| {
                Ok(ReturnSlipDetail {
                    id: line.id.into(),
                    return_slip_id: line.parent_id.into(),
                    item: line.into_item("return slip line")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(ReturnSlip {
            id: self.id.into(),
            code: DocumentCode::parse(&self.code).map_err(corrupt("return slip"))?,
            loan_slip_id: self.loan_slip_id.into(),
            returner_id: self.returner_id.into(),
            return_date: ts(self.return_date),
            status: self.status.parse().map_err(corrupt("return slip"))?,
            created_by: self.created_by.into(),
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
            version: self.version,
            details,
        })
    }
}

/// A line of a return or maintenance-return slip. The parent column is
/// selected as `parent_id`.
#[derive(sqlx::FromRow)]
pub(crate) struct ResolveLineRow {
    id: Uuid,
    parent_id: Uuid,
    device_id: Uuid,
    resolution: String,
    note: Option<String>,
}

impl ResolveLineRow {
    fn into_item(self, entity: &'static str) -> Result<ResolveItem, StoreError> {
        Ok(ResolveItem {
            device_id: self.device_id.into(),
            resolution: self.resolution.parse().map_err(corrupt(entity))?,
            note: self.note,
        })
    }
}

// ── Maintenance ──────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
pub(crate) struct MaintenanceSlipRow {
    pub(crate) id: Uuid,
    code: String,
    partner_id: Option<Uuid>,
    reason: String,
    request_date: NaiveDate,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl MaintenanceSlipRow {
    pub(crate) fn into_record(
        self,
        details: Vec<MaintenanceSlipDetail>,
    ) -> Result<MaintenanceSlip, StoreError> {
        Ok(MaintenanceSlip {
            id: self.id.into(),
            code: DocumentCode::parse(&self.code).map_err(corrupt("maintenance slip"))?,
            partner_id: self.partner_id.map(Into::into),
            reason: self.reason,
            request_date: self.request_date,
            status: self.status.parse().map_err(corrupt("maintenance slip"))?,
            created_by: self.created_by.into(),
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
            version: self.version,
            details,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MaintenanceDetailRow {
    id: Uuid,
    pub(crate) maintenance_slip_id: Uuid,
    device_id: Uuid,
    status: String,
    return_date: Option<DateTime<Utc>>,
    note: Option<String>,
}

impl MaintenanceDetailRow {
    pub(crate) fn into_record(self) -> Result<MaintenanceSlipDetail, StoreError> {
        Ok(MaintenanceSlipDetail {
            id: self.id.into(),
            maintenance_slip_id: self.maintenance_slip_id.into(),
            device_id: self.device_id.into(),
            status: self.status.parse().map_err(corrupt("maintenance slip line"))?,
            return_date: self.return_date.map(ts),
            note: self.note,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MaintenanceReturnSlipRow {
    id: Uuid,
    code: String,
    maintenance_slip_id: Uuid,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl MaintenanceReturnSlipRow {
    pub(crate) fn into_record(
        self,
        lines: Vec<ResolveLineRow>,
    ) -> Result<MaintenanceReturnSlip, StoreError> {
        let details = lines
            .into_iter()
            .map(|line| {
                Ok(MaintenanceReturnSlipDetail {
                    id: line.id.into(),
                    maintenance_return_slip_id: line.parent_id.into(),
                    item: line.into_item("maintenance return slip line")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(MaintenanceReturnSlip {
            id: self.id.into(),
            code: DocumentCode::parse(&self.code).map_err(corrupt("maintenance return slip"))?,
            maintenance_slip_id: self.maintenance_slip_id.into(),
            status: self.status.parse().map_err(corrupt("maintenance return slip"))?,
            created_by: self.created_by.into(),
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
            version: self.version,
            details,
        })
    }
}

// ── Warranties ───────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
pub(crate) struct WarrantyRow {
    id: Uuid,
    code: String,
    device_id: Uuid,
    reason: String,
    request_date: NaiveDate,
    status: String,
    prior_device_status: String,
    source_kind: String,
    source_id: Option<Uuid>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl WarrantyRow {
    pub(crate) fn into_record(self) -> Result<Warranty, StoreError> {
        let bad = corrupt("warranty");
        Ok(Warranty {
            id: self.id.into(),
            code: DocumentCode::parse(&self.code).map_err(&bad)?,
            device_id: self.device_id.into(),
            reason: self.reason,
            request_date: self.request_date,
            status: self.status.parse().map_err(&bad)?,
            prior_device_status: self.prior_device_status.parse().map_err(&bad)?,
            source: WarrantySource::from_parts(&self.source_kind, self.source_id).map_err(&bad)?,
            created_by: self.created_by.into(),
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
            version: self.version,
        })
    }
}
