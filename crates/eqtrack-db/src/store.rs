//! [`Store`] implementation on a Postgres pool.

use std::collections::HashMap;
use std::fmt::Display;

use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Postgres;
use uuid::Uuid;

use eqtrack_core::{
    DeviceId, LoanSlipId, MaintenanceReturnSlipId, MaintenanceSlipId, PartnerId, ReturnSlipId,
    UserId, WarrantyId,
};
use eqtrack_lifecycle::{
    LoanSlipFilter, MaintenanceSlipFilter, Store, StoreError, Transaction, WarrantyFilter,
};
use eqtrack_state::{
    Device, LoanSlip, MaintenanceReturnSlip, MaintenanceSlip, ResolveItem, ReturnSlip, Warranty,
};

use crate::rows::{
    DeviceRow, LoanDetailRow, LoanSlipRow, MaintenanceDetailRow, MaintenanceReturnSlipRow,
    MaintenanceSlipRow, ResolveLineRow, ReturnSlipRow, WarrantyRow,
};

const DEVICE_COLUMNS: &str = "id, name, serial_number, status, warranty_expiration_date, \
     version, created_at, updated_at, deleted_at";

const LOAN_COLUMNS: &str =
    "id, code, borrower_id, loaner_id, status, created_by, created_at, updated_at, version";

const LOAN_DETAIL_COLUMNS: &str = "id, loan_slip_id, device_id, status, return_date, note";

const RETURN_COLUMNS: &str = "id, code, loan_slip_id, returner_id, return_date, status, \
     created_by, created_at, updated_at, version";

const MAINTENANCE_COLUMNS: &str = "id, code, partner_id, reason, request_date, status, \
     created_by, created_at, updated_at, version";

const MAINTENANCE_DETAIL_COLUMNS: &str =
    "id, maintenance_slip_id, device_id, status, return_date, note";

const MAINTENANCE_RETURN_COLUMNS: &str =
    "id, code, maintenance_slip_id, status, created_by, created_at, updated_at, version";

const WARRANTY_COLUMNS: &str = "id, code, device_id, reason, request_date, status, \
     prior_device_status, source_kind, source_id, created_by, created_at, updated_at, version";

/// Translate a driver error. Unique violations become `Duplicate`,
/// serialization failures and deadlocks become `Conflict`.
fn classify(entity: &'static str, id: impl Display) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some("23505") => {
                    return StoreError::Duplicate {
                        entity,
                        detail: db.message().to_string(),
                    }
                }
                Some("40001") | Some("40P01") => {
                    return StoreError::Conflict {
                        entity,
                        id: id.to_string(),
                    }
                }
                _ => {}
            }
        }
        StoreError::Backend(err.to_string())
    }
}

/// Postgres-backed [`Store`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool. Migrations must already be applied.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let tx = self.pool.begin().await.map_err(classify("transaction", "begin"))?;
        Ok(PgTransaction { tx })
    }
}

/// One Postgres transaction.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Tell a stale version apart from a vanished row after an update
    /// matched nothing.
    async fn missed_update(
        &mut self,
        table: &'static str,
        entity: &'static str,
        id: Uuid,
    ) -> StoreError {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
        match sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(self.conn())
            .await
        {
            Ok(true) => StoreError::Conflict {
                entity,
                id: id.to_string(),
            },
            Ok(false) => StoreError::Missing {
                entity,
                id: id.to_string(),
            },
            Err(e) => classify(entity, id)(e),
        }
    }

    async fn load_loan_details(
        &mut self,
        slip_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<LoanDetailRow>>, StoreError> {
        let sql = format!(
            "SELECT {LOAN_DETAIL_COLUMNS} FROM loan_slip_details \
             WHERE loan_slip_id = ANY($1) ORDER BY position"
        );
        let rows = sqlx::query_as::<_, LoanDetailRow>(&sql)
            .bind(slip_ids)
            .fetch_all(self.conn())
            .await
            .map_err(classify("loan slip line", "*"))?;
        let mut grouped: HashMap<Uuid, Vec<LoanDetailRow>> = HashMap::new();
        for row in rows {
            grouped.entry(row.loan_slip_id).or_default().push(row);
        }
        Ok(grouped)
    }

    async fn assemble_loan_slips(
        &mut self,
        headers: Vec<LoanSlipRow>,
    ) -> Result<Vec<LoanSlip>, StoreError> {
        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let mut details = self.load_loan_details(&ids).await?;
        headers
            .into_iter()
            .map(|header| {
                let lines = details
                    .remove(&header.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(LoanDetailRow::into_record)
                    .collect::<Result<Vec<_>, _>>()?;
                header.into_record(lines)
            })
            .collect()
    }

    async fn load_maintenance_details(
        &mut self,
        slip_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<MaintenanceDetailRow>>, StoreError> {
        let sql = format!(
            "SELECT {MAINTENANCE_DETAIL_COLUMNS} FROM maintenance_slip_details \
             WHERE maintenance_slip_id = ANY($1) ORDER BY position"
        );
        let rows = sqlx::query_as::<_, MaintenanceDetailRow>(&sql)
            .bind(slip_ids)
            .fetch_all(self.conn())
            .await
            .map_err(classify("maintenance slip line", "*"))?;
        let mut grouped: HashMap<Uuid, Vec<MaintenanceDetailRow>> = HashMap::new();
        for row in rows {
            grouped.entry(row.maintenance_slip_id).or_default().push(row);
        }
        Ok(grouped)
    }

    async fn assemble_maintenance_slips(
        &mut self,
        headers: Vec<MaintenanceSlipRow>,
    ) -> Result<Vec<MaintenanceSlip>, StoreError> {
        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let mut details = self.load_maintenance_details(&ids).await?;
        headers
            .into_iter()
            .map(|header| {
                let lines = details
                    .remove(&header.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(MaintenanceDetailRow::into_record)
                    .collect::<Result<Vec<_>, _>>()?;
                header.into_record(lines)
            })
            .collect()
    }

    async fn load_resolve_lines(
        &mut self,
        table: &'static str,
        parent_column: &'static str,
        parent: Uuid,
    ) -> Result<Vec<ResolveLineRow>, StoreError> {
        let sql = format!(
            "SELECT id, {parent_column} AS parent_id, device_id, resolution, note \
             FROM {table} WHERE {parent_column} = $1 ORDER BY position"
        );
        sqlx::query_as::<_, ResolveLineRow>(&sql)
            .bind(parent)
            .fetch_all(self.conn())
            .await
            .map_err(classify(table, parent))
    }

    async fn insert_resolve_lines(
        &mut self,
        table: &'static str,
        parent_column: &'static str,
        lines: impl Iterator<Item = (Uuid, Uuid, &ResolveItem)>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {table} (id, {parent_column}, device_id, position, resolution, note) \
             VALUES ($1, $2, $3, $4, $5, $6)"
        );
        for (position, (id, parent, item)) in lines.enumerate() {
            sqlx::query(&sql)
                .bind(id)
                .bind(parent)
                .bind(item.device_id.0)
                .bind(position as i32)
                .bind(item.resolution.as_str())
                .bind(item.note.as_deref())
                .execute(self.conn())
                .await
                .map_err(classify(table, id))?;
        }
        Ok(())
    }
}

impl Transaction for PgTransaction {
    // ── Reference data ───────────────────────────────────────────────

    async fn user_exists(&mut self, id: UserId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(id.0)
        .fetch_one(self.conn())
        .await
        .map_err(classify("user", id))
    }

    async fn partner_exists(&mut self, id: PartnerId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM partners WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(id.0)
        .fetch_one(self.conn())
        .await
        .map_err(classify("partner", id))
    }

    // ── Devices ──────────────────────────────────────────────────────

    async fn find_device(&mut self, id: DeviceId) -> Result<Option<Device>, StoreError> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(classify("device", id))?;
        row.map(DeviceRow::into_record).transpose()
    }

    async fn update_device(&mut self, device: &mut Device) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE devices SET status = $1, updated_at = $2, version = version + 1 \
             WHERE id = $3 AND version = $4",
        )
        .bind(device.status.as_str())
        .bind(*device.updated_at.as_datetime())
        .bind(device.id.0)
        .bind(device.version)
        .execute(self.conn())
        .await
        .map_err(classify("device", device.id))?;

        if result.rows_affected() == 0 {
            return Err(self.missed_update("devices", "device", device.id.0).await);
        }
        device.version += 1;
        Ok(())
    }

    // ── Loan slips ───────────────────────────────────────────────────

    async fn insert_loan_slip(&mut self, slip: &LoanSlip) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO loan_slips (id, code, borrower_id, loaner_id, status, created_by, \
             created_at, updated_at, version) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(slip.id.0)
        .bind(slip.code.as_str())
        .bind(slip.borrower_id.0)
        .bind(slip.loaner_id.0)
        .bind(slip.status.as_str())
        .bind(slip.created_by.0)
        .bind(*slip.created_at.as_datetime())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("loan slip", slip.id))?;

        for (position, line) in slip.details.iter().enumerate() {
            sqlx::query(
                "INSERT INTO loan_slip_details (id, loan_slip_id, device_id, position, status, \
                 return_date, note) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(line.id.0)
            .bind(slip.id.0)
            .bind(line.device_id.0)
            .bind(position as i32)
            .bind(line.status.as_str())
            .bind(line.return_date.map(|t| *t.as_datetime()))
            .bind(line.note.as_deref())
            .execute(self.conn())
            .await
            .map_err(classify("loan slip line", line.id))?;
        }
        Ok(())
    }

    async fn find_loan_slip(&mut self, id: LoanSlipId) -> Result<Option<LoanSlip>, StoreError> {
        let sql = format!("SELECT {LOAN_COLUMNS} FROM loan_slips WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, LoanSlipRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(classify("loan slip", id))?;
        match row {
            Some(header) => Ok(self.assemble_loan_slips(vec![header]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_loan_slip(&mut self, slip: &mut LoanSlip) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE loan_slips SET status = $1, updated_at = $2, version = version + 1 \
             WHERE id = $3 AND version = $4",
        )
        .bind(slip.status.as_str())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.id.0)
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("loan slip", slip.id))?;
        if result.rows_affected() == 0 {
            return Err(self.missed_update("loan_slips", "loan slip", slip.id.0).await);
        }

        for line in &slip.details {
            sqlx::query(
                "UPDATE loan_slip_details SET status = $1, return_date = $2, note = $3 \
                 WHERE id = $4",
            )
            .bind(line.status.as_str())
            .bind(line.return_date.map(|t| *t.as_datetime()))
            .bind(line.note.as_deref())
            .bind(line.id.0)
            .execute(self.conn())
            .await
            .map_err(classify("loan slip line", line.id))?;
        }
        slip.version += 1;
        Ok(())
    }

    async fn find_loan_slips(
        &mut self,
        filter: &LoanSlipFilter,
    ) -> Result<Vec<LoanSlip>, StoreError> {
        let sql = format!(
            "SELECT {LOAN_COLUMNS} FROM loan_slips \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR borrower_id = $2) \
             ORDER BY created_at DESC, code DESC"
        );
        let headers = sqlx::query_as::<_, LoanSlipRow>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.borrower_id.map(|b| b.0))
            .fetch_all(self.conn())
            .await
            .map_err(classify("loan slip", "*"))?;
        self.assemble_loan_slips(headers).await
    }

    // ── Return slips ─────────────────────────────────────────────────

    async fn insert_return_slip(&mut self, slip: &ReturnSlip) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO return_slips (id, code, loan_slip_id, returner_id, return_date, status, \
             created_by, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(slip.id.0)
        .bind(slip.code.as_str())
        .bind(slip.loan_slip_id.0)
        .bind(slip.returner_id.0)
        .bind(*slip.return_date.as_datetime())
        .bind(slip.status.as_str())
        .bind(slip.created_by.0)
        .bind(*slip.created_at.as_datetime())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("return slip", slip.id))?;

        self.insert_resolve_lines(
            "return_slip_details",
            "return_slip_id",
            slip.details.iter().map(|d| (d.id.0, slip.id.0, &d.item)),
        )
        .await
    }

    async fn find_return_slip(
        &mut self,
        id: ReturnSlipId,
    ) -> Result<Option<ReturnSlip>, StoreError> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM return_slips WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, ReturnSlipRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(classify("return slip", id))?;
        let Some(header) = row else {
            return Ok(None);
        };
        let lines = self
            .load_resolve_lines("return_slip_details", "return_slip_id", id.0)
            .await?;
        header.into_record(lines).map(Some)
    }

    async fn update_return_slip(&mut self, slip: &mut ReturnSlip) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE return_slips SET status = $1, updated_at = $2, version = version + 1 \
             WHERE id = $3 AND version = $4",
        )
        .bind(slip.status.as_str())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.id.0)
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("return slip", slip.id))?;
        if result.rows_affected() == 0 {
            return Err(self.missed_update("return_slips", "return slip", slip.id.0).await);
        }
        slip.version += 1;
        Ok(())
    }

    // ── Maintenance ──────────────────────────────────────────────────

    async fn insert_maintenance_slip(
        &mut self,
        slip: &MaintenanceSlip,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO maintenance_slips (id, code, partner_id, reason, request_date, status, \
             created_by, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(slip.id.0)
        .bind(slip.code.as_str())
        .bind(slip.partner_id.map(|p| p.0))
        .bind(&slip.reason)
        .bind(slip.request_date)
        .bind(slip.status.as_str())
        .bind(slip.created_by.0)
        .bind(*slip.created_at.as_datetime())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("maintenance slip", slip.id))?;

        for (position, line) in slip.details.iter().enumerate() {
            sqlx::query(
                "INSERT INTO maintenance_slip_details (id, maintenance_slip_id, device_id, \
                 position, status, return_date, note) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(line.id.0)
            .bind(slip.id.0)
            .bind(line.device_id.0)
            .bind(position as i32)
            .bind(line.status.as_str())
            .bind(line.return_date.map(|t| *t.as_datetime()))
            .bind(line.note.as_deref())
            .execute(self.conn())
            .await
            .map_err(classify("maintenance slip line", line.id))?;
        }
        Ok(())
    }

    async fn find_maintenance_slip(
        &mut self,
        id: MaintenanceSlipId,
    ) -> Result<Option<MaintenanceSlip>, StoreError> {
        let sql =
            format!("SELECT {MAINTENANCE_COLUMNS} FROM maintenance_slips WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, MaintenanceSlipRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(classify("maintenance slip", id))?;
        match row {
            Some(header) => Ok(self.assemble_maintenance_slips(vec![header]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_maintenance_slip(
        &mut self,
        slip: &mut MaintenanceSlip,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE maintenance_slips SET status = $1, updated_at = $2, version = version + 1 \
             WHERE id = $3 AND version = $4",
        )
        .bind(slip.status.as_str())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.id.0)
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("maintenance slip", slip.id))?;
        if result.rows_affected() == 0 {
            return Err(self
                .missed_update("maintenance_slips", "maintenance slip", slip.id.0)
                .await);
        }

        for line in &slip.details {
            sqlx::query(
                "UPDATE maintenance_slip_details SET status = $1, return_date = $2, note = $3 \
                 WHERE id = $4",
            )
            .bind(line.status.as_str())
            .bind(line.return_date.map(|t| *t.as_datetime()))
            .bind(line.note.as_deref())
            .bind(line.id.0)
            .execute(self.conn())
            .await
            .map_err(classify("maintenance slip line", line.id))?;
        }
        slip.version += 1;
        Ok(())
    }

    async fn find_maintenance_slips(
        &mut self,
        filter: &MaintenanceSlipFilter,
    ) -> Result<Vec<MaintenanceSlip>, StoreError> {
        let sql = format!(
            "SELECT {MAINTENANCE_COLUMNS} FROM maintenance_slips \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR partner_id = $2) \
             ORDER BY created_at DESC, code DESC"
        );
        let headers = sqlx::query_as::<_, MaintenanceSlipRow>(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.partner_id.map(|p| p.0))
            .fetch_all(self.conn())
            .await
            .map_err(classify("maintenance slip", "*"))?;
        self.assemble_maintenance_slips(headers).await
    }

    async fn insert_maintenance_return_slip(
        &mut self,
        slip: &MaintenanceReturnSlip,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO maintenance_return_slips (id, code, maintenance_slip_id, status, \
             created_by, created_at, updated_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(slip.id.0)
        .bind(slip.code.as_str())
        .bind(slip.maintenance_slip_id.0)
        .bind(slip.status.as_str())
        .bind(slip.created_by.0)
        .bind(*slip.created_at.as_datetime())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("maintenance return slip", slip.id))?;

        self.insert_resolve_lines(
            "maintenance_return_slip_details",
            "maintenance_return_slip_id",
            slip.details.iter().map(|d| (d.id.0, slip.id.0, &d.item)),
        )
        .await
    }

    async fn find_maintenance_return_slip(
        &mut self,
        id: MaintenanceReturnSlipId,
    ) -> Result<Option<MaintenanceReturnSlip>, StoreError> {
        let sql = format!(
            "SELECT {MAINTENANCE_RETURN_COLUMNS} FROM maintenance_return_slips \
             WHERE id = $1 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, MaintenanceReturnSlipRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(classify("maintenance return slip", id))?;
        let Some(header) = row else {
            return Ok(None);
        };
        let lines = self
            .load_resolve_lines(
                "maintenance_return_slip_details",
                "maintenance_return_slip_id",
                id.0,
            )
            .await?;
        header.into_record(lines).map(Some)
    }

    async fn update_maintenance_return_slip(
        &mut self,
        slip: &mut MaintenanceReturnSlip,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE maintenance_return_slips SET status = $1, updated_at = $2, \
             version = version + 1 WHERE id = $3 AND version = $4",
        )
        .bind(slip.status.as_str())
        .bind(*slip.updated_at.as_datetime())
        .bind(slip.id.0)
        .bind(slip.version)
        .execute(self.conn())
        .await
        .map_err(classify("maintenance return slip", slip.id))?;
        if result.rows_affected() == 0 {
            return Err(self
                .missed_update(
                    "maintenance_return_slips",
                    "maintenance return slip",
                    slip.id.0,
                )
                .await);
        }
        slip.version += 1;
        Ok(())
    }

    // ── Warranties ───────────────────────────────────────────────────

    async fn insert_warranty(&mut self, warranty: &Warranty) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO warranties (id, code, device_id, reason, request_date, status, \
             prior_device_status, source_kind, source_id, created_by, created_at, updated_at, \
             version) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(warranty.id.0)
        .bind(warranty.code.as_str())
        .bind(warranty.device_id.0)
        .bind(&warranty.reason)
        .bind(warranty.request_date)
        .bind(warranty.status.as_str())
        .bind(warranty.prior_device_status.as_str())
        .bind(warranty.source.kind_str())
        .bind(warranty.source.document_id())
        .bind(warranty.created_by.0)
        .bind(*warranty.created_at.as_datetime())
        .bind(*warranty.updated_at.as_datetime())
        .bind(warranty.version)
        .execute(self.conn())
        .await
        .map_err(classify("warranty", warranty.id))?;
        Ok(())
    }

    async fn find_warranty(&mut self, id: WarrantyId) -> Result<Option<Warranty>, StoreError> {
        let sql = format!("SELECT {WARRANTY_COLUMNS} FROM warranties WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, WarrantyRow>(&sql)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(classify("warranty", id))?;
        row.map(WarrantyRow::into_record).transpose()
    }

    async fn update_warranty(&mut self, warranty: &mut Warranty) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE warranties SET status = $1, updated_at = $2, version = version + 1 \
             WHERE id = $3 AND version = $4",
        )
        .bind(warranty.status.as_str())
        .bind(*warranty.updated_at.as_datetime())
        .bind(warranty.id.0)
        .bind(warranty.version)
        .execute(self.conn())
        .await
        .map_err(classify("warranty", warranty.id))?;
        if result.rows_affected() == 0 {
            return Err(self.missed_update("warranties", "warranty", warranty.id.0).await);
        }
        warranty.version += 1;
        Ok(())
    }

    async fn find_warranties(
        &mut self,
        filter: &WarrantyFilter,
    ) -> Result<Vec<Warranty>, StoreError> {
        let sql = format!(
            "SELECT {WARRANTY_COLUMNS} FROM warranties \
             WHERE ($1::uuid IS NULL OR device_id = $1) \
               AND (NOT $2 OR status IN ('PENDING', 'PROCESSING')) \
             ORDER BY created_at DESC, code DESC"
        );
        let rows = sqlx::query_as::<_, WarrantyRow>(&sql)
            .bind(filter.device_id.map(|d| d.0))
            .bind(filter.open_only)
            .fetch_all(self.conn())
            .await
            .map_err(classify("warranty", "*"))?;
        rows.into_iter().map(WarrantyRow::into_record).collect()
    }

    // ── Sequences ────────────────────────────────────────────────────

    async fn next_sequence(&mut self, key: &str) -> Result<u32, StoreError> {
        let value = sqlx::query_scalar::<_, i32>(
            "INSERT INTO document_sequences (key, value) VALUES ($1, 1) \
             ON CONFLICT (key) DO UPDATE SET value = document_sequences.value + 1 \
             RETURNING value",
        )
        .bind(key)
        .fetch_one(self.conn())
        .await
        .map_err(classify("sequence", key))?;
        u32::try_from(value).map_err(|_| StoreError::Corrupt {
            entity: "sequence",
            detail: format!("{key} holds {value}"),
        })
    }

    // ── Completion ───────────────────────────────────────────────────

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(classify("transaction", "commit"))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(classify("transaction", "rollback"))
    }
}
