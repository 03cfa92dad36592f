//! Aggregate reads for the reporting jobs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use anvilcrm_core::OrderId;

use crate::error::{decode_err, map_sqlx_error, StoreResult};

/// Totals for the periodic CRM report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTotals {
    pub customers: i64,
    pub orders: i64,
    pub revenue: Decimal,
}

/// One pending order due for a reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrderReminder {
    pub order_id: OrderId,
    pub order_date: DateTime<Utc>,
    pub email: String,
}

/// Customer/order counts and summed revenue, in one round trip.
pub async fn report_totals(pool: &PgPool) -> StoreResult<ReportTotals> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM customers) AS customers,
            (SELECT COUNT(*) FROM orders) AS orders,
            (SELECT COALESCE(SUM(total_amount), 0) FROM orders) AS revenue
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(|e| map_sqlx_error("report_totals", e))?;

    Ok(ReportTotals {
        customers: row
            .try_get("customers")
            .map_err(|e| decode_err("customers", e))?,
        orders: row.try_get("orders").map_err(|e| decode_err("orders", e))?,
        revenue: row
            .try_get("revenue")
            .map_err(|e| decode_err("revenue", e))?,
    })
}

/// Pending orders placed at or after `since`, oldest first, with the
/// customer's email for the reminder line.
pub async fn recent_pending_orders(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> StoreResult<Vec<PendingOrderReminder>> {
    let rows = sqlx::query(
        r#"
        SELECT o.id, o.order_date, c.email
        FROM orders o
        JOIN customers c ON c.id = o.customer_id
        WHERE o.status = 'pending' AND o.order_date >= $1
        ORDER BY o.order_date ASC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("recent_pending_orders", e))?;

    let mut reminders = Vec::with_capacity(rows.len());
    for row in rows {
        reminders.push(PendingOrderReminder {
            order_id: OrderId::from_uuid(
                row.try_get("id").map_err(|e| decode_err("orders.id", e))?,
            ),
            order_date: row
                .try_get("order_date")
                .map_err(|e| decode_err("orders.order_date", e))?,
            email: row
                .try_get("email")
                .map_err(|e| decode_err("customers.email", e))?,
        });
    }
    Ok(reminders)
}

/// Liveness probe used by the heartbeat job.
pub async fn ping(pool: &PgPool) -> StoreResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ping", e))?;
    Ok(())
}
