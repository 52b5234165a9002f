use crate::models::DuplicateCheckRecord;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::PgPool;

/// 取同一发票号码的全部记录（状态过滤由服务层决定）
pub async fn find_all_by_number(
    pool: &PgPool,
    invoice_number: &str,
) -> Result<Vec<DuplicateCheckRecord>, sqlx::Error> {
    sqlx::query_as::<_, DuplicateCheckRecord>(
        r#"
        SELECT id, invoice_number, invoice_date, total_amount,
               user_id, submit_time, status
        FROM invoice_duplicate_check
        WHERE invoice_number = $1
        "#,
    )
    .bind(invoice_number)
    .fetch_all(pool)
    .await
}

/// 按业务主键查找记录
pub async fn find_by_number_and_date(
    pool: &PgPool,
    invoice_number: &str,
    invoice_date: NaiveDate,
) -> Result<Option<DuplicateCheckRecord>, sqlx::Error> {
    sqlx::query_as::<_, DuplicateCheckRecord>(
        r#"
        SELECT id, invoice_number, invoice_date, total_amount,
               user_id, submit_time, status
        FROM invoice_duplicate_check
        WHERE invoice_number = $1
          AND invoice_date = $2
        "#,
    )
    .bind(invoice_number)
    .bind(invoice_date)
    .fetch_optional(pool)
    .await
}

/// 插入新的提交记录，状态 SUBMITTED
pub async fn insert_record(
    pool: &PgPool,
    invoice_number: &str,
    invoice_date: NaiveDate,
    total_amount: Option<&BigDecimal>,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO invoice_duplicate_check
            (invoice_number, invoice_date, total_amount, user_id, submit_time, status)
        VALUES ($1, $2, $3, $4, NOW(), 'SUBMITTED')
        "#,
    )
    .bind(invoice_number)
    .bind(invoice_date)
    .bind(total_amount)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// 更新已有记录：重新提交会重置状态为 SUBMITTED
pub async fn touch_record(pool: &PgPool, id: i64, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE invoice_duplicate_check
        SET user_id = $2,
            submit_time = NOW(),
            status = 'SUBMITTED',
            updated_time = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// 更新记录状态（审批驳回后置 REJECTED，使其退出查重命中）
pub async fn update_status(
    pool: &PgPool,
    invoice_number: &str,
    invoice_date: NaiveDate,
    status: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_duplicate_check
        SET status = $3,
            updated_time = NOW()
        WHERE invoice_number = $1
          AND invoice_date = $2
        "#,
    )
    .bind(invoice_number)
    .bind(invoice_date)
    .bind(status)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
