//! SQLite-backed implementation of the engine's record-store contract.
//! Queries are runtime-checked with explicit binds; money is integer cents
//! and percentages travel as TEXT-encoded decimals.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use attendy_core::answers::{AnswerValue, QuestionId};
use attendy_core::domain::attendance::{AttendanceId, AttendanceSession, ConversationMode};
use attendy_core::domain::lead::{AddressFields, LeadDraft, LeadId, LeadProfile, SourceId};
use attendy_core::domain::operator::{OperatorId, OrgId};
use attendy_core::domain::outcome::{FollowUp, SaleDraft, SaleId};
use attendy_core::domain::product::{KitId, KitRejection, ProductId};
use attendy_core::store::{RecordStore, StoreError};

use crate::DbPool;

pub struct SqlRecordStore {
    pool: DbPool,
}

impl SqlRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn db_error(error: sqlx::Error) -> StoreError {
        StoreError(error.to_string())
    }

    fn lead_from_row(row: &SqliteRow) -> Result<LeadProfile, StoreError> {
        let star_rating: Option<i64> = row.try_get("star_rating").map_err(Self::db_error)?;
        Ok(LeadProfile {
            id: LeadId(row.try_get("id").map_err(Self::db_error)?),
            org_id: OrgId(row.try_get("org_id").map_err(Self::db_error)?),
            owner_operator_id: row
                .try_get::<Option<String>, _>("owner_operator_id")
                .map_err(Self::db_error)?
                .map(OperatorId),
            name: row.try_get("name").map_err(Self::db_error)?,
            phone: row.try_get("phone").map_err(Self::db_error)?,
            email: row.try_get("email").map_err(Self::db_error)?,
            address: AddressFields {
                street: row.try_get("street").map_err(Self::db_error)?,
                number: row.try_get("number").map_err(Self::db_error)?,
                complement: row.try_get("complement").map_err(Self::db_error)?,
                district: row.try_get("district").map_err(Self::db_error)?,
                city: row.try_get("city").map_err(Self::db_error)?,
                state: row.try_get("state").map_err(Self::db_error)?,
                zip: row.try_get("zip").map_err(Self::db_error)?,
            },
            funnel_stage: row.try_get("funnel_stage").map_err(Self::db_error)?,
            star_rating: star_rating.and_then(|value| u8::try_from(value).ok()),
            negotiated_value_cents: row
                .try_get("negotiated_value_cents")
                .map_err(Self::db_error)?,
            created_at: parse_instant(&row.try_get::<String, _>("created_at").map_err(Self::db_error)?)?,
        })
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| StoreError(format!("invalid timestamp `{raw}`: {error}")))
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn find_lead_by_phone(
        &self,
        org_id: &OrgId,
        phone: &str,
    ) -> Result<Option<LeadProfile>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM lead WHERE org_id = ? AND phone = ? ORDER BY created_at LIMIT 1",
        )
        .bind(&org_id.0)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::db_error)?;

        row.as_ref().map(Self::lead_from_row).transpose()
    }

    async fn create_lead(
        &self,
        org_id: &OrgId,
        draft: LeadDraft,
    ) -> Result<LeadProfile, StoreError> {
        let id = new_id("LEAD");
        let created_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO lead (
                id, org_id, name, phone, email,
                street, number, complement, district, city, state, zip,
                funnel_stage, star_rating, negotiated_value_cents, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&org_id.0)
        .bind(&draft.name)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.address.street)
        .bind(&draft.address.number)
        .bind(&draft.address.complement)
        .bind(&draft.address.district)
        .bind(&draft.address.city)
        .bind(&draft.address.state)
        .bind(&draft.address.zip)
        .bind(&draft.funnel_stage)
        .bind(draft.star_rating.map(i64::from))
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;

        Ok(LeadProfile {
            id: LeadId(id),
            org_id: org_id.clone(),
            owner_operator_id: None,
            name: draft.name,
            phone: draft.phone,
            email: draft.email,
            address: draft.address,
            funnel_stage: draft.funnel_stage,
            star_rating: draft.star_rating,
            negotiated_value_cents: 0,
            created_at,
        })
    }

    async fn update_lead(&self, id: &LeadId, draft: LeadDraft) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE lead SET
                name = ?, phone = ?, email = ?,
                street = ?, number = ?, complement = ?, district = ?,
                city = ?, state = ?, zip = ?,
                funnel_stage = ?, star_rating = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.address.street)
        .bind(&draft.address.number)
        .bind(&draft.address.complement)
        .bind(&draft.address.district)
        .bind(&draft.address.city)
        .bind(&draft.address.state)
        .bind(&draft.address.zip)
        .bind(&draft.funnel_stage)
        .bind(draft.star_rating.map(i64::from))
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError(format!("unknown lead `{}`", id.0)));
        }
        Ok(())
    }

    async fn accumulate_lead_potential(
        &self,
        id: &LeadId,
        amount_cents: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE lead SET negotiated_value_cents = negotiated_value_cents + ? WHERE id = ?",
        )
        .bind(amount_cents)
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError(format!("unknown lead `{}`", id.0)));
        }
        Ok(())
    }

    async fn create_attendance(
        &self,
        session: &AttendanceSession,
    ) -> Result<AttendanceId, StoreError> {
        let id = new_id("ATT");
        sqlx::query(
            r#"
            INSERT INTO attendance (
                id, org_id, operator_id, lead_id, phone_searched, lead_existed,
                conversation_mode, current_step, started_at,
                completed, completed_at, sale_id, reason_id, potential_cents
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&session.org_id.0)
        .bind(&session.operator_id.0)
        .bind(session.lead_id.as_ref().map(|lead| lead.0.clone()))
        .bind(&session.phone_searched)
        .bind(session.lead_existed)
        .bind(session.conversation_mode.map(ConversationMode::as_str))
        .bind(session.current_step.as_str())
        .bind(session.started_at.to_rfc3339())
        .bind(session.completed)
        .bind(session.completed_at.map(|value| value.to_rfc3339()))
        .bind(session.sale_id.as_ref().map(|sale| sale.0.clone()))
        .bind(session.reason_id.as_ref().map(|reason| reason.0.clone()))
        .bind(session.potential_cents)
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;

        Ok(AttendanceId(id))
    }

    async fn update_attendance(
        &self,
        id: &AttendanceId,
        session: &AttendanceSession,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance SET
                lead_id = ?, phone_searched = ?, lead_existed = ?,
                conversation_mode = ?, current_step = ?,
                completed = ?, completed_at = ?, sale_id = ?, reason_id = ?,
                potential_cents = ?
            WHERE id = ?
            "#,
        )
        .bind(session.lead_id.as_ref().map(|lead| lead.0.clone()))
        .bind(&session.phone_searched)
        .bind(session.lead_existed)
        .bind(session.conversation_mode.map(ConversationMode::as_str))
        .bind(session.current_step.as_str())
        .bind(session.completed)
        .bind(session.completed_at.map(|value| value.to_rfc3339()))
        .bind(session.sale_id.as_ref().map(|sale| sale.0.clone()))
        .bind(session.reason_id.as_ref().map(|reason| reason.0.clone()))
        .bind(session.potential_cents)
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError(format!("unknown attendance `{}`", id.0)));
        }
        Ok(())
    }

    async fn create_sale(&self, draft: SaleDraft) -> Result<SaleId, StoreError> {
        let id = new_id("SALE");
        let mut tx = self.pool.begin().await.map_err(Self::db_error)?;

        sqlx::query(
            r#"
            INSERT INTO sale (
                id, org_id, lead_id, operator_id, attendance_id,
                subtotal_cents, discount_cents, shipping_cents, total_cents,
                delivery_kind, delivery_region, delivery_date, payment_method,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&draft.org_id.0)
        .bind(&draft.lead_id.0)
        .bind(&draft.operator_id.0)
        .bind(draft.attendance_id.as_ref().map(|att| att.0.clone()))
        .bind(draft.subtotal_cents)
        .bind(draft.discount_cents)
        .bind(draft.shipping_cents)
        .bind(draft.total_cents)
        .bind(draft.delivery.kind.map(|kind| kind.as_str()))
        .bind(draft.delivery.region.as_ref().map(|region| region.0.clone()))
        .bind(draft.delivery.scheduled_date.map(|date| date.to_string()))
        .bind(draft.payment.method.map(|method| method.as_str()))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(Self::db_error)?;

        for (position, item) in draft.items.iter().enumerate() {
            let answers_json = serde_json::to_string(&item.answers)
                .map_err(|error| StoreError(format!("answer encoding failed: {error}")))?;
            sqlx::query(
                r#"
                INSERT INTO sale_item (
                    sale_id, position, product_id, category, kit_id, price_type,
                    quantity, unit_price_cents, commission_pct, commission_cents,
                    answers_json
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(position as i64)
            .bind(&item.product_id.0)
            .bind(item.category.as_str())
            .bind(item.kit_id.as_ref().map(|kit| kit.0.clone()))
            .bind(item.price_type.as_str())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price_cents)
            .bind(item.commission_pct.to_string())
            .bind(item.commission_cents)
            .bind(answers_json)
            .execute(&mut *tx)
            .await
            .map_err(Self::db_error)?;
        }

        for (position, line) in draft.payment.split.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_payment_line (sale_id, position, method, amount_cents)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(position as i64)
            .bind(line.method.as_str())
            .bind(line.amount_cents)
            .execute(&mut *tx)
            .await
            .map_err(Self::db_error)?;
        }

        tx.commit().await.map_err(Self::db_error)?;
        Ok(SaleId(id))
    }

    async fn create_follow_up(&self, follow_up: FollowUp) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO follow_up (id, lead_id, operator_id, reason_id, due_at, exclusive_until, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_id("FUP"))
        .bind(&follow_up.lead_id.0)
        .bind(&follow_up.operator_id.0)
        .bind(&follow_up.reason_id.0)
        .bind(follow_up.due_at.to_rfc3339())
        .bind(follow_up.exclusive_until.map(|value| value.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;
        Ok(())
    }

    async fn record_kit_rejection(&self, rejection: KitRejection) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kit_rejection (lead_id, product_id, kit_id, price_cents, reason, rejected_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rejection.lead_id.0)
        .bind(&rejection.product_id.0)
        .bind(&rejection.kit_id.0)
        .bind(rejection.price_cents)
        .bind(&rejection.reason)
        .bind(rejection.rejected_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;
        Ok(())
    }

    async fn rejected_kit_ids(
        &self,
        lead_id: &LeadId,
        product_id: &ProductId,
    ) -> Result<HashSet<KitId>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT kit_id FROM kit_rejection WHERE lead_id = ? AND product_id = ?",
        )
        .bind(&lead_id.0)
        .bind(&product_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_error)?;

        rows.into_iter()
            .map(|row| row.try_get("kit_id").map(KitId).map_err(Self::db_error))
            .collect()
    }

    async fn record_source_history(
        &self,
        lead_id: &LeadId,
        source: &SourceId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO source_history (lead_id, source_id, recorded_at) VALUES (?, ?, ?)",
        )
        .bind(&lead_id.0)
        .bind(&source.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;
        Ok(())
    }

    async fn record_standard_answers(
        &self,
        lead_id: &LeadId,
        answers: &[(QuestionId, AnswerValue)],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::db_error)?;
        let recorded_at = Utc::now().to_rfc3339();
        for (question, value) in answers {
            let answer_json = serde_json::to_string(value)
                .map_err(|error| StoreError(format!("answer encoding failed: {error}")))?;
            sqlx::query(
                r#"
                INSERT INTO lead_answer (lead_id, question_id, answer_json, recorded_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&lead_id.0)
            .bind(&question.0)
            .bind(answer_json)
            .bind(&recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(Self::db_error)?;
        }
        tx.commit().await.map_err(Self::db_error)?;
        Ok(())
    }
}
