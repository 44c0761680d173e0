use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::answers::AnswerBag;
use crate::domain::attendance::AttendanceId;
use crate::domain::lead::LeadId;
use crate::domain::offer::{DeliveryConfig, PaymentConfig, PriceType};
use crate::domain::operator::{OperatorId, OrgId};
use crate::domain::product::{Category, KitId, ProductId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReasonId(pub String);

/// Catalog entry describing a structured non-purchase outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonPurchaseReason {
    pub id: ReasonId,
    pub org_id: OrgId,
    pub label: String,
    pub followup_hours: Option<i64>,
    pub exclusivity_hours: Option<i64>,
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub lead_id: LeadId,
    pub operator_id: OperatorId,
    pub reason_id: ReasonId,
    pub due_at: DateTime<Utc>,
    pub exclusive_until: Option<DateTime<Utc>>,
}

/// A sale line as written to the record store: per-unit price (bundle totals
/// already converted) and the finalization-normalized commission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaleItemDraft {
    pub product_id: ProductId,
    pub category: Category,
    pub kit_id: Option<KitId>,
    pub price_type: PriceType,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub commission_pct: Decimal,
    pub commission_cents: i64,
    pub answers: AnswerBag,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaleDraft {
    pub org_id: OrgId,
    pub lead_id: LeadId,
    pub operator_id: OperatorId,
    pub attendance_id: Option<AttendanceId>,
    pub items: Vec<SaleItemDraft>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub delivery: DeliveryConfig,
    pub payment: PaymentConfig,
}
