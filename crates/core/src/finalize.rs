//! The two mutually exclusive terminal operations of an attendance: a
//! committed sale, or a structured non-purchase classification with its
//! follow-up scheduling and best-effort webhook.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, warn};

use crate::answers::route_answers;
use crate::domain::attendance::{AttendanceId, AttendanceSession};
use crate::domain::lead::{LeadDraft, LeadId, SourceId};
use crate::domain::offer::{DeliveryConfig, OfferItem, PaymentConfig};
use crate::domain::operator::OperatorProfile;
use crate::domain::outcome::{
    FollowUp, NonPurchaseReason, ReasonId, SaleDraft, SaleId, SaleItemDraft,
};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::states::FlowStep;
use crate::money::{pct_of_cents, per_unit_cents};
use crate::resilience::{SnapshotStore, SESSION_SNAPSHOT_KEY};
use crate::store::{PricingCatalog, RecordStore, WebhookDispatcher};

pub struct FinalizationEngine<'a, S, C, W> {
    store: &'a S,
    catalog: &'a C,
    webhooks: &'a W,
}

#[derive(Clone, Debug)]
pub struct SaleInput {
    pub operator: OperatorProfile,
    pub session: AttendanceSession,
    pub lead_id: Option<LeadId>,
    pub lead: LeadDraft,
    pub source: Option<SourceId>,
    pub items: Vec<OfferItem>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub delivery: DeliveryConfig,
    pub payment: PaymentConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaleOutcome {
    pub sale_id: SaleId,
    pub lead_id: LeadId,
    pub attendance_id: AttendanceId,
}

#[derive(Clone, Debug)]
pub struct NonPurchaseInput {
    pub operator: OperatorProfile,
    pub session: AttendanceSession,
    pub lead_id: Option<LeadId>,
    pub lead: LeadDraft,
    pub reason_id: ReasonId,
    pub potential_cents: i64,
    pub explicit_follow_up: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NonPurchaseOutcome {
    pub lead_id: LeadId,
    pub attendance_id: AttendanceId,
    pub follow_up_due: Option<DateTime<Utc>>,
}

/// Normalizes offer items for the sale write: when any cart-level discount
/// was applied, every item's commission collapses to the seller's standing
/// default, discarding tier and negotiated overrides; bundle totals are
/// converted to true per-unit prices.
pub fn normalize_sale_items(
    items: &[OfferItem],
    discount_cents: i64,
    seller_default_pct: Decimal,
) -> Vec<SaleItemDraft> {
    items
        .iter()
        .map(|item| {
            let commission_pct = if discount_cents > 0 {
                seller_default_pct
            } else {
                item.commission_pct
            };
            let unit_price_cents = if item.category.is_bundle() {
                per_unit_cents(item.unit_price_cents, item.quantity)
            } else {
                item.unit_price_cents
            };
            let line_total = unit_price_cents * i64::from(item.quantity);
            SaleItemDraft {
                product_id: item.product_id.clone(),
                category: item.category,
                kit_id: item.kit_id.clone(),
                price_type: item.price_type,
                quantity: item.quantity,
                unit_price_cents,
                commission_pct,
                commission_cents: pct_of_cents(line_total, commission_pct),
                answers: item.answers.clone(),
            }
        })
        .collect()
}

/// Due time for the follow-up a reason schedules: the operator's explicit
/// timestamp when given, otherwise now plus the reason's delay. Reasons
/// without a delay schedule nothing.
pub fn follow_up_due(
    reason: &NonPurchaseReason,
    explicit: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    reason
        .followup_hours
        .map(|hours| explicit.unwrap_or(now + Duration::hours(hours)))
}

pub fn exclusivity_until(
    reason: &NonPurchaseReason,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    reason.exclusivity_hours.map(|hours| now + Duration::hours(hours))
}

impl<'a, S, C, W> FinalizationEngine<'a, S, C, W>
where
    S: RecordStore,
    C: PricingCatalog,
    W: WebhookDispatcher,
{
    pub fn new(store: &'a S, catalog: &'a C, webhooks: &'a W) -> Self {
        Self { store, catalog, webhooks }
    }

    /// Writes the sale and everything around it. Earlier writes are not
    /// rolled back when a later one fails; the operator retries manually.
    pub async fn commit_sale(
        &self,
        input: SaleInput,
        snapshots: &dyn SnapshotStore,
    ) -> Result<SaleOutcome, ApplicationError> {
        if input.items.is_empty() {
            return Err(DomainError::Validation {
                field: "offer",
                message: "at least one confirmed item is required".to_owned(),
            }
            .into());
        }
        if input.payment.method.is_none() {
            return Err(DomainError::Validation {
                field: "payment_method",
                message: "a payment method must be chosen".to_owned(),
            }
            .into());
        }

        let lead_id = self.resolve_lead(&input.session, input.lead_id.clone(), &input.lead).await?;

        let mut items = normalize_sale_items(
            &input.items,
            input.discount_cents,
            input.operator.default_commission_pct,
        );
        let mut standard_answers = Vec::new();
        for (draft, item) in items.iter_mut().zip(&input.items) {
            let definitions = self
                .catalog
                .product(&item.product_id)
                .map(|product| product.questions)
                .unwrap_or_default();
            let routed = route_answers(&item.answers, &definitions);
            standard_answers.extend(routed.standard);
            draft.answers = routed.product.into_iter().collect();
        }
        if !standard_answers.is_empty() {
            self.store.record_standard_answers(&lead_id, &standard_answers).await?;
        }

        if let Some(source) = &input.source {
            self.store.record_source_history(&lead_id, source).await?;
        }

        let sale_id = self
            .store
            .create_sale(SaleDraft {
                org_id: input.session.org_id.clone(),
                lead_id: lead_id.clone(),
                operator_id: input.operator.id.clone(),
                attendance_id: input.session.id.clone(),
                items,
                subtotal_cents: input.subtotal_cents,
                discount_cents: input.discount_cents,
                shipping_cents: input.shipping_cents,
                total_cents: input.total_cents,
                delivery: input.delivery.clone(),
                payment: input.payment.clone(),
            })
            .await?;

        let mut session = input.session.clone();
        session.lead_id = Some(lead_id.clone());
        session.current_step = FlowStep::SaleOrReason;
        session.completed = true;
        session.completed_at = Some(Utc::now());
        session.sale_id = Some(sale_id.clone());
        let attendance_id = self.upsert_attendance(session).await?;

        clear_snapshot(snapshots);

        Ok(SaleOutcome { sale_id, lead_id, attendance_id })
    }

    /// Records the non-purchase classification, schedules the follow-up the
    /// reason asks for, and fires its webhook best-effort.
    pub async fn classify_non_purchase(
        &self,
        input: NonPurchaseInput,
        snapshots: &dyn SnapshotStore,
    ) -> Result<NonPurchaseOutcome, ApplicationError> {
        if input.potential_cents <= 0 {
            return Err(DomainError::Validation {
                field: "purchase_potential",
                message: "a positive purchase potential is required".to_owned(),
            }
            .into());
        }
        let reason = self.catalog.reason(&input.reason_id).ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(format!(
                "unknown non-purchase reason `{}`",
                input.reason_id.0
            )))
        })?;

        let now = Utc::now();
        let lead_id = self.resolve_lead(&input.session, input.lead_id.clone(), &input.lead).await?;
        self.store.accumulate_lead_potential(&lead_id, input.potential_cents).await?;

        let due = follow_up_due(&reason, input.explicit_follow_up, now);
        if let Some(due_at) = due {
            self.store
                .create_follow_up(FollowUp {
                    lead_id: lead_id.clone(),
                    operator_id: input.operator.id.clone(),
                    reason_id: reason.id.clone(),
                    due_at,
                    exclusive_until: exclusivity_until(&reason, now),
                })
                .await?;
        }

        if let Some(url) = &reason.webhook_url {
            let payload = json!({
                "lead_id": lead_id.0,
                "phone": input.lead.phone,
                "reason_id": reason.id.0,
                "reason_label": reason.label,
                "potential_cents": input.potential_cents,
                "follow_up_due": due.map(|value| value.to_rfc3339()),
            });
            if let Err(error) = self.webhooks.dispatch(url, &payload).await {
                debug!(%error, url, "non-purchase webhook dropped");
            }
        }

        let mut session = input.session.clone();
        session.lead_id = Some(lead_id.clone());
        session.current_step = FlowStep::SaleOrReason;
        session.completed = true;
        session.completed_at = Some(now);
        session.reason_id = Some(reason.id.clone());
        session.potential_cents = Some(input.potential_cents);
        let attendance_id = self.upsert_attendance(session).await?;

        clear_snapshot(snapshots);

        Ok(NonPurchaseOutcome { lead_id, attendance_id, follow_up_due: due })
    }

    async fn resolve_lead(
        &self,
        session: &AttendanceSession,
        lead_id: Option<LeadId>,
        draft: &LeadDraft,
    ) -> Result<LeadId, ApplicationError> {
        match lead_id {
            Some(id) => {
                self.store.update_lead(&id, draft.clone()).await?;
                Ok(id)
            }
            None => {
                if !draft.has_name() {
                    return Err(DomainError::Validation {
                        field: "lead_name",
                        message: "a lead name is required".to_owned(),
                    }
                    .into());
                }
                let lead = self.store.create_lead(&session.org_id, draft.clone()).await?;
                Ok(lead.id)
            }
        }
    }

    async fn upsert_attendance(
        &self,
        session: AttendanceSession,
    ) -> Result<AttendanceId, ApplicationError> {
        match session.id.clone() {
            Some(id) => {
                self.store.update_attendance(&id, &session).await?;
                Ok(id)
            }
            None => Ok(self.store.create_attendance(&session).await?),
        }
    }
}

/// The committed outcome must not be undone by a local io hiccup.
fn clear_snapshot(snapshots: &dyn SnapshotStore) {
    if let Err(error) = snapshots.clear(SESSION_SNAPSHOT_KEY) {
        warn!(%error, "failed to clear session snapshot after finalization");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::answers::{AnswerBag, AnswerValue, QuestionId};
    use crate::domain::attendance::AttendanceSession;
    use crate::domain::lead::{LeadDraft, LeadId, SourceId};
    use crate::domain::offer::{
        DeliveryConfig, OfferItem, PaymentConfig, PaymentLine, PaymentMethod, PriceType,
    };
    use crate::domain::operator::{OperatorId, OperatorProfile, OrgId};
    use crate::domain::outcome::{NonPurchaseReason, ReasonId};
    use crate::domain::product::{Category, KitId, PriceTier, ProductId};
    use crate::errors::{ApplicationError, DomainError};
    use crate::flows::states::FlowStep;
    use crate::resilience::{
        InMemorySnapshotStore, SessionSnapshot, SnapshotStore, SESSION_SNAPSHOT_KEY,
    };
    use crate::store::{
        test_catalog, InMemoryCatalog, InMemoryRecordStore, InMemoryWebhookDispatcher, RecordStore,
    };

    use super::{
        exclusivity_until, follow_up_due, normalize_sale_items, FinalizationEngine,
        NonPurchaseInput, SaleInput,
    };

    fn operator() -> OperatorProfile {
        OperatorProfile {
            id: OperatorId("op-1".to_owned()),
            org_id: OrgId("org-demo".to_owned()),
            name: "Carla".to_owned(),
            default_commission_pct: Decimal::new(1_200, 2),
        }
    }

    fn session() -> AttendanceSession {
        let mut session = AttendanceSession::open(
            OrgId("org-demo".to_owned()),
            OperatorId("op-1".to_owned()),
            Utc::now(),
        );
        session.phone_searched = "+5511999990000".to_owned();
        session.current_step = FlowStep::SaleOrReason;
        session
    }

    fn bundle_item(total_cents: i64, quantity: u32, commission_pct: Decimal) -> OfferItem {
        OfferItem {
            product_id: ProductId("PROD-OIL".to_owned()),
            category: Category::ReadyProduct,
            kit_id: Some(KitId("KIT-A".to_owned())),
            price_type: PriceType::Tier(PriceTier::Promotional),
            quantity,
            unit_price_cents: total_cents,
            commission_pct,
            commission_cents: 0,
            answers: AnswerBag::new(),
        }
    }

    fn sale_input(items: Vec<OfferItem>, discount_cents: i64) -> SaleInput {
        let subtotal: i64 = items.iter().map(OfferItem::line_total_cents).sum();
        SaleInput {
            operator: operator(),
            session: session(),
            lead_id: None,
            lead: LeadDraft {
                name: "Maria Souza".to_owned(),
                phone: "+5511999990000".to_owned(),
                ..LeadDraft::default()
            },
            source: Some(SourceId("instagram".to_owned())),
            items,
            subtotal_cents: subtotal,
            discount_cents,
            shipping_cents: 0,
            total_cents: subtotal - discount_cents,
            delivery: DeliveryConfig::default(),
            payment: PaymentConfig {
                method: Some(PaymentMethod::Pix),
                split: vec![
                    PaymentLine { method: PaymentMethod::Pix, amount_cents: 60_000 },
                    PaymentLine { method: PaymentMethod::Cash, amount_cents: 53_400 },
                ],
            },
        }
    }

    fn reason(followup_hours: Option<i64>, webhook: Option<&str>) -> NonPurchaseReason {
        NonPurchaseReason {
            id: ReasonId("REASON-PRICE".to_owned()),
            org_id: OrgId("org-demo".to_owned()),
            label: "Price objection".to_owned(),
            followup_hours,
            exclusivity_hours: Some(48),
            webhook_url: webhook.map(|value| value.to_owned()),
        }
    }

    fn seeded_snapshot(store: &InMemorySnapshotStore) {
        let snapshot = SessionSnapshot {
            step: FlowStep::Payment,
            visited: vec![FlowStep::Phone],
            phone_searched: "+5511999990000".to_owned(),
            lead_id: None,
            lead_existed: false,
            lead: LeadDraft::default(),
            source: None,
            conversation_mode: None,
            attendance_id: None,
            started_at: Utc::now(),
            in_progress: None,
            items: Vec::new(),
            discount: None,
            shipping_cents: 0,
            delivery: DeliveryConfig::default(),
            payment: PaymentConfig::default(),
            rejected_kits: Default::default(),
        };
        store.save(SESSION_SNAPSHOT_KEY, &snapshot).expect("seed snapshot");
    }

    #[test]
    fn discount_forces_every_commission_to_the_seller_default() {
        let items = vec![
            bundle_item(113_400, 6, Decimal::new(800, 2)),
            bundle_item(90_000, 3, Decimal::new(500, 2)),
        ];

        let normalized = normalize_sale_items(&items, 1, Decimal::new(1_200, 2));
        for item in &normalized {
            assert_eq!(item.commission_pct, Decimal::new(1_200, 2));
        }

        let untouched = normalize_sale_items(&items, 0, Decimal::new(1_200, 2));
        assert_eq!(untouched[0].commission_pct, Decimal::new(800, 2));
        assert_eq!(untouched[1].commission_pct, Decimal::new(500, 2));
    }

    #[test]
    fn even_bundle_total_converts_without_loss() {
        let normalized =
            normalize_sale_items(&[bundle_item(113_400, 6, Decimal::new(1_000, 2))], 0, Decimal::ZERO);
        assert_eq!(normalized[0].unit_price_cents, 18_900);
        assert_eq!(normalized[0].unit_price_cents * 6, 113_400);
    }

    #[test]
    fn uneven_bundle_total_reproduces_the_one_cent_loss() {
        let normalized =
            normalize_sale_items(&[bundle_item(100_000, 3, Decimal::new(1_000, 2))], 0, Decimal::ZERO);
        assert_eq!(normalized[0].unit_price_cents, 33_333);
        assert_eq!(normalized[0].unit_price_cents * 3, 99_999);
    }

    #[test]
    fn follow_up_defaults_to_now_plus_delay_and_explicit_wins() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).single().expect("timestamp");
        let reason_with_followup = reason(Some(24), None);

        assert_eq!(follow_up_due(&reason_with_followup, None, now), Some(now + Duration::hours(24)));

        let explicit = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).single().expect("timestamp");
        assert_eq!(follow_up_due(&reason_with_followup, Some(explicit), now), Some(explicit));

        assert_eq!(follow_up_due(&reason(None, None), None, now), None);
        assert_eq!(exclusivity_until(&reason_with_followup, now), Some(now + Duration::hours(48)));
    }

    #[tokio::test]
    async fn sale_creates_lead_routes_answers_and_completes_attendance() {
        let store = InMemoryRecordStore::new();
        let catalog = test_catalog();
        let webhooks = InMemoryWebhookDispatcher::default();
        let snapshots = InMemorySnapshotStore::new();
        seeded_snapshot(&snapshots);
        let engine = FinalizationEngine::new(&store, &catalog, &webhooks);

        let mut item = bundle_item(113_400, 6, Decimal::new(1_000, 2));
        item.answers.insert(
            QuestionId("best-call-time".to_owned()),
            AnswerValue::Text("afternoon".to_owned()),
        );
        item.answers.insert(
            QuestionId("dosage".to_owned()),
            AnswerValue::Text("two capsules".to_owned()),
        );

        let outcome =
            engine.commit_sale(sale_input(vec![item], 0), &snapshots).await.expect("sale commits");

        let leads = store.leads();
        assert_eq!(leads.len(), 1);
        assert_eq!(outcome.lead_id, leads[0].id);

        let sales = store.sales();
        assert_eq!(sales.len(), 1);
        let (sale_id, draft) = &sales[0];
        assert_eq!(sale_id, &outcome.sale_id);
        assert_eq!(draft.items[0].unit_price_cents, 18_900);
        assert_eq!(draft.payment.split.len(), 2);
        // Product-scoped answers ride on the sale item; the standard one
        // lands in the lead store.
        assert!(draft.items[0].answers.contains_key(&QuestionId("dosage".to_owned())));
        assert!(!draft.items[0].answers.contains_key(&QuestionId("best-call-time".to_owned())));
        assert_eq!(store.standard_answers().len(), 1);

        assert_eq!(store.source_history().len(), 1);

        let attendances = store.attendances();
        assert_eq!(attendances.len(), 1);
        assert!(attendances[0].completed);
        assert_eq!(attendances[0].sale_id, Some(outcome.sale_id.clone()));

        assert!(snapshots.load(SESSION_SNAPSHOT_KEY).expect("load").is_none());
    }

    #[tokio::test]
    async fn existing_lead_is_updated_not_duplicated() {
        let store = InMemoryRecordStore::new();
        let catalog = test_catalog();
        let webhooks = InMemoryWebhookDispatcher::default();
        let snapshots = InMemorySnapshotStore::new();
        let engine = FinalizationEngine::new(&store, &catalog, &webhooks);

        let existing = store
            .create_lead(
                &OrgId("org-demo".to_owned()),
                LeadDraft { name: "Maria".to_owned(), ..LeadDraft::default() },
            )
            .await
            .expect("seed lead");

        let mut input = sale_input(vec![bundle_item(113_400, 6, Decimal::new(1_000, 2))], 0);
        input.lead_id = Some(existing.id.clone());
        input.lead.name = "Maria Souza".to_owned();

        engine.commit_sale(input, &snapshots).await.expect("sale commits");

        let leads = store.leads();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].name, "Maria Souza");
    }

    #[tokio::test]
    async fn failed_sale_write_keeps_the_lead_and_the_snapshot() {
        let store = InMemoryRecordStore::new();
        let catalog = test_catalog();
        let webhooks = InMemoryWebhookDispatcher::default();
        let snapshots = InMemorySnapshotStore::new();
        seeded_snapshot(&snapshots);
        store.fail_sale_writes(true);
        let engine = FinalizationEngine::new(&store, &catalog, &webhooks);

        let error = engine
            .commit_sale(sale_input(vec![bundle_item(113_400, 6, Decimal::new(1_000, 2))], 0), &snapshots)
            .await
            .expect_err("sale write fails");

        assert!(matches!(error, ApplicationError::Persistence(_)));
        // No compensation: the lead created before the failing write stays.
        assert_eq!(store.leads().len(), 1);
        assert!(store.sales().is_empty());
        assert!(snapshots.load(SESSION_SNAPSHOT_KEY).expect("load").is_some());
    }

    #[tokio::test]
    async fn empty_offer_is_a_validation_error() {
        let store = InMemoryRecordStore::new();
        let catalog = test_catalog();
        let webhooks = InMemoryWebhookDispatcher::default();
        let snapshots = InMemorySnapshotStore::new();
        let engine = FinalizationEngine::new(&store, &catalog, &webhooks);

        let error = engine
            .commit_sale(sale_input(Vec::new(), 0), &snapshots)
            .await
            .expect_err("empty offer refused");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Validation { field: "offer", .. })
        ));
    }

    #[tokio::test]
    async fn non_purchase_requires_positive_potential() {
        let store = InMemoryRecordStore::new();
        let catalog = test_catalog();
        let webhooks = InMemoryWebhookDispatcher::default();
        let snapshots = InMemorySnapshotStore::new();
        let engine = FinalizationEngine::new(&store, &catalog, &webhooks);

        let input = NonPurchaseInput {
            operator: operator(),
            session: session(),
            lead_id: None,
            lead: LeadDraft { name: "Maria".to_owned(), ..LeadDraft::default() },
            reason_id: ReasonId("REASON-PRICE".to_owned()),
            potential_cents: 0,
            explicit_follow_up: None,
        };

        let error = engine.classify_non_purchase(input, &snapshots).await.expect_err("refused");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Validation { field: "purchase_potential", .. })
        ));
    }

    #[tokio::test]
    async fn non_purchase_accumulates_potential_schedules_follow_up_and_fires_webhook() {
        let store = InMemoryRecordStore::new();
        let catalog = InMemoryCatalog::new()
            .with_reason(reason(Some(24), Some("https://hooks.example/non-purchase")));
        let webhooks = InMemoryWebhookDispatcher::default();
        let snapshots = InMemorySnapshotStore::new();
        seeded_snapshot(&snapshots);
        let engine = FinalizationEngine::new(&store, &catalog, &webhooks);

        let input = NonPurchaseInput {
            operator: operator(),
            session: session(),
            lead_id: None,
            lead: LeadDraft {
                name: "Maria".to_owned(),
                phone: "+5511999990000".to_owned(),
                ..LeadDraft::default()
            },
            reason_id: ReasonId("REASON-PRICE".to_owned()),
            potential_cents: 75_000,
            explicit_follow_up: None,
        };

        let outcome =
            engine.classify_non_purchase(input, &snapshots).await.expect("classified");

        assert_eq!(store.leads()[0].negotiated_value_cents, 75_000);

        let follow_ups = store.follow_ups();
        assert_eq!(follow_ups.len(), 1);
        assert_eq!(Some(follow_ups[0].due_at), outcome.follow_up_due);
        assert!(follow_ups[0].exclusive_until.is_some());

        let sent = webhooks.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://hooks.example/non-purchase");
        assert_eq!(sent[0].1["potential_cents"], 75_000);

        let attendances = store.attendances();
        assert_eq!(attendances.len(), 1);
        assert!(attendances[0].completed);
        assert_eq!(attendances[0].reason_id, Some(ReasonId("REASON-PRICE".to_owned())));
        assert_eq!(attendances[0].potential_cents, Some(75_000));
        assert!(attendances[0].sale_id.is_none());

        assert!(snapshots.load(SESSION_SNAPSHOT_KEY).expect("load").is_none());
    }

    #[tokio::test]
    async fn webhook_failure_never_blocks_the_classification() {
        let store = InMemoryRecordStore::new();
        let catalog = InMemoryCatalog::new()
            .with_reason(reason(None, Some("https://hooks.example/non-purchase")));
        let webhooks = InMemoryWebhookDispatcher::default();
        webhooks.fail_dispatches(true);
        let snapshots = InMemorySnapshotStore::new();
        let engine = FinalizationEngine::new(&store, &catalog, &webhooks);

        let input = NonPurchaseInput {
            operator: operator(),
            session: session(),
            lead_id: None,
            lead: LeadDraft { name: "Maria".to_owned(), ..LeadDraft::default() },
            reason_id: ReasonId("REASON-PRICE".to_owned()),
            potential_cents: 10_000,
            explicit_follow_up: None,
        };

        let outcome =
            engine.classify_non_purchase(input, &snapshots).await.expect("still classified");
        assert_eq!(outcome.follow_up_due, None);
        assert!(store.follow_ups().is_empty());
        assert!(store.attendances()[0].completed);
    }
}
