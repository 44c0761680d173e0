//! Contracts for the external collaborators the engine drives: the record
//! store, the read-only pricing catalog, and webhook dispatch. The in-memory
//! implementations cover the critical path in tests and demos; `attendy-db`
//! provides the SQLite-backed record store.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::answers::{AnswerValue, QuestionId};
use crate::domain::attendance::{AttendanceId, AttendanceSession};
use crate::domain::lead::{LeadDraft, LeadId, LeadProfile, SourceId};
use crate::domain::operator::OrgId;
use crate::domain::outcome::{FollowUp, NonPurchaseReason, ReasonId, SaleDraft, SaleId};
use crate::domain::product::{KitId, KitRejection, PriceKit, Product, ProductId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("record store failure: {0}")]
pub struct StoreError(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("dispatch failure: {0}")]
pub struct DispatchError(pub String);

/// Persistent storage contract. Writes are fire-and-forget relative to the
/// operator; a failed write surfaces as a retryable error with no automatic
/// rollback of earlier writes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_lead_by_phone(
        &self,
        org_id: &OrgId,
        phone: &str,
    ) -> Result<Option<LeadProfile>, StoreError>;

    async fn create_lead(&self, org_id: &OrgId, draft: LeadDraft)
        -> Result<LeadProfile, StoreError>;

    async fn update_lead(&self, id: &LeadId, draft: LeadDraft) -> Result<(), StoreError>;

    /// Adds a non-purchase potential amount into the lead's running
    /// negotiated-value total.
    async fn accumulate_lead_potential(
        &self,
        id: &LeadId,
        amount_cents: i64,
    ) -> Result<(), StoreError>;

    async fn create_attendance(
        &self,
        session: &AttendanceSession,
    ) -> Result<AttendanceId, StoreError>;

    async fn update_attendance(
        &self,
        id: &AttendanceId,
        session: &AttendanceSession,
    ) -> Result<(), StoreError>;

    async fn create_sale(&self, draft: SaleDraft) -> Result<SaleId, StoreError>;

    async fn create_follow_up(&self, follow_up: FollowUp) -> Result<(), StoreError>;

    async fn record_kit_rejection(&self, rejection: KitRejection) -> Result<(), StoreError>;

    /// Rejections outlive the session: the set returned here covers every
    /// prior attendance for the lead+product pair.
    async fn rejected_kit_ids(
        &self,
        lead_id: &LeadId,
        product_id: &ProductId,
    ) -> Result<HashSet<KitId>, StoreError>;

    async fn record_source_history(
        &self,
        lead_id: &LeadId,
        source: &SourceId,
    ) -> Result<(), StoreError>;

    async fn record_standard_answers(
        &self,
        lead_id: &LeadId,
        answers: &[(QuestionId, AnswerValue)],
    ) -> Result<(), StoreError>;
}

/// Read-only product/kit/reason lookups.
pub trait PricingCatalog: Send + Sync {
    fn product(&self, id: &ProductId) -> Option<Product>;
    /// Kits in ascending position order.
    fn kits_for_product(&self, id: &ProductId) -> Vec<PriceKit>;
    fn reason(&self, id: &ReasonId) -> Option<NonPurchaseReason>;
}

#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(&self, url: &str, payload: &serde_json::Value)
        -> Result<(), DispatchError>;
}

#[derive(Default)]
struct RecordStoreState {
    leads: Vec<LeadProfile>,
    attendances: Vec<AttendanceSession>,
    sales: Vec<(SaleId, SaleDraft)>,
    follow_ups: Vec<FollowUp>,
    rejections: Vec<KitRejection>,
    source_history: Vec<(LeadId, SourceId)>,
    standard_answers: Vec<(LeadId, QuestionId, AnswerValue)>,
    counter: u64,
    fail_sale_writes: bool,
}

/// Deterministic in-memory record store for the critical path.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<RecordStoreState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordStoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes subsequent `create_sale` calls fail, to exercise the
    /// no-rollback write-failure path.
    pub fn fail_sale_writes(&self, fail: bool) {
        self.lock().fail_sale_writes = fail;
    }

    pub fn leads(&self) -> Vec<LeadProfile> {
        self.lock().leads.clone()
    }

    pub fn attendances(&self) -> Vec<AttendanceSession> {
        self.lock().attendances.clone()
    }

    pub fn sales(&self) -> Vec<(SaleId, SaleDraft)> {
        self.lock().sales.clone()
    }

    pub fn follow_ups(&self) -> Vec<FollowUp> {
        self.lock().follow_ups.clone()
    }

    pub fn rejections(&self) -> Vec<KitRejection> {
        self.lock().rejections.clone()
    }

    pub fn source_history(&self) -> Vec<(LeadId, SourceId)> {
        self.lock().source_history.clone()
    }

    pub fn standard_answers(&self) -> Vec<(LeadId, QuestionId, AnswerValue)> {
        self.lock().standard_answers.clone()
    }

    pub fn seed_lead(&self, lead: LeadProfile) {
        self.lock().leads.push(lead);
    }

    fn next_id(state: &mut RecordStoreState, prefix: &str) -> String {
        state.counter += 1;
        format!("{prefix}-{:04}", state.counter)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_lead_by_phone(
        &self,
        org_id: &OrgId,
        phone: &str,
    ) -> Result<Option<LeadProfile>, StoreError> {
        let state = self.lock();
        Ok(state
            .leads
            .iter()
            .find(|lead| lead.org_id == *org_id && lead.phone == phone)
            .cloned())
    }

    async fn create_lead(
        &self,
        org_id: &OrgId,
        draft: LeadDraft,
    ) -> Result<LeadProfile, StoreError> {
        let mut state = self.lock();
        let id = LeadId(Self::next_id(&mut state, "LEAD"));
        let lead = LeadProfile {
            id: id.clone(),
            org_id: org_id.clone(),
            owner_operator_id: None,
            name: draft.name,
            phone: draft.phone,
            email: draft.email,
            address: draft.address,
            funnel_stage: draft.funnel_stage,
            star_rating: draft.star_rating,
            negotiated_value_cents: 0,
            created_at: chrono::Utc::now(),
        };
        state.leads.push(lead.clone());
        Ok(lead)
    }

    async fn update_lead(&self, id: &LeadId, draft: LeadDraft) -> Result<(), StoreError> {
        let mut state = self.lock();
        let lead = state
            .leads
            .iter_mut()
            .find(|lead| lead.id == *id)
            .ok_or_else(|| StoreError(format!("unknown lead `{}`", id.0)))?;
        lead.name = draft.name;
        lead.phone = draft.phone;
        lead.email = draft.email;
        lead.address = draft.address;
        lead.funnel_stage = draft.funnel_stage;
        lead.star_rating = draft.star_rating;
        Ok(())
    }

    async fn accumulate_lead_potential(
        &self,
        id: &LeadId,
        amount_cents: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let lead = state
            .leads
            .iter_mut()
            .find(|lead| lead.id == *id)
            .ok_or_else(|| StoreError(format!("unknown lead `{}`", id.0)))?;
        lead.negotiated_value_cents += amount_cents;
        Ok(())
    }

    async fn create_attendance(
        &self,
        session: &AttendanceSession,
    ) -> Result<AttendanceId, StoreError> {
        let mut state = self.lock();
        let id = AttendanceId(Self::next_id(&mut state, "ATT"));
        let mut stored = session.clone();
        stored.id = Some(id.clone());
        state.attendances.push(stored);
        Ok(id)
    }

    async fn update_attendance(
        &self,
        id: &AttendanceId,
        session: &AttendanceSession,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let stored = state
            .attendances
            .iter_mut()
            .find(|attendance| attendance.id.as_ref() == Some(id))
            .ok_or_else(|| StoreError(format!("unknown attendance `{}`", id.0)))?;
        *stored = session.clone();
        stored.id = Some(id.clone());
        Ok(())
    }

    async fn create_sale(&self, draft: SaleDraft) -> Result<SaleId, StoreError> {
        let mut state = self.lock();
        if state.fail_sale_writes {
            return Err(StoreError("sale write rejected".to_owned()));
        }
        let id = SaleId(Self::next_id(&mut state, "SALE"));
        state.sales.push((id.clone(), draft));
        Ok(id)
    }

    async fn create_follow_up(&self, follow_up: FollowUp) -> Result<(), StoreError> {
        self.lock().follow_ups.push(follow_up);
        Ok(())
    }

    async fn record_kit_rejection(&self, rejection: KitRejection) -> Result<(), StoreError> {
        self.lock().rejections.push(rejection);
        Ok(())
    }

    async fn rejected_kit_ids(
        &self,
        lead_id: &LeadId,
        product_id: &ProductId,
    ) -> Result<HashSet<KitId>, StoreError> {
        let state = self.lock();
        Ok(state
            .rejections
            .iter()
            .filter(|rejection| {
                rejection.lead_id == *lead_id && rejection.product_id == *product_id
            })
            .map(|rejection| rejection.kit_id.clone())
            .collect())
    }

    async fn record_source_history(
        &self,
        lead_id: &LeadId,
        source: &SourceId,
    ) -> Result<(), StoreError> {
        self.lock().source_history.push((lead_id.clone(), source.clone()));
        Ok(())
    }

    async fn record_standard_answers(
        &self,
        lead_id: &LeadId,
        answers: &[(QuestionId, AnswerValue)],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        for (question, value) in answers {
            state.standard_answers.push((lead_id.clone(), question.clone(), value.clone()));
        }
        Ok(())
    }
}

/// Catalog backed by plain maps; `attendy-db` materializes one from SQLite.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    products: BTreeMap<ProductId, Product>,
    kits: BTreeMap<ProductId, Vec<PriceKit>>,
    reasons: BTreeMap<String, NonPurchaseReason>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product: Product, mut kits: Vec<PriceKit>) -> Self {
        kits.sort_by_key(|kit| kit.position);
        self.kits.insert(product.id.clone(), kits);
        self.products.insert(product.id.clone(), product);
        self
    }

    pub fn with_reason(mut self, reason: NonPurchaseReason) -> Self {
        self.reasons.insert(reason.id.0.clone(), reason);
        self
    }
}

impl PricingCatalog for InMemoryCatalog {
    fn product(&self, id: &ProductId) -> Option<Product> {
        self.products.get(id).cloned()
    }

    fn kits_for_product(&self, id: &ProductId) -> Vec<PriceKit> {
        self.kits.get(id).cloned().unwrap_or_default()
    }

    fn reason(&self, id: &ReasonId) -> Option<NonPurchaseReason> {
        self.reasons.get(&id.0).cloned()
    }
}

/// Records dispatched payloads instead of performing network writes.
#[derive(Clone, Default)]
pub struct InMemoryWebhookDispatcher {
    sent: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    fail: Arc<Mutex<bool>>,
}

impl InMemoryWebhookDispatcher {
    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn fail_dispatches(&self, fail: bool) {
        match self.fail.lock() {
            Ok(mut flag) => *flag = fail,
            Err(poisoned) => *poisoned.into_inner() = fail,
        }
    }
}

#[async_trait]
impl WebhookDispatcher for InMemoryWebhookDispatcher {
    async fn dispatch(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let failing = match self.fail.lock() {
            Ok(flag) => *flag,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if failing {
            return Err(DispatchError("dispatch refused".to_owned()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push((url.to_owned(), payload.clone())),
            Err(poisoned) => poisoned.into_inner().push((url.to_owned(), payload.clone())),
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_catalog() -> InMemoryCatalog {
    use rust_decimal::Decimal;

    use crate::answers::{QuestionDef, QuestionId, QuestionScope};
    use crate::domain::operator::OrgId;
    use crate::domain::product::{Category, TierCommission, TierPrice};

    let org = OrgId("org-demo".to_owned());
    let product = |id: &str, category: Category, active: bool, cross: [Option<&str>; 2]| Product {
        id: ProductId(id.to_owned()),
        org_id: org.clone(),
        name: id.to_owned(),
        category,
        active,
        cross_sell_1: cross[0].map(|value| ProductId(value.to_owned())),
        cross_sell_2: cross[1].map(|value| ProductId(value.to_owned())),
        questions: Vec::new(),
    };

    let mut oil = product(
        "PROD-OIL",
        Category::ReadyProduct,
        true,
        [Some("PROD-TEA"), Some("PROD-RETIRED")],
    );
    oil.questions = vec![
        QuestionDef {
            id: QuestionId("best-call-time".to_owned()),
            label: "Best time to call".to_owned(),
            scope: QuestionScope::Standard,
        },
        QuestionDef {
            id: QuestionId("dosage".to_owned()),
            label: "Daily dosage".to_owned(),
            scope: QuestionScope::ProductSpecific,
        },
    ];

    let oil_kit = |id: &str, position: u32, bundle_quantity: u32| PriceKit {
        id: KitId(id.to_owned()),
        product_id: ProductId("PROD-OIL".to_owned()),
        position,
        bundle_quantity,
        default_commission_pct: Decimal::new(1_000, 2),
        regular: TierPrice { price_cents: 120_000, commission: TierCommission::KitDefault },
        promotional: Some(TierPrice {
            price_cents: 113_400,
            commission: TierCommission::KitDefault,
        }),
        promotional2: Some(TierPrice {
            price_cents: 98_000,
            commission: TierCommission::Custom(Decimal::new(800, 2)),
        }),
        minimum: Some(TierPrice {
            price_cents: 90_000,
            commission: TierCommission::Custom(Decimal::new(500, 2)),
        }),
    };

    InMemoryCatalog::new()
        .with_product(oil, vec![oil_kit("KIT-A", 1, 6), oil_kit("KIT-B", 2, 12)])
        .with_product(
            product("PROD-TEA", Category::ReadyProduct, true, [Some("PROD-CAPS"), None]),
            Vec::new(),
        )
        .with_product(product("PROD-CAPS", Category::ReadyProduct, true, [None, None]), Vec::new())
        .with_product(
            product("PROD-RETIRED", Category::ReadyProduct, false, [None, None]),
            Vec::new(),
        )
        .with_product(product("PROD-CUSTOM", Category::Compounded, true, [None, None]), Vec::new())
}

#[cfg(test)]
mod tests {
    use crate::domain::lead::{LeadDraft, LeadId, SourceId};
    use crate::domain::operator::OrgId;
    use crate::domain::product::{KitId, KitRejection, ProductId};

    use super::{InMemoryRecordStore, PricingCatalog, RecordStore};

    #[tokio::test]
    async fn lead_lookup_is_scoped_to_the_org() {
        let store = InMemoryRecordStore::new();
        let org = OrgId("org-1".to_owned());
        let other_org = OrgId("org-2".to_owned());

        let draft = LeadDraft {
            name: "Ana".to_owned(),
            phone: "+5511988887777".to_owned(),
            ..LeadDraft::default()
        };
        store.create_lead(&org, draft).await.expect("create lead");

        let found =
            store.find_lead_by_phone(&org, "+5511988887777").await.expect("lookup");
        assert!(found.is_some());
        let cross_org =
            store.find_lead_by_phone(&other_org, "+5511988887777").await.expect("lookup");
        assert!(cross_org.is_none());
    }

    #[tokio::test]
    async fn rejections_accumulate_per_lead_and_product() {
        let store = InMemoryRecordStore::new();
        let lead = LeadId("LEAD-1".to_owned());
        let product = ProductId("PROD-OIL".to_owned());

        store
            .record_kit_rejection(KitRejection {
                lead_id: lead.clone(),
                product_id: product.clone(),
                kit_id: KitId("KIT-A".to_owned()),
                price_cents: 113_400,
                reason: "too expensive".to_owned(),
                rejected_at: chrono::Utc::now(),
            })
            .await
            .expect("record");

        let rejected = store.rejected_kit_ids(&lead, &product).await.expect("fetch");
        assert!(rejected.contains(&KitId("KIT-A".to_owned())));

        let other = store
            .rejected_kit_ids(&lead, &ProductId("PROD-TEA".to_owned()))
            .await
            .expect("fetch");
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn potential_accumulates_into_the_running_total() {
        let store = InMemoryRecordStore::new();
        let org = OrgId("org-1".to_owned());
        let lead = store
            .create_lead(&org, LeadDraft { name: "Ana".to_owned(), ..LeadDraft::default() })
            .await
            .expect("create");

        store.accumulate_lead_potential(&lead.id, 50_000).await.expect("first");
        store.accumulate_lead_potential(&lead.id, 25_000).await.expect("second");

        assert_eq!(store.leads()[0].negotiated_value_cents, 75_000);
    }

    #[tokio::test]
    async fn source_history_is_append_only() {
        let store = InMemoryRecordStore::new();
        let lead = LeadId("LEAD-1".to_owned());
        store
            .record_source_history(&lead, &SourceId("instagram".to_owned()))
            .await
            .expect("record");
        store
            .record_source_history(&lead, &SourceId("referral".to_owned()))
            .await
            .expect("record");

        assert_eq!(store.source_history().len(), 2);
    }

    #[test]
    fn test_catalog_filters_unknown_products() {
        let catalog = super::test_catalog();
        assert!(catalog.product(&ProductId("PROD-OIL".to_owned())).is_some());
        assert!(catalog.product(&ProductId("PROD-NOPE".to_owned())).is_none());
        assert_eq!(catalog.kits_for_product(&ProductId("PROD-OIL".to_owned())).len(), 2);
    }
}
