//! The attendance runtime: one operator walking one caller from phone lookup
//! to a terminal outcome. Orchestrates the flow engine, the pricing resolver,
//! the offer accumulator, and the resilience layer over the collaborator
//! traits, then hands off to the finalization engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::domain::attendance::{AttendanceId, AttendanceSession, ConversationMode};
use crate::domain::lead::{LeadDraft, LeadId, LeadProfile, SourceId};
use crate::domain::offer::{
    DeliveryKind, Discount, ItemDraft, NegotiatedOverride, OfferItem, PaymentConfig,
    PaymentMethod, RegionId,
};
use crate::domain::operator::OperatorProfile;
use crate::domain::outcome::ReasonId;
use crate::domain::product::{KitId, PriceTier, ProductId};
use crate::errors::{ApplicationError, DomainError};
use crate::finalize::{
    FinalizationEngine, NonPurchaseInput, NonPurchaseOutcome, SaleInput, SaleOutcome,
};
use crate::flows::{
    FlowAction, FlowContext, FlowEngine, FlowEvent, FlowStep, ReceptiveFlow, TransitionOutcome,
};
use crate::money::pct_of_cents;
use crate::offer::OfferAccumulator;
use crate::pricing::{self, Quotation, QuotationInput};
use crate::resilience::{
    snapshot_eligible, AbandonmentNotice, SessionSnapshot, SnapshotStore, TerminationWatch,
    SESSION_SNAPSHOT_KEY,
};
use crate::store::{PricingCatalog, RecordStore, WebhookDispatcher};

/// What a phone search resolved to. An ownership conflict replaces the
/// advance with the transfer sub-flow; the operator either takes the lead
/// over or abandons the attendance.
#[derive(Clone, Debug, PartialEq)]
pub enum PhoneSearchOutcome {
    LeadFound { lead_id: LeadId },
    OwnershipConflict { lead_id: LeadId },
    NoMatch,
}

pub struct AttendanceRuntime<'a, S, C, W> {
    store: &'a S,
    catalog: &'a C,
    webhooks: &'a W,
    snapshots: &'a dyn SnapshotStore,
    engine: FlowEngine<ReceptiveFlow>,
    watch: TerminationWatch,
    operator: OperatorProfile,

    step: FlowStep,
    visited: Vec<FlowStep>,
    phone_searched: String,
    lead_id: Option<LeadId>,
    lead_existed: bool,
    lead: LeadDraft,
    source: Option<SourceId>,
    conversation_mode: Option<ConversationMode>,
    attendance_id: Option<AttendanceId>,
    started_at: DateTime<Utc>,
    offer: OfferAccumulator,
    delivery: crate::domain::offer::DeliveryConfig,
    payment: PaymentConfig,
    rejected_kits: BTreeMap<ProductId, BTreeSet<KitId>>,
    pending_rejections: Vec<PendingRejection>,
    pending_transfer: Option<LeadProfile>,
}

/// A rejection captured before the lead has an id. Flushed into the
/// append-only record once finalization resolves the lead.
struct PendingRejection {
    product_id: ProductId,
    kit_id: KitId,
    price_cents: i64,
    reason: String,
    rejected_at: DateTime<Utc>,
}

impl<'a, S, C, W> AttendanceRuntime<'a, S, C, W>
where
    S: RecordStore,
    C: PricingCatalog,
    W: WebhookDispatcher,
{
    /// Fresh runtime at the phone step. Prefer [`Self::resume`], which seeds
    /// from a prior snapshot when one survived a reload.
    pub fn start(
        store: &'a S,
        catalog: &'a C,
        webhooks: &'a W,
        snapshots: &'a dyn SnapshotStore,
        operator: OperatorProfile,
    ) -> Self {
        let engine = FlowEngine::default();
        let step = engine.initial_step();
        Self {
            store,
            catalog,
            webhooks,
            snapshots,
            engine,
            watch: TerminationWatch::new(),
            operator,
            step,
            visited: vec![step],
            phone_searched: String::new(),
            lead_id: None,
            lead_existed: false,
            lead: LeadDraft::default(),
            source: None,
            conversation_mode: None,
            attendance_id: None,
            started_at: Utc::now(),
            offer: OfferAccumulator::new(),
            delivery: crate::domain::offer::DeliveryConfig::default(),
            payment: PaymentConfig::default(),
            rejected_kits: BTreeMap::new(),
            pending_rejections: Vec::new(),
            pending_transfer: None,
        }
    }

    /// Seeds the runtime from the local snapshot when one exists, replacing
    /// the default empty state. A corrupt or missing snapshot falls back to
    /// [`Self::start`] silently.
    pub fn resume(
        store: &'a S,
        catalog: &'a C,
        webhooks: &'a W,
        snapshots: &'a dyn SnapshotStore,
        operator: OperatorProfile,
    ) -> Self {
        let prior = match snapshots.load(SESSION_SNAPSHOT_KEY) {
            Ok(prior) => prior,
            Err(error) => {
                debug!(%error, "session snapshot unreadable; starting fresh");
                None
            }
        };

        let mut runtime = Self::start(store, catalog, webhooks, snapshots, operator);
        if let Some(snapshot) = prior {
            runtime.step = snapshot.step;
            runtime.visited = snapshot.visited;
            runtime.phone_searched = snapshot.phone_searched;
            runtime.lead_id = snapshot.lead_id;
            runtime.lead_existed = snapshot.lead_existed;
            runtime.lead = snapshot.lead;
            runtime.source = snapshot.source;
            runtime.conversation_mode = snapshot.conversation_mode;
            runtime.attendance_id = snapshot.attendance_id;
            runtime.started_at = snapshot.started_at;
            runtime.offer = OfferAccumulator::restore(
                snapshot.items,
                snapshot.in_progress,
                snapshot.discount,
                snapshot.shipping_cents,
            );
            runtime.delivery = snapshot.delivery;
            runtime.payment = snapshot.payment;
            runtime.rejected_kits = snapshot.rejected_kits;
            runtime.update_watch();
        }
        runtime
    }

    pub fn current_step(&self) -> FlowStep {
        self.step
    }

    pub fn offer(&self) -> &OfferAccumulator {
        &self.offer
    }

    pub fn lead_id(&self) -> Option<&LeadId> {
        self.lead_id.as_ref()
    }

    pub fn attendance_id(&self) -> Option<&AttendanceId> {
        self.attendance_id.as_ref()
    }

    /// The cell the termination hook reads. Registered once by the host;
    /// every state change here refreshes it.
    pub fn termination_watch(&self) -> TerminationWatch {
        self.watch.clone()
    }

    // ---- phone step -----------------------------------------------------

    /// Looks the caller up by phone. A hit owned by another operator starts
    /// the transfer sub-flow instead of advancing.
    pub async fn search_phone(
        &mut self,
        phone: &str,
    ) -> Result<PhoneSearchOutcome, ApplicationError> {
        let phone = phone.trim();
        if !phone_looks_valid(phone) {
            return Err(DomainError::Validation {
                field: "phone",
                message: "a valid phone number is required".to_owned(),
            }
            .into());
        }
        self.phone_searched = phone.to_owned();

        let found = self.store.find_lead_by_phone(&self.operator.org_id, phone).await?;
        match found {
            Some(profile) if profile.owned_by_other(&self.operator.id) => {
                let lead_id = profile.id.clone();
                self.pending_transfer = Some(profile);
                self.apply(FlowEvent::LeadResolved).await?;
                Ok(PhoneSearchOutcome::OwnershipConflict { lead_id })
            }
            Some(profile) => {
                let lead_id = profile.id.clone();
                self.lead = profile.draft();
                self.lead_id = Some(profile.id);
                self.lead_existed = true;
                self.apply(FlowEvent::LeadResolved).await?;
                Ok(PhoneSearchOutcome::LeadFound { lead_id })
            }
            None => {
                self.lead.phone = phone.to_owned();
                self.apply(FlowEvent::LeadMissing).await?;
                Ok(PhoneSearchOutcome::NoMatch)
            }
        }
    }

    /// A name-search hit the operator picked instead of a phone match.
    pub async fn select_name_search_result(
        &mut self,
        profile: LeadProfile,
    ) -> Result<PhoneSearchOutcome, ApplicationError> {
        if profile.owned_by_other(&self.operator.id) {
            let lead_id = profile.id.clone();
            self.pending_transfer = Some(profile);
            self.apply(FlowEvent::LeadResolved).await?;
            return Ok(PhoneSearchOutcome::OwnershipConflict { lead_id });
        }
        let lead_id = profile.id.clone();
        self.lead = profile.draft();
        self.lead_id = Some(profile.id);
        self.lead_existed = true;
        self.apply(FlowEvent::LeadResolved).await?;
        Ok(PhoneSearchOutcome::LeadFound { lead_id })
    }

    /// From the lead-info detour: names the new caller and moves on. The
    /// lead record itself is only written at finalization.
    pub async fn register_new_lead(&mut self, draft: LeadDraft) -> Result<(), ApplicationError> {
        if !draft.has_name() {
            return Err(DomainError::Validation {
                field: "lead_name",
                message: "a non-empty name is required for a new lead".to_owned(),
            }
            .into());
        }
        if draft.phone.trim().is_empty() {
            self.lead = LeadDraft { phone: self.phone_searched.clone(), ..draft };
        } else {
            self.lead = draft;
        }
        self.lead_existed = false;
        self.apply(FlowEvent::LeadResolved).await?;
        Ok(())
    }

    /// The current operator takes the lead over and the advance resumes.
    pub async fn accept_ownership_transfer(&mut self) -> Result<(), ApplicationError> {
        let profile = self.pending_transfer.take().ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(
                "no ownership transfer is pending".to_owned(),
            ))
        })?;
        self.lead = profile.draft();
        self.lead_id = Some(profile.id);
        self.lead_existed = true;
        self.apply(FlowEvent::OwnershipTransferred).await?;
        Ok(())
    }

    // ---- conversation / source ------------------------------------------

    pub async fn choose_conversation_mode(
        &mut self,
        mode: ConversationMode,
    ) -> Result<(), ApplicationError> {
        self.conversation_mode = Some(mode);
        self.apply(FlowEvent::ConversationModeChosen).await?;
        Ok(())
    }

    pub fn choose_source(&mut self, source: Option<SourceId>) {
        self.source = source;
        self.persist_state();
    }

    pub fn edit_lead(&mut self, draft: LeadDraft) {
        self.lead = draft;
        self.persist_state();
    }

    // ---- product configuration ------------------------------------------

    /// Starts configuring a product: the first kit not previously rejected
    /// by this lead is auto-selected, defaulting to the promotional tier
    /// when the kit carries one.
    pub async fn select_product(&mut self, product_id: ProductId) -> Result<(), ApplicationError> {
        let product = self.catalog.product(&product_id).ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(format!(
                "unknown product `{}`",
                product_id.0
            )))
        })?;

        let mut draft = ItemDraft::new(product.id, product.category);
        let rejected = self.rejected_for(&product_id).await?;
        let kits = self.catalog.kits_for_product(&product_id);
        if let Some(kit) = pricing::select_kit(&kits, &rejected) {
            draft.kit_id = Some(kit.id.clone());
            draft.tier = pricing::default_tier(kit);
        }
        self.offer.begin_item(draft);
        self.persist_state();
        Ok(())
    }

    /// Rejects the active kit with a mandatory reason and re-runs selection.
    /// Returns the next auto-selected kit, or `None` when every kit is
    /// exhausted and only a negotiated price (or abandoning the product)
    /// remains.
    pub async fn reject_current_kit(
        &mut self,
        reason: &str,
    ) -> Result<Option<KitId>, ApplicationError> {
        let (product_id, kit_id, tier, unlocks) = {
            let draft = self.in_progress()?;
            let kit_id = draft.kit_id.clone().ok_or_else(|| {
                ApplicationError::Domain(DomainError::InvariantViolation(
                    "no kit is currently selected".to_owned(),
                ))
            })?;
            (draft.product_id.clone(), kit_id, draft.tier, draft.unlocks)
        };

        let kits = self.catalog.kits_for_product(&product_id);
        let kit = kits.iter().find(|kit| kit.id == kit_id).ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(format!(
                "kit `{}` is not in the catalog",
                kit_id.0
            )))
        })?;

        let (price_cents, _) =
            pricing::resolve_tier(kit, tier, unlocks).map_err(DomainError::from)?;
        // A lead that is still unpersisted has nothing for the append-only
        // record to reference; its rejections are buffered until
        // finalization resolves the lead.
        match self.lead_id.clone() {
            Some(lead_id) => {
                let rejection =
                    pricing::reject_kit(lead_id, kit, price_cents, reason, Utc::now())
                        .map_err(DomainError::from)?;
                self.store.record_kit_rejection(rejection).await?;
            }
            None => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(DomainError::Pricing(
                        pricing::PricingError::RejectionReasonRequired,
                    )
                    .into());
                }
                self.pending_rejections.push(PendingRejection {
                    product_id: product_id.clone(),
                    kit_id: kit_id.clone(),
                    price_cents,
                    reason: reason.to_owned(),
                    rejected_at: Utc::now(),
                });
            }
        }
        self.rejected_kits.entry(product_id.clone()).or_default().insert(kit_id);

        let rejected = self.rejected_for(&product_id).await?;
        let next = pricing::select_kit(&kits, &rejected).map(|kit| (kit.id.clone(), kit));
        let draft = self.in_progress()?;
        match next {
            Some((next_id, kit)) => {
                draft.kit_id = Some(next_id.clone());
                draft.tier = pricing::default_tier(kit);
                self.persist_state();
                Ok(Some(next_id))
            }
            None => {
                draft.kit_id = None;
                self.persist_state();
                Ok(None)
            }
        }
    }

    pub fn change_tier(&mut self, tier: PriceTier) -> Result<(), ApplicationError> {
        let draft = self.in_progress()?;
        if !draft.unlocks.allows(tier) {
            return Err(DomainError::Pricing(pricing::PricingError::TierLocked { tier }).into());
        }
        draft.tier = tier;
        self.persist_state();
        Ok(())
    }

    /// Reveals one of the hidden tiers for this attendance only.
    pub fn unlock_tier(&mut self, tier: PriceTier) -> Result<(), ApplicationError> {
        let draft = self.in_progress()?;
        match tier {
            PriceTier::Promotional2 => draft.unlocks.promotional2 = true,
            PriceTier::Minimum => draft.unlocks.minimum = true,
            PriceTier::Regular | PriceTier::Promotional => {}
        }
        self.persist_state();
        Ok(())
    }

    pub fn set_negotiated(
        &mut self,
        negotiated: NegotiatedOverride,
    ) -> Result<(), ApplicationError> {
        self.in_progress()?.negotiated = negotiated;
        self.persist_state();
        Ok(())
    }

    pub fn set_quantity(&mut self, quantity: u32) -> Result<(), ApplicationError> {
        self.in_progress()?.quantity = quantity.max(1);
        self.persist_state();
        Ok(())
    }

    pub fn answer_question(
        &mut self,
        question: crate::answers::QuestionId,
        value: crate::answers::AnswerValue,
    ) -> Result<(), ApplicationError> {
        self.in_progress()?.answers.insert(question, value);
        self.persist_state();
        Ok(())
    }

    /// Price, quantity and commission for the item under configuration,
    /// resolved from the current draft.
    pub fn current_quotation(&self) -> Result<Quotation, ApplicationError> {
        let draft = self.offer.in_progress().ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(
                "no item is under configuration".to_owned(),
            ))
        })?;
        let kits = self.catalog.kits_for_product(&draft.product_id);
        let kit = draft.kit_id.as_ref().and_then(|id| kits.iter().find(|kit| &kit.id == id));
        pricing::resolve_quotation(QuotationInput {
            product_id: &draft.product_id,
            category: draft.category,
            kit,
            tier: draft.tier,
            unlocks: draft.unlocks,
            negotiated: &draft.negotiated,
            quantity: draft.quantity,
            seller_default_pct: self.operator.default_commission_pct,
        })
        .map_err(|error| DomainError::from(error).into())
    }

    /// Confirms the in-progress item into the offer at its resolved price.
    pub fn confirm_item(&mut self) -> Result<(), ApplicationError> {
        let quotation = self.current_quotation()?;
        let draft = self.offer.abandon_item().ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(
                "no item is under configuration".to_owned(),
            ))
        })?;
        let line_total = if draft.category.is_bundle() {
            quotation.unit_price_cents
        } else {
            quotation.unit_price_cents * i64::from(quotation.quantity)
        };
        self.offer.confirm_item(OfferItem {
            product_id: draft.product_id,
            category: draft.category,
            kit_id: draft.kit_id,
            price_type: quotation.price_type,
            quantity: quotation.quantity,
            unit_price_cents: quotation.unit_price_cents,
            commission_pct: quotation.commission_pct,
            commission_cents: pct_of_cents(line_total, quotation.commission_pct),
            answers: draft.answers,
        });
        self.persist_state();
        Ok(())
    }

    pub fn abandon_item(&mut self) {
        self.offer.abandon_item();
        self.persist_state();
    }

    pub fn cross_sell_candidates(&self) -> Vec<ProductId> {
        self.offer.cross_sell_candidates(self.catalog)
    }

    // ---- cart / delivery / payment --------------------------------------

    pub fn set_discount(&mut self, discount: Option<Discount>) {
        self.offer.set_discount(discount);
        self.persist_state();
    }

    pub fn set_delivery(
        &mut self,
        kind: DeliveryKind,
        region: Option<RegionId>,
        scheduled_date: Option<NaiveDate>,
        shipping_cents: i64,
    ) {
        self.delivery = crate::domain::offer::DeliveryConfig {
            kind: Some(kind),
            region,
            scheduled_date,
            shipping_cents,
        };
        self.offer.set_shipping_cents(shipping_cents);
        self.persist_state();
    }

    pub fn set_payment(&mut self, method: PaymentMethod, split: Vec<crate::domain::offer::PaymentLine>) {
        self.payment = PaymentConfig { method: Some(method), split };
        self.persist_state();
    }

    // ---- navigation ------------------------------------------------------

    pub async fn advance_to_offer(&mut self) -> Result<(), ApplicationError> {
        self.apply(FlowEvent::ProductChosen).await?;
        Ok(())
    }

    pub async fn advance_to_address(&mut self) -> Result<(), ApplicationError> {
        self.apply(FlowEvent::OfferConfirmed).await?;
        Ok(())
    }

    pub async fn advance_to_payment(&mut self) -> Result<(), ApplicationError> {
        self.apply(FlowEvent::AddressConfirmed).await?;
        Ok(())
    }

    pub async fn advance_to_outcome(&mut self) -> Result<(), ApplicationError> {
        self.apply(FlowEvent::PaymentChosen).await?;
        Ok(())
    }

    /// Backward navigation, limited to steps already visited.
    pub async fn navigate_back(&mut self, target: FlowStep) -> Result<(), ApplicationError> {
        self.apply(FlowEvent::NavigateBack(target)).await?;
        Ok(())
    }

    // ---- finalization ----------------------------------------------------

    pub async fn finalize_sale(&mut self) -> Result<SaleOutcome, ApplicationError> {
        let engine = FinalizationEngine::new(self.store, self.catalog, self.webhooks);
        let input = SaleInput {
            operator: self.operator.clone(),
            session: self.session_record(),
            lead_id: self.lead_id.clone(),
            lead: self.lead.clone(),
            source: self.source.clone(),
            items: self.offer.items().to_vec(),
            subtotal_cents: self.offer.subtotal_cents(),
            discount_cents: self.offer.discount_cents(),
            shipping_cents: self.offer.shipping_cents(),
            total_cents: self.offer.total_cents(),
            delivery: self.delivery.clone(),
            payment: self.payment.clone(),
        };
        let outcome = engine.commit_sale(input, self.snapshots).await?;
        self.lead_id = Some(outcome.lead_id.clone());
        self.attendance_id = Some(outcome.attendance_id.clone());
        self.flush_pending_rejections().await?;
        self.watch.update(None);
        Ok(outcome)
    }

    pub async fn finalize_non_purchase(
        &mut self,
        reason_id: ReasonId,
        potential_cents: i64,
        explicit_follow_up: Option<DateTime<Utc>>,
    ) -> Result<NonPurchaseOutcome, ApplicationError> {
        let engine = FinalizationEngine::new(self.store, self.catalog, self.webhooks);
        let input = NonPurchaseInput {
            operator: self.operator.clone(),
            session: self.session_record(),
            lead_id: self.lead_id.clone(),
            lead: self.lead.clone(),
            reason_id,
            potential_cents,
            explicit_follow_up,
        };
        let outcome = engine.classify_non_purchase(input, self.snapshots).await?;
        self.lead_id = Some(outcome.lead_id.clone());
        self.attendance_id = Some(outcome.attendance_id.clone());
        self.flush_pending_rejections().await?;
        self.watch.update(None);
        Ok(outcome)
    }

    // ---- internals -------------------------------------------------------

    async fn flush_pending_rejections(&mut self) -> Result<(), ApplicationError> {
        let Some(lead_id) = self.lead_id.clone() else { return Ok(()) };
        let pending: Vec<PendingRejection> = self.pending_rejections.drain(..).collect();
        for rejection in pending {
            self.store
                .record_kit_rejection(crate::domain::product::KitRejection {
                    lead_id: lead_id.clone(),
                    product_id: rejection.product_id,
                    kit_id: rejection.kit_id,
                    price_cents: rejection.price_cents,
                    reason: rejection.reason,
                    rejected_at: rejection.rejected_at,
                })
                .await?;
        }
        Ok(())
    }

    async fn apply(&mut self, event: FlowEvent) -> Result<TransitionOutcome, ApplicationError> {
        let context = self.flow_context();
        let outcome = self
            .engine
            .apply(&self.step, &event, &context)
            .map_err(DomainError::from)?;

        self.step = outcome.to;
        if !self.visited.contains(&outcome.to) {
            self.visited.push(outcome.to);
        }

        for action in &outcome.actions {
            match action {
                FlowAction::UpsertAttendance | FlowAction::PatchAttendance => {
                    self.sync_attendance().await?;
                }
                FlowAction::PersistSnapshot => self.persist_snapshot(),
                // Surfaced to the caller through the search outcome; nothing
                // to persist until the transfer resolves.
                FlowAction::StartOwnershipTransfer => {}
            }
        }
        self.update_watch();
        Ok(outcome)
    }

    fn flow_context(&self) -> FlowContext {
        FlowContext {
            phone_valid: phone_looks_valid(&self.phone_searched),
            name_search_selected: self.lead_existed && self.lead_id.is_some(),
            new_lead_named: self.lead.has_name(),
            lead_owned_by_other: self.pending_transfer.is_some(),
            conversation_mode_chosen: self.conversation_mode.is_some(),
            has_product_selected: self.offer.has_product(),
            delivery_kind: self.delivery.kind,
            delivery_region_set: self.delivery.region.is_some(),
            delivery_date_set: self.delivery.scheduled_date.is_some(),
            payment_method_chosen: self.payment.method.is_some(),
            visited: self.visited.clone(),
        }
    }

    fn session_record(&self) -> AttendanceSession {
        AttendanceSession {
            id: self.attendance_id.clone(),
            org_id: self.operator.org_id.clone(),
            operator_id: self.operator.id.clone(),
            lead_id: self.lead_id.clone(),
            phone_searched: self.phone_searched.clone(),
            lead_existed: self.lead_existed,
            conversation_mode: self.conversation_mode,
            current_step: self.step,
            started_at: self.started_at,
            completed: false,
            completed_at: None,
            sale_id: None,
            reason_id: None,
            potential_cents: None,
        }
    }

    /// Create once, patch afterwards, keyed by the id handed back on the
    /// first write.
    async fn sync_attendance(&mut self) -> Result<(), ApplicationError> {
        let record = self.session_record();
        match &self.attendance_id {
            Some(id) => self.store.update_attendance(id, &record).await?,
            None => {
                let id = self.store.create_attendance(&record).await?;
                self.attendance_id = Some(id);
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            step: self.step,
            visited: self.visited.clone(),
            phone_searched: self.phone_searched.clone(),
            lead_id: self.lead_id.clone(),
            lead_existed: self.lead_existed,
            lead: self.lead.clone(),
            source: self.source.clone(),
            conversation_mode: self.conversation_mode,
            attendance_id: self.attendance_id.clone(),
            started_at: self.started_at,
            in_progress: self.offer.in_progress().cloned(),
            items: self.offer.items().to_vec(),
            discount: self.offer.discount().cloned(),
            shipping_cents: self.offer.shipping_cents(),
            delivery: self.delivery.clone(),
            payment: self.payment.clone(),
            rejected_kits: self.rejected_kits.clone(),
        }
    }

    fn lead_identified(&self) -> bool {
        self.lead_id.is_some() || self.lead.has_name()
    }

    /// A failed snapshot write must never block the operator.
    fn persist_snapshot(&self) {
        if !snapshot_eligible(self.step, self.lead_identified()) {
            return;
        }
        if let Err(error) = self.snapshots.save(SESSION_SNAPSHOT_KEY, &self.snapshot()) {
            debug!(%error, "session snapshot write dropped");
        }
    }

    fn persist_state(&self) {
        self.persist_snapshot();
        self.update_watch();
    }

    fn update_watch(&self) {
        if self.step != FlowStep::Phone && self.lead_identified() {
            self.watch.update(Some(AbandonmentNotice { session: self.session_record() }));
        } else {
            self.watch.update(None);
        }
    }

    fn in_progress(&mut self) -> Result<&mut ItemDraft, ApplicationError> {
        self.offer.in_progress_mut().ok_or_else(|| {
            ApplicationError::Domain(DomainError::InvariantViolation(
                "no item is under configuration".to_owned(),
            ))
        })
    }

    async fn rejected_for(&self, product_id: &ProductId) -> Result<HashSet<KitId>, ApplicationError> {
        let mut rejected: HashSet<KitId> = self
            .rejected_kits
            .get(product_id)
            .map(|session_set| session_set.iter().cloned().collect())
            .unwrap_or_default();
        // Rejections persist across sessions for the same lead+product.
        if let Some(lead_id) = &self.lead_id {
            rejected.extend(self.store.rejected_kit_ids(lead_id, product_id).await?);
        }
        Ok(rejected)
    }
}

fn phone_looks_valid(phone: &str) -> bool {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    digits >= 8
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::attendance::ConversationMode;
    use crate::domain::lead::LeadDraft;
    use crate::domain::offer::{
        DeliveryKind, Discount, NegotiatedOverride, PaymentMethod, RegionId,
    };
    use crate::domain::operator::{OperatorId, OperatorProfile, OrgId};
    use crate::domain::outcome::{NonPurchaseReason, ReasonId};
    use crate::domain::product::{KitId, ProductId};
    use crate::errors::{ApplicationError, DomainError};
    use crate::flows::FlowStep;
    use crate::pricing::PricingError;
    use crate::resilience::{InMemorySnapshotStore, SnapshotStore, SESSION_SNAPSHOT_KEY};
    use crate::store::{
        test_catalog, InMemoryCatalog, InMemoryRecordStore, InMemoryWebhookDispatcher,
    };

    use super::{AttendanceRuntime, PhoneSearchOutcome};

    fn operator() -> OperatorProfile {
        OperatorProfile {
            id: OperatorId("op-1".to_owned()),
            org_id: OrgId("org-demo".to_owned()),
            name: "Carla".to_owned(),
            default_commission_pct: Decimal::new(1_200, 2),
        }
    }

    struct Fixture {
        store: InMemoryRecordStore,
        catalog: InMemoryCatalog,
        webhooks: InMemoryWebhookDispatcher,
        snapshots: InMemorySnapshotStore,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = test_catalog().with_reason(NonPurchaseReason {
                id: ReasonId("REASON-PRICE".to_owned()),
                org_id: OrgId("org-demo".to_owned()),
                label: "Price objection".to_owned(),
                followup_hours: Some(24),
                exclusivity_hours: None,
                webhook_url: None,
            });
            Self {
                store: InMemoryRecordStore::new(),
                catalog,
                webhooks: InMemoryWebhookDispatcher::default(),
                snapshots: InMemorySnapshotStore::new(),
            }
        }

        fn runtime(&self) -> AttendanceRuntime<'_, InMemoryRecordStore, InMemoryCatalog, InMemoryWebhookDispatcher> {
            AttendanceRuntime::start(
                &self.store,
                &self.catalog,
                &self.webhooks,
                &self.snapshots,
                operator(),
            )
        }

        fn resumed(&self) -> AttendanceRuntime<'_, InMemoryRecordStore, InMemoryCatalog, InMemoryWebhookDispatcher> {
            AttendanceRuntime::resume(
                &self.store,
                &self.catalog,
                &self.webhooks,
                &self.snapshots,
                operator(),
            )
        }
    }

    async fn drive_to_product(
        runtime: &mut AttendanceRuntime<'_, InMemoryRecordStore, InMemoryCatalog, InMemoryWebhookDispatcher>,
    ) {
        let outcome = runtime.search_phone("+5511999990000").await.expect("phone search");
        assert_eq!(outcome, PhoneSearchOutcome::NoMatch);
        runtime
            .register_new_lead(LeadDraft { name: "Maria Souza".to_owned(), ..LeadDraft::default() })
            .await
            .expect("new lead");
        runtime
            .choose_conversation_mode(ConversationMode::NewSale)
            .await
            .expect("conversation mode");
        assert_eq!(runtime.current_step(), FlowStep::Product);
    }

    #[tokio::test]
    async fn new_caller_walks_from_phone_to_a_committed_sale() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        drive_to_product(&mut runtime).await;

        runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select product");
        let quotation = runtime.current_quotation().expect("quotation");
        assert_eq!(quotation.unit_price_cents, 113_400);
        assert_eq!(quotation.quantity, 6);
        runtime.confirm_item().expect("confirm item");

        runtime.advance_to_offer().await.expect("to offer");
        runtime.advance_to_address().await.expect("to address");
        runtime.set_delivery(
            DeliveryKind::Motoboy,
            Some(RegionId("zona-sul".to_owned())),
            Some(chrono::NaiveDate::from_ymd_opt(2026, 8, 12).expect("date")),
            1_500,
        );
        runtime.advance_to_payment().await.expect("to payment");
        runtime.set_payment(PaymentMethod::Pix, Vec::new());
        runtime.advance_to_outcome().await.expect("to outcome");

        let outcome = runtime.finalize_sale().await.expect("sale");
        assert_eq!(fixture.store.sales().len(), 1);
        assert_eq!(fixture.store.attendances().len(), 1);
        assert!(fixture.store.attendances()[0].completed);
        assert_eq!(fixture.store.attendances()[0].sale_id, Some(outcome.sale_id));
        // Terminal branch clears the local snapshot.
        assert!(fixture.snapshots.load(SESSION_SNAPSHOT_KEY).expect("load").is_none());
        assert!(runtime.termination_watch().latest().is_none());
    }

    #[tokio::test]
    async fn attendance_record_is_created_once_then_patched() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        drive_to_product(&mut runtime).await;
        runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select product");
        runtime.advance_to_offer().await.expect("to offer");

        let attendances = fixture.store.attendances();
        assert_eq!(attendances.len(), 1);
        assert_eq!(attendances[0].current_step, FlowStep::Offer);
        assert_eq!(runtime.attendance_id().cloned(), attendances[0].id);
    }

    #[tokio::test]
    async fn snapshot_at_payment_restores_step_and_items_by_value() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        drive_to_product(&mut runtime).await;
        runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("first product");
        runtime.confirm_item().expect("confirm first");
        runtime.select_product(ProductId("PROD-CUSTOM".to_owned())).await.expect("second product");
        runtime
            .set_negotiated(NegotiatedOverride { price_cents: Some(2_500), commission_pct: None })
            .expect("negotiated");
        runtime.set_quantity(4).expect("quantity");
        runtime.confirm_item().expect("confirm second");

        runtime.advance_to_offer().await.expect("to offer");
        runtime.advance_to_address().await.expect("to address");
        runtime.advance_to_payment().await.expect("to payment");

        let items_before = runtime.offer().items().to_vec();
        assert_eq!(items_before.len(), 2);

        // A reload of the process: a fresh runtime over the same snapshot
        // store picks up where this one stopped.
        let restored = fixture.resumed();
        assert_eq!(restored.current_step(), FlowStep::Payment);
        assert_eq!(restored.offer().items(), items_before.as_slice());
    }

    #[tokio::test]
    async fn rejecting_kits_walks_positions_and_exhausts_to_negotiated_only() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        drive_to_product(&mut runtime).await;
        runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select product");

        let next = runtime.reject_current_kit("too expensive").await.expect("first rejection");
        assert_eq!(next, Some(KitId("KIT-B".to_owned())));

        let none_left = runtime.reject_current_kit("still too much").await.expect("second");
        assert_eq!(none_left, None);

        // Tier pricing is blocked until a negotiated price arrives.
        let error = runtime.current_quotation().expect_err("kits exhausted");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Pricing(PricingError::KitsExhausted { .. }))
        ));

        runtime
            .set_negotiated(NegotiatedOverride { price_cents: Some(80_000), commission_pct: None })
            .expect("negotiated fallback");
        let quotation = runtime.current_quotation().expect("negotiated quotation");
        assert_eq!(quotation.unit_price_cents, 80_000);
    }

    #[tokio::test]
    async fn rejections_survive_into_a_later_session_for_the_same_lead() {
        let fixture = Fixture::new();

        {
            let mut runtime = fixture.runtime();
            let outcome = runtime.search_phone("+5511999990000").await.expect("phone search");
            assert_eq!(outcome, PhoneSearchOutcome::NoMatch);
            runtime
                .register_new_lead(LeadDraft {
                    name: "Maria Souza".to_owned(),
                    ..LeadDraft::default()
                })
                .await
                .expect("new lead");
            runtime
                .choose_conversation_mode(ConversationMode::NewSale)
                .await
                .expect("conversation mode");
            runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select");
            runtime.reject_current_kit("too expensive").await.expect("reject");
            // Classifying persists the lead; the session's rejections stay
            // with it through the append-only record.
            runtime
                .finalize_non_purchase(ReasonId("REASON-PRICE".to_owned()), 50_000, None)
                .await
                .expect("classified");
            // The rejection made before the lead existed is recorded once
            // the lead id is known.
            let lead_id = runtime.lead_id().cloned().expect("lead persisted");
            assert_eq!(fixture.store.leads()[0].id, lead_id);
        }

        // Same caller phones again: the rejected kit must not come back.
        let mut second = fixture.runtime();
        let outcome = second.search_phone("+5511999990000").await.expect("phone search");
        assert!(matches!(outcome, PhoneSearchOutcome::LeadFound { .. }));
        second.choose_conversation_mode(ConversationMode::Repurchase).await.expect("mode");
        second.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select");
        assert_eq!(
            second.offer().in_progress().and_then(|draft| draft.kit_id.clone()),
            Some(KitId("KIT-B".to_owned()))
        );
    }

    #[tokio::test]
    async fn foreign_owned_lead_requires_the_transfer_before_advancing() {
        let fixture = Fixture::new();
        let lead = seed_owned_lead(&fixture);

        let mut runtime = fixture.runtime();
        let outcome = runtime.search_phone("+5511888887777").await.expect("phone search");
        assert_eq!(outcome, PhoneSearchOutcome::OwnershipConflict { lead_id: lead });
        assert_eq!(runtime.current_step(), FlowStep::Phone);

        runtime.accept_ownership_transfer().await.expect("transfer accepted");
        assert_eq!(runtime.current_step(), FlowStep::Conversation);
    }

    fn seed_owned_lead(fixture: &Fixture) -> crate::domain::lead::LeadId {
        use crate::domain::lead::{AddressFields, LeadId, LeadProfile};

        let lead = LeadProfile {
            id: LeadId("LEAD-OWNED".to_owned()),
            org_id: OrgId("org-demo".to_owned()),
            owner_operator_id: Some(OperatorId("op-2".to_owned())),
            name: "Jorge Lima".to_owned(),
            phone: "+5511888887777".to_owned(),
            email: None,
            address: AddressFields::default(),
            funnel_stage: None,
            star_rating: None,
            negotiated_value_cents: 0,
            created_at: chrono::Utc::now(),
        };
        fixture.store.seed_lead(lead.clone());
        lead.id
    }

    #[tokio::test]
    async fn watch_carries_the_latest_in_progress_state() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        drive_to_product(&mut runtime).await;
        let watch = runtime.termination_watch();
        let notice = watch.latest().expect("notice present");
        assert_eq!(notice.session.current_step, FlowStep::Product);
        assert_eq!(notice.session.phone_searched, "+5511999990000");

        runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select");
        runtime.advance_to_offer().await.expect("to offer");
        assert_eq!(watch.latest().expect("refreshed").session.current_step, FlowStep::Offer);
    }

    #[tokio::test]
    async fn empty_sessions_are_never_snapshotted() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        let error = runtime.search_phone("123").await.expect_err("invalid phone");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Validation { field: "phone", .. })
        ));
        assert!(fixture.snapshots.load(SESSION_SNAPSHOT_KEY).expect("load").is_none());
    }

    #[tokio::test]
    async fn discounted_offer_totals_flow_into_the_sale() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        drive_to_product(&mut runtime).await;
        runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select");
        runtime.confirm_item().expect("confirm");
        runtime.set_discount(Some(Discount::Fixed(10_000)));
        runtime.advance_to_offer().await.expect("to offer");
        runtime.advance_to_address().await.expect("to address");
        runtime.advance_to_payment().await.expect("to payment");
        runtime.set_payment(PaymentMethod::CreditCard, Vec::new());
        runtime.advance_to_outcome().await.expect("to outcome");

        runtime.finalize_sale().await.expect("sale");

        let (_, sale) = &fixture.store.sales()[0];
        assert_eq!(sale.discount_cents, 10_000);
        assert_eq!(sale.total_cents, 113_400 - 10_000);
        // Discount forces the seller default onto every line.
        assert_eq!(sale.items[0].commission_pct, Decimal::new(1_200, 2));
    }

    #[tokio::test]
    async fn backward_navigation_revisits_a_prior_step() {
        let fixture = Fixture::new();
        let mut runtime = fixture.runtime();

        drive_to_product(&mut runtime).await;
        runtime.select_product(ProductId("PROD-OIL".to_owned())).await.expect("select");
        runtime.advance_to_offer().await.expect("to offer");

        runtime.navigate_back(FlowStep::Product).await.expect("back to product");
        assert_eq!(runtime.current_step(), FlowStep::Product);

        let error = runtime.navigate_back(FlowStep::Payment).await.expect_err("never visited");
        assert!(matches!(error, ApplicationError::Domain(DomainError::FlowTransition(_))));
    }
}
