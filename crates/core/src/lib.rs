pub mod answers;
pub mod config;
pub mod domain;
pub mod errors;
pub mod finalize;
pub mod flows;
pub mod money;
pub mod offer;
pub mod pricing;
pub mod resilience;
pub mod session;
pub mod store;

pub use answers::{route_answers, AnswerBag, AnswerValue, QuestionDef, QuestionId, QuestionScope};
pub use domain::attendance::{AttendanceId, AttendanceSession, ConversationMode};
pub use domain::lead::{LeadDraft, LeadId, LeadProfile, SourceId};
pub use domain::offer::{
    DeliveryConfig, DeliveryKind, Discount, ItemDraft, NegotiatedOverride, OfferItem,
    PaymentConfig, PaymentLine, PaymentMethod, PriceType, RegionId, TierUnlocks,
};
pub use domain::operator::{OperatorId, OperatorProfile, OrgId};
pub use domain::outcome::{
    FollowUp, NonPurchaseReason, ReasonId, SaleDraft, SaleId, SaleItemDraft,
};
pub use domain::product::{
    Category, KitId, KitRejection, PriceKit, PriceTier, Product, ProductId, TierCommission,
    TierPrice,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use finalize::{
    FinalizationEngine, NonPurchaseInput, NonPurchaseOutcome, SaleInput, SaleOutcome,
};
pub use flows::{
    FlowAction, FlowContext, FlowDefinition, FlowEngine, FlowEvent, FlowStep,
    FlowTransitionError, ReceptiveFlow, TransitionOutcome,
};
pub use offer::OfferAccumulator;
pub use pricing::{PricingError, Quotation, QuotationInput};
pub use resilience::{
    snapshot_eligible, AbandonmentBeacon, AbandonmentNotice, InMemorySnapshotStore,
    JsonFileSnapshotStore, SessionSnapshot, SnapshotStore, TerminationWatch,
    SESSION_SNAPSHOT_KEY,
};
pub use session::{AttendanceRuntime, PhoneSearchOutcome};
pub use store::{
    DispatchError, InMemoryCatalog, InMemoryRecordStore, InMemoryWebhookDispatcher,
    PricingCatalog, RecordStore, StoreError, WebhookDispatcher,
};
