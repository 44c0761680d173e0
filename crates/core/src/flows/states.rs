use serde::{Deserialize, Serialize};

use crate::domain::offer::DeliveryKind;

/// The ordered screens of a receptive attendance. `LeadInfo` is skipped
/// whenever the lead resolves directly from the phone step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Phone,
    LeadInfo,
    Conversation,
    Product,
    Offer,
    Address,
    Payment,
    SaleOrReason,
}

impl FlowStep {
    pub fn position(self) -> u8 {
        match self {
            Self::Phone => 0,
            Self::LeadInfo => 1,
            Self::Conversation => 2,
            Self::Product => 3,
            Self::Offer => 4,
            Self::Address => 5,
            Self::Payment => 6,
            Self::SaleOrReason => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::LeadInfo => "lead_info",
            Self::Conversation => "conversation",
            Self::Product => "product",
            Self::Offer => "offer",
            Self::Address => "address",
            Self::Payment => "payment",
            Self::SaleOrReason => "sale_or_reason",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "phone" => Some(Self::Phone),
            "lead_info" => Some(Self::LeadInfo),
            "conversation" => Some(Self::Conversation),
            "product" => Some(Self::Product),
            "offer" => Some(Self::Offer),
            "address" => Some(Self::Address),
            "payment" => Some(Self::Payment),
            "sale_or_reason" => Some(Self::SaleOrReason),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    LeadResolved,
    LeadMissing,
    OwnershipTransferred,
    ConversationModeChosen,
    ProductChosen,
    OfferConfirmed,
    AddressConfirmed,
    PaymentChosen,
    NavigateBack(FlowStep),
}

/// Everything the guards need to know about the session, assembled by the
/// runtime before each transition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowContext {
    pub phone_valid: bool,
    pub name_search_selected: bool,
    pub new_lead_named: bool,
    pub lead_owned_by_other: bool,
    pub conversation_mode_chosen: bool,
    pub has_product_selected: bool,
    pub delivery_kind: Option<DeliveryKind>,
    pub delivery_region_set: bool,
    pub delivery_date_set: bool,
    pub payment_method_chosen: bool,
    pub visited: Vec<FlowStep>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    UpsertAttendance,
    PatchAttendance,
    PersistSnapshot,
    StartOwnershipTransfer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowStep,
    pub to: FlowStep,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
