use thiserror::Error;

use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowStep, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_step(&self) -> FlowStep;
    fn transition(
        &self,
        current: &FlowStep,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// The receptive attendance flow: caller phones in, the operator identifies
/// them and walks forward through the offer to a terminal outcome.
#[derive(Clone, Debug, Default)]
pub struct ReceptiveFlow;

impl FlowDefinition for ReceptiveFlow {
    fn initial_step(&self) -> FlowStep {
        FlowStep::Phone
    }

    fn transition(
        &self,
        current: &FlowStep,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_receptive(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_step(&self) -> FlowStep {
        self.flow.initial_step()
    }

    pub fn apply(
        &self,
        current: &FlowStep,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }
}

impl Default for FlowEngine<ReceptiveFlow> {
    fn default() -> Self {
        Self::new(ReceptiveFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot leave {state:?} without {requirement}")]
    MissingRequirement { state: FlowStep, requirement: &'static str },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowStep, event: FlowEvent },
    #[error("cannot navigate back to {target:?}: step was never visited")]
    StepNotVisited { state: FlowStep, target: FlowStep },
}

fn transition_receptive(
    current: &FlowStep,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        PatchAttendance, PersistSnapshot, StartOwnershipTransfer, UpsertAttendance,
    };
    use FlowEvent::{
        AddressConfirmed, ConversationModeChosen, LeadMissing, LeadResolved, NavigateBack,
        OfferConfirmed, OwnershipTransferred, PaymentChosen, ProductChosen,
    };
    use FlowStep::{
        Address, Conversation, LeadInfo, Offer, Payment, Phone, Product, SaleOrReason,
    };

    let (to, actions) = match (current, event) {
        (Phone, LeadResolved) => {
            let identified =
                context.phone_valid || context.name_search_selected || context.new_lead_named;
            if !identified {
                return Err(FlowTransitionError::MissingRequirement {
                    state: *current,
                    requirement: "a valid phone, a name-search selection, or a named new lead",
                });
            }
            if context.lead_owned_by_other {
                // Another operator owns this caller: the advance is replaced
                // by the ownership-transfer sub-flow.
                (Phone, vec![StartOwnershipTransfer])
            } else {
                (Conversation, vec![UpsertAttendance, PersistSnapshot])
            }
        }
        (Phone, LeadMissing) => {
            if !context.phone_valid {
                return Err(FlowTransitionError::MissingRequirement {
                    state: *current,
                    requirement: "a valid phone number",
                });
            }
            (LeadInfo, Vec::new())
        }
        (LeadInfo, LeadResolved) => {
            if !context.new_lead_named {
                return Err(FlowTransitionError::MissingRequirement {
                    state: *current,
                    requirement: "a non-empty lead name",
                });
            }
            (Conversation, vec![UpsertAttendance, PersistSnapshot])
        }
        (Phone, OwnershipTransferred) => (Conversation, vec![UpsertAttendance, PersistSnapshot]),
        (Conversation, ConversationModeChosen) => {
            if !context.conversation_mode_chosen {
                return Err(FlowTransitionError::MissingRequirement {
                    state: *current,
                    requirement: "a conversation mode",
                });
            }
            (Product, vec![PatchAttendance, PersistSnapshot])
        }
        (Product, ProductChosen) => {
            if !context.has_product_selected {
                return Err(FlowTransitionError::MissingRequirement {
                    state: *current,
                    requirement: "at least one selected product",
                });
            }
            (Offer, vec![PatchAttendance, PersistSnapshot])
        }
        (Offer, OfferConfirmed) => (Address, vec![PatchAttendance, PersistSnapshot]),
        (Address, AddressConfirmed) => {
            let motoboy = context.delivery_kind
                == Some(crate::domain::offer::DeliveryKind::Motoboy);
            if motoboy && !(context.delivery_region_set && context.delivery_date_set) {
                return Err(FlowTransitionError::MissingRequirement {
                    state: *current,
                    requirement: "a delivery region and a scheduled date",
                });
            }
            (Payment, vec![PatchAttendance, PersistSnapshot])
        }
        (Payment, PaymentChosen) => {
            if !context.payment_method_chosen {
                return Err(FlowTransitionError::MissingRequirement {
                    state: *current,
                    requirement: "a payment method",
                });
            }
            (SaleOrReason, vec![PatchAttendance, PersistSnapshot])
        }
        (_, NavigateBack(target)) => {
            if target.position() >= current.position() {
                return Err(FlowTransitionError::InvalidTransition {
                    state: *current,
                    event: *event,
                });
            }
            if !context.visited.contains(target) {
                return Err(FlowTransitionError::StepNotVisited {
                    state: *current,
                    target: *target,
                });
            }
            (*target, vec![PersistSnapshot])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: *event,
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}
