use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::LeadId;
use crate::domain::operator::{OperatorId, OrgId};
use crate::domain::outcome::{ReasonId, SaleId};
use crate::flows::states::FlowStep;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttendanceId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    NewSale,
    Repurchase,
    FollowUpCall,
}

impl ConversationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewSale => "new_sale",
            Self::Repurchase => "repurchase",
            Self::FollowUpCall => "follow_up_call",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new_sale" => Some(Self::NewSale),
            "repurchase" => Some(Self::Repurchase),
            "follow_up_call" => Some(Self::FollowUpCall),
            _ => None,
        }
    }
}

/// One phone-lookup-to-outcome cycle. Created lazily on the first meaningful
/// action, patched at each step, completed exactly once by either terminal
/// branch of finalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub id: Option<AttendanceId>,
    pub org_id: OrgId,
    pub operator_id: OperatorId,
    pub lead_id: Option<LeadId>,
    pub phone_searched: String,
    pub lead_existed: bool,
    pub conversation_mode: Option<ConversationMode>,
    pub current_step: FlowStep,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub sale_id: Option<SaleId>,
    pub reason_id: Option<ReasonId>,
    pub potential_cents: Option<i64>,
}

impl AttendanceSession {
    pub fn open(org_id: OrgId, operator_id: OperatorId, started_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            org_id,
            operator_id,
            lead_id: None,
            phone_searched: String::new(),
            lead_existed: false,
            conversation_mode: None,
            current_step: FlowStep::Phone,
            started_at,
            completed: false,
            completed_at: None,
            sale_id: None,
            reason_id: None,
            potential_cents: None,
        }
    }
}
