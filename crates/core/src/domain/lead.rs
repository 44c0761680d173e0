use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::operator::{OperatorId, OrgId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

/// Mutable lead fields the engine collects during an attendance and proposes
/// back to the record store. The store owns the canonical profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDraft {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: AddressFields,
    pub funnel_stage: Option<String>,
    pub star_rating: Option<u8>,
}

impl LeadDraft {
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadProfile {
    pub id: LeadId,
    pub org_id: OrgId,
    pub owner_operator_id: Option<OperatorId>,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: AddressFields,
    pub funnel_stage: Option<String>,
    pub star_rating: Option<u8>,
    pub negotiated_value_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl LeadProfile {
    pub fn draft(&self) -> LeadDraft {
        LeadDraft {
            name: self.name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            address: self.address.clone(),
            funnel_stage: self.funnel_stage.clone(),
            star_rating: self.star_rating,
        }
    }

    pub fn owned_by_other(&self, operator: &OperatorId) -> bool {
        self.owner_operator_id.as_ref().is_some_and(|owner| owner != operator)
    }
}
