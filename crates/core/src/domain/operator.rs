use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub String);

/// The seller driving an attendance. The standing default commission is the
/// fallback for negotiated prices and the forced percentage whenever a
/// cart-level discount is applied at finalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub id: OperatorId,
    pub org_id: OrgId,
    pub name: String,
    pub default_commission_pct: Decimal,
}
