use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::answers::QuestionDef;
use crate::domain::lead::LeadId;
use crate::domain::operator::OrgId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KitId(pub String);

/// Bundle categories price a kit as a single total; the remaining categories
/// price per unit and multiply by quantity downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ReadyProduct,
    PrintOnDemand,
    Dropshipping,
    Compounded,
    Manual,
}

impl Category {
    pub fn is_bundle(self) -> bool {
        matches!(self, Self::ReadyProduct | Self::PrintOnDemand | Self::Dropshipping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadyProduct => "ready_product",
            Self::PrintOnDemand => "print_on_demand",
            Self::Dropshipping => "dropshipping",
            Self::Compounded => "compounded",
            Self::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ready_product" => Some(Self::ReadyProduct),
            "print_on_demand" => Some(Self::PrintOnDemand),
            "dropshipping" => Some(Self::Dropshipping),
            "compounded" => Some(Self::Compounded),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Regular,
    Promotional,
    Promotional2,
    Minimum,
}

impl PriceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Promotional => "promotional",
            Self::Promotional2 => "promotional2",
            Self::Minimum => "minimum",
        }
    }

    /// Promotional-2 and minimum stay hidden until explicitly unlocked for
    /// the attendance at hand.
    pub fn hidden_by_default(self) -> bool {
        matches!(self, Self::Promotional2 | Self::Minimum)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierCommission {
    KitDefault,
    Custom(Decimal),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierPrice {
    pub price_cents: i64,
    pub commission: TierCommission,
}

/// A fixed-quantity bundle of a product with up to four price tiers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceKit {
    pub id: KitId,
    pub product_id: ProductId,
    pub position: u32,
    pub bundle_quantity: u32,
    pub default_commission_pct: Decimal,
    pub regular: TierPrice,
    pub promotional: Option<TierPrice>,
    pub promotional2: Option<TierPrice>,
    pub minimum: Option<TierPrice>,
}

impl PriceKit {
    pub fn tier_price(&self, tier: PriceTier) -> Option<&TierPrice> {
        match tier {
            PriceTier::Regular => Some(&self.regular),
            PriceTier::Promotional => self.promotional.as_ref(),
            PriceTier::Promotional2 => self.promotional2.as_ref(),
            PriceTier::Minimum => self.minimum.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub org_id: OrgId,
    pub name: String,
    pub category: Category,
    pub active: bool,
    pub cross_sell_1: Option<ProductId>,
    pub cross_sell_2: Option<ProductId>,
    pub questions: Vec<QuestionDef>,
}

impl Product {
    pub fn cross_sell_refs(&self) -> impl Iterator<Item = &ProductId> {
        self.cross_sell_1.iter().chain(self.cross_sell_2.iter())
    }
}

/// Append-only record of a kit the lead turned down. Once present, the kit is
/// never auto-selected again for that lead+product, in this session or any
/// later one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KitRejection {
    pub lead_id: LeadId,
    pub product_id: ProductId,
    pub kit_id: KitId,
    pub price_cents: i64,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}
