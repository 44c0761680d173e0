use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::answers::AnswerBag;
use crate::domain::product::{Category, KitId, PriceTier, ProductId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Tier(PriceTier),
    Negotiated,
}

impl PriceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tier(tier) => tier.as_str(),
            Self::Negotiated => "negotiated",
        }
    }
}

/// Operator-entered override. A non-empty price unconditionally replaces the
/// tier price; the commission, when present, replaces the resolved one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedOverride {
    pub price_cents: Option<i64>,
    pub commission_pct: Option<Decimal>,
}

impl NegotiatedOverride {
    pub fn has_price(&self) -> bool {
        self.price_cents.is_some()
    }
}

/// Per-attendance reveal state for the hidden tiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUnlocks {
    pub promotional2: bool,
    pub minimum: bool,
}

impl TierUnlocks {
    pub fn allows(self, tier: PriceTier) -> bool {
        match tier {
            PriceTier::Regular | PriceTier::Promotional => true,
            PriceTier::Promotional2 => self.promotional2,
            PriceTier::Minimum => self.minimum,
        }
    }
}

/// The item currently under configuration, before it is confirmed into the
/// offer. Serializable so the resilience snapshot can carry it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub product_id: ProductId,
    pub category: Category,
    pub kit_id: Option<KitId>,
    pub tier: PriceTier,
    pub unlocks: TierUnlocks,
    pub negotiated: NegotiatedOverride,
    pub quantity: u32,
    pub answers: AnswerBag,
}

impl ItemDraft {
    pub fn new(product_id: ProductId, category: Category) -> Self {
        Self {
            product_id,
            category,
            kit_id: None,
            tier: PriceTier::Regular,
            unlocks: TierUnlocks::default(),
            negotiated: NegotiatedOverride::default(),
            quantity: 1,
            answers: AnswerBag::new(),
        }
    }
}

/// A confirmed line in the offer. For bundle categories `unit_price_cents`
/// holds the kit's total price until finalization converts it to a true
/// per-unit value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferItem {
    pub product_id: ProductId,
    pub category: Category,
    pub kit_id: Option<KitId>,
    pub price_type: PriceType,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub commission_pct: Decimal,
    pub commission_cents: i64,
    pub answers: AnswerBag,
}

impl OfferItem {
    /// Contribution to the offer subtotal: bundle prices are already totals.
    pub fn line_total_cents(&self) -> i64 {
        if self.category.is_bundle() {
            self.unit_price_cents
        } else {
            self.unit_price_cents * i64::from(self.quantity)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discount {
    Percentage(Decimal),
    Fixed(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Pickup,
    Carrier,
    Motoboy,
}

impl DeliveryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Carrier => "carrier",
            Self::Motoboy => "motoboy",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub kind: Option<DeliveryKind>,
    pub region: Option<RegionId>,
    pub scheduled_date: Option<NaiveDate>,
    pub shipping_cents: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { kind: None, region: None, scheduled_date: None, shipping_cents: 0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    Pix,
    BankSlip,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::CreditCard => "credit_card",
            Self::Pix => "pix",
            Self::BankSlip => "bank_slip",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub method: PaymentMethod,
    pub amount_cents: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub method: Option<PaymentMethod>,
    pub split: Vec<PaymentLine>,
}

impl PaymentConfig {
    pub fn is_split(&self) -> bool {
        !self.split.is_empty()
    }
}
