//! Pricing and commission resolution for the item under configuration.
//!
//! Pure functions over the product's kit list, the session's rejected-kit
//! set, the selected tier, and an optional negotiated override. The
//! discount-forces-default-commission rule is deliberately absent here: it is
//! evaluated once, at finalization time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::lead::LeadId;
use crate::domain::offer::{NegotiatedOverride, PriceType, TierUnlocks};
use crate::domain::product::{
    Category, KitId, KitRejection, PriceKit, PriceTier, ProductId, TierCommission,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("rejecting a kit requires a non-empty reason")]
    RejectionReasonRequired,
    #[error("tier {tier:?} is locked for this attendance")]
    TierLocked { tier: PriceTier },
    #[error("every kit for product {product:?} has been rejected")]
    KitsExhausted { product: ProductId },
    #[error("category {category:?} prices through a negotiated value")]
    NegotiatedPriceRequired { category: Category },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Quotation {
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub commission_pct: Decimal,
    pub price_type: PriceType,
}

#[derive(Clone, Debug)]
pub struct QuotationInput<'a> {
    pub product_id: &'a ProductId,
    pub category: Category,
    pub kit: Option<&'a PriceKit>,
    pub tier: PriceTier,
    pub unlocks: TierUnlocks,
    pub negotiated: &'a NegotiatedOverride,
    pub quantity: u32,
    pub seller_default_pct: Decimal,
}

/// First kit by ascending position not present in the rejected set. `None`
/// means every kit is exhausted and the caller must fall back to a
/// negotiated price or abandon the product.
pub fn select_kit<'a>(kits: &'a [PriceKit], rejected: &HashSet<KitId>) -> Option<&'a PriceKit> {
    kits.iter().filter(|kit| !rejected.contains(&kit.id)).min_by_key(|kit| kit.position)
}

/// Promotional when the kit defines one, regular otherwise.
pub fn default_tier(kit: &PriceKit) -> PriceTier {
    if kit.promotional.is_some() {
        PriceTier::Promotional
    } else {
        PriceTier::Regular
    }
}

/// Resolves tier price and commission for one kit. A tier with no price of
/// its own falls back to the regular price; commission comes from the tier
/// entry when it declares a custom percentage, from the kit default
/// otherwise.
pub fn resolve_tier(
    kit: &PriceKit,
    tier: PriceTier,
    unlocks: TierUnlocks,
) -> Result<(i64, Decimal), PricingError> {
    if !unlocks.allows(tier) {
        return Err(PricingError::TierLocked { tier });
    }

    let price_cents =
        kit.tier_price(tier).map(|entry| entry.price_cents).unwrap_or(kit.regular.price_cents);
    let commission_pct = match kit.tier_price(tier).map(|entry| &entry.commission) {
        Some(TierCommission::Custom(pct)) => *pct,
        Some(TierCommission::KitDefault) | None => kit.default_commission_pct,
    };

    Ok((price_cents, commission_pct))
}

/// Produces `{quantity, unit price, commission}` for the item under
/// configuration. Bundle categories quote the kit total at the kit's bundle
/// quantity; every other category quotes per unit at the operator-supplied
/// quantity.
pub fn resolve_quotation(input: QuotationInput<'_>) -> Result<Quotation, PricingError> {
    if let Some(price_cents) = input.negotiated.price_cents {
        let quantity = match (input.category.is_bundle(), input.kit) {
            (true, Some(kit)) => kit.bundle_quantity,
            _ => input.quantity.max(1),
        };
        return Ok(Quotation {
            quantity,
            unit_price_cents: price_cents,
            commission_pct: input
                .negotiated
                .commission_pct
                .unwrap_or(input.seller_default_pct),
            price_type: PriceType::Negotiated,
        });
    }

    let Some(kit) = input.kit else {
        return Err(if input.category.is_bundle() {
            PricingError::KitsExhausted { product: input.product_id.clone() }
        } else {
            PricingError::NegotiatedPriceRequired { category: input.category }
        });
    };

    let (unit_price_cents, commission_pct) = resolve_tier(kit, input.tier, input.unlocks)?;
    let quantity =
        if input.category.is_bundle() { kit.bundle_quantity } else { input.quantity.max(1) };

    Ok(Quotation {
        quantity,
        unit_price_cents,
        commission_pct,
        price_type: PriceType::Tier(input.tier),
    })
}

/// Builds the append-only rejection record. The reason is mandatory; the
/// price is captured as resolved at the moment of rejection.
pub fn reject_kit(
    lead_id: LeadId,
    kit: &PriceKit,
    price_cents: i64,
    reason: &str,
    rejected_at: DateTime<Utc>,
) -> Result<KitRejection, PricingError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(PricingError::RejectionReasonRequired);
    }

    Ok(KitRejection {
        lead_id,
        product_id: kit.product_id.clone(),
        kit_id: kit.id.clone(),
        price_cents,
        reason: reason.to_owned(),
        rejected_at,
    })
}
