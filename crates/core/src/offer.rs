//! Ordered confirmed line items plus the one in-progress item, with the
//! derived cart totals and cross-sell candidates.

use serde::{Deserialize, Serialize};

use crate::domain::offer::{Discount, ItemDraft, OfferItem};
use crate::domain::product::ProductId;
use crate::money::pct_of_cents;
use crate::store::PricingCatalog;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferAccumulator {
    items: Vec<OfferItem>,
    in_progress: Option<ItemDraft>,
    discount: Option<Discount>,
    shipping_cents: i64,
}

impl OfferAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[OfferItem] {
        &self.items
    }

    pub fn in_progress(&self) -> Option<&ItemDraft> {
        self.in_progress.as_ref()
    }

    pub fn in_progress_mut(&mut self) -> Option<&mut ItemDraft> {
        self.in_progress.as_mut()
    }

    pub fn begin_item(&mut self, draft: ItemDraft) {
        self.in_progress = Some(draft);
    }

    pub fn abandon_item(&mut self) -> Option<ItemDraft> {
        self.in_progress.take()
    }

    pub fn confirm_item(&mut self, item: OfferItem) {
        self.items.push(item);
        self.in_progress = None;
    }

    pub fn set_discount(&mut self, discount: Option<Discount>) {
        self.discount = discount;
    }

    pub fn discount(&self) -> Option<&Discount> {
        self.discount.as_ref()
    }

    pub fn set_shipping_cents(&mut self, shipping_cents: i64) {
        self.shipping_cents = shipping_cents;
    }

    pub fn shipping_cents(&self) -> i64 {
        self.shipping_cents
    }

    pub fn has_product(&self) -> bool {
        !self.items.is_empty() || self.in_progress.is_some()
    }

    pub fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(OfferItem::line_total_cents).sum()
    }

    /// Applied once to the summed subtotal, never per item. Deliberately not
    /// clamped: a discount above the subtotal drives the total negative.
    pub fn discount_cents(&self) -> i64 {
        match &self.discount {
            Some(Discount::Percentage(pct)) => pct_of_cents(self.subtotal_cents(), *pct),
            Some(Discount::Fixed(cents)) => *cents,
            None => 0,
        }
    }

    pub fn total_cents(&self) -> i64 {
        self.subtotal_cents() - self.discount_cents() + self.shipping_cents
    }

    pub fn total_commission_cents(&self) -> i64 {
        self.items.iter().map(|item| item.commission_cents).sum()
    }

    /// Union of each confirmed/in-progress item's two cross-sell references,
    /// minus products already in the offer, filtered to active products.
    pub fn cross_sell_candidates<C: PricingCatalog + ?Sized>(&self, catalog: &C) -> Vec<ProductId> {
        let in_offer: Vec<&ProductId> = self
            .items
            .iter()
            .map(|item| &item.product_id)
            .chain(self.in_progress.iter().map(|draft| &draft.product_id))
            .collect();

        let mut candidates = Vec::new();
        for product_id in &in_offer {
            let Some(product) = catalog.product(product_id) else { continue };
            for reference in product.cross_sell_refs() {
                if in_offer.contains(&reference) || candidates.contains(reference) {
                    continue;
                }
                if catalog.product(reference).is_some_and(|candidate| candidate.active) {
                    candidates.push(reference.clone());
                }
            }
        }
        candidates
    }

    pub fn restore(
        items: Vec<OfferItem>,
        in_progress: Option<ItemDraft>,
        discount: Option<Discount>,
        shipping_cents: i64,
    ) -> Self {
        Self { items, in_progress, discount, shipping_cents }
    }
}
