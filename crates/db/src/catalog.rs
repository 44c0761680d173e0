//! Materializes the read-only pricing catalog out of SQLite. The engine
//! consumes the in-memory form; this loader runs once per process or after a
//! catalog refresh.

use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use attendy_core::answers::QuestionDef;
use attendy_core::domain::operator::OrgId;
use attendy_core::domain::outcome::{NonPurchaseReason, ReasonId};
use attendy_core::domain::product::{
    Category, KitId, PriceKit, Product, ProductId, TierCommission, TierPrice,
};
use attendy_core::store::InMemoryCatalog;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

pub async fn load_catalog(pool: &DbPool) -> Result<InMemoryCatalog, CatalogLoadError> {
    let mut catalog = InMemoryCatalog::new();

    let product_rows = sqlx::query("SELECT * FROM product").fetch_all(pool).await?;
    for row in product_rows {
        let product = product_from_row(&row)?;
        let kit_rows =
            sqlx::query("SELECT * FROM price_kit WHERE product_id = ? ORDER BY position")
                .bind(&product.id.0)
                .fetch_all(pool)
                .await?;
        let kits = kit_rows
            .iter()
            .map(kit_from_row)
            .collect::<Result<Vec<PriceKit>, CatalogLoadError>>()?;
        catalog = catalog.with_product(product, kits);
    }

    let reason_rows = sqlx::query("SELECT * FROM non_purchase_reason").fetch_all(pool).await?;
    for row in reason_rows {
        catalog = catalog.with_reason(reason_from_row(&row)?);
    }

    Ok(catalog)
}

fn product_from_row(row: &SqliteRow) -> Result<Product, CatalogLoadError> {
    let category_raw: String = row.try_get("category")?;
    let category = Category::parse(&category_raw)
        .ok_or_else(|| CatalogLoadError::Decode(format!("unknown category `{category_raw}`")))?;
    let questions_json: String = row.try_get("questions_json")?;
    let questions: Vec<QuestionDef> = serde_json::from_str(&questions_json)
        .map_err(|error| CatalogLoadError::Decode(format!("bad question definitions: {error}")))?;

    Ok(Product {
        id: ProductId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        name: row.try_get("name")?,
        category,
        active: row.try_get("active")?,
        cross_sell_1: row.try_get::<Option<String>, _>("cross_sell_1")?.map(ProductId),
        cross_sell_2: row.try_get::<Option<String>, _>("cross_sell_2")?.map(ProductId),
        questions,
    })
}

fn kit_from_row(row: &SqliteRow) -> Result<PriceKit, CatalogLoadError> {
    let position: i64 = row.try_get("position")?;
    let bundle_quantity: i64 = row.try_get("bundle_quantity")?;
    let regular = tier_from_columns(row, "regular_price_cents", "regular_commission_pct")?
        .ok_or_else(|| CatalogLoadError::Decode("kit without a regular price".to_owned()))?;

    Ok(PriceKit {
        id: KitId(row.try_get("id")?),
        product_id: ProductId(row.try_get("product_id")?),
        position: u32::try_from(position)
            .map_err(|_| CatalogLoadError::Decode(format!("bad kit position `{position}`")))?,
        bundle_quantity: u32::try_from(bundle_quantity).map_err(|_| {
            CatalogLoadError::Decode(format!("bad bundle quantity `{bundle_quantity}`"))
        })?,
        default_commission_pct: parse_decimal(&row.try_get::<String, _>(
            "default_commission_pct",
        )?)?,
        regular,
        promotional: tier_from_columns(row, "promotional_price_cents", "promotional_commission_pct")?,
        promotional2: tier_from_columns(
            row,
            "promotional2_price_cents",
            "promotional2_commission_pct",
        )?,
        minimum: tier_from_columns(row, "minimum_price_cents", "minimum_commission_pct")?,
    })
}

/// A NULL price means the tier is not offered; a NULL commission means the
/// kit default applies.
fn tier_from_columns(
    row: &SqliteRow,
    price_column: &str,
    commission_column: &str,
) -> Result<Option<TierPrice>, CatalogLoadError> {
    let price_cents: Option<i64> = row.try_get(price_column)?;
    let Some(price_cents) = price_cents else { return Ok(None) };

    let commission = match row.try_get::<Option<String>, _>(commission_column)? {
        Some(raw) => TierCommission::Custom(parse_decimal(&raw)?),
        None => TierCommission::KitDefault,
    };
    Ok(Some(TierPrice { price_cents, commission }))
}

fn reason_from_row(row: &SqliteRow) -> Result<NonPurchaseReason, CatalogLoadError> {
    Ok(NonPurchaseReason {
        id: ReasonId(row.try_get("id")?),
        org_id: OrgId(row.try_get("org_id")?),
        label: row.try_get("label")?,
        followup_hours: row.try_get("followup_hours")?,
        exclusivity_hours: row.try_get("exclusivity_hours")?,
        webhook_url: row.try_get("webhook_url")?,
    })
}

fn parse_decimal(raw: &str) -> Result<Decimal, CatalogLoadError> {
    Decimal::from_str(raw)
        .map_err(|error| CatalogLoadError::Decode(format!("invalid decimal `{raw}`: {error}")))
}
