//! Deterministic demo fixtures: one org with a kit-priced catalog and the
//! non-purchase reason catalog, plus a verification contract the seed
//! command checks after loading.

use sqlx::Executor;

use crate::DbPool;

/// The catalog rows the demo dataset guarantees, checked by [`DemoDataset::verify`].
const SEED_PRODUCTS: &[SeedProductContract] = &[
    SeedProductContract {
        product_id: "prod-oil-demo",
        category: "ready_product",
        active: true,
        expected_kit_count: 2,
        description: "kit-priced product with every tier populated",
    },
    SeedProductContract {
        product_id: "prod-tea-demo",
        category: "ready_product",
        active: true,
        expected_kit_count: 1,
        description: "kit-priced product with a regular tier only",
    },
    SeedProductContract {
        product_id: "prod-caps-demo",
        category: "dropshipping",
        active: true,
        expected_kit_count: 1,
        description: "dropshipping bundle with a custom promotional commission",
    },
    SeedProductContract {
        product_id: "prod-retired-demo",
        category: "ready_product",
        active: false,
        expected_kit_count: 0,
        description: "inactive product excluded from cross-sell",
    },
    SeedProductContract {
        product_id: "prod-manip-demo",
        category: "compounded",
        active: true,
        expected_kit_count: 0,
        description: "per-unit product priced through negotiation",
    },
];

const SEED_REASONS: &[SeedReasonContract] = &[
    SeedReasonContract {
        reason_id: "reason-price",
        followup_hours: Some(24),
        has_webhook: false,
    },
    SeedReasonContract {
        reason_id: "reason-thinking",
        followup_hours: Some(72),
        has_webhook: true,
    },
    SeedReasonContract { reason_id: "reason-wrong-number", followup_hours: None, has_webhook: false },
];

const SEED_PRODUCT_IDS: &[&str] = &[
    "prod-oil-demo",
    "prod-tea-demo",
    "prod-caps-demo",
    "prod-retired-demo",
    "prod-manip-demo",
];

const SEED_KIT_IDS: &[&str] = &["kit-oil-6", "kit-oil-12", "kit-tea-3", "kit-caps-4"];

const SEED_REASON_IDS: &[&str] = &["reason-price", "reason-thinking", "reason-wrong-number"];

pub struct DemoDataset;

impl DemoDataset {
    /// SQL fixture content for the demo catalog.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Loads the demo catalog. Reloading replaces the same rows, so repeated
    /// seed runs stay idempotent.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, sqlx::Error> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let products_seeded = SEED_PRODUCTS
            .iter()
            .map(|product| ProductSeedInfo {
                product_id: product.product_id,
                category: product.category,
                description: product.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { products_seeded })
    }

    /// Verifies the seeded rows match the contract above.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, sqlx::Error> {
        let mut checks = Vec::new();

        for product in SEED_PRODUCTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM product WHERE id = ?1 AND category = ?2 AND active = ?3)",
            )
            .bind(product.product_id)
            .bind(product.category)
            .bind(product.active)
            .fetch_one(pool)
            .await?;
            checks.push((product.product_id, exists == 1));

            let kit_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM price_kit WHERE product_id = ?1")
                    .bind(product.product_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((product.kit_count_label(), kit_count == product.expected_kit_count));
        }

        // The promotional tier of the first demo kit anchors the pricing
        // tests; a drifted fixture would make them meaningless.
        let promo_price: Option<i64> = sqlx::query_scalar(
            "SELECT promotional_price_cents FROM price_kit WHERE id = 'kit-oil-6'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("kit-oil-6-promotional-price", promo_price == Some(113_400)));

        for reason in SEED_REASONS {
            let matches: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM non_purchase_reason
                 WHERE id = ?1 AND followup_hours IS ?2 AND (webhook_url IS NOT NULL) = ?3)",
            )
            .bind(reason.reason_id)
            .bind(reason.followup_hours)
            .bind(reason.has_webhook)
            .fetch_one(pool)
            .await?;
            checks.push((reason.reason_id, matches == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM price_kit WHERE id IN {}",
            sql_array_from_ids(SEED_KIT_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM product WHERE id IN {}",
            sql_array_from_ids(SEED_PRODUCT_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM non_purchase_reason WHERE id IN {}",
            sql_array_from_ids(SEED_REASON_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedProductContract {
    product_id: &'static str,
    category: &'static str,
    active: bool,
    expected_kit_count: i64,
    description: &'static str,
}

impl SeedProductContract {
    fn kit_count_label(&self) -> &'static str {
        match self.product_id {
            "prod-oil-demo" => "prod-oil-kit-count",
            "prod-tea-demo" => "prod-tea-kit-count",
            "prod-caps-demo" => "prod-caps-kit-count",
            "prod-retired-demo" => "prod-retired-kit-count",
            _ => "prod-manip-kit-count",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedReasonContract {
    reason_id: &'static str,
    followup_hours: Option<i64>,
    has_webhook: bool,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub products_seeded: Vec<ProductSeedInfo>,
}

#[derive(Debug)]
pub struct ProductSeedInfo {
    pub product_id: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
