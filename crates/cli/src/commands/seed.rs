use attendy_db::{migrations, DemoDataset};

use crate::commands::{with_pool, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    with_pool("seed", |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        if !verification.all_present {
            return Err(verification_failure(&verification.checks));
        }

        let listing = seeded
            .products_seeded
            .iter()
            .map(|product| {
                format!(
                    "  - {} [{}]: {}",
                    product.product_id, product.category, product.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("demo catalog loaded and verified:\n{listing}"))
    })
}

fn verification_failure(checks: &[(&'static str, bool)]) -> StepFailure {
    let failed: Vec<&str> =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect();
    let message = if failed.is_empty() {
        "Some seed data failed to load".to_owned()
    } else {
        format!("Seed verification failed for checks: {}", failed.join(", "))
    };
    ("seed_verification", message, 6u8)
}

#[cfg(test)]
mod tests {
    use super::verification_failure;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks =
            [("prod-oil-demo", true), ("prod-oil-kit-count", false), ("reason-price", false)];

        let (class, message, exit_code) = verification_failure(&checks);

        assert_eq!(class, "seed_verification");
        assert_eq!(exit_code, 6);
        assert_eq!(
            message,
            "Seed verification failed for checks: prod-oil-kit-count, reason-price"
        );
    }
}
