use attendy_db::migrations;

use crate::commands::{with_pool, CommandResult};

pub fn run() -> CommandResult {
    with_pool("migrate", |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        Ok("applied pending migrations".to_owned())
    })
}
