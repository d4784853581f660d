use anyhow::{Context, Result};
use tracing::debug;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{package::PackageDocument, StoredObject},
    },
};

#[derive(Clone, Copy)]
struct FieldIndexSpec {
    index_name: &'static str,
    table: &'static str,
    fields: &'static str,
}

impl FieldIndexSpec {
    fn definition(&self) -> String {
        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {fields};",
            index = self.index_name,
            table = self.table,
            fields = self.fields,
        )
    }
}

fn package_index_specs() -> [FieldIndexSpec; 5] {
    let table = PackageDocument::table_name();
    [
        FieldIndexSpec {
            index_name: "idx_package_identifier",
            table,
            fields: "identifier UNIQUE",
        },
        FieldIndexSpec {
            index_name: "idx_package_hotness",
            table,
            fields: "hotness",
        },
        FieldIndexSpec {
            index_name: "idx_package_updated",
            table,
            fields: "updated",
        },
        FieldIndexSpec {
            index_name: "idx_package_tags",
            table,
            fields: "tags",
        },
        FieldIndexSpec {
            index_name: "idx_package_expires_at",
            table,
            fields: "expires_at",
        },
    ]
}

/// Defines the ordering, membership and expiry indexes on the package table.
/// Idempotent: safe to call on every start.
pub async fn ensure_package_indexes(db: &SurrealDbClient) -> Result<(), AppError> {
    ensure_package_indexes_inner(db)
        .await
        .map_err(|err| AppError::InternalError(err.to_string()))
}

async fn ensure_package_indexes_inner(db: &SurrealDbClient) -> Result<()> {
    for spec in package_index_specs() {
        let res = db
            .client
            .query(spec.definition())
            .await
            .with_context(|| format!("creating index {} on table {}", spec.index_name, spec.table))?;
        res.check()
            .with_context(|| format!("index definition failed for {}", spec.index_name))?;

        debug!(index = spec.index_name, table = spec.table, "Index ensured");
    }

    Ok(())
}
