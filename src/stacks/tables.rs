//! Data-store provisioning.

use super::{logical_id, ComputeUnits, SynthState};
use crate::core::resolver::ResolvedConfig;
use crate::core::types::*;
use indexmap::IndexMap;

/// Physical table name: `{stack_id}_{logical}`.
pub fn table_name(stack_id: &str, logical: &str) -> String {
    format!("{}_{}", stack_id, logical)
}

/// Environment binding key publishing a table's physical name.
pub fn table_binding(logical: &str) -> String {
    format!("DDB_TABLE_{}", logical)
}

/// One table per schema. Every unit gets read/write on every table and a
/// `DDB_TABLE_<logical>` binding. Returns (logical id, table) pairs in
/// declaration order.
pub fn provision_tables(
    stack_id: &str,
    schemas: &IndexMap<String, TableSchema>,
    removal_policy: RemovalPolicy,
    units: &mut ComputeUnits,
) -> Vec<(String, TableSpec)> {
    let mut out = Vec::with_capacity(schemas.len());
    for (logical, schema) in schemas {
        let physical = table_name(stack_id, logical);
        let table = TableSpec {
            table_name: physical.clone(),
            partition_key: schema.partition_key.clone(),
            sort_key: schema.sort_key.clone(),
            indexes: schema.indexes.clone(),
            stream: schema.stream,
            time_to_live_attribute: schema.expires_at.clone(),
            billing_mode: "PAY_PER_REQUEST".to_string(),
            point_in_time_recovery: removal_policy == RemovalPolicy::Retain,
            removal_policy,
            read_write: units.logical_ids(),
        };
        units.bind_all(&table_binding(logical), &physical);
        out.push((logical_id(logical, "table"), table));
    }
    out
}

/// Output publishing a shared table's physical name.
pub fn shared_table_output(logical: &str) -> String {
    format!("{}TableName", logical)
}

/// The stage-independent shared tables stack, always retained. No compute
/// unit lives here; the API stack grants access through
/// [`bind_shared`] and the shared tables policy.
pub fn build_shared(ctx: &ResolvedConfig) -> SynthesizedStack {
    let name = ctx.stack_name(StackKind::SharedTables);
    let tables = provision_tables(
        &name,
        &ctx.config.shared_tables,
        RemovalPolicy::Retain,
        &mut ComputeUnits::default(),
    );
    let mut stack = SynthesizedStack::new(name, StackKind::SharedTables);
    for (id, table) in tables {
        stack
            .outputs
            .insert(shared_table_output(id.trim_end_matches("-table")), table.table_name.clone());
        stack.resources.insert(id, ResourceSpec::Table(table));
    }
    stack
}

/// Publish `DDB_TABLE_<logical>` for every shared table on every unit,
/// imported from the shared tables stack.
pub fn bind_shared(
    ctx: &ResolvedConfig,
    state: &SynthState,
    units: &mut ComputeUnits,
) -> Result<(), String> {
    let shared_stack = ctx.stack_name(StackKind::SharedTables);
    for logical in ctx.config.shared_tables.keys() {
        let name = state.import(&shared_stack, &shared_table_output(logical))?;
        units.bind_all(&table_binding(logical), &name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::resolve_stage;
    use crate::stacks::api::provision_units;
    use crate::stacks::fixtures;

    #[test]
    fn test_physical_names_and_grants() {
        let config = fixtures::config();
        let ctx = resolve_stage(&config, "dev").unwrap();
        let mut units = provision_units(&ctx, &fixtures::document()).units;
        let tables = provision_tables(
            "members-dev-api",
            &config.tables,
            RemovalPolicy::Destroy,
            &mut units,
        );
        assert_eq!(tables.len(), 2);
        let (id, books) = &tables[0];
        assert_eq!(id, "books-table");
        assert_eq!(books.table_name, "members-dev-api_books");
        assert_eq!(books.read_write, units.logical_ids());
        assert_eq!(books.removal_policy, RemovalPolicy::Destroy);
        assert_eq!(books.indexes[0].name, "byTitle");

        let (_, sessions) = &tables[1];
        assert_eq!(sessions.sort_key.as_ref().unwrap().name, "userId");
        assert_eq!(sessions.stream, Some(StreamMode::NewAndOldImages));
        assert_eq!(sessions.time_to_live_attribute.as_deref(), Some("expiresAt"));

        for unit in units.units.values() {
            assert_eq!(
                unit.function.environment["DDB_TABLE_books"],
                "members-dev-api_books"
            );
            assert_eq!(
                unit.function.environment["DDB_TABLE_sessions"],
                "members-dev-api_sessions"
            );
        }
    }

    #[test]
    fn test_retain_policy() {
        let config = fixtures::config();
        let mut units = ComputeUnits::default();
        let tables = provision_tables("s", &config.tables, RemovalPolicy::Retain, &mut units);
        assert!(tables
            .iter()
            .all(|(_, t)| t.removal_policy == RemovalPolicy::Retain && t.point_in_time_recovery));
    }

    #[test]
    fn test_shared_stack() {
        let config = fixtures::config();
        let ctx = resolve_stage(&config, "dev").unwrap();
        let stack = build_shared(&ctx);
        assert_eq!(stack.name, "members-shared-tables");
        assert!(!stack.stage_dependent);
        match &stack.resources["badges-table"] {
            ResourceSpec::Table(t) => {
                assert_eq!(t.table_name, "members-shared-tables_badges");
                assert!(t.read_write.is_empty());
                assert_eq!(t.removal_policy, RemovalPolicy::Retain);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stack.outputs["badgesTableName"], "members-shared-tables_badges");
    }

    #[test]
    fn test_bind_shared() {
        let config = fixtures::config();
        let ctx = resolve_stage(&config, "dev").unwrap();
        let mut units = provision_units(&ctx, &fixtures::document()).units;

        let mut state = SynthState::default();
        assert!(bind_shared(&ctx, &state, &mut units)
            .unwrap_err()
            .contains("members-shared-tables"));

        let shared = build_shared(&ctx);
        state.outputs.insert(shared.name.clone(), shared.outputs);
        bind_shared(&ctx, &state, &mut units).unwrap();
        for unit in units.units.values() {
            assert_eq!(
                unit.function.environment["DDB_TABLE_badges"],
                "${import:members-shared-tables.badgesTableName}"
            );
        }
    }
}
