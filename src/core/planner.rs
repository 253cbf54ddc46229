//! Plan generation: diff a synthesis against the previous lock.

use super::types::*;
use crate::provenance::hasher;

/// Hash of a resource's canonical JSON form.
pub fn hash_resource(spec: &ResourceSpec) -> Result<String, String> {
    hasher::hash_value(spec)
}

/// Compare every synthesized resource with the lock. Resources only present
/// in the lock are planned for destruction, after everything else.
pub fn plan(app: &SynthesizedApp, lock: Option<&SynthLock>) -> Result<SynthPlan, String> {
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for (resource_id, stack, spec) in app.qualified_resources() {
        let hash = hash_resource(spec)?;
        let action = match lock.and_then(|l| l.resources.get(&resource_id)) {
            None => PlanAction::Create,
            Some(rl) if rl.hash == hash => PlanAction::NoOp,
            Some(_) => PlanAction::Update,
        };
        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::NoOp => unchanged += 1,
            PlanAction::Destroy => to_destroy += 1,
        }
        changes.push(PlannedChange {
            description: describe_action(&resource_id, spec, &action),
            resource_id,
            stack: stack.name.clone(),
            resource_type: spec.kind().to_string(),
            action,
        });
    }

    if let Some(lock) = lock {
        for (resource_id, rl) in &lock.resources {
            let still_present = changes.iter().any(|c| &c.resource_id == resource_id);
            if still_present {
                continue;
            }
            to_destroy += 1;
            changes.push(PlannedChange {
                resource_id: resource_id.clone(),
                stack: rl.stack.clone(),
                resource_type: rl.resource_type.clone(),
                action: PlanAction::Destroy,
                description: format!("{}: destroy {}", resource_id, rl.resource_type),
            });
        }
    }

    Ok(SynthPlan {
        project: app.project.clone(),
        stage: app.stage.clone(),
        changes,
        build_order: app.build_order.clone(),
        to_create,
        to_update,
        to_destroy,
        unchanged,
    })
}

/// Human-readable description of a planned action.
fn describe_action(resource_id: &str, spec: &ResourceSpec, action: &PlanAction) -> String {
    match action {
        PlanAction::Create => match spec {
            ResourceSpec::Function(f) => format!("{}: create function {}", resource_id, f.function_name),
            ResourceSpec::Table(t) => format!("{}: create table {}", resource_id, t.table_name),
            ResourceSpec::Bucket(b) => format!("{}: create bucket {}", resource_id, b.bucket_name),
            ResourceSpec::Policy(p) => format!(
                "{}: create policy {} ({} attachments)",
                resource_id,
                p.policy_name,
                p.attached_to.len()
            ),
            ResourceSpec::DnsRecord(r) => {
                format!("{}: create {} record {}", resource_id, r.record_type, r.record_name)
            }
            other => format!("{}: create {}", resource_id, other.kind()),
        },
        PlanAction::Update => format!("{}: update (definition changed)", resource_id),
        PlanAction::Destroy => format!("{}: destroy", resource_id),
        PlanAction::NoOp => format!("{}: no changes", resource_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::lock_from_app;
    use crate::stacks::fixtures;
    use proptest::prelude::*;

    #[test]
    fn test_plan_all_create() {
        let app = fixtures::app("dev");
        let plan = plan(&app, None).unwrap();
        assert_eq!(plan.to_create as usize, app.resource_count());
        assert_eq!(plan.unchanged, 0);
        assert!(plan.changes.iter().all(|c| c.action == PlanAction::Create));
    }

    #[test]
    fn test_plan_all_unchanged() {
        let app = fixtures::app("dev");
        let lock = lock_from_app(&app, InputHashes::default()).unwrap();
        let again = fixtures::app("dev");
        let plan = plan(&again, Some(&lock)).unwrap();
        assert_eq!(plan.unchanged as usize, app.resource_count());
        assert_eq!(plan.to_create + plan.to_update + plan.to_destroy, 0);
    }

    #[test]
    fn test_plan_update_on_hash_mismatch() {
        let app = fixtures::app("dev");
        let mut lock = lock_from_app(&app, InputHashes::default()).unwrap();
        lock.resources["members-dev-api/books-table"].hash = "blake3:stale".to_string();
        let plan = plan(&app, Some(&lock)).unwrap();
        assert_eq!(plan.to_update, 1);
        let change = plan
            .changes
            .iter()
            .find(|c| c.action == PlanAction::Update)
            .unwrap();
        assert_eq!(change.resource_id, "members-dev-api/books-table");
        assert_eq!(change.resource_type, "table");
    }

    #[test]
    fn test_plan_destroy_removed_resource() {
        let app = fixtures::app("dev");
        let mut lock = lock_from_app(&app, InputHashes::default()).unwrap();
        lock.resources.insert(
            "members-dev-api/polls-table".to_string(),
            ResourceLock {
                resource_type: "table".to_string(),
                stack: "members-dev-api".to_string(),
                hash: "blake3:old".to_string(),
            },
        );
        let plan = plan(&app, Some(&lock)).unwrap();
        assert_eq!(plan.to_destroy, 1);
        let last = plan.changes.last().unwrap();
        assert_eq!(last.action, PlanAction::Destroy);
        assert_eq!(last.stack, "members-dev-api");
    }

    #[test]
    fn test_describe_action() {
        let app = fixtures::app("dev");
        let plan = plan(&app, None).unwrap();
        let books = plan
            .changes
            .iter()
            .find(|c| c.resource_id == "members-dev-api/books-function")
            .unwrap();
        assert!(books.description.contains("members_dev_books"));
    }

    #[test]
    fn test_hash_resource_deterministic() {
        let app = fixtures::app("dev");
        let (_, _, spec) = &app.qualified_resources()[0];
        let h1 = hash_resource(spec).unwrap();
        let h2 = hash_resource(spec).unwrap();
        assert_eq!(h1, h2);
        assert!(h1.starts_with("blake3:"));
    }

    proptest! {
        /// Re-synthesis is a no-op for any stage name.
        #[test]
        fn prop_resynthesis_is_noop(stage in "[a-z][a-z0-9]{0,8}") {
            let mut config = fixtures::config();
            config.stages.insert(
                stage.clone(),
                Stage {
                    domain: format!("{}.example.org", stage),
                    alternative_domains: vec![],
                    retain_data: false,
                },
            );
            let ctx = crate::core::resolver::resolve_stage(&config, &stage).unwrap();
            let first = crate::core::synth::synthesize_document(&ctx, fixtures::document(), vec![]).unwrap();
            let second = crate::core::synth::synthesize_document(&ctx, fixtures::document(), vec![]).unwrap();
            prop_assert_eq!(&first, &second);
            let lock = lock_from_app(&first, InputHashes::default()).unwrap();
            let plan = plan(&second, Some(&lock)).unwrap();
            prop_assert_eq!(plan.unchanged as usize, second.resource_count());
        }
    }
}
