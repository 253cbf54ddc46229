//! User pool shared by every stage.

use crate::core::resolver::ResolvedConfig;
use crate::core::types::*;

pub fn build(ctx: &ResolvedConfig) -> SynthesizedStack {
    let mut stack =
        SynthesizedStack::new(ctx.stack_name(StackKind::Identity), StackKind::Identity);

    stack.resources.insert(
        "user-pool".to_string(),
        ResourceSpec::UserPool(UserPoolSpec {
            user_pool_name: ctx.user_pool_name.clone(),
            sign_in_aliases: vec!["email".to_string()],
            self_sign_up_enabled: ctx.config.identity.self_sign_up,
            removal_policy: RemovalPolicy::Retain,
        }),
    );
    stack.resources.insert(
        "user-pool-client".to_string(),
        ResourceSpec::UserPoolClient(UserPoolClientSpec {
            user_pool: token("user-pool", "UserPoolId"),
            client_name: format!("{}-client", ctx.project()),
            generate_secret: false,
        }),
    );

    stack
        .outputs
        .insert("UserPoolId".to_string(), token("user-pool", "UserPoolId"));
    stack
        .outputs
        .insert("UserPoolArn".to_string(), token("user-pool", "Arn"));
    stack.outputs.insert(
        "UserPoolClientId".to_string(),
        token("user-pool-client", "ClientId"),
    );
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::resolve_stage;
    use crate::stacks::fixtures;

    #[test]
    fn test_identity_stack() {
        let mut config = fixtures::config();
        config.identity.self_sign_up = true;
        let ctx = resolve_stage(&config, "dev").unwrap();
        let stack = build(&ctx);
        assert_eq!(stack.name, "members-identity");
        match &stack.resources["user-pool"] {
            ResourceSpec::UserPool(p) => {
                assert_eq!(p.user_pool_name, "members");
                assert!(p.self_sign_up_enabled);
                assert_eq!(p.sign_in_aliases, vec!["email"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stack.outputs["UserPoolId"], "${user-pool.UserPoolId}");
        assert_eq!(stack.outputs.len(), 3);
    }
}
