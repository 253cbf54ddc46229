//! Per-stage static website.

use super::domain::dns_alias;
use super::SynthState;
use crate::core::resolver::ResolvedConfig;
use crate::core::types::*;

/// Bucket holding the built front-end of a stage.
pub fn website_bucket_name(project: &str, stage: &str) -> String {
    format!("{}-{}-front-end", project, stage)
}

pub fn build(ctx: &ResolvedConfig, state: &SynthState) -> Result<SynthesizedStack, String> {
    let api_url = state.import(&ctx.stack_name(StackKind::Api), "ApiUrl")?;
    let frontend = &ctx.config.frontend;

    let mut domains = vec![ctx.stage.domain.clone()];
    domains.extend(ctx.stage.alternative_domains.iter().cloned());

    let mut stack = SynthesizedStack::new(ctx.stack_name(StackKind::FrontEnd), StackKind::FrontEnd);
    let bucket_name = website_bucket_name(ctx.project(), &ctx.stage_name);

    stack.resources.insert(
        "website-bucket".to_string(),
        ResourceSpec::Bucket(BucketSpec {
            bucket_name: bucket_name.clone(),
            removal_policy: RemovalPolicy::Destroy,
            block_public_access: true,
            cors: Vec::new(),
            website: Some(WebsiteSpec {
                index_document: frontend.index_document.clone(),
                error_document: frontend.error_document.clone(),
            }),
        }),
    );
    stack.resources.insert(
        "website-certificate".to_string(),
        ResourceSpec::Certificate(CertificateSpec {
            domain_name: ctx.stage.domain.clone(),
            subject_alternative_names: ctx.stage.alternative_domains.clone(),
            validation: "dns".to_string(),
        }),
    );

    // Client-side routing: unknown paths render the app shell.
    let rewrite = |status| ErrorResponse {
        http_status: status,
        response_http_status: 200,
        response_page_path: format!("/{}", frontend.error_document),
    };
    stack.resources.insert(
        "website-distribution".to_string(),
        ResourceSpec::Distribution(DistributionSpec {
            origin: token("website-bucket", "RegionalDomainName"),
            domain_names: domains.clone(),
            certificate: Some(token("website-certificate", "Arn")),
            default_root_object: Some(frontend.index_document.clone()),
            error_responses: vec![rewrite(403), rewrite(404)],
            price_class: "PriceClass_100".to_string(),
        }),
    );
    for (i, domain) in domains.iter().enumerate() {
        let id = if i == 0 {
            "website-dns".to_string()
        } else {
            format!("website-dns-{}", i)
        };
        stack.resources.insert(
            id,
            ResourceSpec::DnsRecord(dns_alias(domain, token("website-distribution", "DomainName"))),
        );
    }

    stack.outputs.insert("ApiUrl".to_string(), api_url);
    stack.outputs.insert("WebsiteBucket".to_string(), bucket_name);
    stack
        .outputs
        .insert("Url".to_string(), format!("https://{}", ctx.stage.domain));
    stack.outputs.insert(
        "DistributionDomain".to_string(),
        token("website-distribution", "DomainName"),
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::resolve_stage;
    use crate::stacks::fixtures;
    use indexmap::IndexMap;

    fn state_with_api(stack: &str) -> SynthState {
        let mut state = SynthState::default();
        state.outputs.insert(
            stack.to_string(),
            IndexMap::from([("ApiUrl".to_string(), "https://api.example.org/prod".to_string())]),
        );
        state
    }

    #[test]
    fn test_frontend_stack() {
        let config = fixtures::config();
        let ctx = resolve_stage(&config, "prod").unwrap();
        let stack = build(&ctx, &state_with_api("members-prod-api")).unwrap();
        assert_eq!(stack.name, "members-prod-front-end");
        match &stack.resources["website-distribution"] {
            ResourceSpec::Distribution(d) => {
                assert_eq!(d.domain_names, vec!["app.example.org", "www.example.org"]);
                assert_eq!(d.error_responses.len(), 2);
                assert_eq!(d.error_responses[1].http_status, 404);
                assert_eq!(d.error_responses[1].response_page_path, "/index.html");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(stack.resources.contains_key("website-dns"));
        assert!(stack.resources.contains_key("website-dns-1"));
        assert_eq!(stack.outputs["ApiUrl"], "${import:members-prod-api.ApiUrl}");
        assert_eq!(stack.outputs["Url"], "https://app.example.org");
    }

    #[test]
    fn test_frontend_requires_api_stack() {
        let config = fixtures::config();
        let ctx = resolve_stage(&config, "dev").unwrap();
        let err = build(&ctx, &SynthState::default()).unwrap_err();
        assert!(err.contains("members-dev-api"));
    }
}
