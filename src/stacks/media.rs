//! Shared media bucket and its CDN.

use super::domain::dns_alias;
use crate::core::resolver::ResolvedConfig;
use crate::core::types::*;

/// Browser uploads go straight to the bucket with presigned URLs.
fn upload_cors() -> CorsRule {
    CorsRule {
        allowed_origins: vec!["*".to_string()],
        allowed_methods: ["GET", "PUT", "POST", "DELETE", "HEAD"]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        allowed_headers: vec!["*".to_string()],
        max_age_seconds: 3000,
    }
}

pub fn build(ctx: &ResolvedConfig) -> SynthesizedStack {
    let mut stack = SynthesizedStack::new(ctx.stack_name(StackKind::Media), StackKind::Media);

    stack.resources.insert(
        "media-bucket".to_string(),
        ResourceSpec::Bucket(BucketSpec {
            bucket_name: ctx.media_bucket.clone(),
            removal_policy: RemovalPolicy::Retain,
            block_public_access: true,
            cors: vec![upload_cors()],
            website: None,
        }),
    );
    stack.resources.insert(
        "media-certificate".to_string(),
        ResourceSpec::Certificate(CertificateSpec {
            domain_name: ctx.media_domain.clone(),
            subject_alternative_names: Vec::new(),
            validation: "dns".to_string(),
        }),
    );
    stack.resources.insert(
        "media-distribution".to_string(),
        ResourceSpec::Distribution(DistributionSpec {
            origin: token("media-bucket", "RegionalDomainName"),
            domain_names: vec![ctx.media_domain.clone()],
            certificate: Some(token("media-certificate", "Arn")),
            default_root_object: None,
            error_responses: Vec::new(),
            price_class: "PriceClass_100".to_string(),
        }),
    );
    stack.resources.insert(
        "media-dns".to_string(),
        ResourceSpec::DnsRecord(dns_alias(
            &ctx.media_domain,
            token("media-distribution", "DomainName"),
        )),
    );

    stack
        .outputs
        .insert("BucketName".to_string(), ctx.media_bucket.clone());
    stack
        .outputs
        .insert("BucketArn".to_string(), format!("arn:aws:s3:::{}", ctx.media_bucket));
    stack
        .outputs
        .insert("MediaDomain".to_string(), ctx.media_domain.clone());
    stack.outputs.insert(
        "DistributionDomain".to_string(),
        token("media-distribution", "DomainName"),
    );
    stack
}
