//! Custom domain of the API, shared by every stage through path mappings.

use crate::core::resolver::ResolvedConfig;
use crate::core::types::*;

/// An `A` alias record.
pub fn dns_alias(record_name: &str, target: String) -> DnsRecordSpec {
    DnsRecordSpec {
        record_name: record_name.to_string(),
        record_type: "A".to_string(),
        target,
    }
}

pub fn build(ctx: &ResolvedConfig) -> SynthesizedStack {
    let mut stack =
        SynthesizedStack::new(ctx.stack_name(StackKind::ApiDomain), StackKind::ApiDomain);

    stack.resources.insert(
        "api-certificate".to_string(),
        ResourceSpec::Certificate(CertificateSpec {
            domain_name: ctx.api_domain.clone(),
            subject_alternative_names: Vec::new(),
            validation: "dns".to_string(),
        }),
    );
    stack.resources.insert(
        "api-domain-name".to_string(),
        ResourceSpec::DomainName(DomainNameSpec {
            domain_name: ctx.api_domain.clone(),
            certificate: token("api-certificate", "Arn"),
        }),
    );
    stack.resources.insert(
        "api-dns".to_string(),
        ResourceSpec::DnsRecord(dns_alias(
            &ctx.api_domain,
            token("api-domain-name", "RegionalDomainName"),
        )),
    );

    stack
        .outputs
        .insert("DomainName".to_string(), ctx.api_domain.clone());
    stack
}
