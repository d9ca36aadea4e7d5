// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain ownership challenges and checks.
//!
//! Each domain gets one TXT challenge (`<prefix>.<domain>`) and one HTTP
//! challenge (`http://<domain><path>/<uid>`), generated once and kept in
//! status. Every due attempt checks both; either one passing verifies the
//! domain.

use crate::config::DomainVerificationConfig;
use crate::constants::VERIFICATION_TOKEN_LENGTH;
use crate::crd::{Condition, DNSVerificationRecord, Domain, DomainVerificationStatus, HTTPVerificationToken};
use crate::errors::VerificationError;
use crate::reconcilers::status::create_condition;
use crate::status_reasons::{
    CONDITION_TYPE_VERIFIED, REASON_PENDING_VERIFICATION, REASON_VERIFICATION_INTERNAL_ERROR,
    REASON_VERIFICATION_RECORD_NOT_FOUND, REASON_VERIFIED, STATUS_FALSE, STATUS_TRUE,
};
use crate::verification::{DnsResolver, HttpFetcher};
use kube::ResourceExt;
use rand::distr::{Alphanumeric, SampleString};

/// Result of one verification method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Verified,
    /// Challenge missing or different; retried on the schedule
    NotFound(String),
    /// Transient failure; retried on the schedule
    Pending(String),
    Internal(String),
}

impl CheckOutcome {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        *self == CheckOutcome::Verified
    }

    fn from_error(err: &VerificationError) -> Self {
        match err {
            VerificationError::RecordNotFound { .. } => CheckOutcome::NotFound(err.to_string()),
            VerificationError::Transient { .. } => CheckOutcome::Pending(err.to_string()),
            VerificationError::Internal { .. } => CheckOutcome::Internal(err.to_string()),
        }
    }

    /// Condition of type `condition_type` describing this outcome.
    #[must_use]
    pub fn condition(&self, condition_type: &str, generation: Option<i64>) -> Condition {
        match self {
            CheckOutcome::Verified => create_condition(
                condition_type,
                STATUS_TRUE,
                REASON_VERIFIED,
                "Challenge found",
                generation,
            ),
            CheckOutcome::NotFound(message) => create_condition(
                condition_type,
                STATUS_FALSE,
                REASON_VERIFICATION_RECORD_NOT_FOUND,
                message,
                generation,
            ),
            CheckOutcome::Pending(message) => create_condition(
                condition_type,
                STATUS_FALSE,
                REASON_PENDING_VERIFICATION,
                message,
                generation,
            ),
            CheckOutcome::Internal(message) => create_condition(
                condition_type,
                STATUS_FALSE,
                REASON_VERIFICATION_INTERNAL_ERROR,
                message,
                generation,
            ),
        }
    }
}

/// Random challenge token.
#[must_use]
pub fn generate_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), VERIFICATION_TOKEN_LENGTH)
}

/// Return the domain's challenges, generating the missing ones.
#[must_use]
pub fn ensure_challenges(
    domain: &Domain,
    current: Option<&DomainVerificationStatus>,
    config: &DomainVerificationConfig,
) -> DomainVerificationStatus {
    let mut verification = current.cloned().unwrap_or_default();
    let name = domain.spec.domain_name.trim_end_matches('.').to_ascii_lowercase();

    if verification.dns_record.is_none() {
        verification.dns_record = Some(DNSVerificationRecord {
            name: format!("{}.{name}", config.txt_record_prefix),
            r#type: "TXT".to_string(),
            content: generate_token(),
        });
    }
    if verification.http_token.is_none() {
        let path = config.http_token_path.trim_end_matches('/');
        verification.http_token = Some(HTTPVerificationToken {
            url: format!("http://{name}{path}/{}", domain.uid().unwrap_or_default()),
            body: generate_token(),
        });
    }
    verification
}

/// Check the TXT challenge.
pub async fn check_dns(resolver: &dyn DnsResolver, record: &DNSVerificationRecord) -> CheckOutcome {
    match resolver.lookup_txt(&record.name).await {
        Ok(values) if values.iter().any(|v| v.trim() == record.content) => CheckOutcome::Verified,
        Ok(_) => CheckOutcome::NotFound(format!(
            "TXT record {} does not contain the expected value",
            record.name
        )),
        Err(e) => CheckOutcome::from_error(&e),
    }
}

/// Check the HTTP challenge.
pub async fn check_http(fetcher: &dyn HttpFetcher, token: &HTTPVerificationToken) -> CheckOutcome {
    match fetcher.get(&token.url).await {
        Ok(response) if response.status == 200 && response.body.trim() == token.body => {
            CheckOutcome::Verified
        }
        Ok(response) if response.status == 200 => CheckOutcome::NotFound(format!(
            "{} does not serve the expected token",
            token.url
        )),
        Ok(response) => CheckOutcome::NotFound(format!(
            "{} answered HTTP {}",
            token.url, response.status
        )),
        Err(e) => CheckOutcome::from_error(&e),
    }
}

/// Overall `Verified` condition from the two method outcomes.
///
/// Any success verifies. Otherwise the most actionable failure is reported:
/// internal errors first, then transient ones, then missing challenges.
#[must_use]
pub fn verified_condition(dns: &CheckOutcome, http: &CheckOutcome, generation: Option<i64>) -> Condition {
    if dns.is_verified() || http.is_verified() {
        return CheckOutcome::Verified.condition(CONDITION_TYPE_VERIFIED, generation);
    }
    let pick = [dns, http]
        .into_iter()
        .find(|o| matches!(o, CheckOutcome::Internal(_)))
        .or_else(|| [dns, http].into_iter().find(|o| matches!(o, CheckOutcome::Pending(_))))
        .unwrap_or(dns);
    let mut condition = pick.condition(CONDITION_TYPE_VERIFIED, generation);
    if matches!(pick, CheckOutcome::NotFound(_)) {
        condition.message = "Neither the DNS nor the HTTP challenge was found".to_string();
    }
    condition
}

#[cfg(test)]
#[path = "verification_tests.rs"]
mod verification_tests;
