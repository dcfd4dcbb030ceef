//! Recipient and blocklist checks
//!
//! Two gates applied to every federated activity: identifiers must not
//! be blocked (exact path-normalized IRI match or blocked-instance
//! substring), and the audience must name this instance somewhere.

use url::Url;

use crate::config::FederationConfig;
use crate::error::{AppError, Result};
use crate::federation::vocab::Activity;

/// Applies blocklist and audience gates
#[derive(Debug, Clone)]
pub struct AudienceValidator {
    local_host: String,
    blocked_iris: Vec<String>,
    blocked_instances: Vec<String>,
}

impl AudienceValidator {
    pub fn new(local_host: impl Into<String>, federation: &FederationConfig) -> Self {
        Self {
            local_host: local_host.into(),
            blocked_iris: federation
                .blocked_iris
                .iter()
                .map(|iri| normalize(iri))
                .collect(),
            blocked_instances: federation.blocked_instances.clone(),
        }
    }

    /// Reject blocked identifiers
    ///
    /// A hit on either list is a terminal method-not-allowed failure,
    /// deliberately distinct from ordinary validation errors.
    pub fn check_blocked(&self, iri: &str) -> Result<()> {
        if iri.is_empty() {
            return Ok(());
        }
        let normalized = normalize(iri);
        if self.blocked_iris.iter().any(|b| *b == normalized) {
            return Err(AppError::MethodNotAllowed(format!("{iri} is blocked")));
        }
        if self
            .blocked_instances
            .iter()
            .any(|instance| iri.contains(instance.as_str()))
        {
            return Err(AppError::MethodNotAllowed(format!(
                "{iri} belongs to a blocked instance"
            )));
        }
        Ok(())
    }

    /// An IRI is local when it is empty, a bare path, or carries our host
    pub fn is_local(&self, iri: &str) -> bool {
        if iri.is_empty() || iri.starts_with('/') {
            return true;
        }
        match Url::parse(iri) {
            Ok(url) => url.host_str() == Some(self.local_host.as_str()),
            Err(_) => iri == self.local_host,
        }
    }

    /// De-duplicate recipients, then require the local host somewhere in
    /// the audience or linkage fields
    pub fn validate_recipients(&self, activity: &mut Activity) -> Result<()> {
        dedupe(&mut activity.to);
        dedupe(&mut activity.cc);
        dedupe(&mut activity.bto);
        dedupe(&mut activity.bcc);

        let names_local = |iris: &[String]| iris.iter().any(|iri| iri.contains(&self.local_host));

        let actor = activity.actor_iri().to_string();
        let linkage = [
            actor,
            activity.in_reply_to.clone().unwrap_or_default(),
            activity.context.clone().unwrap_or_default(),
        ];

        if names_local(&activity.to)
            || names_local(&activity.cc)
            || names_local(&activity.bto)
            || names_local(&activity.bcc)
            || names_local(&linkage)
        {
            return Ok(());
        }
        Err(AppError::NotValid(
            "local instance can not be found in the recipients list".to_string(),
        ))
    }
}

/// Path-normalized form used for exact blocklist comparison
fn normalize(iri: &str) -> String {
    match Url::parse(iri) {
        Ok(url) => {
            let mut out = url.clone();
            let cleaned = clean_path(url.path());
            out.set_path(&cleaned);
            out.to_string().trim_end_matches('/').to_string()
        }
        Err(_) => iri.trim_end_matches('/').to_string(),
    }
}

fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

fn dedupe(iris: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    iris.retain(|iri| seen.insert(iri.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::vocab::{ActivityKind, ActorOrLink, PUBLIC_IRI};

    fn validator() -> AudienceValidator {
        AudienceValidator::new(
            "local.example",
            &FederationConfig {
                page_size: 50,
                blocked_iris: vec!["https://example.com/actors/jonathan.doe".to_string()],
                blocked_instances: vec!["blocked.example".to_string()],
            },
        )
    }

    #[test]
    fn blocked_iri_matches_after_path_normalization() {
        let v = validator();
        let err = v
            .check_blocked("https://example.com/actors/../actors/./jonathan.doe")
            .unwrap_err();
        assert!(matches!(err, AppError::MethodNotAllowed(_)));
        assert!(v.check_blocked("https://example.com/actors/jane.doe").is_ok());
    }

    #[test]
    fn blocked_instance_matches_by_substring() {
        let v = validator();
        assert!(v
            .check_blocked("https://sub.blocked.example/users/any")
            .is_err());
        assert!(v.check_blocked("https://fine.example/users/any").is_ok());
    }

    #[test]
    fn local_iri_detection() {
        let v = validator();
        assert!(v.is_local("https://local.example/api/self"));
        assert!(v.is_local("/api/actors/aabbccdd"));
        assert!(v.is_local(""));
        assert!(!v.is_local("https://remote.example/users/bob"));
    }

    #[test]
    fn audience_without_local_host_fails_until_cc_names_it() {
        let v = validator();
        let mut act = Activity::new(ActivityKind::Create);
        act.actor = Some(ActorOrLink::Link(
            "https://remote.example/users/bob".to_string(),
        ));
        act.to = vec![PUBLIC_IRI.to_string()];
        assert!(v.validate_recipients(&mut act).is_err());

        act.cc = vec!["https://local.example/api/self".to_string()];
        assert!(v.validate_recipients(&mut act).is_ok());
    }

    #[test]
    fn recipients_are_deduplicated() {
        let v = validator();
        let mut act = Activity::new(ActivityKind::Create);
        act.to = vec![
            "https://local.example/api/self".to_string(),
            "https://local.example/api/self".to_string(),
        ];
        v.validate_recipients(&mut act).unwrap();
        assert_eq!(act.to.len(), 1);
    }

    #[test]
    fn local_actor_satisfies_the_audience_gate() {
        let v = validator();
        let mut act = Activity::new(ActivityKind::Like);
        act.actor = Some(ActorOrLink::Link(
            "https://local.example/api/actors/aabbccdd".to_string(),
        ));
        assert!(v.validate_recipients(&mut act).is_ok());
    }
}
