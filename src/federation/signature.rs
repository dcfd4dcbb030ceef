//! HTTP signature verification and caller resolution
//!
//! Requests carry a draft-cavage Signature header whose keyId names the
//! signing actor's public key. Verification reconstructs the signing
//! string over `(request-target)`, `host`, `date` (and `digest` when a
//! body is present) and checks it against the actor's stored RSA key.
//!
//! Resolution is deliberately lenient: a missing or failing signature
//! degrades the caller to the anonymous account instead of rejecting the
//! request. Endpoints that require a real identity enforce that
//! themselves.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::pkcs1v15::Signature as Pkcs1v15Signature;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::domain::{Account, AccountFilter, Repository};
use crate::error::{AppError, Result};
use crate::federation::audience::AudienceValidator;
use crate::federation::mapper::Mapper;
use crate::metrics::SIGNATURES_VERIFIED;

/// Acceptable clock skew on the Date header
const MAX_DATE_SKEW_SECONDS: i64 = 300;

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub key_id: String,
    pub algorithm: String,
    pub headers: Vec<String>,
    pub signature: String,
}

/// Parse a `keyId="...",algorithm="...",headers="...",signature="..."`
/// header value
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| AppError::NotValid("missing keyId".to_string()))?,
        algorithm: algorithm
            .ok_or_else(|| AppError::NotValid("missing algorithm".to_string()))?,
        headers: headers.ok_or_else(|| AppError::NotValid("missing headers".to_string()))?,
        signature: signature
            .ok_or_else(|| AppError::NotValid("missing signature".to_string()))?,
    })
}

/// `SHA-256=base64(hash)` digest over the request body
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("SHA-256={}", BASE64.encode(hasher.finalize()))
}

/// The actor an authenticated keyId belongs to, without the fragment
pub fn key_id_actor(key_id: &str) -> &str {
    key_id.split('#').next().unwrap_or(key_id)
}

/// Verify the Signature header of a request against a PEM public key
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &http::HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
) -> Result<()> {
    let signature_header = headers
        .get("signature")
        .ok_or_else(|| AppError::NotValid("missing Signature header".to_string()))?
        .to_str()
        .map_err(|_| AppError::NotValid("invalid Signature header".to_string()))?;

    let parsed = parse_signature_header(signature_header)?;

    if parsed.algorithm != "rsa-sha256" && parsed.algorithm != "hs2019" {
        return Err(AppError::NotValid(format!(
            "unsupported signature algorithm {}",
            parsed.algorithm
        )));
    }

    for required in ["(request-target)", "host", "date"] {
        if !parsed.headers.iter().any(|h| h == required) {
            return Err(AppError::NotValid(format!(
                "signed headers must include {required}"
            )));
        }
    }
    if body.is_some() && !parsed.headers.iter().any(|h| h == "digest") {
        return Err(AppError::NotValid(
            "signed headers must include digest".to_string(),
        ));
    }

    let date_str = headers
        .get("date")
        .ok_or_else(|| AppError::NotValid("missing Date header".to_string()))?
        .to_str()
        .map_err(|_| AppError::NotValid("invalid Date header".to_string()))?;
    let date = DateTime::parse_from_rfc2822(date_str)
        .map_err(|_| AppError::NotValid("invalid Date format".to_string()))?;
    if (Utc::now().timestamp() - date.timestamp()).abs() > MAX_DATE_SKEW_SECONDS {
        return Err(AppError::NotValid(
            "Date header too old or in the future".to_string(),
        ));
    }

    if let Some(body_data) = body {
        let digest_str = headers
            .get("digest")
            .ok_or_else(|| AppError::NotValid("missing Digest header".to_string()))?
            .to_str()
            .map_err(|_| AppError::NotValid("invalid Digest header".to_string()))?;
        if digest_str != generate_digest(body_data) {
            return Err(AppError::NotValid("digest mismatch".to_string()));
        }
    }

    let header_value = |name: &str| -> Result<String> {
        Ok(headers
            .get(name)
            .ok_or_else(|| AppError::NotValid(format!("missing {name} header")))?
            .to_str()
            .map_err(|_| AppError::NotValid(format!("invalid {name} header")))?
            .to_string())
    };

    let mut signing_parts = Vec::with_capacity(parsed.headers.len());
    for header_name in &parsed.headers {
        let value = match header_name.as_str() {
            "(request-target)" => format!("{} {}", method.to_lowercase(), path),
            "host" | "date" | "digest" => header_value(header_name)?,
            other => {
                return Err(AppError::NotValid(format!(
                    "unsupported header in signature: {other}"
                )))
            }
        };
        signing_parts.push(format!("{header_name}: {value}"));
    }
    let signing_string = signing_parts.join("\n");

    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| AppError::NotValid("invalid signature encoding".to_string()))?;
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| AppError::NotValid(format!("invalid public key: {e}")))?;
    let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new_unprefixed(public_key);
    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| AppError::NotValid(format!("invalid signature format: {e}")))?;

    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| AppError::NotValid("signature verification failed".to_string()))
}

/// Headers produced for a signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    pub signature: String,
    pub date: String,
    pub digest: Option<String>,
}

/// Sign a request with an actor's private key
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
) -> Result<SignatureHeaders> {
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    let parsed_url =
        url::Url::parse(url).map_err(|e| AppError::NotValid(format!("invalid URL: {e}")))?;
    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::NotValid("missing host in URL".to_string()))?;
    let path_and_query = match parsed_url.query() {
        Some(q) => format!("{}?{}", parsed_url.path(), q),
        None => parsed_url.path().to_string(),
    };

    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let digest = body.map(generate_digest);

    let mut signing_parts = vec![
        format!(
            "(request-target): {} {}",
            method.to_lowercase(),
            path_and_query
        ),
        format!("host: {host}"),
        format!("date: {date}"),
    ];
    let mut headers_list = vec!["(request-target)", "host", "date"];
    if let Some(digest_value) = &digest {
        signing_parts.push(format!("digest: {digest_value}"));
        headers_list.push("digest");
    }
    let signing_string = signing_parts.join("\n");

    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| AppError::NotValid(format!("invalid private key: {e}")))?;
    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new_unprefixed(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());

    Ok(SignatureHeaders {
        signature: format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            key_id,
            headers_list.join(" "),
            BASE64.encode(signature.to_bytes())
        ),
        date,
        digest,
    })
}

/// Resolves the calling account from a request's signature
pub struct SignatureResolver {
    repo: Arc<dyn Repository>,
    audience: AudienceValidator,
}

impl SignatureResolver {
    pub fn new(repo: Arc<dyn Repository>, audience: AudienceValidator) -> Self {
        Self { repo, audience }
    }

    /// Resolve the caller, degrading to anonymous when unauthenticated
    ///
    /// Verification failures are logged and counted but never fail the
    /// request here.
    pub async fn resolve(
        &self,
        method: &str,
        path: &str,
        headers: &http::HeaderMap,
        body: Option<&[u8]>,
    ) -> Account {
        if headers.get("signature").is_none() {
            return Account::anonymous();
        }
        match self.verify_caller(method, path, headers, body).await {
            Ok(account) => {
                SIGNATURES_VERIFIED.with_label_values(&["ok"]).inc();
                tracing::debug!(
                    handle = %account.handle,
                    hash = %account.hash.short(),
                    "caller resolved from signature"
                );
                account
            }
            Err(err) => {
                SIGNATURES_VERIFIED.with_label_values(&["failed"]).inc();
                tracing::warn!(%err, "invalid HTTP signature, continuing as anonymous");
                Account::anonymous()
            }
        }
    }

    async fn verify_caller(
        &self,
        method: &str,
        path: &str,
        headers: &http::HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<Account> {
        let signature_header = headers
            .get("signature")
            .ok_or_else(|| AppError::NotValid("missing Signature header".to_string()))?
            .to_str()
            .map_err(|_| AppError::NotValid("invalid Signature header".to_string()))?;
        let parsed = parse_signature_header(signature_header)?;

        let account = self.load_key_owner(&parsed.key_id).await?;
        let pem = self.stored_key_pem(&account)?;
        verify_signature(method, path, headers, body, &pem)?;
        Ok(account)
    }

    /// Load the account a keyId belongs to
    ///
    /// Local keyIds carry the account hash as the final path segment and
    /// must use the `main-key` fragment this instance mints. Remote ones
    /// are looked up by actor identifier.
    async fn load_key_owner(&self, key_id: &str) -> Result<Account> {
        let url = url::Url::parse(key_id)
            .map_err(|e| AppError::NotValid(format!("invalid keyId: {e}")))?;
        if url.fragment() != Some("main-key") {
            return Err(AppError::NotValid("invalid key identifier".to_string()));
        }

        let actor_iri = key_id_actor(key_id);
        let filter = if self.audience.is_local(actor_iri) {
            let hash = Mapper::hash_from_iri(actor_iri);
            if hash.is_empty() {
                return Err(AppError::NotValid(
                    "keyId carries no account hash".to_string(),
                ));
            }
            AccountFilter::by_hash(hash)
        } else {
            AccountFilter::by_iri(actor_iri.to_string())
        };

        match self.repo.load_account(filter).await {
            Ok(account) => Ok(account),
            Err(AppError::NotFound(_)) => Err(AppError::ActorMissing {
                iri: actor_iri.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    fn stored_key_pem(&self, account: &Account) -> Result<String> {
        let der = account
            .metadata
            .as_ref()
            .and_then(|m| m.key.as_deref())
            .ok_or_else(|| {
                AppError::NotValid(format!(
                    "account {} has no stored public key",
                    account.hash.short()
                ))
            })?;
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| AppError::NotValid(format!("stored key is not valid DER: {e}")))?;
        key.to_public_key_pem(LineEnding::LF)
            .map_err(|e| AppError::NotValid(format!("cannot encode stored key: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FederationConfig;
    use crate::domain::{AccountMetadata, Hash, MemoryRepository};
    use http::{HeaderMap, HeaderValue};
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;

    fn generate_test_keypair() -> (String, Vec<u8>) {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).expect("key generation");
        let public_der = RsaPublicKey::from(&private_key)
            .to_public_key_der()
            .expect("public der")
            .as_bytes()
            .to_vec();
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private pem")
            .to_string();
        (private_pem, public_der)
    }

    fn signed_headers(
        method: &str,
        url: &str,
        body: Option<&[u8]>,
        private_key_pem: &str,
        key_id: &str,
    ) -> (HeaderMap, String) {
        let signed = sign_request(method, url, body, private_key_pem, key_id).expect("signed");
        let parsed = url::Url::parse(url).expect("test url");
        let path = match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "host",
            HeaderValue::from_str(parsed.host_str().expect("host")).expect("host header"),
        );
        headers.insert("date", HeaderValue::from_str(&signed.date).expect("date"));
        if let Some(digest) = &signed.digest {
            headers.insert("digest", HeaderValue::from_str(digest).expect("digest"));
        }
        headers.insert(
            "signature",
            HeaderValue::from_str(&signed.signature).expect("signature"),
        );
        (headers, path)
    }

    fn resolver_with_account(public_der: Vec<u8>) -> SignatureResolver {
        let repo = Arc::new(MemoryRepository::new());
        repo.seed_account(Account {
            hash: Hash::from("aabbccdd"),
            handle: "alice".to_string(),
            metadata: Some(AccountMetadata {
                key: Some(public_der),
                ..AccountMetadata::default()
            }),
            ..Account::default()
        });
        let audience = AudienceValidator::new(
            "local.example",
            &FederationConfig {
                page_size: 50,
                blocked_iris: vec![],
                blocked_instances: vec![],
            },
        );
        SignatureResolver::new(repo, audience)
    }

    #[test]
    fn round_trip_signature_verifies() {
        let (private_pem, public_der) = generate_test_keypair();
        let public_pem = RsaPublicKey::from_public_key_der(&public_der)
            .expect("der")
            .to_public_key_pem(LineEnding::LF)
            .expect("pem");
        let body = br#"{"type":"Like"}"#;
        let (headers, path) = signed_headers(
            "POST",
            "https://local.example/api/self/inbox",
            Some(body),
            &private_pem,
            "https://local.example/api/actors/aabbccdd#main-key",
        );
        verify_signature("POST", &path, &headers, Some(body), &public_pem)
            .expect("valid signature should verify");
    }

    #[test]
    fn tampered_body_fails_digest_check() {
        let (private_pem, public_der) = generate_test_keypair();
        let public_pem = RsaPublicKey::from_public_key_der(&public_der)
            .expect("der")
            .to_public_key_pem(LineEnding::LF)
            .expect("pem");
        let body = br#"{"type":"Like"}"#;
        let (headers, path) = signed_headers(
            "POST",
            "https://local.example/api/self/inbox",
            Some(body),
            &private_pem,
            "https://local.example/api/actors/aabbccdd#main-key",
        );
        let err = verify_signature(
            "POST",
            &path,
            &headers,
            Some(br#"{"type":"Dislike"}"#),
            &public_pem,
        )
        .unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[tokio::test]
    async fn resolver_finds_local_account_from_key_id() {
        let (private_pem, public_der) = generate_test_keypair();
        let resolver = resolver_with_account(public_der);
        let body = br#"{"type":"Like"}"#;
        let (headers, path) = signed_headers(
            "POST",
            "https://local.example/api/self/inbox",
            Some(body),
            &private_pem,
            "https://local.example/api/actors/aabbccdd#main-key",
        );
        let caller = resolver.resolve("POST", &path, &headers, Some(body)).await;
        assert_eq!(caller.handle, "alice");
    }

    #[tokio::test]
    async fn unsigned_request_resolves_to_anonymous() {
        let (_, public_der) = generate_test_keypair();
        let resolver = resolver_with_account(public_der);
        let caller = resolver
            .resolve("GET", "/api/self/outbox", &HeaderMap::new(), None)
            .await;
        assert!(caller.is_anonymous());
    }

    #[tokio::test]
    async fn wrong_key_degrades_to_anonymous() {
        let (_, stored_der) = generate_test_keypair();
        // sign with a different key than the one stored
        let (other_private_pem, _) = generate_test_keypair();
        let resolver = resolver_with_account(stored_der);
        let body = br#"{"type":"Like"}"#;
        let (headers, path) = signed_headers(
            "POST",
            "https://local.example/api/self/inbox",
            Some(body),
            &other_private_pem,
            "https://local.example/api/actors/aabbccdd#main-key",
        );
        let caller = resolver.resolve("POST", &path, &headers, Some(body)).await;
        assert!(caller.is_anonymous());
    }

    #[tokio::test]
    async fn key_id_without_main_key_fragment_is_rejected() {
        let (private_pem, public_der) = generate_test_keypair();
        let resolver = resolver_with_account(public_der);
        let body = br#"{"type":"Like"}"#;
        let (headers, path) = signed_headers(
            "POST",
            "https://local.example/api/self/inbox",
            Some(body),
            &private_pem,
            "https://local.example/api/actors/aabbccdd#other-key",
        );
        let caller = resolver.resolve("POST", &path, &headers, Some(body)).await;
        assert!(caller.is_anonymous());
    }
}
