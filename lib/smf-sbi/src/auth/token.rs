use super::{AuthError, AuthorizationCheck};
use crate::{Result, SbiError};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use smf_api::{PlmnId, ServiceName};
use std::path::Path;
use tracing::{debug, info};

/// Claims of an NRF-issued access token
#[derive(Debug, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub exp: u64,
    /// Space-separated service names the token grants
    #[serde(default)]
    pub scope: String,
    #[serde(rename = "producerPlmnId")]
    pub producer_plmn_id: Option<PlmnId>,
}

const RSA_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];
const EC_ALGORITHMS: [Algorithm; 2] = [Algorithm::ES256, Algorithm::ES384];

struct VerifyingKey {
    key: DecodingKey,
    /// Signing algorithms accepted for this key family
    algorithms: Vec<Algorithm>,
}

/// Verifies bearer tokens against the NRF's public key.
///
/// Without a key, verification is disabled and every request passes.
pub struct AccessTokenVerifier {
    key: Option<VerifyingKey>,
}

impl AccessTokenVerifier {
    pub fn disabled() -> Self {
        Self { key: None }
    }

    /// Load an RSA or EC public key (or certificate) in PEM form
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (key, algorithms) = match DecodingKey::from_rsa_pem(pem) {
            Ok(key) => (key, RSA_ALGORITHMS.to_vec()),
            Err(_) => DecodingKey::from_ec_pem(pem)
                .map(|key| (key, EC_ALGORITHMS.to_vec()))
                .map_err(|e| SbiError::AccessTokenKey(e.to_string()))?,
        };
        info!("Access token verification enabled ({:?})", algorithms);
        Ok(Self {
            key: Some(VerifyingKey { key, algorithms }),
        })
    }

    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let pem = std::fs::read(path).map_err(|e| {
            SbiError::AccessTokenKey(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_pem(&pem)
    }

    /// Shared-secret verification for deployments without an NRF key pair
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            key: Some(VerifyingKey {
                key: DecodingKey::from_secret(secret),
                algorithms: vec![Algorithm::HS256],
            }),
        }
    }

    /// Build from the optional `nrfCertPem` setting
    pub fn from_config(nrf_cert_pem: Option<&Path>) -> Result<Self> {
        match nrf_cert_pem {
            Some(path) => Self::from_pem_file(path),
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }
}

impl AuthorizationCheck for AccessTokenVerifier {
    fn authorization_check(
        &self,
        token: &str,
        service: ServiceName,
        serving_plmn: &PlmnId,
        roaming_plmn: Option<&PlmnId>,
    ) -> std::result::Result<(), AuthError> {
        let Some(verifying) = &self.key else {
            return Ok(());
        };

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let raw = token
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;

        let mut validation = Validation::new(verifying.algorithms[0]);
        validation.algorithms = verifying.algorithms.clone();
        validation.validate_aud = false;

        let claims = decode::<AccessTokenClaims>(raw, &verifying.key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => {
                    debug!("Access token rejected: {}", e);
                    AuthError::InvalidToken
                }
            })?
            .claims;

        if !claims.scope.split_whitespace().any(|s| s == service.as_str()) {
            return Err(AuthError::ScopeMismatch(service));
        }

        if roaming_plmn.is_some() {
            if let Some(producer) = &claims.producer_plmn_id {
                if producer != serving_plmn {
                    return Err(AuthError::PlmnMismatch);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"nrf-shared-secret";
    const RSA_PRIVATE: &[u8] = include_bytes!("../../testdata/server.key");
    const RSA_PUBLIC: &[u8] = include_bytes!("../../testdata/server.pub");
    const EC_PRIVATE: &[u8] = include_bytes!("../../testdata/ec.key");
    const EC_PUBLIC: &[u8] = include_bytes!("../../testdata/ec.pub");

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn bearer(claims: serde_json::Value) -> String {
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        format!("Bearer {}", token)
    }

    fn signed(algorithm: Algorithm, key: &EncodingKey, claims: serde_json::Value) -> String {
        let token = encode(&Header::new(algorithm), &claims, key).unwrap();
        format!("Bearer {}", token)
    }

    fn serving() -> PlmnId {
        PlmnId::new("208", "93")
    }

    #[test]
    fn test_disabled_accepts_anything() {
        let verifier = AccessTokenVerifier::disabled();
        assert!(!verifier.is_enabled());
        assert!(verifier
            .authorization_check("", ServiceName::NsmfPdusession, &serving(), None)
            .is_ok());
    }

    #[test]
    fn test_scoped_token_accepted() {
        let verifier = AccessTokenVerifier::from_secret(SECRET);
        let token = bearer(json!({
            "iss": "nrf",
            "exp": now() + 600,
            "scope": "nsmf-pdusession nsmf-oam",
        }));

        assert!(verifier
            .authorization_check(&token, ServiceName::NsmfOam, &serving(), None)
            .is_ok());
        assert_eq!(
            verifier.authorization_check(&token, ServiceName::NsmfEventExposure, &serving(), None),
            Err(AuthError::ScopeMismatch(ServiceName::NsmfEventExposure))
        );
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let verifier = AccessTokenVerifier::from_secret(SECRET);
        let svc = ServiceName::NsmfPdusession;

        assert_eq!(
            verifier.authorization_check("", svc, &serving(), None),
            Err(AuthError::MissingToken)
        );
        assert_eq!(
            verifier.authorization_check("Basic abc", svc, &serving(), None),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            verifier.authorization_check("Bearer not.a.jwt", svc, &serving(), None),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = AccessTokenVerifier::from_secret(b"another-secret");
        let token = bearer(json!({ "exp": now() + 600, "scope": "nsmf-pdusession" }));
        assert_eq!(
            verifier.authorization_check(&token, ServiceName::NsmfPdusession, &serving(), None),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = AccessTokenVerifier::from_secret(SECRET);
        let token = bearer(json!({ "exp": now() - 3600, "scope": "nsmf-pdusession" }));
        assert_eq!(
            verifier.authorization_check(&token, ServiceName::NsmfPdusession, &serving(), None),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_producer_plmn_checked_when_roaming() {
        let verifier = AccessTokenVerifier::from_secret(SECRET);
        let roaming = PlmnId::new("001", "01");
        let token = bearer(json!({
            "exp": now() + 600,
            "scope": "nsmf-pdusession",
            "producerPlmnId": { "mcc": "310", "mnc": "410" },
        }));
        let svc = ServiceName::NsmfPdusession;

        assert!(verifier
            .authorization_check(&token, svc, &serving(), None)
            .is_ok());
        assert_eq!(
            verifier.authorization_check(&token, svc, &serving(), Some(&roaming)),
            Err(AuthError::PlmnMismatch)
        );
    }

    #[test]
    fn test_rsa_key_accepts_every_rs_digest() {
        let verifier = AccessTokenVerifier::from_pem(RSA_PUBLIC).unwrap();
        let key = EncodingKey::from_rsa_pem(RSA_PRIVATE).unwrap();
        let claims = json!({ "iss": "nrf", "exp": now() + 600, "scope": "nsmf-pdusession" });

        for algorithm in [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512] {
            let token = signed(algorithm, &key, claims.clone());
            assert_eq!(
                verifier.authorization_check(&token, ServiceName::NsmfPdusession, &serving(), None),
                Ok(()),
                "{:?}",
                algorithm
            );
        }
    }

    #[test]
    fn test_rsa_key_rejects_other_families() {
        let verifier = AccessTokenVerifier::from_pem(RSA_PUBLIC).unwrap();
        let token = bearer(json!({ "exp": now() + 600, "scope": "nsmf-pdusession" }));
        assert_eq!(
            verifier.authorization_check(&token, ServiceName::NsmfPdusession, &serving(), None),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_ec_key_accepts_es256() {
        let verifier = AccessTokenVerifier::from_pem(EC_PUBLIC).unwrap();
        let key = EncodingKey::from_ec_pem(EC_PRIVATE).unwrap();
        let token = signed(
            Algorithm::ES256,
            &key,
            json!({ "exp": now() + 600, "scope": "nsmf-oam" }),
        );
        assert!(verifier
            .authorization_check(&token, ServiceName::NsmfOam, &serving(), None)
            .is_ok());
    }

    #[test]
    fn test_unreadable_key_file() {
        let result = AccessTokenVerifier::from_config(Some(Path::new("/nonexistent/nrf.pem")));
        assert!(matches!(result, Err(SbiError::AccessTokenKey(_))));
        assert!(!AccessTokenVerifier::from_config(None).unwrap().is_enabled());
    }
}
