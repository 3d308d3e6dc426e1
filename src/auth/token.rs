//! HMAC-signed session tokens.
//!
//! Tokens are stateless HS256 JWTs carrying `{userId, email, role}`. The
//! server keeps no session record; a token stays valid until `exp` unless the
//! signing secret changes.

use anyhow::{bail, Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::store::PublicUser;

/// Longest accepted token lifetime (100 years).
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Claims carried by every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub role: String,
    /// Issued-at (Unix seconds).
    pub iat: u64,
    /// Expiry (Unix seconds).
    pub exp: u64,
}

/// Signs and verifies session tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user`.
    pub fn issue(&self, user: &PublicUser) -> Result<String> {
        let iat = epoch_secs();
        let exp = iat
            .checked_add(self.ttl.as_secs())
            .context("Token expiry overflows the timestamp range")?;
        let claims = Claims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            iat,
            exp,
        };
        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .context("Failed to sign token")
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

/// Parse a `JWT_EXPIRES_IN` value: `7d`, `12h`, `30m`, `45s`, `2w` or plain
/// seconds.
pub fn parse_expiry(raw: &str) -> Result<Duration> {
    let value = raw.trim();
    if value.is_empty() {
        bail!("empty duration");
    }

    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, unit)) if unit.is_ascii_alphabetic() => {
            let multiplier = match unit.to_ascii_lowercase() {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 24 * 3600,
                'w' => 7 * 24 * 3600,
                other => bail!("unknown duration unit '{other}'"),
            };
            (&value[..idx], multiplier)
        }
        _ => (value, 1),
    };

    let amount: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid duration '{value}'"))?;
    if amount == 0 {
        bail!("duration must be greater than zero");
    }

    let ttl = amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .with_context(|| format!("duration '{value}' overflows"))?;
    if ttl > MAX_TOKEN_TTL {
        bail!(
            "duration '{value}' exceeds the maximum of {} days",
            MAX_TOKEN_TTL.as_secs() / 86_400
        );
    }
    Ok(ttl)
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> PublicUser {
        PublicUser {
            id: "user-1".into(),
            name: "Ana".into(),
            email: "ana@cacadores.org".into(),
            role: "admin".into(),
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn issued_token_carries_user_claims() {
        let issuer = issuer();
        let token = issuer.issue(&user()).unwrap();
        let claims = issuer.verify(&token).unwrap();

        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.email, "ana@cacadores.org");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn payload_uses_camel_case_user_id() {
        let claims = Claims {
            user_id: "u".into(),
            email: "e@x.com".into(),
            role: "user".into(),
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "u");
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenIssuer::new("other-secret", Duration::from_secs(3600))
            .issue(&user())
            .unwrap();
        assert!(issuer().verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer();
        let now = epoch_secs();
        let token = issuer
            .sign(&Claims {
                user_id: "user-1".into(),
                email: "ana@cacadores.org".into(),
                role: "user".into(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        let err = issuer.verify(&token).unwrap_err();
        assert!(matches!(
            err.kind(),
            jsonwebtoken::errors::ErrorKind::ExpiredSignature
        ));
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(issuer().verify("not.a.jwt").is_err());
        assert!(issuer().verify("").is_err());
    }

    #[test]
    fn parse_expiry_units() {
        assert_eq!(parse_expiry("7d").unwrap(), Duration::from_secs(7 * 86_400));
        assert_eq!(parse_expiry("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_expiry("30m").unwrap(), Duration::from_secs(1_800));
        assert_eq!(parse_expiry("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_expiry("2w").unwrap(), Duration::from_secs(14 * 86_400));
        assert_eq!(parse_expiry("3600").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_expiry(" 1D ").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn parse_expiry_rejects_bad_values() {
        assert!(parse_expiry("").is_err());
        assert!(parse_expiry("0").is_err());
        assert!(parse_expiry("0d").is_err());
        assert!(parse_expiry("7y").is_err());
        assert!(parse_expiry("d").is_err());
        assert!(parse_expiry("-5h").is_err());
        assert!(parse_expiry("soon").is_err());
    }

    #[test]
    fn parse_expiry_caps_lifetime() {
        assert!(parse_expiry("18446744073709551615").is_err());
        assert!(parse_expiry("99999999999999w").is_err());
        assert!(parse_expiry("36501d").is_err());
        assert_eq!(parse_expiry("36500d").unwrap(), MAX_TOKEN_TTL);
    }

    #[test]
    fn issue_rejects_unrepresentable_expiry() {
        let issuer = TokenIssuer::new("test-secret", Duration::from_secs(u64::MAX));
        assert!(issuer.issue(&user()).is_err());

        let issuer = TokenIssuer::new("test-secret", MAX_TOKEN_TTL);
        let claims = issuer.verify(&issuer.issue(&user()).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, MAX_TOKEN_TTL.as_secs());
    }
}
