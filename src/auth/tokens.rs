use chrono::{Duration, Utc};
use jsonwebtoken::errors::{Error, ErrorKind};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// What a signed token may be used for. A token is only accepted for the
/// purpose it was issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Confirm,
    ResetPassword,
    ChangeEmail,
    Api,
}

impl TokenPurpose {
    pub fn lifetime(self) -> Duration {
        match self {
            TokenPurpose::Confirm | TokenPurpose::Api => Duration::hours(1),
            TokenPurpose::ResetPassword | TokenPurpose::ChangeEmail => Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub purpose: TokenPurpose,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
}

/// Signs and checks HS256 tokens with the configured secret key.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: i64, purpose: TokenPurpose) -> Result<String, Error> {
        self.issue_claims(user_id, purpose, None, purpose.lifetime())
    }

    /// Token proving control of `new_email` for an email change.
    pub fn issue_change_email(&self, user_id: i64, new_email: &str) -> Result<String, Error> {
        self.issue_claims(
            user_id,
            TokenPurpose::ChangeEmail,
            Some(new_email.to_string()),
            TokenPurpose::ChangeEmail.lifetime(),
        )
    }

    fn issue_claims(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        new_email: Option<String>,
        lifetime: Duration,
    ) -> Result<String, Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            purpose,
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            new_email,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Decode a token, rejecting bad signatures, expiry and a purpose other
    /// than `purpose`.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        if data.claims.purpose != purpose {
            return Err(Error::from(ErrorKind::InvalidToken));
        }
        if purpose == TokenPurpose::ChangeEmail && data.claims.new_email.is_none() {
            return Err(Error::from(ErrorKind::InvalidToken));
        }
        Ok(data.claims)
    }

    /// User id carried by a valid token for `purpose`.
    pub fn verify_user(&self, token: &str, purpose: TokenPurpose) -> Result<i64, Error> {
        self.verify(token, purpose).map(|claims| claims.sub)
    }
}
