//! Signed session tokens identifying the authenticated principal.
//!
//! Tokens are HMAC-SHA256 based and scoped to a (role, username) pair.
//! Format: `meals_st_<role>_<hmac_hex>_<username>`. The HMAC has a fixed
//! width, so usernames may themselves contain underscores.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix identifying a meals session token.
const TOKEN_PREFIX: &str = "meals_st_";

/// Hex length of an HMAC-SHA256 digest.
const HMAC_HEX_LEN: usize = 64;

/// Environment variable holding the hex-encoded session secret.
pub const SESSION_SECRET_ENV: &str = "MEALS_SESSION_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("unknown role in token: {0:?}")]
    InvalidRole(String),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("missing session secret")]
    MissingSecret,
}

/// What an authenticated principal may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Orders meals for their own children.
    Parent,
    /// Sees aggregate meal counts across all parents.
    Staff,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parent => "parent",
            Self::Staff => "staff",
        })
    }
}

impl FromStr for Role {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Self::Parent),
            "staff" => Ok(Self::Staff),
            other => Err(TokenError::InvalidRole(other.to_owned())),
        }
    }
}

/// The authenticated caller, as established by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn parent(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Parent,
        }
    }

    pub fn staff(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Staff,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

/// Secret used to sign and verify session tokens.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: Vec<u8>,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Read the hex-encoded secret from `MEALS_SESSION_SECRET`.
    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex =
            std::env::var(SESSION_SECRET_ENV).map_err(|_| TokenError::MissingSecret)?;
        Self::from_hex(&secret_hex)
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self, TokenError> {
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| TokenError::InvalidFormat(format!("session secret is not valid hex: {e}")))?;
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self::new(secret))
    }
}

/// Issue a session token for `principal`.
pub fn generate_token(config: &TokenConfig, principal: &Principal) -> String {
    let mac = compute_hmac(&config.secret, &signed_message(principal.role, &principal.username));
    format!(
        "{TOKEN_PREFIX}{}_{}_{}",
        principal.role,
        hex::encode(mac),
        principal.username
    )
}

/// Verify a session token and return the principal it names.
pub fn validate_token(config: &TokenConfig, token: &str) -> Result<Principal, TokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        TokenError::InvalidFormat(format!("token must start with {TOKEN_PREFIX:?}"))
    })?;

    let (role_str, rest) = rest
        .split_once('_')
        .ok_or_else(|| TokenError::InvalidFormat("expected underscore after role".to_owned()))?;
    let role: Role = role_str.parse()?;

    if rest.len() < HMAC_HEX_LEN + 2 || !rest.is_char_boundary(HMAC_HEX_LEN) {
        return Err(TokenError::InvalidFormat(
            "token too short to hold a signature and username".to_owned(),
        ));
    }
    let (hmac_hex, rest) = rest.split_at(HMAC_HEX_LEN);
    let username = rest
        .strip_prefix('_')
        .ok_or_else(|| TokenError::InvalidFormat("expected underscore after signature".to_owned()))?;
    if username.trim().is_empty() {
        return Err(TokenError::InvalidFormat("empty username".to_owned()));
    }

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;
    verify_hmac_constant_time(&config.secret, &signed_message(role, username), &provided_mac)?;

    Ok(Principal {
        username: username.to_owned(),
        role,
    })
}

fn signed_message(role: Role, username: &str) -> Vec<u8> {
    format!("{role}:{username}").into_bytes()
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// `verify_slice` compares in constant time.
fn verify_hmac_constant_time(key: &[u8], message: &[u8], expected: &[u8]) -> Result<(), TokenError> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.verify_slice(expected)
        .map_err(|_| TokenError::HmacMismatch)
}
