//! HS256 bearer tokens for the authenticated Engine API port.
//!
//! Execution clients share a hex-encoded secret of at least 32 bytes with the consensus side and
//! accept a token only while its `iat` claim is within a few seconds of their own clock, so a new
//! token is signed for every request.

use core::{
    fmt::{Display, LowerHex, UpperHex},
    time::Duration,
};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context as _, Result};
use derive_more::Debug;
use jwt_simple::{
    algorithms::{HS256Key, MACLike as _},
    claims::Claims,
};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use static_assertions::assert_not_impl_any;
use thiserror::Error;
use zeroize::Zeroizing;

const MIN_SECRET_BYTES: usize = 32;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// File holding the hex-encoded secret shared with the execution client.
    pub jwt_secret: Option<PathBuf>,
    /// Sent as the `id` claim.
    pub client_id: Option<String>,
    /// Sent as the `clv` claim.
    pub client_version: Option<String>,
    #[serde_as(as = "DurationSeconds")]
    pub token_lifetime: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            client_id: None,
            client_version: None,
            token_lifetime: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum JwtSecretError {
    #[error("JWT secret is not valid hex")]
    NotHex,
    #[error("JWT secret has {length} bytes but at least {MIN_SECRET_BYTES} are required")]
    TooShort { length: usize },
}

#[derive(Serialize, Deserialize)]
struct EngineClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clv: Option<String>,
}

/// Signs the `Authorization` header of Engine API requests.
///
/// Without a configured secret no header is produced, which suits unauthenticated test setups.
#[derive(Default, Debug)]
pub struct Auth {
    signer: Option<Signer>,
}

#[derive(Debug)]
struct Signer {
    secret: JwtSecret,
    client_id: Option<String>,
    client_version: Option<String>,
    token_lifetime: Duration,
}

impl Auth {
    pub fn new(options: Options) -> Result<Self> {
        let Options {
            jwt_secret,
            client_id,
            client_version,
            token_lifetime,
        } = options;

        let Some(path) = jwt_secret else {
            return Ok(Self::default());
        };

        let signer = Signer {
            secret: JwtSecret::load(&path)?,
            client_id,
            client_version,
            token_lifetime,
        };

        Ok(Self {
            signer: Some(signer),
        })
    }

    pub fn authorization(&self) -> Result<Option<HeaderValue>> {
        let Some(signer) = &self.signer else {
            return Ok(None);
        };

        let claims = Claims::with_custom_claims(
            EngineClaims {
                id: signer.client_id.clone(),
                clv: signer.client_version.clone(),
            },
            signer.token_lifetime.into(),
        );

        let token = Zeroizing::new(signer.secret.key.authenticate(claims)?);
        let mut value = HeaderValue::try_from(format!("Bearer {}", token.as_str()))?;

        value.set_sensitive(true);

        Ok(Some(value))
    }
}

#[derive(Debug)]
#[debug("JwtSecret([REDACTED])")]
struct JwtSecret {
    key: HS256Key,
}

assert_not_impl_any!(JwtSecret: Clone, Copy, Display, LowerHex, UpperHex, Serialize);

impl JwtSecret {
    fn load(path: &Path) -> Result<Self> {
        let contents = fs_err::read_to_string(path).map(Zeroizing::new)?;

        Self::parse(contents.as_str())
            .with_context(|| format!("failed to load JWT secret from {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        let digits = contents.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);

        let bytes = const_hex::decode(digits)
            .map(Zeroizing::new)
            .context(JwtSecretError::NotHex)?;

        ensure!(
            bytes.len() >= MIN_SECRET_BYTES,
            JwtSecretError::TooShort {
                length: bytes.len(),
            },
        );

        Ok(Self {
            key: HS256Key::from_bytes(bytes.as_slice()),
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;
    use test_case::test_case;
    use unwrap_none::UnwrapNone as _;

    use super::*;

    const SECRET: &str = "a8ecf8012460d00d11a5bd65165c192f705d1ef759afdda5e9db0f2cd29bbf11";

    fn options_with_secret(contents: &str) -> Result<(Options, NamedTempFile)> {
        let file = NamedTempFile::new()?;

        fs_err::write(file.path(), contents)?;

        let options = Options {
            jwt_secret: Some(file.path().to_path_buf()),
            ..Options::default()
        };

        Ok((options, file))
    }

    #[test_case(SECRET; "bare")]
    #[test_case(&format!("0x{SECRET}"); "prefixed")]
    #[test_case(&format!("{SECRET}\n"); "trailing newline")]
    #[test_case(&format!("  0x{SECRET}\r\n"); "surrounding whitespace")]
    fn secret_is_parsed(contents: &str) {
        JwtSecret::parse(contents).expect("secret should parse");
    }

    #[test]
    fn short_secret_is_rejected() {
        let error = JwtSecret::parse(&SECRET[..54]).expect_err("27 bytes are too few");

        assert_eq!(
            error.downcast_ref::<JwtSecretError>(),
            Some(&JwtSecretError::TooShort { length: 27 }),
        );
    }

    #[test]
    fn invalid_secret_file_fails_auth() -> Result<()> {
        let (options, _file) = options_with_secret("INVALID")?;
        let error = Auth::new(options).expect_err("non-hex secret should be rejected");

        assert_eq!(
            error.downcast_ref::<JwtSecretError>(),
            Some(&JwtSecretError::NotHex),
        );

        Ok(())
    }

    #[test]
    fn missing_secret_file_fails_auth() {
        let options = Options {
            jwt_secret: Some(PathBuf::from("/nonexistent/jwt.hex")),
            ..Options::default()
        };

        Auth::new(options).expect_err("missing secret file should be an error");
    }

    #[test]
    fn auth_without_secret_sends_no_header() -> Result<()> {
        Auth::new(Options::default())?.authorization()?.unwrap_none();
        Ok(())
    }

    #[test]
    fn token_verifies_with_shared_secret() -> Result<()> {
        let (mut options, _file) = options_with_secret(SECRET)?;

        options.client_id = Some("bridge".to_owned());
        options.client_version = Some("v1".to_owned());

        let value = Auth::new(options)?
            .authorization()?
            .expect("a secret is configured");

        assert!(value.is_sensitive());

        let token = value
            .to_str()?
            .strip_prefix("Bearer ")
            .expect("token should use the bearer scheme");

        let key = HS256Key::from_bytes(&const_hex::decode(SECRET)?);
        let claims = key.verify_token::<EngineClaims>(token, None)?;

        assert!(claims.issued_at.is_some());
        assert_eq!(claims.custom.id.as_deref(), Some("bridge"));
        assert_eq!(claims.custom.clv.as_deref(), Some("v1"));

        Ok(())
    }

    #[test]
    fn options_read_lifetime_in_seconds() -> Result<()> {
        let options = serde_json::from_value::<Options>(serde_json::json!({
            "jwt_secret": "/etc/jwt.hex",
            "token_lifetime": 30,
        }))?;

        assert_eq!(options.token_lifetime, Duration::from_secs(30));
        assert_eq!(options.client_id, None);

        Ok(())
    }
}
