use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIG_LEN: usize = 32;
// Lower-case hex of a 32-byte HMAC.
const SIG_HEX_LEN: usize = 64;

/// Authorization scheme carried in the upload URL's query string.
///
/// `V1` is the original prosody `mod_http_upload_external` form. `V2` and
/// `Token` share the newer payload that also binds the content type;
/// prosody hands out `v2`, ejabberd and metronome hand out `token`, and
/// only the query key differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    V1,
    V2,
    Token,
}

impl Scheme {
    pub fn query_key(self) -> &'static str {
        match self {
            Self::V1 => "v",
            Self::V2 => "v2",
            Self::Token => "token",
        }
    }

    fn mac(
        self,
        secret: &[u8],
        path: &str,
        content_length: u64,
        content_type: &str,
    ) -> [u8; SIG_LEN] {
        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(path.as_bytes());
        match self {
            Self::V1 => {
                mac.update(b" ");
                mac.update(content_length.to_string().as_bytes());
            }
            Self::V2 | Self::Token => {
                mac.update(b"\0");
                mac.update(content_length.to_string().as_bytes());
                mac.update(b"\0");
                mac.update(content_type.as_bytes());
            }
        }
        mac.finalize().into_bytes().into()
    }

    /// Lower-case hex digest for this scheme, as a signer puts it in the
    /// upload URL.
    pub fn signature(
        self,
        secret: &[u8],
        path: &str,
        content_length: u64,
        content_type: &str,
    ) -> String {
        hex::encode(self.mac(secret, path, content_length, content_type))
    }
}

/// Query-string view of the recognized credential keys. Anything else in
/// the query string is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub v: Option<String>,
    pub v2: Option<String>,
    pub token: Option<String>,
}

impl AuthQuery {
    // `v2` wins over `token` wins over `v`; exactly one scheme is checked.
    fn presented(&self) -> Option<(Scheme, &str)> {
        if let Some(sig) = &self.v2 {
            return Some((Scheme::V2, sig));
        }
        if let Some(sig) = &self.token {
            return Some((Scheme::Token, sig));
        }
        if let Some(sig) = &self.v {
            return Some((Scheme::V1, sig));
        }
        None
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MacError {
    #[error("no upload credential in query string")]
    Missing,
    #[error("upload credential rejected")]
    Invalid,
}

/// Check the credential in `query` against the digest expected for `path`,
/// `content_length` and `content_type`, and return the accepted scheme.
///
/// The digest is checked strictly against the scheme whose key carried it:
/// a valid `v` digest presented under `v2` is rejected.
pub fn verify(
    secret: &[u8],
    path: &str,
    content_length: u64,
    content_type: &str,
    query: &AuthQuery,
) -> Result<Scheme, MacError> {
    let (scheme, presented) = query.presented().ok_or(MacError::Missing)?;

    // Reject non-canonical transport forms before any HMAC work.
    let presented = decode_sig_hex(presented).ok_or(MacError::Invalid)?;

    let expected = scheme.mac(secret, path, content_length, content_type);
    if !constant_time_equal(&presented, &expected) {
        return Err(MacError::Invalid);
    }
    Ok(scheme)
}

// The wire form is exactly 64 lower-case hex digits; signers never emit
// upper case and accepting it would make the transport form ambiguous.
fn is_lower_hex(raw: &str) -> bool {
    raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn decode_sig_hex(raw: &str) -> Option<[u8; SIG_LEN]> {
    if raw.len() != SIG_HEX_LEN || !is_lower_hex(raw) {
        return None;
    }
    let mut out = [0u8; SIG_LEN];
    hex::decode_to_slice(raw, &mut out).ok()?;
    Some(out)
}

fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}
