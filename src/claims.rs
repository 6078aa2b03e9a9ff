use serde::Deserialize;

/// Caller-supplied identity claim. Untrusted input: the transport layer may
/// hand it in as a JSON object, a JSON string, or a URL-encoded JSON string,
/// and anything unparseable normalizes to the anonymous claim rather than
/// failing the request.
#[derive(Debug, Clone, Deserialize)]
pub struct Claim {
    #[serde(default)]
    pub sub: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claim {
    pub fn anonymous() -> Self {
        Claim {
            sub: 0,
            username: String::new(),
            roles: Vec::new(),
        }
    }

    /// Canonical role tags: lowercased, trimmed, trailing plural 's'
    /// stripped ("Teachers" -> "teacher"). Unknown tags pass through
    /// lowercased so the allow-list comparison stays a plain set test.
    pub fn normalized_roles(&self) -> Vec<String> {
        self.roles
            .iter()
            .map(|r| normalize_role_tag(r))
            .filter(|r| !r.is_empty())
            .collect()
    }

    pub fn has_any_role(&self, wanted: &[&str]) -> bool {
        let have = self.normalized_roles();
        wanted.iter().any(|w| have.iter().any(|h| h == w))
    }
}

pub fn normalize_role_tag(tag: &str) -> String {
    let t = tag.trim().to_ascii_lowercase();
    // "teachers" -> "teacher", but keep bare "s" and non-plural tags as-is.
    if t.len() > 1 && t.ends_with('s') {
        t[..t.len() - 1].to_string()
    } else {
        t
    }
}

/// Parse the `claim` request param. Accepts a JSON object, a JSON-encoded
/// string, or a URL-encoded JSON string; absent or malformed input yields
/// the zero-privilege anonymous claim.
pub fn normalize_claim(raw: Option<&serde_json::Value>) -> Claim {
    let Some(raw) = raw else {
        return Claim::anonymous();
    };

    if let Some(s) = raw.as_str() {
        let decoded = url_decode(s);
        return match serde_json::from_str::<Claim>(&decoded) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("unparseable claim string, treating as anonymous: {e}");
                Claim::anonymous()
            }
        };
    }

    if raw.is_object() {
        return match serde_json::from_value::<Claim>(raw.clone()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("unparseable claim object, treating as anonymous: {e}");
                Claim::anonymous()
            }
        };
    }

    Claim::anonymous()
}

/// Minimal percent-decoding; invalid escapes are kept verbatim so a plain
/// (non-encoded) JSON string still round-trips unchanged. Works on bytes
/// throughout: slicing the str could land inside a multi-byte character.
fn url_decode(s: &str) -> String {
    fn hex_val(b: u8) -> Option<u8> {
        (b as char).to_digit(16).map(|v| v as u8)
    }

    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi * 16 + lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
