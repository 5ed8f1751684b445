//! Single-use 2FA recovery codes
//!
//! Codes are shown to the user once as `XXXX-XXXX` and stored only as salted
//! Argon2id hashes.

use crate::{
    auth::password::{CredentialHash, PasswordHasher},
    error::AppError,
};
use rand::{rngs::OsRng, Rng};

pub const RECOVERY_CODE_COUNT: usize = 8;
const RECOVERY_CODE_LEN: usize = 8;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
// 0, O, 1 and I are excluded
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Freshly issued codes; plaintext leaves the process exactly once
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub codes: Vec<String>,
    pub hashes: Vec<CredentialHash>,
}

impl RecoveryCodeBatch {
    /// Generate `RECOVERY_CODE_COUNT` distinct codes and their hashes
    pub fn generate(hasher: &PasswordHasher) -> Result<Self, AppError> {
        let mut rng = OsRng;
        let mut codes: Vec<String> = Vec::with_capacity(RECOVERY_CODE_COUNT);

        while codes.len() < RECOVERY_CODE_COUNT {
            let code = generate_code(&mut rng);
            if !codes.contains(&code) {
                codes.push(code);
            }
        }

        let hashes = codes
            .iter()
            .map(|code| hasher.hash(&normalize_recovery_code(code)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { codes, hashes })
    }
}

/// Strip separators/whitespace and uppercase
pub fn normalize_recovery_code(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Cheap shape check before spending Argon2 work on an input
pub fn looks_like_recovery_code(input: &str) -> bool {
    let normalized = normalize_recovery_code(input);
    normalized.len() == RECOVERY_CODE_LEN
        && normalized
            .bytes()
            .all(|b| RECOVERY_CODE_ALPHABET.contains(&b))
}

/// Index of the stored hash matching `input`, if any
pub fn find_matching_hash(
    hasher: &PasswordHasher,
    input: &str,
    hashes: &[String],
) -> Option<usize> {
    if !looks_like_recovery_code(input) {
        return None;
    }
    let normalized = normalize_recovery_code(input);

    hashes
        .iter()
        .position(|stored| hasher.matches(&normalized, &CredentialHash::from_stored(stored.as_str())))
}

fn generate_code<R: Rng>(rng: &mut R) -> String {
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 1);
    for idx in 0..RECOVERY_CODE_LEN {
        if idx > 0 && idx % RECOVERY_CODE_GROUP_SIZE == 0 {
            out.push('-');
        }
        let pick = rng.gen_range(0..RECOVERY_CODE_ALPHABET.len());
        out.push(RECOVERY_CODE_ALPHABET[pick] as char);
    }
    out
}
