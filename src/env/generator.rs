//! Auto-generated values: random identifiers, tokens and passwords.
//!
//! An `auto` spec is either a bare method key (`random_uuid`) or a mapping
//! with a `type` field and method-specific parameters:
//!
//! ```yaml
//! auto:
//!   CORE_ID: random_uuid
//!   JWT_SECRET: { type: openssl, length: 48 }
//!   DB_PASSWORD: { type: secret, length: 24, blacklist: "#%" }
//!   SESSION_SALT: { type: secret, freeze: false }
//! ```
//!
//! All generators draw from the operating system CSPRNG.

use crate::error::{EnvError, EnvResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const FIELD_TYPE: &str = "type";
const FIELD_FREEZE: &str = "freeze";
const FIELD_LENGTH: &str = "length";
const FIELD_WHITELIST: &str = "whitelist";
const FIELD_BLACKLIST: &str = "blacklist";

const DEFAULT_TOKEN_LENGTH: u64 = 32;
const DEFAULT_SECRET_LENGTH: u64 = 32;
/// Upper bound on `length` for every generator.
pub const MAX_GENERATED_LENGTH: u64 = 4096;

/// Punctuation that survives `KEY=VALUE` env files and shell sourcing.
pub const SAFE_PUNCTUATION: &str = "!#%()*+, -.=?^_";

/// Why a generator refused a spec.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GeneratorError {
    /// The spec belongs to another generator.
    Unrecognized,
    /// The spec names this generator but its parameters are wrong.
    Invalid(String),
}

/// The fixed set of value generators, in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// Lower-case hyphenated UUID v4.
    RandomUuid,
    /// Base64 rendering of `length` random bytes.
    OpenSsl,
    /// Password sampled from a configurable alphabet.
    Secret,
}

impl Generator {
    pub const ALL: [Generator; 3] = [Generator::RandomUuid, Generator::OpenSsl, Generator::Secret];

    pub fn method_key(&self) -> &'static str {
        match self {
            Generator::RandomUuid => "random_uuid",
            Generator::OpenSsl => "openssl",
            Generator::Secret => "secret",
        }
    }

    /// Whether a bare string naming the method is a valid spec.
    pub fn accepts_string_field(&self) -> bool {
        match self {
            Generator::RandomUuid | Generator::Secret => true,
            Generator::OpenSsl => false,
        }
    }

    /// Pick the generator that owns `spec`.
    ///
    /// A generator that recognizes the method but rejects the parameters is
    /// still selected, so that [`Generator::resolve`] reports the precise
    /// parameter error instead of an unknown method.
    pub fn identify(spec: &Value) -> EnvResult<Generator> {
        for generator in Self::ALL {
            match generator.check(spec) {
                Ok(_) | Err(GeneratorError::Invalid(_)) => return Ok(generator),
                Err(GeneratorError::Unrecognized) => continue,
            }
        }
        Err(EnvError::UnidentifiableGenerationMethod(spec.to_string()))
    }

    /// Validate `spec` against this generator.
    pub fn validate(&self, spec: &Value) -> EnvResult<()> {
        match self.check(spec) {
            Ok(_) => Ok(()),
            Err(GeneratorError::Invalid(reason)) => Err(self.invalid(reason)),
            Err(GeneratorError::Unrecognized) => Err(self.invalid(format!(
                "field does not match the '{}' convention",
                self.method_key()
            ))),
        }
    }

    /// Validate `spec` and produce a fresh value.
    pub fn resolve(&self, spec: &Value) -> EnvResult<String> {
        self.validate(spec)?;
        let params = normalize(spec, self.accepts_string_field())
            .map_err(|_| self.invalid("unrecognized field".to_string()))?;
        match self {
            Generator::RandomUuid => Ok(uuid::Uuid::new_v4().to_string()),
            Generator::OpenSsl => {
                let length = length_param(&params, DEFAULT_TOKEN_LENGTH)?;
                let mut bytes = vec![0u8; length];
                OsRng.fill_bytes(&mut bytes);
                Ok(STANDARD.encode(bytes))
            }
            Generator::Secret => {
                let length = length_param(&params, DEFAULT_SECRET_LENGTH)?;
                let alphabet = secret_alphabet(&params);
                if alphabet.is_empty() && length > 0 {
                    return Err(self.invalid("the resulting alphabet is empty".to_string()));
                }
                let mut rng = OsRng;
                Ok((0..length)
                    .filter_map(|_| alphabet.choose(&mut rng).copied())
                    .collect())
            }
        }
    }

    fn invalid(&self, reason: String) -> EnvError {
        EnvError::InvalidGenerationData {
            method: self.method_key().to_string(),
            reason,
        }
    }

    fn check(&self, spec: &Value) -> Result<(), GeneratorError> {
        let params = normalize(spec, self.accepts_string_field())?;
        if params.get(FIELD_TYPE).and_then(Value::as_str) != Some(self.method_key()) {
            return Err(GeneratorError::Unrecognized);
        }
        if params.get(FIELD_FREEZE).is_some_and(|f| !f.is_boolean()) {
            return Err(GeneratorError::Invalid(
                "invalid type for 'freeze' parameter".to_string(),
            ));
        }
        match self {
            Generator::RandomUuid => Ok(()),
            Generator::OpenSsl => check_positive_length(&params),
            Generator::Secret => check_secret(&params),
        }
    }
}

/// Whether the value generated from `spec` is persisted as a constant on export.
pub fn is_frozen(spec: &Value) -> bool {
    match spec {
        Value::Object(params) => params
            .get(FIELD_FREEZE)
            .and_then(Value::as_bool)
            .unwrap_or(true),
        _ => true,
    }
}

/// Bring a spec into `{type, ...params}` form.
fn normalize(spec: &Value, accepts_string: bool) -> Result<Map<String, Value>, GeneratorError> {
    match spec {
        Value::String(method) if accepts_string => {
            let mut params = Map::new();
            params.insert(FIELD_TYPE.to_string(), Value::String(method.clone()));
            Ok(params)
        }
        Value::Object(params) if params.contains_key(FIELD_TYPE) => Ok(params.clone()),
        _ => Err(GeneratorError::Unrecognized),
    }
}

fn check_positive_length(params: &Map<String, Value>) -> Result<(), GeneratorError> {
    match params.get(FIELD_LENGTH) {
        None => Ok(()),
        Some(length) if length.as_u64().is_some_and(|l| (1..=MAX_GENERATED_LENGTH).contains(&l)) => {
            Ok(())
        }
        Some(_) => Err(GeneratorError::Invalid(format!(
            "length should be an integer between 1 and {MAX_GENERATED_LENGTH}"
        ))),
    }
}

fn check_secret(params: &Map<String, Value>) -> Result<(), GeneratorError> {
    if params
        .get(FIELD_LENGTH)
        .is_some_and(|l| !l.as_u64().is_some_and(|l| l <= MAX_GENERATED_LENGTH))
    {
        return Err(GeneratorError::Invalid(format!(
            "length should be an integer between 0 and {MAX_GENERATED_LENGTH}"
        )));
    }
    let non_empty = |field: &str| match params.get(field) {
        None => Ok(false),
        Some(Value::String(chars)) if !chars.is_empty() => Ok(true),
        Some(_) => Err(GeneratorError::Invalid(format!(
            "characters {field} must be a string with one or more characters"
        ))),
    };
    let has_whitelist = non_empty(FIELD_WHITELIST)?;
    let has_blacklist = non_empty(FIELD_BLACKLIST)?;
    if has_whitelist && has_blacklist {
        return Err(GeneratorError::Invalid(
            "characters blacklist and whitelist cannot be set at the same time".to_string(),
        ));
    }
    Ok(())
}

fn length_param(params: &Map<String, Value>, default: u64) -> EnvResult<usize> {
    let length = params
        .get(FIELD_LENGTH)
        .and_then(Value::as_u64)
        .unwrap_or(default);
    usize::try_from(length).map_err(|_| EnvError::InvalidGenerationData {
        method: params
            .get(FIELD_TYPE)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        reason: format!("length {length} is too large"),
    })
}

/// Letters, digits and [`SAFE_PUNCTUATION`].
pub fn base_alphabet() -> Vec<char> {
    ('a'..='z')
        .chain('A'..='Z')
        .chain('0'..='9')
        .chain(SAFE_PUNCTUATION.chars())
        .collect()
}

fn secret_alphabet(params: &Map<String, Value>) -> Vec<char> {
    if let Some(whitelist) = params.get(FIELD_WHITELIST).and_then(Value::as_str) {
        return whitelist.chars().collect();
    }
    let excluded: BTreeSet<char> = params
        .get(FIELD_BLACKLIST)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .chars()
        .collect();
    base_alphabet()
        .into_iter()
        .filter(|c| !excluded.contains(c))
        .collect()
}
