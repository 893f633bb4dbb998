//! Data model for the authorization code flow
//!
//! Every type here is a plain serde struct. Types that come straight from the
//! identity provider implement [`ReceivedPayload`] so that the raw payload can
//! be kept next to the parsed value when debug payloads are enabled.

pub mod auth_token;
pub mod claims;
pub mod flow_state;
pub mod local_account;
pub mod user_info;

pub use auth_token::{AuthToken, BearerToken};
pub use claims::{Audience, IDTokenClaims};
pub use flow_state::{AuthResponse, FlowState};
pub use local_account::LocalAccount;
pub use user_info::UserInfo;

use serde::de::DeserializeOwned;

use crate::error::{MsalAuthError, Result};

/// Raw provider payload kept next to a parsed model
///
/// Never serialized and ignored by equality, so a model read back from the
/// session store equals the one that was saved.
#[derive(Debug, Clone, Default)]
pub struct Received(pub Option<serde_json::Value>);

impl Received {
    pub fn get(&self) -> Option<&serde_json::Value> {
        self.0.as_ref()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl PartialEq for Received {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Received {}

/// A model that can hold the raw payload it was parsed from
///
/// The payload lives in a [`Received`] field.
pub trait ReceivedPayload {
    /// Attach the raw payload
    fn set_received(&mut self, raw: serde_json::Value);

    /// The raw payload, when it was kept
    fn received(&self) -> Option<&serde_json::Value>;
}

/// Parse a provider payload into a model
///
/// When `keep_raw` is set the original JSON value is attached through
/// [`ReceivedPayload::set_received`].
///
/// # Errors
///
/// Returns [`MsalAuthError::Serialization`] when the payload does not match
/// the model
pub fn parse_payload<T>(raw: serde_json::Value, keep_raw: bool) -> Result<T>
where
    T: DeserializeOwned + ReceivedPayload,
{
    if !keep_raw {
        return Ok(serde_json::from_value(raw).map_err(MsalAuthError::from)?);
    }

    let mut parsed: T = serde_json::from_value(raw.clone()).map_err(MsalAuthError::from)?;
    parsed.set_received(raw);
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Lenient provider number formats
// ---------------------------------------------------------------------------

/// `Option<u64>` seconds that accept a JSON number or a numeric string
pub(crate) mod lenient_seconds {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        match Option::<serde_json::Value>::deserialize(d)? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid seconds value: {}", n))),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid seconds value {}: {}", s, e))),
            Some(other) => Err(D::Error::custom(format!(
                "expected seconds, got {}",
                other
            ))),
        }
    }
}

/// `Option<DateTime<Utc>>` epoch seconds that accept a number or a numeric string
pub(crate) mod lenient_timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(&v.timestamp()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let secs = match Option::<serde_json::Value>::deserialize(d)? {
            None | Some(serde_json::Value::Null) => return Ok(None),
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", n)))?,
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| D::Error::custom(format!("invalid timestamp {}: {}", s, e)))?,
            Some(other) => {
                return Err(D::Error::custom(format!(
                    "expected epoch seconds, got {}",
                    other
                )))
            }
        };

        DateTime::<Utc>::from_timestamp(secs, 0)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", secs)))
    }
}
