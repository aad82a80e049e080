// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire format of frames exchanged with the remote peer.
//!
//! Every frame is a CBOR map carrying its kind in the `K` field. Publications (`K = -4`) wrap the
//! encoded application payload `m` together with the publisher's key `p` and the signature `s`
//! over the content hash of both. Subscribe intents (`K = -2`) tell the peer that we want to
//! receive traffic.
use shnak_core::filter::Operator;
use shnak_core::{
    DecodeError, EncodeError, Filter, FilterError, Hash, Identity, IdentityError, Payload,
    PublicKey, Signature, Value,
};
use thiserror::Error;

/// Frame kind of signed publications.
pub const PUBLISH: i64 = -4;

/// Frame kind of subscribe intents.
pub const SUBSCRIBE: i64 = -2;

/// Payload kind of encrypted group traffic, both group info and broadcasts.
pub const BROADCAST: i64 = 2;

/// Payload kind of certificate announcements.
pub const ANNOUNCE: i64 = 100;

/// Payload kind of decrypted group info.
pub const GROUP_INFO: i64 = 101;

/// Field carrying ciphertext in encrypted payloads.
pub const DATA_FIELD: &str = "d";

/// Field carrying the iteration in group info and announcements.
pub const ITERATION_FIELD: &str = "I";

const PAYLOAD_FIELD: &str = "m";
const SIGNATURE_FIELD: &str = "s";
const PUBLIC_KEY_FIELD: &str = "p";
const CHANNEL_FIELD: &str = "c";

/// Signed publication of an encoded payload.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishMessage {
    pub payload: Vec<u8>,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl PublishMessage {
    /// Signs the content hash of the encoded payload with the given identity.
    pub fn sign(payload: Vec<u8>, identity: &Identity) -> Self {
        let public_key = identity.public_key();
        let hash = Hash::of_publication(&public_key, &payload);
        Self {
            signature: identity.sign(&hash),
            payload,
            public_key,
        }
    }

    pub fn hash(&self) -> Hash {
        Hash::of_publication(&self.public_key, &self.payload)
    }

    /// Returns the content hash if the signature is valid.
    pub fn verify(&self) -> Result<Hash, IdentityError> {
        let hash = self.hash();
        self.public_key.verify(hash.as_bytes(), &self.signature)?;
        Ok(hash)
    }
}

/// Frame exchanged with the remote peer.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    Publish(PublishMessage),
    Subscribe { channel: i64 },
    Unknown(i64),
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        let payload = match self {
            Envelope::Publish(message) => Payload::with_kind(PUBLISH)
                .with(PAYLOAD_FIELD, message.payload.clone())
                .with(SIGNATURE_FIELD, &message.signature.as_bytes()[..])
                .with(PUBLIC_KEY_FIELD, message.public_key),
            Envelope::Subscribe { channel } => {
                Payload::with_kind(SUBSCRIBE).with(CHANNEL_FIELD, *channel)
            }
            Envelope::Unknown(kind) => Payload::with_kind(*kind),
        };
        Ok(payload.to_bytes()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let frame = Payload::from_bytes(bytes)?;
        let kind = frame.kind().ok_or(MessageError::MissingKind)?;

        match kind {
            PUBLISH => {
                let payload = frame
                    .bytes(PAYLOAD_FIELD)
                    .ok_or(MessageError::MissingField(PAYLOAD_FIELD))?;
                let public_key = frame
                    .bytes(PUBLIC_KEY_FIELD)
                    .ok_or(MessageError::MissingField(PUBLIC_KEY_FIELD))?;
                let signature = frame
                    .bytes(SIGNATURE_FIELD)
                    .ok_or(MessageError::MissingField(SIGNATURE_FIELD))?;

                Ok(Envelope::Publish(PublishMessage {
                    payload: payload.to_vec(),
                    signature: Signature::try_from(signature)?,
                    public_key: PublicKey::try_from(public_key)?,
                }))
            }
            SUBSCRIBE => Ok(Envelope::Subscribe {
                channel: frame.integer(CHANNEL_FIELD).unwrap_or_default(),
            }),
            kind => Ok(Envelope::Unknown(kind)),
        }
    }
}

/// Statement about a key and the traffic it is allowed to publish, part of an announcement.
#[derive(Clone, Debug, PartialEq)]
pub struct Certificate {
    pub public_key: PublicKey,
    pub status: i64,
    pub filters: Vec<Filter>,
}

impl From<&Certificate> for Value {
    fn from(certificate: &Certificate) -> Self {
        let filters = certificate
            .filters
            .iter()
            .map(|filter| {
                Value::Array(vec![
                    Value::from(filter.field()),
                    Value::from(filter.operator().as_str()),
                    filter.value().clone(),
                ])
            })
            .collect::<Vec<Value>>();

        Value::Array(vec![
            Value::from(certificate.public_key),
            Value::Integer(certificate.status),
            Value::Array(filters),
        ])
    }
}

impl TryFrom<&Value> for Certificate {
    type Error = MessageError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let [public_key, status, filters] = value
            .as_array()
            .ok_or(MessageError::InvalidValue("certificate"))?
        else {
            return Err(MessageError::InvalidValue("certificate"));
        };

        let public_key = public_key
            .as_bytes()
            .ok_or(MessageError::InvalidValue("certificate key"))?;
        let status = status
            .as_integer()
            .ok_or(MessageError::InvalidValue("certificate status"))?;
        let filters = filters
            .as_array()
            .ok_or(MessageError::InvalidValue("certificate filters"))?
            .iter()
            .map(filter_from_value)
            .collect::<Result<Vec<Filter>, MessageError>>()?;

        Ok(Self {
            public_key: PublicKey::try_from(public_key)?,
            status,
            filters,
        })
    }
}

fn filter_from_value(value: &Value) -> Result<Filter, MessageError> {
    let Some([field, operator, literal]) = value.as_array() else {
        return Err(MessageError::InvalidValue("filter"));
    };
    let field = field
        .as_text()
        .ok_or(MessageError::InvalidValue("filter field"))?;
    let operator: Operator = operator
        .as_text()
        .ok_or(MessageError::InvalidValue("filter operator"))?
        .parse()?;
    Ok(Filter::new(field, operator, literal.clone()))
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("message is missing kind field")]
    MissingKind,

    #[error("message is missing field \"{0}\"")]
    MissingField(&'static str),

    #[error("unexpected message kind {0}")]
    UnexpectedKind(i64),

    #[error("invalid {0} value")]
    InvalidValue(&'static str),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use shnak_core::{Filter, Identity, Payload, Value};

    use super::{Certificate, Envelope, MessageError, PUBLISH, PublishMessage, SUBSCRIBE};

    #[test]
    fn publish_frame() {
        let identity = Identity::from_seed([1; 32]);
        let payload = Payload::with_kind(20).to_bytes().unwrap();
        let message = PublishMessage::sign(payload.clone(), &identity);

        let bytes = Envelope::Publish(message.clone()).to_bytes().unwrap();
        let frame = Payload::from_bytes(&bytes).unwrap();
        assert_eq!(frame.kind(), Some(PUBLISH));
        assert_eq!(frame.bytes("m"), Some(&payload[..]));
        assert_eq!(frame.bytes("p"), Some(&identity.public_key().as_bytes()[..]));
        assert_eq!(frame.bytes("s").map(|s| s.len()), Some(64));

        let Envelope::Publish(decoded) = Envelope::from_bytes(&bytes).unwrap() else {
            panic!("expected publish frame");
        };
        assert_eq!(decoded, message);
        assert_eq!(decoded.verify().unwrap(), message.hash());
    }

    #[test]
    fn subscribe_frame() {
        let bytes = Envelope::Subscribe { channel: 0 }.to_bytes().unwrap();
        let frame = Payload::from_bytes(&bytes).unwrap();
        assert_eq!(frame, Payload::with_kind(SUBSCRIBE).with("c", 0));
    }

    #[test]
    fn tampered_publication() {
        let identity = Identity::from_seed([1; 32]);
        let mut message = PublishMessage::sign(vec![1, 2, 3], &identity);
        assert!(message.verify().is_ok());

        message.payload = vec![1, 2, 4];
        assert!(message.verify().is_err());

        // Signature of someone else.
        let mut message = PublishMessage::sign(vec![1, 2, 3], &identity);
        message.public_key = Identity::from_seed([2; 32]).public_key();
        assert!(message.verify().is_err());
    }

    #[test]
    fn missing_fields() {
        let bytes = Payload::new().with("m", vec![1u8]).to_bytes().unwrap();
        assert_matches!(Envelope::from_bytes(&bytes), Err(MessageError::MissingKind));

        let identity = Identity::from_seed([1; 32]);
        let bytes = Payload::with_kind(PUBLISH)
            .with("m", vec![1u8])
            .with("p", identity.public_key())
            .to_bytes()
            .unwrap();
        assert_matches!(
            Envelope::from_bytes(&bytes),
            Err(MessageError::MissingField("s"))
        );

        let bytes = Payload::with_kind(PUBLISH)
            .with("m", vec![1u8])
            .with("p", vec![1u8, 2, 3])
            .with("s", vec![0u8; 64])
            .to_bytes()
            .unwrap();
        assert_matches!(
            Envelope::from_bytes(&bytes),
            Err(MessageError::Identity(_))
        );

        assert_matches!(
            Envelope::from_bytes(&[0xff, 0x00]),
            Err(MessageError::Decode(_))
        );
    }

    #[test]
    fn unknown_kind() {
        let bytes = Payload::with_kind(7).to_bytes().unwrap();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), Envelope::Unknown(7));
    }

    #[test]
    fn certificate_value() {
        let certificate = Certificate {
            public_key: Identity::from_seed([1; 32]).public_key(),
            status: 1,
            filters: vec![Filter::equals("K", 20)],
        };

        let value = Value::from(&certificate);
        let Value::Array(parts) = &value else {
            panic!("expected certificate triple");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(Certificate::try_from(&value).unwrap(), certificate);

        assert_matches!(
            Certificate::try_from(&Value::Integer(1)),
            Err(MessageError::InvalidValue("certificate"))
        );
    }
}
