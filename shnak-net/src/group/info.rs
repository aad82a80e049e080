// SPDX-License-Identifier: MIT OR Apache-2.0

use shnak_core::{Payload, PrivateKey, PublicKey, Value};

use crate::message::{GROUP_INFO, ITERATION_FIELD, MessageError};

const PRIVATE_KEY_FIELD: &str = "priv";
const PUBLIC_KEY_FIELD: &str = "pub";
const MEMBERS_FIELD: &str = "members";

/// Member of a group and the capabilities granted to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupMember {
    pub public_key: PublicKey,
    pub write: bool,
    pub read: bool,
}

impl GroupMember {
    pub fn new(public_key: PublicKey, write: bool, read: bool) -> Self {
        Self {
            public_key,
            write,
            read,
        }
    }
}

/// Capability state sent by the group root to one member.
///
/// The private key of the group's inner identity grants read access, its public key grants write
/// access.
#[derive(Clone, Debug)]
pub struct GroupInfo {
    pub iteration: u32,
    pub private_key: Option<PrivateKey>,
    pub public_key: Option<PublicKey>,
    pub members: Vec<PublicKey>,
}

impl GroupInfo {
    pub fn to_payload(&self) -> Payload {
        let private_key = self
            .private_key
            .as_ref()
            .map(|key| Value::from(&key.as_bytes()[..]))
            .unwrap_or(Value::Null);
        let public_key = self.public_key.map(Value::from).unwrap_or(Value::Null);
        let members = self
            .members
            .iter()
            .copied()
            .map(Value::from)
            .collect::<Vec<Value>>();

        Payload::with_kind(GROUP_INFO)
            .with(ITERATION_FIELD, self.iteration)
            .with(PRIVATE_KEY_FIELD, private_key)
            .with(PUBLIC_KEY_FIELD, public_key)
            .with(MEMBERS_FIELD, members)
    }

    pub fn from_payload(payload: &Payload) -> Result<Self, MessageError> {
        let kind = payload.kind().ok_or(MessageError::MissingKind)?;
        if kind != GROUP_INFO {
            return Err(MessageError::UnexpectedKind(kind));
        }

        let iteration = payload
            .integer(ITERATION_FIELD)
            .ok_or(MessageError::MissingField(ITERATION_FIELD))?;
        let iteration =
            u32::try_from(iteration).map_err(|_| MessageError::InvalidValue("iteration"))?;

        let private_key = optional_bytes(payload, PRIVATE_KEY_FIELD)?
            .map(PrivateKey::try_from)
            .transpose()?;
        let public_key = optional_bytes(payload, PUBLIC_KEY_FIELD)?
            .map(PublicKey::try_from)
            .transpose()?;

        let members = payload
            .get(MEMBERS_FIELD)
            .and_then(Value::as_array)
            .ok_or(MessageError::MissingField(MEMBERS_FIELD))?
            .iter()
            .map(|member| -> Result<PublicKey, MessageError> {
                let bytes = member
                    .as_bytes()
                    .ok_or(MessageError::InvalidValue("member"))?;
                Ok(PublicKey::try_from(bytes)?)
            })
            .collect::<Result<Vec<PublicKey>, MessageError>>()?;

        Ok(Self {
            iteration,
            private_key,
            public_key,
            members,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(self.to_payload().to_bytes()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        Self::from_payload(&Payload::from_bytes(bytes)?)
    }
}

/// Absent and null fields are both treated as "not granted".
fn optional_bytes<'a>(
    payload: &'a Payload,
    field: &'static str,
) -> Result<Option<&'a [u8]>, MessageError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bytes(bytes)) => Ok(Some(bytes)),
        Some(_) => Err(MessageError::InvalidValue(field)),
    }
}
