// SPDX-License-Identifier: MIT OR Apache-2.0

//! Latest certificate announcement of every publisher.
//!
//! Publishers announce the set of keys they certify together with an iteration. A newer iteration
//! replaces the whole previous set, older or equal ones are ignored.
use std::collections::HashMap;

use shnak_core::{Payload, PublicKey};

use crate::message::{Certificate, ITERATION_FIELD, MessageError};

/// Field carrying the certificates of an announcement.
pub const CERTIFICATES_FIELD: &str = "certs";

/// Certificate set announced by one publisher.
#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    pub iteration: u32,
    pub certificates: Vec<Certificate>,
}

impl Announcement {
    pub fn from_payload(payload: &Payload) -> Result<Self, MessageError> {
        let iteration = payload
            .integer(ITERATION_FIELD)
            .ok_or(MessageError::MissingField(ITERATION_FIELD))?;
        let iteration =
            u32::try_from(iteration).map_err(|_| MessageError::InvalidValue("iteration"))?;

        let certificates = payload
            .get(CERTIFICATES_FIELD)
            .and_then(|value| value.as_array())
            .ok_or(MessageError::MissingField(CERTIFICATES_FIELD))?
            .iter()
            .map(Certificate::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            iteration,
            certificates,
        })
    }
}

#[derive(Debug, Default)]
pub struct Announcements {
    by_publisher: HashMap<PublicKey, Announcement>,
    origins: HashMap<PublicKey, PublicKey>,
}

impl Announcements {
    /// Stores the announcement if it is newer than what we know from this publisher.
    ///
    /// Returns `true` if it replaced the previous certificate set.
    pub fn insert(&mut self, publisher: PublicKey, announcement: Announcement) -> bool {
        if self
            .by_publisher
            .get(&publisher)
            .is_some_and(|previous| previous.iteration >= announcement.iteration)
        {
            return false;
        }

        for certificate in &announcement.certificates {
            self.origins.insert(certificate.public_key, publisher);
        }
        let previous = self.by_publisher.insert(publisher, announcement);

        // Keys this publisher stopped certifying fall back to any other publisher still listing
        // them.
        for certificate in previous.iter().flat_map(|previous| &previous.certificates) {
            let key = certificate.public_key;
            if self.origins.get(&key) == Some(&publisher) && !self.certifies(&publisher, &key) {
                match self.find_origin(&key) {
                    Some(other) => self.origins.insert(key, other),
                    None => self.origins.remove(&key),
                };
            }
        }

        true
    }

    fn certifies(&self, publisher: &PublicKey, public_key: &PublicKey) -> bool {
        self.by_publisher.get(publisher).is_some_and(|announcement| {
            announcement
                .certificates
                .iter()
                .any(|certificate| &certificate.public_key == public_key)
        })
    }

    fn find_origin(&self, public_key: &PublicKey) -> Option<PublicKey> {
        self.by_publisher
            .keys()
            .find(|publisher| self.certifies(publisher, public_key))
            .copied()
    }

    pub fn get(&self, publisher: &PublicKey) -> Option<&Announcement> {
        self.by_publisher.get(publisher)
    }

    /// Publisher who certified the given key and the certificate it issued.
    pub fn origin(&self, public_key: &PublicKey) -> Option<(PublicKey, &Certificate)> {
        let publisher = self.origins.get(public_key)?;
        let certificate = self
            .by_publisher
            .get(publisher)?
            .certificates
            .iter()
            .find(|certificate| &certificate.public_key == public_key)?;
        Some((*publisher, certificate))
    }
}
