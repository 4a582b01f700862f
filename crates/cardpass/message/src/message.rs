use std::collections::BTreeMap;
use std::io::Cursor;

use pgp::composed::{Esk, Message};
use pgp::packet::PublicKeyEncryptedSessionKey;
use pgp::types::PkeskBytes;
use tracing::debug;

use crate::error::{Error, Result};

const ARMOR_BEGIN: &str = "-----BEGIN PGP ";

/// A parsed, still encrypted OpenPGP message
pub struct PgpMessage<'a> {
    message: Message<'a>,
    session_keys: BTreeMap<String, Vec<u8>>,
}

/// Parse a binary or ASCII armored OpenPGP message
///
/// Binary framing is tried first. If that fails the bytes are read as text and
/// decoded as armor.
pub fn parse_pgp_message(bytes: &[u8]) -> Result<PgpMessage<'_>> {
    let message = match Message::from_bytes(bytes) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "binary decode failed, trying armor");
            let text = std::str::from_utf8(bytes).map_err(|_| Error::UnrecognizedFormat)?;
            if !text.contains(ARMOR_BEGIN) {
                return Err(Error::UnrecognizedFormat);
            }
            let (message, _headers) = Message::from_armor(Cursor::new(text.as_bytes()))?;
            message
        }
    };

    let Message::Encrypted { esk, .. } = &message else {
        return Err(Error::NoEncryptedData);
    };
    let session_keys = session_keys(esk)?;
    Ok(PgpMessage {
        message,
        session_keys,
    })
}

/// Key id of every v3 recipient mapped to the payload the card deciphers
///
/// RSA payloads are the MPI magnitude. Other key types map to an empty payload so
/// their recipients are still listed.
fn session_keys(esk: &[Esk]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut keys = BTreeMap::new();
    for esk in esk {
        let Esk::PublicKeyEncryptedSessionKey(pkesk) = esk else {
            continue;
        };
        let PublicKeyEncryptedSessionKey::V3 { id, .. } = pkesk else {
            debug!("skipping session key packet that is not v3");
            continue;
        };

        let encrypted = match pkesk.values()? {
            PkeskBytes::Rsa { mpi } => {
                let mpi: &[u8] = mpi.as_ref();
                mpi.to_vec()
            }
            _ => Vec::new(),
        };
        keys.entry(id.to_string().to_uppercase())
            .or_insert(encrypted);
    }
    Ok(keys)
}

impl<'a> PgpMessage<'a> {
    /// Map each recipient key id to its encrypted session key
    ///
    /// Key ids are uppercase hex. When a key id appears in more than one packet the
    /// first one wins.
    pub const fn encrypted_session_keys(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.session_keys
    }

    pub(crate) fn into_inner(self) -> Message<'a> {
        self.message
    }
}

impl std::fmt::Debug for PgpMessage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgpMessage")
            .field("recipients", &self.session_keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
