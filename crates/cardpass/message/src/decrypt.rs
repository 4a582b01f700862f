use tracing::debug;
use zeroize::Zeroizing;

use crate::error::Result;
use crate::message::PgpMessage;
use crate::session_key::SessionKey;

/// Decrypt `message` with the raw session key the card returned
///
/// The session key checksum is validated before any decryption takes place. One
/// level of compression is unwrapped before the literal data is read.
pub fn decrypt_with_session_key(
    message: PgpMessage<'_>,
    raw_session_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let session_key = SessionKey::from_raw(raw_session_key)?;
    debug!(algorithm = ?session_key.algorithm(), "decrypting message body");

    let decrypted = message
        .into_inner()
        .decrypt_with_session_key(session_key.into_plain())?;
    let mut literal = if decrypted.is_compressed() {
        decrypted.decompress()?
    } else {
        decrypted
    };

    Ok(Zeroizing::new(
        literal.as_data_vec().map_err(pgp::errors::Error::from)?,
    ))
}
