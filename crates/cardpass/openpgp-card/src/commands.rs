//! OpenPGP card command builders

use cardpass_apdu_core::Command;
use zeroize::Zeroizing;

use crate::constants::{OPENPGP_AID, PW1_DECRYPT, ins};

/// SELECT the OpenPGP application by AID
pub fn select_openpgp() -> Command {
    Command::new_with_data(0x00, ins::SELECT, 0x04, 0x00, OPENPGP_AID)
}

/// GET DATA for a data object tag
pub const fn get_data(tag: u16) -> Command {
    let [p1, p2] = tag.to_be_bytes();
    Command::new(0x00, ins::GET_DATA, p1, p2)
}

/// Raw VERIFY frame for PW1 in decryption mode, wiped on drop
///
/// Returns `None` when the PIN does not fit a short APDU.
pub fn verify_pin_frame(pin: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    let length = u8::try_from(pin.len()).ok()?;
    let mut frame = Zeroizing::new(Vec::with_capacity(5 + pin.len()));
    frame.extend_from_slice(&[0x00, ins::VERIFY, 0x00, PW1_DECRYPT, length]);
    frame.extend_from_slice(pin);
    Some(frame)
}

/// PSO:DECIPHER of an RSA cryptogram, prefixed with the padding indicator byte
pub fn decipher(cryptogram: &[u8]) -> Command {
    let mut data = Vec::with_capacity(cryptogram.len() + 1);
    data.push(0x00);
    data.extend_from_slice(cryptogram);
    Command::new_with_data(0x00, ins::PSO, 0x80, 0x86, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardpass_apdu_core::Capabilities;

    #[test]
    fn test_select() {
        let frames = select_openpgp().frames(Capabilities::NONE).unwrap();
        assert_eq!(
            frames[0].as_ref(),
            &[0x00, 0xA4, 0x04, 0x00, 0x06, 0xD2, 0x76, 0x00, 0x01, 0x24, 0x01, 0x00]
        );
    }

    #[test]
    fn test_get_data() {
        let cmd = get_data(0x5F52);
        assert_eq!(cmd.header(), [0x00, 0xCA, 0x5F, 0x52]);
        assert_eq!(get_data(0x006E).header(), [0x00, 0xCA, 0x00, 0x6E]);
    }

    #[test]
    fn test_verify_and_decipher() {
        let frame = verify_pin_frame(b"123456").unwrap();
        assert_eq!(
            frame.as_slice(),
            &[0x00, 0x20, 0x00, 0x82, 0x06, b'1', b'2', b'3', b'4', b'5', b'6']
        );
        assert!(verify_pin_frame(&[0x30; 256]).is_none());

        let cmd = decipher(&[0xAA, 0xBB]);
        assert_eq!(cmd.header(), [0x00, 0x2A, 0x80, 0x86]);
        assert_eq!(cmd.data().as_ref(), &[0x00, 0xAA, 0xBB]);
        assert!(cmd.expects_response());
    }
}
