//! GnuPG produced fixtures and their session keys
//!
//! See `tests/fixtures/README.md` for how they were made. The session keys are the
//! `--show-session-key` output of gpg, `algorithm:key` in hex.

#![allow(dead_code, unreachable_pub)]

use std::path::PathBuf;

use cardpass_message::checksum;

pub const PLAINTEXT: &[u8] = b"hunter2\nuser: alice\n";

/// Encryption subkey ids of the fixture recipients
pub const ALICE: &str = "5C5E7AF3E791E7DB";
pub const BOB: &str = "612592E33AE81213";
/// cv25519 recipient
pub const CAROL: &str = "971777E83AA19858";

/// Fixture file names and the session key each was encrypted with
pub const SESSION_KEYS: &[(&str, &str)] = &[
    ("aes128.gpg", "7:28C15CA9AB742C98B8E3CDF0DCF9DB8D"),
    ("armored.asc", "9:BB709D354D791E1E371E7F9399673BCFF8F11E9F9B939DC6A9CBD2AA7B94FE60"),
    ("bob.gpg", "9:7BCC6E88790F8DCB37C2FA2035640E0AD3FDF4875B1529BF1BA60FE8519AA5C4"),
    ("bzip2.gpg", "9:0BC07A20702ED37D025A99B68ECB3A3BAFF048A283C19E1139167374A93365F5"),
    ("empty.gpg", "9:A270759814C3510141579687ED428F2440DFFFB37A155A194E07CCBE8769292B"),
    ("recipients.gpg", "9:06247A64C1D8E1648F496E72ADCBE28E3910A9ED45997FAB81FFE8FDFD9713C1"),
    ("tripledes.gpg", "2:F0721E4A86C523113C6EB454C6FA81255F7656B769D90FF6"),
    ("uncompressed.gpg", "9:F3D1930D5B14CEA3C197C93D7DFE9BD7A2FE387CD1DD91EB7238AEE65E0FB630"),
    ("zip.gpg", "9:F73A2A348162BA21CDC77127ABD484A5CA0AB93B23E5EAD2FAB6D67A3BE82CAA"),
    ("zlib.gpg", "9:833C958356C7C533F46B9BC15B8A61CE6D0CC880C0FEEAEACD0F1D9CFE071C60"),
];

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture(name: &str) -> Vec<u8> {
    let path = fixtures_dir().join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
}

/// What the card returns for `name`: algorithm, key and checksum
pub fn raw_session_key(name: &str) -> Vec<u8> {
    let (_, session_key) = SESSION_KEYS
        .iter()
        .find(|(file, _)| *file == name)
        .unwrap_or_else(|| panic!("no session key for {name}"));
    let (algorithm, key) = session_key.split_once(':').unwrap();
    let key = hex::decode(key).unwrap();

    let mut raw = vec![algorithm.parse::<u8>().unwrap()];
    raw.extend_from_slice(&key);
    raw.extend_from_slice(&checksum(&key).to_be_bytes());
    raw
}
