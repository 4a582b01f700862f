//! OpenPGP card constants

/// OpenPGP card application identifier (RID D2 76 00 01 24, application 01)
pub const OPENPGP_AID: &[u8] = b"\xD2\x76\x00\x01\x24\x01";

/// Key type byte of an RSA key in the algorithm attributes
pub const KEY_TYPE_RSA: u8 = 0x01;

/// Offset of the decryption key fingerprint in the fingerprints data object
pub const DECRYPTION_FINGERPRINT_RANGE: core::ops::Range<usize> = 20..40;

/// Index of the user PIN retry counter in the PW status bytes
pub const PW1_TRIES_INDEX: usize = 4;

/// Instruction bytes
pub mod ins {
    /// SELECT
    pub const SELECT: u8 = 0xA4;
    /// GET DATA
    pub const GET_DATA: u8 = 0xCA;
    /// VERIFY
    pub const VERIFY: u8 = 0x20;
    /// PERFORM SECURITY OPERATION
    pub const PSO: u8 = 0x2A;
}

/// Data object tags
pub mod tags {
    /// Historical bytes, COMPACT-TLV encoded
    pub const HISTORICAL_BYTES: u16 = 0x5F52;
    /// Application related data template containing:
    /// - DISCRETIONARY_DATA, which carries the algorithm attributes,
    ///   PW status bytes and fingerprints below
    pub const APPLICATION_RELATED_DATA: u16 = 0x006E;
    /// Algorithm attributes of the decryption key
    pub const ALGORITHM_ATTRIBUTES_DECRYPTION: u32 = 0xC2;
    /// PW status bytes (7 bytes, retry counters from index 4)
    pub const PW_STATUS: u32 = 0xC4;
    /// Fingerprints of the signature, decryption and authentication keys (3 x 20 bytes)
    pub const FINGERPRINTS: u32 = 0xC5;
}

/// P2 of VERIFY selecting PW1 for decryption
pub const PW1_DECRYPT: u8 = 0x82;
