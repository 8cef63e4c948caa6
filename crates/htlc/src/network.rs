//! Per-chain network parameters: base58 version bytes, WIF encoding, and
//! legacy address construction.
//!
//! The redeem script itself is network independent; only the derived P2SH
//! address, the P2PKH payout addresses, and WIF keys depend on these
//! parameters. Both supported ledgers share the Bitcoin transaction wire
//! format, so this is the only place the chains diverge.

use bitcoin::base58;
use bitcoin::secp256k1::SecretKey;
use zeroize::Zeroize;

use crate::{HtlcError, Result};

/// Dust threshold for a P2PKH output, in minor units. The companion ledger
/// uses the same convention.
pub const DUST_THRESHOLD: u64 = 546;

/// Base58 version bytes and serialization prefixes identifying one chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    /// Human-readable chain label, used in error messages only.
    pub name: &'static str,
    /// Version byte for P2PKH addresses.
    pub p2pkh_version: u8,
    /// Version byte for P2SH addresses.
    pub p2sh_version: u8,
    /// Version byte for WIF-encoded private keys.
    pub wif_version: u8,
    /// BIP32 extended public key prefix.
    pub bip32_public: [u8; 4],
    /// BIP32 extended private key prefix.
    pub bip32_private: [u8; 4],
    /// Prefix for signed messages.
    pub message_prefix: &'static str,
    /// Bech32 human-readable part, where the chain defines one. Unused by
    /// the legacy-only HTLC paths.
    pub bech32_hrp: Option<&'static str>,
    /// Minimum useful output value in minor units.
    pub dust_threshold: u64,
}

/// Decoded payload of a legacy base58check address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressPayload {
    /// HASH160 of a public key (P2PKH).
    PubkeyHash([u8; 20]),
    /// HASH160 of a redeem script (P2SH).
    ScriptHash([u8; 20]),
}

/// A private key decoded from WIF.
#[derive(Clone, Debug)]
pub struct DecodedKey {
    /// The secp256k1 secret key.
    pub secret: SecretKey,
    /// Whether the corresponding public key serializes compressed.
    pub compressed: bool,
}

impl NetworkParams {
    /// Bitcoin mainnet.
    pub const BITCOIN: Self = Self {
        name: "bitcoin",
        p2pkh_version: 0x00,
        p2sh_version: 0x05,
        wif_version: 0x80,
        bip32_public: [0x04, 0x88, 0xb2, 0x1e],
        bip32_private: [0x04, 0x88, 0xad, 0xe4],
        message_prefix: "\u{18}Bitcoin Signed Message:\n",
        bech32_hrp: Some("bc"),
        dust_threshold: DUST_THRESHOLD,
    };

    /// Bitcoin testnet.
    pub const BITCOIN_TESTNET: Self = Self {
        name: "bitcoin-testnet",
        p2pkh_version: 0x6f,
        p2sh_version: 0xc4,
        wif_version: 0xef,
        bip32_public: [0x04, 0x35, 0x87, 0xcf],
        bip32_private: [0x04, 0x35, 0x83, 0x94],
        message_prefix: "\u{18}Bitcoin Signed Message:\n",
        bech32_hrp: Some("tb"),
        dust_threshold: DUST_THRESHOLD,
    };

    /// Bitcoin regtest. Shares testnet version bytes.
    pub const BITCOIN_REGTEST: Self = Self {
        name: "bitcoin-regtest",
        p2pkh_version: 0x6f,
        p2sh_version: 0xc4,
        wif_version: 0xef,
        bip32_public: [0x04, 0x35, 0x87, 0xcf],
        bip32_private: [0x04, 0x35, 0x83, 0x94],
        message_prefix: "\u{18}Bitcoin Signed Message:\n",
        bech32_hrp: Some("bcrt"),
        dust_threshold: DUST_THRESHOLD,
    };

    /// The companion ledger, mainnet. Litecoin-derived parameter family.
    pub const ALT: Self = Self {
        name: "alt",
        p2pkh_version: 0x32,
        p2sh_version: 0x05,
        wif_version: 0xb2,
        bip32_public: [0x04, 0x88, 0xb2, 0x1e],
        bip32_private: [0x04, 0x88, 0xad, 0xe4],
        message_prefix: "\u{19}AltLedger Signed Message:\n",
        bech32_hrp: None,
        dust_threshold: DUST_THRESHOLD,
    };

    /// The companion ledger, testnet.
    pub const ALT_TESTNET: Self = Self {
        name: "alt-testnet",
        p2pkh_version: 0x6f,
        p2sh_version: 0xc4,
        wif_version: 0xef,
        bip32_public: [0x04, 0x35, 0x87, 0xcf],
        bip32_private: [0x04, 0x35, 0x83, 0x94],
        message_prefix: "\u{19}AltLedger Signed Message:\n",
        bech32_hrp: None,
        dust_threshold: DUST_THRESHOLD,
    };

    /// Base58check P2SH address for a script hash.
    #[must_use]
    pub fn p2sh_address(&self, script_hash: &[u8; 20]) -> String {
        versioned_base58(self.p2sh_version, script_hash)
    }

    /// Base58check P2PKH address for a public key hash.
    #[must_use]
    pub fn p2pkh_address(&self, pubkey_hash: &[u8; 20]) -> String {
        versioned_base58(self.p2pkh_version, pubkey_hash)
    }

    /// Decodes a legacy address into its payload, checking the version byte
    /// against this network.
    ///
    /// # Errors
    /// Returns `HtlcError::BadAddress` on checksum failure, wrong length, or
    /// a version byte belonging to neither address kind of this network.
    pub fn address_payload(&self, address: &str) -> Result<AddressPayload> {
        let data = base58::decode_check(address)
            .map_err(|e| HtlcError::BadAddress(format!("{address}: {e}")))?;
        if data.len() != 21 {
            return Err(HtlcError::BadAddress(format!(
                "{address}: payload is {} bytes, expected 21",
                data.len()
            )));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&data[1..]);
        match data[0] {
            v if v == self.p2pkh_version => Ok(AddressPayload::PubkeyHash(hash)),
            v if v == self.p2sh_version => Ok(AddressPayload::ScriptHash(hash)),
            v => Err(HtlcError::BadAddress(format!(
                "{address}: version byte {v:#04x} is not valid on {}",
                self.name
            ))),
        }
    }

    /// Decodes a WIF private key, validating it against this network.
    ///
    /// # Errors
    /// Returns `HtlcError::BadKey` on checksum failure, a foreign version
    /// byte, or key bytes outside the secp256k1 group order.
    pub fn decode_wif(&self, wif: &str) -> Result<DecodedKey> {
        let mut data =
            base58::decode_check(wif).map_err(|e| HtlcError::BadKey(e.to_string()))?;
        let result = self.decode_wif_payload(&data);
        data.zeroize();
        result
    }

    fn decode_wif_payload(&self, data: &[u8]) -> Result<DecodedKey> {
        let compressed = match data.len() {
            33 => false,
            34 if data[33] == 0x01 => true,
            34 => return Err(HtlcError::BadKey("bad compression flag".into())),
            n => return Err(HtlcError::BadKey(format!("payload is {n} bytes"))),
        };
        if data[0] != self.wif_version {
            return Err(HtlcError::BadKey(format!(
                "version byte {:#04x} is not a {} key",
                data[0], self.name
            )));
        }
        let secret = SecretKey::from_slice(&data[1..33])
            .map_err(|e| HtlcError::BadKey(e.to_string()))?;
        Ok(DecodedKey { secret, compressed })
    }

    /// Encodes a secret key as WIF for this network.
    #[must_use]
    pub fn encode_wif(&self, secret: &SecretKey, compressed: bool) -> String {
        let mut data = Vec::with_capacity(34);
        data.push(self.wif_version);
        data.extend_from_slice(&secret.secret_bytes());
        if compressed {
            data.push(0x01);
        }
        let encoded = base58::encode_check(&data);
        data.zeroize();
        encoded
    }
}

fn versioned_base58(version: u8, hash: &[u8; 20]) -> String {
    let mut data = [0u8; 21];
    data[0] = version;
    data[1..].copy_from_slice(hash);
    base58::encode_check(&data)
}
