//! Seed management and BIP-32 key derivation along the BIP-84 path.
//!
//! The master key is derived once from the seed and owned by the
//! [`KeyChain`]. Child keys along `m/84'/coin'/account'/chain/index` are
//! recomputed on demand and never stored: callers borrow a [`ChildKey`]
//! for the duration of one operation.

use std::fmt;

use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey, Network};
use satchel_core::constants::{BIP84_PURPOSE, coin_type};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::WalletError;
use crate::mnemonic::parse_mnemonic;

/// A 64-byte BIP-39 seed (mnemonic stretched with the passphrase).
///
/// Secret material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 64],
}

impl Seed {
    /// Stretch a mnemonic and passphrase into a binary seed.
    ///
    /// A different passphrase yields an unrelated derivation tree.
    pub fn from_mnemonic(mnemonic: &Mnemonic, passphrase: &str) -> Self {
        Self {
            bytes: mnemonic.to_seed(passphrase),
        }
    }

    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// A derived child key, borrowed for one signing or address operation.
pub struct ChildKey {
    index: u32,
    secret: SecretKey,
    public: CompressedPublicKey,
}

impl ChildKey {
    /// Derivation index on the wallet's chain.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Compressed public key.
    pub fn public_key(&self) -> CompressedPublicKey {
        self.public
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl Drop for ChildKey {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl fmt::Debug for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildKey")
            .field("index", &self.index)
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Witness-pubkey-hash address for a child key.
///
/// Pure function of the public key and network.
pub fn address_for(child: &ChildKey, network: Network) -> Address {
    Address::p2wpkh(&child.public_key(), network)
}

/// The root of a wallet's derivation tree.
///
/// Holds the master extended key and the account-level key derived from it
/// once at construction; every address key is derived from the account key.
pub struct KeyChain {
    master: Xpriv,
    account_key: Xpriv,
    network: Network,
    account: u32,
    chain: u32,
    secp: Secp256k1<All>,
}

impl KeyChain {
    /// Parse a mnemonic, stretch it with the passphrase and derive the root.
    ///
    /// Fails with [`WalletError::InvalidMnemonic`] if the phrase fails its
    /// word-list or checksum validation.
    pub fn derive_root(
        phrase: &str,
        passphrase: &str,
        network: Network,
        account: u32,
        chain: u32,
    ) -> Result<Self, WalletError> {
        let mnemonic = parse_mnemonic(phrase)?;
        let seed = Seed::from_mnemonic(&mnemonic, passphrase);
        Self::from_seed(&seed, network, account, chain)
    }

    /// Derive the root from an already-stretched seed.
    pub fn from_seed(
        seed: &Seed,
        network: Network,
        account: u32,
        chain: u32,
    ) -> Result<Self, WalletError> {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(network, seed.as_bytes())?;
        let path = account_path(network, account)?;
        let account_key = master.derive_priv(&secp, &path)?;
        Ok(Self {
            master,
            account_key,
            network,
            account,
            chain,
            secp,
        })
    }

    /// Derive the child key at `index` on the wallet's chain.
    ///
    /// Deterministic: the same root and index always yield the same key.
    pub fn derive_child(&self, index: u32) -> Result<ChildKey, WalletError> {
        let path = [
            ChildNumber::from_normal_idx(self.chain)?,
            ChildNumber::from_normal_idx(index)?,
        ];
        let child = self.account_key.derive_priv(&self.secp, &path)?;
        let public = CompressedPublicKey(PublicKey::from_secret_key(
            &self.secp,
            &child.private_key,
        ));
        Ok(ChildKey {
            index,
            secret: child.private_key,
            public,
        })
    }

    /// The address at `index` on the wallet's chain.
    pub fn address_at(&self, index: u32) -> Result<Address, WalletError> {
        let child = self.derive_child(index)?;
        Ok(address_for(&child, self.network))
    }

    /// Full derivation path of the address at `index`.
    pub fn path_for(&self, index: u32) -> Result<DerivationPath, WalletError> {
        let path = account_path(self.network, self.account)?;
        Ok(path.extend([
            ChildNumber::from_normal_idx(self.chain)?,
            ChildNumber::from_normal_idx(index)?,
        ]))
    }

    /// Human-readable path template, e.g. `m/84'/1'/0'/0/*`.
    pub fn path_template(&self) -> String {
        format!(
            "m/{BIP84_PURPOSE}'/{}'/{}'/{}/*",
            coin_type(self.network),
            self.account,
            self.chain
        )
    }

    /// Account-level extended public key (watch-only export).
    pub fn account_xpub(&self) -> Xpub {
        Xpub::from_priv(&self.secp, &self.account_key)
    }

    /// Master key fingerprint.
    pub fn fingerprint(&self) -> bitcoin::bip32::Fingerprint {
        self.master.fingerprint(&self.secp)
    }

    /// The network this keychain derives addresses for.
    pub fn network(&self) -> Network {
        self.network
    }

    /// The account index.
    pub fn account(&self) -> u32 {
        self.account
    }

    /// The chain (0 external, 1 internal) addresses are derived on.
    pub fn chain(&self) -> u32 {
        self.chain
    }

    pub(crate) fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("network", &self.network)
            .field("path", &self.path_template())
            .field("master", &"[REDACTED]")
            .finish()
    }
}

/// `m/84'/coin'/account'` for the given network.
fn account_path(network: Network, account: u32) -> Result<DerivationPath, WalletError> {
    Ok(DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(BIP84_PURPOSE)?,
        ChildNumber::from_hardened_idx(coin_type(network))?,
        ChildNumber::from_hardened_idx(account)?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    fn testnet_chain(passphrase: &str) -> KeyChain {
        KeyChain::derive_root(ABANDON_ABOUT, passphrase, Network::Testnet, 0, 0).unwrap()
    }

    #[test]
    fn canonical_testnet_vector() {
        let kc = testnet_chain("");
        assert_eq!(
            kc.address_at(0).unwrap().to_string(),
            "tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl"
        );
        assert_eq!(
            kc.address_at(1).unwrap().to_string(),
            "tb1qd7spv5q28348xl4myc8zmh983w5jx32cjhkn97"
        );
        assert_eq!(
            kc.address_at(2).unwrap().to_string(),
            "tb1qxdyjf6h5d6qxap4n2dap97q4j5ps6ua8sll0ct"
        );
    }

    #[test]
    fn canonical_mainnet_vector() {
        let kc = KeyChain::derive_root(ABANDON_ABOUT, "", Network::Bitcoin, 0, 0).unwrap();
        assert_eq!(
            kc.address_at(0).unwrap().to_string(),
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        );
    }

    #[test]
    fn seed_matches_bip39_vector() {
        let m = parse_mnemonic(ABANDON_ABOUT).unwrap();
        let seed = Seed::from_mnemonic(&m, "");
        assert_eq!(
            hex::encode(seed.as_bytes()),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn passphrase_changes_tree() {
        let plain = testnet_chain("");
        let salted = testnet_chain("TREZOR");
        assert_eq!(
            salted.address_at(0).unwrap().to_string(),
            "tb1qfwxzlmn42rh6wu6gt4f0yrfpe4gf0jtwgxagrr"
        );
        assert_ne!(plain.address_at(0).unwrap(), salted.address_at(0).unwrap());
    }

    #[test]
    fn derive_deterministic() {
        let a = testnet_chain("pass");
        let b = testnet_chain("pass");
        for i in [0, 1, 19, 500] {
            let ka = a.derive_child(i).unwrap();
            let kb = b.derive_child(i).unwrap();
            assert_eq!(ka.public_key(), kb.public_key());
            assert_eq!(ka.secret_key(), kb.secret_key());
        }
        assert_eq!(a.account_xpub(), b.account_xpub());
    }

    #[test]
    fn derive_unique_per_index() {
        let kc = testnet_chain("");
        assert_ne!(
            kc.derive_child(0).unwrap().public_key(),
            kc.derive_child(1).unwrap().public_key()
        );
    }

    #[test]
    fn address_for_is_pure() {
        let kc = testnet_chain("");
        let child = kc.derive_child(7).unwrap();
        assert_eq!(
            address_for(&child, Network::Testnet),
            address_for(&child, Network::Testnet)
        );
        assert_eq!(address_for(&child, Network::Testnet), kc.address_at(7).unwrap());
    }

    #[test]
    fn invalid_mnemonic_rejected() {
        let err = KeyChain::derive_root("abandon abandon", "", Network::Testnet, 0, 0).unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
    }

    #[test]
    fn hardened_index_is_derivation_failure() {
        let kc = testnet_chain("");
        let err = kc.derive_child(1 << 31).unwrap_err();
        assert!(matches!(err, WalletError::DerivationFailure(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn path_for_matches_template() {
        let kc = testnet_chain("");
        let expected = DerivationPath::from_str("m/84'/1'/0'/0/5").unwrap();
        assert_eq!(kc.path_for(5).unwrap(), expected);
        assert_eq!(kc.path_template(), "m/84'/1'/0'/0/*");
    }

    #[test]
    fn seed_debug_hides_bytes() {
        let seed = Seed::from_bytes([0xAB; 64]);
        let debug = format!("{seed:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("ab"));
    }

    #[test]
    fn keychain_debug_hides_master() {
        let kc = testnet_chain("");
        let debug = format!("{kc:?}");
        assert!(debug.contains("KeyChain"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("tprv"));
    }
}
