//! The discovered address set: a cached, append-only index <-> address map.

use std::collections::HashMap;

use bitcoin::{Address, Script, ScriptBuf};

use crate::error::WalletError;
use crate::keys::KeyChain;

/// Ordered addresses `0..len` on the wallet's chain, plus the reverse map
/// from output script to derivation index used when signing.
///
/// The set only ever grows. Every entry is reproducible from the keychain,
/// so dropping the set loses nothing but work.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredAddressSet {
    addresses: Vec<Address>,
    by_script: HashMap<ScriptBuf, u32>,
    highest_used: Option<u32>,
}

impl DiscoveredAddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of derived addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Address at `index`, if derived.
    pub fn get(&self, index: u32) -> Option<&Address> {
        self.addresses.get(index as usize)
    }

    /// Derivation index of an address, if it belongs to the set.
    pub fn index_of(&self, address: &Address) -> Option<u32> {
        self.index_of_script(&address.script_pubkey())
    }

    /// Derivation index of an output script, if it belongs to the set.
    pub fn index_of_script(&self, script: &Script) -> Option<u32> {
        self.by_script.get(script).copied()
    }

    /// Derive addresses until the set holds at least `count` entries.
    /// Never shrinks.
    pub fn extend_to(&mut self, keychain: &KeyChain, count: u32) -> Result<(), WalletError> {
        while (self.addresses.len() as u64) < u64::from(count) {
            let index = self.addresses.len() as u32;
            let address = keychain.address_at(index)?;
            self.by_script.insert(address.script_pubkey(), index);
            self.addresses.push(address);
        }
        Ok(())
    }

    /// Make sure `index` is derived and return its address.
    pub fn ensure(&mut self, keychain: &KeyChain, index: u32) -> Result<&Address, WalletError> {
        let count = index
            .checked_add(1)
            .ok_or_else(|| WalletError::DerivationFailure(format!("index {index} out of range")))?;
        self.extend_to(keychain, count)?;
        self.addresses
            .get(index as usize)
            .ok_or_else(|| WalletError::DerivationFailure(format!("index {index} not derived")))
    }

    /// Record activity at `index`. The highest used index never decreases.
    pub fn mark_used(&mut self, index: u32) {
        self.highest_used = Some(self.highest_used.map_or(index, |h| h.max(index)));
    }

    /// Highest index with observed activity, `None` if nothing was used.
    pub fn highest_used(&self) -> Option<u32> {
        self.highest_used
    }

    /// First index after the highest used one (0 for a fresh wallet).
    pub fn first_unused(&self) -> u32 {
        self.highest_used.map_or(0, |h| h.saturating_add(1))
    }

    /// Iterate `(index, address)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Address)> {
        self.addresses
            .iter()
            .enumerate()
            .map(|(i, a)| (i as u32, a))
    }
}
