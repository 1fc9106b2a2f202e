//! Transaction construction and signing as a one-way state machine.
//!
//! `TransactionBuilder` (empty) -> [`InputsAdded`] -> [`UnsignedTransaction`]
//! (outputs added) -> [`SignedTransaction`] -> [`FinalizedTransaction`].
//! Every transition consumes the previous state, so a finalized
//! transaction can never be reopened; a new send starts from a new plan.

use std::collections::HashSet;

use bitcoin::consensus::encode;
use bitcoin::ecdsa;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::Message;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    absolute,
};
use satchel_core::constants::DUST_THRESHOLD;
use satchel_core::types::Utxo;
use tracing::debug;

use crate::addresses::DiscoveredAddressSet;
use crate::coin_selection::{CoinSelector, SpendPlan};
use crate::error::WalletError;
use crate::keys::{KeyChain, address_for};

/// What the signer needs to know about the output an input spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    pub outpoint: OutPoint,
    pub value: u64,
    pub address: Address,
}

/// Empty state.
#[derive(Debug, Default)]
pub struct TransactionBuilder;

impl TransactionBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Add one input per output, signalling replace-by-fee.
    pub fn add_inputs(self, utxos: &[Utxo]) -> Result<InputsAdded, WalletError> {
        if utxos.is_empty() {
            return Err(WalletError::NoUtxos);
        }
        let mut seen = HashSet::with_capacity(utxos.len());
        let mut inputs = Vec::with_capacity(utxos.len());
        let mut total_input: u64 = 0;
        for utxo in utxos {
            if !seen.insert(utxo.outpoint) {
                return Err(WalletError::InvalidTransaction(format!(
                    "outpoint {} spent twice",
                    utxo.outpoint
                )));
            }
            total_input = total_input
                .checked_add(utxo.value)
                .ok_or_else(|| WalletError::InvalidAmount("input total overflows".into()))?;
            inputs.push(InputDescriptor {
                outpoint: utxo.outpoint,
                value: utxo.value,
                address: utxo.address.clone(),
            });
        }
        Ok(InputsAdded {
            inputs,
            total_input,
        })
    }

    /// Run the first two transitions for a priced plan.
    ///
    /// `change_address` is only consulted when the plan has change.
    pub fn from_plan(
        plan: &SpendPlan,
        change_address: Option<&Address>,
    ) -> Result<UnsignedTransaction, WalletError> {
        Self::new().add_inputs(&plan.selected)?.add_outputs(
            &plan.recipient,
            plan.amount,
            plan.fee,
            change_address,
        )
    }
}

/// Inputs recorded, no outputs yet.
#[derive(Debug)]
pub struct InputsAdded {
    inputs: Vec<InputDescriptor>,
    total_input: u64,
}

impl InputsAdded {
    pub fn inputs(&self) -> &[InputDescriptor] {
        &self.inputs
    }

    pub fn total_input(&self) -> u64 {
        self.total_input
    }

    /// Add the recipient output and, if the leftover is above dust, a
    /// change output paying `change_address`.
    ///
    /// Positive change at or below the dust threshold fails with
    /// [`WalletError::DustChange`] instead of being added to the fee.
    pub fn add_outputs(
        self,
        recipient: &Address,
        amount: u64,
        fee: u64,
        change_address: Option<&Address>,
    ) -> Result<UnsignedTransaction, WalletError> {
        if amount <= DUST_THRESHOLD {
            return Err(WalletError::InvalidAmount(format!(
                "amount {amount} must be above the dust threshold of {DUST_THRESHOLD}"
            )));
        }
        let need = amount
            .checked_add(fee)
            .ok_or_else(|| WalletError::InvalidAmount("amount plus fee overflows".into()))?;
        if self.total_input < need {
            return Err(WalletError::InsufficientFunds {
                have: self.total_input,
                need,
            });
        }
        let change = self.total_input - need;
        CoinSelector::check_change(change)?;

        let mut output = vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: recipient.script_pubkey(),
        }];
        if change > 0 {
            let change_address = change_address.ok_or_else(|| {
                WalletError::InvalidAddress("change output requires a change address".into())
            })?;
            output.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: change_address.script_pubkey(),
            });
        }

        let input = self
            .inputs
            .iter()
            .map(|i| TxIn {
                previous_output: i.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect();

        let tx = Transaction {
            version: Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input,
            output,
        };
        Ok(UnsignedTransaction {
            tx,
            inputs: self.inputs,
            amount,
            fee,
            change,
        })
    }
}

/// Inputs and outputs in place, no witnesses.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    tx: Transaction,
    inputs: Vec<InputDescriptor>,
    amount: u64,
    fee: u64,
    change: u64,
}

impl UnsignedTransaction {
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn inputs(&self) -> &[InputDescriptor] {
        &self.inputs
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn change(&self) -> u64 {
        self.change
    }

    /// Sign every input with the key derived for its address.
    ///
    /// Returns [`WalletError::KeyNotFound`] if an input's address is not in
    /// `addresses`, or if the keychain no longer derives that address at
    /// the recorded index.
    pub fn sign(
        self,
        keychain: &KeyChain,
        addresses: &DiscoveredAddressSet,
    ) -> Result<SignedTransaction, WalletError> {
        let mut witnesses = Vec::with_capacity(self.inputs.len());
        {
            let mut cache = SighashCache::new(&self.tx);
            for (i, input) in self.inputs.iter().enumerate() {
                let index = addresses
                    .index_of(&input.address)
                    .ok_or_else(|| WalletError::KeyNotFound(input.address.to_string()))?;
                let child = keychain.derive_child(index)?;
                if address_for(&child, keychain.network()) != input.address {
                    return Err(WalletError::KeyNotFound(format!(
                        "{} is not derived at index {index}",
                        input.address
                    )));
                }

                let sighash = cache
                    .p2wpkh_signature_hash(
                        i,
                        &input.address.script_pubkey(),
                        Amount::from_sat(input.value),
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| WalletError::InvalidTransaction(e.to_string()))?;
                let msg = Message::from_digest(sighash.to_byte_array());
                let signature = ecdsa::Signature {
                    signature: keychain.secp().sign_ecdsa(&msg, child.secret_key()),
                    sighash_type: EcdsaSighashType::All,
                };

                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                witness.push(child.public_key().to_bytes());
                witnesses.push(witness);
                debug!(input = i, index, "signed input");
            }
        }

        let mut tx = self.tx;
        for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
            txin.witness = witness;
        }
        Ok(SignedTransaction {
            tx,
            inputs: self.inputs,
            amount: self.amount,
            fee: self.fee,
            change: self.change,
        })
    }
}

/// Every input carries a witness.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: Transaction,
    inputs: Vec<InputDescriptor>,
    amount: u64,
    fee: u64,
    change: u64,
}

impl SignedTransaction {
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    /// Seal the transaction. Irreversible.
    pub fn finalize(self) -> Result<FinalizedTransaction, WalletError> {
        if let Some(i) = self.tx.input.iter().position(|txin| txin.witness.is_empty()) {
            return Err(WalletError::InvalidTransaction(format!(
                "input {i} has no witness"
            )));
        }
        let txid = self.tx.compute_txid();
        Ok(FinalizedTransaction {
            txid,
            spent: self.inputs.iter().map(|i| i.outpoint).collect(),
            total_input: self.inputs.iter().map(|i| i.value).sum(),
            tx: self.tx,
            amount: self.amount,
            fee: self.fee,
            change: self.change,
        })
    }
}

/// A signed, encoded, immutable transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedTransaction {
    tx: Transaction,
    txid: Txid,
    spent: Vec<OutPoint>,
    total_input: u64,
    amount: u64,
    fee: u64,
    change: u64,
}

impl FinalizedTransaction {
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn change(&self) -> u64 {
        self.change
    }

    pub fn total_input(&self) -> u64 {
        self.total_input
    }

    /// Outpoints consumed by this transaction.
    pub fn spent_outpoints(&self) -> &[OutPoint] {
        &self.spent
    }

    /// Canonical consensus encoding.
    pub fn serialize(&self) -> Vec<u8> {
        encode::serialize(&self.tx)
    }

    /// Hex of the consensus encoding, as accepted by broadcast endpoints.
    pub fn to_hex(&self) -> String {
        encode::serialize_hex(&self.tx)
    }

    /// Actual virtual size.
    pub fn vsize(&self) -> usize {
        self.tx.vsize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin_selection::SendAmount;
    use crate::fee::FeeEstimator;
    use crate::testing::{ABANDON_ABOUT, confirmed, outpoint, testnet_keychain};
    use bitcoin::Network;
    use bitcoin::secp256k1::{PublicKey, Secp256k1};
    use satchel_core::types::FeeRate;

    struct Fixture {
        keychain: KeyChain,
        addresses: DiscoveredAddressSet,
        utxos: Vec<Utxo>,
    }

    fn fixture() -> Fixture {
        let keychain = testnet_keychain();
        let mut addresses = DiscoveredAddressSet::new();
        addresses.extend_to(&keychain, 10).unwrap();
        let utxos = vec![
            Utxo::from_remote(confirmed(1, 0, 100_000), addresses.get(0).unwrap().clone()),
            Utxo::from_remote(confirmed(2, 1, 50_000), addresses.get(4).unwrap().clone()),
        ];
        Fixture {
            keychain,
            addresses,
            utxos,
        }
    }

    fn recipient() -> Address {
        KeyChain::derive_root(ABANDON_ABOUT, "other", Network::Testnet, 0, 0)
            .unwrap()
            .address_at(0)
            .unwrap()
    }

    fn rate() -> FeeRate {
        FeeRate::from_sat_per_kvb(9_569)
    }

    fn build_and_sign(f: &Fixture, amount: SendAmount) -> FinalizedTransaction {
        let plan = CoinSelector::select(f.utxos.clone(), recipient(), amount, rate()).unwrap();
        let change = f.addresses.get(9).unwrap().clone();
        TransactionBuilder::from_plan(&plan, Some(&change))
            .unwrap()
            .sign(&f.keychain, &f.addresses)
            .unwrap()
            .finalize()
            .unwrap()
    }

    #[test]
    fn change_output_added_above_dust() {
        let f = fixture();
        let unsigned = TransactionBuilder::new()
            .add_inputs(&f.utxos)
            .unwrap()
            .add_outputs(&recipient(), 120_000, 2_000, f.addresses.get(9))
            .unwrap();
        assert_eq!(unsigned.change(), 28_000);
        let outs = &unsigned.tx().output;
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[0].value, Amount::from_sat(120_000));
        assert_eq!(outs[0].script_pubkey, recipient().script_pubkey());
        assert_eq!(outs[1].value, Amount::from_sat(28_000));
        assert_eq!(outs[1].script_pubkey, f.addresses.get(9).unwrap().script_pubkey());
    }

    #[test]
    fn dust_change_is_surfaced() {
        let f = fixture();
        let err = TransactionBuilder::new()
            .add_inputs(&f.utxos)
            .unwrap()
            .add_outputs(&recipient(), 147_600, 2_000, f.addresses.get(9))
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::DustChange {
                change: 400,
                threshold: 546
            }
        );
    }

    #[test]
    fn zero_change_means_single_output() {
        let f = fixture();
        let unsigned = TransactionBuilder::new()
            .add_inputs(&f.utxos)
            .unwrap()
            .add_outputs(&recipient(), 148_000, 2_000, None)
            .unwrap();
        assert_eq!(unsigned.tx().output.len(), 1);
    }

    #[test]
    fn change_without_address_rejected() {
        let f = fixture();
        let err = TransactionBuilder::new()
            .add_inputs(&f.utxos)
            .unwrap()
            .add_outputs(&recipient(), 100_000, 2_000, None)
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress(_)));
    }

    #[test]
    fn inputs_signal_rbf() {
        let f = fixture();
        let unsigned = TransactionBuilder::new()
            .add_inputs(&f.utxos)
            .unwrap()
            .add_outputs(&recipient(), 120_000, 2_000, f.addresses.get(9))
            .unwrap();
        assert!(unsigned.tx().is_explicitly_rbf());
        assert_eq!(unsigned.tx().input[1].previous_output, outpoint(2, 1));
    }

    #[test]
    fn duplicate_input_rejected() {
        let f = fixture();
        let doubled = vec![f.utxos[0].clone(), f.utxos[0].clone()];
        let err = TransactionBuilder::new().add_inputs(&doubled).unwrap_err();
        assert!(matches!(err, WalletError::InvalidTransaction(_)));
    }

    #[test]
    fn no_inputs_rejected() {
        assert_eq!(
            TransactionBuilder::new().add_inputs(&[]).unwrap_err(),
            WalletError::NoUtxos
        );
    }

    #[test]
    fn signatures_verify() {
        let f = fixture();
        let finalized = build_and_sign(&f, SendAmount::Exact(120_000));
        let tx = finalized.tx();
        let secp = Secp256k1::verification_only();
        let mut cache = SighashCache::new(tx);
        for (i, utxo) in f.utxos.iter().enumerate() {
            let witness = &tx.input[i].witness;
            assert_eq!(witness.len(), 2);
            let sig = ecdsa::Signature::from_slice(witness.nth(0).unwrap()).unwrap();
            assert_eq!(sig.sighash_type, EcdsaSighashType::All);
            let pk = PublicKey::from_slice(witness.nth(1).unwrap()).unwrap();
            let sighash = cache
                .p2wpkh_signature_hash(
                    i,
                    &utxo.address.script_pubkey(),
                    Amount::from_sat(utxo.value),
                    EcdsaSighashType::All,
                )
                .unwrap();
            let msg = Message::from_digest(sighash.to_byte_array());
            secp.verify_ecdsa(&msg, &sig.signature, &pk).unwrap();
        }
    }

    #[test]
    fn estimate_is_conservative() {
        let f = fixture();
        let finalized = build_and_sign(&f, SendAmount::Exact(120_000));
        assert!(finalized.vsize() as u64 <= FeeEstimator::estimate_virtual_size(2, 2));

        let max = build_and_sign(&f, SendAmount::Max);
        assert!(max.vsize() as u64 <= FeeEstimator::estimate_virtual_size(2, 1));
    }

    #[test]
    fn finalized_round_trip() {
        let f = fixture();
        let finalized = build_and_sign(&f, SendAmount::Exact(120_000));
        let bytes = hex::decode(finalized.to_hex()).unwrap();
        assert_eq!(bytes, finalized.serialize());

        let decoded: Transaction = encode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.compute_txid(), finalized.txid());
        let out_total: u64 = decoded.output.iter().map(|o| o.value.to_sat()).sum();
        assert_eq!(out_total, finalized.amount() + finalized.change());
        assert_eq!(finalized.total_input(), 150_000);
        assert_eq!(
            finalized.total_input(),
            out_total + finalized.fee()
        );
        assert_eq!(finalized.spent_outpoints(), &[outpoint(1, 0), outpoint(2, 1)]);
    }

    #[test]
    fn foreign_address_is_key_not_found() {
        let f = fixture();
        let mut utxos = f.utxos.clone();
        utxos[1].address = recipient();
        let plan =
            CoinSelector::select(utxos, recipient(), SendAmount::Exact(120_000), rate()).unwrap();
        let err = TransactionBuilder::from_plan(&plan, f.addresses.get(9))
            .unwrap()
            .sign(&f.keychain, &f.addresses)
            .unwrap_err();
        assert!(matches!(err, WalletError::KeyNotFound(_)));
    }

    #[test]
    fn wrong_keychain_is_key_not_found() {
        let f = fixture();
        let other =
            KeyChain::derive_root(ABANDON_ABOUT, "other", Network::Testnet, 0, 0).unwrap();
        let plan = CoinSelector::select(f.utxos.clone(), recipient(), SendAmount::Max, rate())
            .unwrap();
        let err = TransactionBuilder::from_plan(&plan, None)
            .unwrap()
            .sign(&other, &f.addresses)
            .unwrap_err();
        assert!(matches!(err, WalletError::KeyNotFound(_)));
    }
}
