//! Wallet constants. All monetary values in satoshis (1 BTC = 10^8 sats).

pub const COIN: u64 = 100_000_000;

/// Minimum value for a change output. Change at or below this is rejected
/// rather than donated to the fee.
pub const DUST_THRESHOLD: u64 = 546;

/// Consecutive unused addresses scanned before discovery stops.
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Unused receive addresses kept ready past the gap.
pub const DEFAULT_LOOKAHEAD: u32 = 1;

/// BIP-84 purpose field (native segwit, witness-pubkey-hash).
pub const BIP84_PURPOSE: u32 = 84;

/// Virtual size of one P2WPKH input, rounded for a 72-byte signature.
pub const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Virtual size of one P2WPKH output.
pub const P2WPKH_OUTPUT_VBYTES: u64 = 31;

/// Version, lock time, counts and the segwit marker/flag, rounded up.
pub const TX_OVERHEAD_VBYTES: u64 = 11;

/// Block targets used for the economy, medium and fast fee presets.
pub const ECONOMY_TARGET_BLOCKS: u16 = 6;
pub const MEDIUM_TARGET_BLOCKS: u16 = 3;
pub const FAST_TARGET_BLOCKS: u16 = 1;

/// Bitcoin coin type for the BIP-44 `coin'` level on the given network.
pub fn coin_type(network: bitcoin::Network) -> u32 {
    match network {
        bitcoin::Network::Bitcoin => 0,
        _ => 1,
    }
}
