use super::{Address, Hash32};
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

/// Receipt status of a committed transaction record.
pub const RECEIPT_STATUS_SUCCESSFUL: u64 = 1;
pub const RECEIPT_STATUS_FAILED: u64 = 0;

/// A raw signed transaction as collected from the mempool.
///
/// The recipient is the zero address for contract creation. Value and gas
/// price are 256-bit big-endian quantities.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedTx {
    /// ed25519 public key of the sender
    pub pubkey: [u8; 32],
    /// ed25519 signature over `sign_payload()`
    pub signature: [u8; 64],
    pub to: Address,
    pub nonce: u64,
    pub value: [u8; 32],
    pub gas_limit: u64,
    pub gas_price: [u8; 32],
    pub input: Vec<u8>,
}

/// The unsigned portion of a transaction, hashed and signed as one unit.
#[derive(BorshSerialize)]
struct SignPayload<'a> {
    pubkey: &'a [u8; 32],
    to: &'a Address,
    nonce: u64,
    value: &'a [u8; 32],
    gas_limit: u64,
    gas_price: &'a [u8; 32],
    input: &'a [u8],
}

impl SignedTx {
    /// Bytes covered by the sender's signature.
    pub fn sign_payload(&self) -> Vec<u8> {
        let payload = SignPayload {
            pubkey: &self.pubkey,
            to: &self.to,
            nonce: self.nonce,
            value: &self.value,
            gas_limit: self.gas_limit,
            gas_price: &self.gas_price,
            input: &self.input,
        };
        borsh::to_vec(&payload).expect("sign payload serialization cannot fail")
    }

    /// Content hash: SHA-256 of the full signed encoding.
    pub fn hash(&self) -> Hash32 {
        let bytes = borsh::to_vec(self).expect("transaction serialization cannot fail");
        Sha256::digest(&bytes).into()
    }

    /// Build and sign a transaction with the given ed25519 key.
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        key: &ed25519_dalek::SigningKey,
        to: Address,
        nonce: u64,
        value: [u8; 32],
        gas_limit: u64,
        gas_price: [u8; 32],
        input: Vec<u8>,
    ) -> Self {
        use ed25519_dalek::Signer;
        let mut tx = Self {
            pubkey: key.verifying_key().to_bytes(),
            signature: [0u8; 64],
            to,
            nonce,
            value,
            gas_limit,
            gas_price,
            input,
        };
        tx.signature = key.sign(&tx.sign_payload()).to_bytes();
        tx
    }
}

/// The engine's internal transaction form, immutable once created.
///
/// Borsh gives `to_bytes`/`from_bytes` a total deterministic bijection on
/// the fields, which is all the standby queue requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TxToRun {
    pub hash: Hash32,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub value: [u8; 32],
    pub gas_limit: u64,
    pub gas_price: [u8; 32],
    pub input: Vec<u8>,
    /// Chain height at which this transaction was collected
    pub height: u64,
}

impl TxToRun {
    pub fn from_signed(tx: &SignedTx, sender: Address, height: u64) -> Self {
        Self {
            hash: tx.hash(),
            from: sender,
            to: tx.to,
            nonce: tx.nonce,
            value: tx.value,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
            input: tx.input.clone(),
            height,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("transaction serialization cannot fail")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(bytes)
    }
}

/// A log emitted during execution, stamped with its position in the block.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash32>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub block_hash: Hash32,
    pub tx_hash: Hash32,
    pub tx_index: u32,
    /// Monotonic log index across the whole block
    pub index: u64,
    pub removed: bool,
}

/// Final per-transaction record of a block.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub hash: Hash32,
    pub transaction_index: i64,
    pub nonce: u64,
    pub block_hash: Hash32,
    pub block_number: i64,
    pub from: Address,
    pub to: Address,
    pub value: [u8; 32],
    pub gas_price: [u8; 32],
    pub gas: u64,
    pub input: Vec<u8>,
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    pub contract_address: Address,
    pub out_data: Vec<u8>,
    pub status: u64,
    pub status_str: String,
    pub logs: Vec<Log>,
    pub logs_bloom: [u8; 256],
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            hash: Hash32::default(),
            transaction_index: 0,
            nonce: 0,
            block_hash: Hash32::default(),
            block_number: 0,
            from: Address::zero(),
            to: Address::zero(),
            value: [0u8; 32],
            gas_price: [0u8; 32],
            gas: 0,
            input: Vec::new(),
            cumulative_gas_used: 0,
            gas_used: 0,
            contract_address: Address::zero(),
            out_data: Vec::new(),
            status: RECEIPT_STATUS_SUCCESSFUL,
            status_str: String::new(),
            logs: Vec::new(),
            logs_bloom: [0u8; 256],
        }
    }
}

/// 2048-bit bloom filter over every log address and topic.
///
/// Each item sets three bits chosen from the leading bytes of its SHA-256
/// digest: bit `((h[i] << 8) | h[i+1]) & 2047` for `i` in `{0, 2, 4}`.
pub fn logs_bloom(logs: &[Log]) -> [u8; 256] {
    let mut bloom = [0u8; 256];
    for log in logs {
        bloom_add(&mut bloom, log.address.as_ref());
        for topic in &log.topics {
            bloom_add(&mut bloom, topic);
        }
    }
    bloom
}

fn bloom_add(bloom: &mut [u8; 256], item: &[u8]) {
    let digest = Sha256::digest(item);
    for i in [0usize, 2, 4] {
        let bit = (((digest[i] as u16) << 8) | digest[i + 1] as u16) & 2047;
        bloom[255 - (bit / 8) as usize] |= 1 << (bit % 8);
    }
}
