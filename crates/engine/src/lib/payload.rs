//! Execution payload and payload header, merged at the Deneb layout with
//! fork-gated trailing fields (`withdrawals_root` since Capella, blob gas
//! since Deneb).

use serde::{Deserialize, Serialize};
use ssz::Encode;
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::codec::{self, ContainerWriter, FieldKind};
use crate::containers::{Address, FixedVector, Gwei, Hash256, Root, Uint256, VariableList, Withdrawal};
use crate::errors::SszError;
use crate::eth_spec;
use crate::fork::ForkSeq;

pub type Transaction = VariableList<u8, eth_spec::MaxBytesPerTransaction>;
pub type Transactions = VariableList<Transaction, eth_spec::MaxTransactionsPerPayload>;
pub type Withdrawals = VariableList<Withdrawal, eth_spec::MaxWithdrawalsPerPayload>;
pub type ExtraData = VariableList<u8, eth_spec::MaxExtraDataBytes>;
pub type LogsBloom = FixedVector<u8, eth_spec::BytesPerLogBloom>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ExecutionPayload {
    pub parent_hash: Hash256,
    pub fee_recipient: Address,
    pub state_root: Root,
    pub receipts_root: Root,
    pub logs_bloom: LogsBloom,
    pub prev_randao: Hash256,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: ExtraData,
    pub base_fee_per_gas: Uint256,
    pub block_hash: Hash256,
    pub transactions: Transactions,
    // Capella
    pub withdrawals: Withdrawals,
    // Deneb
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: Hash256,
    pub fee_recipient: Address,
    pub state_root: Root,
    pub receipts_root: Root,
    pub logs_bloom: LogsBloom,
    pub prev_randao: Hash256,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: ExtraData,
    pub base_fee_per_gas: Uint256,
    pub block_hash: Hash256,
    pub transactions_root: Root,
    // Capella
    pub withdrawals_root: Root,
    // Deneb
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

/// Shared fixed prefix of payload and header: everything before the
/// transactions position.
fn common_field_kinds() -> Vec<FieldKind> {
    vec![
        FieldKind::Fixed(32),  // parent_hash
        FieldKind::Fixed(20),  // fee_recipient
        FieldKind::Fixed(32),  // state_root
        FieldKind::Fixed(32),  // receipts_root
        FieldKind::Fixed(256), // logs_bloom
        FieldKind::Fixed(32),  // prev_randao
        FieldKind::Fixed(8),   // block_number
        FieldKind::Fixed(8),   // gas_limit
        FieldKind::Fixed(8),   // gas_used
        FieldKind::Fixed(8),   // timestamp
        FieldKind::Variable,   // extra_data
        FieldKind::Fixed(32),  // base_fee_per_gas
        FieldKind::Fixed(32),  // block_hash
    ]
}

impl ExecutionPayloadHeader {
    pub fn field_kinds(fork: ForkSeq) -> Vec<FieldKind> {
        let mut kinds = common_field_kinds();
        kinds.push(FieldKind::Fixed(32)); // transactions_root
        if fork.gte(ForkSeq::Capella) {
            kinds.push(FieldKind::Fixed(32)); // withdrawals_root
        }
        if fork.gte(ForkSeq::Deneb) {
            kinds.push(FieldKind::Fixed(8)); // blob_gas_used
            kinds.push(FieldKind::Fixed(8)); // excess_blob_gas
        }
        kinds
    }

    pub fn serialize_at(&self, fork: ForkSeq) -> Vec<u8> {
        let mut writer = ContainerWriter::new();
        writer.fixed(self.parent_hash.as_ssz_bytes());
        writer.fixed(self.fee_recipient.as_ssz_bytes());
        writer.fixed(self.state_root.as_ssz_bytes());
        writer.fixed(self.receipts_root.as_ssz_bytes());
        writer.fixed(self.logs_bloom.as_ssz_bytes());
        writer.fixed(self.prev_randao.as_ssz_bytes());
        writer.fixed(self.block_number.as_ssz_bytes());
        writer.fixed(self.gas_limit.as_ssz_bytes());
        writer.fixed(self.gas_used.as_ssz_bytes());
        writer.fixed(self.timestamp.as_ssz_bytes());
        writer.variable(self.extra_data.as_ssz_bytes());
        writer.fixed(self.base_fee_per_gas.as_ssz_bytes());
        writer.fixed(self.block_hash.as_ssz_bytes());
        writer.fixed(self.transactions_root.as_ssz_bytes());
        if fork.gte(ForkSeq::Capella) {
            writer.fixed(self.withdrawals_root.as_ssz_bytes());
        }
        if fork.gte(ForkSeq::Deneb) {
            writer.fixed(self.blob_gas_used.as_ssz_bytes());
            writer.fixed(self.excess_blob_gas.as_ssz_bytes());
        }
        writer.finish()
    }

    pub fn deserialize_at(fork: ForkSeq, bytes: &[u8]) -> Result<Self, SszError> {
        let kinds = Self::field_kinds(fork);
        let ranges = codec::read_field_ranges(&kinds, bytes)?;
        let mut header = ExecutionPayloadHeader {
            parent_hash: codec::decode_field(bytes, &ranges[0])?,
            fee_recipient: codec::decode_field(bytes, &ranges[1])?,
            state_root: codec::decode_field(bytes, &ranges[2])?,
            receipts_root: codec::decode_field(bytes, &ranges[3])?,
            logs_bloom: codec::decode_field(bytes, &ranges[4])?,
            prev_randao: codec::decode_field(bytes, &ranges[5])?,
            block_number: codec::decode_field(bytes, &ranges[6])?,
            gas_limit: codec::decode_field(bytes, &ranges[7])?,
            gas_used: codec::decode_field(bytes, &ranges[8])?,
            timestamp: codec::decode_field(bytes, &ranges[9])?,
            extra_data: codec::decode_field(bytes, &ranges[10])?,
            base_fee_per_gas: codec::decode_field(bytes, &ranges[11])?,
            block_hash: codec::decode_field(bytes, &ranges[12])?,
            transactions_root: codec::decode_field(bytes, &ranges[13])?,
            ..Default::default()
        };
        if fork.gte(ForkSeq::Capella) {
            header.withdrawals_root = codec::decode_field(bytes, &ranges[14])?;
        }
        if fork.gte(ForkSeq::Deneb) {
            header.blob_gas_used = codec::decode_field(bytes, &ranges[15])?;
            header.excess_blob_gas = codec::decode_field(bytes, &ranges[16])?;
        }
        Ok(header)
    }

    pub fn hash_tree_root_at(&self, fork: ForkSeq) -> Hash256 {
        if fork.gte(ForkSeq::Deneb) {
            return self.tree_hash_root();
        }
        let mut roots = vec![
            self.parent_hash.tree_hash_root(),
            self.fee_recipient.tree_hash_root(),
            self.state_root.tree_hash_root(),
            self.receipts_root.tree_hash_root(),
            self.logs_bloom.tree_hash_root(),
            self.prev_randao.tree_hash_root(),
            self.block_number.tree_hash_root(),
            self.gas_limit.tree_hash_root(),
            self.gas_used.tree_hash_root(),
            self.timestamp.tree_hash_root(),
            self.extra_data.tree_hash_root(),
            self.base_fee_per_gas.tree_hash_root(),
            self.block_hash.tree_hash_root(),
            self.transactions_root.tree_hash_root(),
        ];
        if fork.gte(ForkSeq::Capella) {
            roots.push(self.withdrawals_root.tree_hash_root());
        }
        codec::container_root(&roots)
    }
}

impl ExecutionPayload {
    pub fn field_kinds(fork: ForkSeq) -> Vec<FieldKind> {
        let mut kinds = common_field_kinds();
        kinds.push(FieldKind::Variable); // transactions
        if fork.gte(ForkSeq::Capella) {
            kinds.push(FieldKind::Variable); // withdrawals
        }
        if fork.gte(ForkSeq::Deneb) {
            kinds.push(FieldKind::Fixed(8)); // blob_gas_used
            kinds.push(FieldKind::Fixed(8)); // excess_blob_gas
        }
        kinds
    }

    pub fn serialize_at(&self, fork: ForkSeq) -> Vec<u8> {
        let mut writer = ContainerWriter::new();
        writer.fixed(self.parent_hash.as_ssz_bytes());
        writer.fixed(self.fee_recipient.as_ssz_bytes());
        writer.fixed(self.state_root.as_ssz_bytes());
        writer.fixed(self.receipts_root.as_ssz_bytes());
        writer.fixed(self.logs_bloom.as_ssz_bytes());
        writer.fixed(self.prev_randao.as_ssz_bytes());
        writer.fixed(self.block_number.as_ssz_bytes());
        writer.fixed(self.gas_limit.as_ssz_bytes());
        writer.fixed(self.gas_used.as_ssz_bytes());
        writer.fixed(self.timestamp.as_ssz_bytes());
        writer.variable(self.extra_data.as_ssz_bytes());
        writer.fixed(self.base_fee_per_gas.as_ssz_bytes());
        writer.fixed(self.block_hash.as_ssz_bytes());
        writer.variable(self.transactions.as_ssz_bytes());
        if fork.gte(ForkSeq::Capella) {
            writer.variable(self.withdrawals.as_ssz_bytes());
        }
        if fork.gte(ForkSeq::Deneb) {
            writer.fixed(self.blob_gas_used.as_ssz_bytes());
            writer.fixed(self.excess_blob_gas.as_ssz_bytes());
        }
        writer.finish()
    }

    pub fn deserialize_at(fork: ForkSeq, bytes: &[u8]) -> Result<Self, SszError> {
        let kinds = Self::field_kinds(fork);
        let ranges = codec::read_field_ranges(&kinds, bytes)?;
        let mut payload = ExecutionPayload {
            parent_hash: codec::decode_field(bytes, &ranges[0])?,
            fee_recipient: codec::decode_field(bytes, &ranges[1])?,
            state_root: codec::decode_field(bytes, &ranges[2])?,
            receipts_root: codec::decode_field(bytes, &ranges[3])?,
            logs_bloom: codec::decode_field(bytes, &ranges[4])?,
            prev_randao: codec::decode_field(bytes, &ranges[5])?,
            block_number: codec::decode_field(bytes, &ranges[6])?,
            gas_limit: codec::decode_field(bytes, &ranges[7])?,
            gas_used: codec::decode_field(bytes, &ranges[8])?,
            timestamp: codec::decode_field(bytes, &ranges[9])?,
            extra_data: codec::decode_field(bytes, &ranges[10])?,
            base_fee_per_gas: codec::decode_field(bytes, &ranges[11])?,
            block_hash: codec::decode_field(bytes, &ranges[12])?,
            transactions: codec::decode_field(bytes, &ranges[13])?,
            ..Default::default()
        };
        if fork.gte(ForkSeq::Capella) {
            payload.withdrawals = codec::decode_field(bytes, &ranges[14])?;
        }
        if fork.gte(ForkSeq::Deneb) {
            payload.blob_gas_used = codec::decode_field(bytes, &ranges[15])?;
            payload.excess_blob_gas = codec::decode_field(bytes, &ranges[16])?;
        }
        Ok(payload)
    }

    pub fn hash_tree_root_at(&self, fork: ForkSeq) -> Hash256 {
        if fork.gte(ForkSeq::Deneb) {
            return self.tree_hash_root();
        }
        let mut roots = vec![
            self.parent_hash.tree_hash_root(),
            self.fee_recipient.tree_hash_root(),
            self.state_root.tree_hash_root(),
            self.receipts_root.tree_hash_root(),
            self.logs_bloom.tree_hash_root(),
            self.prev_randao.tree_hash_root(),
            self.block_number.tree_hash_root(),
            self.gas_limit.tree_hash_root(),
            self.gas_used.tree_hash_root(),
            self.timestamp.tree_hash_root(),
            self.extra_data.tree_hash_root(),
            self.base_fee_per_gas.tree_hash_root(),
            self.block_hash.tree_hash_root(),
            self.transactions.tree_hash_root(),
        ];
        if fork.gte(ForkSeq::Capella) {
            roots.push(self.withdrawals.tree_hash_root());
        }
        codec::container_root(&roots)
    }

    /// The header a blinded block would carry for this payload.
    pub fn to_header(&self, fork: ForkSeq) -> ExecutionPayloadHeader {
        ExecutionPayloadHeader {
            parent_hash: self.parent_hash,
            fee_recipient: self.fee_recipient,
            state_root: self.state_root,
            receipts_root: self.receipts_root,
            logs_bloom: self.logs_bloom.clone(),
            prev_randao: self.prev_randao,
            block_number: self.block_number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            base_fee_per_gas: self.base_fee_per_gas,
            block_hash: self.block_hash,
            transactions_root: self.transactions.tree_hash_root(),
            withdrawals_root: if fork.gte(ForkSeq::Capella) {
                self.withdrawals.tree_hash_root()
            } else {
                Root::ZERO
            },
            blob_gas_used: self.blob_gas_used,
            excess_blob_gas: self.excess_blob_gas,
        }
    }

    pub fn total_gwei_amount(&self) -> Gwei {
        self.withdrawals.iter().map(|w| w.amount).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_payload() -> ExecutionPayload {
        ExecutionPayload {
            parent_hash: Hash256::repeat_byte(1),
            fee_recipient: Address::repeat_byte(2),
            state_root: Hash256::repeat_byte(3),
            receipts_root: Hash256::repeat_byte(4),
            prev_randao: Hash256::repeat_byte(5),
            block_number: 100,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 1_700_000_000,
            extra_data: ExtraData::from(vec![0xDE, 0xAD]),
            base_fee_per_gas: Uint256::from(7u64),
            block_hash: Hash256::repeat_byte(6),
            transactions: Transactions::from(vec![Transaction::from(vec![1, 2, 3])]),
            withdrawals: Withdrawals::from(vec![Withdrawal {
                index: 0,
                validator_index: 9,
                address: Address::repeat_byte(7),
                amount: 1_000_000,
            }]),
            blob_gas_used: 11,
            excess_blob_gas: 13,
            ..Default::default()
        }
    }

    #[test]
    fn deneb_round_trip_matches_derive() {
        let payload = sample_payload();
        let manual = payload.serialize_at(ForkSeq::Deneb);
        assert_eq!(manual, payload.as_ssz_bytes());
        let decoded = ExecutionPayload::deserialize_at(ForkSeq::Deneb, &manual).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(payload.hash_tree_root_at(ForkSeq::Deneb), payload.tree_hash_root());
    }

    #[test]
    fn bellatrix_layout_drops_trailing_fields() {
        let payload = sample_payload();
        let bytes = payload.serialize_at(ForkSeq::Bellatrix);
        let decoded = ExecutionPayload::deserialize_at(ForkSeq::Bellatrix, &bytes).unwrap();
        assert_eq!(decoded.withdrawals.len(), 0);
        assert_eq!(decoded.blob_gas_used, 0);
        assert_eq!(decoded.transactions, payload.transactions);
        // Shorter than the Capella encoding of the same value.
        assert!(bytes.len() < payload.serialize_at(ForkSeq::Capella).len());
    }

    #[test]
    fn header_round_trip_per_fork() {
        let header = sample_payload().to_header(ForkSeq::Deneb);
        for fork in [ForkSeq::Bellatrix, ForkSeq::Capella, ForkSeq::Deneb, ForkSeq::Electra] {
            let bytes = header.serialize_at(fork);
            let decoded = ExecutionPayloadHeader::deserialize_at(fork, &bytes).unwrap();
            assert_eq!(decoded.serialize_at(fork), bytes);
        }
        assert_eq!(header.hash_tree_root_at(ForkSeq::Deneb), header.tree_hash_root());
        assert_ne!(
            header.hash_tree_root_at(ForkSeq::Capella),
            header.hash_tree_root_at(ForkSeq::Deneb)
        );
    }

    #[test]
    fn to_header_commits_to_transactions() {
        let payload = sample_payload();
        let header = payload.to_header(ForkSeq::Deneb);
        assert_eq!(header.transactions_root, payload.transactions.tree_hash_root());
        assert_eq!(header.withdrawals_root, payload.withdrawals.tree_hash_root());
        assert_eq!(header.block_hash, payload.block_hash);
    }
}
