//! Builders for Stellar envelopes and entries used by tests across the
//! workspace. Enabled with the `test-util` feature.

use crate::{entry::StellarEntry, version::KinVersion, Entry};
use stellar_xdr::curr::{
    AccountId, Asset, CreateAccountOp, Limits, Memo, MuxedAccount, Operation, OperationBody,
    PaymentOp, Preconditions, PublicKey, SequenceNumber, Transaction, TransactionEnvelope,
    TransactionExt, TransactionV1Envelope, Uint256, VecM, WriteXdr,
};

/// Network passphrase used by test entries
pub const TEST_PASSPHRASE: &str = "Kin Testnet ; December 2018";

/// Random account
pub fn generate_account_id() -> AccountId {
    AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(rand::random())))
}

fn muxed(account: &AccountId) -> MuxedAccount {
    let AccountId(PublicKey::PublicKeyTypeEd25519(key)) = account;
    MuxedAccount::Ed25519(key.clone())
}

/// Create-account operation
pub fn create_operation(source: Option<&AccountId>, destination: &AccountId) -> Operation {
    Operation {
        source_account: source.map(muxed),
        body: OperationBody::CreateAccount(CreateAccountOp {
            destination: destination.clone(),
            starting_balance: 10,
        }),
    }
}

/// Native payment operation
pub fn payment_operation(source: Option<&AccountId>, destination: &AccountId) -> Operation {
    Operation {
        source_account: source.map(muxed),
        body: OperationBody::Payment(PaymentOp {
            destination: muxed(destination),
            asset: Asset::Native,
            amount: 10,
        }),
    }
}

/// Account merge operation
pub fn merge_operation(source: Option<&AccountId>, destination: &AccountId) -> Operation {
    Operation {
        source_account: source.map(muxed),
        body: OperationBody::AccountMerge(muxed(destination)),
    }
}

/// Unsigned V1 envelope
pub fn generate_envelope(
    source: &AccountId,
    seq_num: i64,
    memo: Memo,
    operations: Vec<Operation>,
) -> TransactionEnvelope {
    let tx = Transaction {
        source_account: muxed(source),
        fee: 100,
        seq_num: SequenceNumber(seq_num),
        cond: Preconditions::None,
        memo,
        operations: operations.try_into().expect("too many operations"),
        ext: TransactionExt::V0,
    };

    TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: VecM::default(),
    })
}

/// Stellar entry wrapping an envelope
pub fn generate_entry(version: KinVersion, envelope: &TransactionEnvelope) -> Entry {
    Entry::stellar(
        version,
        StellarEntry {
            ledger: 10,
            paging_token: 10 << 32,
            network_passphrase: TEST_PASSPHRASE.to_string(),
            envelope_xdr: envelope
                .to_xdr(Limits::none())
                .expect("envelope should encode"),
            result_xdr: b"result".to_vec(),
        },
    )
}
