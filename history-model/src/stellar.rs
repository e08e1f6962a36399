//! Stellar envelope helpers
//!
//! Thin layer over `stellar-xdr`: network-scoped transaction hashing and
//! account extraction. The XDR codec itself is never reimplemented here.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use stellar_xdr::curr::{
    AccountId, FeeBumpTransactionInnerTx, Hash, Limits, Memo, MuxedAccount, Operation,
    OperationBody, Preconditions, PublicKey, ReadXdr, Transaction, TransactionEnvelope,
    TransactionExt, TransactionSignaturePayload, TransactionSignaturePayloadTaggedTransaction,
    TransactionV0, Uint256, WriteXdr,
};

/// Decode a binary transaction envelope
pub fn decode_envelope(envelope_xdr: &[u8]) -> Result<TransactionEnvelope> {
    Ok(TransactionEnvelope::from_xdr(envelope_xdr, Limits::none())?)
}

/// Network identifier for a passphrase
pub fn network_id(passphrase: &str) -> Hash {
    Hash(Sha256::digest(passphrase.as_bytes()).into())
}

/// Network-scoped hash of the transaction inside an envelope
///
/// V0 envelopes are hashed as their V1 equivalent, matching the ledger.
pub fn hash_transaction(envelope: &TransactionEnvelope, passphrase: &str) -> Result<[u8; 32]> {
    let tagged_transaction = match envelope {
        TransactionEnvelope::TxV0(e) => {
            TransactionSignaturePayloadTaggedTransaction::Tx(v0_to_v1(&e.tx))
        }
        TransactionEnvelope::Tx(e) => TransactionSignaturePayloadTaggedTransaction::Tx(e.tx.clone()),
        TransactionEnvelope::TxFeeBump(e) => {
            TransactionSignaturePayloadTaggedTransaction::TxFeeBump(e.tx.clone())
        }
    };

    let payload = TransactionSignaturePayload {
        network_id: network_id(passphrase),
        tagged_transaction,
    };

    Ok(Sha256::digest(payload.to_xdr(Limits::none())?).into())
}

/// Memo of the (inner) transaction
pub fn envelope_memo(envelope: &TransactionEnvelope) -> &Memo {
    match envelope {
        TransactionEnvelope::TxV0(e) => &e.tx.memo,
        TransactionEnvelope::Tx(e) => &e.tx.memo,
        TransactionEnvelope::TxFeeBump(e) => match &e.tx.inner_tx {
            FeeBumpTransactionInnerTx::Tx(inner) => &inner.tx.memo,
        },
    }
}

/// Every account referenced by an envelope, as strkey addresses
pub fn envelope_accounts(envelope: &TransactionEnvelope) -> BTreeSet<String> {
    let mut accounts = BTreeSet::new();

    match envelope {
        TransactionEnvelope::TxV0(e) => {
            let source = ed25519_address(&e.tx.source_account_ed25519);
            collect_operations(&source, &e.tx.operations, &mut accounts);
            accounts.insert(source);
        }
        TransactionEnvelope::Tx(e) => {
            let source = muxed_address(&e.tx.source_account);
            collect_operations(&source, &e.tx.operations, &mut accounts);
            accounts.insert(source);
        }
        TransactionEnvelope::TxFeeBump(e) => {
            accounts.insert(muxed_address(&e.tx.fee_source));
            let FeeBumpTransactionInnerTx::Tx(inner) = &e.tx.inner_tx;
            let source = muxed_address(&inner.tx.source_account);
            collect_operations(&source, &inner.tx.operations, &mut accounts);
            accounts.insert(source);
        }
    }

    accounts
}

fn collect_operations(tx_source: &str, operations: &[Operation], accounts: &mut BTreeSet<String>) {
    for op in operations {
        match &op.source_account {
            Some(source) => accounts.insert(muxed_address(source)),
            None => accounts.insert(tx_source.to_string()),
        };

        match &op.body {
            OperationBody::CreateAccount(o) => {
                accounts.insert(account_address(&o.destination));
            }
            OperationBody::Payment(o) => {
                accounts.insert(muxed_address(&o.destination));
            }
            OperationBody::PathPaymentStrictReceive(o) => {
                accounts.insert(muxed_address(&o.destination));
            }
            OperationBody::PathPaymentStrictSend(o) => {
                accounts.insert(muxed_address(&o.destination));
            }
            OperationBody::AccountMerge(destination) => {
                accounts.insert(muxed_address(destination));
            }
            OperationBody::AllowTrust(o) => {
                accounts.insert(account_address(&o.trustor));
            }
            OperationBody::SetTrustLineFlags(o) => {
                accounts.insert(account_address(&o.trustor));
            }
            OperationBody::BeginSponsoringFutureReserves(o) => {
                accounts.insert(account_address(&o.sponsored_id));
            }
            OperationBody::Clawback(o) => {
                accounts.insert(muxed_address(&o.from));
            }
            _ => {}
        }
    }
}

fn v0_to_v1(tx: &TransactionV0) -> Transaction {
    Transaction {
        source_account: MuxedAccount::Ed25519(tx.source_account_ed25519.clone()),
        fee: tx.fee,
        seq_num: tx.seq_num.clone(),
        cond: match &tx.time_bounds {
            Some(tb) => Preconditions::Time(tb.clone()),
            None => Preconditions::None,
        },
        memo: tx.memo.clone(),
        operations: tx.operations.clone(),
        ext: TransactionExt::V0,
    }
}

fn ed25519_address(key: &Uint256) -> String {
    stellar_strkey::ed25519::PublicKey(key.0).to_string()
}

/// Strkey address of an account
pub fn account_address(account: &AccountId) -> String {
    let AccountId(PublicKey::PublicKeyTypeEd25519(key)) = account;
    ed25519_address(key)
}

/// Strkey address of the ed25519 account behind a (possibly muxed) account
pub fn muxed_address(account: &MuxedAccount) -> String {
    match account {
        MuxedAccount::Ed25519(key) => ed25519_address(key),
        MuxedAccount::MuxedEd25519(m) => ed25519_address(&m.ed25519),
    }
}
