//! Transaction handles.

use std::fmt::{Display, Formatter};

/// Identifies a transaction.
pub type TxnId = u64;

/// An opaque handle of the transaction a query is compiled and executed in.
/// The optimizer and the execution engine never begin or commit transactions;
/// they pass this handle to the catalog, the statistics storage and the table storage.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TransactionContext {
    txn_id: TxnId,
    read_only: bool,
}

impl TransactionContext {
    /// Creates a handle of a read-write transaction.
    pub fn new(txn_id: TxnId) -> Self {
        TransactionContext {
            txn_id,
            read_only: false,
        }
    }

    /// Creates a handle of a read-only transaction.
    pub fn read_only(txn_id: TxnId) -> Self {
        TransactionContext { txn_id, read_only: true }
    }

    /// The identifier of the transaction.
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Whether the transaction is not allowed to modify data.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl Display for TransactionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn#{}", self.txn_id)?;
        if self.read_only {
            write!(f, " (read only)")?;
        }
        Ok(())
    }
}
