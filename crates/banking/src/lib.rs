//! Banking domain module (event-sourced): bank accounts with their cheque
//! books, imported statement lines and reconciliation against vouchers.

pub mod account;
pub mod reconcile;

pub use account::{
    BankAccount, BankAccountCommand, BankAccountEvent, BankAccountId, BankAccountOpened,
    ChequeBook, ChequeBookRegistered, ChequeCancelled, ChequeCleared, ChequeIssued, ChequeLeaf,
    ChequeStatus, CancelCheque, ImportStatement, IssueCheque, LineReconciled, LineUnreconciled,
    MarkChequeCleared, OpenBankAccount, ReconcileLine, RegisterChequeBook, StatementImported,
    StatementLine, StatementLineInput, UnreconcileLine, validate_ifsc,
};
pub use reconcile::{
    MatchCandidate, MatchSuggestion, ReconciliationSummary, TxnDirection, suggest_matches,
    summarize,
};
