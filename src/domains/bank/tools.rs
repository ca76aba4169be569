//! Bank operations.
//!
//! WRITE operations check everything against the frozen pre-state, compute
//! post balances once, and hand back a plan that only stores the result.
//! Value movements always book paired entries that net to zero; a reversal
//! appends mirror entries and never edits the originals.

use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ValidationError};
use crate::ledger::{self, LedgerEntry, Reversible};
use crate::lifecycle::{ensure_not_terminal, ensure_status, ensure_transition, Lifecycle};
use crate::money::Money;
use crate::store::{IdAllocator, Table};
use crate::toolkit::{generic, Commit, ToolContext, ToolRegistry};

use super::model::{
    Account, AccountStatus, AccountType, Address, Balance, BankDb, BankDetails, Beneficiary,
    BeneficiaryName, BeneficiaryStatus, BeneficiaryType, Card, CardStatus, Client, Direction,
    LedgerLeg, Loan, LoanStatus, Repayment, Transaction, TransactionMethod, TransactionStatus,
    TransactionType, TransferLimits, Verification, VerificationMethod, VerificationStatus,
};

const TX_PREFIX: &str = "tx_";
const TX_WIDTH: usize = 7;
const BENEFICIARY_PREFIX: &str = "bnf_";
const BENEFICIARY_WIDTH: usize = 4;
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Builds the bank operation registry.
pub fn registry() -> Result<Arc<ToolRegistry<BankDb>>, ValidationError> {
    let builder = ToolRegistry::builder()
        // READ
        .read(
            "find_client_id_by_email",
            "Find a client id by email address (case-insensitive).",
            find_client_id_by_email,
        )
        .read(
            "get_client_details",
            "Get the details of a client: name, contact, address, loans, beneficiaries and KYC.",
            get_client_details,
        )
        .read("get_account_details", "Get the details of an account by account id.", get_account_details)
        .read("get_card_details", "Get the details of a card by card id.", get_card_details)
        .read("get_loan_details", "Get the details of a loan by loan id.", get_loan_details)
        .read(
            "get_beneficiary_details",
            "Get the details of a beneficiary by beneficiary id.",
            get_beneficiary_details,
        )
        .read(
            "list_client_accounts",
            "List a client's accounts as a mapping from account id to {type, status, masked, currency}.",
            list_client_accounts,
        )
        .read(
            "list_client_beneficiaries",
            "List a client's beneficiaries as a mapping from beneficiary id to display name.",
            list_client_beneficiaries,
        )
        .read(
            "get_recent_transactions",
            "Get the most recent posted or pending transactions of an account, newest first.",
            get_recent_transactions,
        )
        .read(
            "search_transactions",
            "Search the transactions of a client-owned account with optional filters, newest first.",
            search_transactions,
        )
        // WRITE
        .write(
            "initiate_internal_transfer",
            "Transfer money between two active same-currency accounts of one client. Explain the \
             details and get explicit user confirmation (yes) before calling.",
            initiate_internal_transfer,
        )
        .write(
            "initiate_transfer_to_beneficiary",
            "Transfer money to an active, verified beneficiary from an authorized account, within \
             the per-transfer limit. Get explicit user confirmation (yes) before calling.",
            initiate_transfer_to_beneficiary,
        )
        .write(
            "reverse_transaction",
            "Reverse a posted transfer by booking mirror entries. Reversing an already reversed \
             transfer returns the existing reversal. Get explicit user confirmation before calling.",
            reverse_transaction,
        )
        .write(
            "add_beneficiary",
            "Add a beneficiary for a client. Verification starts as pending. Get explicit user \
             confirmation before calling.",
            add_beneficiary,
        )
        .write("verify_beneficiary", "Mark a pending beneficiary as verified.", verify_beneficiary)
        .write(
            "freeze_card",
            "Block (freeze) an active card. Get explicit user confirmation before calling.",
            freeze_card,
        )
        .write("unfreeze_card", "Unblock a blocked card back to active.", unfreeze_card)
        .write(
            "freeze_account",
            "Freeze an active account. Get explicit user confirmation before calling.",
            freeze_account,
        )
        .write("unfreeze_account", "Unfreeze a frozen account back to active.", unfreeze_account)
        .write(
            "close_account",
            "Close an active or frozen account whose balance is zero. This cannot be undone.",
            close_account,
        )
        .write(
            "make_loan_payment",
            "Pay towards a client's loan from one of the client's active accounts. Get explicit \
             user confirmation before calling.",
            make_loan_payment,
        );
    generic::register(builder).build_shared()
}

// ----------------------------------------------------------------------------
// Arguments
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct EmailArgs {
    /// The client's email, e.g. `someone@example.com`.
    email: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ClientArgs {
    /// The client id, such as `client_0001`.
    client_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct AccountArgs {
    /// The account id, such as `acc_0001`.
    account_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CardArgs {
    /// The card id, such as `card_0001`.
    card_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct LoanArgs {
    /// The loan id, such as `loan_0001`.
    loan_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct BeneficiaryArgs {
    /// The beneficiary id, such as `bnf_0001`.
    beneficiary_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct RecentTransactionsArgs {
    /// The account id.
    account_id: String,
    /// Maximum number of transactions to return (default 10).
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct SearchTransactionsArgs {
    /// The client id.
    client_id: String,
    /// An account id owned by the client.
    account_id: String,
    /// Inclusive lower bound on the timestamp, e.g. `2024-05-01`.
    #[serde(default)]
    start_date: Option<String>,
    /// Inclusive upper bound on the timestamp.
    #[serde(default)]
    end_date: Option<String>,
    /// Minimum absolute amount.
    #[serde(default)]
    min_amount: Option<Money>,
    /// Maximum absolute amount.
    #[serde(default)]
    max_amount: Option<Money>,
    /// Transaction type filter.
    #[serde(default)]
    transaction_type: Option<TransactionType>,
    /// Transaction status filter.
    #[serde(default)]
    status: Option<TransactionStatus>,
    /// Case-insensitive substring of the merchant name.
    #[serde(default)]
    merchant_name_contains: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct InternalTransferArgs {
    /// The client id.
    client_id: String,
    /// The source account id.
    from_account_id: String,
    /// The destination account id.
    to_account_id: String,
    /// Amount to transfer, greater than zero.
    amount: Money,
    /// Optional memo.
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct BeneficiaryTransferArgs {
    /// The client id.
    client_id: String,
    /// The source account id.
    from_account_id: String,
    /// The beneficiary id.
    beneficiary_id: String,
    /// Amount to transfer, greater than zero.
    amount: Money,
    /// `ACH` (default) or `Wire`.
    #[serde(default)]
    method: Option<TransactionMethod>,
    /// Optional memo.
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ReverseTransactionArgs {
    /// The client id.
    client_id: String,
    /// Any entry of the transfer to reverse.
    transaction_id: String,
    /// Why the transfer is reversed.
    reason: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct AddBeneficiaryArgs {
    /// The client id.
    client_id: String,
    /// `individual` or `business`.
    beneficiary_type: BeneficiaryType,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    business_name: Option<String>,
    bank_name: String,
    account_number_masked: String,
    #[serde(default)]
    routing_number: Option<String>,
    #[serde(default)]
    iban: Option<String>,
    #[serde(default)]
    swift_bic: Option<String>,
    address1: String,
    #[serde(default)]
    address2: String,
    city: String,
    state: String,
    zip: String,
    country: String,
    /// Client account ids allowed to send to this beneficiary.
    allowed_from_account_ids: Vec<String>,
    /// Maximum amount of one transfer.
    per_transfer_limit: Money,
    /// Maximum total per day; at least the per-transfer limit.
    daily_limit: Money,
    /// `micro_deposits`, `document` (default) or `instant`.
    #[serde(default)]
    verification_method: VerificationMethod,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct VerifyBeneficiaryArgs {
    /// The client id.
    client_id: String,
    /// The beneficiary id.
    beneficiary_id: String,
    /// Verification method used (default `document`).
    #[serde(default)]
    method: VerificationMethod,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct FreezeCardArgs {
    /// The card id.
    card_id: String,
    /// Why the card is blocked.
    reason: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct FreezeAccountArgs {
    /// The account id.
    account_id: String,
    /// Why the account is frozen.
    reason: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CloseAccountArgs {
    /// The client id.
    client_id: String,
    /// The account id.
    account_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct LoanPaymentArgs {
    /// The client id.
    client_id: String,
    /// The loan id.
    loan_id: String,
    /// The source account id.
    from_account_id: String,
    /// Payment amount, greater than zero.
    amount: Money,
    /// Payment method (default `Internal`).
    #[serde(default)]
    method: Option<TransactionMethod>,
    /// Optional memo.
    #[serde(default)]
    description: Option<String>,
}

// ----------------------------------------------------------------------------
// READ
// ----------------------------------------------------------------------------

fn find_client_id_by_email(db: &BankDb, _ctx: &ToolContext<'_>, args: EmailArgs) -> Result<String, ToolError> {
    let wanted = args.email.trim().to_lowercase();
    db.clients
        .values()
        .find(|c| c.contact.email.to_lowercase() == wanted)
        .map(|c| c.client_id.clone())
        .ok_or_else(|| ToolError::not_found("Client", args.email))
}

fn get_client_details(db: &BankDb, _ctx: &ToolContext<'_>, args: ClientArgs) -> Result<Client, ToolError> {
    db.client(&args.client_id).cloned()
}

fn get_account_details(db: &BankDb, _ctx: &ToolContext<'_>, args: AccountArgs) -> Result<Account, ToolError> {
    db.accounts.require("Account", &args.account_id).cloned()
}

fn get_card_details(db: &BankDb, _ctx: &ToolContext<'_>, args: CardArgs) -> Result<Card, ToolError> {
    db.cards.require("Card", &args.card_id).cloned()
}

fn get_loan_details(db: &BankDb, _ctx: &ToolContext<'_>, args: LoanArgs) -> Result<Loan, ToolError> {
    db.loans.require("Loan", &args.loan_id).cloned()
}

fn get_beneficiary_details(
    db: &BankDb,
    _ctx: &ToolContext<'_>,
    args: BeneficiaryArgs,
) -> Result<Beneficiary, ToolError> {
    db.beneficiaries.require("Beneficiary", &args.beneficiary_id).cloned()
}

#[derive(Debug, Serialize)]
struct AccountSummary {
    #[serde(rename = "type")]
    account_type: AccountType,
    status: AccountStatus,
    masked: String,
    currency: String,
}

fn list_client_accounts(
    db: &BankDb,
    _ctx: &ToolContext<'_>,
    args: ClientArgs,
) -> Result<BTreeMap<String, AccountSummary>, ToolError> {
    db.client(&args.client_id)?;
    Ok(db
        .client_accounts(&args.client_id)
        .map(|a| {
            (
                a.account_id.clone(),
                AccountSummary {
                    account_type: a.account_type,
                    status: a.status,
                    masked: a.account_number_masked.clone(),
                    currency: a.currency.clone(),
                },
            )
        })
        .collect())
}

fn list_client_beneficiaries(
    db: &BankDb,
    _ctx: &ToolContext<'_>,
    args: ClientArgs,
) -> Result<BTreeMap<String, String>, ToolError> {
    let client = db.client(&args.client_id)?;
    Ok(client
        .beneficiary_ids
        .iter()
        .filter_map(|id| db.beneficiaries.get(id))
        .map(|b| (b.beneficiary_id.clone(), b.name.display()))
        .collect())
}

fn newest_first(txs: &mut [Transaction]) {
    txs.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.transaction_id.cmp(&a.transaction_id))
    });
}

fn get_recent_transactions(
    db: &BankDb,
    _ctx: &ToolContext<'_>,
    args: RecentTransactionsArgs,
) -> Result<Vec<Transaction>, ToolError> {
    db.accounts.require("Account", &args.account_id)?;
    let mut txs: Vec<Transaction> = db
        .transactions
        .values()
        .filter(|t| t.is_account_entry() && t.account_id == args.account_id)
        .filter(|t| matches!(t.status, TransactionStatus::Posted | TransactionStatus::Pending))
        .cloned()
        .collect();
    newest_first(&mut txs);
    txs.truncate(args.limit.unwrap_or(DEFAULT_RECENT_LIMIT));
    Ok(txs)
}

fn search_transactions(
    db: &BankDb,
    _ctx: &ToolContext<'_>,
    args: SearchTransactionsArgs,
) -> Result<Vec<Transaction>, ToolError> {
    db.owned_account(&args.client_id, &args.account_id)?;
    let merchant = args.merchant_name_contains.as_deref().map(str::to_lowercase);
    let mut txs: Vec<Transaction> = db
        .transactions
        .values()
        .filter(|t| t.is_account_entry() && t.account_id == args.account_id)
        .filter(|t| args.start_date.as_deref().map_or(true, |from| t.timestamp.as_str() >= from))
        .filter(|t| args.end_date.as_deref().map_or(true, |to| t.timestamp.as_str() <= to))
        .filter(|t| args.min_amount.map_or(true, |min| t.amount.abs() >= min))
        .filter(|t| args.max_amount.map_or(true, |max| t.amount.abs() <= max))
        .filter(|t| args.transaction_type.map_or(true, |ty| t.transaction_type == ty))
        .filter(|t| args.status.map_or(true, |st| t.status == st))
        .filter(|t| merchant.as_deref().map_or(true, |m| t.merchant_name().contains(m)))
        .cloned()
        .collect();
    newest_first(&mut txs);
    Ok(txs)
}

// ----------------------------------------------------------------------------
// Plans
// ----------------------------------------------------------------------------

/// Records whose update plan replaces them wholesale.
trait Stored: Clone + Serialize + Send + 'static {
    fn table(db: &mut BankDb) -> &mut Table<Self>;
    fn id(&self) -> &str;
}

impl Stored for Account {
    fn table(db: &mut BankDb) -> &mut Table<Self> {
        &mut db.accounts
    }

    fn id(&self) -> &str {
        &self.account_id
    }
}

impl Stored for Card {
    fn table(db: &mut BankDb) -> &mut Table<Self> {
        &mut db.cards
    }

    fn id(&self) -> &str {
        &self.card_id
    }
}

impl Stored for Beneficiary {
    fn table(db: &mut BankDb) -> &mut Table<Self> {
        &mut db.beneficiaries
    }

    fn id(&self) -> &str {
        &self.beneficiary_id
    }
}

/// Stores the prepared successor of one record.
struct Update<T>(T);

impl<T: Stored> Commit<BankDb> for Update<T> {
    type Output = T;

    fn commit(self, db: &mut BankDb) -> T {
        if let Some(slot) = T::table(db).get_mut(self.0.id()) {
            slot.clone_from(&self.0);
        }
        self.0
    }
}

struct NewBeneficiary(Beneficiary);

impl Commit<BankDb> for NewBeneficiary {
    type Output = Beneficiary;

    fn commit(self, db: &mut BankDb) -> Beneficiary {
        let beneficiary = self.0;
        if let Some(client) = db.clients.get_mut(&beneficiary.client_id) {
            client.beneficiary_ids.push(beneficiary.beneficiary_id.clone());
        }
        db.beneficiaries
            .insert_fresh(beneficiary.beneficiary_id.clone(), beneficiary.clone());
        beneficiary
    }
}

/// What a posting plan hands back to the agent.
#[derive(Debug, Clone, Copy)]
enum Reply {
    /// The entry booked against the client account.
    Primary,
    /// Every booked entry.
    All,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Posted {
    One(Transaction),
    Many(Vec<Transaction>),
}

/// Books balanced entries and the balances they produce.
struct Posting {
    balances: Vec<(String, Balance)>,
    entries: Vec<Transaction>,
    repayment: Option<(String, Repayment)>,
    reply: Reply,
}

impl Commit<BankDb> for Posting {
    type Output = Posted;

    fn commit(self, db: &mut BankDb) -> Posted {
        for (account_id, balance) in self.balances {
            if let Some(account) = db.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }
        if let Some((loan_id, repayment)) = self.repayment {
            if let Some(loan) = db.loans.get_mut(&loan_id) {
                loan.repayment_history.push(repayment);
            }
        }
        for entry in &self.entries {
            db.transactions
                .insert_fresh(entry.transaction_id.clone(), entry.clone());
        }
        match self.reply {
            Reply::All => Posted::Many(self.entries),
            Reply::Primary => match self.entries.into_iter().next() {
                Some(first) => Posted::One(first),
                None => Posted::Many(Vec::new()),
            },
        }
    }
}

enum ReversalPlan {
    AlreadyReversed(Vec<Transaction>),
    Post(Posting),
}

impl Commit<BankDb> for ReversalPlan {
    type Output = Posted;

    fn commit(self, db: &mut BankDb) -> Posted {
        match self {
            Self::AlreadyReversed(entries) => Posted::Many(entries),
            Self::Post(posting) => posting.commit(db),
        }
    }
}

/// Fields shared by every entry of one economic event.
struct EntryTemplate<'a> {
    client_id: &'a str,
    currency: &'a str,
    timestamp: String,
    transaction_type: TransactionType,
    method: TransactionMethod,
    event_id: &'a str,
}

impl EntryTemplate<'_> {
    fn entry(&self, transaction_id: &str, leg: LedgerLeg, account_id: &str, amount: Money) -> Transaction {
        Transaction {
            transaction_id: transaction_id.to_string(),
            client_id: self.client_id.to_string(),
            account_id: account_id.to_string(),
            leg,
            timestamp: self.timestamp.clone(),
            transaction_type: self.transaction_type,
            direction: Direction::of(amount),
            amount,
            currency: self.currency.to_string(),
            description: None,
            method: self.method,
            status: TransactionStatus::Posted,
            merchant: None,
            related_transaction_id: None,
            event_id: Some(self.event_id.to_string()),
            reversal_of: None,
            balance_after: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Preconditions
// ----------------------------------------------------------------------------

fn positive(amount: Money) -> Result<Money, ToolError> {
    if amount.is_positive() {
        Ok(amount)
    } else {
        Err(ToolError::invalid_arguments(format!(
            "amount must be greater than zero, got {amount}"
        )))
    }
}

fn require_active(account: &Account) -> Result<(), ToolError> {
    ensure_status(
        &account.account_id,
        account.status,
        AccountStatus::Active,
        "the account must be active",
    )
}

fn require_available(account_id: &str, balance: Balance, amount: Money) -> Result<(), ToolError> {
    if balance.available >= amount {
        return Ok(());
    }
    Err(ToolError::InsufficientBalance {
        account_id: account_id.to_string(),
        available: balance.available,
        requested: amount,
    })
}

fn transaction_ids(db: &BankDb) -> IdAllocator<'_, Transaction> {
    IdAllocator::new("Transaction", &db.transactions, TX_PREFIX, TX_WIDTH)
}

// ----------------------------------------------------------------------------
// WRITE
// ----------------------------------------------------------------------------

fn initiate_internal_transfer(
    db: &BankDb,
    ctx: &ToolContext<'_>,
    args: InternalTransferArgs,
) -> Result<Posting, ToolError> {
    let amount = positive(args.amount)?;
    if args.from_account_id == args.to_account_id {
        return Err(ToolError::invalid_arguments("source and destination accounts must differ"));
    }
    let from = db.owned_account(&args.client_id, &args.from_account_id)?;
    let to = db.owned_account(&args.client_id, &args.to_account_id)?;
    require_active(from)?;
    require_active(to)?;
    if from.account_type == AccountType::Credit {
        return Err(ToolError::WrongState {
            kind: "Account",
            id: from.account_id.clone(),
            state: "a credit account".to_string(),
            reason: "transfers from a credit account are not supported".to_string(),
        });
    }
    if from.currency != to.currency {
        return Err(ToolError::invalid_arguments(format!(
            "cross-currency internal transfers are not supported ({} to {})",
            from.currency, to.currency
        )));
    }
    require_available(&from.account_id, from.balance, amount)?;

    let from_after = from.balance.shifted(-amount);
    let to_after = to.balance.shifted(amount);
    let mut ids = transaction_ids(db);
    let out_id = ids.next_id()?;
    let in_id = ids.next_id()?;
    let template = EntryTemplate {
        client_id: &args.client_id,
        currency: &from.currency,
        timestamp: ctx.timestamp(),
        transaction_type: TransactionType::Transfer,
        method: TransactionMethod::Internal,
        event_id: &out_id,
    };

    let mut outbound = template.entry(&out_id, LedgerLeg::Account, &from.account_id, -amount);
    outbound.description = Some(
        args.description
            .clone()
            .unwrap_or_else(|| format!("Internal transfer to {}", to.account_id)),
    );
    outbound.related_transaction_id = Some(in_id.clone());
    outbound.balance_after = Some(from_after.current);

    let mut inbound = template.entry(&in_id, LedgerLeg::Account, &to.account_id, amount);
    inbound.description = Some(
        args.description
            .unwrap_or_else(|| format!("Internal transfer from {}", from.account_id)),
    );
    inbound.related_transaction_id = Some(out_id.clone());
    inbound.balance_after = Some(to_after.current);

    let entries = vec![outbound, inbound];
    ledger::ensure_balanced(&out_id, &entries)?;
    Ok(Posting {
        balances: vec![
            (from.account_id.clone(), from_after),
            (to.account_id.clone(), to_after),
        ],
        entries,
        repayment: None,
        reply: Reply::All,
    })
}

fn initiate_transfer_to_beneficiary(
    db: &BankDb,
    ctx: &ToolContext<'_>,
    args: BeneficiaryTransferArgs,
) -> Result<Posting, ToolError> {
    let amount = positive(args.amount)?;
    let method = args.method.unwrap_or(TransactionMethod::Ach);
    if !matches!(method, TransactionMethod::Ach | TransactionMethod::Wire) {
        return Err(ToolError::invalid_arguments("method must be ACH or Wire"));
    }
    let account = db.owned_account(&args.client_id, &args.from_account_id)?;
    require_active(account)?;
    let beneficiary = db.owned_beneficiary(&args.client_id, &args.beneficiary_id)?;
    ensure_status(
        &beneficiary.beneficiary_id,
        beneficiary.status,
        BeneficiaryStatus::Active,
        "the beneficiary must be active",
    )?;
    ensure_status(
        &beneficiary.beneficiary_id,
        beneficiary.verification.status,
        VerificationStatus::Verified,
        "the beneficiary must be verified before transfers",
    )?;
    if !beneficiary.allowed_from_account_ids.contains(&account.account_id) {
        return Err(ToolError::invalid_arguments(format!(
            "account {} is not authorized for transfers to beneficiary {}",
            account.account_id, beneficiary.beneficiary_id
        )));
    }
    let limit = beneficiary.transfer_limits.per_transfer_limit;
    if amount > limit {
        return Err(ToolError::LimitExceeded {
            limit: "per_transfer_limit".to_string(),
            max: limit.to_string(),
            requested: amount.to_string(),
        });
    }
    require_available(&account.account_id, account.balance, amount)?;

    let after = account.balance.shifted(-amount);
    let mut ids = transaction_ids(db);
    let debit_id = ids.next_id()?;
    let credit_id = ids.next_id()?;
    let template = EntryTemplate {
        client_id: &args.client_id,
        currency: &account.currency,
        timestamp: ctx.timestamp(),
        transaction_type: TransactionType::Transfer,
        method,
        event_id: &debit_id,
    };
    let description = args
        .description
        .unwrap_or_else(|| format!("Transfer to beneficiary {}", beneficiary.name.display()));

    let mut debit = template.entry(&debit_id, LedgerLeg::Account, &account.account_id, -amount);
    debit.description = Some(description.clone());
    debit.related_transaction_id = Some(credit_id.clone());
    debit.balance_after = Some(after.current);

    let mut credit = template.entry(&credit_id, LedgerLeg::Beneficiary, &beneficiary.beneficiary_id, amount);
    credit.description = Some(description);
    credit.related_transaction_id = Some(debit_id.clone());

    let entries = vec![debit, credit];
    ledger::ensure_balanced(&debit_id, &entries)?;
    Ok(Posting {
        balances: vec![(account.account_id.clone(), after)],
        entries,
        repayment: None,
        reply: Reply::Primary,
    })
}

fn reverse_transaction(
    db: &BankDb,
    ctx: &ToolContext<'_>,
    args: ReverseTransactionArgs,
) -> Result<ReversalPlan, ToolError> {
    db.client(&args.client_id)?;
    let tx = db.transactions.require("Transaction", &args.transaction_id)?;
    if tx.client_id != args.client_id {
        return Err(ToolError::not_owned("Transaction", &args.transaction_id, &args.client_id));
    }
    if tx.reversal_of.is_some() {
        return Err(ToolError::WrongState {
            kind: "Transaction",
            id: tx.transaction_id.clone(),
            state: "a reversal".to_string(),
            reason: "reversal entries cannot be reversed".to_string(),
        });
    }
    if tx.transaction_type != TransactionType::Transfer {
        return Err(ToolError::WrongState {
            kind: "Transaction",
            id: tx.transaction_id.clone(),
            state: "not a transfer".to_string(),
            reason: "only transfers can be reversed".to_string(),
        });
    }

    let event = tx.event_key();
    let existing: Vec<Transaction> = db
        .event_entries(&event)
        .filter(|t| t.reversal_of.is_some())
        .cloned()
        .collect();
    if !existing.is_empty() {
        return Ok(ReversalPlan::AlreadyReversed(existing));
    }

    let originals: Vec<&Transaction> = db.event_entries(&event).collect();
    let timestamp = ctx.timestamp();
    let mut ids = transaction_ids(db);
    let mut balances: BTreeMap<String, Balance> = BTreeMap::new();
    let mut entries = Vec::with_capacity(originals.len());
    for original in &originals {
        if original.status != TransactionStatus::Posted {
            return Err(ToolError::WrongState {
                kind: "Transaction",
                id: original.transaction_id.clone(),
                state: format!("{:?}", original.status).to_lowercase(),
                reason: "only posted transfers can be reversed".to_string(),
            });
        }
        let mut reversal = original.reversal();
        reversal.transaction_id = ids.next_id()?;
        reversal.timestamp.clone_from(&timestamp);
        reversal.description = Some(format!("Reversal of {}: {}", original.transaction_id, args.reason));
        if original.is_account_entry() {
            let account = db.accounts.require("Account", &original.account_id)?;
            ensure_not_terminal(&account.account_id, account.status)?;
            let before = balances
                .get(&account.account_id)
                .copied()
                .unwrap_or(account.balance);
            if reversal.amount.is_negative() {
                require_available(&account.account_id, before, -reversal.amount)?;
            }
            let after = before.shifted(reversal.amount);
            reversal.balance_after = Some(after.current);
            balances.insert(account.account_id.clone(), after);
        }
        entries.push(reversal);
    }
    ledger::ensure_balanced(&event, &entries)?;
    if !ledger::is_mirror(originals.iter().copied(), &entries) {
        return Err(ToolError::LedgerImbalance {
            event,
            net: ledger::net(&entries),
        });
    }
    Ok(ReversalPlan::Post(Posting {
        balances: balances.into_iter().collect(),
        entries,
        repayment: None,
        reply: Reply::All,
    }))
}

fn add_beneficiary(
    db: &BankDb,
    ctx: &ToolContext<'_>,
    args: AddBeneficiaryArgs,
) -> Result<NewBeneficiary, ToolError> {
    db.client(&args.client_id)?;
    if args.allowed_from_account_ids.is_empty() {
        return Err(ToolError::invalid_arguments("at least one allowed source account is required"));
    }
    for account_id in &args.allowed_from_account_ids {
        db.owned_account(&args.client_id, account_id)?;
    }
    positive(args.per_transfer_limit)?;
    if args.daily_limit < args.per_transfer_limit {
        return Err(ToolError::invalid_arguments(
            "daily_limit must be at least per_transfer_limit",
        ));
    }
    let name = BeneficiaryName {
        display_name: args.display_name,
        first_name: args.first_name,
        last_name: args.last_name,
        business_name: args.business_name,
    };
    if name.is_empty() {
        return Err(ToolError::invalid_arguments("a beneficiary name is required"));
    }
    let beneficiary_id =
        IdAllocator::new("Beneficiary", &db.beneficiaries, BENEFICIARY_PREFIX, BENEFICIARY_WIDTH).next_id()?;
    Ok(NewBeneficiary(Beneficiary {
        beneficiary_id,
        client_id: args.client_id,
        name,
        beneficiary_type: args.beneficiary_type,
        bank_details: BankDetails {
            bank_name: args.bank_name,
            account_number_masked: args.account_number_masked,
            routing_number: args.routing_number,
            iban: args.iban,
            swift_bic: args.swift_bic,
        },
        address: Address {
            address1: args.address1,
            address2: args.address2,
            city: args.city,
            state: args.state,
            zip: args.zip,
            country: args.country,
        },
        allowed_from_account_ids: args.allowed_from_account_ids,
        transfer_limits: TransferLimits {
            per_transfer_limit: args.per_transfer_limit,
            daily_limit: args.daily_limit,
        },
        verification: Verification {
            status: VerificationStatus::Pending,
            method: args.verification_method,
            verified_at: None,
        },
        status: BeneficiaryStatus::Active,
        created_at: ctx.timestamp(),
        notes: None,
    }))
}

fn verify_beneficiary(
    db: &BankDb,
    ctx: &ToolContext<'_>,
    args: VerifyBeneficiaryArgs,
) -> Result<Update<Beneficiary>, ToolError> {
    let beneficiary = db.owned_beneficiary(&args.client_id, &args.beneficiary_id)?;
    ensure_not_terminal(&beneficiary.beneficiary_id, beneficiary.status)?;
    ensure_transition(
        &beneficiary.beneficiary_id,
        beneficiary.verification.status,
        VerificationStatus::Verified,
    )?;
    let mut updated = beneficiary.clone();
    updated.verification = Verification {
        status: VerificationStatus::Verified,
        method: args.method,
        verified_at: Some(ctx.timestamp()),
    };
    Ok(Update(updated))
}

fn card_transition(db: &BankDb, card_id: &str, to: CardStatus, reason: Option<String>) -> Result<Update<Card>, ToolError> {
    let card = db.cards.require("Card", card_id)?;
    ensure_transition(&card.card_id, card.status, to)?;
    let mut updated = card.clone();
    updated.status = to;
    updated.block_reason = reason;
    tracing::debug!(card_id, from = card.status.name(), to = to.name(), "card status change prepared");
    Ok(Update(updated))
}

fn freeze_card(db: &BankDb, _ctx: &ToolContext<'_>, args: FreezeCardArgs) -> Result<Update<Card>, ToolError> {
    card_transition(db, &args.card_id, CardStatus::Blocked, Some(args.reason))
}

fn unfreeze_card(db: &BankDb, _ctx: &ToolContext<'_>, args: CardArgs) -> Result<Update<Card>, ToolError> {
    card_transition(db, &args.card_id, CardStatus::Active, None)
}

fn account_transition(
    account: &Account,
    to: AccountStatus,
    reason: Option<String>,
) -> Result<Update<Account>, ToolError> {
    ensure_transition(&account.account_id, account.status, to)?;
    let mut updated = account.clone();
    updated.status = to;
    updated.freeze_reason = reason;
    Ok(Update(updated))
}

fn freeze_account(
    db: &BankDb,
    _ctx: &ToolContext<'_>,
    args: FreezeAccountArgs,
) -> Result<Update<Account>, ToolError> {
    let account = db.accounts.require("Account", &args.account_id)?;
    account_transition(account, AccountStatus::Frozen, Some(args.reason))
}

fn unfreeze_account(db: &BankDb, _ctx: &ToolContext<'_>, args: AccountArgs) -> Result<Update<Account>, ToolError> {
    let account = db.accounts.require("Account", &args.account_id)?;
    account_transition(account, AccountStatus::Active, None)
}

fn close_account(
    db: &BankDb,
    _ctx: &ToolContext<'_>,
    args: CloseAccountArgs,
) -> Result<Update<Account>, ToolError> {
    let account = db.owned_account(&args.client_id, &args.account_id)?;
    ensure_transition(&account.account_id, account.status, AccountStatus::Closed)?;
    if !account.balance.current.is_zero() || !account.balance.on_hold.is_zero() {
        return Err(ToolError::WrongState {
            kind: "Account",
            id: account.account_id.clone(),
            state: account.status.name().to_string(),
            reason: format!(
                "the balance must be zero before closing (current {}, on hold {})",
                account.balance.current, account.balance.on_hold
            ),
        });
    }
    account_transition(account, AccountStatus::Closed, account.freeze_reason.clone())
}

fn make_loan_payment(
    db: &BankDb,
    ctx: &ToolContext<'_>,
    args: LoanPaymentArgs,
) -> Result<Posting, ToolError> {
    let amount = positive(args.amount)?;
    let method = args.method.unwrap_or(TransactionMethod::Internal);
    let account = db.owned_account(&args.client_id, &args.from_account_id)?;
    let loan = db.loans.require("Loan", &args.loan_id)?;
    if loan.client_id != args.client_id {
        return Err(ToolError::not_owned("Loan", &args.loan_id, &args.client_id));
    }
    if loan.status == LoanStatus::Closed {
        return Err(ToolError::WrongState {
            kind: "Loan",
            id: loan.loan_id.clone(),
            state: "closed".to_string(),
            reason: "a closed loan cannot take payments".to_string(),
        });
    }
    require_active(account)?;
    if account.currency != loan.currency {
        return Err(ToolError::invalid_arguments(format!(
            "account currency {} does not match loan currency {}",
            account.currency, loan.currency
        )));
    }
    require_available(&account.account_id, account.balance, amount)?;

    let after = account.balance.shifted(-amount);
    let mut ids = transaction_ids(db);
    let debit_id = ids.next_id()?;
    let credit_id = ids.next_id()?;
    let template = EntryTemplate {
        client_id: &args.client_id,
        currency: &account.currency,
        timestamp: ctx.timestamp(),
        transaction_type: TransactionType::Payment,
        method,
        event_id: &debit_id,
    };
    let description = args
        .description
        .unwrap_or_else(|| format!("Loan payment {}", loan.loan_id));

    let mut debit = template.entry(&debit_id, LedgerLeg::Account, &account.account_id, -amount);
    debit.description = Some(description.clone());
    debit.related_transaction_id = Some(credit_id.clone());
    debit.balance_after = Some(after.current);

    let mut credit = template.entry(&credit_id, LedgerLeg::Loan, &loan.loan_id, amount);
    credit.description = Some(description);
    credit.related_transaction_id = Some(debit_id.clone());

    let repayment = Repayment {
        transaction_id: debit_id.clone(),
        posted_at: template.timestamp.clone(),
        amount,
        currency: loan.currency.clone(),
        method,
        principal_component: amount,
        interest_component: Money::ZERO,
        fees_component: Money::ZERO,
    };
    let entries = vec![debit, credit];
    ledger::ensure_balanced(&debit_id, &entries)?;
    Ok(Posting {
        balances: vec![(account.account_id.clone(), after)],
        entries,
        repayment: Some((loan.loan_id.clone(), repayment)),
        reply: Reply::Primary,
    })
}
