//! Bank records.
//!
//! Tables are flat: accounts and cards carry their owning `client_id`
//! instead of being nested inside the client record.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ToolError;
use crate::ledger::{LedgerEntry, Reversible};
use crate::lifecycle::Lifecycle;
use crate::money::Money;
use crate::store::{Database, Statistics, Table};

// ----------------------------------------------------------------------------
// Statuses
// ----------------------------------------------------------------------------

/// Account lifecycle: `active ⇄ frozen`, `active|frozen → closed`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl Lifecycle for AccountStatus {
    const ENTITY: &'static str = "Account";

    fn name(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
            Self::Closed => "closed",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Active => &[Self::Frozen, Self::Closed],
            Self::Frozen => &[Self::Active, Self::Closed],
            Self::Closed => &[],
        }
    }
}

/// Card lifecycle: `active ⇄ blocked`, either `→ expired`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Blocked,
    Expired,
}

impl Lifecycle for CardStatus {
    const ENTITY: &'static str = "Card";

    fn name(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Expired => "expired",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Active => &[Self::Blocked, Self::Expired],
            Self::Blocked => &[Self::Active, Self::Expired],
            Self::Expired => &[],
        }
    }
}

/// Beneficiary verification: `pending → verified|failed`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
}

impl Lifecycle for VerificationStatus {
    const ENTITY: &'static str = "Beneficiary verification";

    fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Verified, Self::Failed],
            Self::Verified | Self::Failed => &[],
        }
    }
}

/// Beneficiary standing: `active ⇄ suspended`, either `→ revoked`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BeneficiaryStatus {
    Active,
    Suspended,
    Revoked,
}

impl Lifecycle for BeneficiaryStatus {
    const ENTITY: &'static str = "Beneficiary";

    fn name(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Active => &[Self::Suspended, Self::Revoked],
            Self::Suspended => &[Self::Active, Self::Revoked],
            Self::Revoked => &[],
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Debit,
    Credit,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    Pending,
    Verified,
    Failed,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Payment,
    Fee,
    Interest,
}

/// Direction relative to the entity the entry is booked against.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    /// Direction of a signed amount.
    #[must_use]
    pub const fn of(amount: Money) -> Self {
        if amount.is_negative() {
            Self::Debit
        } else {
            Self::Credit
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TransactionMethod {
    #[serde(rename = "ACH")]
    Ach,
    Wire,
    Card,
    #[serde(rename = "ATM")]
    Atm,
    Internal,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Posted,
    Reversed,
}

/// What a transaction's `account_id` refers to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerLeg {
    /// A client account.
    #[default]
    Account,
    /// The receiving side of a transfer to a beneficiary.
    Beneficiary,
    /// The receiving side of a loan repayment.
    Loan,
}

impl LedgerLeg {
    const fn is_account(&self) -> bool {
        matches!(self, Self::Account)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Mortgage,
    Auto,
    #[default]
    Personal,
    CreditLine,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Amortization {
    #[default]
    Fixed,
    InterestOnly,
    Balloon,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Closed,
    Delinquent,
    #[serde(rename = "default")]
    Defaulted,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Due,
    Paid,
    Late,
    Deferred,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BeneficiaryType {
    Individual,
    Business,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    MicroDeposits,
    #[default]
    Document,
    Instant,
}

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientName {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kyc {
    #[serde(default)]
    pub status: KycStatus,
    #[serde(default)]
    pub last_reviewed_at: String,
    #[serde(default)]
    pub tax_id_masked: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub name: ClientName,
    pub contact: Contact,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub loan_ids: Vec<String>,
    #[serde(default)]
    pub beneficiary_ids: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub kyc: Kyc,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub current: Money,
    pub available: Money,
    #[serde(default)]
    pub on_hold: Money,
}

impl Balance {
    /// Both balances moved by the same signed amount.
    #[must_use]
    pub fn shifted(self, by: Money) -> Self {
        Self {
            current: self.current + by,
            available: self.available + by,
            on_hold: self.on_hold,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFeatures {
    pub checks_enabled: bool,
    pub atm_access: bool,
    pub online_banking: bool,
}

impl Default for AccountFeatures {
    fn default() -> Self {
        Self {
            checks_enabled: false,
            atm_access: true,
            online_banking: true,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub client_id: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub currency: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub account_number_masked: String,
    #[serde(default)]
    pub routing_number: String,
    pub balance: Balance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate_apr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overdraft_limit: Option<Money>,
    #[serde(default)]
    pub opened_at: String,
    #[serde(default)]
    pub features: AccountFeatures,
    /// Reason given when the account was last frozen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeze_reason: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardExtraInfo {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub last_four: String,
    #[serde(default)]
    pub exp_month: String,
    #[serde(default)]
    pub exp_year: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLimits {
    pub daily_atm_limit: Money,
    pub daily_pos_limit: Money,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card_id: String,
    pub client_id: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub linked_account_id: String,
    pub status: CardStatus,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub extra_info: CardExtraInfo,
    #[serde(default)]
    pub limits: CardLimits,
    #[serde(default)]
    pub pin_set: bool,
    /// Reason given when the card was last blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub name: String,
    #[serde(default)]
    pub mcc: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
}

/// One signed ledger entry.
///
/// `amount` is negative for money leaving the booked entity. Entries of one
/// economic event share `event_id` and link to their counterpart through
/// `related_transaction_id`. Snapshots may omit `event_id`; a pair linked only
/// by `related_transaction_id` is then keyed by the smaller of the two ids,
/// and an unlinked entry is its own event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub client_id: String,
    pub account_id: String,
    #[serde(default)]
    pub leg: LedgerLeg,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub direction: Direction,
    pub amount: Money,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub method: TransactionMethod,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<Merchant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Set on entries appended by a reversal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<Money>,
}

impl Transaction {
    /// Returns true if the entry is booked against a client account.
    #[must_use]
    pub const fn is_account_entry(&self) -> bool {
        self.leg.is_account()
    }

    /// Merchant name, lowercased, or empty.
    #[must_use]
    pub fn merchant_name(&self) -> String {
        self.merchant
            .as_ref()
            .map(|m| m.name.to_lowercase())
            .unwrap_or_default()
    }
}

impl LedgerEntry for Transaction {
    fn event_key(&self) -> String {
        if let Some(event) = &self.event_id {
            return event.clone();
        }
        match &self.related_transaction_id {
            Some(related) if *related < self.transaction_id => related.clone(),
            _ => self.transaction_id.clone(),
        }
    }

    fn signed_amount(&self) -> Money {
        self.amount
    }
}

impl Reversible for Transaction {
    /// The mirror entry. The caller assigns its id and timestamp.
    fn reversal(&self) -> Self {
        let amount = -self.amount;
        Self {
            transaction_id: String::new(),
            client_id: self.client_id.clone(),
            account_id: self.account_id.clone(),
            leg: self.leg,
            timestamp: String::new(),
            transaction_type: self.transaction_type,
            direction: Direction::of(amount),
            amount,
            currency: self.currency.clone(),
            description: Some(format!("Reversal of {}", self.transaction_id)),
            method: self.method,
            status: TransactionStatus::Posted,
            merchant: None,
            related_transaction_id: Some(self.transaction_id.clone()),
            event_id: Some(self.event_key()),
            reversal_of: Some(self.transaction_id.clone()),
            balance_after: None,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    #[serde(rename = "type")]
    pub collateral_type: String,
    #[serde(default)]
    pub description: String,
    pub value_amount: Money,
    pub value_currency: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub due_date: String,
    pub amount: Money,
    pub currency: String,
    pub status: ScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repayment {
    pub transaction_id: String,
    pub posted_at: String,
    pub amount: Money,
    pub currency: String,
    pub method: TransactionMethod,
    pub principal_component: Money,
    pub interest_component: Money,
    pub fees_component: Money,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: String,
    pub client_id: String,
    pub linked_repayment_account_id: String,
    #[serde(rename = "type", default)]
    pub loan_type: LoanType,
    pub principal: Money,
    pub currency: String,
    #[serde(default)]
    pub interest_rate_apr: f64,
    #[serde(default)]
    pub amortization: Amortization,
    #[serde(default)]
    pub term_months: u32,
    #[serde(default)]
    pub origination_date: String,
    #[serde(default)]
    pub first_payment_date: String,
    #[serde(default)]
    pub maturity_date: String,
    pub status: LoanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collateral: Option<Collateral>,
    #[serde(default)]
    pub payment_schedule: Vec<ScheduledPayment>,
    #[serde(default)]
    pub repayment_history: Vec<Repayment>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
}

impl BeneficiaryName {
    /// Display name, business name, personal name, or a placeholder.
    #[must_use]
    pub fn display(&self) -> String {
        let non_empty = |s: &Option<String>| s.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);
        if let Some(name) = non_empty(&self.display_name).or_else(|| non_empty(&self.business_name)) {
            return name;
        }
        let personal: Vec<&str> = [&self.first_name, &self.last_name]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .filter(|s| !s.is_empty())
            .collect();
        if personal.is_empty() {
            "Unnamed Beneficiary".to_string()
        } else {
            personal.join(" ")
        }
    }

    /// Returns true if no name part is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.display_name, &self.first_name, &self.last_name, &self.business_name]
            .into_iter()
            .all(|s| s.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number_masked: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift_bic: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLimits {
    pub per_transfer_limit: Money,
    pub daily_limit: Money,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub status: VerificationStatus,
    #[serde(default)]
    pub method: VerificationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub beneficiary_id: String,
    pub client_id: String,
    pub name: BeneficiaryName,
    #[serde(rename = "type")]
    pub beneficiary_type: BeneficiaryType,
    pub bank_details: BankDetails,
    #[serde(default)]
    pub address: Address,
    pub allowed_from_account_ids: Vec<String>,
    pub transfer_limits: TransferLimits,
    pub verification: Verification,
    pub status: BeneficiaryStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ----------------------------------------------------------------------------
// Database
// ----------------------------------------------------------------------------

/// The bank store.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankDb {
    #[serde(default)]
    pub clients: Table<Client>,
    #[serde(default)]
    pub accounts: Table<Account>,
    #[serde(default)]
    pub cards: Table<Card>,
    #[serde(default)]
    pub transactions: Table<Transaction>,
    #[serde(default)]
    pub loans: Table<Loan>,
    #[serde(default)]
    pub beneficiaries: Table<Beneficiary>,
}

impl BankDb {
    pub(crate) fn client(&self, client_id: &str) -> Result<&Client, ToolError> {
        self.clients.require("Client", client_id)
    }

    /// An account, checked to belong to `client_id`.
    pub(crate) fn owned_account(&self, client_id: &str, account_id: &str) -> Result<&Account, ToolError> {
        self.client(client_id)?;
        let account = self.accounts.require("Account", account_id)?;
        if account.client_id != client_id {
            return Err(ToolError::not_owned("Account", account_id, client_id));
        }
        Ok(account)
    }

    /// A beneficiary, checked to belong to `client_id`.
    pub(crate) fn owned_beneficiary(
        &self,
        client_id: &str,
        beneficiary_id: &str,
    ) -> Result<&Beneficiary, ToolError> {
        let client = self.client(client_id)?;
        let beneficiary = self.beneficiaries.require("Beneficiary", beneficiary_id)?;
        if beneficiary.client_id != client_id || !client.beneficiary_ids.contains(&beneficiary.beneficiary_id) {
            return Err(ToolError::not_owned("Beneficiary", beneficiary_id, client_id));
        }
        Ok(beneficiary)
    }

    /// Accounts of `client_id`, in id order.
    pub(crate) fn client_accounts<'a>(&'a self, client_id: &'a str) -> impl Iterator<Item = &'a Account> + 'a {
        self.accounts.values().filter(move |a| a.client_id == client_id)
    }

    /// Every entry belonging to the economic event `event`.
    pub(crate) fn event_entries<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.transactions.values().filter(move |t| t.event_key() == event)
    }
}

impl Database for BankDb {
    fn statistics(&self) -> Statistics {
        let total_current: Money = self.accounts.values().map(|a| a.balance.current).sum();
        let mut stats = Statistics::new();
        stats.insert("num_clients".to_string(), json!(self.clients.len()));
        stats.insert("num_accounts".to_string(), json!(self.accounts.len()));
        stats.insert("num_cards".to_string(), json!(self.cards.len()));
        stats.insert("num_transactions".to_string(), json!(self.transactions.len()));
        stats.insert("num_loans".to_string(), json!(self.loans.len()));
        stats.insert("num_beneficiaries".to_string(), json!(self.beneficiaries.len()));
        stats.insert("total_current_balance".to_string(), json!(total_current));
        stats
    }
}
