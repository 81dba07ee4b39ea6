//! Account domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Currency;
use crate::error::DomainError;

/// Owner id under which all system bookkeeping accounts are registered.
pub const SYSTEM_OWNER_ID: &str = "system";

/// Unique identifier for an Account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Creates a new random AccountId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AccountId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the UUID value.
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Who owns an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    #[default]
    User,
    Partner,
    Agent,
    System,
}

/// What an account is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountPurpose {
    Wallet,
    Settlement,
    Liquidity,
    Fees,
    Clearing,
    Revenue,
    Commission,
}

impl AccountPurpose {
    /// Purposes every currency needs on the system side of the books.
    pub const SYSTEM: [AccountPurpose; 5] = [
        AccountPurpose::Liquidity,
        AccountPurpose::Fees,
        AccountPurpose::Clearing,
        AccountPurpose::Settlement,
        AccountPurpose::Revenue,
    ];

    /// Two-letter code used in account numbers.
    pub fn code(&self) -> &'static str {
        match self {
            AccountPurpose::Wallet => "WL",
            AccountPurpose::Settlement => "ST",
            AccountPurpose::Liquidity => "LQ",
            AccountPurpose::Fees => "FE",
            AccountPurpose::Clearing => "CL",
            AccountPurpose::Revenue => "RV",
            AccountPurpose::Commission => "CM",
        }
    }

    /// The customer-facing purpose for an owner type.
    pub fn primary_for(owner_type: OwnerType) -> Self {
        match owner_type {
            OwnerType::Partner => AccountPurpose::Settlement,
            OwnerType::Agent => AccountPurpose::Commission,
            OwnerType::User | OwnerType::System => AccountPurpose::Wallet,
        }
    }
}

/// Real-money or demo (paper) account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Real,
    Demo,
}

impl AccountType {
    /// Upper-case variant tag used by receipt codes.
    pub fn tag(&self) -> &'static str {
        match self {
            AccountType::Real => "REAL",
            AccountType::Demo => "DEMO",
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ident { $($variant:ident => $text:literal),* $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),*
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)*
                    other => Err(DomainError::ValidationError(format!(
                        "unknown {}: {}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

impl_str_enum!(OwnerType {
    User => "user",
    Partner => "partner",
    Agent => "agent",
    System => "system",
});

impl_str_enum!(AccountPurpose {
    Wallet => "wallet",
    Settlement => "settlement",
    Liquidity => "liquidity",
    Fees => "fees",
    Clearing => "clearing",
    Revenue => "revenue",
    Commission => "commission",
});

impl_str_enum!(AccountType {
    Real => "real",
    Demo => "demo",
});

pub(crate) use impl_str_enum;

/// Natural key of an account: at most one account exists per tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    pub owner_id: String,
    pub currency: Currency,
    pub purpose: AccountPurpose,
    pub account_type: AccountType,
}

impl AccountKey {
    /// Key of a system bookkeeping account.
    pub fn system(currency: Currency, purpose: AccountPurpose, account_type: AccountType) -> Self {
        Self {
            owner_id: SYSTEM_OWNER_ID.to_string(),
            currency,
            purpose,
            account_type,
        }
    }
}

/// A ledger account holding a single-currency balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Human-facing account number
    pub account_number: String,
    pub owner_type: OwnerType,
    pub owner_id: String,
    pub currency: Currency,
    pub purpose: AccountPurpose,
    pub account_type: AccountType,
    /// Current balance in minor units
    pub balance: i64,
    /// How far below zero the balance may go, in minor units
    pub overdraft_limit: i64,
    pub commission_rate: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// System accounts may run negative; everything else is bounded by its overdraft.
    pub fn is_system(&self) -> bool {
        self.owner_type == OwnerType::System
    }

    /// Spendable funds: balance plus overdraft allowance.
    pub fn available(&self) -> i64 {
        self.balance.saturating_add(self.overdraft_limit)
    }

    pub fn key(&self) -> AccountKey {
        AccountKey {
            owner_id: self.owner_id.clone(),
            currency: self.currency,
            purpose: self.purpose,
            account_type: self.account_type,
        }
    }
}

/// A validated account ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub id: AccountId,
    pub account_number: String,
    pub owner_type: OwnerType,
    pub owner_id: String,
    pub currency: Currency,
    pub purpose: AccountPurpose,
    pub account_type: AccountType,
    pub overdraft_limit: i64,
    pub commission_rate: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl NewAccount {
    /// Validates the request fields and assigns identity.
    ///
    /// # Validation
    /// - Owner id cannot be empty
    /// - Overdraft cannot be negative
    /// - Commission rate must lie in `[0, 1]`
    pub fn new(
        owner_type: OwnerType,
        owner_id: impl Into<String>,
        currency: Currency,
        purpose: AccountPurpose,
        account_type: AccountType,
        overdraft_limit: i64,
        commission_rate: Option<Decimal>,
    ) -> Result<Self, DomainError> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Owner id cannot be empty".into(),
            ));
        }
        if overdraft_limit < 0 {
            return Err(DomainError::ValidationError(
                "Overdraft limit cannot be negative".into(),
            ));
        }
        if let Some(rate) = commission_rate {
            if rate.is_sign_negative() || rate > Decimal::ONE {
                return Err(DomainError::ValidationError(format!(
                    "Commission rate must be between 0 and 1, got {}",
                    rate
                )));
            }
        }

        let id = AccountId::new();
        let account_number = Self::number_for(&id, currency, purpose);

        Ok(Self {
            id,
            account_number,
            owner_type,
            owner_id,
            currency,
            purpose,
            account_type,
            overdraft_limit,
            commission_rate,
            created_at: Utc::now(),
        })
    }

    /// `<purpose code>-<currency>-<10 digits>`, derived from the account id.
    fn number_for(id: &AccountId, currency: Currency, purpose: AccountPurpose) -> String {
        let digits = id.as_uuid().as_u128() % 10_000_000_000;
        format!("{}-{}-{:010}", purpose.code(), currency, digits)
    }

    pub fn key(&self) -> AccountKey {
        AccountKey {
            owner_id: self.owner_id.clone(),
            currency: self.currency,
            purpose: self.purpose,
            account_type: self.account_type,
        }
    }

    /// The stored form with a zero balance.
    pub fn into_account(self) -> Account {
        Account {
            id: self.id,
            account_number: self.account_number,
            owner_type: self.owner_type,
            owner_id: self.owner_id,
            currency: self.currency,
            purpose: self.purpose,
            account_type: self.account_type,
            balance: 0,
            overdraft_limit: self.overdraft_limit,
            commission_rate: self.commission_rate,
            is_active: true,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Result of an idempotent account insert.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountInsert {
    Created(Account),
    /// The natural key already existed; the stored record is returned.
    Existing(Account),
}

impl AccountInsert {
    pub fn account(&self) -> &Account {
        match self {
            AccountInsert::Created(a) | AccountInsert::Existing(a) => a,
        }
    }

    pub fn into_account(self) -> Account {
        match self {
            AccountInsert::Created(a) | AccountInsert::Existing(a) => a,
        }
    }
}

/// Mutable account attributes. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub overdraft_limit: Option<i64>,
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub clear_commission_rate: bool,
    pub is_active: Option<bool>,
}

impl AccountUpdate {
    pub fn validate(&self) -> Result<(), DomainError> {
        if matches!(self.overdraft_limit, Some(limit) if limit < 0) {
            return Err(DomainError::ValidationError(
                "Overdraft limit cannot be negative".into(),
            ));
        }
        if let Some(rate) = self.commission_rate {
            if rate.is_sign_negative() || rate > Decimal::ONE {
                return Err(DomainError::ValidationError(format!(
                    "Commission rate must be between 0 and 1, got {}",
                    rate
                )));
            }
        }
        Ok(())
    }

    /// Applies the update to a loaded account.
    pub fn apply_to(&self, account: &mut Account) {
        if let Some(limit) = self.overdraft_limit {
            account.overdraft_limit = limit;
        }
        if self.clear_commission_rate {
            account.commission_rate = None;
        } else if let Some(rate) = self.commission_rate {
            account.commission_rate = Some(rate);
        }
        if let Some(active) = self.is_active {
            account.is_active = active;
        }
        account.updated_at = Utc::now();
    }
}
