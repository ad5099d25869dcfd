//! Applying confirmed provider payments to user balances
//!
//! Every payment is claimed in the ledger first, so a replayed webhook
//! never credits twice. Balance changes are single-node transactions.

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::matching::{find_pending_match, PaymentSource};
use super::tiers::{tier_for, InvestmentTier};
use crate::accounts::referral::{credit_referrer, ReferralCredit};
use crate::store::users::PendingPay;
use crate::store::{Ledger, LedgerEntry, StoreError, UserStore};
use crate::util::money::round2;
use crate::util::time::{rfc3339_now, unix_millis};

/// Share of a transfer kept as network fee
pub const NETWORK_FEE_RATE: f64 = 0.07;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Paystack,
    Moniepoint,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Paystack => "paystack",
            Provider::Moniepoint => "moniepoint",
        }
    }
}

/// A confirmed inbound payment
#[derive(Debug, Clone)]
pub struct Deposit {
    pub provider: Provider,
    pub event: String,
    pub reference: String,
    /// Naira
    pub amount: f64,
    pub email: Option<String>,
    pub source: PaymentSource,
}

/// A completed outbound transfer to a user's bank account
#[derive(Debug, Clone)]
pub struct Transfer {
    pub provider: Provider,
    pub reference: String,
    pub amount: f64,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DepositOutcome {
    Applied {
        user_id: String,
        tier: Option<&'static InvestmentTier>,
        referral_paid: bool,
    },
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Settled { user_id: String, fee: f64 },
    Duplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient balance")]
    InsufficientBalance { available: f64, required: f64 },

    #[error("Database error: {0}")]
    Store(#[from] StoreError),
}

/// Network fee charged on a transfer, rounded to whole naira
pub fn network_fee(amount: f64) -> f64 {
    (amount * NETWORK_FEE_RATE).round()
}

#[derive(Clone)]
pub struct Reconciler {
    users: UserStore,
    ledger: Ledger,
    network_fee_email: String,
}

impl Reconciler {
    pub fn new(users: UserStore, ledger: Ledger, network_fee_email: String) -> Self {
        Self {
            users,
            ledger,
            network_fee_email,
        }
    }

    fn ledger_entry(
        provider: Provider,
        event: &str,
        reference: &str,
        amount: f64,
        email: Option<&str>,
    ) -> LedgerEntry {
        LedgerEntry {
            provider: provider.as_str().to_string(),
            reference: reference.to_string(),
            event: event.to_string(),
            amount,
            email: email.map(str::to_string),
            status: LedgerEntry::PROCESSING.to_string(),
            received_at: rfc3339_now(),
            claimed_at: unix_millis(),
            user_id: None,
        }
    }

    /// Release a claim after a failure. A failed release is logged only;
    /// the original error is what the caller reports.
    async fn release(&self, key: &str) {
        if let Err(e) = self.ledger.release(key).await {
            error!(ledger_key = %key, error = %e, "Failed to release ledger claim");
        }
    }

    /// Credit an investment exactly once per provider reference
    pub async fn apply_deposit(&self, deposit: &Deposit) -> Result<DepositOutcome, ReconcileError> {
        let key = Ledger::key(deposit.provider.as_str(), &deposit.reference);
        let entry = Self::ledger_entry(
            deposit.provider,
            &deposit.event,
            &deposit.reference,
            deposit.amount,
            deposit.email.as_deref(),
        );

        if !self.ledger.claim(&key, &entry).await? {
            info!(
                provider = deposit.provider.as_str(),
                reference = %deposit.reference,
                "Duplicate payment notification ignored"
            );
            return Ok(DepositOutcome::Duplicate);
        }

        match self.credit_deposit(deposit).await {
            Ok((user_id, tier, referral_paid)) => {
                let mut details = Map::new();
                details.insert("referralPaid".to_string(), Value::Bool(referral_paid));
                if let Some(tier) = tier {
                    details.insert("tier".to_string(), Value::from(tier.amount));
                }
                if let Err(e) = self.ledger.mark_applied(&key, &user_id, details).await {
                    // The credit already happened; keep the claim so it is never repeated
                    warn!(ledger_key = %key, error = %e, "Failed to mark ledger entry applied");
                }

                info!(
                    provider = deposit.provider.as_str(),
                    reference = %deposit.reference,
                    user_id = %user_id,
                    amount = deposit.amount,
                    referral_paid,
                    "Deposit applied"
                );
                Ok(DepositOutcome::Applied {
                    user_id,
                    tier,
                    referral_paid,
                })
            }
            Err(e) => {
                self.release(&key).await;
                Err(e)
            }
        }
    }

    async fn resolve_depositor(&self, deposit: &Deposit) -> Result<Option<String>, ReconcileError> {
        if let Some(email) = deposit.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            if let Some((user_id, _)) = self.users.find_by_email(email).await? {
                return Ok(Some(user_id));
            }
        }

        if deposit.source.is_empty() {
            return Ok(None);
        }

        let users = self.users.list().await?;
        Ok(find_pending_match(&users, &deposit.source, deposit.amount).map(str::to_string))
    }

    async fn credit_deposit(
        &self,
        deposit: &Deposit,
    ) -> Result<(String, Option<&'static InvestmentTier>, bool), ReconcileError> {
        let user_id = self
            .resolve_depositor(deposit)
            .await?
            .ok_or(ReconcileError::UserNotFound)?;

        let tier = tier_for(deposit.amount);
        let now_ms = unix_millis();
        let confirmed_at = rfc3339_now();

        let (committed, user) = self
            .users
            .modify(&user_id, |user| {
                user.investment = Some(round2(user.invested() + deposit.amount));
                if let Some(tier) = tier {
                    user.daily_upgrade = Some(round2(user.daily() + tier.daily));
                }
                user.investment_time = Some(Value::from(now_ms));
                user.tsohon_user = Some(Value::Bool(true));
                if let Some(pending) = user.pending_pay.as_mut().filter(|p| p.is_pending()) {
                    pending.status = PendingPay::CONFIRMED.to_string();
                    pending.reference = Some(deposit.reference.clone());
                    pending.confirmed_at = Some(confirmed_at.clone());
                }
                true
            })
            .await?;

        let user = match (committed, user) {
            (true, Some(user)) => user,
            _ => return Err(ReconcileError::UserNotFound),
        };

        let referral_paid = match (tier, user.referral_by.as_deref()) {
            (Some(tier), Some(code)) if !code.trim().is_empty() => {
                let credit = ReferralCredit {
                    balance: tier.referral_bonus,
                    daily: 0.0,
                };
                // The deposit is committed; a failed referral credit must not release the claim
                match credit_referrer(&self.users, &user_id, code.trim(), credit).await {
                    Ok(paid) => paid,
                    Err(e) => {
                        error!(user_id = %user_id, error = %e, "Referral credit failed");
                        false
                    }
                }
            }
            _ => false,
        };

        Ok((user_id, tier, referral_paid))
    }

    /// Deduct a completed transfer plus network fee from the user's balance
    /// and credit the fee to the network-fee account
    pub async fn settle_transfer(&self, transfer: &Transfer) -> Result<TransferOutcome, ReconcileError> {
        let key = Ledger::key(transfer.provider.as_str(), &transfer.reference);
        let entry = Self::ledger_entry(
            transfer.provider,
            "transfer.success",
            &transfer.reference,
            transfer.amount,
            Some(&transfer.email),
        );

        if !self.ledger.claim(&key, &entry).await? {
            info!(reference = %transfer.reference, "Duplicate transfer notification ignored");
            return Ok(TransferOutcome::Duplicate);
        }

        match self.debit_transfer(transfer).await {
            Ok((user_id, fee)) => {
                let mut details = Map::new();
                details.insert("networkFee".to_string(), Value::from(fee));
                if let Err(e) = self.ledger.mark_applied(&key, &user_id, details).await {
                    warn!(ledger_key = %key, error = %e, "Failed to mark ledger entry applied");
                }
                Ok(TransferOutcome::Settled { user_id, fee })
            }
            Err(e) => {
                self.release(&key).await;
                Err(e)
            }
        }
    }

    async fn debit_transfer(&self, transfer: &Transfer) -> Result<(String, f64), ReconcileError> {
        let (user_id, _) = self
            .users
            .find_by_email(&transfer.email)
            .await?
            .ok_or(ReconcileError::UserNotFound)?;

        let fee = network_fee(transfer.amount);
        let required = transfer.amount + fee;

        let (committed, user) = self
            .users
            .modify(&user_id, |user| {
                if user.balance() < required {
                    return false;
                }
                user.user_balance = Some(round2(user.balance() - required));
                true
            })
            .await?;

        if !committed {
            return match user {
                Some(user) => Err(ReconcileError::InsufficientBalance {
                    available: user.balance(),
                    required,
                }),
                None => Err(ReconcileError::UserNotFound),
            };
        }

        if let Err(e) = self.credit_network_fee(fee).await {
            error!(user_id = %user_id, fee, error = %e, "Network fee credit failed");
        }
        info!(user_id = %user_id, amount = transfer.amount, fee, "Transfer settled");
        Ok((user_id, fee))
    }

    async fn credit_network_fee(&self, fee: f64) -> Result<(), ReconcileError> {
        if fee <= 0.0 {
            return Ok(());
        }

        if let Some((fee_account, _)) = self.users.find_by_email(&self.network_fee_email).await? {
            self.users
                .modify(&fee_account, |account| {
                    account.networkfee = Some(round2(account.networkfee.unwrap_or(0.0) + fee));
                    true
                })
                .await?;
            return Ok(());
        }

        let fee_account = self.users.push_placeholder(&self.network_fee_email).await?;
        let mut fields = Map::new();
        fields.insert("networkfee".to_string(), Value::from(fee));
        self.users.update_fields(&fee_account, &fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FaultyDatabase;
    use crate::store::{Database, MemoryDatabase, UserRecord};
    use serde_json::json;
    use std::sync::Arc;

    const FEE_EMAIL: &str = "fees@agrofruit.test";

    fn setup(root: Value) -> (Arc<MemoryDatabase>, Reconciler, UserStore) {
        let db = Arc::new(MemoryDatabase::with_root(root));
        let users = UserStore::new(db.clone());
        let reconciler = Reconciler::new(
            users.clone(),
            Ledger::new(db.clone()),
            FEE_EMAIL.to_string(),
        );
        (db, reconciler, users)
    }

    fn deposit(reference: &str, amount: f64, email: Option<&str>) -> Deposit {
        Deposit {
            provider: Provider::Paystack,
            event: "charge.success".to_string(),
            reference: reference.to_string(),
            amount,
            email: email.map(str::to_string),
            source: PaymentSource::default(),
        }
    }

    async fn user(users: &UserStore, id: &str) -> UserRecord {
        users.get(id).await.unwrap().unwrap()
    }

    fn seeded() -> Value {
        json!({
            "users": {
                "referrer": {
                    "email": "ada@x.com",
                    "referralCode": "ADA1",
                    "userBalance": 100.0,
                    "referralCount": 0
                },
                "investor": {
                    "email": "bola@x.com",
                    "referralCode": "BOLA2",
                    "referralBy": "ADA1",
                    "investment": 0.0,
                    "dailyUpgrade": 0.0,
                    "tsohonUser": false,
                    "userBalance": 0.0,
                    "pendingPay": {
                        "amount": 10000,
                        "email": "bola@x.com",
                        "senderAccount": "0123456789",
                        "accountName": "Bola Ade",
                        "status": "pending",
                        "time": "2026-01-01T00:00:00.000Z"
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn deposit_credits_investment_tier_and_referral() {
        let (_, reconciler, users) = setup(seeded());

        let outcome = reconciler
            .apply_deposit(&deposit("ref-1", 10_000.0, Some("bola@x.com")))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DepositOutcome::Applied {
                user_id: "investor".to_string(),
                tier: tier_for(10_000.0),
                referral_paid: true,
            }
        );

        let investor = user(&users, "investor").await;
        assert_eq!(investor.invested(), 10_000.0);
        assert_eq!(investor.daily(), 500.0);
        assert!(investor.is_returning());
        let pending = investor.pending_pay.unwrap();
        assert_eq!(pending.status, PendingPay::CONFIRMED);
        assert_eq!(pending.reference.as_deref(), Some("ref-1"));

        let referrer = user(&users, "referrer").await;
        assert_eq!(referrer.balance(), 1_100.0);
        assert_eq!(referrer.referral_count, Some(1));
        assert!(referrer.has_paid_referral_for("investor"));
    }

    #[tokio::test]
    async fn replayed_reference_is_a_no_op() {
        let (_, reconciler, users) = setup(seeded());
        let payment = deposit("ref-1", 10_000.0, Some("bola@x.com"));

        reconciler.apply_deposit(&payment).await.unwrap();
        let replay = reconciler.apply_deposit(&payment).await.unwrap();
        assert_eq!(replay, DepositOutcome::Duplicate);

        assert_eq!(user(&users, "investor").await.invested(), 10_000.0);
        assert_eq!(user(&users, "referrer").await.balance(), 1_100.0);
    }

    #[tokio::test]
    async fn referral_bonus_is_paid_once_per_referred_user() {
        let (_, reconciler, users) = setup(seeded());

        reconciler
            .apply_deposit(&deposit("ref-1", 10_000.0, Some("bola@x.com")))
            .await
            .unwrap();
        let second = reconciler
            .apply_deposit(&deposit("ref-2", 5_000.0, Some("bola@x.com")))
            .await
            .unwrap();

        assert!(matches!(second, DepositOutcome::Applied { referral_paid: false, .. }));
        let investor = user(&users, "investor").await;
        assert_eq!(investor.invested(), 15_000.0);
        assert_eq!(investor.daily(), 750.0);
        assert_eq!(user(&users, "referrer").await.balance(), 1_100.0);
    }

    #[tokio::test]
    async fn small_deposit_has_no_tier_or_referral() {
        let (_, reconciler, users) = setup(seeded());

        let outcome = reconciler
            .apply_deposit(&deposit("ref-small", 1_000.0, Some("bola@x.com")))
            .await
            .unwrap();
        assert!(matches!(outcome, DepositOutcome::Applied { tier: None, referral_paid: false, .. }));
        assert_eq!(user(&users, "investor").await.daily(), 0.0);
        assert_eq!(user(&users, "referrer").await.balance(), 100.0);
    }

    #[tokio::test]
    async fn unknown_payer_releases_the_claim() {
        let (db, reconciler, _) = setup(seeded());
        let payment = deposit("ref-x", 5_000.0, Some("ghost@x.com"));

        let err = reconciler.apply_deposit(&payment).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UserNotFound));
        let key = Ledger::key("paystack", "ref-x");
        assert_eq!(db.get(&format!("transactions/{}", key)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn transfer_without_email_matches_pending_payment() {
        let (_, reconciler, users) = setup(seeded());
        let mut payment = deposit("MNFY-1", 10_000.0, None);
        payment.provider = Provider::Moniepoint;
        payment.source = PaymentSource {
            account_name: Some("BOLA ADE".to_string()),
            account_number: None,
            customer_name: None,
        };

        let outcome = reconciler.apply_deposit(&payment).await.unwrap();
        assert!(matches!(outcome, DepositOutcome::Applied { ref user_id, .. } if user_id == "investor"));
        assert_eq!(user(&users, "investor").await.invested(), 10_000.0);
    }

    #[tokio::test]
    async fn transfer_debits_amount_plus_fee_and_credits_fee_account() {
        let (_, reconciler, users) = setup(json!({
            "users": {"u1": {"email": "ada@x.com", "userBalance": 2_000.0}}
        }));
        let transfer = Transfer {
            provider: Provider::Paystack,
            reference: "trf-1".to_string(),
            amount: 1_000.0,
            email: "ada@x.com".to_string(),
        };

        let outcome = reconciler.settle_transfer(&transfer).await.unwrap();
        assert_eq!(
            outcome,
            TransferOutcome::Settled { user_id: "u1".to_string(), fee: 70.0 }
        );
        assert_eq!(user(&users, "u1").await.balance(), 930.0);

        let (_, fee_account) = users.find_by_email(FEE_EMAIL).await.unwrap().unwrap();
        assert_eq!(fee_account.networkfee, Some(70.0));

        // second transfer reuses the fee account
        let next = Transfer { reference: "trf-2".to_string(), amount: 100.0, ..transfer };
        reconciler.settle_transfer(&next).await.unwrap();
        let (_, fee_account) = users.find_by_email(FEE_EMAIL).await.unwrap().unwrap();
        assert_eq!(fee_account.networkfee, Some(77.0));
    }

    #[tokio::test]
    async fn transfer_larger_than_balance_is_rejected() {
        let (db, reconciler, users) = setup(json!({
            "users": {"u1": {"email": "ada@x.com", "userBalance": 1_000.0}}
        }));
        let transfer = Transfer {
            provider: Provider::Paystack,
            reference: "trf-1".to_string(),
            amount: 1_000.0,
            email: "ada@x.com".to_string(),
        };

        let err = reconciler.settle_transfer(&transfer).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InsufficientBalance { available, required }
                if available == 1_000.0 && required == 1_070.0
        ));
        assert_eq!(user(&users, "u1").await.balance(), 1_000.0);
        let key = Ledger::key("paystack", "trf-1");
        assert_eq!(db.get(&format!("transactions/{}", key)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_failure_releases_claim_for_retry() {
        let db = Arc::new(FaultyDatabase::with_root(seeded()));
        let users = UserStore::new(db.clone());
        let reconciler = Reconciler::new(users.clone(), Ledger::new(db.clone()), FEE_EMAIL.to_string());
        let payment = deposit("ref-down", 10_000.0, Some("bola@x.com"));

        db.fail_writes_under("users");
        let err = reconciler.apply_deposit(&payment).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Store(_)));
        let key = Ledger::key("paystack", "ref-down");
        assert_eq!(db.get(&format!("transactions/{}", key)).await.unwrap(), None);
        assert_eq!(user(&users, "investor").await.invested(), 0.0);

        db.heal();
        let retry = reconciler.apply_deposit(&payment).await.unwrap();
        assert!(matches!(retry, DepositOutcome::Applied { .. }));
        assert_eq!(user(&users, "investor").await.invested(), 10_000.0);
    }

    #[tokio::test]
    async fn abandoned_processing_claim_is_retried() {
        let mut root = seeded();
        let key = Ledger::key("paystack", "ref-crash");
        root["transactions"] = json!({
            (key.clone()): {
                "provider": "paystack",
                "reference": "ref-crash",
                "event": "charge.success",
                "amount": 10000,
                "status": "processing",
                "receivedAt": "2026-01-01T00:00:00.000Z",
                "claimedAt": 1_700_000_000_000u64
            }
        });
        let (_, reconciler, users) = setup(root);

        let outcome = reconciler
            .apply_deposit(&deposit("ref-crash", 10_000.0, Some("bola@x.com")))
            .await
            .unwrap();
        assert!(matches!(outcome, DepositOutcome::Applied { .. }));
        assert_eq!(user(&users, "investor").await.invested(), 10_000.0);
    }

    #[tokio::test]
    async fn references_differing_in_punctuation_are_distinct() {
        let (_, reconciler, users) = setup(seeded());

        let first = reconciler
            .apply_deposit(&deposit("order.7", 5_000.0, Some("bola@x.com")))
            .await
            .unwrap();
        let second = reconciler
            .apply_deposit(&deposit("order_7", 5_000.0, Some("bola@x.com")))
            .await
            .unwrap();

        assert!(matches!(first, DepositOutcome::Applied { .. }));
        assert!(matches!(second, DepositOutcome::Applied { .. }));
        assert_eq!(user(&users, "investor").await.invested(), 10_000.0);
    }

    #[tokio::test]
    async fn legacy_numeric_fields_do_not_block_deposits() {
        let (_, reconciler, users) = setup(json!({
            "users": {
                "u1": {"email": "ada@x.com", "phoneNumber": 8012345678u64, "investment": 0},
                "u2": {
                    "email": "walkin@x.com",
                    "phoneNumber": 8098765432u64,
                    "pendingPay": {
                        "amount": 5000,
                        "email": "walkin@x.com",
                        "senderAccount": 123456789,
                        "accountName": "Walk In",
                        "status": "pending",
                        "time": "2026-01-01T00:00:00.000Z"
                    }
                }
            }
        }));

        reconciler
            .apply_deposit(&deposit("ref-legacy", 5_000.0, Some("ada@x.com")))
            .await
            .unwrap();
        let ada = user(&users, "u1").await;
        assert_eq!(ada.invested(), 5_000.0);
        assert_eq!(ada.phone_number.as_deref(), Some("8012345678"));

        let mut payment = deposit("MNFY-legacy", 5_000.0, None);
        payment.provider = Provider::Moniepoint;
        payment.source = PaymentSource {
            account_number: Some("123456789".to_string()),
            ..Default::default()
        };
        let outcome = reconciler.apply_deposit(&payment).await.unwrap();
        assert!(matches!(outcome, DepositOutcome::Applied { ref user_id, .. } if user_id == "u2"));
    }

    #[test]
    fn network_fee_rounds_to_whole_naira() {
        assert_eq!(network_fee(1_000.0), 70.0);
        assert_eq!(network_fee(1_234.0), 86.0);
    }
}
