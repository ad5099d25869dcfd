//! One-time referral credits
//!
//! `referralPaidUsers` on the referrer lists every referred user already
//! paid for; both the sync endpoint and deposit reconciliation honour it.

use tracing::{info, warn};

use crate::store::{StoreError, UserStore};
use crate::util::money::round2;

/// What the referrer receives
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferralCredit {
    pub balance: f64,
    pub daily: f64,
}

/// Credit the owner of `code` for `referred_id` unless already paid.
/// Returns whether a credit was written.
pub async fn credit_referrer(
    users: &UserStore,
    referred_id: &str,
    code: &str,
    credit: ReferralCredit,
) -> Result<bool, StoreError> {
    let Some((referrer_id, _)) = users.find_by_referral_code(code).await? else {
        warn!(referral_code = %code, "Referral code has no owner");
        return Ok(false);
    };
    if referrer_id == referred_id {
        return Ok(false);
    }

    let (paid, _) = users
        .modify(&referrer_id, |referrer| {
            if referrer.has_paid_referral_for(referred_id) {
                return false;
            }
            referrer.user_balance = Some(round2(referrer.balance() + credit.balance));
            if credit.daily != 0.0 {
                referrer.daily_upgrade = Some(round2(referrer.daily() + credit.daily));
            }
            referrer.referral_count = Some(referrer.referral_count.unwrap_or(0) + 1);
            referrer
                .referral_paid_users
                .get_or_insert_with(Vec::new)
                .push(referred_id.to_string());
            true
        })
        .await?;

    if paid {
        info!(
            referrer_id = %referrer_id,
            referred_id = %referred_id,
            bonus = credit.balance,
            "Referral bonus paid"
        );
    }
    Ok(paid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDatabase;
    use serde_json::json;
    use std::sync::Arc;

    fn users() -> UserStore {
        UserStore::new(Arc::new(MemoryDatabase::with_root(json!({
            "users": {
                "ref": {"email": "ada@x.com", "referralCode": "ADA1", "userBalance": 10, "dailyUpgrade": 5},
                "new": {"email": "bola@x.com", "referralBy": "ADA1"}
            }
        }))))
    }

    #[tokio::test]
    async fn credits_balance_and_daily_once() {
        let users = users();
        let credit = ReferralCredit { balance: 150.0, daily: 150.0 };

        assert!(credit_referrer(&users, "new", "ADA1", credit).await.unwrap());
        assert!(!credit_referrer(&users, "new", "ADA1", credit).await.unwrap());

        let referrer = users.get("ref").await.unwrap().unwrap();
        assert_eq!(referrer.balance(), 160.0);
        assert_eq!(referrer.daily(), 155.0);
        assert_eq!(referrer.referral_count, Some(1));
        assert_eq!(referrer.referral_paid_users, Some(vec!["new".to_string()]));
    }

    #[tokio::test]
    async fn unknown_code_and_self_referral_pay_nothing() {
        let users = users();
        let credit = ReferralCredit { balance: 100.0, daily: 0.0 };
        assert!(!credit_referrer(&users, "new", "NOPE", credit).await.unwrap());
        assert!(!credit_referrer(&users, "ref", "ADA1", credit).await.unwrap());
        assert_eq!(users.get("ref").await.unwrap().unwrap().balance(), 10.0);
    }
}
