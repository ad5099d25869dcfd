//! Daily bonus claims with a 24 hour cooldown

use crate::store::{StoreError, UserStore};
use crate::util::money::round2;
use crate::util::time::DAY_MILLIS;

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed { balance: f64, next_claim: u64 },
    TooEarly { next_claim: u64 },
    UserMissing,
}

/// Add `amount` to the balance if `now_ms` has reached `nextClaim`
pub async fn claim_daily(
    users: &UserStore,
    user_id: &str,
    amount: f64,
    now_ms: u64,
) -> Result<ClaimOutcome, StoreError> {
    let (committed, user) = users
        .modify(user_id, |user| {
            if now_ms < user.next_claim.unwrap_or(0) {
                return false;
            }
            user.user_balance = Some(round2(user.balance() + amount));
            user.next_claim = Some(now_ms + DAY_MILLIS);
            true
        })
        .await?;

    Ok(match (committed, user) {
        (true, Some(user)) => ClaimOutcome::Claimed {
            balance: user.balance(),
            next_claim: user.next_claim.unwrap_or(now_ms + DAY_MILLIS),
        },
        (false, Some(user)) => ClaimOutcome::TooEarly {
            next_claim: user.next_claim.unwrap_or(0),
        },
        _ => ClaimOutcome::UserMissing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDatabase;
    use serde_json::json;
    use std::sync::Arc;

    const NOW: u64 = 1_760_000_000_000;

    #[tokio::test]
    async fn claim_then_cooldown() {
        let users = UserStore::new(Arc::new(MemoryDatabase::with_root(json!({
            "users": {"u1": {"email": "a@b.c", "userBalance": 10.25}}
        }))));

        let first = claim_daily(&users, "u1", 250.0, NOW).await.unwrap();
        assert_eq!(
            first,
            ClaimOutcome::Claimed { balance: 260.25, next_claim: NOW + DAY_MILLIS }
        );

        let early = claim_daily(&users, "u1", 250.0, NOW + 1_000).await.unwrap();
        assert_eq!(early, ClaimOutcome::TooEarly { next_claim: NOW + DAY_MILLIS });

        let next_day = claim_daily(&users, "u1", 250.0, NOW + DAY_MILLIS).await.unwrap();
        assert!(matches!(next_day, ClaimOutcome::Claimed { balance, .. } if balance == 510.25));
    }

    #[tokio::test]
    async fn missing_user() {
        let users = UserStore::new(Arc::new(MemoryDatabase::new()));
        assert_eq!(
            claim_daily(&users, "ghost", 1.0, NOW).await.unwrap(),
            ClaimOutcome::UserMissing
        );
    }
}
