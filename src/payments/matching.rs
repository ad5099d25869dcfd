//! Matching an inbound bank transfer to a user's pending payment

use crate::store::UserRecord;
use crate::util::money::parse_amount;

/// Payer details the provider reports for a transfer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentSource {
    pub account_name: Option<String>,
    pub account_number: Option<String>,
    pub customer_name: Option<String>,
}

impl PaymentSource {
    pub fn is_empty(&self) -> bool {
        [&self.account_name, &self.account_number, &self.customer_name]
            .iter()
            .all(|field| field.as_deref().map(normalize).unwrap_or_default().is_empty())
    }
}

/// Lowercase ASCII alphanumerics only: "ADA  O. Eze" and "ada o eze" agree
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn same(stored: &str, reported: Option<&str>) -> bool {
    let stored = normalize(stored);
    !stored.is_empty() && reported.is_some_and(|r| normalize(r) == stored)
}

/// Scan users holding a pending payment for one whose sender account or
/// account name matches the source. Candidates whose pending amount equals
/// the paid amount win; otherwise the first candidate in key order.
pub fn find_pending_match<'a>(
    users: &'a [(String, UserRecord)],
    source: &PaymentSource,
    amount: f64,
) -> Option<&'a str> {
    let mut fallback = None;

    for (user_id, user) in users {
        let Some(pending) = user.pending_pay.as_ref().filter(|p| p.is_pending()) else {
            continue;
        };

        let account_match = same(&pending.sender_account, source.account_number.as_deref());
        let name_match = same(&pending.account_name, source.account_name.as_deref())
            || same(&pending.account_name, source.customer_name.as_deref());
        if !account_match && !name_match {
            continue;
        }

        let amount_match = parse_amount(&pending.amount).is_some_and(|a| (a - amount).abs() < 0.005);
        if amount_match {
            return Some(user_id);
        }
        fallback.get_or_insert(user_id.as_str());
    }

    fallback
}
