//! User records under `users/`

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::database::{Database, StoreError};
use crate::util::money::{lenient_amount, parse_amount};

const USERS: &str = "users";

// Clients wrote request bodies straight into the database, so phone and
// account numbers, counters and timestamps show up as either strings or numbers.

fn as_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(as_text))
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(parse_amount)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64))
}

/// Pending payment awaiting webhook confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPay {
    #[serde(default)]
    pub amount: Value,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub sender_account: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub account_name: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub status: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<String>,
}

impl PendingPay {
    pub const PENDING: &'static str = "pending";
    pub const CONFIRMED: &'static str = "confirmed";

    pub fn is_pending(&self) -> bool {
        self.status == Self::PENDING
    }
}

/// Withdrawal request waiting for manual payout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub amount: f64,
    pub bank_code: String,
    pub account_number: String,
    pub bank_name: String,
    pub account_name: String,
    pub date: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A user node. Fields the API does not know about are kept in `extra`
/// so read-modify-write cycles never drop them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub full_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub county: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub referral_code: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub referral_by: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub referral_count: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub referral_link: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub daily_upgrade: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub investment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_time: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsohon_user: Option<Value>,
    #[serde(
        default,
        deserialize_with = "lenient_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_balance: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_claim: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient_amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub networkfee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_paid_users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_pay: Option<PendingPay>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_status: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn balance(&self) -> f64 {
        self.user_balance.unwrap_or(0.0)
    }

    pub fn invested(&self) -> f64 {
        self.investment.unwrap_or(0.0)
    }

    pub fn daily(&self) -> f64 {
        self.daily_upgrade.unwrap_or(0.0)
    }

    /// `tsohonUser` ("old user") has been stored as both bool and string
    pub fn is_returning(&self) -> bool {
        match &self.tsohon_user {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn has_paid_referral_for(&self, user_id: &str) -> bool {
        self.referral_paid_users
            .as_ref()
            .is_some_and(|paid| paid.iter().any(|id| id == user_id))
    }
}

/// New registration written by the sign-up flow
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub full_name: Option<String>,
    pub gender: Option<String>,
    pub county: Option<String>,
    pub address: Option<String>,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub email: String,
    pub referral_code: Option<String>,
    pub referral_by: Option<String>,
    pub referral_link: Option<String>,
}

/// User store operations
#[derive(Clone)]
pub struct UserStore {
    db: Arc<dyn Database>,
}

impl UserStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    fn user_path(user_id: &str) -> String {
        format!("{}/{}", USERS, user_id)
    }

    fn decode(value: Value) -> Result<UserRecord, StoreError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Get a user by ID
    pub async fn get(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.db
            .get(&Self::user_path(user_id))
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Write a freshly registered user with zeroed balances
    pub async fn create(
        &self,
        user_id: &str,
        user: NewUser,
        registered_at: String,
    ) -> Result<UserRecord, StoreError> {
        let record = UserRecord {
            full_name: user.full_name,
            gender: user.gender,
            county: user.county,
            address: user.address,
            username: user.username,
            phone_number: user.phone_number,
            email: Some(user.email),
            referral_code: user.referral_code,
            referral_by: user.referral_by,
            referral_count: Some(0),
            referral_link: user.referral_link,
            daily_upgrade: Some(0.0),
            investment: Some(0.0),
            tsohon_user: Some(Value::Bool(false)),
            user_balance: Some(0.0),
            registration_date: Some(registered_at),
            active_status: Some(Value::Bool(true)),
            ..Default::default()
        };

        self.db
            .set(&Self::user_path(user_id), &serde_json::to_value(&record)?)
            .await?;
        Ok(record)
    }

    /// All users with this email, in key order
    pub async fn find_all_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<(String, UserRecord)>, StoreError> {
        self.find_all_by("email", email).await
    }

    /// First user with this email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<(String, UserRecord)>, StoreError> {
        Ok(self.find_all_by_email(email).await?.into_iter().next())
    }

    /// User owning a referral code
    pub async fn find_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<(String, UserRecord)>, StoreError> {
        Ok(self.find_all_by("referralCode", code).await?.into_iter().next())
    }

    async fn find_all_by(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, UserRecord)>, StoreError> {
        let found = self
            .db
            .query_equal(USERS, field, &Value::String(value.to_string()))
            .await?;

        found
            .into_iter()
            .map(|(id, value)| Self::decode(value).map(|user| (id, user)))
            .collect()
    }

    /// Every user, decoded. Nodes that are not user objects are skipped.
    pub async fn list(&self) -> Result<Vec<(String, UserRecord)>, StoreError> {
        let Some(Value::Object(users)) = self.db.get(USERS).await? else {
            return Ok(Vec::new());
        };

        Ok(users
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value(value) {
                Ok(user) => Some((id, user)),
                Err(e) => {
                    warn!(user_id = %id, error = %e, "Skipping undecodable user node");
                    None
                }
            })
            .collect())
    }

    /// The raw `users` tree, as the admin dashboard expects it
    pub async fn list_raw(&self) -> Result<Option<Value>, StoreError> {
        self.db.get(USERS).await
    }

    /// Patch fields of one user
    pub async fn update_fields(
        &self,
        user_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.db.update(&Self::user_path(user_id), fields).await
    }

    /// Multi-user patch; keys are `{user_id}/{field}`
    pub async fn update_many(&self, fields: &Map<String, Value>) -> Result<(), StoreError> {
        self.db.update(USERS, fields).await
    }

    /// Transactionally modify a user. `change` returns false to abort;
    /// it is never called for a missing user. Returns the record as stored
    /// afterwards (or as found on abort) and whether the write happened.
    pub async fn modify<F>(
        &self,
        user_id: &str,
        change: F,
    ) -> Result<(bool, Option<UserRecord>), StoreError>
    where
        F: Fn(&mut UserRecord) -> bool + Send + Sync,
    {
        let outcome = self
            .db
            .transaction(&Self::user_path(user_id), &|current| {
                let mut user: UserRecord = serde_json::from_value(current?.clone()).ok()?;
                if !change(&mut user) {
                    return None;
                }
                serde_json::to_value(&user).ok()
            })
            .await?;

        let user = outcome.value.map(Self::decode).transpose()?;
        Ok((outcome.committed, user))
    }

    /// Create a bare `{email}` user and return its generated key
    pub async fn push_placeholder(&self, email: &str) -> Result<String, StoreError> {
        let mut user = Map::new();
        user.insert("email".to_string(), Value::String(email.to_string()));
        self.db.push(USERS, &Value::Object(user)).await
    }

    /// Replace the user's pending payment
    pub async fn set_pending_pay(&self, user_id: &str, pending: &PendingPay) -> Result<(), StoreError> {
        let path = format!("{}/pendingPay", Self::user_path(user_id));
        self.db.set(&path, &serde_json::to_value(pending)?).await
    }

    /// Record a withdrawal request under `users/{id}/withdrawalPending`
    pub async fn set_withdrawal_pending(
        &self,
        record_id: &str,
        request: &WithdrawalRequest,
    ) -> Result<(), StoreError> {
        let path = format!("{}/withdrawalPending", Self::user_path(record_id));
        self.db.set(&path, &serde_json::to_value(request)?).await
    }
}
