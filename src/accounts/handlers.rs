//! User endpoints: registration, balances, daily claims, referral sync,
//! pending withdrawals and pending payments

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::daily::{claim_daily, ClaimOutcome};
use super::referral::{credit_referrer, ReferralCredit};
use crate::app::AppState;
use crate::http::AppError;
use crate::store::database::is_valid_key;
use crate::store::users::{NewUser, PendingPay, WithdrawalRequest};
use crate::util::ids::random_hex_id;
use crate::util::money::{parse_amount, round2};
use crate::util::time::{rfc3339_now, unix_millis};

/// Welcome credit for a first-time user who already has an investment
pub const WELCOME_BONUS: f64 = 500.0;

// ============================================================================
// Request field helpers
// ============================================================================

/// Non-empty trimmed string
fn required<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Clients send account numbers and codes as strings or numbers
fn text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Present, numeric and strictly positive
fn positive_amount(value: &Option<Value>) -> Option<f64> {
    value.as_ref().and_then(parse_amount).filter(|a| *a > 0.0)
}

/// JavaScript truthiness, used where absent or falsy values keep the stored one
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn user_key(raw: &Option<String>, field: &str) -> Result<String, AppError> {
    let key = required(raw).ok_or_else(|| AppError::BadRequest(format!("Missing {}", field)))?;
    if !is_valid_key(key) {
        return Err(AppError::BadRequest(format!("Invalid {}", field)));
    }
    Ok(key.to_string())
}

// ============================================================================
// Registration
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    uid: Option<String>,
    #[serde(flatten)]
    profile: RegisterProfile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProfile {
    full_name: Option<String>,
    gender: Option<String>,
    county: Option<String>,
    address: Option<String>,
    username: Option<String>,
    phone_number: Option<Value>,
    email: Option<String>,
    referral_code: Option<String>,
    referral_by: Option<String>,
    referral_link: Option<String>,
}

/// `POST /api/userData`
pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Value>, AppError> {
    let uid = user_key(&req.uid, "uid")?;
    let profile = req.profile;
    let email = required(&profile.email)
        .ok_or_else(|| AppError::BadRequest("Missing email".to_string()))?
        .to_string();

    if let Some(existing) = state.users.get(&uid).await? {
        if existing.registration_date.is_some() {
            return Err(AppError::Conflict("User already registered".to_string()));
        }
    }

    let new_user = NewUser {
        full_name: profile.full_name,
        gender: profile.gender,
        county: profile.county,
        address: profile.address,
        username: profile.username,
        phone_number: text(&profile.phone_number),
        email,
        referral_code: profile.referral_code,
        referral_by: profile.referral_by.filter(|r| !r.trim().is_empty()),
        referral_link: profile.referral_link,
    };

    state.users.create(&uid, new_user, rfc3339_now()).await?;
    info!(user_id = %uid, "User registered");

    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Admin listing
// ============================================================================

/// `GET|POST /api/adminsdk`
pub async fn admin_users_handler(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let users = state
        .users
        .list_raw()
        .await?
        .ok_or_else(|| AppError::NotFound("No users found".to_string()))?;
    Ok(Json(users))
}

// ============================================================================
// Bonus
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusRequest {
    email: Option<String>,
    bonus_amount: Option<Value>,
}

/// `POST /api/bonus`
pub async fn bonus_handler(
    State(state): State<AppState>,
    Json(req): Json<BonusRequest>,
) -> Result<Json<Value>, AppError> {
    let (Some(email), Some(bonus)) = (required(&req.email), positive_amount(&req.bonus_amount))
    else {
        return Err(AppError::BadRequest("Invalid request data".to_string()));
    };

    let (user_id, _) = state
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (committed, _) = state
        .users
        .modify(&user_id, |user| {
            user.user_balance = Some(round2(user.balance() + bonus));
            true
        })
        .await?;
    if !committed {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    info!(user_id = %user_id, bonus, "Bonus credited");
    Ok(Json(json!({ "message": "Bonus added successfully" })))
}

// ============================================================================
// Daily claim
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRequest {
    email: Option<String>,
    daily_upgrade: Option<Value>,
}

/// `POST /api/daily`
pub async fn daily_handler(
    State(state): State<AppState>,
    Json(req): Json<DailyRequest>,
) -> Result<Response, AppError> {
    let (Some(email), Some(amount)) = (
        required(&req.email),
        req.daily_upgrade.as_ref().and_then(parse_amount),
    ) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };
    if amount < 0.0 {
        return Err(AppError::BadRequest("dailyUpgrade must not be negative".to_string()));
    }

    let (user_id, _) = state
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    match claim_daily(&state.users, &user_id, amount, unix_millis()).await? {
        ClaimOutcome::Claimed { balance, next_claim } => {
            info!(user_id = %user_id, amount, "Daily bonus claimed");
            Ok(Json(json!({
                "success": true,
                "message": "User data updated successfully",
                "userBalance": balance,
                "nextClaim": next_claim,
            }))
            .into_response())
        }
        ClaimOutcome::TooEarly { next_claim } => Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Cannot update balance before 24 hours",
                "nextClaim": next_claim,
            })),
        )
            .into_response()),
        ClaimOutcome::UserMissing => Err(AppError::NotFound("User not found".to_string())),
    }
}

// ============================================================================
// Investment update
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentUpdateRequest {
    email: Option<String>,
    daily_upgrade: Option<Value>,
    investment_time: Option<Value>,
    investment: Option<Value>,
}

/// `POST /api/update`
pub async fn investment_update_handler(
    State(state): State<AppState>,
    Json(req): Json<InvestmentUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let missing = || AppError::BadRequest("Missing required fields".to_string());
    let email = required(&req.email).ok_or_else(missing)?;
    let daily = req.daily_upgrade.as_ref().and_then(parse_amount).ok_or_else(missing)?;
    let investment = req.investment.as_ref().and_then(parse_amount).ok_or_else(missing)?;
    let investment_time = req
        .investment_time
        .filter(|v| !v.is_null())
        .ok_or_else(missing)?;
    if daily < 0.0 || investment < 0.0 {
        return Err(AppError::BadRequest("Amounts must not be negative".to_string()));
    }

    let matches = state.users.find_all_by_email(email).await?;
    if matches.is_empty() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let mut fields = Map::new();
    for (user_id, _) in &matches {
        fields.insert(format!("{}/dailyUpgrade", user_id), Value::from(daily));
        fields.insert(format!("{}/investmentTime", user_id), investment_time.clone());
        fields.insert(format!("{}/investment", user_id), Value::from(investment));
    }
    state.users.update_many(&fields).await?;

    info!(email = %email, users = matches.len(), "Investment updated");
    Ok(Json(json!({ "message": "User data updated successfully" })))
}

// ============================================================================
// User data sync with referral propagation
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    user_id: Option<String>,
    email: Option<String>,
    user_balance: Option<Value>,
    daily_upgrade: Option<Value>,
    investment_time: Option<Value>,
    tsohon_user: Option<Value>,
    referral_by: Option<String>,
}

/// `POST /api/get`
pub async fn sync_handler(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<Value>, AppError> {
    let user_id = user_key(&req.user_id, "userId")
        .map_err(|_| AppError::BadRequest("Invalid request payload".to_string()))?;
    if required(&req.email).is_none() {
        return Err(AppError::BadRequest("Invalid request payload".to_string()));
    }

    let user = state
        .users
        .get(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let provided = |v: &Option<Value>| v.clone().filter(truthy);

    let mut balance = provided(&req.user_balance)
        .as_ref()
        .and_then(parse_amount)
        .or(user.user_balance);
    let daily = provided(&req.daily_upgrade)
        .as_ref()
        .and_then(parse_amount)
        .or(user.daily_upgrade);
    let investment_time = provided(&req.investment_time).or_else(|| user.investment_time.clone());
    let tsohon_user = provided(&req.tsohon_user).or_else(|| user.tsohon_user.clone());

    let first_time = matches!(&req.tsohon_user, Some(Value::String(s)) if s == "false")
        || matches!(&req.tsohon_user, Some(Value::Bool(false)));
    if first_time && user.invested() > 0.0 {
        balance = Some(round2(user.balance() + WELCOME_BONUS));
    }

    if let Some(code) = required(&req.referral_by) {
        let amount = daily.unwrap_or(0.0);
        // Nothing to credit yet: keep the once-only slot for a real payout
        if amount > 0.0 {
            let credit = ReferralCredit {
                balance: amount,
                daily: amount,
            };
            credit_referrer(&state.users, &user_id, code, credit).await?;
        }
    }

    let mut fields = Map::new();
    if let Some(balance) = balance {
        fields.insert("userBalance".to_string(), Value::from(balance));
    }
    if let Some(daily) = daily {
        fields.insert("dailyUpgrade".to_string(), Value::from(daily));
    }
    if let Some(time) = investment_time {
        fields.insert("investmentTime".to_string(), time);
    }
    if let Some(tsohon) = tsohon_user {
        fields.insert("tsohonUser".to_string(), tsohon);
    }
    if !fields.is_empty() {
        state.users.update_fields(&user_id, &fields).await?;
    }

    Ok(Json(json!({ "message": "User data updated successfully" })))
}

// ============================================================================
// Pending withdrawal
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalBody {
    amount: Option<Value>,
    bank_code: Option<Value>,
    account_number: Option<Value>,
    bank_name: Option<String>,
    account_name: Option<String>,
    date: Option<Value>,
    user_id: Option<String>,
}

/// `POST /api/data`
pub async fn withdrawal_handler(
    State(state): State<AppState>,
    Json(req): Json<WithdrawalBody>,
) -> Result<Json<Value>, AppError> {
    let missing = || AppError::BadRequest("Missing required fields".to_string());
    let amount = positive_amount(&req.amount).ok_or_else(missing)?;
    let bank_code = text(&req.bank_code).ok_or_else(missing)?;
    let account_number = text(&req.account_number).ok_or_else(missing)?;
    let bank_name = required(&req.bank_name).ok_or_else(missing)?.to_string();
    let account_name = required(&req.account_name).ok_or_else(missing)?.to_string();
    let date = text(&req.date).ok_or_else(missing)?;
    let user_id = match required(&req.user_id) {
        Some(_) => Some(user_key(&req.user_id, "userId")?),
        None => None,
    };

    let record_id = random_hex_id();
    let request = WithdrawalRequest {
        amount,
        bank_code,
        account_number,
        bank_name,
        account_name,
        date,
        status: "pending".to_string(),
        user_id,
    };
    state.users.set_withdrawal_pending(&record_id, &request).await?;

    info!(record_id = %record_id, amount, "Withdrawal request recorded");
    Ok(Json(json!({
        "message": "Withdrawal request received",
        "id": record_id,
    })))
}

// ============================================================================
// Pending payment
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayRequest {
    amount: Option<Value>,
    email: Option<String>,
    sender_account: Option<Value>,
    account_name: Option<String>,
}

/// `POST /api/pendingpay`
pub async fn pending_payment_handler(
    State(state): State<AppState>,
    Json(req): Json<PendingPayRequest>,
) -> Result<Json<Value>, AppError> {
    let missing = || AppError::BadRequest("Missing required fields".to_string());
    let amount = positive_amount(&req.amount).ok_or_else(missing)?;
    let email = required(&req.email).ok_or_else(missing)?.to_string();
    let sender_account = text(&req.sender_account).ok_or_else(missing)?;
    let account_name = required(&req.account_name).ok_or_else(missing)?.to_string();

    let user_id = match state.users.find_by_email(&email).await? {
        Some((user_id, _)) => user_id,
        None => state.users.push_placeholder(&email).await?,
    };

    let pending = PendingPay {
        amount: Value::from(amount),
        email,
        sender_account,
        account_name,
        status: PendingPay::PENDING.to_string(),
        time: rfc3339_now(),
        reference: None,
        confirmed_at: None,
    };
    state.users.set_pending_pay(&user_id, &pending).await?;

    info!(user_id = %user_id, amount, "Pending payment recorded");
    Ok(Json(json!({ "success": true, "userId": user_id })))
}

// ============================================================================
// Checkout key
// ============================================================================

/// `POST /api/massage`: the browser checkout needs the public key only
pub async fn checkout_key_handler(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    if state.config.paystack_public_key.is_empty() {
        return Err(AppError::Unavailable("Checkout is not configured".to_string()));
    }
    Ok(Json(json!({ "publicKey": state.config.paystack_public_key })))
}
