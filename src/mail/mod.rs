//! Marketing campaign mail sent through an HTTP mail API

use axum::{extract::State, response::Json};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::app::AppState;
use crate::config::MailConfig;
use crate::http::AppError;
use crate::store::UserRecord;

const WELCOME_SUBJECT: &str = "Congratulations! AgroFruit Investment Awaits You!";
const WELCOME_HTML: &str = r#"<div style="background-color: #f4f4f4; padding: 20px; font-family: Arial, sans-serif; border-radius: 10px;">
<h2 style="color: green; text-align: center;">Welcome to AgroFruit, your profitable investment!</h2>
<p>AgroFruit gives you a great opportunity to invest and earn daily profits. Choose a package and start earning every day.</p>
<p>Login to your AgroFruit account, copy your account number, and make a deposit to start earning daily.</p>
<p><b>Welcome Bonus:</b> &#8358;500 | <b>Minimum Withdrawal:</b> &#8358;500</p>
<p style="text-align: center; font-size: 14px; color: #666;">AgroFruit Team</p>
</div>"#;

const REFERRAL_SUBJECT: &str = "Earn more with AgroFruit referrals";
const REFERRAL_HTML: &str = r#"<div style="background-color: #f4f4f4; padding: 20px; font-family: Arial, sans-serif;">
<h2 style="color: green; text-align: center;">Thank you for investing with AgroFruit!</h2>
<p>Share your referral link from the <b>Referrals Program</b> section of your account and earn a bonus for every friend who invests.</p>
<p>Post your earnings with #AgroFruit #EasyProfits for a chance at extra prizes.</p>
</div>"#;

/// Recipients split by where they are in the funnel
#[derive(Debug, Default, PartialEq)]
pub struct Audience {
    /// Registered but never invested
    pub welcome: Vec<String>,
    /// Returning investors, targeted with the referral promotion
    pub referral: Vec<String>,
}

/// Split users into the welcome and referral audiences. Users without an
/// email, or in neither group, are skipped.
pub fn segment<'a, I>(users: I) -> Audience
where
    I: IntoIterator<Item = &'a UserRecord>,
{
    let mut audience = Audience::default();
    for user in users {
        let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) else {
            continue;
        };
        let new_user = matches!(user.tsohon_user, Some(Value::Bool(false)));
        if new_user && user.investment == Some(0.0) {
            audience.welcome.push(email.to_string());
        } else if user.is_returning() && user.invested() > 0.0 {
            audience.referral.push(email.to_string());
        }
    }
    audience
}

/// One message per recipient so addresses are never disclosed to each other
#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Client for the transactional mail API
#[derive(Clone)]
pub struct MailClient {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl MailClient {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        }
    }

    fn outgoing<'a>(&'a self, recipient: &'a str, subject: &'a str, html: &'a str) -> OutgoingMail<'a> {
        OutgoingMail {
            from: &self.from,
            to: [recipient],
            subject,
            html,
        }
    }

    /// Send the message to each recipient separately. Stops at the first
    /// failure; empty recipient lists send nothing.
    pub async fn send(&self, to: &[String], subject: &str, html: &str) -> Result<(), MailError> {
        for recipient in to {
            let response = self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&self.outgoing(recipient, subject, html))
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(MailError::Api {
                    status: status.as_u16(),
                    body,
                });
            }
        }

        if !to.is_empty() {
            info!(recipients = to.len(), subject, "Campaign mail sent");
        }
        Ok(())
    }
}

/// Mail API errors
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mail API error {status}: {body}")]
    Api { status: u16, body: String },
}

impl From<MailError> for AppError {
    fn from(err: MailError) -> Self {
        error!(error = %err, "Campaign mail failed");
        AppError::Internal("Error sending email.".to_string())
    }
}

/// `POST /api/email`
pub async fn campaign_handler(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let mail = state
        .mail
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Mail is not configured".to_string()))?;

    let users = state.users.list().await?;
    let audience = segment(users.iter().map(|(_, user)| user));

    mail.send(&audience.welcome, WELCOME_SUBJECT, WELCOME_HTML).await?;
    mail.send(&audience.referral, REFERRAL_SUBJECT, REFERRAL_HTML).await?;

    Ok(Json(json!({
        "message": "Emails sent successfully!",
        "welcome": audience.welcome.len(),
        "referral": audience.referral.len(),
    })))
}
