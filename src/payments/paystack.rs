//! Paystack webhook events

use serde::Deserialize;
use serde_json::Value;

use super::matching::PaymentSource;
use super::reconcile::{Deposit, Provider, Transfer};
use crate::util::money::{parse_amount, round2};

/// Header carrying the hex HMAC-SHA512 of the body
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub const CHARGE_SUCCESS: &str = "charge.success";
pub const TRANSFER_SUCCESS: &str = "transfer.success";

#[derive(Debug, Deserialize)]
pub struct PaystackEvent {
    pub event: String,
    #[serde(default)]
    pub data: PaystackData,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaystackData {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub reference: Option<String>,
    /// Kobo
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub recipient: Option<Recipient>,
    #[serde(default)]
    pub authorization: Option<Authorization>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub email: Option<String>,
}

/// Bank-transfer payer details (dedicated virtual accounts)
#[derive(Debug, Default, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_bank_account_number: Option<String>,
}

impl PaystackEvent {
    /// Payer or recipient email; transfers carry it on the recipient
    pub fn email(&self) -> Option<&str> {
        self.data
            .customer
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .or_else(|| self.data.recipient.as_ref().and_then(|r| r.email.as_deref()))
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Amount in naira (Paystack reports kobo)
    pub fn amount_naira(&self) -> Option<f64> {
        let kobo = parse_amount(self.data.amount.as_ref()?)?;
        (kobo > 0.0).then(|| round2(kobo / 100.0))
    }

    /// Paystack reference, falling back to the numeric id
    pub fn reference(&self) -> Option<String> {
        self.data
            .reference
            .clone()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| match &self.data.id {
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
    }

    fn source(&self) -> PaymentSource {
        let Some(auth) = self.data.authorization.as_ref() else {
            return PaymentSource::default();
        };
        PaymentSource {
            account_name: auth.account_name.clone(),
            account_number: auth.sender_bank_account_number.clone(),
            customer_name: auth.sender_name.clone(),
        }
    }

    /// A `charge.success` as a deposit; `None` when email, amount or
    /// reference is missing
    pub fn to_deposit(&self) -> Option<Deposit> {
        Some(Deposit {
            provider: Provider::Paystack,
            event: self.event.clone(),
            reference: self.reference()?,
            amount: self.amount_naira()?,
            email: Some(self.email()?.to_string()),
            source: self.source(),
        })
    }

    /// A `transfer.success` as a settled transfer
    pub fn to_transfer(&self) -> Option<Transfer> {
        Some(Transfer {
            provider: Provider::Paystack,
            reference: self.reference()?,
            amount: self.amount_naira()?,
            email: self.email()?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> PaystackEvent {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn charge_success_becomes_deposit() {
        let event = parse(
            r#"{
                "event": "charge.success",
                "data": {
                    "id": 302961,
                    "reference": "qTPrJoy9Bx",
                    "amount": 1000000,
                    "customer": {"email": " bola@x.com "},
                    "authorization": {"account_name": "BOLA ADE", "sender_bank_account_number": "0123456789"}
                }
            }"#,
        );

        let deposit = event.to_deposit().unwrap();
        assert_eq!(deposit.reference, "qTPrJoy9Bx");
        assert_eq!(deposit.amount, 10_000.0);
        assert_eq!(deposit.email.as_deref(), Some("bola@x.com"));
        assert_eq!(deposit.source.account_number.as_deref(), Some("0123456789"));
    }

    #[test]
    fn transfer_uses_recipient_email_and_id_fallback() {
        let event = parse(
            r#"{
                "event": "transfer.success",
                "data": {"id": 42, "amount": "50000", "recipient": {"email": "ada@x.com"}}
            }"#,
        );

        let transfer = event.to_transfer().unwrap();
        assert_eq!(transfer.reference, "42");
        assert_eq!(transfer.amount, 500.0);
        assert_eq!(transfer.email, "ada@x.com");
    }

    #[test]
    fn missing_email_or_amount_is_invalid() {
        let no_email = parse(r#"{"event": "charge.success", "data": {"reference": "r", "amount": 100}}"#);
        assert!(no_email.to_deposit().is_none());

        let zero = parse(r#"{"event": "charge.success", "data": {"reference": "r", "amount": 0, "customer": {"email": "a@b.c"}}}"#);
        assert!(zero.to_deposit().is_none());
    }
}
