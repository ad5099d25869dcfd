//! Moniepoint (Monnify) webhook events

use serde::Deserialize;
use serde_json::Value;

use super::matching::PaymentSource;
use super::reconcile::{Deposit, Provider};
use crate::util::money::{parse_amount, round2};

/// Header carrying the hex HMAC-SHA512 of the body
pub const SIGNATURE_HEADER: &str = "monnify-signature";

pub const SUCCESSFUL_TRANSACTION: &str = "SUCCESSFUL_TRANSACTION";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoniepointEvent {
    pub event_type: String,
    #[serde(default)]
    pub event_data: EventData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default)]
    pub transaction_reference: Option<String>,
    #[serde(default)]
    pub payment_reference: Option<String>,
    /// Naira, sent as a number or a string
    #[serde(default)]
    pub amount_paid: Option<Value>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub payment_source_information: Vec<SourceInformation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInformation {
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
}

impl MoniepointEvent {
    pub fn reference(&self) -> Option<String> {
        [
            &self.event_data.transaction_reference,
            &self.event_data.payment_reference,
        ]
        .into_iter()
        .flatten()
        .map(|r| r.trim())
        .find(|r| !r.is_empty())
        .map(str::to_string)
    }

    pub fn amount(&self) -> Option<f64> {
        let amount = parse_amount(self.event_data.amount_paid.as_ref()?)?;
        (amount > 0.0).then(|| round2(amount))
    }

    fn customer_email(&self) -> Option<String> {
        self.event_data
            .customer
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    }

    fn source(&self) -> PaymentSource {
        let first = self.event_data.payment_source_information.first();
        PaymentSource {
            account_name: first.and_then(|s| s.account_name.clone()),
            account_number: first.and_then(|s| s.account_number.clone()),
            customer_name: self.event_data.customer.as_ref().and_then(|c| c.name.clone()),
        }
    }

    /// A successful collection as a deposit. Needs a reference, a positive
    /// amount and some way to find the payer.
    pub fn to_deposit(&self) -> Option<Deposit> {
        let email = self.customer_email();
        let source = self.source();
        if email.is_none() && source.is_empty() {
            return None;
        }

        Some(Deposit {
            provider: Provider::Moniepoint,
            event: self.event_type.clone(),
            reference: self.reference()?,
            amount: self.amount()?,
            email,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_transaction_becomes_deposit() {
        let event: MoniepointEvent = serde_json::from_str(
            r#"{
                "eventType": "SUCCESSFUL_TRANSACTION",
                "eventData": {
                    "transactionReference": "MNFY|76|20240101120000|000001",
                    "paymentReference": "MNFY|76|20240101120000|000001",
                    "amountPaid": "5000.00",
                    "customer": {"email": "", "name": "Bola Ade"},
                    "paymentSourceInformation": [
                        {"accountName": "BOLA ADE", "accountNumber": "0123456789", "amountPaid": 5000}
                    ]
                }
            }"#,
        )
        .unwrap();

        let deposit = event.to_deposit().unwrap();
        assert_eq!(deposit.reference, "MNFY|76|20240101120000|000001");
        assert_eq!(deposit.amount, 5_000.0);
        assert_eq!(deposit.email, None);
        assert_eq!(deposit.source.account_name.as_deref(), Some("BOLA ADE"));
        assert_eq!(deposit.source.customer_name.as_deref(), Some("Bola Ade"));
    }

    #[test]
    fn no_payer_details_is_invalid() {
        let event: MoniepointEvent = serde_json::from_str(
            r#"{"eventType": "SUCCESSFUL_TRANSACTION", "eventData": {"transactionReference": "r", "amountPaid": 100}}"#,
        )
        .unwrap();
        assert!(event.to_deposit().is_none());
    }
}
