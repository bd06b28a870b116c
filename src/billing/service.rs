//! Bill lookup, checkout initiation and citizen payment history

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::currency::to_provider_amount;
use super::ledger::check_payable;
use super::{AmountKind, ServicePolicy};
use crate::config::PortalConfig;
use crate::error::{ExternalServiceError, PortalError, PortalResult};
use crate::identity::Actor;
use crate::models::{Bill, Payment, PaymentId, PaymentStatus, ReceiptArtifact, ServiceType};
use crate::provider::{CheckoutRequest, PaymentProvider};
use crate::store::{BillFilter, NewBill, PaymentFilter, PortalStore};

const RECENT_PAYMENTS: usize = 5;

/// Caller-supplied amounts for a checkout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutOptions {
    /// Only used when no open bill exists for a variable-amount service.
    pub amount_due: Option<Decimal>,
    /// Installment amount; single-payment services always settle the full balance.
    pub pay_amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub payment: Payment,
    pub bill: Bill,
    pub session_id: String,
    pub redirect_url: String,
    pub provider_amount: Decimal,
    pub provider_currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub total_paid_this_year: Decimal,
    pub outstanding_balance: Decimal,
    pub paid_payments: u64,
    pub last_payment: Option<Payment>,
}

pub struct BillingService {
    store: Arc<dyn PortalStore>,
    provider: Arc<dyn PaymentProvider>,
    config: Arc<PortalConfig>,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn PortalStore>,
        provider: Arc<dyn PaymentProvider>,
        config: Arc<PortalConfig>,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn policy(&self, service: ServiceType) -> ServicePolicy {
        ServicePolicy::for_service(service, &self.config, Utc::now().date_naive())
    }

    /// Existing open bill for the service, or a new one.
    ///
    /// Variable-amount services need `amount_due_if_new` when no bill is open.
    pub async fn get_or_create_open_bill(
        &self,
        actor: &Actor,
        service: ServiceType,
        amount_due_if_new: Option<Decimal>,
    ) -> PortalResult<Bill> {
        if let Some(bill) = self.store.find_open_bill(actor.user_id, service).await? {
            return Ok(bill);
        }

        let policy = self.policy(service);
        let amount_due = match policy.amount {
            AmountKind::Fixed(amount) => amount,
            AmountKind::Variable => match amount_due_if_new {
                Some(amount) if amount > Decimal::ZERO => amount.round_dp(2),
                Some(_) => {
                    return Err(PortalError::validation(
                        "amount_due",
                        "Amount must be greater than 0",
                    ))
                }
                None => {
                    return Err(PortalError::validation(
                        "amount_due",
                        format!("amount_due is required to create a {} bill", service.label()),
                    ))
                }
            },
        };

        let bill = self
            .store
            .find_or_insert_open_bill(NewBill {
                user_id: actor.user_id,
                service_type: service,
                amount_due,
                due_date: policy.due_date,
                allow_installments: policy.allow_installments,
                max_installments: policy.max_installments,
            })
            .await?;
        info!(bill_id = bill.id, user_id = actor.user_id, service = %service, "Open bill ready");
        Ok(bill)
    }

    /// Create an INITIATED payment of `pay_amount` against `bill`.
    pub async fn record_installment_payment(
        &self,
        bill: &Bill,
        pay_amount: Decimal,
    ) -> PortalResult<Payment> {
        if pay_amount <= Decimal::ZERO {
            return Err(PortalError::validation("pay_amount", "Amount must be greater than 0"));
        }
        check_payable(bill, pay_amount)?;
        let payment = self.store.insert_payment(bill.id, pay_amount).await?;
        info!(payment_id = payment.id, bill_id = bill.id, amount = %pay_amount, "Payment initiated");
        Ok(payment)
    }

    /// Find or create the bill, record the payment and open a provider checkout.
    pub async fn initiate_checkout(
        &self,
        actor: &Actor,
        service: ServiceType,
        options: CheckoutOptions,
    ) -> PortalResult<CheckoutSession> {
        let bill = self
            .get_or_create_open_bill(actor, service, options.amount_due)
            .await?;
        let policy = self.policy(service);

        let pay_amount = if bill.allow_installments {
            options.pay_amount.ok_or_else(|| {
                PortalError::validation("pay_amount", "pay_amount is required for installments")
            })?
        } else {
            bill.balance()
        };
        if pay_amount <= Decimal::ZERO {
            return Err(PortalError::validation("pay_amount", "Amount must be greater than 0"));
        }
        check_payable(&bill, pay_amount)?;
        let provider_amount = to_provider_amount(pay_amount, &self.config, policy.below_minimum())?;

        let payment = self.record_installment_payment(&bill, pay_amount).await?;

        let customer_email = self
            .store
            .get_user(actor.user_id)
            .await?
            .and_then(|u| u.email);
        let mut metadata = BTreeMap::new();
        metadata.insert("payment_id".to_string(), payment.id.to_string());
        metadata.insert("bill_id".to_string(), bill.id.to_string());
        metadata.insert("service_type".to_string(), service.as_str().to_string());
        metadata.insert("user_id".to_string(), actor.user_id.to_string());

        let request = CheckoutRequest {
            amount_minor_units: provider_amount.minor_units,
            currency: self.config.provider_currency.clone(),
            product_name: format!(
                "{} ({})",
                service.label(),
                super::currency::format_whole(&self.config.currency_label, pay_amount)
            ),
            metadata,
            success_url: self.config.checkout_success_url.clone(),
            cancel_url: self.config.checkout_cancel_url.clone(),
            customer_email,
        };

        let intent = match self.provider.create_checkout_intent(&request).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(payment_id = payment.id, error = %e, "Checkout intent failed, marking payment FAILED");
                if let Err(mark) = self.store.mark_payment_failed(payment.id).await {
                    warn!(payment_id = payment.id, error = %mark, "Could not mark payment FAILED");
                }
                return Err(ExternalServiceError::from(e).into());
            }
        };

        self.store
            .attach_checkout_session(payment.id, &intent.session_id)
            .await?;
        info!(
            payment_id = payment.id,
            session_id = %intent.session_id,
            minor_units = provider_amount.minor_units,
            raised_to_minimum = provider_amount.raised_to_minimum,
            "Checkout session opened"
        );

        Ok(CheckoutSession {
            payment: Payment {
                checkout_session_id: Some(intent.session_id.clone()),
                ..payment
            },
            bill,
            session_id: intent.session_id,
            redirect_url: intent.redirect_url,
            provider_amount: provider_amount.amount,
            provider_currency: self.config.provider_currency.clone(),
        })
    }

    // ── History ──

    pub async fn list_bills(&self, actor: &Actor, filter: BillFilter) -> PortalResult<Vec<Bill>> {
        Ok(self.store.list_bills(actor.user_id, &filter).await?)
    }

    pub async fn list_payments(
        &self,
        actor: &Actor,
        filter: PaymentFilter,
    ) -> PortalResult<Vec<(Payment, Bill)>> {
        Ok(self.store.list_payments(actor.user_id, &filter).await?)
    }

    pub async fn get_payment(&self, actor: &Actor, id: PaymentId) -> PortalResult<(Payment, Bill)> {
        self.store
            .get_payment_for_user(id, actor.user_id)
            .await?
            .ok_or_else(|| PortalError::not_found("payment", id))
    }

    /// Latest paid payments.
    pub async fn recent_payments(&self, actor: &Actor) -> PortalResult<Vec<(Payment, Bill)>> {
        let filter = PaymentFilter {
            status: Some(PaymentStatus::Paid),
            limit: Some(RECENT_PAYMENTS),
            ..Default::default()
        };
        Ok(self.store.list_payments(actor.user_id, &filter).await?)
    }

    pub async fn payment_stats(&self, actor: &Actor) -> PortalResult<PaymentStats> {
        let paid = self
            .store
            .list_payments(
                actor.user_id,
                &PaymentFilter {
                    status: Some(PaymentStatus::Paid),
                    ..Default::default()
                },
            )
            .await?;
        let year = Utc::now().year();
        let total_paid_this_year = paid
            .iter()
            .filter(|(p, _)| p.paid_at.is_some_and(|t| t.year() == year))
            .map(|(p, _)| p.amount)
            .sum();

        let outstanding_balance = self
            .store
            .list_bills(actor.user_id, &BillFilter::default())
            .await?
            .iter()
            .filter(|b| b.status.is_open())
            .map(Bill::balance)
            .sum();

        Ok(PaymentStats {
            total_paid_this_year,
            outstanding_balance,
            paid_payments: paid.len() as u64,
            last_payment: paid.into_iter().next().map(|(p, _)| p),
        })
    }

    /// Receipt of one of the actor's own settled payments.
    pub async fn receipt(&self, actor: &Actor, payment_id: PaymentId) -> PortalResult<ReceiptArtifact> {
        let (payment, _) = self.get_payment(actor, payment_id).await?;
        if payment.receipt_ref.is_none() {
            return Err(PortalError::not_found("receipt", payment_id));
        }
        self.store
            .load_receipt(payment_id)
            .await?
            .ok_or_else(|| PortalError::not_found("receipt", payment_id))
    }
}
