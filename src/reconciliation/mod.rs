//! Payment reconciliation
//!
//! Confirms a checkout session with the provider and applies its effects
//! locally exactly once:
//!
//! 1. find the payment by session id, within the caller's own bills
//! 2. already PAID: return the stored record, no side effects
//! 3. ask the provider; not paid yet: return without touching state
//! 4. paid: finalize in the store as one locked unit (payment PAID, ledger
//!    update, receipt attached)
//! 5. after that commits, notify citizen, ward staff and admins
//!
//! Two racing verifications are serialized by the store's finalize step; the
//! loser observes the payment already PAID and does nothing.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PortalConfig;
use crate::error::{ExternalServiceError, PortalError, PortalResult};
use crate::identity::Actor;
use crate::models::{Bill, Payment, PaymentStatus, Profile, ReceiptArtifact, ServiceType, User};
use crate::notifications::templates::PaymentNotice;
use crate::notifications::Dispatcher;
use crate::provider::{PaymentProvider, SessionStatus};
use crate::receipts::{ReceiptGenerator, ReceiptParty};
use crate::store::{Finalization, PortalStore, Settlement};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyOutcome {
    Paid {
        payment: Payment,
        /// This call applied the settlement; false for repeat verifications.
        newly_settled: bool,
        /// Confirmed amount that exceeded the bill balance and was not credited.
        overpayment: Decimal,
    },
    NotPaid {
        provider_status: String,
    },
}

pub struct ReconciliationService {
    store: Arc<dyn PortalStore>,
    provider: Arc<dyn PaymentProvider>,
    receipts: Arc<dyn ReceiptGenerator>,
    dispatcher: Arc<Dispatcher>,
    config: Arc<PortalConfig>,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn PortalStore>,
        provider: Arc<dyn PaymentProvider>,
        receipts: Arc<dyn ReceiptGenerator>,
        dispatcher: Arc<Dispatcher>,
        config: Arc<PortalConfig>,
    ) -> Self {
        Self {
            store,
            provider,
            receipts,
            dispatcher,
            config,
        }
    }

    pub async fn verify(
        &self,
        session_id: &str,
        actor: &Actor,
        service: ServiceType,
    ) -> PortalResult<VerifyOutcome> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(PortalError::validation("session_id", "session_id is required"));
        }

        let payment = self
            .store
            .find_payment_by_session(session_id, actor.user_id, service)
            .await?
            .ok_or_else(|| PortalError::not_found("payment session", session_id))?;

        match payment.status {
            PaymentStatus::Paid => {
                return Ok(VerifyOutcome::Paid {
                    payment,
                    newly_settled: false,
                    overpayment: Decimal::ZERO,
                })
            }
            PaymentStatus::Failed => {
                return Ok(VerifyOutcome::NotPaid {
                    provider_status: "failed".to_string(),
                })
            }
            PaymentStatus::Initiated => {}
        }

        let provider_payment_ref = match self.provider.session_status(session_id).await {
            Ok(SessionStatus::Paid {
                provider_payment_ref,
            }) => provider_payment_ref,
            Ok(SessionStatus::NotPaid { provider_status }) => {
                info!(payment_id = payment.id, %provider_status, "Session not paid yet");
                return Ok(VerifyOutcome::NotPaid { provider_status });
            }
            Err(e) => {
                warn!(payment_id = payment.id, error = %e, "Provider status query failed");
                return Err(ExternalServiceError::from(e).into());
            }
        };

        let citizen = self
            .store
            .get_user(actor.user_id)
            .await?
            .ok_or_else(|| PortalError::not_found("user", actor.user_id))?;
        let payer = self.receipt_party(&citizen).await?;

        let settlement = Settlement {
            provider_payment_ref,
            paid_at: Utc::now(),
            counts_installment: self
                .store
                .get_bill(payment.bill_id)
                .await?
                .map(|b| b.allow_installments)
                .unwrap_or(false),
        };
        let receipts = Arc::clone(&self.receipts);
        let render = move |payment: &Payment, bill: &Bill| receipts.render(payment, &payer, bill);

        match self
            .store
            .finalize_payment(payment.id, &settlement, &render)
            .await?
        {
            Finalization::AlreadyPaid(payment) => {
                info!(payment_id = payment.id, "Payment settled by a concurrent verification");
                Ok(VerifyOutcome::Paid {
                    payment,
                    newly_settled: false,
                    overpayment: Decimal::ZERO,
                })
            }
            Finalization::Applied {
                payment,
                bill,
                receipt,
                overpayment,
            } => {
                info!(
                    payment_id = payment.id,
                    bill_id = bill.id,
                    amount = %payment.amount,
                    bill_status = %bill.status,
                    receipt = %receipt.receipt_number,
                    "Payment settled"
                );
                if overpayment > Decimal::ZERO {
                    warn!(payment_id = payment.id, %overpayment, "Overpayment not credited to bill");
                }
                self.notify_settled(&payment, &bill, &citizen, &receipt).await;
                Ok(VerifyOutcome::Paid {
                    payment,
                    newly_settled: true,
                    overpayment,
                })
            }
        }
    }

    async fn receipt_party(&self, citizen: &User) -> PortalResult<ReceiptParty> {
        let ward_name = match citizen.ward_id {
            Some(id) => self.store.get_ward(id).await?.map(|w| w.name),
            None => None,
        };
        let address = match self.store.load_profile(citizen.id).await? {
            Some(Profile::Citizen(profile)) => profile.address,
            _ => None,
        };
        Ok(ReceiptParty {
            name: citizen.display_name(),
            ward_name,
            address,
        })
    }

    /// Best-effort fan-out; failures are logged per recipient.
    async fn notify_settled(
        &self,
        payment: &Payment,
        bill: &Bill,
        citizen: &User,
        receipt: &ReceiptArtifact,
    ) {
        let ward_name = match citizen.ward_id {
            Some(id) => self.store.get_ward(id).await.ok().flatten().map(|w| w.name),
            None => None,
        };
        let ward_staff = match citizen.ward_id {
            Some(id) => self
                .store
                .list_active_staff_in_ward(id)
                .await
                .unwrap_or_else(|e| {
                    warn!(ward_id = id, error = %e, "Could not load ward staff");
                    Vec::new()
                }),
            None => Vec::new(),
        };
        let admins = self.store.list_active_admins().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load admins");
            Vec::new()
        });

        let notice = PaymentNotice {
            payment,
            bill,
            citizen,
            ward_name: ward_name.as_deref(),
            receipt: Some(receipt),
            currency_label: &self.config.currency_label,
        };
        let mut messages = Vec::with_capacity(1 + ward_staff.len() + admins.len());
        messages.extend(notice.citizen_message());
        messages.extend(notice.staff_messages(&ward_staff));
        messages.extend(notice.admin_messages(&admins));
        self.dispatcher.dispatch(messages).await;
    }
}
