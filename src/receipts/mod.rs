//! Receipt generation
//!
//! Receipts are deterministic plain-text documents: the same payment, payer
//! and bill always render to the same bytes. Two layouts exist, a single
//! payment receipt and an installment receipt that also shows the running
//! bill totals.

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;

use crate::billing::currency::{convert, format_whole};
use crate::config::PortalConfig;
use crate::models::{Bill, Payment, ReceiptArtifact};

pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const SINGLE_TEMPLATE: &str = "single";
const INSTALLMENT_TEMPLATE: &str = "installment";

const SINGLE_LAYOUT: &str = "\
{{council_name}}
{{title}}
----------------------------------------
{{amount}}{{receipt_number_pad}}{{receipt_number}}

Holder's Name:   {{payer_name}}
Address:         {{address}}
Ward:            {{ward}}

Date: {{date}}    Time: {{time}}
Transaction Ref: {{transaction_ref}}
----------------------------------------
Processed By:    {{processed_by}}
Designation:     {{designation}}

______________________________
Authorized Signature

{{footer}}
";

const INSTALLMENT_LAYOUT: &str = "\
{{council_name}}
{{title}}
----------------------------------------
Receipt No: {{receipt_number}}
Date: {{date}}  {{time}}

{{amount}}
Equivalent: {{provider_equivalent}}

Holder's Name:      {{payer_name}}
Ward:               {{ward}}
Service:            {{service}}
Installments Used:  {{installments_used}} / {{max_installments}}
Total Due:          {{total_due}}
Total Paid:         {{total_paid}}
Balance:            {{balance}}
Payment Channel:    Online Payment
Transaction Ref:    {{transaction_ref}}

______________________    ______________________
Processed By ({{processed_by}})    Authorized By ({{designation}})

{{footer}}
";

/// Who paid, as printed on the receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptParty {
    pub name: String,
    pub ward_name: Option<String>,
    pub address: Option<String>,
}

/// Renders a settled payment into a receipt document
pub trait ReceiptGenerator: Send + Sync {
    fn render(
        &self,
        payment: &Payment,
        payer: &ReceiptParty,
        bill: &Bill,
    ) -> anyhow::Result<ReceiptArtifact>;
}

#[derive(Serialize)]
struct ReceiptContext<'a> {
    council_name: &'a str,
    title: String,
    amount: String,
    receipt_number: String,
    receipt_number_pad: String,
    payer_name: &'a str,
    address: &'a str,
    ward: &'a str,
    date: String,
    time: String,
    transaction_ref: &'a str,
    processed_by: &'a str,
    designation: &'a str,
    footer: &'a str,
    service: &'a str,
    installments_used: i32,
    max_installments: i32,
    total_due: String,
    total_paid: String,
    balance: String,
    provider_equivalent: String,
}

pub struct TemplateReceiptRenderer {
    handlebars: Handlebars<'static>,
    config: PortalConfig,
}

impl TemplateReceiptRenderer {
    pub fn new(config: &PortalConfig) -> anyhow::Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_template_string(SINGLE_TEMPLATE, SINGLE_LAYOUT)?;
        handlebars.register_template_string(INSTALLMENT_TEMPLATE, INSTALLMENT_LAYOUT)?;

        Ok(Self {
            handlebars,
            config: config.clone(),
        })
    }

    /// `<prefix> <payment id zero-padded to 6>`
    pub fn receipt_number(&self, payment: &Payment) -> String {
        format!("{} {:06}", self.config.letterhead.receipt_prefix, payment.id)
    }

    fn money(&self, amount: rust_decimal::Decimal) -> String {
        format_whole(&self.config.currency_label, amount)
    }
}

impl ReceiptGenerator for TemplateReceiptRenderer {
    fn render(
        &self,
        payment: &Payment,
        payer: &ReceiptParty,
        bill: &Bill,
    ) -> anyhow::Result<ReceiptArtifact> {
        // Settled payments always carry paid_at.
        let paid_at: DateTime<Utc> = payment.paid_at.unwrap_or(payment.created_at);
        let receipt_number = self.receipt_number(payment);
        let amount = self.money(payment.amount);
        let pad_width = 40usize.saturating_sub(amount.chars().count() + receipt_number.chars().count());
        let transaction_ref = payment
            .provider_payment_ref
            .as_deref()
            .or(payment.checkout_session_id.as_deref())
            .unwrap_or("-");
        let provider_equivalent = convert(payment.amount, self.config.exchange_rate)
            .map(|v| format!("{} ({})", v, self.config.provider_currency.to_ascii_uppercase()))
            .unwrap_or_else(|_| "-".to_string());

        let context = ReceiptContext {
            council_name: &self.config.letterhead.council_name,
            title: format!("{} RECEIPT", bill.service_type.label().to_ascii_uppercase()),
            amount,
            receipt_number_pad: " ".repeat(pad_width.max(1)),
            receipt_number: receipt_number.clone(),
            payer_name: non_empty(&payer.name),
            address: payer.address.as_deref().map(non_empty).unwrap_or("-"),
            ward: payer.ward_name.as_deref().map(non_empty).unwrap_or("-"),
            date: paid_at.format("%d/%m/%Y").to_string(),
            time: paid_at.format("%I:%M %p").to_string(),
            transaction_ref,
            processed_by: &self.config.letterhead.processed_by,
            designation: &self.config.letterhead.designation,
            footer: &self.config.letterhead.footer,
            service: bill.service_type.label(),
            installments_used: bill.installment_count,
            max_installments: bill.max_installments,
            total_due: self.money(bill.amount_due),
            total_paid: self.money(bill.amount_paid),
            balance: self.money(bill.balance()),
            provider_equivalent,
        };

        let template = if bill.allow_installments {
            INSTALLMENT_TEMPLATE
        } else {
            SINGLE_TEMPLATE
        };
        let text = self.handlebars.render(template, &context)?;

        Ok(ReceiptArtifact {
            payment_id: payment.id,
            reference: format!(
                "receipts/{}_receipt_{:06}.txt",
                bill.service_type.as_str().to_ascii_lowercase(),
                payment.id
            ),
            receipt_number,
            content_type: CONTENT_TYPE.to_string(),
            bytes: text.into_bytes(),
            created_at: paid_at,
        })
    }
}

fn non_empty(s: &str) -> &str {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        "-"
    } else {
        trimmed
    }
}
