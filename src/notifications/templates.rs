//! Message bodies for every portal event
//!
//! Builders return only messages that have a destination; recipients with no
//! email on file are skipped here rather than failing later in the sink.

use crate::billing::currency::format_whole;
use crate::models::{Bill, ComplaintView, Payment, ReceiptArtifact, Role, User};

use super::{Attachment, OutboundMessage};

const PORTAL_NAME: &str = "CCRSMS";

pub fn welcome(user: &User) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    if let Some(email) = &user.email {
        messages.push(OutboundMessage::email(
            email,
            format!("Welcome to {}", PORTAL_NAME),
            format!("Hi {}, your registration was successful.", user.first_name),
        ));
    }
    if let Some(phone) = &user.phone_number {
        messages.push(OutboundMessage::sms(
            phone,
            format!(
                "Hi {}, your {} account has been created successfully.",
                user.first_name, PORTAL_NAME
            ),
        ));
    }
    messages
}

/// What happened to a complaint, and who did it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintEvent {
    Created,
    Updated { by: Role },
    Deleted { by: Role },
}

/// One message for the owning citizen and one per ward staff member.
pub fn complaint_messages(
    event: ComplaintEvent,
    view: &ComplaintView,
    citizen: &User,
    ward_staff: &[User],
) -> Vec<OutboundMessage> {
    let c = &view.complaint;
    let mut messages = Vec::with_capacity(ward_staff.len() + 1);

    if let Some(email) = &citizen.email {
        let (subject, body) = match event {
            ComplaintEvent::Created => (
                "Complaint Submitted Successfully".to_string(),
                format!(
                    "Hi {},\n\nYour complaint titled \"{}\" has been submitted successfully.\n\n\
                     Status: {}\nPriority: {}\n\nThank you for using {}.",
                    citizen.first_name, c.title, c.status, c.priority, PORTAL_NAME
                ),
            ),
            ComplaintEvent::Updated { by } => (
                "Complaint Update Notification".to_string(),
                format!(
                    "Hi {},\n\nYour complaint titled \"{}\" has been updated.\n\n\
                     Updated by: {}\nCurrent Status: {}\n\n\
                     Please log in to {} to view the full details.",
                    citizen.first_name,
                    c.title,
                    by.actor_label(),
                    c.status,
                    PORTAL_NAME
                ),
            ),
            ComplaintEvent::Deleted { by } => (
                "Complaint Deleted".to_string(),
                format!(
                    "Hi {},\n\nYour complaint titled \"{}\" has been deleted.\n\n\
                     Deleted by: {}\n\nThank you for using {}.",
                    citizen.first_name,
                    c.title,
                    by.actor_label(),
                    PORTAL_NAME
                ),
            ),
        };
        messages.push(OutboundMessage::email(email, subject, body));
    }

    for staff in ward_staff {
        let Some(email) = &staff.email else { continue };
        let (subject, body) = match event {
            ComplaintEvent::Created => (
                "New Complaint in Your Ward".to_string(),
                format!(
                    "Hello {},\n\nA new complaint has been submitted in your ward.\n\n\
                     Title: {}\nCategory: {}\nPriority: {}\nStatus: {}\n\n\
                     Please log in to the staff portal to review this complaint.",
                    staff.first_name, c.title, view.category_name, c.priority, c.status
                ),
            ),
            ComplaintEvent::Updated { by } => (
                "Complaint Updated in Your Ward".to_string(),
                format!(
                    "Hello {},\n\nA complaint in your ward has been updated.\n\n\
                     Title: {}\nUpdated by: {}\nCurrent Status: {}\n\n\
                     Please log in to the staff portal to view the update.",
                    staff.first_name,
                    c.title,
                    by.actor_label(),
                    c.status
                ),
            ),
            ComplaintEvent::Deleted { by } => (
                "Complaint Removed in Your Ward".to_string(),
                format!(
                    "Hello {},\n\nA complaint in your ward has been deleted.\n\n\
                     Title: {}\nDeleted by: {}",
                    staff.first_name,
                    c.title,
                    by.actor_label()
                ),
            ),
        };
        messages.push(OutboundMessage::email(email, subject, body));
    }

    messages
}

/// Facts shared by the three payment notification groups
pub struct PaymentNotice<'a> {
    pub payment: &'a Payment,
    pub bill: &'a Bill,
    pub citizen: &'a User,
    pub ward_name: Option<&'a str>,
    pub receipt: Option<&'a ReceiptArtifact>,
    pub currency_label: &'a str,
}

impl PaymentNotice<'_> {
    fn amount(&self) -> String {
        format_whole(self.currency_label, self.payment.amount)
    }

    fn paid_at(&self) -> String {
        self.payment
            .paid_at
            .map(|t| t.format("%d/%m/%Y %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    /// Citizen confirmation with the receipt attached.
    pub fn citizen_message(&self) -> Option<OutboundMessage> {
        let email = self.citizen.email.as_ref()?;
        let service = self.bill.service_type.label();
        let body = format!(
            "Hi {},\n\nYour {} payment was successful.\nAmount: {}\nBalance: {}\nDate: {}\n\n\
             Your receipt is attached.\nThank you.",
            self.citizen.display_name(),
            service,
            self.amount(),
            format_whole(self.currency_label, self.bill.balance()),
            self.paid_at()
        );
        let mut message =
            OutboundMessage::email(email, format!("Payment Successful - {}", service), body);
        if let Some(receipt) = self.receipt {
            message = message.with_attachment(Attachment {
                filename: receipt_filename(self.bill, receipt),
                content_type: receipt.content_type.clone(),
                bytes: receipt.bytes.clone(),
            });
        }
        Some(message)
    }

    pub fn staff_messages(&self, ward_staff: &[User]) -> Vec<OutboundMessage> {
        let service = self.bill.service_type.label();
        ward_staff
            .iter()
            .filter_map(|staff| {
                let email = staff.email.as_ref()?;
                Some(OutboundMessage::email(
                    email,
                    format!("New Payment in Your Ward - {}", service),
                    format!(
                        "Hello {},\n\nA citizen in your ward has completed a payment.\n\n\
                         Citizen: {}\nWard: {}\nService: {}\nAmount: {}\nPaid At: {}\n\n\
                         Log in to the staff portal for more details.",
                        staff.first_name,
                        self.citizen.display_name(),
                        self.ward_name.unwrap_or("-"),
                        service,
                        self.amount(),
                        self.paid_at()
                    ),
                ))
            })
            .collect()
    }

    pub fn admin_messages(&self, admins: &[User]) -> Vec<OutboundMessage> {
        let service = self.bill.service_type.label();
        admins
            .iter()
            .filter_map(|admin| {
                let email = admin.email.as_ref()?;
                Some(OutboundMessage::email(
                    email,
                    format!("Payment Received - {}", service),
                    format!(
                        "Hello {},\n\nA payment has been received.\n\n\
                         Citizen: {}\nWard: {}\nService: {}\nAmount: {}\nPaid At: {}\n\n\
                         Please review in the admin portal.",
                        admin.first_name,
                        self.citizen.display_name(),
                        self.ward_name.unwrap_or("-"),
                        service,
                        self.amount(),
                        self.paid_at()
                    ),
                ))
            })
            .collect()
    }
}

pub fn receipt_filename(bill: &Bill, receipt: &ReceiptArtifact) -> String {
    format!(
        "{}_receipt_{:06}.txt",
        bill.service_type.as_str().to_ascii_lowercase(),
        receipt.payment_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Complaint, ComplaintStatus, GeoPoint, Priority};
    use chrono::Utc;

    fn user(id: i64, first: &str, email: Option<&str>, role: Role) -> User {
        let now = Utc::now();
        User {
            id,
            first_name: first.to_string(),
            last_name: "Koroma".to_string(),
            email: email.map(String::from),
            phone_number: None,
            identity_document: None,
            role,
            ward_id: Some(1),
            department_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn view() -> ComplaintView {
        let now = Utc::now();
        ComplaintView {
            complaint: Complaint {
                id: 1,
                citizen_id: 1,
                category_id: 1,
                title: "Uncollected refuse".to_string(),
                description: "Three weeks".to_string(),
                evidence: None,
                location: GeoPoint {
                    latitude: 8.48,
                    longitude: -13.23,
                },
                street_name: None,
                district: None,
                status: ComplaintStatus::InProgress,
                priority: Priority::Medium,
                created_at: now,
                updated_at: now,
            },
            citizen_name: "Mariama Koroma".to_string(),
            citizen_ward_id: Some(1),
            category_name: "Waste".to_string(),
            department_id: None,
        }
    }

    #[test]
    fn test_update_names_actor_class() {
        let citizen = user(1, "Mariama", Some("mariama@example.org"), Role::Citizen);
        let staff = vec![
            user(2, "Sorie", Some("sorie@example.org"), Role::Staff),
            user(3, "NoMail", None, Role::Staff),
        ];
        let messages = complaint_messages(
            ComplaintEvent::Updated { by: Role::Staff },
            &view(),
            &citizen,
            &staff,
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].body.contains("Updated by: COUNCIL STAFF"));
        assert!(messages[0].body.contains("Current Status: IN_PROGRESS"));
        assert_eq!(messages[1].subject, "Complaint Updated in Your Ward");
    }

    #[test]
    fn test_welcome_uses_both_channels() {
        let mut citizen = user(1, "Mariama", Some("mariama@example.org"), Role::Citizen);
        citizen.phone_number = Some("+23276123456".to_string());
        let messages = welcome(&citizen);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].destination.address(), "+23276123456");
    }
}
