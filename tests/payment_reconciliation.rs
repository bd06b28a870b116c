//! Checkout and verification against the fake provider.

mod helpers;

use rust_decimal_macros::dec;

use civic_portal::billing::CheckoutOptions;
use civic_portal::error::{ConflictError, PortalError};
use civic_portal::models::{BillStatus, PaymentStatus, ServiceType};
use civic_portal::reconciliation::VerifyOutcome;
use civic_portal::store::{BillFilter, PaymentFilter};
use civic_portal::ErrorKind;
use helpers::TestPortal;

fn installment(amount_due: rust_decimal::Decimal, pay: rust_decimal::Decimal) -> CheckoutOptions {
    CheckoutOptions {
        amount_due: Some(amount_due),
        pay_amount: Some(pay),
    }
}

#[tokio::test]
async fn local_tax_paid_in_full() {
    let t = TestPortal::new().await;
    let (citizen_user, citizen) = t.citizen(&t.ward_a).await;
    let (staff_user, _) = t.staff(&t.ward_a).await;
    let (admin_user, _) = t.admin().await;
    t.sink.clear().await;

    let session = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();
    assert_eq!(session.bill.amount_due, dec!(10000));
    assert_eq!(session.payment.amount, dec!(10000));
    assert_eq!(session.payment.status, PaymentStatus::Initiated);
    // LE 10,000 is below the provider floor and is raised to it.
    assert_eq!(session.provider_amount, dec!(0.50));
    assert_eq!(t.provider.requests()[0].amount_minor_units, 50);

    t.provider.mark_paid(&session.session_id);
    let outcome = t
        .portal
        .reconciliation
        .verify(&session.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap();
    let payment = match outcome {
        VerifyOutcome::Paid {
            payment,
            newly_settled,
            overpayment,
        } => {
            assert!(newly_settled);
            assert_eq!(overpayment, dec!(0));
            payment
        }
        other => panic!("expected Paid, got {:?}", other),
    };
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert!(payment.paid_at.is_some());
    assert_eq!(
        payment.provider_payment_ref.as_deref(),
        Some(format!("pi_{}", session.session_id).as_str())
    );

    let bills = t
        .portal
        .billing
        .list_bills(&citizen, BillFilter::default())
        .await
        .unwrap();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].status, BillStatus::Paid);
    assert_eq!(bills[0].amount_paid, dec!(10000));

    let payments = t
        .portal
        .billing
        .list_payments(&citizen, PaymentFilter::default())
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].0.status, PaymentStatus::Paid);

    let receipt = t.portal.billing.receipt(&citizen, payment.id).await.unwrap();
    assert!(receipt.receipt_number.starts_with("FCC"));
    assert_eq!(payment.receipt_ref.as_deref(), Some(receipt.reference.as_str()));

    let citizen_mail = t
        .sink
        .sent_to(citizen_user.email.as_deref().unwrap())
        .await;
    assert_eq!(citizen_mail.len(), 1);
    assert_eq!(citizen_mail[0].attachments.len(), 1);
    assert_eq!(
        t.sink
            .sent_to(staff_user.email.as_deref().unwrap())
            .await
            .len(),
        1
    );
    assert_eq!(
        t.sink
            .sent_to(admin_user.email.as_deref().unwrap())
            .await
            .len(),
        1
    );

    // The paid bill is closed, so the next checkout opens a fresh one.
    let next = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();
    assert_ne!(next.bill.id, session.bill.id);
    assert_eq!(next.bill.status, BillStatus::Pending);
}

#[tokio::test]
async fn city_rate_installments() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;

    let first = t
        .portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::CityRate,
            installment(dec!(30000), dec!(15000)),
        )
        .await
        .unwrap();
    assert!(first.bill.allow_installments);
    assert_eq!(first.bill.max_installments, 3);

    t.provider.mark_paid(&first.session_id);
    t.portal
        .reconciliation
        .verify(&first.session_id, &citizen, ServiceType::CityRate)
        .await
        .unwrap();

    let bill = t
        .portal
        .billing
        .list_bills(&citizen, BillFilter::default())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(bill.status, BillStatus::Partial);
    assert_eq!(bill.installment_count, 1);
    assert_eq!(bill.balance(), dec!(15000));

    let err = t
        .portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::CityRate,
            installment(dec!(30000), dec!(20000)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PortalError::Conflict(ConflictError::AmountExceedsBalance { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    // The open bill is reused; amount_due is ignored after creation.
    let second = t
        .portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::CityRate,
            installment(dec!(99999), dec!(15000)),
        )
        .await
        .unwrap();
    assert_eq!(second.bill.id, bill.id);
    t.provider.mark_paid(&second.session_id);
    t.portal
        .reconciliation
        .verify(&second.session_id, &citizen, ServiceType::CityRate)
        .await
        .unwrap();

    let bill = t
        .portal
        .billing
        .list_bills(&citizen, BillFilter::default())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(bill.status, BillStatus::Paid);
    assert_eq!(bill.amount_paid, dec!(30000));
    assert_eq!(bill.installment_count, 2);
}

#[tokio::test]
async fn installment_limit_is_enforced() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;

    for _ in 0..3 {
        let session = t
            .portal
            .billing
            .initiate_checkout(
                &citizen,
                ServiceType::CityRate,
                installment(dec!(60000), dec!(15000)),
            )
            .await
            .unwrap();
        t.provider.mark_paid(&session.session_id);
        t.portal
            .reconciliation
            .verify(&session.session_id, &citizen, ServiceType::CityRate)
            .await
            .unwrap();
    }

    let err = t
        .portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::CityRate,
            installment(dec!(60000), dec!(15000)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PortalError::Conflict(ConflictError::InstallmentLimitReached { used: 3, max: 3 })
    ));
}

#[tokio::test]
async fn verification_is_idempotent() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let session = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();
    t.provider.mark_paid(&session.session_id);

    let first = t
        .portal
        .reconciliation
        .verify(&session.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap();
    t.sink.clear().await;
    let second = t
        .portal
        .reconciliation
        .verify(&session.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap();

    assert!(matches!(first, VerifyOutcome::Paid { newly_settled: true, .. }));
    assert!(matches!(second, VerifyOutcome::Paid { newly_settled: false, .. }));
    // The second call answers from the ledger without asking the provider.
    assert_eq!(t.provider.status_calls(), 1);
    assert!(t.sink.sent().await.is_empty());

    let bill = t
        .portal
        .billing
        .list_bills(&citizen, BillFilter::default())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(bill.amount_paid, dec!(10000));
}

#[tokio::test]
async fn unpaid_session_changes_nothing() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let session = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();

    let outcome = t
        .portal
        .reconciliation
        .verify(&session.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        VerifyOutcome::NotPaid {
            provider_status: "unpaid".to_string()
        }
    );

    let (payment, bill) = t
        .portal
        .billing
        .get_payment(&citizen, session.payment.id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Initiated);
    assert_eq!(bill.status, BillStatus::Pending);
}

#[tokio::test]
async fn provider_timeout_is_retryable_and_harmless() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let session = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();
    t.provider.mark_paid(&session.session_id);
    t.provider.time_out_status(true);

    let err = t
        .portal
        .reconciliation
        .verify(&session.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert!(err.is_retryable());

    let (payment, bill) = t
        .portal
        .billing
        .get_payment(&citizen, session.payment.id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Initiated);
    assert_eq!(bill.amount_paid, dec!(0));

    // Retry after the provider recovers.
    t.provider.time_out_status(false);
    let outcome = t
        .portal
        .reconciliation
        .verify(&session.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap();
    assert!(matches!(outcome, VerifyOutcome::Paid { newly_settled: true, .. }));
}

#[tokio::test]
async fn rejected_checkout_marks_payment_failed() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    t.provider.reject_checkouts(true);

    let err = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert!(!err.is_retryable());

    let payments = t
        .portal
        .billing
        .list_payments(&citizen, PaymentFilter::default())
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].0.status, PaymentStatus::Failed);
    assert_eq!(payments[0].1.status, BillStatus::Pending);
}

#[tokio::test]
async fn another_users_session_is_not_found() {
    let t = TestPortal::new().await;
    let (_, owner) = t.citizen(&t.ward_a).await;
    let (_, intruder) = t.citizen(&t.ward_a).await;
    let session = t
        .portal
        .billing
        .initiate_checkout(&owner, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();
    t.provider.mark_paid(&session.session_id);

    let err = t
        .portal
        .reconciliation
        .verify(&session.session_id, &intruder, ServiceType::LocalTax)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(t.provider.status_calls(), 0);

    let (payment, _) = t
        .portal
        .billing
        .get_payment(&owner, session.payment.id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Initiated);

    // Same session under the wrong service type is not found either.
    let err = t
        .portal
        .reconciliation
        .verify(&session.session_id, &owner, ServiceType::CityRate)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = t
        .portal
        .billing
        .receipt(&intruder, session.payment.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn concurrent_sessions_cap_the_ledger() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;

    // Both pass the balance check because neither is settled yet.
    let a = t
        .portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::CityRate,
            installment(dec!(30000), dec!(20000)),
        )
        .await
        .unwrap();
    let b = t
        .portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::CityRate,
            installment(dec!(30000), dec!(20000)),
        )
        .await
        .unwrap();
    assert_eq!(a.bill.id, b.bill.id);

    for session in [&a, &b] {
        t.provider.mark_paid(&session.session_id);
    }
    t.portal
        .reconciliation
        .verify(&a.session_id, &citizen, ServiceType::CityRate)
        .await
        .unwrap();
    let outcome = t
        .portal
        .reconciliation
        .verify(&b.session_id, &citizen, ServiceType::CityRate)
        .await
        .unwrap();
    match outcome {
        VerifyOutcome::Paid { overpayment, .. } => assert_eq!(overpayment, dec!(10000)),
        other => panic!("expected Paid, got {:?}", other),
    }

    let bill = t
        .portal
        .billing
        .list_bills(&citizen, BillFilter::default())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(bill.amount_paid, dec!(30000));
    assert_eq!(bill.status, BillStatus::Paid);
}

#[tokio::test]
async fn variable_amounts_below_the_provider_floor_are_rejected() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;

    let err = t
        .portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::WasteCollection,
            CheckoutOptions {
                amount_due: Some(dec!(5000)),
                pay_amount: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(t.provider.requests().is_empty());

    let err = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::BusinessLicense, CheckoutOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn payment_stats_summarise_history() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;

    let tax = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();
    t.provider.mark_paid(&tax.session_id);
    t.portal
        .reconciliation
        .verify(&tax.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap();

    // Opened but never paid.
    t.portal
        .billing
        .initiate_checkout(
            &citizen,
            ServiceType::CityRate,
            installment(dec!(30000), dec!(15000)),
        )
        .await
        .unwrap();

    let stats = t.portal.billing.payment_stats(&citizen).await.unwrap();
    assert_eq!(stats.total_paid_this_year, dec!(10000));
    assert_eq!(stats.paid_payments, 1);
    assert_eq!(stats.outstanding_balance, dec!(30000));
    assert_eq!(stats.last_payment.map(|p| p.id), Some(tax.payment.id));

    let recent = t.portal.billing.recent_payments(&citizen).await.unwrap();
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn failed_staff_delivery_does_not_undo_settlement() {
    let t = TestPortal::new().await;
    let (citizen_user, citizen) = t.citizen(&t.ward_a).await;
    let (unreachable, _) = t.staff(&t.ward_a).await;
    let (admin_user, _) = t.admin().await;
    t.sink.clear().await;
    t.sink.fail_for(unreachable.email.clone().unwrap()).await;

    let session = t
        .portal
        .billing
        .initiate_checkout(&citizen, ServiceType::LocalTax, CheckoutOptions::default())
        .await
        .unwrap();
    t.provider.mark_paid(&session.session_id);
    let before = t.portal.dispatcher.stats();

    let outcome = t
        .portal
        .reconciliation
        .verify(&session.session_id, &citizen, ServiceType::LocalTax)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        VerifyOutcome::Paid {
            newly_settled: true,
            ..
        }
    ));

    let bills = t
        .portal
        .billing
        .list_bills(&citizen, BillFilter::default())
        .await
        .unwrap();
    assert_eq!(bills[0].status, BillStatus::Paid);

    let citizen_mail = t.sink.sent_to(citizen_user.email.as_deref().unwrap()).await;
    assert_eq!(citizen_mail.len(), 1);
    assert_eq!(citizen_mail[0].attachments.len(), 1);
    assert_eq!(t.sink.sent_to(admin_user.email.as_deref().unwrap()).await.len(), 1);
    assert!(t
        .sink
        .sent_to(unreachable.email.as_deref().unwrap())
        .await
        .is_empty());

    let after = t.portal.dispatcher.stats();
    assert_eq!(after.failed - before.failed, 1);
    assert_eq!(after.delivered - before.delivered, 2);
}
