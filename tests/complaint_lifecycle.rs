//! Complaint lifecycle: submission, triage, owner edits and deletion.

mod helpers;

use proptest::prelude::*;

use civic_portal::complaints::ComplaintPatch;
use civic_portal::models::{ComplaintStatus, Priority};
use civic_portal::ErrorKind;
use helpers::TestPortal;

fn status(to: ComplaintStatus) -> ComplaintPatch {
    ComplaintPatch {
        status: Some(to),
        ..Default::default()
    }
}

#[tokio::test]
async fn submission_notifies_owner_and_ward_staff() {
    let t = TestPortal::new().await;
    let (citizen, citizen_actor) = t.citizen(&t.ward_a).await;
    let (staff, _) = t.staff(&t.ward_a).await;
    let (other_staff, _) = t.staff(&t.ward_b).await;
    t.sink.clear().await;

    let view = t
        .portal
        .complaints
        .create_complaint(&citizen_actor, t.submission(&t.waste, "Overflowing bins"))
        .await
        .unwrap();

    assert_eq!(view.complaint.status, ComplaintStatus::Submitted);
    assert_eq!(view.complaint.priority, Priority::Low);
    assert_eq!(view.category_name, "Waste");
    assert_eq!(view.citizen_ward_id, Some(t.ward_a.id));
    assert_eq!(view.complaint.location.latitude, 8.48);
    assert_eq!(view.complaint.location.longitude, -13.23);

    let citizen_mail = t.sink.sent_to(citizen.email.as_deref().unwrap()).await;
    assert_eq!(citizen_mail.len(), 1);
    assert_eq!(
        t.sink.sent_to(staff.email.as_deref().unwrap()).await.len(),
        1
    );
    assert!(t
        .sink
        .sent_to(other_staff.email.as_deref().unwrap())
        .await
        .is_empty());
}

#[tokio::test]
async fn failed_delivery_to_one_staff_member_spares_the_rest() {
    let t = TestPortal::new().await;
    let (citizen, citizen_actor) = t.citizen(&t.ward_a).await;
    let (unreachable, _) = t.staff(&t.ward_a).await;
    let (colleague, _) = t.staff(&t.ward_a).await;
    t.sink.clear().await;
    t.sink.fail_for(unreachable.email.clone().unwrap()).await;
    let before = t.portal.dispatcher.stats();

    let view = t
        .portal
        .complaints
        .create_complaint(&citizen_actor, t.submission(&t.roads, "Collapsed culvert"))
        .await
        .unwrap();
    assert_eq!(view.complaint.status, ComplaintStatus::Submitted);
    assert!(t
        .portal
        .complaints
        .get_complaint(&citizen_actor, view.complaint.id)
        .await
        .is_ok());

    assert_eq!(t.sink.sent_to(citizen.email.as_deref().unwrap()).await.len(), 1);
    assert_eq!(t.sink.sent_to(colleague.email.as_deref().unwrap()).await.len(), 1);
    assert!(t
        .sink
        .sent_to(unreachable.email.as_deref().unwrap())
        .await
        .is_empty());

    let after = t.portal.dispatcher.stats();
    assert_eq!(after.failed - before.failed, 1);
    assert_eq!(after.delivered - before.delivered, 2);
}

#[tokio::test]
async fn owner_cannot_edit_once_in_progress() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let (_, staff) = t.staff(&t.ward_a).await;
    let view = t.file_complaint(&citizen, "Blocked drain").await;
    let id = view.complaint.id;

    for to in [ComplaintStatus::Acknowledged, ComplaintStatus::InProgress] {
        t.portal
            .complaints
            .update_complaint(&staff, id, status(to))
            .await
            .unwrap();
    }

    let patch = ComplaintPatch {
        title: Some("Blocked drain, now flooding".to_string()),
        ..Default::default()
    };
    let err = t
        .portal
        .complaints
        .update_complaint(&citizen, id, patch)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    let after = t.portal.complaints.get_complaint(&citizen, id).await.unwrap();
    assert_eq!(after.complaint.title, "Blocked drain");
    assert_eq!(after.complaint.status, ComplaintStatus::InProgress);
}

#[tokio::test]
async fn owner_can_edit_while_submitted() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let view = t.file_complaint(&citizen, "Streetlight out").await;

    let patch = ComplaintPatch {
        title: Some("Two streetlights out".to_string()),
        category_id: Some(t.roads.id),
        ..Default::default()
    };
    let updated = t
        .portal
        .complaints
        .update_complaint(&citizen, view.complaint.id, patch)
        .await
        .unwrap();
    assert_eq!(updated.complaint.title, "Two streetlights out");
    assert_eq!(updated.category_name, "Roads");
    assert_eq!(updated.complaint.status, ComplaintStatus::Submitted);
}

#[tokio::test]
async fn staff_walks_the_state_machine_and_terminal_is_final() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let (_, staff) = t.staff(&t.ward_a).await;
    let (_, admin) = t.admin().await;
    let id = t.file_complaint(&citizen, "Broken culvert").await.complaint.id;

    // Skipping ACKNOWLEDGED is not an edge.
    let err = t
        .portal
        .complaints
        .update_complaint(&staff, id, status(ComplaintStatus::Resolved))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    for to in [
        ComplaintStatus::Acknowledged,
        ComplaintStatus::InProgress,
        ComplaintStatus::Resolved,
    ] {
        let view = t
            .portal
            .complaints
            .update_complaint(&staff, id, status(to))
            .await
            .unwrap();
        assert_eq!(view.complaint.status, to);
    }

    // Not even an admin reopens a resolved complaint.
    let err = t
        .portal
        .complaints
        .update_complaint(&admin, id, status(ComplaintStatus::InProgress))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

#[tokio::test]
async fn staff_cannot_edit_content_or_delete() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let (_, staff) = t.staff(&t.ward_a).await;
    let id = t.file_complaint(&citizen, "Illegal dumping").await.complaint.id;

    let patch = ComplaintPatch {
        description: Some("Rewritten by staff".to_string()),
        ..Default::default()
    };
    let err = t
        .portal
        .complaints
        .update_complaint(&staff, id, patch)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = t
        .portal
        .complaints
        .delete_complaint(&staff, id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let triage = ComplaintPatch {
        priority: Some(Priority::High),
        ..Default::default()
    };
    let view = t
        .portal
        .complaints
        .update_complaint(&staff, id, triage)
        .await
        .unwrap();
    assert_eq!(view.complaint.priority, Priority::High);
}

#[tokio::test]
async fn deletion_rules_by_role() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let (_, staff) = t.staff(&t.ward_a).await;
    let (_, admin) = t.admin().await;

    let fresh = t.file_complaint(&citizen, "Noise at night").await.complaint.id;
    t.portal
        .complaints
        .delete_complaint(&citizen, fresh)
        .await
        .unwrap();
    let err = t
        .portal
        .complaints
        .get_complaint(&citizen, fresh)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let triaged = t.file_complaint(&citizen, "Market waste").await.complaint.id;
    t.portal
        .complaints
        .update_complaint(&staff, triaged, status(ComplaintStatus::Acknowledged))
        .await
        .unwrap();
    let err = t
        .portal
        .complaints
        .delete_complaint(&citizen, triaged)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    t.portal
        .complaints
        .delete_complaint(&admin, triaged)
        .await
        .unwrap();
}

#[tokio::test]
async fn submission_validation() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let (_, staff) = t.staff(&t.ward_a).await;

    let mut blank = t.submission(&t.waste, "   ");
    blank.title = "   ".to_string();
    let err = t
        .portal
        .complaints
        .create_complaint(&citizen, blank)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut off_map = t.submission(&t.waste, "Somewhere");
    off_map.location.latitude = 123.0;
    let err = t
        .portal
        .complaints
        .create_complaint(&citizen, off_map)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = t
        .portal
        .complaints
        .create_complaint(&staff, t.submission(&t.waste, "Staff filing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn deleting_a_category_removes_its_complaints() {
    let t = TestPortal::new().await;
    let (_, citizen) = t.citizen(&t.ward_a).await;
    let (_, admin) = t.admin().await;
    t.file_complaint(&citizen, "Bins one").await;
    t.file_complaint(&citizen, "Bins two").await;

    let err = t
        .portal
        .complaints
        .delete_category(&citizen, t.waste.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let removed = t
        .portal
        .complaints
        .delete_category(&admin, t.waste.id)
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let names: Vec<_> = t
        .portal
        .complaints
        .list_categories()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Roads".to_string()]);
}

#[tokio::test]
async fn duplicate_category_names_are_rejected() {
    let t = TestPortal::new().await;
    let (_, admin) = t.admin().await;
    let err = t
        .portal
        .complaints
        .create_category(&admin, " waste ", "", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

fn any_status() -> impl Strategy<Value = Option<ComplaintStatus>> {
    prop_oneof![
        Just(None),
        Just(Some(ComplaintStatus::Acknowledged)),
        Just(Some(ComplaintStatus::InProgress)),
        Just(Some(ComplaintStatus::Resolved)),
        Just(Some(ComplaintStatus::Rejected)),
    ]
}

fn any_priority() -> impl Strategy<Value = Option<Priority>> {
    prop_oneof![
        Just(None),
        Just(Some(Priority::Low)),
        Just(Some(Priority::Medium)),
        Just(Some(Priority::High)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_citizen_patches_never_touch_triage(
        status in any_status(),
        priority in any_priority(),
        title in proptest::option::of("[A-Za-z ]{1,40}"),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let t = TestPortal::new().await;
            let (_, citizen) = t.citizen(&t.ward_a).await;
            let before = t.file_complaint(&citizen, "Pothole").await;

            let patch = ComplaintPatch {
                title,
                status,
                priority,
                ..Default::default()
            };
            // Title errors are fine; triage must still be untouched.
            let _ = t
                .portal
                .complaints
                .update_complaint(&citizen, before.complaint.id, patch)
                .await;

            let after = t
                .portal
                .complaints
                .get_complaint(&citizen, before.complaint.id)
                .await
                .unwrap();
            assert_eq!(after.complaint.status, ComplaintStatus::Submitted);
            assert_eq!(after.complaint.priority, Priority::Low);
        });
    }
}
