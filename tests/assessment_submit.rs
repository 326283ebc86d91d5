mod common;

use bk_counsel::assessment::{AssessmentError, Tier, QUESTIONS, REFERRAL};
use bk_counsel::models::Answers;
use bk_counsel::notify::{STUDENT_ALERT, TEACHER_ALERT};
use bk_counsel::store::{AssessmentStore, NotificationStore};
use common::fixture;

fn uniform(value: u8) -> Answers {
    QUESTIONS.iter().map(|q| (q.id, value)).collect()
}

#[tokio::test]
async fn sixty_percent_is_stored_without_alerts() {
    let fx = fixture(2);
    let result = fx
        .state
        .stress_engine()
        .submit(fx.student.id, uniform(3))
        .await
        .unwrap();

    assert_eq!(result.assessment.total_score, 30);
    assert_eq!(result.assessment.stress_percentage, 60);
    assert_eq!(result.tier, Tier::Moderate);
    assert!(!result.escalated);
    assert_eq!(result.notifications_created, 0);
    assert!(!result.assessment.recommendations.iter().any(|r| r == REFERRAL));

    let related = fx
        .store
        .list_related(result.assessment.id)
        .await
        .unwrap();
    assert!(related.is_empty());
}

#[tokio::test]
async fn sixty_four_percent_alerts_student_and_every_counselor() {
    let fx = fixture(3);
    let mut answers = uniform(3);
    answers.insert(7, 5);

    let result = fx
        .state
        .stress_engine()
        .submit(fx.student.id, answers)
        .await
        .unwrap();

    assert_eq!(result.assessment.total_score, 32);
    assert_eq!(result.assessment.stress_percentage, 64);
    assert_eq!(result.tier, Tier::High);
    assert!(result.escalated);
    assert_eq!(result.notifications_created, 4);
    assert_eq!(result.assessment.recommendations[0], REFERRAL);

    let related = fx
        .store
        .list_related(result.assessment.id)
        .await
        .unwrap();
    assert_eq!(related.len(), 4);

    let student_alerts: Vec<_> = related
        .iter()
        .filter(|n| n.notification_type == STUDENT_ALERT)
        .collect();
    assert_eq!(student_alerts.len(), 1);
    assert_eq!(student_alerts[0].user_id, fx.student.id);

    for counselor in &fx.counselors {
        let theirs: Vec<_> = related
            .iter()
            .filter(|n| n.user_id == counselor.id)
            .collect();
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].notification_type, TEACHER_ALERT);
        assert!(theirs[0].message.contains("64%"));
        assert_eq!(theirs[0].related_type.as_deref(), Some("stress_test"));
        assert!(!theirs[0].is_read);
    }
}

#[tokio::test]
async fn without_counselors_only_the_student_is_alerted() {
    let fx = fixture(0);
    let result = fx
        .state
        .stress_engine()
        .submit(fx.student.id, uniform(5))
        .await
        .unwrap();
    assert_eq!(result.tier, Tier::VeryHigh);
    assert_eq!(result.notifications_created, 1);
}

#[tokio::test]
async fn one_failing_recipient_does_not_undo_the_rest() {
    let fx = fixture(3);
    fx.store.fail_notifications_for(fx.counselors[1].id).unwrap();

    let result = fx
        .state
        .stress_engine()
        .submit(fx.student.id, uniform(4))
        .await
        .unwrap();

    assert!(result.escalated);
    assert_eq!(result.notifications_created, 3);
    assert_eq!(fx.store.assessment_count().unwrap(), 1);

    let related = fx
        .store
        .list_related(result.assessment.id)
        .await
        .unwrap();
    assert_eq!(related.len(), 3);
    assert!(related.iter().all(|n| n.user_id != fx.counselors[1].id));
}

#[tokio::test]
async fn failing_student_alert_still_reaches_counselors() {
    let fx = fixture(2);
    fx.store.fail_notifications_for(fx.student.id).unwrap();

    let result = fx
        .state
        .stress_engine()
        .submit(fx.student.id, uniform(4))
        .await
        .unwrap();
    assert_eq!(result.notifications_created, 2);
}

#[tokio::test]
async fn every_high_submission_gets_its_own_alerts() {
    let fx = fixture(2);
    let engine = fx.state.stress_engine();

    let first = engine.submit(fx.student.id, uniform(4)).await.unwrap();
    let second = engine.submit(fx.student.id, uniform(4)).await.unwrap();
    assert_ne!(first.assessment.id, second.assessment.id);

    let inbox = NotificationStore::list_for_user(fx.store.as_ref(), fx.student.id)
        .await
        .unwrap();
    assert_eq!(inbox.len(), 2);
    for counselor in &fx.counselors {
        let theirs = NotificationStore::list_for_user(fx.store.as_ref(), counselor.id)
            .await
            .unwrap();
        assert_eq!(theirs.len(), 2);
    }
}

#[tokio::test]
async fn invalid_answers_store_nothing() {
    let fx = fixture(1);
    let engine = fx.state.stress_engine();

    let mut out_of_scale = uniform(3);
    out_of_scale.insert(1, 9);
    for answers in [Answers::new(), out_of_scale] {
        assert!(matches!(
            engine.submit(fx.student.id, answers).await,
            Err(AssessmentError::InvalidInput(_))
        ));
    }
    assert_eq!(fx.store.assessment_count().unwrap(), 0);
}

#[tokio::test]
async fn submissions_are_kept_per_user() {
    let fx = fixture(0);
    let engine = fx.state.stress_engine();
    engine.submit(fx.student.id, uniform(1)).await.unwrap();
    engine.submit(fx.student.id, uniform(2)).await.unwrap();

    let history = AssessmentStore::list_for_user(fx.store.as_ref(), fx.student.id)
        .await
        .unwrap();
    let mut percentages: Vec<_> = history.iter().map(|a| a.stress_percentage).collect();
    percentages.sort();
    assert_eq!(percentages, vec![20, 40]);
}
