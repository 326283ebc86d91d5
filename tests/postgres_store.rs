//! Runs against a real PostgreSQL server:
//! `DATABASE_URL=postgres://... cargo test --test postgres_store -- --ignored`

mod common;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use bk_counsel::models::{AppointmentStatus, Identity, Role};
use bk_counsel::scheduler::{BookingRequest, SchedulingError, SESSION_MINUTES};
use bk_counsel::store::{AppointmentStore, IdentityStore, NewAppointment, PgStore, StoreError};
use bk_counsel::AppState;
use common::{identity, tokens};

async fn seed(pool: &PgPool, identity: &Identity) {
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, role, full_name, email, class) \
         VALUES ($1, $2, 'not-a-phc-hash', $3, $4, $5, $6)",
    )
    .bind(identity.id)
    .bind(&identity.username)
    .bind(identity.role.as_str())
    .bind(&identity.full_name)
    .bind(&identity.email)
    .bind(&identity.class_name)
    .execute(pool)
    .await
    .unwrap();
}

fn slot(student: &Identity, counselor: &Identity) -> NewAppointment {
    NewAppointment {
        student_id: student.id,
        counselor_id: counselor.id,
        date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        duration_minutes: SESSION_MINUTES,
        reason: "Konflik dengan teman sekelas".to_string(),
        notes: None,
        created_at: Utc::now(),
    }
}

async fn set_status(pool: &PgPool, id: Uuid, status: AppointmentStatus) {
    sqlx::query("UPDATE appointments SET status = $1 WHERE id = $2")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at PostgreSQL"]
async fn unique_index_turns_second_active_booking_into_conflict(pool: PgPool) {
    let student = identity("siti", Role::Student);
    let other = identity("budi", Role::Student);
    let counselor = identity("guru-bk", Role::Teacher);
    for user in [&student, &other, &counselor] {
        seed(&pool, user).await;
    }
    let store = PgStore::new(pool.clone());

    let first = store.insert_pending(slot(&student, &counselor)).await.unwrap();
    assert_eq!(first.status, AppointmentStatus::Pending);
    assert!(matches!(
        store.insert_pending(slot(&other, &counselor)).await,
        Err(StoreError::Conflict(_))
    ));

    set_status(&pool, first.id, AppointmentStatus::Confirmed).await;
    assert!(matches!(
        store.insert_pending(slot(&other, &counselor)).await,
        Err(StoreError::Conflict(_))
    ));

    set_status(&pool, first.id, AppointmentStatus::Cancelled).await;
    let rebooked = store.insert_pending(slot(&other, &counselor)).await.unwrap();
    assert_eq!(rebooked.student_id, other.id);
    assert_eq!(
        store
            .count_active_on(counselor.id, rebooked.date)
            .await
            .unwrap(),
        1
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs DATABASE_URL pointing at PostgreSQL"]
async fn scheduler_reports_taken_slot_from_postgres(pool: PgPool) {
    let student = identity("siti", Role::Student);
    let other = identity("budi", Role::Student);
    let counselor = identity("guru-bk", Role::Teacher);
    for user in [&student, &other, &counselor] {
        seed(&pool, user).await;
    }
    let store = Arc::new(PgStore::new(pool));
    assert_eq!(
        store.find_by_id(student.id).await.unwrap().as_ref(),
        Some(&student)
    );

    let scheduler = AppState::new(store, tokens()).scheduler();
    let request = || BookingRequest {
        date: Some("2024-05-01".to_string()),
        time: Some("14:00".to_string()),
        reason: Some("Sulit fokus menjelang ujian".to_string()),
        ..Default::default()
    };

    let booked = scheduler.create(student.id, request()).await.unwrap();
    assert_eq!(booked.counselor_id, counselor.id);
    assert!(matches!(
        scheduler.create(other.id, request()).await,
        Err(SchedulingError::SlotUnavailable)
    ));

    let listed = scheduler.list_for_student(student.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].teacher_name.as_deref(), Some(counselor.full_name.as_str()));
}
