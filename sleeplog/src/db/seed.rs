//! Demo data for a fresh database.
//!
//! Seeding creates the demo user and a week of nights in March 2024. It runs inside one
//! transaction and is skipped when the demo user already has records, so restarting with
//! `seed_demo_data` enabled never duplicates or overwrites anything.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::db::handlers::{Repository, SleepRecords, Users};
use crate::db::models::sleep_records::SleepRecordCreateDBRequest;
use crate::types::UserId;

pub const DEMO_USER_EMAIL: &str = "test@example.com";
pub const DEMO_USER_NAME: &str = "Test User";

/// (date, sleep, wake, notes)
const DEMO_NIGHTS: &[(&str, &str, &str, Option<&str>)] = &[
    ("2024-03-01", "23:00", "07:00", Some("잘 잤음")),
    ("2024-03-02", "22:30", "06:30", Some("조금 피곤함")),
    ("2024-03-03", "23:30", "08:00", None),
    ("2024-03-04", "22:00", "06:00", Some("일찍 일어남")),
    ("2024-03-05", "00:00", "07:30", Some("늦게 잠")),
    ("2024-03-06", "23:00", "07:00", None),
    ("2024-03-07", "22:30", "06:30", Some("평소와 동일")),
];

/// Insert the demo user and nights unless they are already there. Returns the demo user's id.
#[instrument(skip_all, err)]
pub async fn seed_demo_data(db: &SqlitePool) -> anyhow::Result<UserId> {
    let mut tx = db.begin().await?;

    let user = Users::new(&mut tx)
        .get_or_create_by_email(DEMO_USER_EMAIL, Some(DEMO_USER_NAME))
        .await?;

    let mut records = SleepRecords::new(&mut tx, user.id);
    if records.count().await? > 0 {
        info!("Demo data already present, skipping seeding");
        tx.commit().await?;
        return Ok(user.id);
    }

    info!("Seeding database with {} demo nights", DEMO_NIGHTS.len());
    for (date, sleep_time, wake_time, notes) in DEMO_NIGHTS {
        records
            .create(&SleepRecordCreateDBRequest {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d")?,
                sleep_time: sleep_time.to_string(),
                wake_time: wake_time.to_string(),
                notes: notes.map(str::to_string),
            })
            .await?;
    }

    tx.commit().await?;
    debug!("Database seeded successfully");

    Ok(user.id)
}
