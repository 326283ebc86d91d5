//! Stress self-assessment: scoring, severity tiers and recommendations.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Answers, NewAssessment, StressAssessment};
use crate::notify::Notifier;
use crate::store::{AssessmentStore, StoreError};
use crate::{proceeds, AppState, Error, Payload};

pub const MIN_ANSWER: u8 = 1;
pub const MAX_ANSWER: u8 = 5;

/// Strictly above this percentage counselors are alerted.
pub const ESCALATION_THRESHOLD: i32 = 60;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Question {
    pub id: u32,
    pub question: &'static str,
    pub category: &'static str,
}

pub const QUESTIONS: [Question; 10] = [
    Question {
        id: 1,
        question: "Seberapa sering Anda merasa khawatir atau cemas tentang tugas sekolah?",
        category: "academic",
    },
    Question {
        id: 2,
        question: "Seberapa sulit bagi Anda untuk berkonsentrasi saat belajar?",
        category: "academic",
    },
    Question {
        id: 3,
        question: "Seberapa sering Anda merasa kewalahan dengan jadwal kegiatan sehari-hari?",
        category: "time_management",
    },
    Question {
        id: 4,
        question: "Seberapa sering Anda mengalami kesulitan tidur karena memikirkan masalah?",
        category: "physical",
    },
    Question {
        id: 5,
        question: "Seberapa sering Anda merasa mudah marah atau tersinggung?",
        category: "emotional",
    },
    Question {
        id: 6,
        question: "Seberapa sering Anda merasa lelah meskipun sudah beristirahat cukup?",
        category: "physical",
    },
    Question {
        id: 7,
        question: "Seberapa sering Anda merasa pesimis tentang masa depan Anda?",
        category: "emotional",
    },
    Question {
        id: 8,
        question: "Seberapa sulit bagi Anda untuk menikmati aktivitas yang biasanya Anda suka?",
        category: "emotional",
    },
    Question {
        id: 9,
        question: "Seberapa sering Anda merasa tertekan oleh ekspektasi orang lain?",
        category: "social",
    },
    Question {
        id: 10,
        question: "Seberapa sering Anda merasa tidak mampu mengendalikan situasi dalam hidup Anda?",
        category: "personal_control",
    },
];

pub const REFERRAL: &str = "Segera konsultasi dengan guru BK atau konselor profesional";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl Tier {
    /// Bands are inclusive at the top: 0-20, 21-40, 41-60, 61-80, 81-100.
    pub fn of(percentage: i32) -> Tier {
        match percentage {
            i32::MIN..=20 => Tier::VeryLow,
            21..=40 => Tier::Low,
            41..=60 => Tier::Moderate,
            61..=80 => Tier::High,
            _ => Tier::VeryHigh,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::VeryLow => "Sangat Rendah",
            Tier::Low => "Rendah",
            Tier::Moderate => "Sedang",
            Tier::High => "Tinggi",
            Tier::VeryHigh => "Sangat Tinggi",
        }
    }

    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            Tier::VeryLow => &[
                "Pertahankan pola hidup sehat yang sudah Anda jalani",
                "Lanjutkan aktivitas yang membuat Anda bahagia",
            ],
            Tier::Low => &[
                "Pertahankan pola hidup sehat yang sudah Anda jalani",
                "Lanjutkan aktivitas yang membuat Anda bahagia",
                "Tetap jaga keseimbangan antara belajar dan istirahat",
            ],
            Tier::Moderate => &[
                "Cobalah teknik relaksasi seperti pernapasan dalam",
                "Atur jadwal belajar yang lebih terstruktur",
                "Bicarakan perasaan Anda dengan teman atau keluarga",
                "Lakukan aktivitas fisik secara teratur",
            ],
            Tier::High => &[
                REFERRAL,
                "Praktek mindfulness dan meditasi",
                "Kurangi beban aktivitas yang tidak perlu",
                "Pastikan tidur yang cukup dan berkualitas",
                "Jangan ragu untuk meminta bantuan dari orang terdekat",
            ],
            Tier::VeryHigh => &[
                "Hubungi guru BK hari ini juga, jangan menunggu sampai keadaan memburuk",
                REFERRAL,
                "Ceritakan kondisi Anda kepada orang tua atau wali",
                "Tunda kegiatan yang tidak mendesak sampai Anda merasa lebih baik",
                "Pastikan tidur yang cukup dan berkualitas",
                "Jangan ragu untuk meminta bantuan dari orang terdekat",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub total_score: i32,
    pub percentage: i32,
}

/// `percentage = round(100 * total / (N * 5))`, halves rounding up.
pub fn score(answers: &Answers) -> Score {
    let total_score: i32 = answers.values().map(|v| i32::from(*v)).sum();
    let max = (QUESTIONS.len() as i32) * i32::from(MAX_ANSWER);
    let percentage = (200 * total_score + max) / (2 * max);
    Score {
        total_score,
        percentage: percentage.clamp(0, 100),
    }
}

pub fn should_escalate(percentage: i32) -> bool {
    percentage > ESCALATION_THRESHOLD
}

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("assessment submitted for another user")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every question answered exactly once, each on the 1..=5 scale.
pub fn validate_answers(answers: &Answers) -> Result<(), AssessmentError> {
    if answers.is_empty() {
        return Err(AssessmentError::InvalidInput(
            "Data tes tidak lengkap".to_string(),
        ));
    }
    for (id, value) in answers {
        if !QUESTIONS.iter().any(|q| q.id == *id) {
            return Err(AssessmentError::InvalidInput(format!(
                "Pertanyaan {} tidak dikenal",
                id
            )));
        }
        if !(MIN_ANSWER..=MAX_ANSWER).contains(value) {
            return Err(AssessmentError::InvalidInput(format!(
                "Jawaban untuk pertanyaan {} harus antara {} dan {}",
                id, MIN_ANSWER, MAX_ANSWER
            )));
        }
    }
    if answers.len() != QUESTIONS.len() {
        return Err(AssessmentError::InvalidInput(format!(
            "Semua {} pertanyaan harus dijawab",
            QUESTIONS.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AssessmentResult {
    pub assessment: StressAssessment,
    pub tier: Tier,
    pub escalated: bool,
    pub notifications_created: usize,
}

#[derive(Clone)]
pub struct StressEngine {
    assessments: Arc<dyn AssessmentStore>,
    notifier: Notifier,
}

impl StressEngine {
    pub fn new(assessments: Arc<dyn AssessmentStore>, notifier: Notifier) -> Self {
        Self {
            assessments,
            notifier,
        }
    }

    pub async fn submit(
        &self,
        user_id: Uuid,
        answers: Answers,
    ) -> Result<AssessmentResult, AssessmentError> {
        validate_answers(&answers)?;
        let Score {
            total_score,
            percentage,
        } = score(&answers);
        let tier = Tier::of(percentage);

        let assessment = self
            .assessments
            .insert(NewAssessment {
                user_id,
                raw_answers: answers,
                total_score,
                stress_percentage: percentage,
                recommendations: tier
                    .recommendations()
                    .iter()
                    .map(|r| r.to_string())
                    .collect(),
            })
            .await?;

        let escalated = should_escalate(percentage);
        let mut notifications_created = 0;
        if escalated {
            // the assessment is already recorded; fan-out trouble must not undo it
            match self
                .notifier
                .escalate(user_id, percentage, assessment.id)
                .await
            {
                Ok(report) => notifications_created = report.created(),
                Err(err) => log::error!(
                    "Counselor roster unavailable for stress alert {}: {}",
                    assessment.id,
                    err
                ),
            }
        }

        Ok(AssessmentResult {
            assessment,
            tier,
            escalated,
            notifications_created,
        })
    }
}

pub async fn questions() -> Payload<QuestionList> {
    proceeds(QuestionList {
        questions: QUESTIONS.to_vec(),
        scale_min: MIN_ANSWER,
        scale_max: MAX_ANSWER,
    })
}

pub async fn submit_stress_test(
    payload: Result<Json<SubmitStressTest>, JsonRejection>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<StressTestSaved> {
    let Json(body) = payload?;
    let (answers, client_total, client_percentage, user_id) = match (
        body.answers,
        body.total_score,
        body.stress_percentage,
        body.user_id,
    ) {
        (Some(answers), Some(total), Some(percentage), Some(user_id)) => {
            (answers, total, percentage, user_id)
        }
        _ => return Err(Error::invalid("Data tes tidak lengkap")),
    };

    let identity = state
        .sessions
        .authenticate(body.token.as_deref(), bearer.as_ref())
        .await?;
    if identity.id != user_id {
        return Err(AssessmentError::Forbidden.into());
    }

    let result = state.stress_engine().submit(user_id, answers).await?;
    let assessment = &result.assessment;
    if client_total != assessment.total_score || client_percentage != assessment.stress_percentage
    {
        log::warn!(
            "Client scored {} ({}%), server scored {} ({}%) for test {}",
            client_total,
            client_percentage,
            assessment.total_score,
            assessment.stress_percentage,
            assessment.id
        );
    }
    log::info!(
        "Stress test {} saved for `{}` at {}% ({:?})",
        assessment.id,
        identity.username,
        assessment.stress_percentage,
        result.tier
    );

    proceeds(StressTestSaved {
        message: "Hasil tes berhasil disimpan",
        test_id: assessment.id,
        test_date: assessment.submitted_at,
        total_score: assessment.total_score,
        stress_percentage: assessment.stress_percentage,
        tier: result.tier,
        tier_label: result.tier.label(),
        recommendations: assessment.recommendations.clone(),
        escalated: result.escalated,
        notifications_created: result.notifications_created,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitStressTest {
    pub token: Option<String>,
    pub answers: Option<Answers>,
    pub total_score: Option<i32>,
    pub stress_percentage: Option<i32>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressTestSaved {
    pub message: &'static str,
    pub test_id: Uuid,
    pub test_date: DateTime<Utc>,
    pub total_score: i32,
    pub stress_percentage: i32,
    pub tier: Tier,
    pub tier_label: &'static str,
    pub recommendations: Vec<String>,
    pub escalated: bool,
    pub notifications_created: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionList {
    pub questions: Vec<Question>,
    pub scale_min: u8,
    pub scale_max: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(value: u8) -> Answers {
        QUESTIONS.iter().map(|q| (q.id, value)).collect()
    }

    #[test]
    fn all_threes_is_moderate_sixty() {
        let answers = uniform(3);
        let s = score(&answers);
        assert_eq!(s.total_score, 30);
        assert_eq!(s.percentage, 60);
        assert_eq!(Tier::of(s.percentage), Tier::Moderate);
        assert!(!should_escalate(s.percentage));
    }

    #[test]
    fn one_five_among_threes_is_high_sixty_four() {
        let mut answers = uniform(3);
        answers.insert(4, 5);
        let s = score(&answers);
        assert_eq!(s.total_score, 32);
        assert_eq!(s.percentage, 64);
        assert_eq!(Tier::of(s.percentage), Tier::High);
        assert!(should_escalate(s.percentage));
    }

    #[test]
    fn escalation_boundary_is_exclusive() {
        assert!(!should_escalate(60));
        assert!(should_escalate(61));
    }

    #[test]
    fn extremes_of_the_scale() {
        assert_eq!(score(&uniform(1)).percentage, 20);
        assert_eq!(score(&uniform(5)).percentage, 100);
        assert_eq!(score(&Answers::new()).percentage, 0);
    }

    #[test]
    fn tier_bands_are_inclusive_at_the_top() {
        let expected = [
            (0, Tier::VeryLow),
            (20, Tier::VeryLow),
            (21, Tier::Low),
            (40, Tier::Low),
            (41, Tier::Moderate),
            (60, Tier::Moderate),
            (61, Tier::High),
            (80, Tier::High),
            (81, Tier::VeryHigh),
            (100, Tier::VeryHigh),
        ];
        for (percentage, tier) in expected {
            assert_eq!(Tier::of(percentage), tier, "at {}%", percentage);
        }
    }

    #[test]
    fn percentage_never_decreases_with_total() {
        let mut answers = uniform(1);
        let mut last = score(&answers).percentage;
        for q in QUESTIONS.iter() {
            for value in 2..=MAX_ANSWER {
                answers.insert(q.id, value);
                let now = score(&answers).percentage;
                assert!(now >= last);
                last = now;
            }
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn referral_appears_exactly_above_sixty() {
        for percentage in 0..=100 {
            let recs = Tier::of(percentage).recommendations();
            assert!(!recs.is_empty());
            assert_eq!(recs.contains(&REFERRAL), percentage > 60, "at {}%", percentage);
        }
    }

    #[test]
    fn rejects_incomplete_or_out_of_scale_answers() {
        assert!(validate_answers(&Answers::new()).is_err());

        let mut partial = uniform(3);
        partial.remove(&10);
        assert!(validate_answers(&partial).is_err());

        let mut unknown = uniform(3);
        unknown.insert(11, 3);
        assert!(validate_answers(&unknown).is_err());

        let mut too_high = uniform(3);
        too_high.insert(2, 6);
        assert!(validate_answers(&too_high).is_err());

        let mut zero = uniform(3);
        zero.insert(2, 0);
        assert!(validate_answers(&zero).is_err());

        assert!(validate_answers(&uniform(5)).is_ok());
    }
}
