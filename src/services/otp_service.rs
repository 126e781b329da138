// ============================================================================
// SERVICE : OTP (codes de connexion à usage unique)
// ============================================================================
//
// Workflow:
//   1. generate(email) : refuse pendant le cooldown de renvoi, invalide les
//      anciens codes, insère un nouveau code (hash seulement)
//   2. verify(email, code) : Expired -> AttemptsExceeded -> Mismatch -> OK
//
// Points d'attention:
//   - Le compteur de tentatives est incrémenté par UN SEUL UPDATE conditionnel
//     (WHERE verification_attempts < max), jamais lecture puis écriture
//   - Le passage à is_used = true est aussi conditionnel : deux vérifications
//     concurrentes du bon code ne peuvent pas réussir toutes les deux
//   - Au plafond, le code est mort même si la dernière saisie est correcte
//
// ============================================================================

use chrono::{Duration, NaiveDateTime};
use rand::{Rng, rngs::OsRng};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use sha2::{Digest, Sha256};

use crate::models::otp_verifications::{self as otp, Entity as Otp};
use crate::models::users::normalize_email;
use crate::utils::password::constant_time_eq;

pub const OTP_LENGTH: u32 = 6;

#[derive(Debug, Clone)]
pub struct OtpPolicy {
    pub ttl: Duration,
    pub resend_cooldown: Duration,
    pub max_attempts: i32,
    /// Code fixe hors production (None en production)
    pub dev_code: Option<String>,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            resend_cooldown: Duration::seconds(60),
            max_attempts: 3,
            dev_code: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("No verification code was requested for this email")]
    NoActiveCode,

    #[error("Verification code has expired")]
    Expired,

    #[error("Verification code has already been used")]
    AlreadyUsed,

    #[error("Too many failed attempts, request a new code")]
    AttemptsExceeded,

    #[error("Invalid verification code")]
    Mismatch { remaining_attempts: i32 },

    #[error("A code was sent recently, retry in {retry_after_seconds} seconds")]
    ResendCooldown { retry_after_seconds: i64 },

    #[error(transparent)]
    Database(#[from] DbErr),
}

impl OtpError {
    /// Code machine renvoyé au frontend
    pub fn code(&self) -> &'static str {
        match self {
            OtpError::NoActiveCode => "otp_not_found",
            OtpError::Expired => "otp_expired",
            OtpError::AlreadyUsed => "otp_already_used",
            OtpError::AttemptsExceeded => "otp_attempts_exceeded",
            OtpError::Mismatch { .. } => "otp_mismatch",
            OtpError::ResendCooldown { .. } => "otp_resend_cooldown",
            OtpError::Database(_) => "database_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedOtp {
    pub email: String,
    pub code: String,
    pub expires_at: NaiveDateTime,
    pub resend_available_at: NaiveDateTime,
}

pub struct OtpService;

impl OtpService {
    /// Crée un nouveau code pour l'email et invalide les précédents
    pub async fn generate(
        db: &DatabaseConnection,
        policy: &OtpPolicy,
        email: &str,
        now: NaiveDateTime,
    ) -> Result<GeneratedOtp, OtpError> {
        let email = normalize_email(email);
        let txn = db.begin().await?;

        // 1. Cooldown de renvoi basé sur le dernier code émis
        let latest = Otp::find()
            .filter(otp::Column::Email.eq(&email))
            .order_by_desc(otp::Column::CreatedAt)
            .order_by_desc(otp::Column::Id)
            .one(&txn)
            .await?;

        if let Some(previous) = latest {
            let resend_at = previous.created_at + policy.resend_cooldown;
            if now < resend_at {
                let retry_after_seconds = (resend_at - now).num_seconds().max(1);
                tracing::info!(email = %email, retry_after_seconds, "OTP resend rejected (cooldown)");
                return Err(OtpError::ResendCooldown { retry_after_seconds });
            }
        }

        // 2. Invalider tous les codes encore actifs
        let invalidated = Otp::update_many()
            .col_expr(otp::Column::IsUsed, Expr::value(true))
            .filter(otp::Column::Email.eq(&email))
            .filter(otp::Column::IsUsed.eq(false))
            .exec(&txn)
            .await?;

        // 3. Nouveau code
        let code = match &policy.dev_code {
            Some(fixed) => fixed.clone(),
            None => generate_code(),
        };
        let expires_at = now + policy.ttl;

        otp::ActiveModel {
            email: Set(email.clone()),
            otp_hash: Set(hash_code(&email, &code)),
            expires_at: Set(expires_at),
            is_used: Set(false),
            verification_attempts: Set(0),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        tracing::info!(
            email = %email,
            superseded = invalidated.rows_affected,
            expires_at = %expires_at,
            "OTP generated"
        );

        Ok(GeneratedOtp {
            email,
            code,
            expires_at,
            resend_available_at: now + policy.resend_cooldown,
        })
    }

    /// Vérifie un code et le consomme en cas de succès
    pub async fn verify(
        db: &DatabaseConnection,
        policy: &OtpPolicy,
        email: &str,
        code: &str,
        now: NaiveDateTime,
    ) -> Result<otp::Model, OtpError> {
        let email = normalize_email(email);

        // 1. Le code le plus récent fait foi (les anciens sont déjà invalidés)
        let record = Otp::find()
            .filter(otp::Column::Email.eq(&email))
            .order_by_desc(otp::Column::CreatedAt)
            .order_by_desc(otp::Column::Id)
            .one(db)
            .await?
            .ok_or(OtpError::NoActiveCode)?;

        if record.is_used {
            return Err(OtpError::AlreadyUsed);
        }

        if now >= record.expires_at {
            return Err(OtpError::Expired);
        }

        // 2. Consommer une tentative (atomique, borné par le plafond)
        let consumed = Otp::update_many()
            .col_expr(
                otp::Column::VerificationAttempts,
                Expr::col(otp::Column::VerificationAttempts).add(1),
            )
            .filter(otp::Column::Id.eq(record.id))
            .filter(otp::Column::IsUsed.eq(false))
            .filter(otp::Column::VerificationAttempts.lt(policy.max_attempts))
            .exec(db)
            .await?;

        if consumed.rows_affected == 0 {
            let current = Otp::find_by_id(record.id).one(db).await?;
            return Err(match current {
                Some(current) if current.is_used => OtpError::AlreadyUsed,
                _ => OtpError::AttemptsExceeded,
            });
        }

        let attempts = record.verification_attempts + 1;

        // 3. Comparer les hashs
        let submitted = hash_code(&email, code.trim());
        if !constant_time_eq(submitted.as_bytes(), record.otp_hash.as_bytes()) {
            // Compteur relu après l'UPDATE : inclut les tentatives concurrentes
            let attempts = Otp::find_by_id(record.id)
                .one(db)
                .await?
                .map(|current| current.verification_attempts)
                .unwrap_or(policy.max_attempts);
            return Err(mismatch_error(&email, attempts, policy.max_attempts));
        }

        // 4. Usage unique : un seul UPDATE peut gagner
        let marked = Otp::update_many()
            .col_expr(otp::Column::IsUsed, Expr::value(true))
            .filter(otp::Column::Id.eq(record.id))
            .filter(otp::Column::IsUsed.eq(false))
            .exec(db)
            .await?;

        if marked.rows_affected == 0 {
            return Err(OtpError::AlreadyUsed);
        }

        tracing::info!(email = %email, attempts, "OTP verified");

        Ok(otp::Model {
            is_used: true,
            verification_attempts: attempts,
            ..record
        })
    }
}

/// Erreur d'un code incorrect selon le compteur stocké
fn mismatch_error(email: &str, attempts: i32, max_attempts: i32) -> OtpError {
    if attempts >= max_attempts {
        tracing::warn!(email = %email, attempts, "OTP attempts exhausted");
        OtpError::AttemptsExceeded
    } else {
        OtpError::Mismatch {
            remaining_attempts: max_attempts - attempts,
        }
    }
}

/// Code numérique de OTP_LENGTH chiffres, complété par des zéros
pub fn generate_code() -> String {
    let upper = 10u32.pow(OTP_LENGTH);
    let value = OsRng.gen_range(0..upper);
    format!("{:0width$}", value, width = OTP_LENGTH as usize)
}

fn hash_code(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
