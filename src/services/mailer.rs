use async_trait::async_trait;
use chrono::NaiveDateTime;

#[derive(Debug, thiserror::Error)]
#[error("Email delivery failed: {0}")]
pub struct MailError(pub String);

//trait = Interface d'envoi des emails
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(
        &self,
        email: &str,
        code: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), MailError>;
}

/// Pas de SMTP : le code est écrit dans les logs (développement)
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(
        &self,
        email: &str,
        code: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), MailError> {
        tracing::info!(email = %email, otp = %code, expires_at = %expires_at, "OTP email (log delivery)");
        Ok(())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Garde les codes envoyés pour les tests HTTP
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn last_code(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_otp(
            &self,
            email: &str,
            code: &str,
            _expires_at: NaiveDateTime,
        ) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError("smtp unreachable".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), code.to_string()));
            Ok(())
        }
    }
}
