pub mod assignment_service;
pub mod document_service;
pub mod mailer;
pub mod otp_service;
pub mod task_status;
