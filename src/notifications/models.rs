//! Notification data models

/// An operator alert email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub recipients: Vec<String>,
    pub body: String,
}

impl Email {
    /// Build an email whose body is the message followed by the stack trace.
    pub fn new(subject: &str, recipients: &[String], message: &str, stack_trace: &str) -> Self {
        let body = if stack_trace.trim().is_empty() {
            message.to_string()
        } else {
            format!("{}\n\nStack trace:\n{}", message, stack_trace)
        };

        Self {
            subject: subject.to_string(),
            recipients: recipients.to_vec(),
            body,
        }
    }
}
