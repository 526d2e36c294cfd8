//! Recipient resolution and best-effort schema change notification.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::SentinelError;
use crate::persistence::{AccessRepository, UserRepository};

use super::email::EmailSender;

/// Resolves stakeholders for a pipeline and delivers schema change
/// notifications to each of them.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    users: Arc<UserRepository>,
    access: Arc<AccessRepository>,
    mailer: EmailSender,
}

impl NotificationDispatcher {
    /// Creates a new dispatcher over the user/access repositories and an
    /// SMTP transport.
    #[must_use]
    pub fn new(
        users: Arc<UserRepository>,
        access: Arc<AccessRepository>,
        mailer: EmailSender,
    ) -> Self {
        Self {
            users,
            access,
            mailer,
        }
    }

    /// Recipient set for a pipeline: emails of all active admins plus
    /// emails of every user granted access to the pipeline,
    /// deduplicated and sorted.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] when either repository
    /// read fails.
    pub async fn recipients_for(&self, pipeline_id: i32) -> Result<Vec<String>, SentinelError> {
        let admins = self.users.active_admin_emails().await?;
        let grantees = self.access.grantee_emails(pipeline_id).await?;
        Ok(dedupe_recipients(admins, grantees))
    }

    /// Sends the schema change notification to every resolved recipient.
    ///
    /// Delivery is best-effort per recipient: a failed send is logged
    /// and the remaining recipients are still attempted. Returns the
    /// number of successful deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`SentinelError::Persistence`] only when recipient
    /// resolution itself fails; transport failures never surface.
    pub async fn notify_schema_change(
        &self,
        pipeline_id: i32,
        pipeline_name: &str,
        message: &str,
        is_breaking: bool,
    ) -> Result<usize, SentinelError> {
        let recipients = self.recipients_for(pipeline_id).await?;
        let subject = format!("Schema Change Detected for Pipeline {pipeline_id}");
        let body = render_notification_body(pipeline_name, pipeline_id, message, is_breaking);

        let mut delivered = 0usize;
        for recipient in &recipients {
            match self.mailer.send(recipient, &subject, &body).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        pipeline_id,
                        recipient = %recipient,
                        error = %e,
                        "failed to deliver schema change notification"
                    );
                }
            }
        }

        tracing::info!(
            pipeline_id,
            delivered,
            total = recipients.len(),
            "schema change notification dispatched"
        );
        Ok(delivered)
    }
}

/// Admin and grantee emails merged into one deduplicated, sorted list.
fn dedupe_recipients(admins: Vec<String>, grantees: Vec<String>) -> Vec<String> {
    let mut set: BTreeSet<String> = admins.into_iter().collect();
    set.extend(grantees);
    set.into_iter().collect()
}

/// Fixed notification template: pipeline name/id, the human-readable
/// message, and a warning banner for breaking changes.
fn render_notification_body(
    pipeline_name: &str,
    pipeline_id: i32,
    message: &str,
    is_breaking: bool,
) -> String {
    let mut body = format!(
        "A schema change was detected for pipeline '{pipeline_name}' (ID: {pipeline_id}).\n\n\
         --- What Happened ---\n\
         {message}\n"
    );
    if is_breaking {
        body.push_str(
            "\n--- Breaking Change: YES ---\n\
             ⚠️  WARNING: This is a breaking change that will affect your data pipeline!",
        );
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_are_deduplicated_and_sorted() {
        let admins = vec![
            "ops@example.com".to_string(),
            "admin@example.com".to_string(),
        ];
        let grantees = vec![
            "viewer@example.com".to_string(),
            "admin@example.com".to_string(),
        ];
        let merged = dedupe_recipients(admins, grantees);
        assert_eq!(
            merged,
            vec!["admin@example.com", "ops@example.com", "viewer@example.com"]
        );
    }

    #[test]
    fn body_names_pipeline_and_message() {
        let body = render_notification_body("sales_sync", 7, "Column 'QTY' was renamed", false);
        assert!(body.contains("pipeline 'sales_sync' (ID: 7)"));
        assert!(body.contains("Column 'QTY' was renamed"));
        assert!(!body.contains("Breaking Change"));
    }

    #[test]
    fn breaking_body_carries_warning_banner() {
        let body = render_notification_body("sales_sync", 7, "Table 'orders' was renamed", true);
        assert!(body.contains("--- Breaking Change: YES ---"));
        assert!(body.contains("WARNING"));
    }
}
