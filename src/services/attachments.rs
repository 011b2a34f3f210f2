//! Attachment Pre-processing
//!
//! Turns raw file references supplied with a message into additional prompt
//! context text. Unreadable files are skipped with a warning rather than
//! failing the run.

use tracing::warn;

use crate::models::envelope::Attachment;

/// Largest slice of a single attachment included in the prompt
const MAX_ATTACHMENT_BYTES: usize = 32 * 1024;

/// Render attachments into a context block appended to the user prompt
pub async fn build_attachment_context(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return String::new();
    }
    let mut context = String::from("\n\nAttached files:\n");
    for attachment in attachments {
        let name = attachment
            .name
            .as_deref()
            .unwrap_or(attachment.path.as_str());
        match tokio::fs::read_to_string(&attachment.path).await {
            Ok(mut content) => {
                if content.len() > MAX_ATTACHMENT_BYTES {
                    let mut end = MAX_ATTACHMENT_BYTES;
                    while !content.is_char_boundary(end) {
                        end -= 1;
                    }
                    content.truncate(end);
                    content.push_str("\n... (truncated)");
                }
                context.push_str(&format!("\n--- {name} ---\n{content}\n"));
            }
            Err(e) => {
                warn!(path = %attachment.path, "Skipping unreadable attachment: {e}");
            }
        }
    }
    context
}
