use vhub_shared::types::UserRef;

use crate::error::ValidationError;

/// A validated send, detached from the composer so no lock is held while the
/// request is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub recipient: UserRef,
    /// Trimmed text.
    pub text: String,
}

/// Pending reply text and the in-flight flag.
#[derive(Debug, Default)]
pub struct Composer {
    text: String,
    busy: bool,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn can_submit(&self, recipient: Option<&UserRef>) -> bool {
        !self.busy && recipient.is_some() && !self.text.trim().is_empty()
    }

    /// Validate and mark the composer busy. On error nothing changes.
    pub fn begin_submit(
        &mut self,
        recipient: Option<&UserRef>,
    ) -> Result<Submission, ValidationError> {
        if self.busy {
            return Err(ValidationError::Busy);
        }
        let text = self.text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let recipient = recipient.ok_or(ValidationError::NoSelection)?;

        let submission = Submission {
            recipient: recipient.clone(),
            text: text.to_string(),
        };
        self.busy = true;
        Ok(submission)
    }

    pub fn finish_success(&mut self) {
        self.busy = false;
        self.text.clear();
    }

    /// The text stays exactly as typed so the user can retry.
    pub fn finish_failure(&mut self) {
        self.busy = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::user;

    #[test]
    fn test_blank_text_rejected() {
        let mut composer = Composer::new();
        composer.compose("   \n");
        assert_eq!(
            composer.begin_submit(Some(&user("a"))),
            Err(ValidationError::EmptyText)
        );
        assert_eq!(composer.text(), "   \n");
        assert!(!composer.is_busy());
    }

    #[test]
    fn test_requires_selection() {
        let mut composer = Composer::new();
        composer.compose("hi");
        assert_eq!(composer.begin_submit(None), Err(ValidationError::NoSelection));
        assert!(!composer.can_submit(None));
    }

    #[test]
    fn test_busy_blocks_second_submit() {
        let mut composer = Composer::new();
        composer.compose("  hi  ");
        let submission = composer.begin_submit(Some(&user("a"))).unwrap();
        assert_eq!(submission.text, "hi");
        assert_eq!(
            composer.begin_submit(Some(&user("a"))),
            Err(ValidationError::Busy)
        );
    }

    #[test]
    fn test_failure_preserves_text() {
        let mut composer = Composer::new();
        composer.compose("hello");
        composer.begin_submit(Some(&user("a"))).unwrap();
        composer.finish_failure();
        assert_eq!(composer.text(), "hello");
        assert!(!composer.is_busy());

        composer.begin_submit(Some(&user("a"))).unwrap();
        composer.finish_success();
        assert_eq!(composer.text(), "");
    }
}
