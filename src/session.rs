//! Per-session state and the dispatcher that applies user actions to it.
//!
//! Everything a user can change lives here: the loaded portfolios, the
//! investor profile, the chat histories and which portfolio the assistant is
//! talking about. The UI only reads it and turns key presses into
//! [`SessionEvent`]s.

use crate::assistant::Assistant;
use crate::conversation::{ChatMessage, ConversationStore};
use crate::error::LoadError;
use crate::loader::{load_csv_file, UPLOADED_CSV};
use crate::portfolio::Portfolio;
use crate::profile::{Choice, InvestorProfile};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    Risk,
    Tax,
    Horizon,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CyclePreference { preference: Preference, forward: bool },
    Upload(PathBuf),
    CycleContext,
    Submit(String),
}

pub struct Session {
    portfolios: Vec<Portfolio>,
    profile: InvestorProfile,
    conversations: ConversationStore,
    context: String,
    upload_path: Option<PathBuf>,
    assistant: Assistant,
}

impl Session {
    pub fn new(portfolios: Vec<Portfolio>, profile: InvestorProfile, assistant: Assistant) -> Session {
        let context = portfolios
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        Session {
            portfolios,
            profile,
            conversations: ConversationStore::new(),
            context,
            upload_path: None,
            assistant,
        }
    }

    pub fn with_upload_path(mut self, path: Option<PathBuf>) -> Session {
        self.upload_path = path;
        self
    }

    pub fn portfolios(&self) -> &[Portfolio] {
        &self.portfolios
    }

    pub fn profile(&self) -> &InvestorProfile {
        &self.profile
    }

    /// Portfolio name the assistant conversation is filed under
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.conversations.get(&self.context)
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn upload_path(&self) -> Option<&PathBuf> {
        self.upload_path.as_ref()
    }

    pub fn model(&self) -> &str {
        self.assistant.model()
    }

    /// Apply one user action. A failed upload leaves the loaded portfolios
    /// untouched.
    pub async fn dispatch(&mut self, event: SessionEvent) -> Result<(), LoadError> {
        match event {
            SessionEvent::CyclePreference {
                preference,
                forward,
            } => self.cycle_preference(preference, forward),
            SessionEvent::Upload(path) => self.upload(path)?,
            SessionEvent::CycleContext => self.cycle_context(),
            SessionEvent::Submit(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    self.assistant
                        .submit(
                            &self.profile,
                            &self.portfolios,
                            &mut self.conversations,
                            &self.context,
                            text,
                        )
                        .await;
                }
            }
        }
        Ok(())
    }

    fn cycle_preference(&mut self, preference: Preference, forward: bool) {
        fn step<C: Choice>(c: C, forward: bool) -> C {
            if forward {
                c.next()
            } else {
                c.previous()
            }
        }

        match preference {
            Preference::Risk => self.profile.risk = step(self.profile.risk, forward),
            Preference::Tax => self.profile.tax = step(self.profile.tax, forward),
            Preference::Horizon => self.profile.horizon = step(self.profile.horizon, forward),
        }
    }

    fn upload(&mut self, path: PathBuf) -> Result<(), LoadError> {
        let portfolio = load_csv_file(&path)?;
        match self.portfolios.iter_mut().find(|p| p.name == UPLOADED_CSV) {
            Some(existing) => *existing = portfolio,
            None => self.portfolios.insert(0, portfolio),
        }
        if self.context.is_empty() {
            self.context = UPLOADED_CSV.to_string();
        }
        self.upload_path = Some(path);
        Ok(())
    }

    fn cycle_context(&mut self) {
        if self.portfolios.is_empty() {
            return;
        }
        let i = self
            .portfolios
            .iter()
            .position(|p| p.name == self.context)
            .map(|i| (i + 1) % self.portfolios.len())
            .unwrap_or(0);
        self.context = self.portfolios[i].name.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::tests::ScriptedService;
    use crate::error::CompletionError;
    use crate::loader::{interactive_brokers_trust, INTERACTIVE_BROKERS_TRUST};
    use crate::profile::{Horizon, RiskTolerance, TaxSensitivity};
    use std::io::Write;

    fn session() -> Session {
        let assistant = Assistant::new(ScriptedService::with(vec![]), "gpt-4", 0.3);
        Session::new(
            vec![interactive_brokers_trust()],
            InvestorProfile::default(),
            assistant,
        )
    }

    fn csv_file(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Symbol,Quantity,Cost,Current").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_cycle_preferences() {
        let mut s = session();
        s.dispatch(SessionEvent::CyclePreference {
            preference: Preference::Risk,
            forward: true,
        })
        .await
        .unwrap();
        s.dispatch(SessionEvent::CyclePreference {
            preference: Preference::Tax,
            forward: false,
        })
        .await
        .unwrap();
        s.dispatch(SessionEvent::CyclePreference {
            preference: Preference::Horizon,
            forward: true,
        })
        .await
        .unwrap();

        assert_eq!(s.profile().risk, RiskTolerance::Aggressive);
        assert_eq!(s.profile().tax, TaxSensitivity::Low);
        assert_eq!(s.profile().horizon, Horizon::Long);
    }

    #[tokio::test]
    async fn test_upload_adds_portfolio_first() {
        let mut s = session();
        let file = csv_file(&["AAA,1,2,3", "BBB,4,5,6"]);

        s.dispatch(SessionEvent::Upload(file.path().to_path_buf()))
            .await
            .unwrap();

        let names: Vec<&str> = s.portfolios().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![UPLOADED_CSV, INTERACTIVE_BROKERS_TRUST]);
        assert_eq!(s.portfolios()[0].positions.len(), 2);
        assert_eq!(s.upload_path(), Some(&file.path().to_path_buf()));

        // a second upload replaces the first
        let file = csv_file(&["CCC,1,2,3"]);
        s.dispatch(SessionEvent::Upload(file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(s.portfolios().len(), 2);
        assert_eq!(s.portfolios()[0].positions[0].get_symbol(), "CCC");
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_portfolios() {
        let mut s = session();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Symbol,Quantity\nAAA,1").unwrap();

        let result = s
            .dispatch(SessionEvent::Upload(file.path().to_path_buf()))
            .await;
        assert!(matches!(result, Err(LoadError::MissingColumn(_))));
        assert_eq!(s.portfolios().len(), 1);
        assert!(s.upload_path().is_none());
    }

    #[tokio::test]
    async fn test_conversations_are_per_portfolio() {
        let mut s = session();
        let file = csv_file(&["AAA,1,2,3"]);
        s.dispatch(SessionEvent::Upload(file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(s.context(), INTERACTIVE_BROKERS_TRUST);

        s.dispatch(SessionEvent::Submit("about IB".to_string()))
            .await
            .unwrap();
        s.dispatch(SessionEvent::CycleContext).await.unwrap();
        assert_eq!(s.context(), UPLOADED_CSV);
        assert!(s.history().is_empty());

        s.dispatch(SessionEvent::Submit("about upload".to_string()))
            .await
            .unwrap();
        assert_eq!(s.conversations().get(INTERACTIVE_BROKERS_TRUST).len(), 2);
        assert_eq!(s.conversations().get(UPLOADED_CSV).len(), 2);
        assert_eq!(s.history()[0].content, "about upload");
    }

    #[tokio::test]
    async fn test_blank_submit_is_ignored() {
        let mut s = session();
        s.dispatch(SessionEvent::Submit("   ".to_string()))
            .await
            .unwrap();
        assert!(s.history().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reply_is_kept_in_history() {
        let assistant = Assistant::new(
            ScriptedService::with(vec![Err(CompletionError::RateLimited(
                "try later".to_string(),
            ))]),
            "gpt-4",
            0.3,
        );
        let mut s = Session::new(
            vec![interactive_brokers_trust()],
            InvestorProfile::default(),
            assistant,
        );

        s.dispatch(SessionEvent::Submit("hello".to_string()))
            .await
            .unwrap();

        let history = s.history();
        assert_eq!(history.len(), 2);
        assert!(history[1].content.starts_with(crate::assistant::ERROR_MARKER));
    }
}
