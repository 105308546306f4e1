use crate::credentials::{Credential, CredentialSource};
use crate::result::GenerationResult;

/// State owned by one interactive session: the active credential and the
/// results of the last generation action.
///
/// Nothing here is shared between sessions and nothing is persisted.
#[derive(Debug)]
pub struct Session {
    id: String,
    credential: Option<Credential>,
    history: Vec<GenerationResult>,
}

impl Session {
    /// `fallback` is whatever the secrets file or environment provided.
    pub fn new(fallback: Option<Credential>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            credential: fallback,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A user-entered key overrides any deployment credential. Returns false
    /// for blank input, which leaves the current credential untouched.
    pub fn set_api_key(&mut self, value: &str) -> bool {
        match Credential::new(value, CredentialSource::Session) {
            Some(credential) => {
                self.credential = Some(credential);
                true
            }
            None => false,
        }
    }

    /// Drops the credential for the rest of the session, deployment secrets
    /// included, until the user enters a new key.
    pub fn clear_api_key(&mut self) {
        self.credential = None;
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.credential.as_ref().map(Credential::value)
    }

    pub fn history(&self) -> &[GenerationResult] {
        &self.history
    }

    pub fn replace_history(&mut self, results: Vec<GenerationResult>) {
        self.history = results;
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Looks up a result by the 1-based number it was shown with. Numbers of
    /// failed slots resolve to nothing.
    pub fn result(&self, number: usize) -> Option<&GenerationResult> {
        self.history.iter().find(|result| result.number() == number)
    }

    pub fn end(&mut self) {
        self.credential = None;
        self.history.clear();
    }
}
