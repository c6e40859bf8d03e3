//! Resolves bearer tokens to the enrollment they were minted for.

use serde::Serialize;
use tracing::debug;

use crate::credentials::CredentialIssuer;
use crate::errors::{AppError, AppResult};
use crate::faces::EmbeddingStore;

/// The enrolled identity behind a token that is still honoured.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub identity_id: String,
    pub enrolled_at: String,
    pub expires_at: i64,
}

/// A token is honoured only while the enrollment it names is the user's
/// current one; removing or replacing the enrollment revokes it.
pub struct SessionAuthenticator<I, S> {
    issuer: I,
    store: S,
}

impl<I, S> SessionAuthenticator<I, S>
where
    I: CredentialIssuer,
    S: EmbeddingStore,
{
    pub fn new(issuer: I, store: S) -> Self {
        Self { issuer, store }
    }

    /// Authenticates `token` and looks its subject up in the store.
    ///
    /// A subject that is no longer enrolled yields `UnknownUser`; a token
    /// minted for an earlier enrollment of the same name is `Unauthorized`.
    pub fn whoami(&self, token: Option<&str>) -> AppResult<Session> {
        let token = token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        let subject = self.issuer.authenticate(token)?;
        let identity = self.store.get(&subject.username)?;
        if identity.id != subject.identity_id {
            debug!(
                user = %subject.username,
                token_identity = %subject.identity_id,
                current_identity = %identity.id,
                "token names a previous enrollment"
            );
            return Err(AppError::Unauthorized(
                "token was issued for a previous enrollment".into(),
            ));
        }
        Ok(Session {
            username: identity.username,
            identity_id: identity.id,
            enrolled_at: identity.created_at,
            expires_at: subject.expires_at,
        })
    }

    /// Like [`whoami`](Self::whoami), but an unenrolled subject is `Unauthorized`.
    pub fn authenticate(&self, token: Option<&str>) -> AppResult<Session> {
        self.whoami(token).map_err(|err| match err {
            AppError::UnknownUser { user } => {
                AppError::Unauthorized(format!("user {user} is no longer enrolled"))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::JwtIssuer;
    use crate::errors::ErrorKind;
    use crate::faces::{BoundingBox, EnrolledIdentity, FaceEmbedding, InMemoryEmbeddingStore};
    use std::time::Duration;

    fn issuer() -> JwtIssuer {
        JwtIssuer::new(&[9u8; 32], Duration::from_secs(300)).unwrap()
    }

    fn enrolled(store: &InMemoryEmbeddingStore, user: &str, id: &str) {
        store
            .insert(&EnrolledIdentity {
                id: id.into(),
                username: user.into(),
                embedding: FaceEmbedding::new(vec![1.0, 0.0], 2).unwrap(),
                bounding_box: BoundingBox {
                    left: 0,
                    top: 0,
                    right: 1,
                    bottom: 1,
                },
                created_at: "2024-01-01T00:00:00.000Z".into(),
            })
            .unwrap();
    }

    #[test]
    fn whoami_reports_current_enrollment() {
        let issuer = issuer();
        let store = InMemoryEmbeddingStore::new();
        enrolled(&store, "john.doe", "id-1");
        let sessions = SessionAuthenticator::new(&issuer, &store);

        let credential = issuer.issue("john.doe", "id-1").unwrap();
        let session = sessions.whoami(Some(&credential.access_token)).unwrap();
        assert_eq!(session.username, "john.doe");
        assert_eq!(session.identity_id, "id-1");
        assert_eq!(session.expires_at, credential.expires_at);
    }

    #[test]
    fn removed_user_is_unknown_to_whoami_and_unauthorized_elsewhere() {
        let issuer = issuer();
        let store = InMemoryEmbeddingStore::new();
        enrolled(&store, "alice", "id-1");
        let sessions = SessionAuthenticator::new(&issuer, &store);
        let token = issuer.issue("alice", "id-1").unwrap().access_token;
        store.remove("alice").unwrap();

        assert_eq!(
            sessions.whoami(Some(&token)).unwrap_err().kind(),
            ErrorKind::UnknownUser
        );
        assert_eq!(
            sessions.authenticate(Some(&token)).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn token_from_previous_enrollment_is_revoked() {
        let issuer = issuer();
        let store = InMemoryEmbeddingStore::new();
        enrolled(&store, "alice", "id-1");
        let sessions = SessionAuthenticator::new(&issuer, &store);
        let stale = issuer.issue("alice", "id-1").unwrap().access_token;

        store.remove("alice").unwrap();
        enrolled(&store, "alice", "id-2");
        assert!(matches!(
            sessions.authenticate(Some(&stale)).unwrap_err(),
            AppError::Unauthorized(_)
        ));
        let fresh = issuer.issue("alice", "id-2").unwrap().access_token;
        assert_eq!(
            sessions.authenticate(Some(&fresh)).unwrap().identity_id,
            "id-2"
        );
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let issuer = issuer();
        let store = InMemoryEmbeddingStore::new();
        let sessions = SessionAuthenticator::new(&issuer, &store);
        assert!(matches!(
            sessions.whoami(Some("  ")).unwrap_err(),
            AppError::Unauthorized(_)
        ));
    }
}
