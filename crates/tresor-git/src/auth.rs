//! Remote location and credentials

use crate::context::OperationContext;
use git2::{Cred, CredentialType, RemoteCallbacks};
use std::fmt;
use tresor_core::Token;

/// libgit2 asks again after a rejected credential, indefinitely
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Username/token pair used for fetch and push over HTTPS
#[derive(Clone, Default)]
pub struct Credentials {
    username: String,
    token: Token,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: impl Into<Token>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// No credentials; suitable for local or anonymous remotes
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &self.token)
            .finish()
    }
}

/// The remote branch the handle is bound to
#[derive(Debug, Clone)]
pub struct RemoteSpec {
    pub url: String,
    pub branch: String,
    pub credentials: Credentials,
}

impl RemoteSpec {
    pub fn new(url: impl Into<String>, branch: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            credentials,
        }
    }

    pub(crate) fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    pub(crate) fn tracking_ref(&self, remote_name: &str) -> String {
        format!("refs/remotes/{}/{}", remote_name, self.branch)
    }

    /// Forced refspec: diverged remote-tracking refs are overwritten
    pub(crate) fn fetch_refspec(&self, remote_name: &str) -> String {
        format!("+{}:{}", self.local_ref(), self.tracking_ref(remote_name))
    }

    pub(crate) fn push_refspec(&self) -> String {
        format!("{0}:{0}", self.local_ref())
    }
}

/// Build transport callbacks carrying credentials and the caller's deadline
pub(crate) fn remote_callbacks(
    credentials: &Credentials,
    ctx: OperationContext,
) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;

    callbacks.credentials(move |_url, username_from_url, allowed_types| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication rejected by remote"));
        }
        if ctx.is_expired() {
            return Err(git2::Error::from_str("deadline exceeded"));
        }

        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT)
            && !credentials.token.is_empty()
        {
            let username = username_from_url.unwrap_or(credentials.username.as_str());
            return Cred::userpass_plaintext(username, credentials.token.expose());
        }

        Cred::default()
    });

    // Returning false from either progress callback aborts the transfer.
    callbacks.transfer_progress(move |_stats| !ctx.is_expired());
    callbacks.sideband_progress(move |_data| !ctx.is_expired());

    callbacks
}
