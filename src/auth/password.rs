//! Argon2 hashing. The async entry points move the work onto tokio's blocking
//! pool so a login never stalls the reactor.

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

lazy_static! {
    /// Stand-in for accounts that do not exist. Checking against it keeps the
    /// unknown-email login path as slow as a wrong password.
    static ref DUMMY_HASH: String = match hash_sync("verimail-absent-account") {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "could not build dummy hash");
            String::new()
        }
    };
}

#[cfg(test)]
thread_local! {
    static CHECKS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Credential checks started from the current thread.
#[cfg(test)]
pub fn checks_on_this_thread() -> usize {
    CHECKS.with(|c| c.get())
}

fn hash_sync(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hash failed: {e}"))
}

fn verify_sync(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("stored hash unreadable: {e}"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// PHC string for a new password.
pub async fn hash(plain: &str) -> anyhow::Result<String> {
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || hash_sync(&plain))
        .await
        .context("password hashing task")?
}

/// Checks `plain` against a stored hash. With no stored hash (unknown
/// account) the dummy hash is checked instead and the answer is always
/// `false`. An unreadable stored hash is an error, not a mismatch.
pub async fn verify(plain: &str, stored: Option<&str>) -> anyhow::Result<bool> {
    #[cfg(test)]
    CHECKS.with(|c| c.set(c.get() + 1));

    let plain = plain.to_owned();
    let stored = stored.map(str::to_owned);
    tokio::task::spawn_blocking(move || match stored {
        Some(stored) => verify_sync(&plain, &stored),
        None => {
            let _ = verify_sync(&plain, &DUMMY_HASH);
            Ok(false)
        }
    })
    .await
    .context("password verification task")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stored_hash_accepts_only_its_password() {
        let stored = hash("Secur3P@ssw0rd!").await.unwrap();
        assert!(stored.starts_with("$argon2"));
        assert!(verify("Secur3P@ssw0rd!", Some(&stored)).await.unwrap());
        assert!(!verify("secur3p@ssw0rd!", Some(&stored)).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let a = hash("hunter22").await.unwrap();
        let b = hash("hunter22").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn missing_account_still_runs_a_check() {
        let before = checks_on_this_thread();
        assert!(!verify("verimail-absent-account", None).await.unwrap());
        assert_eq!(checks_on_this_thread(), before + 1);
        assert!(DUMMY_HASH.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn unreadable_stored_hash_is_an_error() {
        let err = verify("anything", Some("plaintext-in-the-db"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stored hash unreadable"));
    }
}
