//! Sign-in and sign-out.
//!
//! The signed-in user is remembered in the `session_user` cache slot so the
//! next command runs under the same identity.

use larder_core::UserId;
use larder_storefront::identity::Identity;
use larder_storefront::local::{LocalCache, keys};

use super::{CommandError, Context};

/// Identity saved by the last `login`, or guest.
///
/// An unreadable or blank slot counts as signed out.
pub fn saved_identity(cache: &dyn LocalCache) -> Identity {
    match cache.get(keys::SESSION_USER) {
        Ok(Some(raw)) => UserId::parse(raw.trim()).map_or(Identity::Guest, Identity::User),
        Ok(None) => Identity::Guest,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read session, continuing as guest");
            Identity::Guest
        }
    }
}

/// Sign in as `user` and merge the guest cart into the user's cart.
///
/// # Errors
///
/// Returns `CommandError` if `user` is blank or the session cannot be saved.
#[allow(clippy::print_stdout)]
pub async fn login(ctx: &Context, user: &str) -> Result<(), CommandError> {
    let user_id = UserId::parse(user)?;
    ctx.cache().set(keys::SESSION_USER, user_id.as_str())?;
    ctx.sync().hydrate(Identity::User(user_id.clone())).await;
    println!(
        "Signed in as {user_id} ({} items in cart)",
        ctx.sync().total_items()
    );
    Ok(())
}

/// Sign out and switch back to the guest cart.
///
/// # Errors
///
/// Returns `CommandError` if the session slot cannot be removed.
#[allow(clippy::print_stdout)]
pub async fn logout(ctx: &Context) -> Result<(), CommandError> {
    ctx.cache().remove(keys::SESSION_USER)?;
    ctx.sync().hydrate(Identity::Guest).await;
    println!("Signed out");
    Ok(())
}
