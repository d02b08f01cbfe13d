//! Account administration: `meals parent add` and `meals token`.

use anyhow::{Context, Result};
use sqlx::PgPool;

use meals_core::token::{Principal, TokenConfig, generate_token};
use meals_db::queries::parents;

/// Pre-register a parent account so its profile exists before first sign-in.
pub async fn run_parent_add(
    pool: &PgPool,
    username: &str,
    full_name: &str,
    email: Option<&str>,
) -> Result<()> {
    if parents::get_parent_by_username(pool, username).await?.is_some() {
        anyhow::bail!("parent {username:?} already exists");
    }
    let parent = parents::insert_parent(pool, username, full_name, email)
        .await
        .with_context(|| format!("failed to add parent {username:?}"))?;

    println!("Parent added.");
    println!();
    println!("  ID:        {}", parent.id);
    println!("  Username:  {}", parent.username);
    println!("  Full name: {}", parent.full_name);
    if let Some(email) = &parent.email {
        println!("  Email:     {email}");
    }
    Ok(())
}

/// Mint a session token for `username`.
pub fn issue_token(tokens: &TokenConfig, username: &str, staff: bool) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("username must not be empty");
    }
    let principal = if staff {
        Principal::staff(username)
    } else {
        Principal::parent(username)
    };
    Ok(generate_token(tokens, &principal))
}

#[cfg(test)]
mod tests {
    use meals_core::token::{Role, validate_token};

    use super::*;

    #[test]
    fn issued_tokens_validate_with_the_right_role() {
        let tokens = TokenConfig::new(vec![9u8; 32]);

        let token = issue_token(&tokens, "kitchen", true).unwrap();
        let principal = validate_token(&tokens, &token).unwrap();
        assert_eq!(principal.username, "kitchen");
        assert_eq!(principal.role, Role::Staff);

        let token = issue_token(&tokens, " pat ", false).unwrap();
        assert_eq!(validate_token(&tokens, &token).unwrap(), Principal::parent("pat"));

        assert!(issue_token(&tokens, "  ", false).is_err());
    }
}
