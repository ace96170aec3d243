use owo_colors::OwoColorize;
use serde_json::json;

use super::{Session, print_json};
use crate::error::{DocketError, Result};
use crate::favorites::{FavoriteOutcome, Favorites};
use crate::remote::Backend;

fn favorites_for(session: &Session, user: &str) -> Result<Favorites<Backend>> {
    let user = user.trim();
    if user.is_empty() {
        return Err(DocketError::InvalidInput("empty user id".to_string()));
    }
    Ok(Favorites::new(session.backend.clone(), user))
}

fn print_outcome(govid: &str, outcome: FavoriteOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({
            "docket_govid": govid,
            "outcome": format!("{outcome:?}"),
            "message": outcome.to_string(),
        }));
    }
    let message = match outcome {
        FavoriteOutcome::Added | FavoriteOutcome::Removed => outcome.to_string().green().to_string(),
        FavoriteOutcome::AlreadyFavorited | FavoriteOutcome::NotFavorited => {
            outcome.to_string().dimmed().to_string()
        }
    };
    println!("{}: {message}", govid.cyan());
    Ok(())
}

/// Favorite a docket for `user`
pub async fn cmd_favorite_add(session: &Session, user: &str, govid: &str, json: bool) -> Result<()> {
    let favorites = favorites_for(session, user)?;
    favorites.load().await?;
    let outcome = favorites.add(govid).await?;
    print_outcome(govid.trim(), outcome, json)
}

/// Remove a favorite for `user`
pub async fn cmd_favorite_remove(
    session: &Session,
    user: &str,
    govid: &str,
    json: bool,
) -> Result<()> {
    let favorites = favorites_for(session, user)?;
    favorites.load().await?;
    let outcome = favorites.remove(govid).await?;
    print_outcome(govid.trim(), outcome, json)
}

/// List `user`'s favorites
pub async fn cmd_favorite_ls(session: &Session, user: &str, json: bool) -> Result<()> {
    let favorites = favorites_for(session, user)?;
    let set = favorites.load().await?;
    let govids: Vec<&str> = set.iter().collect();

    if json {
        return print_json(&json!({
            "user_id": favorites.user_id(),
            "favorites": govids,
        }));
    }
    if govids.is_empty() {
        println!("{}", "No favorites yet.".dimmed());
        return Ok(());
    }
    for govid in govids {
        println!("{govid}");
    }
    Ok(())
}
