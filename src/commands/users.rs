use crate::cli::UserCommand;
use crate::error::Result;
use crate::storage::SqliteStorage;
use colored::Colorize;

/// Handle user commands
pub fn handle_users(storage: &SqliteStorage, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add { username } => {
            let id = storage.create_user(&username)?;
            println!(
                "{}",
                format!("Created user {} with id {}", username, id).green()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_user_persists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(dir.path().join("u.db")).unwrap();
        handle_users(
            &storage,
            UserCommand::Add {
                username: "alice".to_string(),
            },
        )
        .unwrap();
        assert_eq!(storage.user(1).unwrap().unwrap().username, "alice");
    }

    #[test]
    fn test_duplicate_username_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(dir.path().join("u.db")).unwrap();
        let add = || UserCommand::Add {
            username: "alice".to_string(),
        };
        handle_users(&storage, add()).unwrap();
        assert!(handle_users(&storage, add()).is_err());
    }
}
